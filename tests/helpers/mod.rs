pub mod recording_consumer;
