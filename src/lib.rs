/// ytwatch - YouTube live-alert service
///
/// This library provides hub subscription management, the webhook that
/// receives pushed feed notifications, and the poll monitor that tracks live
/// streams until they end.
pub mod app;
pub mod checker;
pub mod cli;
pub mod config;
pub mod core;
pub mod directory;
pub mod events;
pub mod feed;
pub mod hub;
pub mod internal_metrics;
pub mod monitor;
pub mod task_manager;
pub mod utils;
pub mod webhook;

// Re-export core types for convenience
pub use crate::core::*;
