//! Live status checking.
//!
//! This module defines the error type shared by all checker implementations
//! and provides the YouTube Data API backed checker used in production.

pub mod youtube;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use thiserror::Error;

pub use crate::core::{LiveStatus, LiveStatusChecker, WatchTarget};
pub use youtube::YouTubeChecker;

/// Reasons a live status could not be confirmed.
///
/// All variants are transient from the poll monitor's point of view: the
/// watch keeps running and the next tick checks again.
#[derive(Error, Debug, Clone)]
pub enum CheckerError {
    #[error("status request failed: {0}")]
    Transport(String),

    #[error("status API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode status response: {0}")]
    Decode(String),
}
