//! Shared types, config, and error definitions for quake-watch.

pub mod clock;
pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::Error;
pub use source::{FeedSource, Geocoder};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
