//! Common types shared across the application.

pub mod error;
pub mod events;

pub use error::{AdaptorError, AdaptorResult, ConfigError, LinkError};
pub use events::{MessageEvent, Platform, ServerChangeEvent, ServerChangeKind};
