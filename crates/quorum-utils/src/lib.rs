//! Foundation utilities shared by every quorum crate.

pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod redaction;

pub use error::{CapabilityError, CapabilityErrorKind, ConfigError, ErrorCategory, UserFriendlyError};
pub use exit_codes::ExitCode;
