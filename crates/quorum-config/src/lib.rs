//! Configuration model, discovery, and validation for quorum.

pub mod config;

pub use config::*;
