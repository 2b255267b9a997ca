//! Configuration module for the revoice daemon
//!
//! All settings are read from environment variables with sensible defaults.

pub mod config;

pub use config::*;
