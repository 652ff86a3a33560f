//! Library half of the `mtd` binary: configuration, input documents and
//! the command implementations, kept here so integration tests can drive
//! them without a process boundary.

pub mod commands;
pub mod config;
pub mod input;

pub use config::{AppConfig, ConfigError};
