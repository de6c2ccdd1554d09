//! # PulseDesk Core
//!
//! Shared foundation for the PulseDesk scheduler: the error type used across
//! all workspace crates and the TOML configuration system.

pub mod config;
pub mod error;

pub use config::PulseDeskConfig;
pub use error::{PulseDeskError, Result};
