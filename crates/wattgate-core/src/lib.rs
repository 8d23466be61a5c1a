//! Wattgate Core — shared error type and configuration.

pub mod config;
pub mod error;

pub use config::{Config, InfluxConfig, RouterConfig};
pub use error::{Error, Result};
