//! Infrastructure - configuration, capabilities, and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `capabilities` - Startup detection of inference and video support
//! - `metrics` - Lock-free metrics collection

pub mod capabilities;
pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use capabilities::Capabilities;
pub use config::Config;
pub use metrics::Metrics;
