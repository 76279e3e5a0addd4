//! Shared utilities for tradeflow
//!
//! Logging setup for binaries and typed lookups of environment overrides.

pub mod env;
pub mod logging;

pub use env::{EnvError, env_duration_secs, env_var};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
