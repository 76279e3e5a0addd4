//! Core vocabulary for tradeflow
//!
//! This crate defines the types every other tradeflow crate speaks:
//! analyst roles, the message log exchanged with generative backends,
//! tool requests, the per-run accounting context and the shared error type.

pub mod context;
pub mod error;
pub mod message;
pub mod role;

pub use context::{CallStats, CallSummary, RunContext};
pub use error::{Error, Result};
pub use message::{Message, ToolRequest, conversation_for};
pub use role::Role;
