//! Generative backend contract for tradeflow
//!
//! The orchestration core never talks to a model API directly. It sees a
//! [`Generator`] that turns a [`GenerationRequest`] into a normalized
//! [`Generation`] (`text` plus `tool_requests`). Provider-specific response
//! shapes stay inside the adapters that implement the trait.
//!
//! This crate also provides:
//!
//! - [`CallPolicy`]: per-call timeout plus retry with exponential backoff
//! - [`RateLimit`]: request-rate backpressure shared across a run
//! - [`ScriptedGenerator`]: a deterministic backend for tests and replays

pub mod error;
pub mod generator;
pub mod policy;
pub mod request;
pub mod scripted;
pub mod throttle;
pub mod tools;

pub use error::{GenerationError, Result};
pub use generator::Generator;
pub use policy::{Attempted, CallPolicy};
pub use request::{Generation, GenerationRequest, GenerationRequestBuilder, ToolMode};
pub use scripted::{RecordedCall, ScriptedGenerator, ScriptedReply};
pub use throttle::RateLimit;
pub use tools::ToolDefinition;
