//! Worker runtime for tradeflow
//!
//! A [`WorkerTask`] runs one role's loop: generate, route the role's tool
//! requests, generate again, until a final report or the iteration bound.
//! The [`WorkerRuntime`] carries the resources every worker of a run shares
//! and acts as the factory for tasks.

pub mod runtime;
pub mod worker;

pub use runtime::{WorkerRuntime, WorkerRuntimeBuilder};
pub use worker::{WorkerConfig, WorkerOutcome, WorkerState, WorkerTask, fallback_report};
