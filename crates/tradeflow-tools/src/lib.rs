//! Tool management and routing for tradeflow
//!
//! Tools are resolved once into an immutable [`ToolRegistry`]. The
//! [`ToolRouter`] executes the pending requests of exactly one role's most
//! recent turn and tags every result with that role, so two roles asking for
//! a same-named tool never see each other's results.

pub mod registry;
pub mod router;
pub mod tool;

pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use router::{SKIPPED_TOOL_REQUEST, ToolRouter};
pub use tool::{Tool, ToolOutput};
