//! Versioned prompt templates for tradeflow
//!
//! Each worker role renders its system prompt from a [`PromptTemplate`]
//! held in a [`PromptCatalog`]. Templates carry a version label so a run
//! can record exactly which prompt revision every role used.
//!
//! # Quick Start
//!
//! ```
//! use tradeflow_prompt::{PromptCatalog, PromptTemplate};
//! use serde_json::json;
//!
//! let catalog = PromptCatalog::builder()
//!     .template(PromptTemplate::new("trader", "v2", "Trade {{ ticker }}.").unwrap())
//!     .build();
//!
//! let rendered = catalog.render("trader", &json!({ "ticker": "AAPL" })).unwrap();
//! assert_eq!(rendered.text, "Trade AAPL.");
//! assert_eq!(rendered.version, "v2");
//! ```

mod catalog;
mod error;
mod template;

pub use catalog::{PromptCatalog, PromptCatalogBuilder};
pub use error::{PromptError, Result};
pub use template::{PromptTemplate, RenderedPrompt};
