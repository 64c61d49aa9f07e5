//! Render Core - context building for the render template tool
//!
//! This crate owns everything that happens before a template is evaluated:
//! - `Values`: tree-shaped context data with deep merge
//! - `Variable`: a parsed `path=value` command-line variable
//! - `TemplateContext`: the merged context handed to the engine, and the
//!   copy-then-merge derivation used by nested renders
//!
//! No filesystem or network access happens here; callers hand in text.

pub mod context;
pub mod error;
pub mod values;

pub use context::TemplateContext;
pub use error::{CoreError, Result};
pub use values::{Values, Variable, parse_variable, parse_variables};
