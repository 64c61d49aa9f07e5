//! Render Engine - Go text/template evaluation
//!
//! This crate provides the template engine behind `render`:
//! - A pest grammar for Go template syntax, parsed into an AST
//! - Lowering of that AST onto MiniJinja, with a source map back to the
//!   Go template for error positions
//! - The Go builtin functions plus sprig-style helpers and `render`
//! - Strict or lenient handling of missing keys
//! - Human-readable errors with suggestions

pub mod ast;
pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod lower;
pub mod parser;
pub mod suggestions;

pub use engine::{DEFAULT_MAX_RENDER_DEPTH, Engine, EngineBuilder};
pub use error::{EngineError, SourceLocation, TemplateError, TemplateErrorKind};
pub use suggestions::AVAILABLE_FUNCTIONS;
