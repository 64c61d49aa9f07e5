//! Engine error types with source locations

use std::fmt;

use miette::{Diagnostic, NamedSource, SourceSpan};
use render_core::CoreError;
use thiserror::Error;

use crate::functions::{MissingKeyError, RecursionLimitError};
use crate::lower::{LowerError, Lowered};
use crate::parser::ParseError;
use crate::suggestions::{suggest_missing_key, suggest_unknown_function};

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid context: {0}")]
    Context(#[from] CoreError),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    /// The template text does not parse
    Syntax,
    /// A function name that is not in the function table
    UnknownFunction,
    /// A `template` action naming an undefined template
    UnknownTemplate,
    /// Strict-mode lookup of an absent key
    MissingKey,
    /// A fault inside a template evaluated by `render`
    NestedRender,
    /// `render` nested beyond the configured depth
    RecursionLimit,
    /// Any other evaluation fault (bad argument types, `fail`, ...)
    InvalidOperation,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::UnknownFunction => "unknown_function",
            Self::UnknownTemplate => "unknown_template",
            Self::MissingKey => "missing_key",
            Self::NestedRender => "nested_render",
            Self::RecursionLimit => "recursion_limit",
            Self::InvalidOperation => "invalid_operation",
        }
    }
}

/// Where a fault happened: template label, 1-based line and the column of
/// the offending expression
///
/// The column follows Go's `text/template`: it counts the characters before
/// the expression on its line, so `{{ .missing }}` is at `1:3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub label: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    /// Location of byte `offset` in `source`
    ///
    pub fn from_offset(label: &str, source: &str, offset: usize) -> Self {
        let mut offset = offset.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &source[..offset];
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Self {
            label: label.to_string(),
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count(),
        }
    }

    /// Byte offset of this location in `source`
    fn offset_in(&self, source: &str) -> usize {
        let line_start: usize = source
            .split_inclusive('\n')
            .take(self.line.saturating_sub(1))
            .map(str::len)
            .sum();
        let line = &source[line_start.min(source.len())..];
        line_start
            + line
                .char_indices()
                .nth(self.column)
                .map(|(i, _)| i)
                .unwrap_or(line.len())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.label, self.line, self.column)
    }
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{location}: {message}")]
#[diagnostic(code(render::template))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Label, line and column of the faulting expression
    pub location: SourceLocation,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,

    /// The fault inside a nested `render`, if this error wraps one
    pub nested: Option<Box<TemplateError>>,
}

impl TemplateError {
    fn at(label: &str, source: &str, offset: usize, kind: TemplateErrorKind, message: impl Into<String>) -> Self {
        let location = SourceLocation::from_offset(label, source, offset);
        Self::located(location, source, kind, message)
    }

    fn located(location: SourceLocation, source: &str, kind: TemplateErrorKind, message: impl Into<String>) -> Self {
        let offset = location.offset_in(source);
        Self {
            message: message.into(),
            kind,
            src: NamedSource::new(location.label.clone(), source.to_string()),
            span: Some(action_span(source, offset)),
            suggestion: None,
            location,
            nested: None,
        }
    }

    /// A template that failed to parse
    pub fn from_parse(err: ParseError, label: &str, source: &str) -> Self {
        match err.offset() {
            Some(offset) => Self::at(label, source, offset, TemplateErrorKind::Syntax, err.to_string()),
            None => {
                let location = match &err {
                    ParseError::Syntax { line, column, .. } => SourceLocation {
                        label: label.to_string(),
                        line: *line,
                        column: column.saturating_sub(1),
                    },
                    _ => SourceLocation::from_offset(label, source, 0),
                };
                Self::located(location, source, TemplateErrorKind::Syntax, err.to_string())
            }
        }
    }

    /// A template that parsed but could not be compiled
    pub fn from_lowering(err: LowerError, label: &str, source: &str) -> Self {
        let (kind, suggestion) = match &err {
            LowerError::UnknownFunction { name, .. } => {
                (TemplateErrorKind::UnknownFunction, Some(suggest_unknown_function(name)))
            }
            LowerError::UnknownTemplate { .. } => (
                TemplateErrorKind::UnknownTemplate,
                Some("Declare it with {{ define \"name\" }}...{{ end }}".to_string()),
            ),
            LowerError::Invalid { .. } => (TemplateErrorKind::Syntax, None),
        };
        let mut error = Self::at(label, source, err.offset(), kind, err.to_string());
        error.suggestion = suggestion;
        error
    }

    /// A fault raised while evaluating the lowered program
    ///
    /// The position is mapped back through the lowering source map to the
    /// Go action that caused it.
    pub fn from_minijinja(err: &minijinja::Error, label: &str, source: &str, lowered: &Lowered) -> Self {
        let offset = lowered.locate(err.name(), err.range(), err.line()).unwrap_or(0);
        let message = err
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| err.kind().to_string());

        let cause = std::error::Error::source(err);
        if let Some(inner) = cause.and_then(|c| c.downcast_ref::<TemplateError>()) {
            let mut error = Self::at(label, source, offset, TemplateErrorKind::NestedRender, message);
            error.nested = Some(Box::new(inner.clone()));
            return error;
        }
        if let Some(missing) = cause.and_then(|c| c.downcast_ref::<MissingKeyError>()) {
            let mut error = Self::at(label, source, offset, TemplateErrorKind::MissingKey, message);
            error.suggestion = suggest_missing_key(&missing.key, &missing.available)
                .or_else(|| Some("Pass --unsafe-ignore-missing-keys to print <no value> instead".to_string()));
            return error;
        }
        if let Some(limit) = cause.and_then(|c| c.downcast_ref::<RecursionLimitError>()) {
            let mut error = Self::at(label, source, offset, TemplateErrorKind::RecursionLimit, message);
            error.suggestion = Some(format!(
                "A template passed to render renders itself; nesting stops after {} levels",
                limit.limit
            ));
            return error;
        }

        let kind = match err.kind() {
            minijinja::ErrorKind::SyntaxError => TemplateErrorKind::Syntax,
            minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
            minijinja::ErrorKind::UndefinedError => TemplateErrorKind::MissingKey,
            _ => TemplateErrorKind::InvalidOperation,
        };
        Self::at(label, source, offset, kind, message)
    }

    /// Get the error kind
    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }

    /// The innermost fault of a chain of nested renders
    pub fn root_cause(&self) -> &TemplateError {
        let mut current = self;
        while let Some(inner) = &current.nested {
            current = inner;
        }
        current
    }
}

/// Span from `offset` to the end of the enclosing action
fn action_span(source: &str, offset: usize) -> SourceSpan {
    let offset = offset.min(source.len());
    let len = source[offset..].find("}}").unwrap_or(0);
    SourceSpan::new(offset.into(), len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_offset() {
        let loc = SourceLocation::from_offset("stdin", "{{ .missing }}", 3);
        assert_eq!(loc.to_string(), "stdin:1:3");

        let loc = SourceLocation::from_offset("f.yaml", "a: 1\nb: {{ .x }}", 11);
        assert_eq!((loc.line, loc.column), (2, 6));

        let loc = SourceLocation::from_offset("u", "é {{ .x }}", 6);
        assert_eq!(loc.column, 5);
    }

    #[test]
    fn test_location_offset_roundtrip() {
        let source = "a: 1\nbé: {{ .x }}";
        let loc = SourceLocation::from_offset("t", source, 11);
        assert_eq!(loc.offset_in(source), 11);
    }

    #[test]
    fn test_parse_error_location() {
        let err = crate::parser::parse("ok\n{{ .a ").unwrap_err();
        let err = TemplateError::from_parse(err, "stdin", "ok\n{{ .a ");
        assert_eq!(err.kind(), TemplateErrorKind::Syntax);
        assert_eq!(err.location.line, 2);
        assert!(err.to_string().starts_with("stdin:2:"));
    }

    #[test]
    fn test_unknown_function_has_suggestion() {
        let source = "{{ uper .x }}";
        let template = crate::parser::parse(source).unwrap();
        let err = crate::lower::lower(&template, "stdin", &crate::suggestions::is_function).unwrap_err();
        let err = TemplateError::from_lowering(err, "stdin", source);

        assert_eq!(err.kind(), TemplateErrorKind::UnknownFunction);
        assert_eq!(err.to_string(), "stdin:1:3: function \"uper\" not defined");
        assert!(err.suggestion.as_deref().unwrap().contains("`upper`"));
    }

    #[test]
    fn test_root_cause_walks_nested() {
        let inner = TemplateError::at("stdin/render", "{{ .x }}", 2, TemplateErrorKind::MissingKey, "missing");
        let mut outer = TemplateError::at("stdin", "{{ render .t }}", 2, TemplateErrorKind::NestedRender, "wrapped");
        outer.nested = Some(Box::new(inner));

        assert_eq!(outer.root_cause().kind(), TemplateErrorKind::MissingKey);
        assert_eq!(outer.root_cause().location.label, "stdin/render");
    }

    #[test]
    fn test_kind_code_strings() {
        assert_eq!(TemplateErrorKind::MissingKey.to_code_string(), "missing_key");
        assert_eq!(TemplateErrorKind::NestedRender.to_code_string(), "nested_render");
    }
}
