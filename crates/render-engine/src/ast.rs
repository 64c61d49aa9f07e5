//! AST (Abstract Syntax Tree) for Go templates
//!
//! These structures represent the parsed template syntax, which is then
//! lowered into a MiniJinja program by [`crate::lower`].

use std::fmt;

/// A complete parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub elements: Vec<Element>,
}

/// An element in a template: either raw text or an action
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Raw text (not inside {{ }})
    RawText(String),
    /// An action (inside {{ }})
    Action(Action),
}

/// An action (directive inside {{ }})
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Whether the action has left whitespace trimming ({{-)
    pub trim_left: bool,
    /// Whether the action has right whitespace trimming (-}})
    pub trim_right: bool,
    /// The action body
    pub body: ActionBody,
    /// Where the action sits in the template source
    pub span: Span,
}

/// Byte offsets of an action in the template source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Offset of the opening `{{`
    pub start: usize,
    /// Offset just past the closing `}}`
    pub end: usize,
    /// Offset of the first token of the action body; faults that no single
    /// operand owns are reported here
    pub body_start: usize,
}

/// The body of an action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionBody {
    /// Comment: {{/* comment */}}
    Comment(String),
    /// If: {{ if .X }}
    If(Pipeline),
    /// Else if: {{ else if .X }}
    ElseIf(Pipeline),
    /// Else with: {{ else with .X }}
    ElseWith(Pipeline),
    /// Else: {{ else }}
    Else,
    /// End: {{ end }}
    End,
    /// Range: {{ range .X }} or {{ range $i, $v := .X }}
    Range {
        /// Optional variable declarations ($i, $v)
        vars: Option<RangeVars>,
        /// The pipeline to iterate over
        pipeline: Pipeline,
    },
    /// With: {{ with .X }}
    With(Pipeline),
    /// Define: {{ define "name" }}
    Define(String),
    /// Template: {{ template "name" . }}
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
    /// Block: {{ block "name" . }}
    Block { name: String, pipeline: Pipeline },
    /// A pipeline expression (variable access, function call, etc.)
    Pipeline(Pipeline),
}

/// Variables in a range clause: $i, $v := ...
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVars {
    /// Index variable (optional): $i in `range $i, $v := .X`
    pub index_var: Option<String>,
    /// Value variable: $v in `range $v := .X` or `range $i, $v := .X`
    pub value_var: String,
}

/// A pipeline: a sequence of commands separated by |
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Optional variable declaration or assignment: $x := ... / $x = ...
    pub decl: Option<Declaration>,
    /// The commands in the pipeline
    pub commands: Vec<Command>,
}

impl Pipeline {
    /// Create a simple pipeline with one command
    pub fn simple(cmd: Command) -> Self {
        Self {
            decl: None,
            commands: vec![cmd],
        }
    }
}

/// `$name := pipeline` or `$name = pipeline`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    /// `true` for `=`, `false` for `:=`
    pub assign: bool,
    /// Offset of `$name`
    pub offset: usize,
}

/// A command in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Function call: funcName arg1 arg2
    Function {
        name: String,
        args: Vec<Operand>,
        /// Offset of the function name
        offset: usize,
    },
    /// A lone operand
    Operand(Operand),
}

/// Something that evaluates to a value
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.`
    Dot,
    /// Field access: .image.tag or $.image.tag
    Field(FieldAccess),
    /// Variable with optional field chain: $x or $x.a.b
    Variable {
        name: String,
        path: Vec<String>,
        offset: usize,
    },
    /// `$` on its own
    Root,
    /// Literal value
    Literal(Literal),
    /// Function name used as an argument, called without arguments
    Identifier { name: String, offset: usize },
    /// Parenthesized pipeline with optional field chain: (...).a.b
    Parenthesized {
        pipeline: Box<Pipeline>,
        path: Vec<String>,
        offset: usize,
    },
}

/// Field access: .image.tag
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAccess {
    /// Whether this is a root access ($.image vs .image)
    pub is_root: bool,
    /// The path components: ["image", "tag"]
    pub path: Vec<String>,
    /// Offset of the access in the template source
    pub offset: usize,
}

impl FieldAccess {
    pub fn new(path: Vec<String>, offset: usize) -> Self {
        Self {
            is_root: false,
            path,
            offset,
        }
    }

    pub fn root(path: Vec<String>, offset: usize) -> Self {
        Self {
            is_root: true,
            path,
            offset,
        }
    }

    /// Get the full path as a dot-separated string
    pub fn full_path(&self) -> String {
        self.path.join(".")
    }
}

/// A literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Char(char),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Char(c) => write!(f, "'{c}'"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Nil => write!(f, "nil"),
        }
    }
}
