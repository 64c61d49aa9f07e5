//! Lowering of the Go template AST into a MiniJinja program
//!
//! Every Go construct is rewritten into an equivalent Jinja statement or
//! expression. Field lookups go through the `__field` accessor so that the
//! missing-key policy stays under our control. Every lowered action, and
//! every field access and function call inside it, is recorded as a
//! [`Region`] so runtime faults can be mapped back to the Go source.
//!
//! Reserved names in the lowered program:
//! - `__dot` / `__root`: Go's `.` and `$`
//! - `__ns`: per-template namespace; Go variable `$name` lives in a slot of it
//! - `__key`: map key or index bound by `range $k, $v := ...`
//! - `__with_<n>` / `__saved_<n>`: scratch slots for `with`

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use thiserror::Error;

use crate::ast::*;

/// Jinja name bound to Go's `.`
pub const DOT: &str = "__dot";
/// Jinja name bound to Go's `$`
pub const ROOT: &str = "__root";
/// Prefix of the Jinja template names holding `define` bodies
pub const DEFINE_PREFIX: &str = "define:";

const NS: &str = "__ns";
const KEY: &str = "__key";

/// Fault found while lowering; `offset` points into the Go source
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("function \"{name}\" not defined")]
    UnknownFunction { name: String, offset: usize },

    #[error("no such template \"{name}\"")]
    UnknownTemplate { name: String, offset: usize },

    #[error("{message}")]
    Invalid { message: String, offset: usize },
}

impl LowerError {
    pub fn offset(&self) -> usize {
        match self {
            Self::UnknownFunction { offset, .. }
            | Self::UnknownTemplate { offset, .. }
            | Self::Invalid { offset, .. } => *offset,
        }
    }
}

type Result<T> = std::result::Result<T, LowerError>;

fn invalid(message: impl Into<String>, offset: usize) -> LowerError {
    LowerError::Invalid {
        message: message.into(),
        offset,
    }
}

/// Bytes `jinja` of the Jinja source came from the Go expression at `go_offset`
///
/// Regions nest: an action's region contains the regions of its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub jinja: Range<usize>,
    pub go_offset: usize,
}

impl Region {
    fn shifted(self, by: usize) -> Self {
        Self {
            jinja: self.jinja.start + by..self.jinja.end + by,
            go_offset: self.go_offset,
        }
    }
}

/// One Jinja template produced by lowering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoweredTemplate {
    pub name: String,
    pub source: String,
    pub regions: Vec<Region>,
}

impl LoweredTemplate {
    /// Go offset of the innermost expression containing Jinja byte `pos`
    fn offset_at(&self, pos: usize) -> Option<usize> {
        self.regions
            .iter()
            .filter(|r| r.jinja.start <= pos && pos < r.jinja.end)
            .min_by_key(|r| r.jinja.len())
            .map(|r| r.go_offset)
    }

    /// Go offset of the first action starting on Jinja line `line`
    fn offset_on_line(&self, line: usize) -> Option<usize> {
        self.regions
            .iter()
            .find(|r| self.source[..r.jinja.start].matches('\n').count() + 1 == line)
            .map(|r| r.go_offset)
    }

    /// Put the namespace that holds this template's variables in front
    fn with_namespace(mut self, slots: &HashSet<String>) -> Self {
        if slots.is_empty() {
            return self;
        }
        let prelude = format!("{{% set {NS} = namespace() %}}");
        self.source.insert_str(0, &prelude);
        self.regions = self
            .regions
            .into_iter()
            .map(|r| r.shifted(prelude.len()))
            .collect();
        self
    }
}

/// The full lowering result: the main template plus one template per `define`
#[derive(Debug, Clone)]
pub struct Lowered {
    pub main: LoweredTemplate,
    pub defines: Vec<LoweredTemplate>,
}

impl Lowered {
    fn template(&self, name: Option<&str>) -> &LoweredTemplate {
        name.and_then(|n| self.defines.iter().find(|t| t.name == n))
            .unwrap_or(&self.main)
    }

    /// Map a Jinja fault position back to a Go source offset
    ///
    /// Prefers the byte range; falls back to the line when only that is known.
    pub fn locate(
        &self,
        template: Option<&str>,
        range: Option<Range<usize>>,
        line: Option<usize>,
    ) -> Option<usize> {
        let tmpl = self.template(template);
        range
            .and_then(|r| tmpl.offset_at(r.start))
            .or_else(|| line.and_then(|l| tmpl.offset_on_line(l)))
    }
}

/// Jinja text together with the regions of the Go expressions inside it
#[derive(Debug, Clone, Default)]
struct Code {
    text: String,
    regions: Vec<Region>,
    /// A bare literal
    constant: bool,
}

impl Code {
    fn literal(text: String) -> Self {
        Self {
            text,
            regions: Vec::new(),
            constant: true,
        }
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Attribute all of this code to the Go expression at `go_offset`
    fn marked(mut self, go_offset: usize) -> Self {
        self.regions.push(Region {
            jinja: 0..self.text.len(),
            go_offset,
        });
        self
    }

    fn then(mut self, next: impl Into<Code>) -> Self {
        let next = next.into();
        let shift = self.text.len();
        self.text.push_str(&next.text);
        self.regions
            .extend(next.regions.into_iter().map(|r| r.shifted(shift)));
        self.constant = false;
        self
    }

    fn join(items: Vec<Code>, separator: &str) -> Self {
        let mut joined = Code::default();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                joined = joined.then(separator);
            }
            joined = joined.then(item);
        }
        joined
    }
}

impl From<&str> for Code {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

impl From<String> for Code {
    fn from(text: String) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

/// Lower a parsed template
///
/// `name` becomes the Jinja name of the main template; `is_function`
/// decides which identifiers are callable.
pub fn lower(template: &Template, name: &str, is_function: &dyn Fn(&str) -> bool) -> Result<Lowered> {
    let mut lowerer = Lowerer {
        is_function,
        out: LoweredTemplate {
            name: name.to_string(),
            ..Default::default()
        },
        stack: Vec::new(),
        scopes: vec![HashMap::new()],
        slots: HashSet::new(),
        defines: BTreeMap::new(),
        template_refs: Vec::new(),
        counter: 0,
    };

    let elements = &template.elements;
    for (i, element) in elements.iter().enumerate() {
        match element {
            Element::RawText(text) => {
                let mut text = text.as_str();
                if let Some(Element::Action(prev)) = i.checked_sub(1).and_then(|p| elements.get(p))
                    && prev.trim_right
                {
                    text = text.trim_start_matches(is_go_space);
                }
                if let Some(Element::Action(next)) = elements.get(i + 1)
                    && next.trim_left
                {
                    text = text.trim_end_matches(is_go_space);
                }
                lowerer.emit_text(text);
            }
            Element::Action(action) => lowerer.action(action)?,
        }
    }

    lowerer.finish()
}

fn is_go_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Go variables visible in one block: name to namespace slot
type Scope = HashMap<String, String>;

enum Frame {
    If {
        has_else: bool,
        chained: bool,
        offset: usize,
    },
    Range {
        has_else: bool,
        offset: usize,
    },
    With {
        id: usize,
        in_else: bool,
        chained: bool,
        offset: usize,
    },
    Define {
        name: String,
        parent: LoweredTemplate,
        parent_scopes: Vec<Scope>,
        parent_slots: HashSet<String>,
        invoke: Option<Code>,
        offset: usize,
    },
}

impl Frame {
    fn chained(&self) -> bool {
        match self {
            Frame::If { chained, .. } | Frame::With { chained, .. } => *chained,
            Frame::Range { .. } | Frame::Define { .. } => false,
        }
    }

    fn offset(&self) -> usize {
        match self {
            Frame::If { offset, .. }
            | Frame::Range { offset, .. }
            | Frame::With { offset, .. }
            | Frame::Define { offset, .. } => *offset,
        }
    }
}

struct Lowerer<'a> {
    is_function: &'a dyn Fn(&str) -> bool,
    out: LoweredTemplate,
    stack: Vec<Frame>,
    scopes: Vec<Scope>,
    /// Namespace slots taken in the template being lowered
    slots: HashSet<String>,
    defines: BTreeMap<String, LoweredTemplate>,
    template_refs: Vec<(String, usize)>,
    counter: usize,
}

impl Lowerer<'_> {
    fn finish(self) -> Result<Lowered> {
        if let Some(frame) = self.stack.last() {
            return Err(invalid("unexpected EOF, missing {{end}}", frame.offset()));
        }
        for (name, offset) in &self.template_refs {
            if !self.defines.contains_key(name) {
                return Err(LowerError::UnknownTemplate {
                    name: name.clone(),
                    offset: *offset,
                });
            }
        }
        Ok(Lowered {
            main: self.out.with_namespace(&self.slots),
            defines: self.defines.into_values().collect(),
        })
    }

    fn emit_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if text.contains("{{") || text.contains("{%") || text.contains("{#") || text.ends_with('{') {
            self.out.source.push_str("{{ ");
            self.out.source.push_str(&string_literal(text));
            self.out.source.push_str(" }}");
        } else {
            self.out.source.push_str(text);
        }
    }

    /// Append lowered Jinja for the action at `offset` along with its regions
    fn emit(&mut self, offset: usize, code: impl Into<Code>) {
        let code = code.into();
        if code.is_empty() {
            return;
        }
        let start = self.out.source.len();
        self.out.source.push_str(&code.text);
        self.out.regions.push(Region {
            jinja: start..self.out.source.len(),
            go_offset: offset,
        });
        self.out
            .regions
            .extend(code.regions.into_iter().map(|r| r.shifted(start)));
    }

    fn next_id(&mut self) -> usize {
        self.counter += 1;
        self.counter
    }

    fn action(&mut self, action: &Action) -> Result<()> {
        let offset = action.span.body_start;
        match &action.body {
            ActionBody::Comment(_) => Ok(()),
            ActionBody::Pipeline(pipeline) => {
                let (setup, expr) = self.pipeline_parts(pipeline, offset)?;
                if setup.is_empty() {
                    self.emit(offset, Code::from("{{ ").then(expr).then(" }}"));
                } else {
                    self.emit(offset, setup);
                }
                Ok(())
            }
            ActionBody::If(pipeline) => {
                let code = self.open_if(pipeline, offset)?;
                self.emit(offset, code);
                self.stack.push(Frame::If {
                    has_else: false,
                    chained: false,
                    offset,
                });
                Ok(())
            }
            ActionBody::ElseIf(pipeline) => {
                if pipeline.decl.is_none()
                    && let Some(Frame::If { has_else: false, .. }) = self.stack.last()
                {
                    let cond = self.pipeline_expr(pipeline, offset)?;
                    self.emit(offset, Code::from("{% elif ").then(cond).then(" %}"));
                    return Ok(());
                }
                let code = Code::from(self.open_else(offset)?).then(self.open_if(pipeline, offset)?);
                self.emit(offset, code);
                self.stack.push(Frame::If {
                    has_else: false,
                    chained: true,
                    offset,
                });
                Ok(())
            }
            ActionBody::ElseWith(pipeline) => {
                if !matches!(self.stack.last(), Some(Frame::With { in_else: false, .. })) {
                    return Err(invalid("unexpected {{else with}}", offset));
                }
                let code = Code::from(self.open_else(offset)?).then(self.open_with(pipeline, offset, true)?);
                self.emit(offset, code);
                Ok(())
            }
            ActionBody::Else => {
                let jinja = self.open_else(offset)?;
                self.emit(offset, jinja);
                Ok(())
            }
            ActionBody::End => self.close(offset),
            ActionBody::Range { vars, pipeline } => {
                let (setup, expr) = self.pipeline_parts(pipeline, offset)?;
                if !setup.is_empty() {
                    return Err(invalid("range can't declare variables with =", offset));
                }
                self.scopes.push(Scope::new());
                let code = match vars {
                    None => Code::from(format!("{{% for {DOT} in __range_values("))
                        .then(expr)
                        .then(") %}"),
                    Some(RangeVars {
                        index_var: None,
                        value_var,
                    }) => {
                        let value = slot_ref(&self.declare(value_var));
                        Code::from(format!("{{% for {DOT} in __range_values("))
                            .then(expr)
                            .then(format!(") %}}{{% set {value} = {DOT} %}}"))
                    }
                    Some(RangeVars {
                        index_var: Some(index_var),
                        value_var,
                    }) => {
                        let index = slot_ref(&self.declare(index_var));
                        let value = slot_ref(&self.declare(value_var));
                        Code::from(format!("{{% for {KEY}, {DOT} in __range_entries("))
                            .then(expr)
                            .then(format!(
                                ") %}}{{% set {index} = {KEY} %}}{{% set {value} = {DOT} %}}"
                            ))
                    }
                };
                self.emit(offset, code);
                self.stack.push(Frame::Range {
                    has_else: false,
                    offset,
                });
                Ok(())
            }
            ActionBody::With(pipeline) => {
                let code = self.open_with(pipeline, offset, false)?;
                self.emit(offset, code);
                Ok(())
            }
            ActionBody::Define(name) => {
                if !self.stack.is_empty() {
                    return Err(invalid("define must appear at the top level", offset));
                }
                self.open_define(name, None, offset);
                Ok(())
            }
            ActionBody::Block { name, pipeline } => {
                let expr = self.pipeline_expr(pipeline, offset)?;
                self.open_define(name, Some(expr), offset);
                Ok(())
            }
            ActionBody::Template { name, pipeline } => {
                let expr = match pipeline {
                    Some(p) => self.pipeline_expr(p, offset)?,
                    None => Code::from("none"),
                };
                self.template_refs.push((name.clone(), offset));
                self.emit(offset, template_call(name, expr));
                Ok(())
            }
        }
    }

    fn open_if(&mut self, pipeline: &Pipeline, offset: usize) -> Result<Code> {
        let (setup, cond) = self.pipeline_parts(pipeline, offset)?;
        self.scopes.push(Scope::new());
        Ok(setup.then("{% if ").then(cond).then(" %}"))
    }

    fn open_with(&mut self, pipeline: &Pipeline, offset: usize, chained: bool) -> Result<Code> {
        let (setup, expr) = self.pipeline_parts(pipeline, offset)?;
        let id = self.next_id();
        self.scopes.push(Scope::new());
        self.stack.push(Frame::With {
            id,
            in_else: false,
            chained,
            offset,
        });
        Ok(setup
            .then(format!("{{% set __with_{id} = "))
            .then(expr)
            .then(format!(
                " %}}{{% if __with_{id} %}}{{% set __saved_{id} = {DOT} %}}{{% set {DOT} = __with_{id} %}}"
            )))
    }

    fn open_else(&mut self, offset: usize) -> Result<String> {
        let jinja = match self.stack.last_mut() {
            Some(Frame::If { has_else, .. }) | Some(Frame::Range { has_else, .. }) if !*has_else => {
                *has_else = true;
                "{% else %}".to_string()
            }
            Some(Frame::With { id, in_else, .. }) if !*in_else => {
                *in_else = true;
                format!("{{% set {DOT} = __saved_{id} %}}{{% else %}}")
            }
            _ => return Err(invalid("unexpected {{else}}", offset)),
        };
        // variables declared in the first branch are out of scope here
        if let Some(scope) = self.scopes.last_mut() {
            scope.clear();
        }
        Ok(jinja)
    }

    fn open_define(&mut self, name: &str, invoke: Option<Code>, offset: usize) {
        let parent = std::mem::replace(
            &mut self.out,
            LoweredTemplate {
                name: format!("{DEFINE_PREFIX}{name}"),
                ..Default::default()
            },
        );
        let parent_scopes = std::mem::replace(&mut self.scopes, vec![Scope::new()]);
        let parent_slots = std::mem::take(&mut self.slots);
        self.stack.push(Frame::Define {
            name: name.to_string(),
            parent,
            parent_scopes,
            parent_slots,
            invoke,
            offset,
        });
    }

    fn close(&mut self, offset: usize) -> Result<()> {
        loop {
            let frame = self
                .stack
                .pop()
                .ok_or_else(|| invalid("unexpected {{end}}", offset))?;
            let chained = frame.chained();
            match frame {
                Frame::If { .. } => {
                    self.scopes.pop();
                    self.emit(offset, "{% endif %}");
                }
                Frame::Range { .. } => {
                    self.scopes.pop();
                    self.emit(offset, "{% endfor %}");
                }
                Frame::With { id, in_else, .. } => {
                    self.scopes.pop();
                    if in_else {
                        self.emit(offset, "{% endif %}");
                    } else {
                        self.emit(offset, format!("{{% set {DOT} = __saved_{id} %}}{{% endif %}}"));
                    }
                }
                Frame::Define {
                    name,
                    parent,
                    parent_scopes,
                    parent_slots,
                    invoke,
                    offset: define_offset,
                } => {
                    let body = std::mem::replace(&mut self.out, parent);
                    let slots = std::mem::replace(&mut self.slots, parent_slots);
                    self.scopes = parent_scopes;
                    self.defines.insert(name.clone(), body.with_namespace(&slots));
                    if let Some(expr) = invoke {
                        self.emit(define_offset, template_call(&name, expr));
                    }
                }
            }
            if !chained {
                return Ok(());
            }
        }
    }

    /// Bind `$name` in the innermost scope to a fresh namespace slot
    fn declare(&mut self, name: &str) -> String {
        let mut slot = name.to_string();
        let mut n = 1;
        while self.slots.contains(&slot) {
            n += 1;
            slot = format!("{name}_{n}");
        }
        self.slots.insert(slot.clone());
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot.clone());
        }
        slot
    }

    /// The slot `$name` refers to here, innermost declaration first
    fn lookup(&self, name: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .map(String::as_str)
    }

    /// Split a pipeline into its `{% set %}` prelude and the expression
    /// whose value the action uses
    fn pipeline_parts(&mut self, pipeline: &Pipeline, offset: usize) -> Result<(Code, Code)> {
        let expr = self.pipeline_expr(pipeline, offset)?;
        match &pipeline.decl {
            None => Ok((Code::default(), expr)),
            Some(decl) => {
                let slot = if decl.assign {
                    self.lookup(&decl.name)
                        .map(str::to_string)
                        .ok_or_else(|| invalid(format!("undefined variable \"${}\"", decl.name), decl.offset))?
                } else {
                    self.declare(&decl.name)
                };
                let target = slot_ref(&slot);
                let setup = Code::from(format!("{{% set {target} = ")).then(expr).then(" %}");
                Ok((setup, Code::from(target)))
            }
        }
    }

    fn pipeline_expr(&self, pipeline: &Pipeline, offset: usize) -> Result<Code> {
        let mut acc: Option<Code> = None;
        for command in &pipeline.commands {
            acc = Some(self.command_expr(command, acc, offset)?);
        }
        acc.ok_or_else(|| invalid("missing value for command", offset))
    }

    fn command_expr(&self, command: &Command, piped: Option<Code>, offset: usize) -> Result<Code> {
        match command {
            Command::Operand(operand) => {
                if piped.is_some() {
                    return Err(invalid("can't give argument to non-function", offset));
                }
                self.operand_expr(operand, offset)
            }
            Command::Function {
                name,
                args,
                offset: name_offset,
            } => {
                let mut exprs = args
                    .iter()
                    .map(|arg| self.operand_expr(arg, offset))
                    .collect::<Result<Vec<_>>>()?;
                exprs.extend(piped);
                self.call_expr(name, exprs, *name_offset)
            }
        }
    }

    fn call_expr(&self, name: &str, args: Vec<Code>, offset: usize) -> Result<Code> {
        match name {
            "and" | "or" => {
                if args.is_empty() {
                    return Err(invalid(format!("wrong number of args for {name}: want at least 1 got 0"), offset));
                }
                let operands = args
                    .into_iter()
                    .map(|arg| {
                        if arg.constant {
                            Code::from("__operand(").then(arg).then(")")
                        } else {
                            arg
                        }
                    })
                    .collect();
                Ok(Code::from("(")
                    .then(Code::join(operands, &format!(" {name} ")))
                    .then(")")
                    .marked(offset))
            }
            "not" => {
                if args.len() != 1 {
                    return Err(invalid(format!("wrong number of args for not: want 1 got {}", args.len()), offset));
                }
                let arg = args.into_iter().next().unwrap_or_default();
                Ok(Code::from("(not ").then(arg).then(")").marked(offset))
            }
            _ if (self.is_function)(name) => Ok(Code::from(format!("{name}("))
                .then(Code::join(args, ", "))
                .then(")")
                .marked(offset)),
            _ => Err(LowerError::UnknownFunction {
                name: name.to_string(),
                offset,
            }),
        }
    }

    fn operand_expr(&self, operand: &Operand, offset: usize) -> Result<Code> {
        match operand {
            Operand::Dot => Ok(Code::from(DOT)),
            Operand::Root => Ok(Code::from(ROOT)),
            Operand::Field(field) => {
                let base = if field.is_root { ROOT } else { DOT };
                Ok(field_access(Code::from(base), &field.path, field.offset))
            }
            Operand::Variable {
                name,
                path,
                offset: var_offset,
            } => {
                let slot = self
                    .lookup(name)
                    .ok_or_else(|| invalid(format!("undefined variable \"${name}\""), *var_offset))?;
                Ok(field_access(Code::from(slot_ref(slot)), path, *var_offset))
            }
            Operand::Literal(literal) => Ok(Code::literal(literal_expr(literal))),
            Operand::Identifier {
                name,
                offset: name_offset,
            } => self.call_expr(name, Vec::new(), *name_offset),
            Operand::Parenthesized {
                pipeline,
                path,
                offset: paren_offset,
            } => {
                if pipeline.decl.is_some() {
                    return Err(invalid("variable declaration inside parentheses", *paren_offset));
                }
                let inner = Code::from("(").then(self.pipeline_expr(pipeline, offset)?).then(")");
                Ok(field_access(inner, path, *paren_offset))
            }
        }
    }
}

fn slot_ref(slot: &str) -> String {
    format!("{NS}.{slot}")
}

fn field_access(base: Code, path: &[String], offset: usize) -> Code {
    if path.is_empty() {
        return base;
    }
    let keys: Vec<String> = path.iter().map(|k| string_literal(k)).collect();
    Code::from("__field(")
        .then(base)
        .then(format!(", {})", keys.join(", ")))
        .marked(offset)
}

fn template_call(name: &str, expr: Code) -> Code {
    Code::from(format!("{{% with {DOT} = "))
        .then(expr)
        .then(format!(
            " %}}{{% set {ROOT} = {DOT} %}}{{% include {} %}}{{% endwith %}}",
            string_literal(&format!("{DEFINE_PREFIX}{name}"))
        ))
}

fn string_literal(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

fn literal_expr(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => string_literal(s),
        Literal::Char(c) => (*c as u32).to_string(),
        Literal::Int(n) if *n < 0 => format!("({n})"),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) if *f < 0.0 => format!("({f:?})"),
        Literal::Float(f) => format!("{f:?}"),
        Literal::Bool(b) => b.to_string(),
        Literal::Nil => "none".to_string(),
    }
}
