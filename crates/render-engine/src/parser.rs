//! Go template parser
//!
//! Parses Go `text/template` syntax into an AST using pest.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "go_template.pest"]
struct GoTemplateParser;

/// Parser error
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("invalid number: {text}")]
    InvalidNumber { text: String, offset: usize },

    #[error("invalid string: {text}")]
    InvalidString { text: String, offset: usize },

    #[error("{message}")]
    Malformed { message: String, offset: usize },
}

impl ParseError {
    /// Byte offset of the fault, when known
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Syntax { .. } => None,
            Self::InvalidNumber { offset, .. }
            | Self::InvalidString { offset, .. }
            | Self::Malformed { offset, .. } => Some(*offset),
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        let message = match &e.variant {
            pest::error::ErrorVariant::ParsingError { positives, .. } => {
                if positives.contains(&Rule::action_end) {
                    "unclosed action".to_string()
                } else if positives.is_empty() {
                    "unexpected input".to_string()
                } else {
                    let expected: Vec<String> = positives.iter().map(describe_rule).collect();
                    format!("unexpected input, expected {}", expected.join(" or "))
                }
            }
            pest::error::ErrorVariant::CustomError { message } => message.clone(),
        };
        ParseError::Syntax {
            message,
            line,
            column,
        }
    }
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of input".to_string(),
        Rule::action_end => "\"}}\"".to_string(),
        Rule::pipeline | Rule::command => "a pipeline".to_string(),
        Rule::template_name | Rule::string_literal | Rule::raw_string => {
            "a quoted template name".to_string()
        }
        Rule::variable_name => "a variable".to_string(),
        other => format!("{other:?}").replace('_', " "),
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse a Go template string into an AST
pub fn parse(input: &str) -> Result<Template> {
    let pairs = GoTemplateParser::parse(Rule::template, input)?;

    let mut elements = Vec::new();

    for pair in pairs {
        if pair.as_rule() == Rule::template {
            for inner in pair.into_inner() {
                if let Some(elem) = parse_element(inner)? {
                    elements.push(elem);
                }
            }
        }
    }

    Ok(Template { elements })
}

fn parse_element(pair: Pair<Rule>) -> Result<Option<Element>> {
    match pair.as_rule() {
        Rule::raw_text => Ok(Some(Element::RawText(pair.as_str().to_string()))),
        Rule::action => Ok(Some(Element::Action(parse_action(pair)?))),
        _ => Ok(None),
    }
}

fn parse_action(pair: Pair<Rule>) -> Result<Action> {
    let outer = pair.as_span();
    let mut span = Span {
        start: outer.start(),
        end: outer.end(),
        body_start: outer.start() + 2,
    };
    let mut trim_left = false;
    let mut trim_right = false;
    let mut body = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::action_start => {
                trim_left = inner.as_str().ends_with('-');
                span.body_start = inner.as_span().end();
            }
            Rule::action_end => {
                trim_right = inner.as_str().starts_with('-');
            }
            _ => {
                span.body_start = inner.as_span().start();
                body = Some(parse_action_body(inner)?);
            }
        }
    }

    let body = body.ok_or_else(|| ParseError::Malformed {
        message: "missing value for command".to_string(),
        offset: span.body_start,
    })?;

    Ok(Action {
        trim_left,
        trim_right,
        body,
        span,
    })
}

fn parse_action_body(pair: Pair<Rule>) -> Result<ActionBody> {
    match pair.as_rule() {
        Rule::comment => {
            let text = pair.as_str();
            let content = text
                .strip_prefix("/*")
                .and_then(|s| s.strip_suffix("*/"))
                .unwrap_or(text)
                .to_string();
            Ok(ActionBody::Comment(content))
        }
        Rule::if_action => Ok(ActionBody::If(parse_pipeline_from_inner(pair, "if")?)),
        Rule::else_if_action => Ok(ActionBody::ElseIf(parse_pipeline_from_inner(pair, "if")?)),
        Rule::else_with_action => Ok(ActionBody::ElseWith(parse_pipeline_from_inner(pair, "with")?)),
        Rule::else_action => Ok(ActionBody::Else),
        Rule::end_action => Ok(ActionBody::End),
        Rule::range_action => {
            let offset = pair.as_span().start();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::range_decl => return parse_range_decl(inner),
                    Rule::pipeline => {
                        return Ok(ActionBody::Range {
                            vars: None,
                            pipeline: parse_pipeline(inner)?,
                        });
                    }
                    _ => {}
                }
            }
            Err(ParseError::Malformed {
                message: "missing value for range".to_string(),
                offset,
            })
        }
        Rule::with_action => Ok(ActionBody::With(parse_pipeline_from_inner(pair, "with")?)),
        Rule::define_action => {
            let name = extract_template_name(pair)?;
            Ok(ActionBody::Define(name))
        }
        Rule::template_action => {
            let mut name = String::new();
            let mut pipeline = None;

            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::string_literal | Rule::raw_string => {
                        name = parse_string_literal(inner)?;
                    }
                    Rule::pipeline => {
                        pipeline = Some(parse_pipeline(inner)?);
                    }
                    _ => {}
                }
            }

            Ok(ActionBody::Template { name, pipeline })
        }
        Rule::block_action => {
            let offset = pair.as_span().start();
            let mut name = String::new();
            let mut pipeline = None;

            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::string_literal | Rule::raw_string => {
                        name = parse_string_literal(inner)?;
                    }
                    Rule::pipeline => {
                        pipeline = Some(parse_pipeline(inner)?);
                    }
                    _ => {}
                }
            }

            let pipeline = pipeline.ok_or_else(|| ParseError::Malformed {
                message: "missing value for block".to_string(),
                offset,
            })?;
            Ok(ActionBody::Block { name, pipeline })
        }
        Rule::pipeline | Rule::pipeline_decl => Ok(ActionBody::Pipeline(parse_pipeline(pair)?)),
        other => Err(ParseError::Malformed {
            message: format!("unexpected {other:?}"),
            offset: pair.as_span().start(),
        }),
    }
}

/// The pipeline of a control action; `keyword` names the action when it is missing
fn parse_pipeline_from_inner(pair: Pair<Rule>, keyword: &str) -> Result<Pipeline> {
    let offset = pair.as_span().start();
    for inner in pair.into_inner() {
        if matches!(inner.as_rule(), Rule::pipeline | Rule::pipeline_decl) {
            return parse_pipeline(inner);
        }
    }
    Err(ParseError::Malformed {
        message: format!("missing value for {keyword}"),
        offset,
    })
}

fn parse_pipeline(pair: Pair<Rule>) -> Result<Pipeline> {
    match pair.as_rule() {
        Rule::pipeline_decl => {
            let mut decl = None;
            let mut assign = false;
            let mut commands = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::variable_name => decl = Some((variable_name(&inner), inner.as_span().start())),
                    Rule::decl_op => assign = inner.as_str() == "=",
                    Rule::pipeline => commands = parse_pipeline(inner)?.commands,
                    _ => {}
                }
            }
            Ok(Pipeline {
                decl: decl.map(|(name, offset)| Declaration { name, assign, offset }),
                commands,
            })
        }
        _ => {
            let commands = pair
                .into_inner()
                .filter(|inner| inner.as_rule() == Rule::command)
                .map(parse_command)
                .collect::<Result<Vec<_>>>()?;
            Ok(Pipeline {
                decl: None,
                commands,
            })
        }
    }
}

fn parse_command(pair: Pair<Rule>) -> Result<Command> {
    let offset = pair.as_span().start();
    let mut operands = pair.into_inner();

    let first = operands.next().ok_or_else(|| ParseError::Malformed {
        message: "empty command".to_string(),
        offset,
    })?;

    // An identifier in command position names a function; everything after
    // it is an argument.
    if first.as_rule() == Rule::identifier {
        let name = first.as_str().to_string();
        let offset = first.as_span().start();
        let args = operands.map(parse_operand).collect::<Result<Vec<_>>>()?;
        return Ok(Command::Function { name, args, offset });
    }

    let operand = parse_operand(first)?;
    if let Some(extra) = operands.next() {
        return Err(ParseError::Malformed {
            message: format!("can't give argument to non-function {}", describe_operand(&operand)),
            offset: extra.as_span().start(),
        });
    }
    Ok(Command::Operand(operand))
}

fn describe_operand(operand: &Operand) -> String {
    match operand {
        Operand::Dot => ".".to_string(),
        Operand::Root => "$".to_string(),
        Operand::Field(field) if field.is_root => format!("$.{}", field.full_path()),
        Operand::Field(field) => format!(".{}", field.full_path()),
        Operand::Variable { name, path, .. } if path.is_empty() => format!("${name}"),
        Operand::Variable { name, path, .. } => format!("${name}.{}", path.join(".")),
        Operand::Literal(lit) => lit.to_string(),
        Operand::Identifier { name, .. } => name.clone(),
        Operand::Parenthesized { .. } => "(...)".to_string(),
    }
}

fn parse_operand(pair: Pair<Rule>) -> Result<Operand> {
    let offset = pair.as_span().start();
    match pair.as_rule() {
        Rule::dot => Ok(Operand::Dot),
        Rule::root => Ok(Operand::Root),
        Rule::field_chain => Ok(Operand::Field(FieldAccess::new(split_path(pair.as_str()), offset))),
        Rule::root_field => Ok(Operand::Field(FieldAccess::root(
            split_path(pair.as_str().trim_start_matches('$')),
            offset,
        ))),
        Rule::variable_ref => {
            let text = pair.as_str().trim_start_matches('$');
            let mut parts = text.split('.');
            let name = parts.next().unwrap_or_default().to_string();
            let path = parts.map(str::to_string).collect();
            Ok(Operand::Variable { name, path, offset })
        }
        Rule::identifier => Ok(Operand::Identifier {
            name: pair.as_str().to_string(),
            offset,
        }),
        Rule::parenthesized => {
            let mut pipeline = None;
            let mut path = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::paren_group => {
                        if let Some(p) = inner.into_inner().next() {
                            pipeline = Some(parse_pipeline(p)?);
                        }
                    }
                    Rule::field_chain => path = split_path(inner.as_str()),
                    _ => {}
                }
            }
            let pipeline = pipeline.ok_or_else(|| ParseError::Malformed {
                message: "missing value in parenthesized pipeline".to_string(),
                offset,
            })?;
            Ok(Operand::Parenthesized {
                pipeline: Box::new(pipeline),
                path,
                offset,
            })
        }
        _ => Ok(Operand::Literal(parse_literal(pair)?)),
    }
}

fn split_path(text: &str) -> Vec<String> {
    text.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn variable_name(pair: &Pair<Rule>) -> String {
    pair.as_str().trim_start_matches('$').to_string()
}

fn parse_literal(pair: Pair<Rule>) -> Result<Literal> {
    let offset = pair.as_span().start();
    match pair.as_rule() {
        Rule::string_literal | Rule::raw_string => Ok(Literal::String(parse_string_literal(pair)?)),
        Rule::char_literal => {
            let text = pair.as_str();
            let inner = &text[1..text.len() - 1];
            let decoded = unescape(inner, '\'').ok_or_else(|| ParseError::InvalidString {
                text: text.to_string(),
                offset,
            })?;
            let mut chars = decoded.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Literal::Char(c)),
                _ => Err(ParseError::InvalidString {
                    text: text.to_string(),
                    offset,
                }),
            }
        }
        Rule::number => parse_number(pair.as_str(), offset),
        Rule::boolean => Ok(Literal::Bool(pair.as_str() == "true")),
        Rule::nil => Ok(Literal::Nil),
        other => Err(ParseError::Malformed {
            message: format!("unexpected {other:?}"),
            offset,
        }),
    }
}

fn parse_number(text: &str, offset: usize) -> Result<Literal> {
    let invalid = || ParseError::InvalidNumber {
        text: text.to_string(),
        offset,
    };

    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = digits.to_ascii_lowercase();

    let radix_int = |radix: u32, body: &str| -> Result<Literal> {
        let n = i64::from_str_radix(body, radix).map_err(|_| invalid())?;
        Ok(Literal::Int(if negative { -n } else { n }))
    };

    if let Some(hex) = lower.strip_prefix("0x") {
        radix_int(16, hex)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        radix_int(8, oct)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        radix_int(2, bin)
    } else if lower.contains('.') || lower.contains('e') {
        let n: f64 = text.parse().map_err(|_| invalid())?;
        Ok(Literal::Float(n))
    } else if lower.len() > 1 && lower.starts_with('0') {
        // legacy octal: 0755
        radix_int(8, &lower[1..])
    } else {
        radix_int(10, &lower)
    }
}

fn parse_string_literal(pair: Pair<Rule>) -> Result<String> {
    let text = pair.as_str();

    // Backtick strings are raw
    if let Some(raw) = text.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        return Ok(raw.to_string());
    }

    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text);

    unescape(inner, '"').ok_or_else(|| ParseError::InvalidString {
        text: text.to_string(),
        offset: pair.as_span().start(),
    })
}

/// Process Go escape sequences
fn unescape(inner: &str, quote: char) -> Option<String> {
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            't' => result.push('\t'),
            'a' => result.push('\u{07}'),
            'b' => result.push('\u{08}'),
            'f' => result.push('\u{0C}'),
            'v' => result.push('\u{0B}'),
            '\\' => result.push('\\'),
            c if c == quote => result.push(c),
            'x' => result.push(hex_escape(&mut chars, 2)?),
            'u' => result.push(hex_escape(&mut chars, 4)?),
            'U' => result.push(hex_escape(&mut chars, 8)?),
            d @ '0'..='7' => {
                let mut code = d.to_digit(8)?;
                for _ in 0..2 {
                    code = code * 8 + chars.next()?.to_digit(8)?;
                }
                result.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }

    Some(result)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, len: usize) -> Option<char> {
    let mut code = 0u32;
    for _ in 0..len {
        code = code * 16 + chars.next()?.to_digit(16)?;
    }
    char::from_u32(code)
}

fn extract_template_name(pair: Pair<Rule>) -> Result<String> {
    let offset = pair.as_span().start();
    for inner in pair.into_inner() {
        if matches!(inner.as_rule(), Rule::string_literal | Rule::raw_string) {
            return parse_string_literal(inner);
        }
    }
    Err(ParseError::InvalidString {
        text: "missing template name".to_string(),
        offset,
    })
}

fn parse_range_decl(pair: Pair<Rule>) -> Result<ActionBody> {
    let mut vars = Vec::new();
    let mut pipeline = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::variable_name => vars.push(variable_name(&inner)),
            Rule::pipeline => pipeline = Some(parse_pipeline(inner)?),
            _ => {}
        }
    }

    let vars = match vars.len() {
        1 => RangeVars {
            index_var: None,
            value_var: vars.remove(0),
        },
        _ => RangeVars {
            index_var: Some(vars.remove(0)),
            value_var: vars.remove(0),
        },
    };

    Ok(ActionBody::Range {
        vars: Some(vars),
        pipeline: pipeline.unwrap_or(Pipeline {
            decl: None,
            commands: vec![],
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_action(input: &str) -> Action {
        let template = parse(input).unwrap();
        match template.elements.into_iter().next() {
            Some(Element::Action(action)) => action,
            other => panic!("expected an action, got {other:?}"),
        }
    }

    fn single_pipeline(input: &str) -> Pipeline {
        match single_action(input).body {
            ActionBody::Pipeline(p) => p,
            other => panic!("expected a pipeline, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_simple_field() {
        let pipeline = single_pipeline("{{ .image.name }}");
        assert_eq!(
            pipeline.commands,
            vec![Command::Operand(Operand::Field(FieldAccess::new(
                vec!["image".into(), "name".into()],
                3
            )))]
        );
    }

    #[test]
    fn test_parse_span() {
        let template = parse("ab\n{{ .missing }}").unwrap();
        let Element::Action(action) = &template.elements[1] else {
            panic!("expected action");
        };
        assert_eq!(action.span.start, 3);
        assert_eq!(action.span.body_start, 6);
        assert_eq!(action.span.end, 17);
    }

    #[test]
    fn test_parse_with_trim() {
        let action = single_action("{{- .name -}}");
        assert!(action.trim_left);
        assert!(action.trim_right);
        assert_eq!(action.span.body_start, 4);
    }

    #[test]
    fn test_negative_number_is_not_trim() {
        let pipeline = single_pipeline("{{-3}}");
        assert_eq!(
            pipeline.commands,
            vec![Command::Operand(Operand::Literal(Literal::Int(-3)))]
        );
    }

    #[test]
    fn test_parse_if_else_end() {
        let result = parse("{{ if .enabled }}yes{{ else if .other }}maybe{{ else }}no{{ end }}").unwrap();
        let bodies: Vec<_> = result
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Action(a) => Some(&a.body),
                Element::RawText(_) => None,
            })
            .collect();
        assert!(matches!(bodies[0], ActionBody::If(_)));
        assert!(matches!(bodies[1], ActionBody::ElseIf(_)));
        assert!(matches!(bodies[2], ActionBody::Else));
        assert!(matches!(bodies[3], ActionBody::End));
    }

    #[test]
    fn test_parse_range() {
        let action = single_action("{{- range .items }}{{ . }}{{- end }}");
        let ActionBody::Range { vars, pipeline } = action.body else {
            panic!("expected range");
        };
        assert!(vars.is_none());
        assert_eq!(pipeline.commands.len(), 1);
    }

    #[test]
    fn test_parse_range_with_vars() {
        let action = single_action("{{- range $i, $v := .items }}{{ $v }}{{- end }}");
        let ActionBody::Range { vars, .. } = action.body else {
            panic!("expected range");
        };
        let vars = vars.unwrap();
        assert_eq!(vars.index_var.as_deref(), Some("i"));
        assert_eq!(vars.value_var, "v");
    }

    #[test]
    fn test_parse_pipeline_chain() {
        let pipeline = single_pipeline("{{ .inner | render .override }}");
        assert_eq!(pipeline.commands.len(), 2);
        let Command::Function { name, args, .. } = &pipeline.commands[1] else {
            panic!("expected function");
        };
        assert_eq!(name, "render");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_parse_function_call() {
        let pipeline = single_pipeline(r#"{{ printf "%s-%s" .name $.other }}"#);
        let Command::Function { name, args, offset } = &pipeline.commands[0] else {
            panic!("expected function");
        };
        assert_eq!(name, "printf");
        assert_eq!(*offset, 3);
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], Operand::Literal(Literal::String("%s-%s".into())));
        assert_eq!(
            args[2],
            Operand::Field(FieldAccess::root(vec!["other".into()], 24))
        );
    }

    #[test]
    fn test_parse_declaration() {
        let pipeline = single_pipeline("{{ $name := .name | upper }}");
        assert_eq!(
            pipeline.decl,
            Some(Declaration {
                name: "name".into(),
                assign: false,
                offset: 3
            })
        );
        assert_eq!(pipeline.commands.len(), 2);

        let pipeline = single_pipeline("{{ $name = 1 }}");
        assert!(pipeline.decl.unwrap().assign);
    }

    #[test]
    fn test_parse_variables() {
        let pipeline = single_pipeline("{{ $x.a.b }}");
        assert_eq!(
            pipeline.commands,
            vec![Command::Operand(Operand::Variable {
                name: "x".into(),
                path: vec!["a".into(), "b".into()],
                offset: 3
            })]
        );
        let pipeline = single_pipeline("{{ $ }}");
        assert_eq!(pipeline.commands, vec![Command::Operand(Operand::Root)]);
    }

    #[test]
    fn test_parse_define_and_template() {
        let action = single_action(r#"{{- define "app.name" -}}"#);
        assert_eq!(action.body, ActionBody::Define("app.name".into()));

        let action = single_action(r#"{{ template "app.name" . }}"#);
        let ActionBody::Template { name, pipeline } = action.body else {
            panic!("expected template");
        };
        assert_eq!(name, "app.name");
        assert!(pipeline.is_some());

        let action = single_action(r#"{{ template "bare" }}"#);
        assert!(matches!(action.body, ActionBody::Template { pipeline: None, .. }));
    }

    #[test]
    fn test_parse_comment() {
        let action = single_action("{{/* This is a comment */}}");
        let ActionBody::Comment(text) = action.body else {
            panic!("expected comment");
        };
        assert_eq!(text.trim(), "This is a comment");
    }

    #[test]
    fn test_parse_raw_text() {
        let result = parse("apiVersion: v1\nkind: ConfigMap").unwrap();
        assert_eq!(
            result.elements,
            vec![Element::RawText("apiVersion: v1\nkind: ConfigMap".into())]
        );
    }

    #[test]
    fn test_parse_nested_boolean() {
        assert!(parse("{{ and .a .b }}").is_ok());
        assert!(parse(r#"{{ and (eq .a "x") .b }}"#).is_ok());
        assert!(parse(r#"{{- if and (eq .a "x") (or .b .c) }}ok{{- end }}"#).is_ok());
    }

    #[test]
    fn test_parse_parenthesized_field() {
        let pipeline = single_pipeline(r#"{{ (fromYaml .doc).spec }}"#);
        let Command::Operand(Operand::Parenthesized { pipeline, path, .. }) = &pipeline.commands[0]
        else {
            panic!("expected parenthesized");
        };
        assert_eq!(path, &vec!["spec".to_string()]);
        assert_eq!(pipeline.commands.len(), 1);
    }

    #[test]
    fn test_parse_literals() {
        let pipeline = single_pipeline(r#"{{ list "a\tb" `raw\n` 'x' 0x1F 0755 1.5 2e3 true nil }}"#);
        let Command::Function { args, .. } = &pipeline.commands[0] else {
            panic!("expected function");
        };
        let literals: Vec<_> = args
            .iter()
            .map(|a| match a {
                Operand::Literal(l) => l.clone(),
                other => panic!("expected literal, got {other:?}"),
            })
            .collect();
        assert_eq!(
            literals,
            vec![
                Literal::String("a\tb".into()),
                Literal::String("raw\\n".into()),
                Literal::Char('x'),
                Literal::Int(31),
                Literal::Int(493),
                Literal::Float(1.5),
                Literal::Float(2000.0),
                Literal::Bool(true),
                Literal::Nil,
            ]
        );
    }

    #[test]
    fn test_argument_to_non_function() {
        let err = parse("{{ .a .b }}").unwrap_err();
        assert!(err.to_string().contains("can't give argument to non-function .a"));
        assert_eq!(err.offset(), Some(6));
    }

    #[test]
    fn test_unclosed_action() {
        let err = parse("line one\n{{ .name ").unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_control_keyword_without_pipeline() {
        for (source, keyword) in [
            ("{{ if }}x{{ end }}", "if"),
            ("{{ with }}x{{ end }}", "with"),
            ("{{ range }}x{{ end }}", "range"),
            ("{{ if .a }}{{ else if }}{{ end }}", "if"),
        ] {
            let err = parse(source).unwrap_err();
            assert_eq!(err.to_string(), format!("missing value for {keyword}"), "{source}");
        }
        assert_eq!(parse("ab {{ if }}").unwrap_err().offset(), Some(6));
    }

    #[test]
    fn test_keyword_is_not_a_function_name() {
        assert!(parse("{{ printf \"%v\" end }}").is_err());
        assert!(parse("{{ printf \"%v\" ending }}").is_ok());
    }

    #[test]
    fn test_empty_action() {
        let err = parse("{{ }}").unwrap_err();
        assert!(err.to_string().contains("missing value for command"));
    }
}
