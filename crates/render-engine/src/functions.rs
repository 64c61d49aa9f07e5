//! Template functions (Go builtins, collections, flow control, math)
//!
//! Every function takes its arguments in Go order: the value piped into a
//! command arrives as the last argument.

use std::cmp::Ordering;

use minijinja::value::{Rest, ValueKind};
use minijinja::{Error, ErrorKind, Output, State, Value};
use render_core::TemplateContext;
use semver::{Version, VersionReq};
use thiserror::Error as ThisError;

/// A strict-mode lookup of a key that the map does not contain
///
/// Attached as the source of the MiniJinja error so the reporter can offer
/// the keys that do exist.
#[derive(Debug, Clone, ThisError)]
#[error("map has no entry for key \"{key}\"")]
pub struct MissingKeyError {
    pub key: String,
    pub available: Vec<String>,
}

/// `render` was nested deeper than the configured limit
#[derive(Debug, Clone, ThisError)]
#[error("render nested deeper than {limit} levels")]
pub struct RecursionLimitError {
    pub limit: usize,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

// -------------------------------------------------------------------------
// Go value display
// -------------------------------------------------------------------------

/// Go's name for the type of a value, used in error messages
pub fn go_type_name(value: &Value) -> &'static str {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => "<nil>",
        ValueKind::Bool => "bool",
        ValueKind::Number if value.as_i64().is_some() => "int",
        ValueKind::Number => "float64",
        ValueKind::String => "string",
        ValueKind::Seq => "[]interface {}",
        ValueKind::Map => "map[string]interface {}",
        _ => "interface {}",
    }
}

/// Format a float the way Go's `%v` does
pub fn go_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e21).contains(&abs) {
        go_exponent(&format!("{f:e}"))
    } else {
        format!("{f}")
    }
}

/// Rewrite Rust's `1.5e-7` exponent notation as Go's `1.5e-07`
fn go_exponent(s: &str) -> String {
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s.to_string(),
    }
}

/// Render a value the way Go's `fmt.Sprint` does
///
/// `nil` prints as `<nil>`; maps print as `map[k:v]` with sorted keys and
/// sequences as `[a b]`.
pub fn go_string(value: &Value) -> String {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => "<nil>".to_string(),
        ValueKind::Bool => value.is_true().to_string(),
        ValueKind::String => value.as_str().unwrap_or_default().to_string(),
        ValueKind::Number => {
            if let Some(n) = value.as_i64() {
                n.to_string()
            } else if let Ok(n) = i128::try_from(value.clone()) {
                n.to_string()
            } else if let Ok(n) = u128::try_from(value.clone()) {
                n.to_string()
            } else {
                match f64::try_from(value.clone()) {
                    Ok(f) => go_float(f),
                    Err(_) => value.to_string(),
                }
            }
        }
        ValueKind::Seq | ValueKind::Iterable => {
            let items: Vec<String> = value
                .try_iter()
                .map(|iter| iter.map(|v| go_string(&v)).collect())
                .unwrap_or_default();
            format!("[{}]", items.join(" "))
        }
        ValueKind::Map => {
            let items: Vec<String> = sorted_entries(value)
                .iter()
                .map(|(k, v)| format!("{}:{}", go_string(k), go_string(v)))
                .collect();
            format!("map[{}]", items.join(" "))
        }
        _ => value.to_string(),
    }
}

/// Plain text of a value: strings as-is, `nil` as the empty string
pub(crate) fn text(value: &Value) -> String {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => String::new(),
        _ => go_string(value),
    }
}

/// Output formatter: top-level `nil` and missing values print `<no value>`
pub fn go_formatter(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    let rendered = if value.is_undefined() || value.is_none() {
        "<no value>".to_string()
    } else {
        go_string(value)
    };
    minijinja::escape_formatter(out, state, &Value::from(rendered))
}

/// Map entries ordered by key
pub(crate) fn sorted_entries(value: &Value) -> Vec<(Value, Value)> {
    let Ok(iter) = value.try_iter() else {
        return Vec::new();
    };
    let mut entries: Vec<(Value, Value)> = iter
        .filter_map(|k| value.get_item(&k).ok().map(|v| (k, v)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn map_keys(value: &Value) -> Vec<String> {
    sorted_entries(value).iter().map(|(k, _)| go_string(k)).collect()
}

// -------------------------------------------------------------------------
// Internal accessors used by lowered programs
// -------------------------------------------------------------------------

/// Build the `__field` accessor behind every `.a.b` chain
///
/// In strict mode a missing key is an error; in lenient mode it yields an
/// undefined value that prints as `<no value>`.
pub fn field_accessor(strict: bool) -> impl Fn(Value, Rest<String>) -> Result<Value, Error> + Send + Sync + 'static {
    move |base: Value, path: Rest<String>| {
        let mut current = base;
        for key in path.iter() {
            current = lookup_field(&current, key, strict)?;
        }
        Ok(current)
    }
}

fn lookup_field(receiver: &Value, key: &str, strict: bool) -> Result<Value, Error> {
    match receiver.kind() {
        ValueKind::Map => {
            let found = receiver.get_item(&Value::from(key))?;
            if !found.is_undefined() {
                Ok(found)
            } else if strict {
                let missing = MissingKeyError {
                    key: key.to_string(),
                    available: map_keys(receiver),
                };
                Err(Error::new(ErrorKind::UndefinedError, missing.to_string()).with_source(missing))
            } else {
                Ok(Value::UNDEFINED)
            }
        }
        ValueKind::Undefined | ValueKind::None if strict => Err(Error::new(
            ErrorKind::UndefinedError,
            format!("nil data; no entry for key \"{key}\""),
        )),
        ValueKind::Undefined | ValueKind::None => Ok(Value::UNDEFINED),
        _ => Err(invalid(format!(
            "can't evaluate field {key} in type {}",
            go_type_name(receiver)
        ))),
    }
}

/// Values visited by `range`: maps in key order, integers as `0..n`
pub fn range_values(value: Value) -> Result<Value, Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(Value::from(Vec::<Value>::new())),
        ValueKind::Seq | ValueKind::Iterable => Ok(value),
        ValueKind::Map => Ok(Value::from(
            sorted_entries(&value).into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
        )),
        ValueKind::Number => match value.as_i64() {
            Some(n) => Ok(Value::from((0..n.max(0)).map(Value::from).collect::<Vec<_>>())),
            None => Err(range_error(&value)),
        },
        _ => Err(range_error(&value)),
    }
}

/// `(key, value)` pairs visited by `range $k, $v := ...`
pub fn range_entries(value: Value) -> Result<Value, Error> {
    let pairs: Vec<Value> = match value.kind() {
        ValueKind::Undefined | ValueKind::None => Vec::new(),
        ValueKind::Seq | ValueKind::Iterable => value
            .try_iter()?
            .enumerate()
            .map(|(i, v)| Value::from(vec![Value::from(i), v]))
            .collect(),
        ValueKind::Map => sorted_entries(&value)
            .into_iter()
            .map(|(k, v)| Value::from(vec![k, v]))
            .collect(),
        ValueKind::Number => match value.as_i64() {
            Some(n) => (0..n.max(0))
                .map(|i| Value::from(vec![Value::from(i), Value::from(i)]))
                .collect(),
            None => return Err(range_error(&value)),
        },
        _ => return Err(range_error(&value)),
    };
    Ok(Value::from(pairs))
}

fn range_error(value: &Value) -> Error {
    invalid(format!("range can't iterate over {}", go_string(value)))
}

/// Passes an `and` / `or` operand through unchanged
///
/// Wrapping literal operands keeps the compiler from folding the
/// expression into a bool, so the deciding operand is what gets printed.
pub fn operand(value: Value) -> Value {
    value
}

// -------------------------------------------------------------------------
// Nested evaluation
// -------------------------------------------------------------------------

/// Build the `render` function
///
/// `render TEMPLATE` evaluates the string against the current context;
/// `render OVERRIDE TEMPLATE` first deep-merges `OVERRIDE` over a copy of it.
/// The parent context is never modified.
pub fn render_function(
    max_depth: usize,
) -> impl Fn(&State, Rest<Value>) -> Result<String, Error> + Send + Sync + 'static {
    move |state: &State, args: Rest<Value>| {
        let (overrides, template) = match args.as_slice() {
            [template] => (Value::from(()), template),
            [overrides, template] => (overrides.clone(), template),
            _ => {
                return Err(invalid(format!(
                    "wrong number of args for render: want 1 or 2 got {}",
                    args.len()
                )));
            }
        };
        let template = template
            .as_str()
            .ok_or_else(|| invalid(format!("render expects a template string, got {}", go_type_name(template))))?;

        let depth = state.lookup("__depth").and_then(|v| v.as_usize()).unwrap_or(0);
        if depth >= max_depth {
            let limit = RecursionLimitError { limit: max_depth };
            return Err(invalid(limit.to_string()).with_source(limit));
        }

        let label = state
            .lookup("__label")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "template".to_string());
        let parent = match state.lookup("__context") {
            Some(values) => to_json(&values)?,
            None => serde_json::Value::Null,
        };
        let overrides = to_json(&overrides)?;
        if !overrides.is_null() && !overrides.is_object() {
            return Err(invalid(format!(
                "render override must be a map, got {}",
                go_type_name(&Value::from_serialize(&overrides))
            )));
        }

        let context = TemplateContext { values: parent }.nested(&overrides);
        let nested_label = format!("{label}/render");
        tracing::debug!(label = %nested_label, depth = depth + 1, "rendering nested template");

        crate::engine::evaluate(state.env(), &nested_label, template, &context, depth + 1).map_err(|e| {
            Error::new(ErrorKind::InvalidOperation, format!("error calling render: {e}")).with_source(e)
        })
    }
}

pub(crate) fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    if value.is_undefined() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

// -------------------------------------------------------------------------
// Go builtins
// -------------------------------------------------------------------------

fn compare(a: &Value, b: &Value) -> Result<Ordering, Error> {
    match (a.kind(), b.kind()) {
        (ValueKind::Number, ValueKind::Number) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return Ok(x.cmp(&y));
            }
            let x = to_float(a);
            let y = to_float(b);
            x.partial_cmp(&y)
                .ok_or_else(|| invalid("incomparable numbers"))
        }
        (ValueKind::String, ValueKind::String) => Ok(a.as_str().cmp(&b.as_str())),
        (ValueKind::Bool, ValueKind::Bool) => Ok(a.is_true().cmp(&b.is_true())),
        _ => Err(invalid(format!(
            "incompatible types for comparison: {} and {}",
            go_type_name(a),
            go_type_name(b)
        ))),
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a.kind(), b.kind()) {
        (ValueKind::Undefined | ValueKind::None, ValueKind::Undefined | ValueKind::None) => true,
        (ValueKind::Number, ValueKind::Number) => compare(a, b).is_ok_and(|o| o == Ordering::Equal),
        _ => a == b,
    }
}

/// `eq ARG1 ARG2...`: true when ARG1 equals any of the others
pub fn eq(first: Value, others: Rest<Value>) -> Result<bool, Error> {
    if others.is_empty() {
        return Err(invalid("missing argument for comparison"));
    }
    Ok(others.iter().any(|other| equal(&first, other)))
}

pub fn ne(a: Value, b: Value) -> bool {
    !equal(&a, &b)
}

pub fn lt(a: Value, b: Value) -> Result<bool, Error> {
    Ok(compare(&a, &b)? == Ordering::Less)
}

pub fn le(a: Value, b: Value) -> Result<bool, Error> {
    Ok(compare(&a, &b)? != Ordering::Greater)
}

pub fn gt(a: Value, b: Value) -> Result<bool, Error> {
    Ok(compare(&a, &b)? == Ordering::Greater)
}

pub fn ge(a: Value, b: Value) -> Result<bool, Error> {
    Ok(compare(&a, &b)? != Ordering::Less)
}

/// Length of a string (in bytes), sequence or map
pub fn len(value: Value) -> Result<usize, Error> {
    match value.kind() {
        ValueKind::String => Ok(value.as_str().map(str::len).unwrap_or(0)),
        ValueKind::Seq | ValueKind::Map => value
            .len()
            .ok_or_else(|| invalid("len of unsized value")),
        _ => Err(invalid(format!("len of type {}", go_type_name(&value)))),
    }
}

/// `index ITEM KEY...`: successive map or sequence lookups
///
/// A missing map key yields `nil`; an out-of-range sequence index fails.
pub fn index(item: Value, keys: Rest<Value>) -> Result<Value, Error> {
    let mut current = item;
    for key in keys.iter() {
        current = match current.kind() {
            ValueKind::Map => {
                let found = current.get_item(key)?;
                if found.is_undefined() { Value::from(()) } else { found }
            }
            ValueKind::Seq | ValueKind::String => {
                let len = current.len().unwrap_or(0) as i64;
                let idx = key
                    .as_i64()
                    .ok_or_else(|| invalid(format!("cannot index slice with {}", go_type_name(key))))?;
                if idx < 0 || idx >= len {
                    return Err(invalid(format!("index out of range: {idx}")));
                }
                current.get_item(key)?
            }
            ValueKind::Undefined | ValueKind::None => Value::from(()),
            _ => {
                return Err(invalid(format!("can't index item of type {}", go_type_name(&current))));
            }
        };
    }
    Ok(current)
}

/// `slice ITEM [START [END]]`
pub fn slice(item: Value, bounds: Rest<Value>) -> Result<Value, Error> {
    if bounds.len() > 2 {
        return Err(invalid("too many slice indexes"));
    }
    let bound = |i: usize, default: usize| -> Result<usize, Error> {
        match bounds.get(i) {
            None => Ok(default),
            Some(v) => v
                .as_i64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| invalid(format!("invalid slice index {}", go_string(v)))),
        }
    };

    match item.kind() {
        ValueKind::String => {
            let s = item.as_str().unwrap_or_default();
            let (start, end) = (bound(0, 0)?, bound(1, s.len())?);
            if start > end || end > s.len() || !s.is_char_boundary(start) || !s.is_char_boundary(end) {
                return Err(invalid(format!("slice index out of range: {start}:{end}")));
            }
            Ok(Value::from(&s[start..end]))
        }
        ValueKind::Seq => {
            let items: Vec<Value> = item.try_iter()?.collect();
            let (start, end) = (bound(0, 0)?, bound(1, items.len())?);
            if start > end || end > items.len() {
                return Err(invalid(format!("slice index out of range: {start}:{end}")));
            }
            Ok(Value::from(items[start..end].to_vec()))
        }
        _ => Err(invalid(format!("can't slice item of type {}", go_type_name(&item)))),
    }
}

/// Go's `fmt.Sprint`: spaces only between operands that are both non-strings
pub fn print(args: Rest<Value>) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_string = arg.kind() == ValueKind::String;
        if i > 0 && !is_string && args[i - 1].kind() != ValueKind::String {
            out.push(' ');
        }
        out.push_str(&go_string(arg));
    }
    out
}

/// Go's `fmt.Sprintln`: always space-separated, newline terminated
pub fn println(args: Rest<Value>) -> String {
    let parts: Vec<String> = args.iter().map(go_string).collect();
    format!("{}\n", parts.join(" "))
}

/// Go's `fmt.Sprintf`
pub fn printf(format: String, args: Rest<Value>) -> String {
    sprintf(&format, &args)
}

struct Directive {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    sharp: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Printf-style formatting with Go verbs
///
/// Supports `%v %s %d %f %e %g %q %t %x %X %o %b %c %%` with flags,
/// width and precision. Missing operands render as `%!v(MISSING)`.
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut result = String::with_capacity(format.len() + args.len() * 10);
    let mut chars = format.chars().peekable();
    let mut arg_idx = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let mut directive = Directive {
            minus: false,
            plus: false,
            space: false,
            zero: false,
            sharp: false,
            width: None,
            precision: None,
        };
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => directive.minus = true,
                '+' => directive.plus = true,
                ' ' => directive.space = true,
                '0' => directive.zero = true,
                '#' => directive.sharp = true,
                _ => break,
            }
            chars.next();
        }
        directive.width = read_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(read_number(&mut chars).unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            result.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            result.push('%');
            continue;
        }

        let Some(arg) = args.get(arg_idx) else {
            result.push_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        arg_idx += 1;

        let body = format_verb(verb, &directive, arg);
        result.push_str(&pad(body, &directive, verb));
    }

    if arg_idx < args.len() {
        let extra: Vec<String> = args[arg_idx..]
            .iter()
            .map(|a| format!("{}={}", go_type_name(a), go_string(a)))
            .collect();
        result.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }

    result
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&d) = chars.peek() {
        if !d.is_ascii_digit() {
            break;
        }
        digits.push(d);
        chars.next();
    }
    digits.parse().ok()
}

fn signed(n: String, directive: &Directive) -> String {
    if n.starts_with('-') {
        n
    } else if directive.plus {
        format!("+{n}")
    } else if directive.space {
        format!(" {n}")
    } else {
        n
    }
}

fn format_verb(verb: char, directive: &Directive, arg: &Value) -> String {
    let is_int = arg.kind() == ValueKind::Number && arg.as_i64().is_some();
    match verb {
        'v' | 's' => {
            let s = go_string(arg);
            match directive.precision {
                Some(p) if verb == 's' => s.chars().take(p).collect(),
                _ => s,
            }
        }
        'd' if is_int => signed(to_int(arg).to_string(), directive),
        'f' | 'F' if arg.kind() == ValueKind::Number => {
            signed(format!("{:.*}", directive.precision.unwrap_or(6), to_float(arg)), directive)
        }
        'e' | 'E' if arg.kind() == ValueKind::Number => {
            let s = go_exponent(&format!("{:.*e}", directive.precision.unwrap_or(6), to_float(arg)));
            signed(if verb == 'E' { s.to_uppercase() } else { s }, directive)
        }
        'g' | 'G' if arg.kind() == ValueKind::Number => signed(go_float(to_float(arg)), directive),
        'q' if is_int => u32::try_from(to_int(arg))
            .ok()
            .and_then(char::from_u32)
            .map(|c| format!("'{c}'"))
            .unwrap_or_else(|| go_string(arg)),
        'q' => go_quote(&text(arg)),
        't' if arg.kind() == ValueKind::Bool => go_string(arg),
        'x' | 'X' if is_int => {
            let n = to_int(arg);
            let s = if n < 0 { format!("-{:x}", n.unsigned_abs()) } else { format!("{n:x}") };
            let s = if directive.sharp { format!("0x{s}") } else { s };
            if verb == 'X' { s.to_uppercase() } else { s }
        }
        'x' | 'X' if arg.kind() == ValueKind::String => {
            let s: String = text(arg).bytes().map(|b| format!("{b:02x}")).collect();
            if verb == 'X' { s.to_uppercase() } else { s }
        }
        'o' if is_int => format!("{:o}", to_int(arg)),
        'b' if is_int => format!("{:b}", to_int(arg)),
        'c' if is_int => u32::try_from(to_int(arg))
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default(),
        _ => format!("%!{verb}({}={})", go_type_name(arg), go_string(arg)),
    }
}

fn pad(body: String, directive: &Directive, verb: char) -> String {
    let Some(width) = directive.width else {
        return body;
    };
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if directive.minus {
        format!("{body}{}", " ".repeat(fill))
    } else if directive.zero && matches!(verb, 'd' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' | 'b') {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (c.to_string(), body[1..].to_string()),
            _ => (String::new(), body),
        };
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

/// Double-quoted string with Go escapes
pub fn go_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// HTML-escaped text of the arguments
pub fn html(args: Rest<Value>) -> String {
    let mut out = String::new();
    for c in print(args).chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

/// JavaScript-escaped text of the arguments
pub fn js(args: Rest<Value>) -> String {
    let mut out = String::new();
    for c in print(args).chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Query-escaped text of the arguments
pub fn urlquery(args: Rest<Value>) -> String {
    let mut out = String::new();
    for b in print(args).bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            b => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

// -------------------------------------------------------------------------
// Defaults and flow control
// -------------------------------------------------------------------------

/// `default DEFAULT GIVEN`: GIVEN unless it is empty
pub fn default(fallback: Value, given: Option<Value>) -> Value {
    match given {
        Some(v) if v.is_true() => v,
        _ => fallback,
    }
}

/// `required MESSAGE VALUE`: fail with MESSAGE when VALUE is nil or ""
pub fn required(message: String, value: Option<Value>) -> Result<Value, Error> {
    match value {
        Some(v) if v.is_undefined() || v.is_none() || v.as_str() == Some("") => Err(invalid(message)),
        Some(v) => Ok(v),
        None => Err(invalid(message)),
    }
}

/// Whether a value is its type's zero value
pub fn empty(value: Option<Value>) -> bool {
    value.is_none_or(|v| !v.is_true())
}

/// Return the first non-empty value
pub fn coalesce(args: Rest<Value>) -> Value {
    args.iter()
        .find(|arg| arg.is_true())
        .cloned()
        .unwrap_or_else(|| Value::from(()))
}

/// `ternary TRUE FALSE CONDITION`
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}

/// Fail with a custom error message
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

// -------------------------------------------------------------------------
// Collections
// -------------------------------------------------------------------------

/// Create a list from values
pub fn list(args: Rest<Value>) -> Value {
    Value::from(args.0)
}

/// Create a dict from key-value pairs; keys are stringified
pub fn dict(args: Rest<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(invalid("dict requires an even number of arguments (key-value pairs)"));
    }
    Ok(Value::from_iter(
        args.chunks(2)
            .map(|pair| (text(&pair[0]), pair[1].clone())),
    ))
}

fn require_map(name: &str, value: &Value) -> Result<(), Error> {
    if value.kind() == ValueKind::Map {
        Ok(())
    } else {
        Err(invalid(format!("{name} requires a dict, got {}", go_type_name(value))))
    }
}

/// `get DICT KEY`: the value at KEY, or "" when absent
pub fn get(dict: Value, key: String) -> Result<Value, Error> {
    require_map("get", &dict)?;
    let found = dict.get_item(&Value::from(key))?;
    Ok(if found.is_undefined() { Value::from("") } else { found })
}

/// `set DICT KEY VALUE`: a copy of DICT with KEY bound to VALUE
pub fn set(dict: Value, key: String, val: Value) -> Result<Value, Error> {
    require_map("set", &dict)?;
    let mut entries: Vec<(String, Value)> = sorted_entries(&dict)
        .into_iter()
        .map(|(k, v)| (text(&k), v))
        .filter(|(k, _)| *k != key)
        .collect();
    entries.push((key, val));
    Ok(Value::from_iter(entries))
}

/// `unset DICT KEY`: a copy of DICT without KEY
pub fn unset(dict: Value, key: String) -> Result<Value, Error> {
    require_map("unset", &dict)?;
    Ok(Value::from_iter(
        sorted_entries(&dict)
            .into_iter()
            .map(|(k, v)| (text(&k), v))
            .filter(|(k, _)| *k != key),
    ))
}

/// `hasKey DICT KEY`
pub fn has_key(dict: Value, key: String) -> Result<bool, Error> {
    require_map("hasKey", &dict)?;
    Ok(!dict.get_item(&Value::from(key))?.is_undefined())
}

/// `keys DICT...`: all keys, sorted
pub fn keys(dicts: Rest<Value>) -> Result<Vec<String>, Error> {
    let mut all = Vec::new();
    for dict in dicts.iter() {
        require_map("keys", dict)?;
        all.extend(map_keys(dict));
    }
    all.sort();
    Ok(all)
}

/// `merge DEST SRC...`: fill keys missing from DEST with those of each SRC
///
/// DEST takes precedence; nested maps are merged recursively.
pub fn merge(dest: Value, sources: Rest<Value>) -> Result<Value, Error> {
    let mut merged = to_json(&dest)?;
    if !merged.is_object() {
        return Err(invalid(format!("merge requires a dict, got {}", go_type_name(&dest))));
    }
    for source in sources.iter() {
        fill_missing(&mut merged, &to_json(source)?);
    }
    Ok(Value::from_serialize(&merged))
}

fn fill_missing(base: &mut serde_json::Value, source: &serde_json::Value) {
    if let (serde_json::Value::Object(base_map), serde_json::Value::Object(source_map)) = (base, source) {
        for (key, value) in source_map {
            match base_map.get_mut(key) {
                Some(existing) => fill_missing(existing, value),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// `dig KEY... DEFAULT DICT`: nested lookup with a fallback
pub fn dig(args: Rest<Value>) -> Result<Value, Error> {
    let [keys @ .., default, dict] = args.as_slice() else {
        return Err(invalid("dig requires at least one key, a default and a dict"));
    };
    if keys.is_empty() {
        return Err(invalid("dig requires at least one key, a default and a dict"));
    }

    let mut current = dict.clone();
    for key in keys {
        if current.kind() != ValueKind::Map {
            return Ok(default.clone());
        }
        let next = current.get_item(key)?;
        if next.is_undefined() {
            return Ok(default.clone());
        }
        current = next;
    }
    Ok(current)
}

/// First element of a list, or nil
pub fn first(list: Value) -> Result<Value, Error> {
    Ok(sequence("first", &list)?.into_iter().next().unwrap_or_else(|| Value::from(())))
}

/// Last element of a list, or nil
pub fn last(list: Value) -> Result<Value, Error> {
    Ok(sequence("last", &list)?.pop().unwrap_or_else(|| Value::from(())))
}

fn sequence(name: &str, value: &Value) -> Result<Vec<Value>, Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(Vec::new()),
        ValueKind::Seq | ValueKind::Iterable => Ok(value.try_iter()?.collect()),
        _ => Err(invalid(format!("{name} requires a list, got {}", go_type_name(value)))),
    }
}

// -------------------------------------------------------------------------
// Conversion
// -------------------------------------------------------------------------

/// Convert a value to its string representation
pub fn to_string(value: Value) -> String {
    go_string(&value)
}

/// Convert every element of a list to a string
pub fn to_strings(value: Value) -> Vec<String> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Vec::new(),
        ValueKind::Seq | ValueKind::Iterable => value
            .try_iter()
            .map(|iter| iter.map(|v| go_string(&v)).collect())
            .unwrap_or_default(),
        _ => vec![go_string(&value)],
    }
}

/// Integer conversion; unconvertible values become 0
pub(crate) fn to_int(value: &Value) -> i64 {
    match value.kind() {
        ValueKind::Number => value
            .as_i64()
            .unwrap_or_else(|| f64::try_from(value.clone()).map(|f| f as i64).unwrap_or(0)),
        ValueKind::String => {
            let s = value.as_str().unwrap_or_default().trim();
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                .unwrap_or(0)
        }
        ValueKind::Bool => i64::from(value.is_true()),
        _ => 0,
    }
}

/// Float conversion; unconvertible values become 0.0
pub(crate) fn to_float(value: &Value) -> f64 {
    match value.kind() {
        ValueKind::Number => f64::try_from(value.clone()).unwrap_or(0.0),
        ValueKind::String => value.as_str().unwrap_or_default().trim().parse().unwrap_or(0.0),
        ValueKind::Bool => {
            if value.is_true() {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// `atoi STRING`: 0 when the string is not an integer
pub fn atoi(value: String) -> i64 {
    value.trim().parse().unwrap_or(0)
}

pub fn int(value: Value) -> i64 {
    to_int(&value)
}

pub fn float64(value: Value) -> f64 {
    to_float(&value)
}

// -------------------------------------------------------------------------
// Math (integer arithmetic)
// -------------------------------------------------------------------------

pub fn add(args: Rest<Value>) -> i64 {
    args.iter().map(to_int).fold(0i64, i64::wrapping_add)
}

pub fn sub(a: Value, b: Value) -> i64 {
    to_int(&a).wrapping_sub(to_int(&b))
}

pub fn mul(args: Rest<Value>) -> i64 {
    args.iter().map(to_int).fold(1i64, i64::wrapping_mul)
}

pub fn div(a: Value, b: Value) -> Result<i64, Error> {
    to_int(&a)
        .checked_div(to_int(&b))
        .ok_or_else(|| invalid("integer divide by zero"))
}

pub fn modulo(a: Value, b: Value) -> Result<i64, Error> {
    to_int(&a)
        .checked_rem(to_int(&b))
        .ok_or_else(|| invalid("integer divide by zero"))
}

pub fn max(first: Value, rest: Rest<Value>) -> i64 {
    rest.iter().map(to_int).fold(to_int(&first), i64::max)
}

pub fn min(first: Value, rest: Rest<Value>) -> i64 {
    rest.iter().map(to_int).fold(to_int(&first), i64::min)
}

// -------------------------------------------------------------------------
// Misc
// -------------------------------------------------------------------------

/// Get current timestamp
pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `semverCompare CONSTRAINT VERSION`
///
/// Accepts a leading `v` and Kubernetes-style pre-release suffixes such as
/// `1.31.0-0` on both sides.
pub fn semver_compare(constraint: String, version: String) -> Result<bool, Error> {
    let version_clean = version.trim().trim_start_matches('v');

    let parsed_version = match Version::parse(version_clean) {
        Ok(v) => v,
        Err(_) => {
            let parts: Vec<u64> = version_clean
                .split('-')
                .next()
                .unwrap_or(version_clean)
                .split('.')
                .map(|p| p.parse().unwrap_or(0))
                .collect();
            match parts.as_slice() {
                [major, minor, patch, ..] => Version::new(*major, *minor, *patch),
                [major, minor] => Version::new(*major, *minor, 0),
                _ => return Err(invalid(format!("invalid semantic version: {version}"))),
            }
        }
    };

    let constraint_clean = constraint.trim();
    let req = VersionReq::parse(constraint_clean)
        .or_else(|_| VersionReq::parse(constraint_clean.split('-').next().unwrap_or(constraint_clean)))
        .map_err(|e| invalid(format!("invalid constraint '{constraint}': {e}")))?;

    Ok(req.matches(&parsed_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: serde_json::Value) -> Value {
        Value::from_serialize(&v)
    }

    #[test]
    fn test_go_string() {
        assert_eq!(go_string(&Value::from("x")), "x");
        assert_eq!(go_string(&Value::from(3)), "3");
        assert_eq!(go_string(&Value::from(1.5)), "1.5");
        assert_eq!(go_string(&Value::from(2.0)), "2");
        assert_eq!(go_string(&Value::from(())), "<nil>");
        assert_eq!(go_string(&map(json!({"b": 2, "a": [1, null]}))), "map[a:[1 <nil>] b:2]");
        assert_eq!(go_string(&Value::from(true)), "true");
        assert_eq!(go_string(&map(json!({"k": [false]}))), "map[k:[false]]");
    }

    #[test]
    fn test_go_string_wide_integers() {
        assert_eq!(go_string(&Value::from(u64::MAX)), "18446744073709551615");
        assert_eq!(go_string(&Value::from(i128::MIN)), i128::MIN.to_string());
        assert_eq!(go_string(&Value::from(1e20)), "1e+20");
    }

    #[test]
    fn test_go_float() {
        assert_eq!(go_float(0.1), "0.1");
        assert_eq!(go_float(1e21), "1e+21");
        assert_eq!(go_float(1.5e-7), "1.5e-07");
        assert_eq!(go_float(0.0), "0");
    }

    #[test]
    fn test_field_strict_missing_key() {
        let field = field_accessor(true);
        let data = map(json!({"image": {"name": "nginx"}}));

        let found = field(data.clone(), Rest(vec!["image".into(), "name".into()])).unwrap();
        assert_eq!(found.as_str(), Some("nginx"));

        let err = field(data, Rest(vec!["missing".into()])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedError);
        assert_eq!(err.detail(), Some("map has no entry for key \"missing\""));
        let source = std::error::Error::source(&err)
            .and_then(|s| s.downcast_ref::<MissingKeyError>())
            .unwrap();
        assert_eq!(source.available, vec!["image".to_string()]);
    }

    #[test]
    fn test_field_lenient_chains_through_missing() {
        let field = field_accessor(false);
        let data = map(json!({}));
        let found = field(data, Rest(vec!["a".into(), "b".into(), "c".into()])).unwrap();
        assert!(found.is_undefined());
    }

    #[test]
    fn test_field_on_scalar_fails_in_both_modes() {
        for strict in [true, false] {
            let err = field_accessor(strict)(map(json!({"a": "s"})), Rest(vec!["a".into(), "b".into()])).unwrap_err();
            assert_eq!(err.detail(), Some("can't evaluate field b in type string"));
        }
    }

    #[test]
    fn test_field_null_value_is_present() {
        let found = field_accessor(true)(map(json!({"a": null})), Rest(vec!["a".into()])).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_range_values() {
        let values = range_values(map(json!({"b": 2, "a": 1}))).unwrap();
        assert_eq!(go_string(&values), "[1 2]");
        assert_eq!(go_string(&range_values(Value::from(3)).unwrap()), "[0 1 2]");
        assert_eq!(range_values(Value::UNDEFINED).unwrap().len(), Some(0));
        assert!(range_values(Value::from("abc")).is_err());
    }

    #[test]
    fn test_range_entries() {
        let entries = range_entries(map(json!({"b": 2, "a": 1}))).unwrap();
        assert_eq!(go_string(&entries), "[[a 1] [b 2]]");
        let entries = range_entries(map(json!(["x", "y"]))).unwrap();
        assert_eq!(go_string(&entries), "[[0 x] [1 y]]");
    }

    #[test]
    fn test_comparisons() {
        assert!(eq(Value::from(1), Rest(vec![Value::from(2), Value::from(1)])).unwrap());
        assert!(eq(Value::from(1), Rest(vec![Value::from(1.0)])).unwrap());
        assert!(eq(Value::from(1), Rest(vec![])).is_err());
        assert!(ne(Value::from("a"), Value::from("b")));
        assert!(lt(Value::from(1), Value::from(2)).unwrap());
        assert!(ge(Value::from("b"), Value::from("a")).unwrap());
        assert!(lt(Value::from(1), Value::from("a")).is_err());
    }

    #[test]
    fn test_len_and_index() {
        assert_eq!(len(Value::from("héllo")).unwrap(), 6);
        assert_eq!(len(map(json!([1, 2]))).unwrap(), 2);
        assert!(len(Value::from(3)).is_err());

        let data = map(json!({"a": {"b": [10, 20]}}));
        let found = index(data.clone(), Rest(vec![Value::from("a"), Value::from("b"), Value::from(1)])).unwrap();
        assert_eq!(found.as_i64(), Some(20));
        assert!(index(data.clone(), Rest(vec![Value::from("zz")])).unwrap().is_none());
        assert!(index(data, Rest(vec![Value::from("a"), Value::from("b"), Value::from(5)])).is_err());
    }

    #[test]
    fn test_slice() {
        assert_eq!(slice(Value::from("hello"), Rest(vec![Value::from(1), Value::from(3)])).unwrap().as_str(), Some("el"));
        let items = slice(map(json!([1, 2, 3])), Rest(vec![Value::from(1)])).unwrap();
        assert_eq!(go_string(&items), "[2 3]");
        assert!(slice(Value::from("ab"), Rest(vec![Value::from(3)])).is_err());
    }

    #[test]
    fn test_print_spacing() {
        assert_eq!(print(Rest(vec![Value::from("a"), Value::from(1), Value::from(2)])), "a1 2");
        assert_eq!(println(Rest(vec![Value::from("a"), Value::from(1)])), "a 1\n");
    }

    #[test]
    fn test_sprintf() {
        let args = [Value::from("x"), Value::from(42), Value::from(3.14159)];
        assert_eq!(sprintf("%s-%d-%.2f", &args), "x-42-3.14");
        assert_eq!(sprintf("%5d|%-4s|%05d", &[Value::from(7), Value::from("ab"), Value::from(-3)]), "    7|ab  |-0003");
        assert_eq!(sprintf("%q %t %x %%", &[Value::from("a\"b"), Value::from(true), Value::from(255)]), "\"a\\\"b\" true ff %");
        assert_eq!(sprintf("%d %d", &[Value::from(1)]), "1 %!d(MISSING)");
        assert_eq!(sprintf("%v", &[Value::from(1), Value::from("z")]), "1%!(EXTRA string=z)");
        assert_eq!(sprintf("%d", &[Value::from("s")]), "%!d(string=s)");
    }

    #[test]
    fn test_escapers() {
        assert_eq!(html(Rest(vec![Value::from("<a href=\"x\">&</a>")])), "&lt;a href=&#34;x&#34;&gt;&amp;&lt;/a&gt;");
        assert_eq!(js(Rest(vec![Value::from("it's <b>")])), "it\\'s \\u003Cb\\u003E");
        assert_eq!(urlquery(Rest(vec![Value::from("a b&c")])), "a+b%26c");
    }

    #[test]
    fn test_default_and_empty() {
        assert_eq!(default(Value::from("d"), Some(Value::from(""))).as_str(), Some("d"));
        assert_eq!(default(Value::from("d"), None).as_str(), Some("d"));
        assert_eq!(default(Value::from("d"), Some(Value::from("x"))).as_str(), Some("x"));
        assert!(empty(Some(Value::from(0))));
        assert!(empty(Some(map(json!({})))));
        assert!(empty(None));
        assert!(!empty(Some(Value::from("x"))));
    }

    #[test]
    fn test_required() {
        assert!(required("need it".into(), Some(Value::from("x"))).is_ok());
        let err = required("need it".into(), Some(Value::UNDEFINED)).unwrap_err();
        assert_eq!(err.detail(), Some("need it"));
        assert!(required("need it".into(), Some(Value::from(""))).is_err());
    }

    #[test]
    fn test_coalesce_and_ternary() {
        let picked = coalesce(Rest(vec![Value::from(""), Value::UNDEFINED, Value::from("x")]));
        assert_eq!(picked.as_str(), Some("x"));
        assert!(coalesce(Rest(vec![])).is_none());
        assert_eq!(ternary(Value::from(1), Value::from(2), Value::from(false)).as_i64(), Some(2));
    }

    #[test]
    fn test_dict_set_unset() {
        let d = dict(Rest(vec![Value::from("a"), Value::from(1), Value::from(2), Value::from("two")])).unwrap();
        assert_eq!(go_string(&d), "map[2:two a:1]");
        assert!(dict(Rest(vec![Value::from("a")])).is_err());

        let d2 = set(d.clone(), "b".into(), Value::from(3)).unwrap();
        assert!(has_key(d2.clone(), "b".into()).unwrap());
        assert!(!has_key(d.clone(), "b".into()).unwrap());

        let d3 = unset(d2, "a".into()).unwrap();
        assert_eq!(keys(Rest(vec![d3])).unwrap(), vec!["2", "b"]);
        assert_eq!(get(d, "zz".into()).unwrap().as_str(), Some(""));
    }

    #[test]
    fn test_merge_keeps_destination() {
        let merged = merge(
            map(json!({"a": 1, "n": {"x": 1}})),
            Rest(vec![map(json!({"a": 2, "b": 3, "n": {"x": 2, "y": 2}}))]),
        )
        .unwrap();
        assert_eq!(go_string(&merged), "map[a:1 b:3 n:map[x:1 y:2]]");
    }

    #[test]
    fn test_dig() {
        let data = map(json!({"a": {"b": {"c": "found"}}}));
        let args = vec![Value::from("a"), Value::from("b"), Value::from("c"), Value::from("dflt"), data.clone()];
        assert_eq!(dig(Rest(args)).unwrap().as_str(), Some("found"));
        let args = vec![Value::from("a"), Value::from("x"), Value::from("dflt"), data];
        assert_eq!(dig(Rest(args)).unwrap().as_str(), Some("dflt"));
        assert!(dig(Rest(vec![Value::from("x")])).is_err());
    }

    #[test]
    fn test_first_last() {
        let items = map(json!([1, 2, 3]));
        assert_eq!(first(items.clone()).unwrap().as_i64(), Some(1));
        assert_eq!(last(items).unwrap().as_i64(), Some(3));
        assert!(first(map(json!([]))).unwrap().is_none());
        assert!(first(Value::from(1)).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(to_string(Value::from(5)), "5");
        assert_eq!(to_strings(map(json!([1, "a", null]))), vec!["1", "a", "<nil>"]);
        assert_eq!(atoi("42".into()), 42);
        assert_eq!(atoi("nope".into()), 0);
        assert_eq!(int(Value::from("7.9")), 7);
        assert_eq!(int(Value::from(true)), 1);
        assert_eq!(float64(Value::from("2.5")), 2.5);
    }

    #[test]
    fn test_math() {
        assert_eq!(add(Rest(vec![Value::from(1), Value::from("2"), Value::from(3)])), 6);
        assert_eq!(sub(Value::from(5), Value::from(7)), -2);
        assert_eq!(mul(Rest(vec![Value::from(2), Value::from(3)])), 6);
        assert_eq!(div(Value::from(7), Value::from(2)).unwrap(), 3);
        assert!(div(Value::from(1), Value::from(0)).is_err());
        assert_eq!(modulo(Value::from(7), Value::from(3)).unwrap(), 1);
        assert_eq!(max(Value::from(1), Rest(vec![Value::from(9), Value::from(3)])), 9);
        assert_eq!(min(Value::from(1), Rest(vec![Value::from(-9)])), -9);
    }

    #[test]
    fn test_semver_compare() {
        assert!(semver_compare(">=1.21.0".into(), "v1.28.3".into()).unwrap());
        assert!(!semver_compare("<1.0.0".into(), "1.2.0".into()).unwrap());
        assert!(semver_compare(">=1.31.0-0".into(), "1.31.0".into()).unwrap());
        assert!(semver_compare(">=1.0".into(), "bogus".into()).is_err());
    }
}
