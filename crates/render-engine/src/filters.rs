//! String, encoding and hashing functions
//!
//! Sprig-compatible helpers. Arguments follow Go order, so the string being
//! transformed comes last and can be piped in.

use base64::Engine as _;
use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, Value};
use regex::Regex;

use crate::functions::{go_quote, text, to_int, to_json};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

pub fn upper(value: Value) -> String {
    text(&value).to_uppercase()
}

pub fn lower(value: Value) -> String {
    text(&value).to_lowercase()
}

/// Uppercase the first letter of every word
pub fn title(value: Value) -> String {
    let mut result = String::new();
    let mut at_word_start = true;
    for c in text(&value).chars() {
        if at_word_start && c.is_alphabetic() {
            result.extend(c.to_uppercase());
        } else {
            result.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    result
}

pub fn trim(value: Value) -> String {
    text(&value).trim().to_string()
}

/// Usage: {{ .name | trimPrefix "v" }}
pub fn trim_prefix(prefix: String, value: Value) -> String {
    let s = text(&value);
    s.strip_prefix(&prefix).unwrap_or(&s).to_string()
}

/// Usage: {{ .file | trimSuffix ".yaml" }}
pub fn trim_suffix(suffix: String, value: Value) -> String {
    let s = text(&value);
    s.strip_suffix(&suffix).unwrap_or(&s).to_string()
}

/// Truncate a string; a negative length keeps the end instead
///
/// Usage: {{ .name | trunc 63 }}
pub fn trunc(length: Value, value: Value) -> String {
    let s = text(&value);
    let length = to_int(&length);
    let count = s.chars().count();
    if length >= 0 {
        s.chars().take(length as usize).collect()
    } else {
        let keep = length.unsigned_abs() as usize;
        s.chars().skip(count.saturating_sub(keep)).collect()
    }
}

/// Double-quote each argument; nil arguments are skipped
///
/// Usage: {{ .name | quote }}
pub fn quote(args: Rest<Value>) -> String {
    args.iter()
        .filter(|v| !v.is_undefined() && !v.is_none())
        .map(|v| go_quote(&text(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-quote each argument; nil arguments are skipped
///
/// Usage: {{ .name | squote }}
pub fn squote(args: Rest<Value>) -> String {
    args.iter()
        .filter(|v| !v.is_undefined() && !v.is_none())
        .map(|v| format!("'{}'", text(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Usage: {{ .name | replace "-" "_" }}
pub fn replace(old: String, new: String, value: Value) -> String {
    text(&value).replace(&old, &new)
}

pub fn contains(needle: String, value: Value) -> bool {
    text(&value).contains(&needle)
}

pub fn has_prefix(prefix: String, value: Value) -> bool {
    text(&value).starts_with(&prefix)
}

pub fn has_suffix(suffix: String, value: Value) -> bool {
    text(&value).ends_with(&suffix)
}

pub fn repeat(count: Value, value: Value) -> String {
    text(&value).repeat(usize::try_from(to_int(&count)).unwrap_or(0))
}

/// Split into a map keyed `_0`, `_1`, ...
///
/// Usage: {{ (split "," .list)._0 }}
pub fn split(separator: String, value: Value) -> Value {
    let s = text(&value);
    Value::from_iter(
        s.split(separator.as_str())
            .enumerate()
            .map(|(i, part)| (format!("_{i}"), Value::from(part))),
    )
}

/// Join list elements with a separator; nil elements are skipped
///
/// Usage: {{ .items | join "," }}
pub fn join(separator: String, list: Value) -> String {
    match list.try_iter() {
        Ok(iter) if list.kind() != minijinja::value::ValueKind::String => iter
            .filter(|v| !v.is_undefined() && !v.is_none())
            .map(|v| text(&v))
            .collect::<Vec<_>>()
            .join(&separator),
        _ => text(&list),
    }
}

/// Indent every line, including the first
///
/// Usage: {{ .config | toYaml | indent 4 }}
pub fn indent(spaces: Value, value: Value) -> String {
    let pad = " ".repeat(usize::try_from(to_int(&spaces)).unwrap_or(0));
    let s = text(&value);
    // Pre-allocate: one pad per line
    let mut result = String::with_capacity(s.len() + pad.len() * (s.lines().count() + 1));
    result.push_str(&pad);
    result.push_str(&s.replace('\n', &format!("\n{pad}")));
    result
}

/// Indent with a newline prefix
///
/// Usage: {{ .config | toYaml | nindent 4 }}
pub fn nindent(spaces: Value, value: Value) -> String {
    format!("\n{}", indent(spaces, value))
}

/// Convert to snake_case
pub fn snakecase(value: Value) -> String {
    let value = text(&value);
    // Pre-allocate with extra space for potential underscores
    let mut result = String::with_capacity(value.len() + value.len() / 4);
    let mut prev_upper = false;

    for (i, c) in value.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !prev_upper {
                result.push('_');
            }
            result.extend(c.to_lowercase());
            prev_upper = true;
        } else if c == '-' || c == ' ' {
            result.push('_');
            prev_upper = false;
        } else {
            result.push(c);
            prev_upper = false;
        }
    }

    result
}

/// Convert to kebab-case
pub fn kebabcase(value: Value) -> String {
    snakecase(value).replace('_', "-")
}

fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|e| invalid(format!("invalid regular expression {pattern:?}: {e}")))
}

/// Usage: {{ regexMatch "^[a-z]+$" .name }}
pub fn regex_match(pattern: String, value: Value) -> Result<bool, Error> {
    Ok(compile(&pattern)?.is_match(&text(&value)))
}

/// Usage: {{ regexReplaceAll "a(x*)b" .input "${1}W" }}
///
/// `$1` and `${name}` in the replacement expand to capture groups.
pub fn regex_replace_all(pattern: String, value: Value, replacement: String) -> Result<String, Error> {
    Ok(compile(&pattern)?
        .replace_all(&text(&value), replacement.as_str())
        .into_owned())
}

/// Base64 encode a string
pub fn b64enc(value: Value) -> String {
    base64::engine::general_purpose::STANDARD.encode(text(&value).as_bytes())
}

/// Base64 decode a string
pub fn b64dec(value: Value) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(text(&value).as_bytes())
        .map_err(|e| invalid(format!("base64 decode: {e}")))?;

    String::from_utf8(decoded).map_err(|e| invalid(format!("base64 decode: {e}")))
}

/// Convert a value to YAML, without the trailing newline
///
/// Usage: {{ .config | toYaml }}
pub fn to_yaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end_matches('\n').to_string())
}

/// Parse a YAML document into a value
pub fn from_yaml(value: Value) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_yaml::from_str(&text(&value)).map_err(|e| invalid(e.to_string()))?;
    Ok(Value::from_serialize(&parsed))
}

/// Convert a value to compact JSON
pub fn to_json_string(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

/// Convert a value to pretty-printed JSON
pub fn to_pretty_json(value: Value) -> Result<String, Error> {
    serde_json::to_string_pretty(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

/// Parse a JSON document into a value
pub fn from_json(value: Value) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(&text(&value)).map_err(|e| invalid(e.to_string()))?;
    Ok(Value::from_serialize(&parsed))
}

/// SHA256 hash of a string, hex encoded
pub fn sha256sum(value: Value) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text(&value).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA1 hash of a string, hex encoded
pub fn sha1sum(value: Value) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(text(&value).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(upper(s("abc")), "ABC");
        assert_eq!(lower(s("ABC")), "abc");
        assert_eq!(title(s("hello wide world")), "Hello Wide World");
        assert_eq!(snakecase(s("camelCase")), "camel_case");
        assert_eq!(snakecase(s("PascalCase")), "pascal_case");
        assert_eq!(kebabcase(s("someName here")), "some-name-here");
    }

    #[test]
    fn test_trim_helpers() {
        assert_eq!(trim(s("  x \n")), "x");
        assert_eq!(trim_prefix("v".into(), s("v1.2")), "1.2");
        assert_eq!(trim_suffix(".yaml".into(), s("a.yaml")), "a");
        assert_eq!(trim_prefix("x".into(), s("v1.2")), "v1.2");
    }

    #[test]
    fn test_trunc() {
        assert_eq!(trunc(Value::from(3), s("hello")), "hel");
        assert_eq!(trunc(Value::from(10), s("hi")), "hi");
        assert_eq!(trunc(Value::from(-3), s("hello")), "llo");
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Rest(vec![s("test")])), "\"test\"");
        assert_eq!(quote(Rest(vec![s("a\"b"), Value::from(()), Value::from(1)])), "\"a\\\"b\" \"1\"");
        assert_eq!(squote(Rest(vec![s("test")])), "'test'");
    }

    #[test]
    fn test_predicates() {
        assert!(contains("ell".into(), s("hello")));
        assert!(has_prefix("he".into(), s("hello")));
        assert!(has_suffix("lo".into(), s("hello")));
        assert!(!has_suffix("he".into(), s("hello")));
    }

    #[test]
    fn test_replace_repeat() {
        assert_eq!(replace("-".into(), "_".into(), s("a-b-c")), "a_b_c");
        assert_eq!(repeat(Value::from(3), s("ab")), "ababab");
    }

    #[test]
    fn test_split_and_join() {
        let parts = split(",".into(), s("a,b"));
        assert_eq!(parts.get_attr("_0").unwrap().as_str(), Some("a"));
        assert_eq!(parts.get_attr("_1").unwrap().as_str(), Some("b"));

        let list = Value::from(vec![s("x"), Value::from(()), Value::from(2)]);
        assert_eq!(join("-".into(), list), "x-2");
        assert_eq!(join("-".into(), s("single")), "single");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent(Value::from(2), s("a\nb")), "  a\n  b");
        assert_eq!(nindent(Value::from(4), s("line1\nline2")), "\n    line1\n    line2");
    }

    #[test]
    fn test_regex() {
        assert!(regex_match("^[a-z]+$".into(), s("abc")).unwrap());
        assert!(!regex_match("^[a-z]+$".into(), s("ab1")).unwrap());
        assert_eq!(regex_replace_all("a(x*)b".into(), s("-ab-axxb-"), "${1}W".into()).unwrap(), "-W-xxW-");
        assert!(regex_match("(".into(), s("x")).is_err());
    }

    #[test]
    fn test_b64_roundtrip() {
        let encoded = b64enc(s("hello world"));
        assert_eq!(encoded, "aGVsbG8gd29ybGQ=");
        assert_eq!(b64dec(Value::from(encoded)).unwrap(), "hello world");
        assert!(b64dec(s("!!!")).is_err());
    }

    #[test]
    fn test_yaml_and_json() {
        let value = Value::from_serialize(serde_json::json!({"name": "test", "port": 8080}));
        insta::assert_snapshot!(to_yaml(value.clone()).unwrap(), @r"
        name: test
        port: 8080
        ");
        assert_eq!(to_json_string(value.clone()).unwrap(), r#"{"name":"test","port":8080}"#);
        assert!(to_pretty_json(value).unwrap().contains("\n  \"name\": \"test\""));

        let parsed = from_yaml(s("a:\n  b: 1\n")).unwrap();
        assert_eq!(parsed.get_attr("a").unwrap().get_attr("b").unwrap().as_i64(), Some(1));
        let parsed = from_json(s(r#"{"x": [1, 2]}"#)).unwrap();
        assert_eq!(parsed.get_attr("x").unwrap().len(), Some(2));
        assert!(from_json(s("{")).is_err());
    }

    #[test]
    fn test_hashes() {
        assert_eq!(
            sha256sum(s("abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha1sum(s("abc")), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
