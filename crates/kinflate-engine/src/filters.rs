//! Template filters
//!
//! The chart-oriented filters templates rely on (`toyaml`, `nindent`,
//! `b64encode`, ...) on top of the MiniJinja builtins.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use sha2::{Digest, Sha256};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

/// String content of a value, without quotes for strings
fn text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// `{{ values.resources | toyaml }}`
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// `{{ values.config | tojson }}`
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| invalid(format!("base64 decode: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| invalid(format!("base64 decode: {}", e)))
}

/// Double-quote, escaping backslashes and quotes
pub fn quote(value: Value) -> String {
    let s = text(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Single-quote the YAML way
pub fn squote(value: Value) -> String {
    format!("'{}'", text(&value).replace('\'', "''"))
}

/// Indent every non-empty line by `spaces`
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like [`indent`], starting on a new line
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Fail rendering when the value is undefined, null or an empty string
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined() || value.is_none() || value.as_str() == Some("");
    if missing {
        return Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ));
    }
    Ok(value)
}

/// Undefined, null, or a zero-length string/sequence/mapping
pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    match value.as_str() {
        Some(s) => s.is_empty(),
        None => value.len() == Some(0),
    }
}

pub fn haskey(value: Value, key: String) -> bool {
    value.get_attr(&key).is_ok_and(|v| !v.is_undefined())
}

/// Truncate to at most `length` characters
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(prefix.as_str()).unwrap_or(&value).to_string()
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(suffix.as_str()).unwrap_or(&value).to_string()
}

/// Hex sha256 of a string, e.g. for checksum annotations
pub fn sha256sum(value: String) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml_and_tojson() {
        let value = Value::from_serialize(serde_json::json!({"b": [1, 2], "a": "x"}));
        let yaml = toyaml(value.clone()).unwrap();
        assert!(yaml.contains("a: x"));
        assert!(yaml.contains("- 1"));
        assert!(!yaml.ends_with('\n'));
        assert_eq!(tojson(Value::from(vec![1, 2])).unwrap(), "[1,2]");
    }

    #[test]
    fn test_indentation() {
        assert_eq!(indent("a: 1\n\nb: 2".into(), 2), "  a: 1\n\n  b: 2");
        assert_eq!(nindent("a: 1".into(), 4), "\n    a: 1");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote(Value::from("say \"hi\"")), r#""say \"hi\"""#);
        assert_eq!(quote(Value::from(8080)), "\"8080\"");
        assert_eq!(squote(Value::from("it's")), "'it''s'");
    }

    #[test]
    fn test_base64() {
        assert_eq!(b64encode("admin".into()), "YWRtaW4=");
        assert_eq!(b64decode("YWRtaW4=".into()).unwrap(), "admin");
        assert!(b64decode("%%%".into()).is_err());
    }

    #[test]
    fn test_required_and_empty() {
        assert!(required(Value::UNDEFINED, Some("image.tag is required".into())).is_err());
        assert!(required(Value::from(""), None).is_err());
        assert_eq!(required(Value::from(0), None).unwrap(), Value::from(0));

        assert!(empty(Value::UNDEFINED));
        assert!(empty(Value::from("")));
        assert!(empty(Value::from(Vec::<i32>::new())));
        assert!(!empty(Value::from("x")));
        assert!(!empty(Value::from(false)));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(trunc("abcdef".into(), 3), "abc");
        assert_eq!(trunc("ab".into(), 3), "ab");
        assert_eq!(trimprefix("v1.2.3".into(), "v".into()), "1.2.3");
        assert_eq!(trimsuffix("app.yaml".into(), ".yaml".into()), "app");
        assert_eq!(sha256sum("".into()).len(), 64);
    }
}
