//! Global template functions

use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, State, Value};
use std::cell::Cell;

/// Nesting limit for `tpl`
const MAX_TPL_DEPTH: usize = 10;

thread_local! {
    // nested renders get a fresh `State`, so the depth lives outside of it
    static TPL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// `{{ fail("tls.secretName must be set") }}`
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// `{{ dict("app", name, "tier", "web") }}`
pub fn dict(Rest(args): Rest<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(invalid("dict requires key/value pairs"));
    }
    let mut map = serde_json::Map::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid("dict keys must be strings"))?;
        let value = serde_json::to_value(&pair[1]).map_err(|e| invalid(e.to_string()))?;
        map.insert(key.to_string(), value);
    }
    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

pub fn list(Rest(args): Rest<Value>) -> Value {
    Value::from(args)
}

/// `{{ get(values.ports, "http", 80) }}`
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// First argument that is defined, not null and not an empty string
pub fn coalesce(Rest(args): Rest<Value>) -> Value {
    args.into_iter()
        .find(|v| !v.is_undefined() && !v.is_none() && v.as_str() != Some(""))
        .unwrap_or(Value::UNDEFINED)
}

pub fn ternary(if_true: Value, if_false: Value, condition: Value) -> Value {
    if condition.is_true() { if_true } else { if_false }
}

/// `%s`, `%d`, `%v` and `%%` formatting
pub fn printf(format: String, Rest(args): Rest<Value>) -> Result<String, Error> {
    let mut out = String::with_capacity(format.len());
    let mut args = args.into_iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(spec @ ('s' | 'd' | 'v')) => {
                let arg = args
                    .next()
                    .ok_or_else(|| invalid(format!("printf: missing argument for %{}", spec)))?;
                if spec == 'd' && arg.as_i64().is_none() {
                    return Err(invalid(format!("printf: %d expects an integer, got {}", arg)));
                }
                match arg.as_str() {
                    Some(s) => out.push_str(s),
                    None => out.push_str(&arg.to_string()),
                }
            }
            Some(other) => return Err(invalid(format!("printf: unsupported verb %{}", other))),
            None => out.push('%'),
        }
    }
    Ok(out)
}

/// Render a string from values as a template against `context`
///
/// `{{ tpl(values.hostTemplate, {"release": release}) }}`
pub fn tpl(state: &State, template: String, context: Value) -> Result<String, Error> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template);
    }

    let level = TPL_DEPTH.with(|d| {
        d.set(d.get() + 1);
        d.get()
    });
    let result = if level > MAX_TPL_DEPTH {
        Err(invalid(format!(
            "tpl nested deeper than {} levels, values reference each other",
            MAX_TPL_DEPTH
        )))
    } else {
        state.env().render_str(&template, context)
    };
    TPL_DEPTH.with(|d| d.set(d.get() - 1));
    result
}
