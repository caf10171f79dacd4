//! Template filters

use minijinja::{Error, ErrorKind, Value};

/// Fail if the value is undefined, naming the intent in the error
///
/// Usage: `${IMAGE | required}`
pub fn required(value: Value) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        Err(Error::new(ErrorKind::UndefinedError, "required value is undefined"))
    } else {
        Ok(value)
    }
}

/// Render a string as a YAML double-quoted scalar
///
/// Usage: `host: ${HOST | yaml_quote}` keeps values like `*.apps.example.com`
/// or `0.0.0.0/0` strings when the manifest is parsed.
pub fn yaml_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
