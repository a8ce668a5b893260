//! Escaping for values written into the host document.

use super::value::Value;

/// Escape `<` and `>` in string values.  Other values pass through unchanged.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(escape_angle_brackets(&s)),
        other => other,
    }
}

pub fn escape_angle_brackets(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
