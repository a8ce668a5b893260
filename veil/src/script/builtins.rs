//! Built-in functions callable from VEIL expressions.
//!
//! Each function receives already-evaluated arguments.  Missing arguments
//! read as `undefined`, mirroring the host's calling convention.

use super::value::Value;

/// Dispatch a built-in function call.
///
/// Returns `None` if `name` is not a built-in.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    Some(match name {
        // ── Conversions ──────────────────────────────────────────────────────
        "String" => Value::Str(arg(0).to_string()),
        "Number" => Value::Number(if args.is_empty() { 0.0 } else { arg(0).as_number() }),
        "Boolean" => Value::Bool(arg(0).as_bool()),

        // ── String functions ─────────────────────────────────────────────────
        "len" => Value::Number(arg(0).to_string().chars().count() as f64),
        "upper" => Value::Str(arg(0).to_string().to_uppercase()),
        "lower" => Value::Str(arg(0).to_string().to_lowercase()),
        "trim" => Value::Str(arg(0).to_string().trim().to_owned()),
        _ => return None,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
