//! Runtime value type for VEIL.
//!
//! VEIL borrows its operator semantics from the browser host it was first
//! embedded in: `+` concatenates as soon as a string is involved, numbers are
//! IEEE doubles, and comparisons coerce loosely unless `===` is used.

use std::cmp::Ordering;
use std::fmt;

/// A VEIL runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Null,
    #[default]
    Undefined,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(x) => write!(f, "{}", format_number(*x)),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => f.write_str("null"),
            Value::Undefined => f.write_str("undefined"),
        }
    }
}

/// Format a number the way the host prints it: no trailing `.0` on
/// integral values, named non-finite values, and exponent notation outside
/// `1e-6 <= |x| < 1e21`.
fn format_number(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_owned()
    } else if x.is_infinite() {
        if x > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if x == 0.0 {
        // Covers -0 as well.
        "0".to_owned()
    } else if !(1e-6..1e21).contains(&x.abs()) {
        // Rust omits the sign of a positive exponent.
        let s = format!("{x:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        }
    } else if x.fract() == 0.0 {
        format!("{x:.0}")
    } else {
        format!("{x}")
    }
}

/// Parse a string the way the host's `Number()` does: surrounding whitespace
/// is ignored, an empty string is zero, anything unparseable is NaN.
fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf"/"nan" spellings the host does not.
        _ if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => t.parse().unwrap_or(f64::NAN),
    }
}

impl Value {
    /// Truthiness: `false`, `0`, `NaN`, `""`, `null` and `undefined` are falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Number(x) => *x != 0.0 && !x.is_nan(),
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Null | Value::Undefined => false,
        }
    }

    /// Numeric conversion.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(x) => *x,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Str(s) => parse_number(s),
            Value::Null => 0.0,
            Value::Undefined => f64::NAN,
        }
    }

    /// Name of the type, as printed by `dump` and returned by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            // `typeof null` is "object" in the host; VEIL reports it honestly.
            Value::Null => "null",
            Value::Undefined => "undefined",
        }
    }

    /// Type-preserving literal form, e.g. `"a\"b"` for strings and `4` for
    /// numbers.  Re-lexing the output yields an equal value.
    pub fn to_literal(&self) -> String {
        match self {
            Value::Str(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}")),
            other => other.to_string(),
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────

    pub fn add(&self, rhs: &Value) -> Value {
        if matches!(self, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
            Value::Str(format!("{self}{rhs}"))
        } else {
            Value::Number(self.as_number() + rhs.as_number())
        }
    }

    pub fn sub(&self, rhs: &Value) -> Value {
        Value::Number(self.as_number() - rhs.as_number())
    }

    pub fn mul(&self, rhs: &Value) -> Value {
        Value::Number(self.as_number() * rhs.as_number())
    }

    /// Division never fails: `x / 0` is ±Infinity and `0 / 0` is NaN.
    pub fn div(&self, rhs: &Value) -> Value {
        Value::Number(self.as_number() / rhs.as_number())
    }

    pub fn rem(&self, rhs: &Value) -> Value {
        Value::Number(self.as_number() % rhs.as_number())
    }

    pub fn pow(&self, rhs: &Value) -> Value {
        Value::Number(self.as_number().powf(rhs.as_number()))
    }

    pub fn neg(&self) -> Value {
        Value::Number(-self.as_number())
    }

    // ── Comparison ────────────────────────────────────────────────────────────

    /// Relational comparison.  `None` when either side converts to NaN, in
    /// which case every relational operator is false.
    pub fn compare(&self, rhs: &Value) -> Option<Ordering> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => self.as_number().partial_cmp(&rhs.as_number()),
        }
    }

    /// Strict equality (`===`): same type and same value.
    pub fn strict_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
            _ => false,
        }
    }

    /// Loose equality (`==`).
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
            (Value::Null | Value::Undefined, _) | (_, Value::Null | Value::Undefined) => false,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => self.as_number() == rhs.as_number(),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Number(x)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
