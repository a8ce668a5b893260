//! Per-run variable store.
//!
//! Names beginning with [`RESERVED_PREFIX`] belong to the interpreter's own
//! bookkeeping and are invisible to scripts: identifier resolution and
//! template interpolation skip them, and scripts cannot assign them.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use super::value::Value;
use crate::error::EvalError;

/// Prefix marking interpreter bookkeeping entries.
pub const RESERVED_PREFIX: &str = "__";

/// Returns `true` for bookkeeping names.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Characters allowed in a variable name: ASCII letters, digits, `_`, `$`.
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Characters a variable name may start with.
pub fn is_name_start(c: char) -> bool {
    is_name_char(c) && !c.is_ascii_digit()
}

/// A declared type annotation (`let x: number = …`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclType {
    Number,
    String,
    Boolean,
    Null,
    Undefined,
    Any,
    /// An annotation VEIL does not know; values are stored unchanged.
    Other(String),
}

impl DeclType {
    pub fn parse(name: &str) -> Self {
        match name {
            "number" => DeclType::Number,
            "string" => DeclType::String,
            "boolean" | "bool" => DeclType::Boolean,
            "null" => DeclType::Null,
            "undefined" => DeclType::Undefined,
            "any" => DeclType::Any,
            other => DeclType::Other(other.to_owned()),
        }
    }

    /// Coerce `value` to this type where the conversion is decidable.
    pub fn coerce(&self, value: Value) -> Value {
        match self {
            DeclType::Number => Value::Number(value.as_number()),
            DeclType::String => match value {
                Value::Str(_) => value,
                other => Value::Str(other.to_string()),
            },
            DeclType::Boolean => Value::Bool(value.as_bool()),
            DeclType::Null => Value::Null,
            DeclType::Undefined => Value::Undefined,
            DeclType::Any | DeclType::Other(_) => value,
        }
    }
}

/// Variable store owned by one interpreter run.
#[derive(Debug, Default)]
pub struct VarStore {
    vars: HashMap<String, Value>,
    /// `__types`: declared annotation per variable.
    types: HashMap<String, DeclType>,
    /// `__consts`: names declared with `const`.
    consts: HashSet<String>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or redeclare) a variable, returning the stored value.
    ///
    /// The value is coerced to `ty` when one is given.  Redeclaring a
    /// `const` is an error; redeclaring a `let` overwrites it.
    pub fn declare(
        &mut self,
        name: &str,
        value: Value,
        ty: Option<DeclType>,
        constant: bool,
    ) -> Result<Value, EvalError> {
        if is_reserved(name) {
            return Err(EvalError::Reserved(name.to_owned()));
        }
        if self.consts.contains(name) {
            return Err(EvalError::ConstAssignment(name.to_owned()));
        }
        let value = match &ty {
            Some(DeclType::Other(t)) => {
                warn!(variable = name, annotation = %t, "unknown type annotation; value stored as-is");
                value
            }
            Some(t) => t.coerce(value),
            None => value,
        };
        match ty {
            Some(t) => {
                self.types.insert(name.to_owned(), t);
            }
            None => {
                self.types.remove(name);
            }
        }
        if constant {
            self.consts.insert(name.to_owned());
        }
        self.vars.insert(name.to_owned(), value.clone());
        Ok(value)
    }

    /// Assign to an existing variable, coercing to its declared type.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<Value, EvalError> {
        if is_reserved(name) {
            return Err(EvalError::Reserved(name.to_owned()));
        }
        if self.consts.contains(name) {
            return Err(EvalError::ConstAssignment(name.to_owned()));
        }
        let Some(slot) = self.vars.get_mut(name) else {
            return Err(EvalError::Undeclared(name.to_owned()));
        };
        let value = match self.types.get(name) {
            Some(t) => t.coerce(value),
            None => value,
        };
        *slot = value.clone();
        Ok(value)
    }

    /// Look up a user-visible variable.  Reserved names never resolve.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        if is_reserved(name) {
            return None;
        }
        self.vars.get(name)
    }

    /// The declared type of a variable, if it was annotated.
    pub fn declared_type(&self, name: &str) -> Option<&DeclType> {
        self.types.get(name)
    }

    pub fn is_const(&self, name: &str) -> bool {
        self.consts.contains(name)
    }

    /// Iterate over user variables (bookkeeping entries excluded).
    pub fn user_vars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
        self.types.clear();
        self.consts.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
