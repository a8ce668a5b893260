//! The VEIL scripting language.
//!
//! VEIL statements are recognised by textual triggers (`let`, `print(`,
//! `if (`, `}`) loaded from a function registry rather than by a grammar.
//! This module covers:
//!
//! - Segmenting script text into logical statements ([`segment`])
//! - Tracking `if` / `elseif` / `else` blocks ([`control`])
//! - Loading triggers and binding them to built-in handlers ([`registry`], [`handlers`])
//! - Expressions: literals, templates, operators, built-in calls ([`expr`])
//! - Per-run variables with declared types and constants ([`store`])
//!
//! # Quick start
//!
//! ```rust
//! use veil::output::BufferSink;
//! use veil::script::Interpreter;
//!
//! let interp = Interpreter::with_builtins();
//! let mut sink = BufferSink::new();
//! interp.run("let x = 6;\nprint(`x is ${x}`);\nprint(x * 7);", &mut sink);
//! assert_eq!(sink.console, vec!["x is 6", "42"]);
//! ```

pub mod builtins;
pub mod context;
pub mod control;
pub mod expr;
pub mod handlers;
pub mod interp;
pub mod registry;
pub mod sanitize;
pub mod segment;
pub mod store;
pub mod value;

// Re-exports for convenience.
pub use context::RunContext;
pub use expr::{EvalContext, Evaluator};
pub use handlers::HandlerKind;
pub use interp::{Interpreter, RunReport};
pub use registry::{FunctionDef, FunctionSource, Registry};
pub use store::VarStore;
pub use value::Value;
