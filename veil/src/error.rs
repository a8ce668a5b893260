//! Error types for loading, evaluation, and statement dispatch.
//!
//! None of these are fatal to an interpreter run: the interpreter logs them
//! and moves on to the next statement.  They exist as values so callers and
//! tests can tell failure modes apart.

use std::path::PathBuf;

use thiserror::Error;

/// A function definition or manifest could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("definition file {0} not found")]
    Missing(String),
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("{file}: no `// HANDLER` section")]
    NoHandler { file: String },
    #[error("{file}: unknown handler kind `{kind}`")]
    UnknownHandler { file: String, kind: String },
    #[error("{file}: empty trigger")]
    EmptyTrigger { file: String },
    #[error("{file}: cannot build trigger pattern: {source}")]
    Pattern {
        file: String,
        #[source]
        source: regex::Error,
    },
}

/// An expression could not be parsed or evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unterminated {0} literal")]
    Unterminated(&'static str),
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    #[error("unexpected {0}")]
    UnexpectedToken(String),
    #[error("empty expression")]
    Empty,
    #[error("{0} is not defined")]
    UnknownVariable(String),
    #[error("{0} is not a function")]
    UnknownFunction(String),
    #[error("assignment to constant variable {0}")]
    ConstAssignment(String),
    #[error("assignment to undeclared variable {0}")]
    Undeclared(String),
    #[error("{0} is a reserved name")]
    Reserved(String),
    #[error("invalid assignment target")]
    InvalidTarget,
    #[error("expression nests too deeply")]
    TooDeep,
}

/// A statement handler rejected its input.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed statement: {0}")]
    Malformed(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// The command line does not describe anything to run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("nothing to run: give script paths or --document")]
    NoInput,
    #[error("function directory {} does not exist", .0.display())]
    MissingFunctions(PathBuf),
}
