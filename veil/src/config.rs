//! Run configuration resolved from the command line.
//!
//! | Setting | Source | Default |
//! |---------|--------|---------|
//! | input | positional scripts or `--document` | required |
//! | functions | `--functions`, then `$VEIL_FUNCTIONS` | embedded definitions |
//! | body output | `--body-out` | stdout |
//! | log filter | `--log-filter`, `--trace`/`--debug`/`--log-level`, `$RUST_LOG` | `veil=warn` |

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::{ConfigError, LoadError};
use crate::script::registry::{EmbeddedSource, Registry};

/// What the run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Standalone script files, run in order.
    Scripts(Vec<PathBuf>),
    /// A host document whose `text/veil` scripts are run.
    Document(PathBuf),
}

/// Where function definitions come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Functions {
    #[default]
    Embedded,
    Dir(PathBuf),
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub input: Input,
    pub functions: Functions,
    pub body_out: Option<PathBuf>,
    pub log_spec: String,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let input = match (cli.document, cli.scripts) {
            (Some(doc), _) => Input::Document(doc),
            (None, scripts) if !scripts.is_empty() => Input::Scripts(scripts),
            _ => return Err(ConfigError::NoInput),
        };
        let functions = match cli.functions {
            Some(dir) if !dir.is_dir() => return Err(ConfigError::MissingFunctions(dir)),
            Some(dir) => Functions::Dir(dir),
            None => Functions::Embedded,
        };
        Ok(Config {
            input,
            functions,
            body_out: cli.body_out,
            log_spec: cli.log.spec(),
        })
    }

    /// Directory definitions load from, if not the embedded set.
    pub fn functions_dir(&self) -> Option<&Path> {
        match &self.functions {
            Functions::Dir(dir) => Some(dir),
            Functions::Embedded => None,
        }
    }

    /// Load the configured function registry.
    pub async fn load_registry(&self) -> (Registry, Vec<LoadError>) {
        match &self.functions {
            Functions::Dir(dir) => Registry::load_dir(dir).await,
            Functions::Embedded => Registry::load(&mut EmbeddedSource),
        }
    }
}
