//! Logging setup and CLI flags.
//!
//! Script diagnostics (load failures, handler errors, missing `;`) are
//! tracing events; they go to stderr so they never mix with console output
//! on stdout.

use std::env;

use clap::Args;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging controls for the CLI.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Set log level to trace (this crate only)
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set log level to debug (this crate only)
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single log level (error|warn|info|debug|trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive (overrides other flags)
    /// e.g. "veil::script=trace"
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// The filter spec these flags select.
    pub fn spec(&self) -> String {
        compute_spec(
            self.trace,
            self.debug,
            self.log_level.as_deref(),
            self.log_filter.as_deref(),
        )
    }
}

/// Level used when nothing else is configured.
pub const DEFAULT_LEVEL: &str = "warn";

/// Filter directive setting `level` for this crate.
pub fn level_spec_for(level: &str) -> String {
    format!("veil={}", level.to_ascii_lowercase())
}

/// Compute the filter spec with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level`
/// - `RUST_LOG` env
/// - default to [`DEFAULT_LEVEL`]
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    env::var("RUST_LOG").unwrap_or_else(|_| level_spec_for(DEFAULT_LEVEL))
}

/// Install the global subscriber: `EnvFilter` from `spec`, compact fmt
/// layer on stderr.  A second call is a no-op.
pub fn init(spec: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(spec))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false)
                .compact(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        assert_eq!(compute_spec(true, false, Some("info"), Some("x=debug")), "x=debug");
    }

    #[test]
    fn flags_are_crate_scoped() {
        assert_eq!(compute_spec(true, false, None, None), "veil=trace");
        assert_eq!(compute_spec(false, true, None, None), "veil=debug");
        assert_eq!(compute_spec(false, false, Some("INFO"), None), "veil=info");
    }

    #[test]
    fn log_args_spec() {
        let args = LogArgs { debug: true, ..LogArgs::default() };
        assert_eq!(args.spec(), "veil=debug");
    }
}
