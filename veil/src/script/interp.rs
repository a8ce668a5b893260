//! VEIL script interpreter.
//!
//! The [`Interpreter`] holds the shared, read-only [`Registry`] and runs
//! scripts against it.  Each run gets a fresh [`RunContext`]; statements
//! are processed strictly in source order:
//!
//! 1. the segmenter yields the next logical statement,
//! 2. the block tracker decides whether it runs or is skipped,
//! 3. the dispatcher routes it to the first matching trigger's handler, or
//!    evaluates it as a bare expression when nothing matches.
//!
//! Nothing that goes wrong inside a statement stops the run.  Failures are
//! logged and counted in the returned [`RunReport`].

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use super::context::RunContext;
use super::control::{BlockSyntax, Decision};
use super::registry::Registry;
use super::segment::{Segmenter, Statement};
use crate::output::OutputSink;

/// Counters describing one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Statements handed to a handler or evaluated as bare expressions.
    pub executed: usize,
    /// Statements discarded inside branches that did not run.
    pub skipped: usize,
    /// Handlers that rejected their statement.
    pub handler_failures: usize,
    /// Expressions that failed to evaluate.
    pub eval_failures: usize,
    /// Statements refused for their shape, plus unclosed blocks at the end.
    pub warnings: usize,
}

impl RunReport {
    /// `true` if nothing failed and nothing was warned about.
    pub fn is_clean(&self) -> bool {
        self.handler_failures == 0 && self.eval_failures == 0 && self.warnings == 0
    }

    /// Add another run's counters to this one.
    pub fn merge(&mut self, other: &RunReport) {
        self.executed += other.executed;
        self.skipped += other.skipped;
        self.handler_failures += other.handler_failures;
        self.eval_failures += other.eval_failures;
        self.warnings += other.warnings;
    }
}

/// Runs VEIL scripts against a function registry.
#[derive(Debug, Clone)]
pub struct Interpreter {
    registry: Arc<Registry>,
}

impl Interpreter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Interpreter { registry }
    }

    /// An interpreter over the embedded standard functions.
    pub fn with_builtins() -> Self {
        Self::new(Arc::new(Registry::builtin()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run `src` in a fresh context, writing output to `sink`.
    pub fn run(&self, src: &str, sink: &mut dyn OutputSink) -> RunReport {
        let mut ctx = RunContext::new(sink);
        self.run_in(src, &mut ctx)
    }

    /// Run `src` in a caller-provided context, which can be inspected
    /// afterwards.
    pub fn run_in(&self, src: &str, ctx: &mut RunContext<'_>) -> RunReport {
        let mut report = RunReport::default();
        let failures_before = ctx.eval_failures();

        for stmt in Segmenter::new(src) {
            trace!(line = stmt.line, stmt = %stmt.text);
            let syntax = BlockSyntax::classify(&stmt.text);
            match ctx.blocks.observe(syntax) {
                Decision::Skip => {
                    trace!(line = stmt.line, "skipped");
                    report.skipped += 1;
                }
                Decision::Dispatch => self.dispatch(&stmt, syntax, ctx, &mut report),
            }
        }

        let open = ctx.blocks.depth();
        if open > 0 {
            warn!(open, "script ended with unclosed blocks");
            report.warnings += 1;
        }
        report.eval_failures = ctx.eval_failures() - failures_before;
        debug!(?report, "run finished");
        report
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    fn dispatch(
        &self,
        stmt: &Statement,
        syntax: BlockSyntax,
        ctx: &mut RunContext<'_>,
        report: &mut RunReport,
    ) {
        if let Some((func, m)) = self.registry.find_match(&stmt.text) {
            report.executed += 1;
            if let Err(e) = func.kind.invoke(&m, ctx) {
                error!(trigger = func.trigger(), line = stmt.line, "error executing {}: {e}", func.name);
                report.handler_failures += 1;
            }
            return;
        }

        let text = stmt.text.as_str();
        if syntax.is_block() || text.ends_with('{') {
            debug!(line = stmt.line, stmt = text, "block syntax with no handler");
            return;
        }
        match text.strip_suffix(';') {
            Some(expr) if expr.trim().is_empty() => {}
            Some(expr) => {
                report.executed += 1;
                let value = ctx.evaluate(expr);
                trace!(line = stmt.line, %value, "bare expression");
            }
            None => {
                warn!(line = stmt.line, stmt = text, "statement missing `;`; not executed");
                report.warnings += 1;
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
