//! Per-run interpreter state.

use tracing::error;

use super::control::BlockStack;
use super::expr::Evaluator;
use super::store::VarStore;
use super::value::Value;
use crate::output::OutputSink;

/// Everything one script run owns: its variables, its open blocks, and
/// the sink its output goes to.  Handlers receive it mutably.
pub struct RunContext<'s> {
    pub vars: VarStore,
    pub blocks: BlockStack,
    pub evaluator: Evaluator,
    pub sink: &'s mut dyn OutputSink,
    eval_failures: usize,
}

impl<'s> RunContext<'s> {
    pub fn new(sink: &'s mut dyn OutputSink) -> Self {
        RunContext {
            vars: VarStore::new(),
            blocks: BlockStack::new(),
            evaluator: Evaluator,
            sink,
            eval_failures: 0,
        }
    }

    /// Evaluate `src` against this run's variables.
    ///
    /// A failure is logged and counted, and yields [`Value::Undefined`].
    pub fn evaluate(&mut self, src: &str) -> Value {
        match self.evaluator.try_evaluate(src, &mut self.vars) {
            Ok(v) => v,
            Err(e) => {
                error!(expr = src.trim(), "invalid expression: {e}");
                self.eval_failures += 1;
                Value::Undefined
            }
        }
    }

    /// Number of expressions that failed to evaluate so far.
    pub fn eval_failures(&self) -> usize {
        self.eval_failures
    }
}
