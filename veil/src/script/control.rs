//! Conditional block tracking.
//!
//! Statement handlers know nothing about nesting.  Before each statement is
//! dispatched the interpreter shows it to a [`BlockStack`], which decides
//! whether the statement runs or is discarded because it sits inside a
//! branch that was not taken.
//!
//! Each open `if` chain is one [`BlockFrame`].  The frame remembers the
//! skip state from before the chain started (restored when the chain
//! closes) and whether any branch of the chain has already run, which is
//! what `elseif` and `else` consult.

use tracing::{debug, warn};

/// Block syntax recognised by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSyntax {
    /// `if (…) {`
    IfHeader,
    /// `} elseif (…) {`
    ElseIf,
    /// `} else {`
    Else,
    /// `}`
    Close,
    /// Anything else.
    None,
}

impl BlockSyntax {
    /// Classify a statement by its leading keyword or brace.
    ///
    /// Headers must end with the `{` that opens their block; `if (x) f();`
    /// is an ordinary statement.
    pub fn classify(stmt: &str) -> Self {
        let s = stmt.trim();
        let opens = s.ends_with('{');
        if let Some(rest) = s.strip_prefix('}') {
            let rest = rest.trim_start();
            if opens && keyword_then(rest, "elseif", '(') {
                BlockSyntax::ElseIf
            } else if opens && keyword_then(rest, "else", '{') {
                BlockSyntax::Else
            } else {
                BlockSyntax::Close
            }
        } else if opens && keyword_then(s, "if", '(') {
            BlockSyntax::IfHeader
        } else {
            BlockSyntax::None
        }
    }

    /// `true` for syntax that opens or closes a block.
    pub fn is_block(self) -> bool {
        self != BlockSyntax::None
    }
}

/// `s` starts with `keyword`, optional whitespace, then `next`.
fn keyword_then(s: &str, keyword: &str, next: char) -> bool {
    s.strip_prefix(keyword)
        .is_some_and(|rest| rest.trim_start().starts_with(next))
}

/// What to do with a statement after the tracker has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Dispatch,
    Skip,
}

/// Saved state for one open conditional chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFrame {
    /// Skip state in force before the `if` header; restored by `}`.
    pub skip_before_entry: bool,
    /// Some branch of this chain has run (or the whole chain is dead).
    pub branch_taken: bool,
}

/// Per-run stack of open conditional chains plus the current skip flag.
#[derive(Debug, Default)]
pub struct BlockStack {
    frames: Vec<BlockFrame>,
    skip: bool,
}

impl BlockStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while inside a branch that is not executing.
    pub fn is_skipping(&self) -> bool {
        self.skip
    }

    /// Number of open conditional blocks.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Update state for `syntax` and decide whether the statement runs.
    ///
    /// For `if` and `elseif` headers that are dispatched, the branch stays
    /// closed until the conditional handler reports a truthy condition via
    /// [`BlockStack::enter_branch`]; a handler that fails leaves it closed.
    pub fn observe(&mut self, syntax: BlockSyntax) -> Decision {
        match syntax {
            BlockSyntax::IfHeader => {
                let outer_skip = self.skip;
                self.frames.push(BlockFrame {
                    skip_before_entry: outer_skip,
                    branch_taken: outer_skip,
                });
                self.skip = true;
                if outer_skip {
                    Decision::Skip
                } else {
                    Decision::Dispatch
                }
            }
            BlockSyntax::ElseIf => {
                let Some(frame) = self.frames.last() else {
                    warn!("`elseif` without an open `if`; ignored");
                    return Decision::Skip;
                };
                self.skip = true;
                if frame.skip_before_entry || frame.branch_taken {
                    Decision::Skip
                } else {
                    Decision::Dispatch
                }
            }
            BlockSyntax::Else => {
                let Some(frame) = self.frames.last_mut() else {
                    warn!("`else` without an open `if`; ignored");
                    return Decision::Skip;
                };
                self.skip = frame.skip_before_entry || frame.branch_taken;
                frame.branch_taken = true;
                self.decision()
            }
            BlockSyntax::Close => {
                match self.frames.pop() {
                    Some(frame) => self.skip = frame.skip_before_entry,
                    None => debug!("`}}` with no open block"),
                }
                self.decision()
            }
            BlockSyntax::None => self.decision(),
        }
    }

    /// Report the outcome of the innermost header's condition.
    pub fn enter_branch(&mut self, condition: bool) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if condition && !frame.branch_taken {
            frame.branch_taken = true;
            self.skip = false;
        } else {
            self.skip = true;
        }
    }

    fn decision(&self) -> Decision {
        if self.skip {
            Decision::Skip
        } else {
            Decision::Dispatch
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the tracker over `(syntax, condition)` pairs; return which
    /// statements ran.
    fn run(steps: &[(BlockSyntax, Option<bool>)]) -> Vec<bool> {
        let mut blocks = BlockStack::new();
        steps
            .iter()
            .map(|&(syntax, cond)| {
                let d = blocks.observe(syntax);
                if d == Decision::Dispatch {
                    if let Some(c) = cond {
                        blocks.enter_branch(c);
                    }
                }
                d == Decision::Dispatch
            })
            .collect()
    }

    use BlockSyntax::{Close, Else, ElseIf, IfHeader, None as Stmt};

    #[test]
    fn classify() {
        assert_eq!(BlockSyntax::classify("if (x) {"), IfHeader);
        assert_eq!(BlockSyntax::classify("if(x){"), IfHeader);
        assert_eq!(BlockSyntax::classify("} elseif (x) {"), ElseIf);
        assert_eq!(BlockSyntax::classify("}else{"), Else);
        assert_eq!(BlockSyntax::classify("}"), Close);
        assert_eq!(BlockSyntax::classify("iffy(1);"), Stmt);
        assert_eq!(BlockSyntax::classify("print(`if (`);"), Stmt);
        assert_eq!(BlockSyntax::classify("if (x) print(1);"), Stmt);
    }

    #[test]
    fn false_branch_is_skipped() {
        let ran = run(&[(IfHeader, Some(false)), (Stmt, None), (Close, None), (Stmt, None)]);
        assert_eq!(ran, vec![true, false, true, true]);
    }

    #[test]
    fn nested_false_inside_true() {
        let ran = run(&[
            (IfHeader, Some(true)),
            (IfHeader, Some(false)),
            (Stmt, None), // a
            (Close, None),
            (Stmt, None), // b
            (Close, None),
        ]);
        assert_eq!(ran, vec![true, true, false, true, true, true]);
    }

    #[test]
    fn elseif_chain_takes_first_true_branch() {
        let ran = run(&[
            (IfHeader, Some(false)),
            (Stmt, None),
            (ElseIf, Some(true)),
            (Stmt, None),
            (ElseIf, Some(true)),
            (Stmt, None),
            (Else, None),
            (Stmt, None),
            (Close, None),
        ]);
        assert_eq!(ran, vec![true, false, true, true, false, false, false, false, true]);
    }

    #[test]
    fn else_runs_when_nothing_matched() {
        let ran = run(&[
            (IfHeader, Some(false)),
            (ElseIf, Some(false)),
            (Else, None),
            (Stmt, None),
            (Close, None),
        ]);
        assert_eq!(ran, vec![true, true, true, true, true]);
    }

    #[test]
    fn chain_inside_dead_branch_never_runs() {
        let ran = run(&[
            (IfHeader, Some(false)),
            (IfHeader, Some(true)),
            (Stmt, None),
            (Else, None),
            (Stmt, None),
            (Close, None),
            (Close, None),
            (Stmt, None),
        ]);
        assert_eq!(ran, vec![true, false, false, false, false, false, true, true]);
    }

    #[test]
    fn header_without_condition_report_stays_closed() {
        let mut blocks = BlockStack::new();
        assert_eq!(blocks.observe(IfHeader), Decision::Dispatch);
        assert_eq!(blocks.observe(Stmt), Decision::Skip);
    }

    #[test]
    fn empty_pop_is_noop() {
        let mut blocks = BlockStack::new();
        assert_eq!(blocks.observe(Close), Decision::Dispatch);
        assert!(!blocks.is_skipping());
        assert_eq!(blocks.depth(), 0);
    }

    #[test]
    fn stray_else_is_ignored() {
        let mut blocks = BlockStack::new();
        assert_eq!(blocks.observe(Else), Decision::Skip);
        assert_eq!(blocks.observe(Stmt), Decision::Dispatch);
    }
}
