//! Source segmentation: physical lines → logical statements.
//!
//! A VEIL script is a sequence of lines.  Blank lines and `//` comment lines
//! are dropped.  A line that leaves a backtick template open is joined with
//! the following lines (newline-separated) until the template closes, so a
//! multi-line template reaches the dispatcher as one statement.
//!
//! Each logical line is then split into block-structured pieces outside
//! literals: after a header's opening `{`, around a closing `}` (keeping
//! `} else {` and `} elseif (…) {` whole), and after every top-level `;`.
//! Text after a top-level `//` is a trailing comment.

use std::collections::VecDeque;
use std::iter::Enumerate;
use std::str::Lines;

use tracing::warn;

/// One logical statement and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub line: usize,
    pub text: String,
}

/// Lazy, single-pass iterator of [`Statement`]s over a script.
pub struct Segmenter<'a> {
    lines: Enumerate<Lines<'a>>,
    pending: VecDeque<Statement>,
}

impl<'a> Segmenter<'a> {
    pub fn new(src: &'a str) -> Self {
        Segmenter {
            lines: src.lines().enumerate(),
            pending: VecDeque::new(),
        }
    }

    /// Read the next logical line, merging across open templates.
    fn next_logical(&mut self) -> Option<(usize, String)> {
        loop {
            let (idx, line) = self.lines.next()?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            let mut full = line.to_owned();
            let mut open = template_open_after(line, false);
            while open {
                let Some((_, next)) = self.lines.next() else {
                    warn!(line = idx + 1, "unterminated template literal at end of script");
                    break;
                };
                full.push('\n');
                full.push_str(next);
                open = template_open_after(next, true);
            }
            return Some((idx + 1, full.trim().to_owned()));
        }
    }
}

impl Iterator for Segmenter<'_> {
    type Item = Statement;

    fn next(&mut self) -> Option<Statement> {
        while self.pending.is_empty() {
            let (line, text) = self.next_logical()?;
            self.pending.extend(
                split_statements(&text)
                    .into_iter()
                    .map(|text| Statement { line, text }),
            );
        }
        self.pending.pop_front()
    }
}

/// Convenience: collect every statement of `src`.
pub fn segment(src: &str) -> Vec<Statement> {
    Segmenter::new(src).collect()
}

/// Scan one physical line and report whether a backtick template is open
/// at its end, given whether one was open at its start.
///
/// Quotes only count outside templates, and single/double-quoted strings
/// never span lines.  A delimiter preceded by a backslash is escaped.
pub fn template_open_after(line: &str, open_at_start: bool) -> bool {
    let mut in_template = open_at_start;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '`' if quote.is_none() => in_template = !in_template,
            '"' | '\'' if !in_template => match quote {
                None => quote = Some(c),
                Some(q) if q == c => quote = None,
                Some(_) => {}
            },
            _ => {}
        }
    }
    in_template
}

/// Split a logical line into block-structured statements.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut chars = text.char_indices().peekable();

    fn flush(parts: &mut Vec<String>, current: &mut String) {
        let piece = current.trim();
        if !piece.is_empty() {
            parts.push(piece.to_owned());
        }
        current.clear();
    }

    while let Some((i, ch)) = chars.next() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == '\\' {
                if let Some((_, escaped)) = chars.next() {
                    current.push(escaped);
                }
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            '/' if matches!(chars.peek(), Some((_, '/'))) => break,
            ';' if depth == 0 => {
                current.push(ch);
                flush(&mut parts, &mut current);
            }
            '{' if depth == 0 => {
                current.push(ch);
                flush(&mut parts, &mut current);
            }
            '}' if depth == 0 => {
                flush(&mut parts, &mut current);
                current.push(ch);
                if !continues_chain(&text[i + 1..]) {
                    flush(&mut parts, &mut current);
                }
            }
            _ => current.push(ch),
        }
    }
    flush(&mut parts, &mut current);
    parts
}

/// `true` when the text after a `}` is an `else` or `elseif` keyword.
fn continues_chain(rest: &str) -> bool {
    let rest = rest.trim_start();
    let word: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    word == "else" || word == "elseif"
}

// ── Tests ─────────────────────────────────────────────────────────────────────
