//! Trigger patterns.
//!
//! A trigger is literal text such as `print(` or `} else {`.  It is compiled
//! into a [`regex`] that escapes every metacharacter and lets whitespace
//! between the trigger's tokens vary (`if (` also matches `if(`).  Triggers
//! that begin or end in a word character get word boundaries there, so
//! `let` does not fire on `outlet`.
//!
//! Matching runs against a masked copy of the statement in which the
//! contents of string and template literals are blanked out, so trigger
//! text quoted inside a literal never fires.  Offsets are shared between
//! the masked and original text, and [`TriggerMatch`] hands back slices of
//! the original.
//!
//! ## Match modes
//!
//! | Mode | Used for | Description |
//! |------|----------|-------------|
//! | [`MatchMode::Anywhere`] | statement triggers | leftmost occurrence anywhere in the statement |
//! | [`MatchMode::Prefix`]   | block triggers (`}`, `} else {`, …) | must open the statement |

use std::sync::Arc;

use regex::Regex;

/// Where in a statement a trigger may match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Anywhere,
    Prefix,
}

impl MatchMode {
    /// Block syntax (anything opening with `}`) only matches as a prefix.
    pub fn for_trigger(trigger: &str) -> Self {
        if trigger.trim_start().starts_with('}') {
            MatchMode::Prefix
        } else {
            MatchMode::Anywhere
        }
    }
}

/// A compiled trigger pattern.
///
/// The regex sits behind an `Arc`, so cloning a pattern never recompiles it.
#[derive(Clone)]
pub struct TriggerPattern {
    trigger: String,
    mode: MatchMode,
    regex: Arc<Regex>,
}

impl std::fmt::Debug for TriggerPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerPattern")
            .field("trigger", &self.trigger)
            .field("mode", &self.mode)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl TriggerPattern {
    /// Derive the pattern for `trigger`.
    pub fn new(trigger: &str) -> Result<Self, regex::Error> {
        let mode = MatchMode::for_trigger(trigger);
        let regex = Regex::new(&derive_regex(trigger, mode))?;
        Ok(Self {
            trigger: trigger.to_owned(),
            mode,
            regex: Arc::new(regex),
        })
    }

    /// The literal trigger text.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// The derived regex source.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns `true` if the trigger occurs in `text` outside any literal.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(&mask_literals(text))
    }

    /// Find the trigger in `text`, splitting it into before/after parts.
    pub fn find<'t>(&self, text: &'t str) -> Option<TriggerMatch<'t>> {
        let masked = mask_literals(text);
        let m = self.regex.find(&masked)?;
        Some(TriggerMatch {
            text,
            start: m.start(),
            end: m.end(),
        })
    }
}

/// A successful trigger match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerMatch<'t> {
    text: &'t str,
    start: usize,
    end: usize,
}

impl<'t> TriggerMatch<'t> {
    /// Text before the trigger, trimmed.
    pub fn before(&self) -> &'t str {
        self.text[..self.start].trim()
    }

    /// The matched trigger text as written in the statement.
    pub fn whole(&self) -> &'t str {
        &self.text[self.start..self.end]
    }

    /// Text after the trigger, trimmed.
    pub fn after(&self) -> &'t str {
        self.text[self.end..].trim()
    }
}

// ── Pattern derivation ────────────────────────────────────────────────────────

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn derive_regex(trigger: &str, mode: MatchMode) -> String {
    let core = trigger
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s*");
    let trimmed = trigger.trim();
    let lead = match trimmed.chars().next() {
        Some(c) if is_word(c) => r"\b",
        _ => "",
    };
    let trail = match trimmed.chars().last() {
        Some(c) if is_word(c) => r"\b",
        _ => "",
    };
    match mode {
        MatchMode::Anywhere => format!("{lead}{core}{trail}"),
        MatchMode::Prefix => format!(r"\A\s*{core}{trail}"),
    }
}

/// Blank the contents of string and template literals, keeping the
/// delimiters and every byte offset.
pub fn mask_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    fn blank(out: &mut String, c: char) {
        // Newlines stay so multi-line statements keep their shape.
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        }
    }

    while let Some(c) = chars.next() {
        match quote {
            None => {
                if matches!(c, '"' | '\'' | '`') {
                    quote = Some(c);
                }
                out.push(c);
            }
            Some(_) if c == '\\' => {
                blank(&mut out, c);
                if let Some(escaped) = chars.next() {
                    blank(&mut out, escaped);
                }
            }
            Some(q) if c == q => {
                quote = None;
                out.push(c);
            }
            Some(_) => blank(&mut out, c),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(trigger: &str) -> TriggerPattern {
        TriggerPattern::new(trigger).unwrap()
    }

    #[test]
    fn splits_before_and_after() {
        let m = pat("print(").find("print(`hi`);").unwrap();
        assert_eq!(m.before(), "");
        assert_eq!(m.whole(), "print(");
        assert_eq!(m.after(), "`hi`);");
    }

    #[test]
    fn flexible_whitespace_between_tokens() {
        assert!(pat("if (").matches("if(x) {"));
        assert!(pat("if (").matches("if   (x) {"));
        assert!(pat("} else {").matches("}else{"));
    }

    #[test]
    fn word_boundaries() {
        assert!(pat("let").matches("let x = 1;"));
        assert!(!pat("let").matches("outlet = 1;"));
        assert!(!pat("let").matches("letter = 1;"));
        assert!(!pat("if (").matches("} elseif (x) {"));
        assert!(!pat("print(").matches("printS(x);"));
    }

    #[test]
    fn triggers_inside_literals_are_ignored() {
        assert!(!pat("print(").matches("let s = `print(x)`;"));
        assert!(!pat("let").matches(r#"print("let me in");"#));
        assert!(pat("print(").matches(r#"print("print(");"#));
    }

    #[test]
    fn block_triggers_match_only_as_prefix() {
        let close = pat("}");
        assert_eq!(close.mode(), MatchMode::Prefix);
        assert!(close.matches("  }"));
        assert!(!close.matches("print(x); }"));
        let m = pat("} elseif (").find("} elseif (x > 1) {").unwrap();
        assert_eq!(m.after(), "x > 1) {");
    }

    #[test]
    fn metacharacters_are_escaped() {
        let p = pat("a.b(");
        assert!(p.matches("a.b(1);"));
        assert!(!p.matches("axb(1);"));
    }

    #[test]
    fn masking_preserves_offsets() {
        let src = "print(`é\\`x`) + \"a\"";
        let masked = mask_literals(src);
        assert_eq!(masked.len(), src.len());
        assert!(masked.starts_with("print(`"));
        assert!(!masked.contains('é'));
        assert!(!masked.contains('x'));
    }
}
