//! Built-in statement handlers.
//!
//! A function definition names one of these kinds in its handler body; the
//! registry binds the kind to the definition's trigger.  Each handler gets
//! the trigger match (text before and after the trigger) and splits the
//! rest of the statement itself: a call's argument, a declaration's name,
//! type and value, or a conditional's parenthesised condition.
//!
//! | Kind | Definition body | Statement shape |
//! |------|-----------------|-----------------|
//! | [`HandlerKind::Print`]          | `print`           | `print(EXPR);` |
//! | [`HandlerKind::PrintSanitized`] | `print-sanitized` | `printS(EXPR);` |
//! | [`HandlerKind::Dump`]           | `dump`            | `dump(EXPR);` |
//! | [`HandlerKind::Append`]         | `append`          | `appendToBody(EXPR);` |
//! | [`HandlerKind::Declare`]        | `declare`         | `let NAME[: TYPE] = EXPR;` |
//! | [`HandlerKind::DeclareConst`]   | `declare-const`   | `const NAME[: TYPE] = EXPR;` |
//! | [`HandlerKind::Conditional`]    | `conditional`     | `if (EXPR) {`, `} elseif (EXPR) {` |
//! | [`HandlerKind::BlockClose`]     | `block-close`     | `}`, `} else {` |

use tracing::{debug, trace};

use super::context::RunContext;
use super::sanitize::{escape_angle_brackets, sanitize};
use super::store::{is_name_char, DeclType};
use crate::error::HandlerError;
use crate::pattern::TriggerMatch;

/// The statement kinds VEIL knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Print,
    PrintSanitized,
    Dump,
    Append,
    Declare,
    DeclareConst,
    Conditional,
    BlockClose,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 8] = [
        HandlerKind::Print,
        HandlerKind::PrintSanitized,
        HandlerKind::Dump,
        HandlerKind::Append,
        HandlerKind::Declare,
        HandlerKind::DeclareConst,
        HandlerKind::Conditional,
        HandlerKind::BlockClose,
    ];

    /// The name used in a definition file's handler body.
    pub fn name(self) -> &'static str {
        match self {
            HandlerKind::Print => "print",
            HandlerKind::PrintSanitized => "print-sanitized",
            HandlerKind::Dump => "dump",
            HandlerKind::Append => "append",
            HandlerKind::Declare => "declare",
            HandlerKind::DeclareConst => "declare-const",
            HandlerKind::Conditional => "conditional",
            HandlerKind::BlockClose => "block-close",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Run the handler for one dispatched statement.
    pub fn invoke(self, m: &TriggerMatch<'_>, run: &mut RunContext<'_>) -> Result<(), HandlerError> {
        match self {
            HandlerKind::Print => {
                let v = run.evaluate(call_argument(m)?);
                run.sink.console(&v.to_string());
            }
            HandlerKind::PrintSanitized => {
                let v = sanitize(run.evaluate(call_argument(m)?));
                run.sink.console(&v.to_string());
            }
            HandlerKind::Dump => {
                let v = run.evaluate(call_argument(m)?);
                let text = format!("{} ({})", v.to_literal(), v.type_name());
                debug!(dump = %text);
                run.sink
                    .append_to_body(&format!("<pre>{}</pre>", escape_angle_brackets(&text)));
            }
            HandlerKind::Append => {
                let v = sanitize(run.evaluate(call_argument(m)?));
                run.sink.append_to_body(&v.to_string());
            }
            HandlerKind::Declare => declare(m, false, run)?,
            HandlerKind::DeclareConst => declare(m, true, run)?,
            HandlerKind::Conditional => {
                let cond = condition(m)?;
                let taken = run.evaluate(cond).as_bool();
                trace!(condition = cond, taken);
                run.blocks.enter_branch(taken);
            }
            // Block state already changed in the tracker.
            HandlerKind::BlockClose => trace!(depth = run.blocks.depth(), "block close"),
        }
        Ok(())
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Statement splitting ───────────────────────────────────────────────────────

fn nothing_before(m: &TriggerMatch<'_>) -> Result<(), HandlerError> {
    if m.before().is_empty() {
        Ok(())
    } else {
        Err(HandlerError::Malformed(format!(
            "unexpected `{}` before `{}`",
            m.before(),
            m.whole()
        )))
    }
}

/// Split `text` (which follows an opening `(`) at the matching `)`.
///
/// Returns the trimmed text inside the parentheses and the trimmed rest.
/// Parentheses inside string and template literals do not count.
pub fn split_group(text: &str) -> Result<(&str, &str), HandlerError> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((text[..i].trim(), text[i + 1..].trim()));
                }
            }
            _ => {}
        }
    }
    Err(HandlerError::Malformed("missing `)`".into()))
}

/// The argument of a call-shaped statement: `trigger( ARG ) [;]`.
fn call_argument<'t>(m: &TriggerMatch<'t>) -> Result<&'t str, HandlerError> {
    nothing_before(m)?;
    let (arg, rest) = split_group(m.after())?;
    if !(rest.is_empty() || rest == ";") {
        return Err(HandlerError::Malformed(format!("unexpected `{rest}` after call")));
    }
    if arg.is_empty() {
        return Err(HandlerError::Malformed(format!("`{}` needs an argument", m.whole())));
    }
    Ok(arg)
}

/// The condition of a header: `… ( COND ) {`.
fn condition<'t>(m: &TriggerMatch<'t>) -> Result<&'t str, HandlerError> {
    nothing_before(m)?;
    let (cond, rest) = split_group(m.after())?;
    if rest != "{" {
        return Err(HandlerError::Malformed("expected `{` after condition".into()));
    }
    if cond.is_empty() {
        return Err(HandlerError::Malformed("empty condition".into()));
    }
    Ok(cond)
}

/// A declaration's parts: name, optional type annotation, value source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration<'t> {
    pub name: &'t str,
    pub ty: Option<&'t str>,
    pub value: &'t str,
}

fn leading_word(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !is_name_char(c)).unwrap_or(s.len());
    s.split_at(end)
}

/// Split `NAME [: TYPE] = VALUE` (the text after `let`/`const`).
pub fn split_declaration(text: &str) -> Result<Declaration<'_>, HandlerError> {
    let (name, rest) = leading_word(text.trim_start());
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(HandlerError::Malformed("expected a variable name".into()));
    }
    let mut rest = rest.trim_start();
    let ty = match rest.strip_prefix(':') {
        Some(after_colon) => {
            let (ty, after_ty) = leading_word(after_colon.trim_start());
            if ty.is_empty() {
                return Err(HandlerError::Malformed("expected a type after `:`".into()));
            }
            rest = after_ty.trim_start();
            Some(ty)
        }
        None => None,
    };
    let value = rest
        .strip_prefix('=')
        .filter(|v| !v.starts_with('='))
        .ok_or_else(|| HandlerError::Malformed(format!("expected `=` after `{name}`")))?
        .trim();
    if value.is_empty() || value == ";" {
        return Err(HandlerError::Malformed(format!("`{name}` has no value")));
    }
    Ok(Declaration { name, ty, value })
}

fn declare(m: &TriggerMatch<'_>, constant: bool, run: &mut RunContext<'_>) -> Result<(), HandlerError> {
    nothing_before(m)?;
    let decl = split_declaration(m.after())?;
    let value = run.evaluate(decl.value);
    let stored = run
        .vars
        .declare(decl.name, value, decl.ty.map(DeclType::parse), constant)?;
    trace!(name = decl.name, value = %stored, constant, "declared");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
