//! VEIL expression segmentation, lexer, AST, parser, and evaluator.
//!
//! An expression is first split into literal and code fragments
//! ([`segment_literals`]) so that quote characters, escaped delimiters and
//! `${…}` placeholders are resolved before any operator is looked at.  Code
//! fragments are then tokenized, the token stream is parsed into an [`Expr`]
//! tree, and the tree is walked against the run's variables.  Variables are
//! resolved at evaluation time, so a value is never re-lexed as source text.
//!
//! Operator precedence (lowest → highest):
//!   assign  →  ternary  →  or  →  and  →  equality  →  relational  →
//!   additive  →  multiplicative  →  exponent  →  unary  →  call/primary

use tracing::error;

use super::builtins::call_builtin;
use super::store::{is_name_char, is_name_start, is_reserved, DeclType, VarStore};
use super::value::Value;
use crate::error::EvalError;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Variable access used by the evaluator.
///
/// [`VarStore`] is the production implementation; the trait keeps the
/// evaluator independent of how a run stores its state.
pub trait EvalContext {
    /// Look up a user-visible variable.
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Declare a variable, returning the (possibly coerced) stored value.
    fn declare_var(
        &mut self,
        name: &str,
        value: Value,
        ty: Option<DeclType>,
        constant: bool,
    ) -> Result<Value, EvalError>;

    /// Assign an existing variable.
    fn assign_var(&mut self, name: &str, value: Value) -> Result<Value, EvalError>;
}

impl EvalContext for VarStore {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.lookup(name).cloned()
    }

    fn declare_var(
        &mut self,
        name: &str,
        value: Value,
        ty: Option<DeclType>,
        constant: bool,
    ) -> Result<Value, EvalError> {
        self.declare(name, value, ty, constant)
    }

    fn assign_var(&mut self, name: &str, value: Value) -> Result<Value, EvalError> {
        self.assign(name, value)
    }
}

// ── Literal segmentation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Code,
    /// Single- or double-quoted string.
    Str,
    /// Backtick template.
    Template,
}

/// A piece of an expression.  For literals `text` is the raw content between
/// the delimiters, escapes still in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
}

impl Fragment {
    fn new(kind: FragmentKind, text: String) -> Self {
        Fragment { kind, text }
    }
}

/// Split `src` into alternating code and literal fragments.
///
/// A delimiter preceded by a backslash does not close its literal.  An
/// unterminated literal is an error.
pub fn segment_literals(src: &str) -> Result<Vec<Fragment>, EvalError> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = src.chars();

    while let Some(ch) = chars.next() {
        let kind = match ch {
            '"' | '\'' => FragmentKind::Str,
            '`' => FragmentKind::Template,
            _ => {
                current.push(ch);
                continue;
            }
        };
        if !current.is_empty() {
            out.push(Fragment::new(FragmentKind::Code, std::mem::take(&mut current)));
        }
        let mut closed = false;
        while let Some(c) = chars.next() {
            if c == '\\' {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == ch {
                closed = true;
                break;
            } else {
                current.push(c);
            }
        }
        if !closed {
            return Err(EvalError::Unterminated(match kind {
                FragmentKind::Template => "template",
                _ => "string",
            }));
        }
        out.push(Fragment::new(kind, std::mem::take(&mut current)));
    }
    if !current.is_empty() {
        out.push(Fragment::new(FragmentKind::Code, current));
    }
    Ok(out)
}

/// Resolve escape sequences in a quoted string body.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Expand a template body: escapes are resolved and each `${name}` is
/// replaced by the variable's display value.  Placeholders naming an unknown,
/// reserved or undefined variable are kept verbatim.
pub fn interpolate(raw: &str, ctx: &dyn EvalContext) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => out.push('\\'),
            },
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                let rest = &raw[i + 2..];
                let Some(close) = rest.find('}') else {
                    out.push('$');
                    continue;
                };
                let name = &rest[..close];
                let placeholder = &raw[i..i + 2 + close + 1];
                let is_name = name.starts_with(is_name_start) && name.chars().all(is_name_char);
                let value = (is_name && !is_reserved(name))
                    .then(|| ctx.get_var(name))
                    .flatten()
                    .filter(|v| *v != Value::Undefined);
                match value {
                    Some(v) => out.push_str(&v.to_string()),
                    None => out.push_str(placeholder),
                }
                // Skip past the placeholder.
                let end = i + placeholder.len();
                while matches!(chars.peek(), Some((j, _)) if *j < end) {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    Str(String),
    /// Raw template body, interpolated at evaluation time.
    Template(String),
    Ident(String),

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,

    // Comparison
    Eq,       // ==
    Ne,       // !=
    StrictEq, // ===
    StrictNe, // !==
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And, // &&
    Or,  // ||

    // Assignment
    Assign,        // =
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=

    // Misc
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

/// Lexer over a single code fragment.
struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: char) -> Token {
        let mut s = String::new();
        s.push(first);

        // Hex literal
        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.advance();
            let mut hex = String::new();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                hex.extend(self.advance());
            }
            return Token::Number(
                i64::from_str_radix(&hex, 16).map(|n| n as f64).unwrap_or(f64::NAN),
            );
        }

        while matches!(self.peek(), Some('0'..='9')) {
            s.extend(self.advance());
        }
        if first != '.' && self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9')) {
            s.extend(self.advance());
            while matches!(self.peek(), Some('0'..='9')) {
                s.extend(self.advance());
            }
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && matches!(self.peek2(), Some('0'..='9' | '+' | '-'))
        {
            s.extend(self.advance());
            if matches!(self.peek(), Some('+' | '-')) {
                s.extend(self.advance());
            }
            while matches!(self.peek(), Some('0'..='9')) {
                s.extend(self.advance());
            }
        }
        Token::Number(s.parse().unwrap_or(f64::NAN))
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut s = String::new();
        s.push(first);
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            s.extend(self.advance());
        }
        Token::Ident(s)
    }

    fn next_token(&mut self) -> Result<Option<Token>, EvalError> {
        self.skip_ws();
        let Some(ch) = self.advance() else {
            return Ok(None);
        };

        let tok = match ch {
            '0'..='9' => self.read_number(ch),
            '.' if matches!(self.peek(), Some('0'..='9')) => self.read_number(ch),
            c if is_name_start(c) => self.read_ident(c),
            '+' => {
                if self.eat('=') {
                    Token::PlusAssign
                } else {
                    Token::Plus
                }
            }
            '-' => {
                if self.eat('=') {
                    Token::MinusAssign
                } else {
                    Token::Minus
                }
            }
            '*' => {
                if self.eat('*') {
                    Token::StarStar
                } else if self.eat('=') {
                    Token::StarAssign
                } else {
                    Token::Star
                }
            }
            '/' => {
                if self.eat('=') {
                    Token::SlashAssign
                } else {
                    Token::Slash
                }
            }
            '%' => {
                if self.eat('=') {
                    Token::PercentAssign
                } else {
                    Token::Percent
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::StrictNe
                    } else {
                        Token::Ne
                    }
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::StrictEq
                    } else {
                        Token::Eq
                    }
                } else {
                    Token::Assign
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '&' if self.eat('&') => Token::And,
            '|' if self.eat('|') => Token::Or,
            '?' => Token::Question,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c => return Err(EvalError::UnexpectedChar(c)),
        };
        Ok(Some(tok))
    }
}

/// Tokenize a whole expression, literal fragments included.
pub fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    for frag in segment_literals(src)? {
        match frag.kind {
            FragmentKind::Str => tokens.push(Token::Str(unescape(&frag.text))),
            FragmentKind::Template => tokens.push(Token::Template(frag.text)),
            FragmentKind::Code => {
                let mut lexer = Lexer::new(&frag.text);
                while let Some(tok) = lexer.next_token()? {
                    tokens.push(tok);
                }
            }
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Template(String),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(String, AssignOp, Box<Expr>),
    /// `let`/`const`/`name: type =` declaration.  The declared name is a
    /// target only and is never resolved while evaluating `value`'s side.
    Declare {
        name: String,
        ty: Option<DeclType>,
        constant: bool,
        value: Box<Expr>,
    },
    Call(String, Vec<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Deepest parenthesis, call, unary or `**` nesting the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Deepest tree the evaluator walks.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Longest token stream parsed as one expression.  Bounds the height of
/// left-leaning operator chains, which the parser builds without recursing.
pub const MAX_TOKENS: usize = 4096;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Run `f` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::TooDeep);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), EvalError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(EvalError::UnexpectedToken(format!(
                "{:?}, expected {what}",
                self.peek()
            )))
        }
    }

    fn ident(&mut self) -> Result<String, EvalError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(EvalError::UnexpectedToken(format!("{other:?}, expected a name"))),
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    /// Top level: an optional declaration form, then a full expression.
    fn parse_top(&mut self) -> Result<Expr, EvalError> {
        if self.peek() == &Token::Eof {
            return Err(EvalError::Empty);
        }
        let expr = match (self.peek(), self.peek_at(1)) {
            (Token::Ident(kw), Token::Ident(_)) if kw == "let" || kw == "const" => {
                let constant = kw == "const";
                self.pos += 1;
                self.parse_declaration(constant)?
            }
            (Token::Ident(_), Token::Colon)
                if matches!(self.peek_at(2), Token::Ident(_))
                    && self.peek_at(3) == &Token::Assign =>
            {
                self.parse_declaration(false)?
            }
            _ => self.parse_assign()?,
        };
        match self.peek() {
            Token::Eof => Ok(expr),
            other => Err(EvalError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    /// `name [: type] = value`
    fn parse_declaration(&mut self, constant: bool) -> Result<Expr, EvalError> {
        let name = self.ident()?;
        let ty = if self.eat(&Token::Colon) {
            Some(DeclType::parse(&self.ident()?))
        } else {
            None
        };
        self.expect(&Token::Assign, "`=`")?;
        let value = self.parse_assign()?;
        Ok(Expr::Declare {
            name,
            ty,
            constant,
            value: Box::new(value),
        })
    }

    fn parse_assign(&mut self) -> Result<Expr, EvalError> {
        self.nested(Self::parse_assign_inner)
    }

    fn parse_assign_inner(&mut self) -> Result<Expr, EvalError> {
        // Look-ahead: Ident followed by an assign op is an assignment.
        if let Token::Ident(name) = self.peek().clone() {
            let op = match self.peek_at(1) {
                Token::Assign => Some(AssignOp::Set),
                Token::PlusAssign => Some(AssignOp::Add),
                Token::MinusAssign => Some(AssignOp::Sub),
                Token::StarAssign => Some(AssignOp::Mul),
                Token::SlashAssign => Some(AssignOp::Div),
                Token::PercentAssign => Some(AssignOp::Rem),
                _ => None,
            };
            if let Some(op) = op {
                self.pos += 2;
                let rhs = self.parse_assign()?;
                return Ok(Expr::Assign(name, op, Box::new(rhs)));
            }
        }
        let lhs = self.parse_ternary()?;
        if matches!(
            self.peek(),
            Token::Assign
                | Token::PlusAssign
                | Token::MinusAssign
                | Token::StarAssign
                | Token::SlashAssign
                | Token::PercentAssign
        ) {
            return Err(EvalError::InvalidTarget);
        }
        Ok(lhs)
    }

    fn parse_ternary(&mut self) -> Result<Expr, EvalError> {
        let cond = self.parse_or()?;
        if self.eat(&Token::Question) {
            let then = self.parse_assign()?;
            self.expect(&Token::Colon, "`:` in ternary")?;
            let else_ = self.parse_assign()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(else_)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::StrictEq => BinOp::StrictEq,
                Token::StrictNe => BinOp::StrictNe,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_exponent()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_exponent()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// `**` is right-associative.
    fn parse_exponent(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_unary()?;
        if self.eat(&Token::StarStar) {
            let exp = self.nested(Self::parse_exponent)?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            Token::Ident(kw) if kw == "typeof" => UnaryOp::TypeOf,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Token::Number(x) => Ok(Expr::Literal(Value::Number(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Template(raw) => Ok(Expr::Template(raw)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "undefined" => Ok(Expr::Literal(Value::Undefined)),
                "NaN" => Ok(Expr::Literal(Value::Number(f64::NAN))),
                "Infinity" => Ok(Expr::Literal(Value::Number(f64::INFINITY))),
                _ if self.eat(&Token::LParen) => {
                    let mut args = Vec::new();
                    if self.peek() != &Token::RParen {
                        args.push(self.parse_assign()?);
                        while self.eat(&Token::Comma) {
                            args.push(self.parse_assign()?);
                        }
                    }
                    self.expect(&Token::RParen, &format!("`)` after arguments to {name}"))?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Var(name)),
            },
            Token::LParen => {
                let inner = self.parse_assign()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::Eof => Err(EvalError::UnexpectedToken("end of expression".into())),
            other => Err(EvalError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

/// Parse a VEIL expression into an AST.  A single trailing `;` is ignored.
pub fn parse_expr(src: &str) -> Result<Expr, EvalError> {
    let trimmed = src.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
    let tokens = tokenize(trimmed)?;
    if tokens.len() > MAX_TOKENS {
        return Err(EvalError::TooDeep);
    }
    Parser::new(tokens).parse_top()
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] against `ctx`.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    eval_at(expr, ctx, 0)
}

fn eval_at(expr: &Expr, ctx: &mut dyn EvalContext, depth: usize) -> Result<Value, EvalError> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(EvalError::TooDeep);
    }
    let depth = depth + 1;
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Template(raw) => Ok(Value::Str(interpolate(raw, ctx))),

        Expr::Var(name) => ctx
            .get_var(name)
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),

        Expr::Unary(UnaryOp::TypeOf, inner) => {
            // `typeof` of an unknown name is "undefined", not an error.
            let v = match inner.as_ref() {
                Expr::Var(name) => ctx.get_var(name).unwrap_or_default(),
                other => eval_at(other, ctx, depth)?,
            };
            Ok(Value::from(v.type_name()))
        }

        Expr::Unary(op, inner) => {
            let v = eval_at(inner, ctx, depth)?;
            Ok(match op {
                UnaryOp::Neg => v.neg(),
                UnaryOp::Plus => Value::Number(v.as_number()),
                UnaryOp::Not => Value::Bool(!v.as_bool()),
                UnaryOp::TypeOf => unreachable!("handled above"),
            })
        }

        Expr::Binary(op, lhs, rhs) => {
            // && and || short-circuit and yield an operand.
            match op {
                BinOp::And => {
                    let l = eval_at(lhs, ctx, depth)?;
                    return if l.as_bool() { eval_at(rhs, ctx, depth) } else { Ok(l) };
                }
                BinOp::Or => {
                    let l = eval_at(lhs, ctx, depth)?;
                    return if l.as_bool() { Ok(l) } else { eval_at(rhs, ctx, depth) };
                }
                _ => {}
            }
            let l = eval_at(lhs, ctx, depth)?;
            let r = eval_at(rhs, ctx, depth)?;
            Ok(eval_binop(*op, &l, &r))
        }

        Expr::Ternary(cond, then, else_) => {
            if eval_at(cond, ctx, depth)?.as_bool() {
                eval_at(then, ctx, depth)
            } else {
                eval_at(else_, ctx, depth)
            }
        }

        Expr::Assign(name, op, rhs) => {
            let rval = eval_at(rhs, ctx, depth)?;
            let new_val = match op {
                AssignOp::Set => rval,
                _ => {
                    let cur = ctx
                        .get_var(name)
                        .ok_or_else(|| EvalError::Undeclared(name.clone()))?;
                    match op {
                        AssignOp::Add => cur.add(&rval),
                        AssignOp::Sub => cur.sub(&rval),
                        AssignOp::Mul => cur.mul(&rval),
                        AssignOp::Div => cur.div(&rval),
                        AssignOp::Rem => cur.rem(&rval),
                        AssignOp::Set => unreachable!(),
                    }
                }
            };
            ctx.assign_var(name, new_val)
        }

        Expr::Declare {
            name,
            ty,
            constant,
            value,
        } => {
            let v = eval_at(value, ctx, depth)?;
            ctx.declare_var(name, v, ty.clone(), *constant)
        }

        Expr::Call(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for ae in arg_exprs {
                args.push(eval_at(ae, ctx, depth)?);
            }
            call_builtin(name, &args).ok_or_else(|| EvalError::UnknownFunction(name.clone()))
        }
    }
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Value {
    use std::cmp::Ordering;
    match op {
        BinOp::Add => l.add(r),
        BinOp::Sub => l.sub(r),
        BinOp::Mul => l.mul(r),
        BinOp::Div => l.div(r),
        BinOp::Rem => l.rem(r),
        BinOp::Pow => l.pow(r),

        BinOp::Eq => Value::Bool(l.loose_eq(r)),
        BinOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinOp::StrictEq => Value::Bool(l.strict_eq(r)),
        BinOp::StrictNe => Value::Bool(!l.strict_eq(r)),

        BinOp::Lt => Value::Bool(l.compare(r) == Some(Ordering::Less)),
        BinOp::Le => Value::Bool(matches!(l.compare(r), Some(Ordering::Less | Ordering::Equal))),
        BinOp::Gt => Value::Bool(l.compare(r) == Some(Ordering::Greater)),
        BinOp::Ge => Value::Bool(matches!(
            l.compare(r),
            Some(Ordering::Greater | Ordering::Equal)
        )),

        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

/// Convenience: parse and evaluate an expression string.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    let expr = parse_expr(src)?;
    eval_expr(&expr, ctx)
}

// ── Evaluator facade ──────────────────────────────────────────────────────────

/// The expression evaluator handed to statement handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Evaluate `src`, logging any failure and yielding [`Value::Undefined`].
    pub fn evaluate(&self, src: &str, ctx: &mut dyn EvalContext) -> Value {
        match self.try_evaluate(src, ctx) {
            Ok(v) => v,
            Err(e) => {
                error!(expr = src.trim(), "invalid expression: {e}");
                Value::Undefined
            }
        }
    }

    /// Evaluate `src`, returning the failure to the caller.
    pub fn try_evaluate(&self, src: &str, ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
        eval_str(src, ctx)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> Value {
        eval_str(src, &mut VarStore::new()).expect("eval failed")
    }

    fn eval_in(src: &str, vars: &mut VarStore) -> Value {
        eval_str(src, vars).expect("eval failed")
    }

    fn store_with(name: &str, v: Value) -> VarStore {
        let mut vars = VarStore::new();
        vars.declare(name, v, None, false).unwrap();
        vars
    }

    #[test]
    fn segments_code_and_literals() {
        let frags = segment_literals(r#"a + "b\"c" + `t${x}`"#).unwrap();
        let kinds: Vec<_> = frags.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FragmentKind::Code,
                FragmentKind::Str,
                FragmentKind::Code,
                FragmentKind::Template
            ]
        );
        assert_eq!(frags[1].text, r#"b\"c"#);
        assert_eq!(frags[3].text, "t${x}");
    }

    #[test]
    fn quote_inside_other_literal_does_not_split() {
        let frags = segment_literals(r#"'it"s' + `a'b`"#).unwrap();
        assert_eq!(frags.len(), 3);
        assert_eq!(frags[0].text, "it\"s");
        assert_eq!(frags[2].text, "a'b");
    }

    #[test]
    fn unterminated_literal_is_error() {
        assert_eq!(
            segment_literals("'abc").unwrap_err(),
            EvalError::Unterminated("string")
        );
        assert_eq!(
            segment_literals("`abc").unwrap_err(),
            EvalError::Unterminated("template")
        );
    }

    #[test]
    fn literals() {
        assert_eq!(eval("42"), Value::Number(42.0));
        assert_eq!(eval("2.5"), Value::Number(2.5));
        assert_eq!(eval(".5"), Value::Number(0.5));
        assert_eq!(eval("0x10"), Value::Number(16.0));
        assert_eq!(eval("'hi'"), Value::from("hi"));
        assert_eq!(eval(r#""a\nb""#), Value::from("a\nb"));
        assert_eq!(eval("true"), Value::Bool(true));
        assert_eq!(eval("null"), Value::Null);
        assert_eq!(eval("undefined"), Value::Undefined);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("2 + 2"), Value::Number(4.0));
        assert_eq!(eval("10 - 4"), Value::Number(6.0));
        assert_eq!(eval("10 / 4"), Value::Number(2.5));
        assert_eq!(eval("10 % 3"), Value::Number(1.0));
        assert_eq!(eval("2 ** 3 ** 2"), Value::Number(512.0));
        assert_eq!(eval("-(3 + 2)"), Value::Number(-5.0));
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("2 + 3 * 4"), Value::Number(14.0));
        assert_eq!(eval("(2 + 3) * 4"), Value::Number(20.0));
        assert_eq!(eval("1 + 2 == 3 && 4 > 3"), Value::Bool(true));
    }

    #[test]
    fn string_concat() {
        assert_eq!(eval("'a' + 1 + 2"), Value::from("a12"));
        assert_eq!(eval("1 + 2 + 'a'"), Value::from("3a"));
    }

    #[test]
    fn comparison_and_equality() {
        assert_eq!(eval("3 == '3'"), Value::Bool(true));
        assert_eq!(eval("3 === '3'"), Value::Bool(false));
        assert_eq!(eval("3 !== 3"), Value::Bool(false));
        assert_eq!(eval("'b' > 'a'"), Value::Bool(true));
        assert_eq!(eval("2 <= 2"), Value::Bool(true));
    }

    #[test]
    fn logical_operators_yield_operands() {
        assert_eq!(eval("0 || 'x'"), Value::from("x"));
        assert_eq!(eval("'a' && 'b'"), Value::from("b"));
        assert_eq!(eval("!0"), Value::Bool(true));
    }

    #[test]
    fn ternary() {
        assert_eq!(eval("1 ? 10 : 20"), Value::Number(10.0));
        assert_eq!(eval("0 ? 10 : 20"), Value::Number(20.0));
    }

    #[test]
    fn variable_lookup_reads_current_value() {
        let mut vars = store_with("x", Value::Number(7.0));
        assert_eq!(eval_in("x + 1", &mut vars), Value::Number(8.0));
        vars.assign("x", Value::Number(1.0)).unwrap();
        assert_eq!(eval_in("x + 1", &mut vars), Value::Number(2.0));
    }

    #[test]
    fn unknown_variable_is_error() {
        assert_eq!(
            eval_str("nope + 1", &mut VarStore::new()),
            Err(EvalError::UnknownVariable("nope".into()))
        );
    }

    #[test]
    fn variable_values_are_not_reparsed() {
        // A value that looks like code stays a string.
        let mut vars = store_with("s", Value::from("1 + 1"));
        assert_eq!(eval_in("s", &mut vars), Value::from("1 + 1"));
        assert_eq!(eval_in("s + 1", &mut vars), Value::from("1 + 11"));
    }

    #[test]
    fn templates_interpolate() {
        let mut vars = store_with("name", Value::from("world"));
        assert_eq!(eval_in("`hello ${name}`", &mut vars), Value::from("hello world"));
        assert_eq!(eval_in("`${missing}!`", &mut vars), Value::from("${missing}!"));
        assert_eq!(eval_in("`a\\`b`", &mut vars), Value::from("a`b"));
        assert_eq!(eval_in("`x` + 1", &mut vars), Value::from("x1"));
    }

    #[test]
    fn template_placeholder_needs_word_name() {
        let mut vars = store_with("a", Value::Number(1.0));
        assert_eq!(eval_in("`${ a }`", &mut vars), Value::from("${ a }"));
        assert_eq!(eval_in("`${a}${a}`", &mut vars), Value::from("11"));
        assert_eq!(eval_in("`cost: $5`", &mut vars), Value::from("cost: $5"));
    }

    #[test]
    fn undefined_placeholder_is_kept() {
        let mut vars = store_with("u", Value::Undefined);
        assert_eq!(eval_in("`u=${u}`", &mut vars), Value::from("u=${u}"));
        assert_eq!(eval_in("u", &mut vars), Value::Undefined);
    }

    #[test]
    fn names_are_ascii_words_or_dollar() {
        let mut vars = store_with("$total_2", Value::Number(3.0));
        assert_eq!(eval_in("$total_2 + 1", &mut vars), Value::Number(4.0));
        assert_eq!(eval_in("`${$total_2}`", &mut vars), Value::from("3"));
        assert_eq!(eval_str("caf\u{e9}", &mut vars), Err(EvalError::UnexpectedChar('\u{e9}')));
        assert_eq!(eval_in("`${caf\u{e9}}`", &mut vars), Value::from("${caf\u{e9}}"));
    }

    #[test]
    fn declarations() {
        let mut vars = VarStore::new();
        assert_eq!(eval_in("let x = 5", &mut vars), Value::Number(5.0));
        assert_eq!(eval_in("y: string = x + 1;", &mut vars), Value::from("6"));
        assert_eq!(vars.lookup("y"), Some(&Value::from("6")));
        eval_in("const k: number = '3'", &mut vars);
        assert_eq!(vars.lookup("k"), Some(&Value::Number(3.0)));
        assert!(vars.is_const("k"));
    }

    #[test]
    fn declaring_name_is_not_resolved_on_the_left() {
        let mut vars = store_with("x", Value::Number(1.0));
        assert_eq!(eval_in("x: number = x + 1", &mut vars), Value::Number(2.0));
    }

    #[test]
    fn ternary_is_not_a_declaration() {
        let mut vars = store_with("a", Value::Bool(false));
        assert_eq!(eval_in("a ? 1 : 2", &mut vars), Value::Number(2.0));
    }

    #[test]
    fn assignment() {
        let mut vars = store_with("x", Value::Number(10.0));
        eval_in("x += 5", &mut vars);
        assert_eq!(vars.lookup("x"), Some(&Value::Number(15.0)));
        assert_eq!(
            eval_str("z = 1", &mut vars),
            Err(EvalError::Undeclared("z".into()))
        );
        assert_eq!(eval_str("1 = 2", &mut vars), Err(EvalError::InvalidTarget));
    }

    #[test]
    fn reserved_names_never_resolve() {
        let mut vars = VarStore::new();
        assert_eq!(
            eval_str("__skip", &mut vars),
            Err(EvalError::UnknownVariable("__skip".into()))
        );
        assert_eq!(
            eval_str("let __x = 1", &mut vars),
            Err(EvalError::Reserved("__x".into()))
        );
    }

    #[test]
    fn typeof_operator() {
        assert_eq!(eval("typeof 1"), Value::from("number"));
        assert_eq!(eval("typeof missing"), Value::from("undefined"));
    }

    #[test]
    fn builtin_calls() {
        assert_eq!(eval("String(4) + 1"), Value::from("41"));
        assert_eq!(eval("upper('abc')"), Value::from("ABC"));
        assert_eq!(
            eval_str("badTrigger()", &mut VarStore::new()),
            Err(EvalError::UnknownFunction("badTrigger".into()))
        );
    }

    #[test]
    fn trailing_semicolon_stripped_once() {
        assert_eq!(eval("2+2;"), Value::Number(4.0));
        assert!(eval_str("2+2;;", &mut VarStore::new()).is_err());
    }

    #[test]
    fn malformed_expressions() {
        let mut vars = VarStore::new();
        assert_eq!(eval_str("", &mut vars), Err(EvalError::Empty));
        assert!(eval_str("1 +", &mut vars).is_err());
        assert!(eval_str("(1", &mut vars).is_err());
        assert_eq!(eval_str("1 # 2", &mut vars), Err(EvalError::UnexpectedChar('#')));
    }

    #[test]
    fn nesting_is_bounded() {
        let mut vars = VarStore::new();
        let nest = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert_eq!(eval_str(&nest(MAX_NESTING / 2), &mut vars), Ok(Value::Number(1.0)));
        assert_eq!(eval_str(&nest(MAX_NESTING + 1), &mut vars), Err(EvalError::TooDeep));
        assert_eq!(eval_str(&nest(10_000), &mut vars), Err(EvalError::TooDeep));

        let prefix = |op: &str, n: usize| format!("{}1", op.repeat(n));
        assert_eq!(eval_str(&prefix("!", 10), &mut vars), Ok(Value::Bool(true)));
        assert_eq!(eval_str(&prefix("!", 1_000), &mut vars), Err(EvalError::TooDeep));
        assert_eq!(eval_str(&prefix("- ", 1_000), &mut vars), Err(EvalError::TooDeep));
        assert_eq!(eval_str(&["2"; 1_000].join(" ** "), &mut vars), Err(EvalError::TooDeep));
        assert_eq!(eval_str(&format!("len({})", nest(1_000)), &mut vars), Err(EvalError::TooDeep));
    }

    #[test]
    fn long_chains_are_bounded() {
        let mut vars = VarStore::new();
        let sum = |n: usize| vec!["1"; n].join(" + ");
        assert_eq!(eval_str(&sum(100), &mut vars), Ok(Value::Number(100.0)));
        // Too tall for the evaluator, but short enough to tokenize.
        assert_eq!(eval_str(&sum(MAX_EVAL_DEPTH + 10), &mut vars), Err(EvalError::TooDeep));
        assert_eq!(eval_str(&sum(MAX_TOKENS), &mut vars), Err(EvalError::TooDeep));
    }

    #[test]
    fn failure_after_deep_nesting_does_not_poison_evaluator() {
        let mut vars = VarStore::new();
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(Evaluator.evaluate(&deep, &mut vars), Value::Undefined);
        assert_eq!(Evaluator.evaluate("(((2)))", &mut vars), Value::Number(2.0));
    }

    #[test]
    fn evaluator_yields_undefined_on_failure() {
        let mut vars = VarStore::new();
        assert_eq!(Evaluator.evaluate("1 +", &mut vars), Value::Undefined);
        assert_eq!(Evaluator.evaluate("2+2;", &mut vars), Value::Number(4.0));
    }
}
