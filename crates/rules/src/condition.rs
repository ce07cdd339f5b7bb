//! Applicability conditions for required-clause rules.
//!
//! A required clause only applies when its `when` expression holds over the
//! request payload and the candidate text:
//!
//! ```text
//! payload.discount_pct > 15
//! payload.category == "software" AND payload.planned_spend >= 50000
//! content MATCHES "(?i)personal\\s+data"
//! NOT (payload.renewal == true)
//! ```
//!
//! Grammar (informal):
//! ```text
//! expr     = clause (("AND" | "OR") clause)*
//! clause   = ["NOT"] atom | ["NOT"] "(" expr ")"
//! atom     = field OP value
//! field    = "payload." PATH | "content"
//! OP       = ["NOT"] ("CONTAINS" | "MATCHES" | "STARTS_WITH" | "ENDS_WITH")
//!          | "==" | "!=" | ">" | "<" | ">=" | "<="
//! value    = QUOTED_STRING | NUMBER | IDENT
//! ```

use procuresense_core::RequestPayload;
use regex_lite::Regex;
use std::borrow::Cow;

/// A parsed condition tree.
#[derive(Debug, Clone)]
pub enum Condition {
    /// A single comparison.
    Atom(Atom),
    /// Logical AND of two sub-conditions.
    And(Box<Condition>, Box<Condition>),
    /// Logical OR of two sub-conditions.
    Or(Box<Condition>, Box<Condition>),
    /// Negation.
    Not(Box<Condition>),
    /// Always true (empty condition).
    Always,
}

#[derive(Debug, Clone)]
pub struct Atom {
    pub field: Field,
    pub op: Op,
    pub value: Value,
}

/// A field reference in a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// `payload.<path>`, a (possibly dotted) request payload field.
    Payload(String),
    /// `content`: the candidate text under validation.
    Content,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Contains,
    NotContains,
    Matches,
    NotMatches,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// A literal value in a condition.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Num(f64),
    /// Pattern for MATCHES, compiled at parse time.
    Pattern(Regex),
}

/// Inputs a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub payload: Option<&'a RequestPayload>,
    pub content: Option<&'a str>,
}

impl<'a> EvalContext<'a> {
    pub fn new(content: &'a str, payload: &'a RequestPayload) -> Self {
        Self {
            payload: Some(payload),
            content: Some(content),
        }
    }
}

impl Condition {
    /// Evaluate this condition against a context.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Atom(atom) => atom.evaluate(ctx),
            Condition::And(a, b) => a.evaluate(ctx) && b.evaluate(ctx),
            Condition::Or(a, b) => a.evaluate(ctx) || b.evaluate(ctx),
            Condition::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// Payload paths this condition reads.
    pub fn payload_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'s>(&'s self, out: &mut Vec<&'s str>) {
        match self {
            Condition::Always => {}
            Condition::Atom(atom) => {
                if let Field::Payload(path) = &atom.field {
                    out.push(path);
                }
            }
            Condition::And(a, b) | Condition::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Condition::Not(inner) => inner.collect_fields(out),
        }
    }
}

impl Atom {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        let field_value = self.resolve_field(ctx);
        let fv = field_value.as_deref();
        match self.op {
            Op::Contains => fv.is_some_and(|fv| fv.contains(self.value.as_str().as_ref())),
            Op::NotContains => fv.is_none_or(|fv| !fv.contains(self.value.as_str().as_ref())),
            Op::Matches => fv.is_some_and(|fv| self.value.is_match(fv)),
            Op::NotMatches => fv.is_none_or(|fv| !self.value.is_match(fv)),
            Op::StartsWith => fv.is_some_and(|fv| fv.starts_with(self.value.as_str().as_ref())),
            Op::NotStartsWith => {
                fv.is_none_or(|fv| !fv.starts_with(self.value.as_str().as_ref()))
            }
            Op::EndsWith => fv.is_some_and(|fv| fv.ends_with(self.value.as_str().as_ref())),
            Op::NotEndsWith => fv.is_none_or(|fv| !fv.ends_with(self.value.as_str().as_ref())),
            Op::Eq => match (fv, &self.value) {
                (Some(fv), Value::Num(n)) => fv.parse::<f64>().is_ok_and(|x| x == *n),
                (Some(fv), value) => fv == value.as_str(),
                (None, _) => false,
            },
            Op::NotEq => match (fv, &self.value) {
                (Some(fv), Value::Num(n)) => fv.parse::<f64>().is_ok_and(|x| x != *n),
                (Some(fv), value) => fv != value.as_str(),
                (None, _) => true,
            },
            Op::Gt => self.compare_num(fv, |a, b| a > b),
            Op::Lt => self.compare_num(fv, |a, b| a < b),
            Op::Gte => self.compare_num(fv, |a, b| a >= b),
            Op::Lte => self.compare_num(fv, |a, b| a <= b),
        }
    }

    fn resolve_field<'c>(&self, ctx: &EvalContext<'c>) -> Option<Cow<'c, str>> {
        match &self.field {
            Field::Content => ctx.content.map(Cow::Borrowed),
            Field::Payload(path) => ctx.payload?.text(path).map(Cow::Owned),
        }
    }

    fn compare_num(&self, field_value: Option<&str>, cmp: impl Fn(f64, f64) -> bool) -> bool {
        match (field_value, &self.value) {
            (Some(fv), Value::Num(n)) => fv
                .trim()
                .trim_end_matches('%')
                .parse::<f64>()
                .is_ok_and(|x| cmp(x, *n)),
            _ => false,
        }
    }
}

impl Value {
    fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::Str(s) => Cow::Borrowed(s),
            Value::Num(n) => Cow::Owned(n.to_string()),
            Value::Pattern(re) => Cow::Borrowed(re.as_str()),
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Value::Pattern(re) => re.is_match(text),
            other => text.contains(other.as_str().as_ref()),
        }
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

/// Parse a condition expression string into a [`Condition`] tree.
///
/// Returns `Ok(Condition::Always)` for empty input.
pub fn parse_condition(input: &str) -> Result<Condition, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Condition::Always);
    }
    let tokens = tokenize(input)?;
    let (cond, rest) = parse_or(&tokens)?;
    if !rest.is_empty() {
        return Err(format!("unexpected tokens after expression: {rest:?}"));
    }
    Ok(cond)
}

/// Token types for the condition DSL.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    And,
    Or,
    Not,
    Contains,
    Matches,
    StartsWith,
    EndsWith,
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        // Only quotes and backslashes are escapes; anything
                        // else keeps its backslash so regex classes survive.
                        Some('\\') => match chars.next() {
                            Some(escaped) if escaped == quote || escaped == '\\' => {
                                s.push(escaped)
                            }
                            Some(other) => {
                                s.push('\\');
                                s.push(other);
                            }
                            None => return Err("unterminated string literal".into()),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string literal".into()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '>' | '<' => {
                chars.next();
                let or_equal = chars.peek() == Some(&'=');
                if or_equal {
                    chars.next();
                }
                tokens.push(match (c, or_equal) {
                    ('>', true) => Token::Gte,
                    ('>', false) => Token::Gt,
                    (_, true) => Token::Lte,
                    (_, false) => Token::Lt,
                });
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            _ if c.is_ascii_digit() || c == '-' => {
                let mut num_str = String::new();
                num_str.push(c);
                chars.next();
                while let Some(&nc) = chars.peek() {
                    if nc.is_ascii_digit() || nc == '.' {
                        num_str.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = num_str
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number: {num_str}"))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut word = String::new();
                while let Some(&wc) = chars.peek() {
                    if wc.is_alphanumeric() || wc == '_' || wc == '.' {
                        word.push(wc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match word.as_str() {
                    "AND" | "and" => Token::And,
                    "OR" | "or" => Token::Or,
                    "NOT" | "not" => Token::Not,
                    "CONTAINS" | "contains" => Token::Contains,
                    "MATCHES" | "matches" => Token::Matches,
                    "STARTS_WITH" | "starts_with" => Token::StartsWith,
                    "ENDS_WITH" | "ends_with" => Token::EndsWith,
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            _ => return Err(format!("unexpected character: {c}")),
        }
    }

    Ok(tokens)
}

fn parse_or(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (mut left, mut rest) = parse_and(tokens)?;
    while rest.first() == Some(&Token::Or) {
        let (right, remaining) = parse_and(&rest[1..])?;
        left = Condition::Or(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_and(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (mut left, mut rest) = parse_unary(tokens)?;
    while rest.first() == Some(&Token::And) {
        let (right, remaining) = parse_unary(&rest[1..])?;
        left = Condition::And(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_unary(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    // Leading NOT negates the following atom or group; `field NOT OP value`
    // is handled by parse_op as a negated operator.
    if tokens.first() == Some(&Token::Not) {
        let (inner, rest) = parse_primary(&tokens[1..])?;
        return Ok((Condition::Not(Box::new(inner)), rest));
    }
    parse_primary(tokens)
}

fn parse_primary(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    if tokens.first() == Some(&Token::LParen) {
        let (inner, rest) = parse_or(&tokens[1..])?;
        if rest.first() != Some(&Token::RParen) {
            return Err("expected closing parenthesis".into());
        }
        return Ok((inner, &rest[1..]));
    }
    parse_atom(tokens)
}

fn parse_atom(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (field, rest) = parse_field(tokens)?;
    let (op, rest) = parse_op(rest)?;
    let (mut value, rest) = parse_value(rest)?;

    if matches!(op, Op::Matches | Op::NotMatches) {
        let pattern = value.as_str().into_owned();
        let re = Regex::new(&pattern).map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
        value = Value::Pattern(re);
    }

    Ok((Condition::Atom(Atom { field, op, value }), rest))
}

fn parse_field(tokens: &[Token]) -> Result<(Field, &[Token]), String> {
    match tokens.first() {
        Some(Token::Ident(name)) => {
            let field = if let Some(path) = name.strip_prefix("payload.") {
                if path.is_empty() {
                    return Err("empty payload field path".into());
                }
                Field::Payload(path.to_string())
            } else if name == "content" {
                Field::Content
            } else {
                Field::Payload(name.to_string())
            };
            Ok((field, &tokens[1..]))
        }
        _ => Err(format!("expected field name, got {:?}", tokens.first())),
    }
}

fn parse_op(tokens: &[Token]) -> Result<(Op, &[Token]), String> {
    if tokens.first() == Some(&Token::Not) && tokens.len() > 1 {
        let (base_op, rest) = parse_base_op(&tokens[1..])?;
        let negated = match base_op {
            Op::Contains => Op::NotContains,
            Op::Matches => Op::NotMatches,
            Op::StartsWith => Op::NotStartsWith,
            Op::EndsWith => Op::NotEndsWith,
            other => return Err(format!("cannot negate operator: {other:?}")),
        };
        return Ok((negated, rest));
    }
    parse_base_op(tokens)
}

fn parse_base_op(tokens: &[Token]) -> Result<(Op, &[Token]), String> {
    let op = match tokens.first() {
        Some(Token::Contains) => Op::Contains,
        Some(Token::Matches) => Op::Matches,
        Some(Token::StartsWith) => Op::StartsWith,
        Some(Token::EndsWith) => Op::EndsWith,
        Some(Token::Eq) => Op::Eq,
        Some(Token::NotEq) => Op::NotEq,
        Some(Token::Gt) => Op::Gt,
        Some(Token::Lt) => Op::Lt,
        Some(Token::Gte) => Op::Gte,
        Some(Token::Lte) => Op::Lte,
        other => return Err(format!("expected operator, got {other:?}")),
    };
    Ok((op, &tokens[1..]))
}

fn parse_value(tokens: &[Token]) -> Result<(Value, &[Token]), String> {
    match tokens.first() {
        Some(Token::Str(s)) => Ok((Value::Str(s.clone()), &tokens[1..])),
        Some(Token::Num(n)) => Ok((Value::Num(*n), &tokens[1..])),
        // Bare identifier as a string value (e.g. `payload.renewal == true`).
        Some(Token::Ident(s)) => Ok((Value::Str(s.clone()), &tokens[1..])),
        other => Err(format!("expected value (string or number), got {other:?}")),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
