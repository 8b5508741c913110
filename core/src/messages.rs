//! Message template compiler.
//!
//! Templates are plain strings with three embedded forms:
//!
//! - `{{#token}}` renders a context entry, HTML-escaped when
//!   [`RenderOptions::escape_html`] is set;
//! - `{{:#token}}` renders a context entry verbatim;
//! - `{if(condition, "when true", "when false")}` picks a branch by
//!   evaluating `condition` against the context.
//!
//! Token paths are dot-separated (`#error.message`) and support the
//! `length` pseudo-key (`#valids.length`). Conditions accept references,
//! string/number/boolean/null literals, `!`, `==`, `!=`, `<`, `<=`, `>`,
//! `>=`, `&&`, `||` and parentheses.
//!
//! A message is either one template or a map of templates keyed by locale
//! tag; lookups fall back to [`DEFAULT_LOCALE`]. Rendering never fails:
//! unresolved tokens render as the empty string.
//!
//! # Examples
//!
//! ```
//! use typeshape_core::{compile, Context, RenderOptions, Value};
//!
//! let message = compile(r#"{{#label}} must be {if(#valids.length == 1, "", "one of ")}{{#valids}}"#).unwrap();
//!
//! let mut context = Context::new();
//! context.insert("label".into(), Value::from("\"value\""));
//! context.insert("valids".into(), Value::Array(vec![Value::from("a"), Value::from("b")]));
//!
//! assert_eq!(
//!     message.render(None, &context, &RenderOptions::default()),
//!     "\"value\" must be one of [a, b]"
//! );
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SchemaError};
use crate::value::{Context, Value};

/// Locale used when a localized message has no entry for the requested one.
pub const DEFAULT_LOCALE: &str = "en";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(:)?\s*#?([A-Za-z0-9_$][A-Za-z0-9_.$-]*)\s*\}\}|\{if\(")
        .expect("static regex must compile")
});

/// Uncompiled message: a single template or templates keyed by locale tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageSource {
    Text(String),
    Localized(BTreeMap<String, String>),
}

impl MessageSource {
    /// Reads a source from a dynamic value: a string, or an object whose
    /// values are all strings.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(MessageSource::Text(text.clone())),
            Value::Object(map) => map
                .iter()
                .map(|(locale, text)| match text {
                    Value::String(text) => Ok((locale.clone(), text.clone())),
                    other => Err(SchemaError::InvalidValue(format!(
                        "message for locale {locale} must be a string, got {}",
                        other.representation()
                    ))),
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(MessageSource::Localized),
            other => Err(SchemaError::InvalidValue(format!(
                "message must be a string or a locale map, got {}",
                other.representation()
            ))),
        }
    }
}

impl From<&str> for MessageSource {
    fn from(text: &str) -> Self {
        MessageSource::Text(text.to_string())
    }
}

impl From<String> for MessageSource {
    fn from(text: String) -> Self {
        MessageSource::Text(text)
    }
}

impl From<BTreeMap<String, String>> for MessageSource {
    fn from(map: BTreeMap<String, String>) -> Self {
        MessageSource::Localized(map)
    }
}

/// Rendering switches taken from the active preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub escape_html: bool,
}

/// A compiled single-locale template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Token { path: Vec<String>, raw: bool },
    Conditional {
        condition: Expr,
        then: Expr,
        otherwise: Expr,
    },
}

impl Template {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidTemplate`] for an unterminated or
    /// malformed `{if(...)}` segment.
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |reason: String| SchemaError::InvalidTemplate {
            template: source.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut pos = 0;

        while let Some(caps) = TOKEN_RE.captures_at(source, pos) {
            let Some(whole) = caps.get(0) else { break };
            literal.push_str(&source[pos..whole.start()]);
            flush_literal(&mut literal, &mut segments);

            if let Some(name) = caps.get(2) {
                segments.push(Segment::Token {
                    path: split_path(name.as_str()),
                    raw: caps.get(1).is_some(),
                });
                pos = whole.end();
                continue;
            }

            let (body, end) = scan_conditional(source, whole.end())
                .ok_or_else(|| invalid("unterminated conditional".to_string()))?;
            let parts = split_top_level(body);
            let [condition, then, otherwise] = parts.as_slice() else {
                return Err(invalid(format!(
                    "conditional takes 3 arguments, found {}",
                    parts.len()
                )));
            };
            segments.push(Segment::Conditional {
                condition: parse_expr(condition).map_err(&invalid)?,
                then: parse_expr(then).map_err(&invalid)?,
                otherwise: parse_expr(otherwise).map_err(&invalid)?,
            });
            pos = end;
        }

        literal.push_str(&source[pos..]);
        flush_literal(&mut literal, &mut segments);

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders against a context. Never fails.
    pub fn render(&self, context: &Context, options: &RenderOptions) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Token { path, raw } => {
                    let text = resolve(context, path).to_string();
                    if !raw && options.escape_html {
                        out.push_str(&escape_html(&text));
                    } else {
                        out.push_str(&text);
                    }
                }
                Segment::Conditional {
                    condition,
                    then,
                    otherwise,
                } => {
                    let branch = if condition.eval(context).is_truthy() {
                        then
                    } else {
                        otherwise
                    };
                    out.push_str(&branch.eval(context).to_string());
                }
            }
        }
        out
    }
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Text(std::mem::take(literal)));
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.trim_start_matches('#')
        .split('.')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn resolve(context: &Context, path: &[String]) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return Value::Undefined;
    };
    context
        .get(first)
        .map(|value| value.lookup(rest))
        .unwrap_or_default()
}

/// Finds the `)}` closing a conditional opened just before `start`,
/// skipping quoted strings and nested parentheses.
fn scan_conditional(source: &str, start: usize) -> Option<(&str, usize)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in source[start..].char_indices() {
        let idx = start + offset;
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            ')' => {
                return source[idx + 1..]
                    .starts_with('}')
                    .then(|| (&source[start..idx], idx + 2));
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut last = 0;

    for (idx, ch) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[last..idx]);
                last = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[last..]);
    parts
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Conditional expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Reference(Vec<String>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    fn eval(&self, context: &Context) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Reference(path) => resolve(context, path),
            Expr::Not(inner) => Value::Bool(!inner.eval(context).is_truthy()),
            Expr::Binary { op, left, right } => {
                let left = left.eval(context);
                let result = match op {
                    BinaryOp::And => left.is_truthy() && right.eval(context).is_truthy(),
                    BinaryOp::Or => left.is_truthy() || right.eval(context).is_truthy(),
                    BinaryOp::Eq => loose_eq(&left, &right.eval(context)),
                    BinaryOp::Ne => !loose_eq(&left, &right.eval(context)),
                    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                        ordering(&left, &right.eval(context)).is_some_and(|ord| match op {
                            BinaryOp::Lt => ord.is_lt(),
                            BinaryOp::Le => ord.is_le(),
                            BinaryOp::Gt => ord.is_gt(),
                            _ => ord.is_ge(),
                        })
                    }
                };
                Value::Bool(result)
            }
        }
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number(f64),
    Str(String),
    Ident(String),
    Op(BinaryOp),
    Not,
    Open,
    Close,
}

fn lex(input: &str) -> std::result::Result<Vec<Lexeme>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                out.push(Lexeme::Open);
                i += 1;
            }
            ')' => {
                out.push(Lexeme::Close);
                i += 1;
            }
            '"' | '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(c) if *c == ch => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            i += 1;
                        }
                    }
                }
                out.push(Lexeme::Str(text));
            }
            '=' if next == Some('=') => {
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
                out.push(Lexeme::Op(BinaryOp::Eq));
            }
            '!' if next == Some('=') => {
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
                out.push(Lexeme::Op(BinaryOp::Ne));
            }
            '!' => {
                out.push(Lexeme::Not);
                i += 1;
            }
            '<' | '>' => {
                let inclusive = next == Some('=');
                out.push(Lexeme::Op(match (ch, inclusive) {
                    ('<', true) => BinaryOp::Le,
                    ('<', false) => BinaryOp::Lt,
                    (_, true) => BinaryOp::Ge,
                    (_, false) => BinaryOp::Gt,
                }));
                i += if inclusive { 2 } else { 1 };
            }
            '&' if next == Some('&') => {
                out.push(Lexeme::Op(BinaryOp::And));
                i += 2;
            }
            '|' if next == Some('|') => {
                out.push(Lexeme::Op(BinaryOp::Or));
                i += 2;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|c| c.is_ascii_digit() || *c == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number {text}"))?;
                out.push(Lexeme::Number(number));
            }
            c if c == '#' || c == '_' || c == '$' || c.is_alphabetic() => {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '-'))
                {
                    i += 1;
                }
                out.push(Lexeme::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character {other:?} in condition")),
        }
    }

    Ok(out)
}

fn parse_expr(input: &str) -> std::result::Result<Expr, String> {
    let lexemes = lex(input)?;
    let mut parser = ExprParser { lexemes, pos: 0 };
    let expr = parser.or()?;
    if parser.pos != parser.lexemes.len() {
        return Err(format!("unexpected trailing input in {:?}", input.trim()));
    }
    Ok(expr)
}

struct ExprParser {
    lexemes: Vec<Lexeme>,
    pos: usize,
}

impl ExprParser {
    fn peek_op(&self) -> Option<BinaryOp> {
        match self.lexemes.get(self.pos) {
            Some(Lexeme::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn or(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.and()?;
        while self.peek_op() == Some(BinaryOp::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.comparison()?;
        while self.peek_op() == Some(BinaryOp::And) {
            self.pos += 1;
            let right = self.comparison()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> std::result::Result<Expr, String> {
        let left = self.unary()?;
        match self.peek_op() {
            Some(op) if !matches!(op, BinaryOp::And | BinaryOp::Or) => {
                self.pos += 1;
                let right = self.unary()?;
                Ok(binary(op, left, right))
            }
            _ => Ok(left),
        }
    }

    fn unary(&mut self) -> std::result::Result<Expr, String> {
        if self.lexemes.get(self.pos) == Some(&Lexeme::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> std::result::Result<Expr, String> {
        let lexeme = self
            .lexemes
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "unexpected end of condition".to_string())?;
        self.pos += 1;

        match lexeme {
            Lexeme::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Lexeme::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Lexeme::Ident(ident) => Ok(match ident.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                _ => Expr::Reference(split_path(&ident)),
            }),
            Lexeme::Open => {
                let inner = self.or()?;
                if self.lexemes.get(self.pos) != Some(&Lexeme::Close) {
                    return Err("missing closing parenthesis".to_string());
                }
                self.pos += 1;
                Ok(inner)
            }
            other => Err(format!("unexpected {other:?} in condition")),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A compiled message, possibly localized.
#[derive(Debug, Clone)]
pub struct Message {
    source: MessageSource,
    compiled: Compiled,
}

#[derive(Debug, Clone)]
enum Compiled {
    Single(Template),
    Localized(BTreeMap<String, Template>),
}

/// Compiles a template string or a locale-keyed map of template strings.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidTemplate`] when any template is malformed or
/// a locale map is empty.
pub fn compile(source: impl Into<MessageSource>) -> Result<Message> {
    let source = source.into();
    let compiled = match &source {
        MessageSource::Text(text) => Compiled::Single(Template::parse(text)?),
        MessageSource::Localized(map) => {
            if map.is_empty() {
                return Err(SchemaError::InvalidTemplate {
                    template: String::new(),
                    reason: "locale map cannot be empty".to_string(),
                });
            }
            Compiled::Localized(
                map.iter()
                    .map(|(locale, text)| Ok((locale.clone(), Template::parse(text)?)))
                    .collect::<Result<_>>()?,
            )
        }
    };
    Ok(Message { source, compiled })
}

impl Message {
    pub fn source(&self) -> &MessageSource {
        &self.source
    }

    /// Selects the template for `locale`, falling back to
    /// [`DEFAULT_LOCALE`] and then to any available locale.
    pub fn template(&self, locale: Option<&str>) -> Option<&Template> {
        match &self.compiled {
            Compiled::Single(template) => Some(template),
            Compiled::Localized(map) => locale
                .and_then(|locale| map.get(locale))
                .or_else(|| map.get(DEFAULT_LOCALE))
                .or_else(|| map.values().next()),
        }
    }

    pub fn render(&self, locale: Option<&str>, context: &Context, options: &RenderOptions) -> String {
        self.template(locale)
            .map(|template| template.render(context, options))
            .unwrap_or_default()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = MessageSource::deserialize(deserializer)?;
        compile(source).map_err(D::Error::custom)
    }
}

/// Message catalog keyed by error code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Messages(BTreeMap<String, Message>);

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a catalog from `(code, source)` pairs.
    pub fn from_sources<I, K, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Into<MessageSource>,
    {
        let mut messages = Self::new();
        for (code, source) in sources {
            messages.insert(code, compile(source)?);
        }
        Ok(messages)
    }

    pub fn insert(&mut self, code: impl Into<String>, message: Message) {
        self.0.insert(code.into(), message);
    }

    pub fn get(&self, code: &str) -> Option<&Message> {
        self.0.get(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Message)> {
        self.0.iter()
    }

    /// Overlays `other` onto this catalog; `other` wins per code.
    pub fn merge(&mut self, other: &Messages) {
        for (code, message) in &other.0 {
            self.0.insert(code.clone(), message.clone());
        }
    }
}
