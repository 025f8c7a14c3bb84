//! Pattern token grammar for apimatch fixtures.
//!
//! A pattern token is a JSON string leaf of the form
//! `@TYPE@[||@TYPE@...][.expander(args)...]`:
//!
//! - Types: `@string@`, `@integer@`, `@number@`, `@double@`, `@boolean@`,
//!   `@array@`, `@null@`, `@*@` / `@wildcard@`, `@uuid@`, `@json@`
//! - Unions: `@string@||@integer@`
//! - Expander chains: `@string@.startsWith('abc').endsWith("123", true)`
//! - Arguments: single or double quoted strings, numbers, `true`, `false`,
//!   `null`, arrays, objects and nested expander calls
//!
//! # Example
//!
//! ```
//! use apimatch_pattern::{parse, TypeKind};
//!
//! let token = parse("@string@||@null@.contains('foo')").unwrap().unwrap();
//! assert_eq!(token.types, vec![TypeKind::String, TypeKind::Null]);
//! assert_eq!(token.expanders[0].name, "contains");
//!
//! // Strings without a known `@type@` prefix are plain literals
//! assert!(parse("hello").unwrap().is_none());
//! ```

use serde_json::{Map, Number, Value};
use std::fmt;
use thiserror::Error;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_while};

/// Sequence element meaning "any number of further elements".
pub const UNBOUNDED_MARKER: &str = "@...@";

/// Object key that, paired with a wildcard value, admits any extra keys.
pub const WILDCARD_KEY: &str = "@*@";

// ============ AST Types ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    String,
    Integer,
    Number,
    Double,
    Boolean,
    Array,
    Null,
    Wildcard,
    Uuid,
    Json,
}

impl TypeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(TypeKind::String),
            "integer" => Some(TypeKind::Integer),
            "number" => Some(TypeKind::Number),
            "double" => Some(TypeKind::Double),
            "boolean" => Some(TypeKind::Boolean),
            "array" => Some(TypeKind::Array),
            "null" => Some(TypeKind::Null),
            "*" | "wildcard" => Some(TypeKind::Wildcard),
            "uuid" => Some(TypeKind::Uuid),
            "json" => Some(TypeKind::Json),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeKind::String => "string",
            TypeKind::Integer => "integer",
            TypeKind::Number => "number",
            TypeKind::Double => "double",
            TypeKind::Boolean => "boolean",
            TypeKind::Array => "array",
            TypeKind::Null => "null",
            TypeKind::Wildcard => "*",
            TypeKind::Uuid => "uuid",
            TypeKind::Json => "json",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}@", self.name())
    }
}

/// An argument passed to an expander call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Call(ExpanderCall),
}

impl Arg {
    pub fn as_call(&self) -> Option<&ExpanderCall> {
        match self {
            Arg::Call(c) => Some(c),
            Arg::Value(_) => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => write!(f, "{}", v),
            Arg::Call(c) => write!(f, "{}", c),
        }
    }
}

/// A single `.name(args)` link of an expander chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpanderCall {
    pub name: String,
    pub args: Vec<Arg>,
}

impl fmt::Display for ExpanderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// A parsed pattern token: the accepted types and the expanders to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub types: Vec<TypeKind>,
    pub expanders: Vec<ExpanderCall>,
}

impl Token {
    pub fn has_expander(&self, name: &str) -> bool {
        self.expanders.iter().any(|e| e.name == name)
    }

    pub fn is_optional(&self) -> bool {
        self.has_expander("optional")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, "||")?;
            }
            write!(f, "{}", kind)?;
        }
        for call in &self.expanders {
            write!(f, ".{}", call)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("invalid expander syntax in \"{token}\" near \"{rest}\"")]
    Syntax { token: String, rest: String },
}

// ============ Parser ============

fn ws<'a, P, O>(p: P) -> impl Parser<&'a str, O, ErrMode<ContextError>>
where
    P: Parser<&'a str, O, ErrMode<ContextError>>,
{
    delimited(multispace0, p, multispace0)
}

fn backtrack<T>() -> ModalResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn type_kind(input: &mut &str) -> ModalResult<TypeKind> {
    let name: &str = delimited('@', take_till(1.., '@'), '@').parse_next(input)?;
    match TypeKind::from_name(name) {
        Some(kind) => Ok(kind),
        None => backtrack(),
    }
}

fn ident(input: &mut &str) -> ModalResult<String> {
    let first: char = one_of(|c: char| c.is_ascii_alphabetic() || c == '_').parse_next(input)?;
    let rest: &str =
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    Ok(format!("{}{}", first, rest))
}

fn quoted<'a>(quote: char) -> impl Parser<&'a str, String, ErrMode<ContextError>> {
    move |input: &mut &'a str| -> ModalResult<String> {
        let _: char = one_of(quote).parse_next(input)?;
        let mut s = String::new();
        loop {
            let c: char = any.parse_next(input)?;
            if c == quote {
                return Ok(s);
            }
            if c != '\\' {
                s.push(c);
                continue;
            }
            let escaped: char = any.parse_next(input)?;
            match escaped {
                'n' => s.push('\n'),
                't' => s.push('\t'),
                'r' => s.push('\r'),
                '\\' => s.push('\\'),
                '"' | '\'' => s.push(escaped),
                // Unknown escapes stay verbatim so regex classes like `\d` survive
                c => {
                    s.push('\\');
                    s.push(c);
                }
            }
        }
    }
}

fn number(input: &mut &str) -> ModalResult<Value> {
    let neg: Option<char> = opt('-').parse_next(input)?;
    let int_part: &str = digit1.parse_next(input)?;
    let frac_part: Option<&str> = opt(preceded('.', digit1)).parse_next(input)?;
    let exp_part: Option<(char, Option<char>, &str)> =
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)).parse_next(input)?;

    let mut s = String::new();
    if neg.is_some() {
        s.push('-');
    }
    s.push_str(int_part);
    if let Some(frac) = frac_part {
        s.push('.');
        s.push_str(frac);
    }
    if let Some((_, sign, digits)) = exp_part {
        s.push('e');
        if let Some(sign) = sign {
            s.push(sign);
        }
        s.push_str(digits);
    }

    let n: Number = serde_json::from_str(&s).map_err(|_| ErrMode::Cut(ContextError::new()))?;
    Ok(Value::Number(n))
}

fn keyword(input: &mut &str) -> ModalResult<Value> {
    let name = ident.parse_next(input)?;
    match name.as_str() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "null" => Ok(Value::Null),
        _ => backtrack(),
    }
}

fn array(input: &mut &str) -> ModalResult<Value> {
    let items: Vec<Value> = delimited(
        ('[', multispace0),
        separated(0.., ws(literal), ws(',')),
        (multispace0, ']'),
    )
    .parse_next(input)?;
    Ok(Value::Array(items))
}

fn object_key(input: &mut &str) -> ModalResult<String> {
    alt((quoted('"'), quoted('\''), ident)).parse_next(input)
}

fn object_entry(input: &mut &str) -> ModalResult<(String, Value)> {
    let key = ws(object_key).parse_next(input)?;
    let _: char = ws(':').parse_next(input)?;
    let value = ws(literal).parse_next(input)?;
    Ok((key, value))
}

fn object(input: &mut &str) -> ModalResult<Value> {
    let entries: Vec<(String, Value)> = delimited(
        ('{', multispace0),
        separated(0.., object_entry, ws(',')),
        (multispace0, '}'),
    )
    .parse_next(input)?;
    Ok(Value::Object(entries.into_iter().collect::<Map<String, Value>>()))
}

fn literal(input: &mut &str) -> ModalResult<Value> {
    alt((
        quoted('"').map(Value::String),
        quoted('\'').map(Value::String),
        number,
        array,
        object,
        keyword,
    ))
    .parse_next(input)
}

fn arg(input: &mut &str) -> ModalResult<Arg> {
    alt((call.map(Arg::Call), literal.map(Arg::Value))).parse_next(input)
}

fn call(input: &mut &str) -> ModalResult<ExpanderCall> {
    let name = ident.parse_next(input)?;
    let args: Vec<Arg> = delimited(
        (multispace0, '(', multispace0),
        separated(0.., ws(arg), ws(',')),
        (multispace0, ')'),
    )
    .parse_next(input)?;
    Ok(ExpanderCall { name, args })
}

fn chain(input: &mut &str) -> ModalResult<Vec<ExpanderCall>> {
    repeat(0.., preceded('.', call)).parse_next(input)
}

// ============ Public API ============

/// Parses a pattern string.
///
/// Returns `Ok(None)` when the string is not a token: it does not start with a
/// known `@type@`, or the type list is followed by text that does not open a
/// `.name(` chain. Such strings are compared as literals. A chain that opens
/// but is malformed, or is followed by trailing text, is an error.
pub fn parse(input: &str) -> Result<Option<Token>, PatternError> {
    let mut rest = input.trim_end();

    let types: ModalResult<Vec<TypeKind>> =
        separated(1.., type_kind, ws("||")).parse_next(&mut rest);
    let Ok(types) = types else {
        return Ok(None);
    };

    if !rest.is_empty() && !opens_chain(rest) {
        return Ok(None);
    }

    let syntax_error = |rest: &str| PatternError::Syntax {
        token: input.to_string(),
        rest: rest.to_string(),
    };

    let before_chain = rest;
    let expanders = chain
        .parse_next(&mut rest)
        .map_err(|_| syntax_error(before_chain))?;
    if !rest.is_empty() {
        return Err(syntax_error(rest));
    }

    Ok(Some(Token { types, expanders }))
}

fn opens_chain(text: &str) -> bool {
    let mut probe = text;
    ('.', ident, multispace0, '(')
        .parse_next(&mut probe)
        .is_ok()
}

/// Quotes bare pattern tokens so fixture text becomes valid JSON.
///
/// Fixtures may write `"isAdmin": @boolean@` or `[1, @...@]` without quotes;
/// anything already inside a JSON string is left untouched.
pub fn quote_bare_tokens(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        let len = match c {
            '"' => {
                let len = json_string_len(rest);
                out.push_str(&rest[..len]);
                len
            }
            '@' => match bare_token_len(rest) {
                0 => {
                    out.push('@');
                    1
                }
                len => {
                    out.push_str(&Value::String(rest[..len].to_string()).to_string());
                    len
                }
            },
            c => {
                out.push(c);
                c.len_utf8()
            }
        };
        rest = &rest[len..];
    }

    out
}

fn json_string_len(s: &str) -> usize {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return i + 1;
        }
    }
    s.len()
}

fn bare_token_len(s: &str) -> usize {
    let Some(mut end) = type_segment_len(s) else {
        return 0;
    };
    loop {
        let tail = &s[end..];
        if let Some(n) = tail.strip_prefix("||").and_then(type_segment_len) {
            end += 2 + n;
        } else if let Some(n) = tail.strip_prefix('.').and_then(call_len) {
            end += 1 + n;
        } else {
            return end;
        }
    }
}

fn type_segment_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix('@')?;
    let stop = body.find(|c: char| {
        c == '@' || c.is_whitespace() || matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"')
    })?;
    (stop > 0 && body[stop..].starts_with('@')).then_some(stop + 2)
}

fn call_len(s: &str) -> Option<usize> {
    let name_len = s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))?;
    if name_len == 0 || !s[name_len..].starts_with('(') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s[name_len..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(name_len + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
