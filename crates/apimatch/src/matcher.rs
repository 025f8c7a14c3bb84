//! Structural matching of JSON values against pattern trees.

use crate::backtrace::{Backtrace, JsonBacktrace};
use crate::error::{Error, Result};
use crate::expander::ExpanderRegistry;
use apimatch_pattern::{
    parse as parse_token, quote_bare_tokens, Arg, ExpanderCall, PatternError, Token, TypeKind,
    UNBOUNDED_MARKER, WILDCARD_KEY,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-8][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .unwrap()
});

/// Shown before the trail whenever a fixture does not match.
pub const FAILURE_HEADER: &str = "JSON pattern does not match provided response\n\
Check first that you properly set the @...@ wild card (or if you set it at all)\n\
Also you could try https://php-matcher.norbert.tech/ for some live testing\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TypeMismatch,
    ValueMismatch,
    ExpanderFailure,
    StructuralMismatch,
    UnknownExpander,
    InvalidPattern,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::TypeMismatch => "type mismatch",
            FailureKind::ValueMismatch => "value mismatch",
            FailureKind::ExpanderFailure => "expander failure",
            FailureKind::StructuralMismatch => "structural mismatch",
            FailureKind::UnknownExpander => "unknown expander",
            FailureKind::InvalidPattern => "invalid pattern",
        };
        write!(f, "{}", s)
    }
}

/// The first node that failed to match, with its location in the actual tree.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{kind} at {path}: {reason}")]
pub struct MatchFailure {
    pub path: String,
    pub kind: FailureKind,
    pub expected: String,
    pub actual: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    failure: Option<MatchFailure>,
    backtrace: JsonBacktrace,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&MatchFailure> {
        self.failure.as_ref()
    }

    pub fn backtrace(&self) -> &JsonBacktrace {
        &self.backtrace
    }

    /// The user-facing failure text: the fixed header followed by the trail.
    pub fn message(&self) -> String {
        format!("{}{}", FAILURE_HEADER, self.backtrace)
    }
}

/// Compares actual JSON values against patterns.
///
/// # Example
///
/// ```
/// use apimatch::Matcher;
/// use serde_json::json;
///
/// let matcher = Matcher::new();
/// let result = matcher.matches(
///     &json!({"id": 7, "tags": ["a", "b"], "extra": true}),
///     &json!({"id": "@integer@.greaterThan(0)", "tags": ["a", "@...@"]}),
/// );
/// assert!(result.is_match());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    registry: ExpanderRegistry,
    closed_objects: bool,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject keys the pattern does not list, unless it holds `"@*@": "@*@"`.
    pub fn closed_objects(mut self, closed: bool) -> Self {
        self.closed_objects = closed;
        self
    }

    pub fn with_registry(mut self, registry: ExpanderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn matches(&self, actual: &Value, pattern: &Value) -> MatchResult {
        let mut backtrace = JsonBacktrace::new();
        let failure = self.matches_with(actual, pattern, &mut backtrace).err();
        MatchResult { failure, backtrace }
    }

    pub fn matches_with(
        &self,
        actual: &Value,
        pattern: &Value,
        backtrace: &mut dyn Backtrace,
    ) -> std::result::Result<(), MatchFailure> {
        Context::new(self, backtrace).match_value(actual, pattern)
    }

    /// Parses both texts and matches them; unparsable input is an error, not a mismatch.
    pub fn match_json(&self, actual: &str, pattern: &str) -> Result<MatchResult> {
        let actual = parse_json(actual, "actual")?;
        let pattern = parse_pattern(pattern)?;
        Ok(self.matches(&actual, &pattern))
    }
}

pub fn parse_json(text: &str, what: &'static str) -> Result<Value> {
    serde_json::from_str(text.trim()).map_err(|source| Error::ParseJson { what, source })
}

/// Parses pattern text, accepting bare `@type@` tokens outside of strings.
pub fn parse_pattern(text: &str) -> Result<Value> {
    let quoted = quote_bare_tokens(text.trim());
    serde_json::from_str(&quoted).map_err(|source| Error::ParseJson {
        what: "pattern",
        source,
    })
}

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

enum Node<'p> {
    Token(std::result::Result<Token, PatternError>),
    Scalar,
    Object(&'p Map<String, Value>),
    Array(&'p [Value]),
}

impl<'p> Node<'p> {
    fn classify(pattern: &'p Value) -> Self {
        match pattern {
            Value::String(s) => match parse_token(s) {
                Ok(Some(token)) => Node::Token(Ok(token)),
                Ok(None) => Node::Scalar,
                Err(e) => Node::Token(Err(e)),
            },
            Value::Object(map) => Node::Object(map),
            Value::Array(items) => Node::Array(items),
            _ => Node::Scalar,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Node::Token(_) => "token",
            Node::Scalar => "scalar",
            Node::Object(_) => "object",
            Node::Array(_) => "array",
        }
    }
}

/// State threaded through one match call.
///
/// Expanders receive it so they can recurse into sub-patterns and call
/// other expanders while reporting to the same backtrace.
pub struct Context<'a> {
    matcher: &'a Matcher,
    backtrace: &'a mut dyn Backtrace,
    path: Vec<Segment>,
}

impl<'a> Context<'a> {
    fn new(matcher: &'a Matcher, backtrace: &'a mut dyn Backtrace) -> Self {
        Self {
            matcher,
            backtrace,
            path: Vec::new(),
        }
    }

    /// Location of the node being matched, e.g. `$.users[0].roles`.
    pub fn path(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.path {
            match segment {
                Segment::Key(key) if is_plain_key(key) => {
                    out.push('.');
                    out.push_str(key);
                }
                Segment::Key(key) => {
                    out.push('[');
                    out.push_str(&Value::String(key.clone()).to_string());
                    out.push(']');
                }
                Segment::Index(i) => out.push_str(&format!("[{}]", i)),
            }
        }
        out
    }

    pub fn match_value(
        &mut self,
        actual: &Value,
        pattern: &Value,
    ) -> std::result::Result<(), MatchFailure> {
        let node = Node::classify(pattern);
        let name = node.name();

        self.backtrace.matcher_can_match(name, actual, true);
        self.backtrace.matcher_entrance(name, actual, pattern);

        let outcome = match node {
            Node::Token(Ok(token)) => self.match_token(actual, &token),
            Node::Token(Err(e)) => Err(self.failure(
                FailureKind::InvalidPattern,
                pattern.to_string(),
                actual,
                e.to_string(),
            )),
            Node::Scalar => self.match_scalar(actual, pattern),
            Node::Object(map) => self.match_object(actual, map),
            Node::Array(items) => self.match_array(actual, items),
        };

        match &outcome {
            Ok(()) => self.backtrace.matcher_succeed(name, actual, pattern),
            Err(failure) => {
                log::trace!("{} matcher failed at {}: {}", name, failure.path, failure.reason);
                self.backtrace
                    .matcher_failed(name, actual, pattern, &failure.reason);
            }
        }
        outcome
    }

    pub fn match_index(
        &mut self,
        index: usize,
        actual: &Value,
        pattern: &Value,
    ) -> std::result::Result<(), MatchFailure> {
        self.path.push(Segment::Index(index));
        let outcome = self.match_value(actual, pattern);
        self.path.pop();
        outcome
    }

    pub fn match_key(
        &mut self,
        key: &str,
        actual: &Value,
        pattern: &Value,
    ) -> std::result::Result<(), MatchFailure> {
        self.path.push(Segment::Key(key.to_string()));
        let outcome = self.match_value(actual, pattern);
        self.path.pop();
        outcome
    }

    /// Runs one expander call against `value`.
    pub fn run_expander(
        &mut self,
        call: &ExpanderCall,
        value: &Value,
    ) -> std::result::Result<(), String> {
        let Some(expander) = self.matcher.registry.resolve(&call.name) else {
            return Err(format!("no such expander \"{}\"", call.name));
        };

        self.backtrace.expander_entrance(&call.name, value);
        let outcome = expander(self, value, &call.args);
        match &outcome {
            Ok(()) => self.backtrace.expander_succeed(&call.name, value),
            Err(error) => self.backtrace.expander_failed(&call.name, value, error),
        }
        outcome
    }

    fn failure(
        &self,
        kind: FailureKind,
        expected: impl Into<String>,
        actual: &Value,
        reason: impl Into<String>,
    ) -> MatchFailure {
        MatchFailure {
            path: self.path(),
            kind,
            expected: expected.into(),
            actual: describe(actual),
            reason: reason.into(),
        }
    }

    fn match_token(
        &mut self,
        actual: &Value,
        token: &Token,
    ) -> std::result::Result<(), MatchFailure> {
        let Some(subject) = accept(&token.types, actual) else {
            return Err(self.failure(
                FailureKind::TypeMismatch,
                token.to_string(),
                actual,
                format!("{} does not match type {}", describe(actual), type_list(token)),
            ));
        };

        let registry = &self.matcher.registry;
        if let Some(name) = token
            .expanders
            .iter()
            .find_map(|call| unknown_expander(registry, call))
        {
            return Err(self.failure(
                FailureKind::UnknownExpander,
                token.to_string(),
                actual,
                format!("no such expander \"{}\"", name),
            ));
        }

        for call in &token.expanders {
            self.run_expander(call, &subject).map_err(|reason| {
                self.failure(FailureKind::ExpanderFailure, call.to_string(), actual, reason)
            })?;
        }
        Ok(())
    }

    fn match_scalar(
        &mut self,
        actual: &Value,
        pattern: &Value,
    ) -> std::result::Result<(), MatchFailure> {
        if actual == pattern {
            return Ok(());
        }
        Err(self.failure(
            FailureKind::ValueMismatch,
            describe(pattern),
            actual,
            format!("{} does not equal {}", describe(actual), describe(pattern)),
        ))
    }

    fn match_object(
        &mut self,
        actual: &Value,
        pattern: &Map<String, Value>,
    ) -> std::result::Result<(), MatchFailure> {
        let Value::Object(values) = actual else {
            return Err(self.failure(
                FailureKind::TypeMismatch,
                "object",
                actual,
                format!("{} is not an object", describe(actual)),
            ));
        };

        let mut open = !self.matcher.closed_objects;
        for (key, value_pattern) in pattern {
            if key == WILDCARD_KEY {
                open = true;
                continue;
            }
            match values.get(key) {
                Some(value) => self.match_key(key, value, value_pattern)?,
                None if is_optional(value_pattern) => {}
                None => {
                    return Err(self.failure(
                        FailureKind::StructuralMismatch,
                        format!("key \"{}\"", key),
                        actual,
                        format!("missing key \"{}\"", key),
                    ));
                }
            }
        }

        if !open {
            if let Some(extra) = values.keys().find(|k| !pattern.contains_key(*k)) {
                return Err(self.failure(
                    FailureKind::StructuralMismatch,
                    "no further keys",
                    actual,
                    format!("unexpected key \"{}\"", extra),
                ));
            }
        }
        Ok(())
    }

    fn match_array(
        &mut self,
        actual: &Value,
        pattern: &[Value],
    ) -> std::result::Result<(), MatchFailure> {
        let Value::Array(items) = actual else {
            return Err(self.failure(
                FailureKind::TypeMismatch,
                "array",
                actual,
                format!("{} is not an array", describe(actual)),
            ));
        };

        let (head, unbounded) = match pattern.split_last() {
            Some((last, head)) if last.as_str() == Some(UNBOUNDED_MARKER) => (head, true),
            _ => (pattern, false),
        };

        if head.iter().any(|p| p.as_str() == Some(UNBOUNDED_MARKER)) {
            return Err(self.failure(
                FailureKind::InvalidPattern,
                UNBOUNDED_MARKER,
                actual,
                format!("{} must be the last element of an array pattern", UNBOUNDED_MARKER),
            ));
        }

        if unbounded && items.len() < head.len() {
            return Err(self.failure(
                FailureKind::StructuralMismatch,
                format!("at least {} elements", head.len()),
                actual,
                format!(
                    "expected at least {} elements, got {}",
                    head.len(),
                    items.len()
                ),
            ));
        }
        if !unbounded && items.len() != head.len() {
            return Err(self.failure(
                FailureKind::StructuralMismatch,
                format!("{} elements", head.len()),
                actual,
                format!("expected {} elements, got {}", head.len(), items.len()),
            ));
        }

        for (i, (item, item_pattern)) in items.iter().zip(head).enumerate() {
            self.match_index(i, item, item_pattern)?;
        }
        Ok(())
    }
}

fn accept<'v>(types: &[TypeKind], actual: &'v Value) -> Option<Cow<'v, Value>> {
    types.iter().find_map(|kind| accept_kind(*kind, actual))
}

fn accept_kind(kind: TypeKind, actual: &Value) -> Option<Cow<'_, Value>> {
    let accepted = match kind {
        TypeKind::String => actual.is_string(),
        TypeKind::Integer => actual.is_i64() || actual.is_u64(),
        TypeKind::Number => actual.is_number(),
        TypeKind::Double => actual.is_f64(),
        TypeKind::Boolean => actual.is_boolean(),
        TypeKind::Array => actual.is_array() || actual.is_object(),
        TypeKind::Null => actual.is_null(),
        TypeKind::Wildcard => true,
        TypeKind::Uuid => actual.as_str().is_some_and(|s| UUID_PATTERN.is_match(s)),
        TypeKind::Json => {
            return match actual {
                Value::String(s) => serde_json::from_str(s).ok().map(Cow::Owned),
                Value::Array(_) | Value::Object(_) => Some(Cow::Borrowed(actual)),
                _ => None,
            };
        }
    };
    accepted.then_some(Cow::Borrowed(actual))
}

/// Name of the first call, nested arguments included, the registry cannot resolve.
fn unknown_expander<'t>(registry: &ExpanderRegistry, call: &'t ExpanderCall) -> Option<&'t str> {
    if registry.resolve(&call.name).is_none() {
        return Some(&call.name);
    }
    call.args
        .iter()
        .filter_map(Arg::as_call)
        .find_map(|nested| unknown_expander(registry, nested))
}

fn type_list(token: &Token) -> String {
    token
        .types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join("||")
}

fn is_optional(pattern: &Value) -> bool {
    match pattern {
        Value::String(s) => matches!(parse_token(s), Ok(Some(token)) if token.is_optional()),
        _ => false,
    }
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compact JSON rendering, shortened for messages.
pub(crate) fn describe(value: &Value) -> String {
    const LIMIT: usize = 80;
    let text = value.to_string();
    if text.chars().count() <= LIMIT {
        return text;
    }
    let cut: String = text.chars().take(LIMIT).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn is_match(actual: Value, pattern: Value) -> bool {
        Matcher::new().matches(&actual, &pattern).is_match()
    }

    fn failure(actual: Value, pattern: Value) -> MatchFailure {
        Matcher::new()
            .matches(&actual, &pattern)
            .failure()
            .cloned()
            .expect("expected a mismatch")
    }

    #[test]
    fn test_literal_patterns_are_reflexive() {
        let values = [
            json!(null),
            json!(true),
            json!(42),
            json!(-1.5),
            json!("text"),
            json!([1, "two", [3]]),
            json!({"a": {"b": [null, false]}, "c": ""}),
        ];
        for v in values {
            assert!(is_match(v.clone(), v));
        }
    }

    #[test]
    fn test_wildcard_matches_anything() {
        for v in [json!(null), json!(1), json!("x"), json!([]), json!({"a": 1})] {
            assert!(is_match(v.clone(), json!("@*@")));
            assert!(is_match(v, json!("@wildcard@")));
        }
    }

    #[test]
    fn test_unbounded_marker() {
        assert!(is_match(json!(["a", "b", "c"]), json!(["a", "@...@"])));
        assert!(is_match(json!(["a"]), json!(["a", "@...@"])));
        assert!(is_match(json!([]), json!(["@...@"])));
        assert!(!is_match(json!(["a"]), json!(["a", "b", "@...@"])));
        assert!(!is_match(json!(["b", "c"]), json!(["a", "@...@"])));
    }

    #[test]
    fn test_misplaced_unbounded_marker_is_invalid() {
        let f = failure(json!(["a", "b"]), json!(["@...@", "b"]));
        assert_eq!(f.kind, FailureKind::InvalidPattern);
    }

    #[test]
    fn test_array_length_must_match_without_marker() {
        let f = failure(json!([1, 2, 3]), json!([1, 2]));
        assert_eq!(f.kind, FailureKind::StructuralMismatch);
        assert_eq!(f.reason, "expected 2 elements, got 3");
        assert!(!is_match(json!({"a": 1}), json!([1])));
    }

    #[test]
    fn test_union_types() {
        assert!(is_match(json!(5), json!("@string@||@integer@")));
        assert!(is_match(json!("5"), json!("@string@||@integer@")));
        assert!(!is_match(json!(5.5), json!("@string@||@integer@")));
        let f = failure(json!(5.5), json!("@string@||@integer@"));
        assert_eq!(f.kind, FailureKind::TypeMismatch);
        assert_eq!(f.reason, "5.5 does not match type @string@||@integer@");
    }

    #[test]
    fn test_type_tokens() {
        assert!(is_match(json!(1.5), json!("@double@")));
        assert!(!is_match(json!(1), json!("@double@")));
        assert!(is_match(json!(1), json!("@number@")));
        assert!(is_match(json!(1.5), json!("@number@")));
        assert!(is_match(json!(false), json!("@boolean@")));
        assert!(is_match(json!(null), json!("@null@")));
        assert!(!is_match(json!(null), json!("@string@")));
        assert!(is_match(json!([1]), json!("@array@")));
        assert!(is_match(json!({"a": 1}), json!("@array@")));
        assert!(is_match(
            json!("5f3c9ab6-1d2e-4b7a-9c10-2f6e8d4a1b3c"),
            json!("@uuid@")
        ));
        assert!(!is_match(json!("5f3c9ab6"), json!("@uuid@")));
    }

    #[test]
    fn test_literal_numbers_compare_exactly() {
        assert!(!is_match(json!(5), json!(5.0)));
        assert!(!is_match(json!("5"), json!(5)));
        let f = failure(json!("abc"), json!("abd"));
        assert_eq!(f.kind, FailureKind::ValueMismatch);
    }

    #[test]
    fn test_unknown_type_is_literal() {
        assert!(is_match(json!("@foo@"), json!("@foo@")));
        assert!(!is_match(json!("bar"), json!("@foo@")));
    }

    #[test]
    fn test_optional_keys() {
        assert!(is_match(json!({}), json!({"x": "@string@.optional()"})));
        assert!(is_match(json!({"x": "a"}), json!({"x": "@string@.optional()"})));
        assert!(!is_match(json!({"x": 5}), json!({"x": "@string@.optional()"})));
        let f = failure(json!({}), json!({"x": "@string@"}));
        assert_eq!(f.kind, FailureKind::StructuralMismatch);
        assert_eq!(f.reason, "missing key \"x\"");
    }

    #[test]
    fn test_open_and_closed_objects() {
        let actual = json!({"a": 1, "b": 2});
        assert!(is_match(actual.clone(), json!({"a": 1})));

        let closed = Matcher::new().closed_objects(true);
        let result = closed.matches(&actual, &json!({"a": 1}));
        assert_eq!(result.failure().unwrap().reason, "unexpected key \"b\"");
        assert!(closed
            .matches(&actual, &json!({"a": 1, "@*@": "@*@"}))
            .is_match());
    }

    #[test]
    fn test_expander_chain_is_conjunctive() {
        assert!(is_match(
            json!("abc123"),
            json!("@string@.startsWith('abc').endsWith('123')")
        ));
        assert!(!is_match(
            json!("abc123"),
            json!("@string@.startsWith('xyz').endsWith('123')")
        ));
        assert!(!is_match(
            json!("abc123"),
            json!("@string@.startsWith('abc').endsWith('999')")
        ));
    }

    #[test]
    fn test_unknown_expander_fails() {
        let f = failure(json!("abc"), json!("@string@.shout()"));
        assert_eq!(f.kind, FailureKind::UnknownExpander);
        assert_eq!(f.reason, "no such expander \"shout\"");
    }

    #[test]
    fn test_unknown_nested_expander_fails() {
        let f = failure(
            json!("abc"),
            json!("@string@.oneOf(contains('a'), bogus())"),
        );
        assert_eq!(f.kind, FailureKind::UnknownExpander);
        assert_eq!(f.reason, "no such expander \"bogus\"");
    }

    #[test]
    fn test_type_prefixed_literals_are_reflexive() {
        for v in [
            json!({"note": "@null@ means not set"}),
            json!("@string@x"),
            json!(["@integer@ items", "@boolean@.txt"]),
        ] {
            assert!(is_match(v.clone(), v));
        }
        assert!(!is_match(json!("@string@y"), json!("@string@x")));
    }

    #[test]
    fn test_invalid_token_syntax_fails() {
        let f = failure(json!("abc"), json!("@string@.contains('a'"));
        assert_eq!(f.kind, FailureKind::InvalidPattern);
    }

    #[test]
    fn test_failure_path() {
        let f = failure(
            json!({"users": [{"name": 7}, {"name": "b"}]}),
            json!({"users": [{"name": "@string@"}, "@...@"]}),
        );
        assert_eq!(f.path, "$.users[0].name");
        assert_eq!(
            f.to_string(),
            "type mismatch at $.users[0].name: 7 does not match type @string@"
        );

        let f = failure(
            json!({"users": [{"name": "a"}, {"name": 7}]}),
            json!({"users": [{"name": "@string@"}, {"name": "@string@"}]}),
        );
        assert_eq!(f.path, "$.users[1].name");

        let f = failure(json!({"odd key": 1}), json!({"odd key": "@string@"}));
        assert_eq!(f.path, "$[\"odd key\"]");
    }

    #[test]
    fn test_embedded_json() {
        let pattern = json!({"image": "@json@.match({\"url\": \"@string@.isUrl()\"})"});
        assert!(is_match(
            json!({"image": "{\"url\": \"http://example.com/a.png\"}"}),
            pattern.clone()
        ));
        assert!(is_match(
            json!({"image": {"url": "http://example.com/a.png"}}),
            pattern.clone()
        ));
        assert!(!is_match(json!({"image": "{\"url\": \"nope\"}"}), pattern.clone()));
        assert!(!is_match(json!({"image": "not json"}), pattern));
        assert!(is_match(json!("[1, 2]"), json!("@json@")));
    }

    #[test]
    fn test_nested_document() {
        let actual = json!({
            "users": [
                {
                    "firstName": "Norbert",
                    "created": "2014-01-01",
                    "roles": ["ROLE_USER", "ROLE_DEVELOPER"],
                    "attributes": {"isAdmin": false, "dateOfBirth": null},
                    "avatar": {"url": "http://avatar-image.com/avatar.png"}
                },
                {
                    "firstName": "Michał",
                    "created": "2014-01-01",
                    "roles": ["ROLE_USER"],
                    "attributes": {"isAdmin": true, "dateOfBirth": null},
                    "avatar": null
                }
            ]
        });
        let pattern = json!({
            "users": [
                {
                    "firstName": "@string@",
                    "created": "@string@.isDateTime()",
                    "roles": ["ROLE_USER", "@...@"],
                    "attributes": {"isAdmin": "@boolean@", "@*@": "@*@"},
                    "avatar": "@json@.match({\"url\":\"@string@.isUrl()\"})"
                },
                "@...@"
            ]
        });
        assert!(is_match(actual, pattern));
    }

    #[test]
    fn test_match_json_quotes_bare_tokens() {
        let result = Matcher::new()
            .match_json(
                r#"{"admin": true, "roles": ["a", "b"]}"#,
                r#"{"admin": @boolean@, "roles": ["a", @...@]}"#,
            )
            .unwrap();
        assert!(result.is_match());
    }

    #[test]
    fn test_match_json_parse_errors() {
        let matcher = Matcher::new();
        assert!(matches!(
            matcher.match_json("{not json", "{}"),
            Err(Error::ParseJson { what: "actual", .. })
        ));
        assert!(matches!(
            matcher.match_json("{}", "[1,"),
            Err(Error::ParseJson { what: "pattern", .. })
        ));
    }

    #[test]
    fn test_backtrace_records_short_leaf_failure() {
        let result = Matcher::new().matches(&json!("not-an-email"), &json!("@string@.isEmail()"));
        assert!(!result.is_match());
        assert!(!result.backtrace().is_empty());
        let raw = result.backtrace().raw();
        assert_eq!(raw.len(), 2);
        assert_eq!(
            raw[0],
            r#"#1 Matcher token failed to match value "not-an-email" with "@string@.isEmail()" pattern"#
        );
        assert!(raw[1].starts_with("#2 Matcher token error: "));
    }

    #[test]
    fn test_backtrace_skips_long_values() {
        let long = format!("{}-not-an-email", "x".repeat(50));
        let result = Matcher::new().matches(&json!(long), &json!("@string@.isEmail()"));
        assert!(!result.is_match());
        assert!(result.backtrace().is_empty());
    }

    #[test]
    fn test_backtrace_summarises_nested_failures_by_leaf() {
        let result = Matcher::new().matches(
            &json!({"contact": {"email": "nope"}, "ok": "yes"}),
            &json!({"contact": {"email": "@string@.isEmail()"}, "ok": "yes"}),
        );
        assert!(!result.is_match());
        assert_eq!(result.backtrace().entries().len(), 1);
        assert_eq!(result.backtrace().entries()[0].value, "nope");
    }

    #[test]
    fn test_matching_is_idempotent() {
        let matcher = Matcher::new();
        let actual = json!({"a": ["x", 1], "b": "bad-mail"});
        let pattern = json!({"a": ["@string@", "@string@"], "b": "@string@.isEmail()"});
        let first = matcher.matches(&actual, &pattern);
        let second = matcher.matches(&actual, &pattern);
        assert_eq!(first.is_match(), second.is_match());
        assert_eq!(first.backtrace().raw(), second.backtrace().raw());
        assert_eq!(first.failure(), second.failure());
    }

    #[test]
    fn test_failure_message_has_header_and_trail() {
        let result = Matcher::new().matches(&json!("x"), &json!("@integer@"));
        let message = result.message();
        assert!(message.starts_with(FAILURE_HEADER));
        assert!(message.ends_with(&result.backtrace().to_string()));
        assert!(message.contains("Matcher token failed to match value \"x\""));
    }
}
