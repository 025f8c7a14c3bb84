//! Named predicates chained onto pattern tokens.

use crate::matcher::{describe, Context};
use apimatch_pattern::{quote_bare_tokens, Arg, WILDCARD_KEY};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

/// An expander receives the value that passed the type check and its call arguments.
pub type ExpanderFn = fn(&mut Context<'_>, &Value, &[Arg]) -> Result<(), String>;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .unwrap()
});

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://(?:[^\s/?#@]+@)?[^\s/?#:@]+(?::\d+)?(?:[/?#]\S*)?$")
        .unwrap()
});

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

const REGEX_DELIMITERS: &[char] = &['/', '#', '~', '!', '@', '%', '|'];

/// Name to function table consulted for every `.name(args)` call.
#[derive(Clone)]
pub struct ExpanderRegistry {
    expanders: HashMap<String, ExpanderFn>,
}

impl ExpanderRegistry {
    /// A registry with no expanders at all.
    pub fn empty() -> Self {
        Self {
            expanders: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, expander: ExpanderFn) {
        self.expanders.insert(name.into(), expander);
    }

    pub fn resolve(&self, name: &str) -> Option<ExpanderFn> {
        self.expanders.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.expanders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ExpanderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("startsWith", starts_with);
        registry.register("endsWith", ends_with);
        registry.register("contains", contains);
        registry.register("notContains", not_contains);
        registry.register("isDateTime", is_date_time);
        registry.register("isEmail", is_email);
        registry.register("isUrl", is_url);
        registry.register("isIp", is_ip);
        registry.register("isEmpty", is_empty);
        registry.register("isNotEmpty", is_not_empty);
        registry.register("lowerThan", lower_than);
        registry.register("greaterThan", greater_than);
        registry.register("inArray", in_array);
        registry.register("hasProperty", has_property);
        registry.register("oneOf", one_of);
        registry.register("matchRegex", match_regex);
        registry.register("optional", optional);
        registry.register("count", count);
        registry.register("repeat", repeat);
        registry.register("match", match_pattern);
        registry
    }
}

impl fmt::Debug for ExpanderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpanderRegistry")
            .field("expanders", &self.names())
            .finish()
    }
}

// ============ Argument helpers ============

fn arg<'a>(args: &'a [Arg], index: usize, name: &str) -> Result<&'a Value, String> {
    match args.get(index) {
        Some(Arg::Value(v)) => Ok(v),
        Some(Arg::Call(call)) => Err(format!(
            "argument {} of {}() must be a value, got {}",
            index + 1,
            name,
            call
        )),
        None => Err(format!("{}() expects an argument at position {}", name, index + 1)),
    }
}

fn string_arg<'a>(args: &'a [Arg], index: usize, name: &str) -> Result<&'a str, String> {
    let value = arg(args, index, name)?;
    value.as_str().ok_or_else(|| {
        format!(
            "argument {} of {}() must be a string, got {}",
            index + 1,
            name,
            value
        )
    })
}

fn bool_arg(args: &[Arg], index: usize, name: &str, default: bool) -> Result<bool, String> {
    if args.len() <= index {
        return Ok(default);
    }
    let value = arg(args, index, name)?;
    value.as_bool().ok_or_else(|| {
        format!(
            "argument {} of {}() must be a boolean, got {}",
            index + 1,
            name,
            value
        )
    })
}

fn number_arg(args: &[Arg], index: usize, name: &str) -> Result<f64, String> {
    let value = arg(args, index, name)?;
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        format!(
            "argument {} of {}() must be a number, got {}",
            index + 1,
            name,
            value
        )
    })
}

/// A sub-pattern argument; strings holding JSON object or array text are decoded.
fn pattern_arg(args: &[Arg], index: usize, name: &str) -> Result<Value, String> {
    let value = arg(args, index, name)?;
    if let Value::String(s) = value {
        let trimmed = s.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return serde_json::from_str(&quote_bare_tokens(s))
                .map_err(|e| format!("invalid sub-pattern for {}(): {}", name, e));
        }
    }
    Ok(value.clone())
}

fn actual_str<'v>(actual: &'v Value, name: &str) -> Result<&'v str, String> {
    actual
        .as_str()
        .ok_or_else(|| format!("{}() requires a string, got {}", name, describe(actual)))
}

fn actual_number(actual: &Value, name: &str) -> Result<f64, String> {
    actual
        .as_f64()
        .ok_or_else(|| format!("{}() requires a number, got {}", name, describe(actual)))
}

fn actual_len(actual: &Value, name: &str) -> Result<usize, String> {
    match actual {
        Value::Array(items) => Ok(items.len()),
        Value::Object(map) => Ok(map.len()),
        _ => Err(format!(
            "{}() requires an array, got {}",
            name,
            describe(actual)
        )),
    }
}

fn text_test(
    name: &str,
    actual: &Value,
    args: &[Arg],
    test: fn(&str, &str) -> bool,
) -> Result<(bool, String), String> {
    let s = actual_str(actual, name)?;
    let needle = string_arg(args, 0, name)?;
    let ignore_case = bool_arg(args, 1, name, false)?;
    let passed = if ignore_case {
        test(&s.to_lowercase(), &needle.to_lowercase())
    } else {
        test(s, needle)
    };
    Ok((passed, format!("string \"{}\"", s)))
}

// ============ Expanders ============

fn starts_with(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    match text_test("startsWith", actual, args, |s, n| s.starts_with(n))? {
        (true, _) => Ok(()),
        (false, subject) => Err(format!(
            "{} doesn't start with \"{}\"",
            subject,
            string_arg(args, 0, "startsWith")?
        )),
    }
}

fn ends_with(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    match text_test("endsWith", actual, args, |s, n| s.ends_with(n))? {
        (true, _) => Ok(()),
        (false, subject) => Err(format!(
            "{} doesn't end with \"{}\"",
            subject,
            string_arg(args, 0, "endsWith")?
        )),
    }
}

fn contains(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    match text_test("contains", actual, args, |s, n| s.contains(n))? {
        (true, _) => Ok(()),
        (false, subject) => Err(format!(
            "{} doesn't contain \"{}\"",
            subject,
            string_arg(args, 0, "contains")?
        )),
    }
}

fn not_contains(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    match text_test("notContains", actual, args, |s, n| s.contains(n))? {
        (false, _) => Ok(()),
        (true, subject) => Err(format!(
            "{} contains \"{}\"",
            subject,
            string_arg(args, 0, "notContains")?
        )),
    }
}

fn parses_as_date_time(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty()
        && (DateTime::parse_from_rfc3339(s).is_ok()
            || DateTime::parse_from_rfc2822(s).is_ok()
            || DATE_TIME_FORMATS
                .iter()
                .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
            || DATE_FORMATS
                .iter()
                .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
            || TIME_FORMATS
                .iter()
                .any(|f| NaiveTime::parse_from_str(s, f).is_ok()))
}

fn is_date_time(_ctx: &mut Context<'_>, actual: &Value, _args: &[Arg]) -> Result<(), String> {
    let s = actual_str(actual, "isDateTime")?;
    if parses_as_date_time(s) {
        Ok(())
    } else {
        Err(format!("string \"{}\" is not a valid date", s))
    }
}

fn is_email(_ctx: &mut Context<'_>, actual: &Value, _args: &[Arg]) -> Result<(), String> {
    let s = actual_str(actual, "isEmail")?;
    if EMAIL_PATTERN.is_match(s) {
        Ok(())
    } else {
        Err(format!("string \"{}\" is not a valid e-mail address", s))
    }
}

fn is_url(_ctx: &mut Context<'_>, actual: &Value, _args: &[Arg]) -> Result<(), String> {
    let s = actual_str(actual, "isUrl")?;
    if URL_PATTERN.is_match(s) {
        Ok(())
    } else {
        Err(format!("string \"{}\" is not a valid URL", s))
    }
}

fn is_ip(_ctx: &mut Context<'_>, actual: &Value, _args: &[Arg]) -> Result<(), String> {
    let s = actual_str(actual, "isIp")?;
    match s.parse::<IpAddr>() {
        Ok(_) => Ok(()),
        Err(_) => Err(format!("string \"{}\" is not a valid IP address", s)),
    }
}

fn emptiness(actual: &Value, name: &str) -> Result<bool, String> {
    match actual {
        Value::Null => Ok(true),
        Value::String(s) => Ok(s.is_empty()),
        Value::Array(items) => Ok(items.is_empty()),
        Value::Object(map) => Ok(map.is_empty()),
        other => Err(format!(
            "{}() cannot check the length of {}",
            name,
            describe(other)
        )),
    }
}

fn is_empty(_ctx: &mut Context<'_>, actual: &Value, _args: &[Arg]) -> Result<(), String> {
    if emptiness(actual, "isEmpty")? {
        Ok(())
    } else {
        Err(format!("value {} is not empty", describe(actual)))
    }
}

fn is_not_empty(_ctx: &mut Context<'_>, actual: &Value, _args: &[Arg]) -> Result<(), String> {
    if emptiness(actual, "isNotEmpty")? {
        Err(format!("value {} is empty", describe(actual)))
    } else {
        Ok(())
    }
}

fn lower_than(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    let n = actual_number(actual, "lowerThan")?;
    let bound = number_arg(args, 0, "lowerThan")?;
    if n < bound {
        Ok(())
    } else {
        Err(format!("value {} is not lower than {}", actual, bound))
    }
}

fn greater_than(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    let n = actual_number(actual, "greaterThan")?;
    let bound = number_arg(args, 0, "greaterThan")?;
    if n > bound {
        Ok(())
    } else {
        Err(format!("value {} is not greater than {}", actual, bound))
    }
}

fn in_array(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    match (arg(args, 0, "inArray")?, actual) {
        (Value::Array(choices), _) => {
            if choices.contains(actual) {
                Ok(())
            } else {
                Err(format!(
                    "{} is not one of {}",
                    describe(actual),
                    Value::Array(choices.clone())
                ))
            }
        }
        (needle, Value::Array(items)) => {
            if items.contains(needle) {
                Ok(())
            } else {
                Err(format!(
                    "{} doesn't have {} element",
                    describe(actual),
                    needle
                ))
            }
        }
        (needle, _) => Err(format!(
            "inArray() requires a list of values, got {}",
            needle
        )),
    }
}

fn has_property(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    let property = string_arg(args, 0, "hasProperty")?;
    let Value::Object(map) = actual else {
        return Err(format!(
            "hasProperty() requires an object, got {}",
            describe(actual)
        ));
    };
    if map.contains_key(property) {
        Ok(())
    } else {
        Err(format!(
            "{} doesn't have \"{}\" property",
            describe(actual),
            property
        ))
    }
}

fn one_of(ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    if args.is_empty() {
        return Err("oneOf() requires at least one expander".to_string());
    }

    let mut errors = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let Some(call) = arg.as_call() else {
            return Err(format!(
                "argument {} of oneOf() must be an expander call, got {}",
                i + 1,
                arg
            ));
        };
        match ctx.run_expander(call, actual) {
            Ok(()) => return Ok(()),
            Err(e) => errors.push(e),
        }
    }
    Err(format!(
        "none of the expanders matched: {}",
        errors.join("; ")
    ))
}

/// Strips `/.../flags` style delimiters, mapping supported flags to inline ones.
fn compile_regex(raw: &str) -> Result<Regex, String> {
    let source = match raw.chars().next() {
        Some(delim) if REGEX_DELIMITERS.contains(&delim) => match raw[1..].rfind(delim) {
            Some(end) => {
                let body = &raw[1..end + 1];
                let flags = &raw[end + 2..];
                if flags.chars().all(|c| "imsxuUD".contains(c)) {
                    let inline: String = flags
                        .chars()
                        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
                        .collect();
                    if inline.is_empty() {
                        body.to_string()
                    } else {
                        format!("(?{}){}", inline, body)
                    }
                } else {
                    raw.to_string()
                }
            }
            None => raw.to_string(),
        },
        _ => raw.to_string(),
    };
    Regex::new(&source).map_err(|e| format!("invalid regex \"{}\": {}", raw, e))
}

fn match_regex(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    let s = actual_str(actual, "matchRegex")?;
    let raw = string_arg(args, 0, "matchRegex")?;
    let regex = compile_regex(raw)?;
    if regex.is_match(s) {
        Ok(())
    } else {
        Err(format!("string \"{}\" doesn't match \"{}\" regex", s, raw))
    }
}

fn optional(_ctx: &mut Context<'_>, _actual: &Value, _args: &[Arg]) -> Result<(), String> {
    Ok(())
}

fn count(_ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    let len = actual_len(actual, "count")?;
    let expected = number_arg(args, 0, "count")?;
    if expected.fract() == 0.0 && expected >= 0.0 && len == expected as usize {
        Ok(())
    } else {
        Err(format!("expected {} elements, got {}", expected, len))
    }
}

fn repeat(ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    let pattern = pattern_arg(args, 0, "repeat")?;
    let strict = bool_arg(args, 1, "repeat", true)?;
    let Value::Array(items) = actual else {
        return Err(format!(
            "repeat() requires an array, got {}",
            describe(actual)
        ));
    };

    for (i, item) in items.iter().enumerate() {
        ctx.match_index(i, item, &pattern)
            .map_err(|f| format!("element {} doesn't match the repeated pattern: {}", i, f.reason))?;

        if !strict {
            continue;
        }
        if let (Value::Object(expected), Value::Object(values)) = (&pattern, item) {
            if expected.contains_key(WILDCARD_KEY) {
                continue;
            }
            if let Some(extra) = values.keys().find(|k| !expected.contains_key(*k)) {
                return Err(format!(
                    "element {} has unexpected key \"{}\" in strict repeat",
                    i, extra
                ));
            }
        }
    }
    Ok(())
}

fn match_pattern(ctx: &mut Context<'_>, actual: &Value, args: &[Arg]) -> Result<(), String> {
    let pattern = pattern_arg(args, 0, "match")?;
    ctx.match_value(actual, &pattern)
        .map_err(|f| format!("{} at {}", f.reason, f.path))
}
