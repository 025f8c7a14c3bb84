//! Structural JSON pattern matching for black-box API tests.
//!
//! Patterns are JSON documents whose string leaves may be type tokens such as
//! `"@string@.isEmail()"`. See [`Matcher`] for the entry point and [`JsonApiTest`]
//! for the request/assert harness.

pub mod api;
pub mod backtrace;
pub mod cli;
pub mod discover;
pub mod error;
pub mod expander;
#[cfg(feature = "http")]
pub mod http;
pub mod matcher;
pub mod output;
pub mod runner;

pub use api::{read_fixture, JsonApiTest, RequestOptions, Response, Transport};
pub use apimatch_pattern::{
    Arg, ExpanderCall, PatternError, Token, TypeKind, UNBOUNDED_MARKER, WILDCARD_KEY,
};
pub use backtrace::{Backtrace, JsonBacktrace, TraceEntry};
pub use error::{Error, Result};
pub use expander::{ExpanderFn, ExpanderRegistry};
#[cfg(feature = "http")]
pub use http::ReqwestTransport;
pub use matcher::{
    parse_json, parse_pattern, Context, FailureKind, MatchFailure, MatchResult, Matcher,
    FAILURE_HEADER,
};
