use crate::api::read_fixture;
use crate::discover::Case;
use crate::matcher::{parse_json, parse_pattern, MatchFailure, Matcher};
use rayon::prelude::*;
use serde_json::Value;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub case: Case,
    pub passed: bool,
    /// Failure header plus trail, set on mismatch.
    pub message: Option<String>,
    pub failure: Option<MatchFailure>,
    /// Unreadable or unparsable input.
    pub error: Option<String>,
    /// Pretty-printed pattern and actual, kept for the diff on mismatch.
    pub expected_output: Option<String>,
    pub actual_output: Option<String>,
    pub elapsed: Duration,
}

impl CaseResult {
    fn errored(case: &Case, error: impl ToString, start: Instant) -> Self {
        Self {
            case: case.clone(),
            passed: false,
            message: None,
            failure: None,
            error: Some(error.to_string()),
            expected_output: None,
            actual_output: None,
            elapsed: start.elapsed(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    CaseComplete(Box<CaseResult>),
}

fn load(case: &Case) -> crate::Result<(Value, Value)> {
    let actual = parse_json(&read_fixture(&case.actual)?, "actual")?;
    let pattern = parse_pattern(&read_fixture(&case.pattern)?)?;
    Ok((actual, pattern))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn run_case(case: &Case, matcher: &Matcher) -> CaseResult {
    let start = Instant::now();

    let (actual, pattern) = match load(case) {
        Ok(pair) => pair,
        Err(e) => return CaseResult::errored(case, e, start),
    };

    let result = matcher.matches(&actual, &pattern);
    let passed = result.is_match();
    log::debug!(
        "case {} {} in {:?}",
        case.name,
        if passed { "passed" } else { "failed" },
        start.elapsed()
    );

    CaseResult {
        case: case.clone(),
        passed,
        message: (!passed).then(|| result.message()),
        failure: result.failure().cloned(),
        error: None,
        expected_output: (!passed).then(|| pretty(&pattern)),
        actual_output: (!passed).then(|| pretty(&actual)),
        elapsed: start.elapsed(),
    }
}

fn report(result: CaseResult, progress: Option<&Sender<ProgressEvent>>) -> CaseResult {
    if let Some(tx) = progress {
        let _ = tx.send(ProgressEvent::CaseComplete(Box::new(result.clone())));
    }
    result
}

/// Runs every case, in parallel unless `sequential`; results keep the input order.
pub fn run_cases(
    cases: &[Case],
    matcher: &Matcher,
    sequential: bool,
    progress: Option<&Sender<ProgressEvent>>,
) -> Vec<CaseResult> {
    if sequential || cases.len() <= 1 {
        return cases
            .iter()
            .map(|case| report(run_case(case, matcher), progress))
            .collect();
    }

    cases
        .par_iter()
        .map_with(progress.cloned(), |tx, case| {
            report(run_case(case, matcher), tx.as_ref())
        })
        .collect()
}
