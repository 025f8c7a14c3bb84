use apimatch::cli::{Cli, Command};
use apimatch::discover::discover_cases;
use apimatch::output::Output;
use apimatch::runner::{run_cases, ProgressEvent};
use apimatch::{parse_json, parse_pattern, read_fixture, Matcher};
use clap::Parser;
use log::LevelFilter;
use std::io::Read;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let use_color = !cli.no_color && atty::is(atty::Stream::Stdout);
    let matcher = Matcher::new().closed_objects(cli.closed);

    let passed = match &cli.command {
        Command::Match { actual, pattern } => {
            run_match(actual, pattern, &matcher, use_color, cli.verbose)?
        }
        Command::Check {
            root,
            filter,
            sequential,
        } => run_check(
            root,
            filter.as_deref(),
            *sequential,
            &matcher,
            use_color,
            cli.verbose,
        )?,
        #[cfg(feature = "http")]
        Command::Request {
            url,
            pattern,
            method,
            status,
            headers,
            params,
            timeout,
        } => run_request(
            RequestArgs {
                url,
                pattern,
                method,
                status: *status,
                headers,
                params,
                timeout: *timeout,
            },
            matcher,
            use_color,
        )?,
    };

    std::process::exit(if passed { 0 } else { 1 });
}

// -v is progress detail, -vv debug logs, -vvv trace logs
fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 | 1 => LevelFilter::Warn,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(read_fixture(path)?)
    }
}

fn run_match(
    actual: &Path,
    pattern: &Path,
    matcher: &Matcher,
    use_color: bool,
    verbose: u8,
) -> anyhow::Result<bool> {
    let actual = parse_json(&read_input(actual)?, "actual")?;
    let pattern = parse_pattern(&read_fixture(pattern)?)?;

    let result = matcher.matches(&actual, &pattern);
    Output::new(use_color).print_match(&result, verbose)?;
    Ok(result.is_match())
}

fn run_check(
    root: &Path,
    filter: Option<&str>,
    sequential: bool,
    matcher: &Matcher,
    use_color: bool,
    verbose: u8,
) -> anyhow::Result<bool> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let cases: Vec<_> = discover_cases(&root)?
        .into_iter()
        .filter(|c| filter.map_or(true, |f| c.name.starts_with(f)))
        .collect();

    if cases.is_empty() {
        eprintln!("No cases found");
        return Ok(false);
    }

    let start_time = Instant::now();
    let (progress_tx, progress_rx) = mpsc::channel::<ProgressEvent>();

    let progress_handle = thread::spawn(move || -> std::io::Result<()> {
        let mut output = Output::new(use_color);
        for event in progress_rx {
            output.print_progress(&event, verbose)?;
        }
        output.finish_progress()
    });

    let results = run_cases(&cases, matcher, sequential, Some(&progress_tx));

    drop(progress_tx);
    progress_handle
        .join()
        .map_err(|_| anyhow::anyhow!("progress printer panicked"))??;

    Output::new(use_color).print_results(&results, start_time.elapsed())?;
    Ok(results.iter().all(|r| r.passed))
}

#[cfg(feature = "http")]
struct RequestArgs<'a> {
    url: &'a str,
    pattern: &'a Path,
    method: &'a str,
    status: u16,
    headers: &'a [(String, String)],
    params: &'a [(String, String)],
    timeout: u64,
}

#[cfg(feature = "http")]
fn run_request(args: RequestArgs<'_>, matcher: Matcher, use_color: bool) -> anyhow::Result<bool> {
    use apimatch::{Error, JsonApiTest, ReqwestTransport};
    use std::time::Duration;

    let transport = ReqwestTransport::with_timeout(Duration::from_secs(args.timeout));
    let mut api = JsonApiTest::new(transport);
    api.set_matcher(matcher);
    if let Some(dir) = args.pattern.parent() {
        api.set_response_dir(dir);
    }
    let filename = args
        .pattern
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("invalid pattern path '{}'", args.pattern.display()))?;

    let response = api.request(args.url, args.method, args.params, args.headers)?;

    let mut output = Output::new(use_color);
    match api.assert_response(&response, &filename, args.status) {
        Ok(()) => {
            output.print_outcome(true, &format!("{} {} {}", args.method, args.url, response.status))?;
            Ok(true)
        }
        Err(e @ (Error::Status { .. }
        | Error::MissingHeader(_)
        | Error::HeaderMismatch { .. }
        | Error::Mismatch(_))) => {
            output.print_outcome(false, &e.to_string())?;
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
