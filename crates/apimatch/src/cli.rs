use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "apimatch",
    about = "Structural JSON pattern matching for API responses",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// More output; repeat for debug and trace logging
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reject object keys the pattern does not list
    #[arg(long, global = true)]
    pub closed: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Match one JSON document against a pattern
    Match {
        /// Actual JSON file, or "-" to read from stdin
        actual: PathBuf,

        /// Pattern file
        pattern: PathBuf,
    },

    /// Check every *.pattern.json fixture against its sibling *.json body
    Check {
        /// Directory to search, or a single pattern file
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Only run cases whose name starts with this prefix
        #[arg(short, long)]
        filter: Option<String>,

        /// Run cases sequentially instead of in parallel
        #[arg(short, long)]
        sequential: bool,
    },

    /// Send a request and assert the response against a pattern file
    #[cfg(feature = "http")]
    Request {
        url: String,

        /// Pattern file for the response body
        pattern: PathBuf,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Expected status code
        #[arg(long, default_value_t = 200)]
        status: u16,

        /// Header as "Name: value"
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Parameter as "key=value"; query for GET, form body otherwise
        #[arg(short = 'd', long = "data", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

pub fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{}'", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected 'key=value', got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Accept: application/json").unwrap(),
            ("Accept".to_string(), "application/json".to_string())
        );
        assert_eq!(
            parse_header("X-Time: 10:30").unwrap().1,
            "10:30".to_string()
        );
        assert!(parse_header("Accept").is_err());
        assert!(parse_header(": x").is_err());
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_param("q").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["apimatch", "check", "fixtures", "-vv", "--closed"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.closed);
        match cli.command {
            Command::Check { root, sequential, .. } => {
                assert_eq!(root, PathBuf::from("fixtures"));
                assert!(!sequential);
            }
            _ => panic!("expected check"),
        }
    }
}
