use crate::matcher::MatchResult;
use crate::runner::{CaseResult, ProgressEvent};
use similar::{ChangeTag, TextDiff};
use std::io::{self, Write};
use std::time::Duration;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

pub struct Output {
    stdout: StandardStream,
    dot_count: usize,
}

impl Output {
    pub fn new(color: bool) -> Self {
        let color_choice = if color {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            stdout: StandardStream::stdout(color_choice),
            dot_count: 0,
        }
    }

    fn set_color(&mut self, color: Color) -> io::Result<()> {
        self.stdout.set_color(ColorSpec::new().set_fg(Some(color)))
    }

    fn set_bold(&mut self, color: Color) -> io::Result<()> {
        self.stdout
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))
    }

    fn set_dim(&mut self) -> io::Result<()> {
        self.stdout.set_color(ColorSpec::new().set_dimmed(true))
    }

    fn reset(&mut self) -> io::Result<()> {
        self.stdout.reset()
    }

    fn colored(&mut self, color: Color, text: &str) -> io::Result<()> {
        self.set_color(color)?;
        write!(self.stdout, "{}", text)?;
        self.reset()
    }

    pub fn print_progress(&mut self, event: &ProgressEvent, verbose: u8) -> io::Result<()> {
        match event {
            ProgressEvent::CaseComplete(result) => {
                if verbose >= 1 {
                    self.print_verbose_result(result)
                } else {
                    self.print_dot(result)
                }
            }
        }
    }

    fn print_dot(&mut self, result: &CaseResult) -> io::Result<()> {
        if result.passed {
            self.colored(Color::Green, ".")?;
        } else if result.error.is_some() {
            self.colored(Color::Yellow, "E")?;
        } else {
            self.colored(Color::Red, "F")?;
        }
        self.stdout.flush()?;

        self.dot_count += 1;
        if self.dot_count >= 80 {
            writeln!(self.stdout)?;
            self.dot_count = 0;
        }
        Ok(())
    }

    fn print_verbose_result(&mut self, result: &CaseResult) -> io::Result<()> {
        if result.passed {
            self.colored(Color::Green, "✓")?;
        } else {
            self.colored(Color::Red, "✗")?;
        }
        write!(self.stdout, " {}", result.case.name)?;
        self.set_dim()?;
        writeln!(self.stdout, " {:.3}s", result.elapsed.as_secs_f64())?;
        self.reset()
    }

    pub fn finish_progress(&mut self) -> io::Result<()> {
        if self.dot_count > 0 {
            writeln!(self.stdout)?;
        }
        writeln!(self.stdout)
    }

    pub fn print_results(&mut self, results: &[CaseResult], elapsed: Duration) -> io::Result<()> {
        let errors: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
        let failures: Vec<_> = results
            .iter()
            .filter(|r| !r.passed && r.error.is_none())
            .collect();
        let passed = results.len() - errors.len() - failures.len();

        if !errors.is_empty() {
            self.set_bold(Color::Yellow)?;
            writeln!(self.stdout, "Errors:")?;
            self.reset()?;
            for result in &errors {
                writeln!(self.stdout)?;
                self.colored(Color::Yellow, "!")?;
                writeln!(self.stdout, " {}", result.case.name)?;
                if let Some(error) = &result.error {
                    writeln!(self.stdout, "  {}", error)?;
                }
            }
            writeln!(self.stdout)?;
        }

        if !failures.is_empty() {
            self.set_bold(Color::Red)?;
            writeln!(self.stdout, "Failures:")?;
            self.reset()?;
            for result in &failures {
                writeln!(self.stdout)?;
                self.colored(Color::Red, "✗")?;
                writeln!(self.stdout, " {}", result.case.name)?;
                writeln!(self.stdout, "  {}", result.case.pattern.display())?;
                if let Some(failure) = &result.failure {
                    writeln!(self.stdout, "  {}", failure)?;
                }
                if let Some(message) = &result.message {
                    writeln!(self.stdout)?;
                    writeln!(self.stdout, "{}", message.trim_end())?;
                }
                if let (Some(expected), Some(actual)) =
                    (&result.expected_output, &result.actual_output)
                {
                    writeln!(self.stdout)?;
                    self.print_diff(expected, actual)?;
                }
            }
            writeln!(self.stdout)?;
        }

        let elapsed_str = format!(" in {:.2}s", elapsed.as_secs_f64());
        if errors.is_empty() && failures.is_empty() {
            self.set_bold(Color::Green)?;
            write!(self.stdout, "All {} cases passed", passed)?;
            self.reset()?;
            writeln!(self.stdout, "{}", elapsed_str)
        } else {
            self.set_bold(Color::White)?;
            write!(self.stdout, "Summary:")?;
            self.reset()?;
            writeln!(
                self.stdout,
                " {} passed, {} failed, {} errors{}",
                passed,
                failures.len(),
                errors.len(),
                elapsed_str
            )
        }
    }

    /// Outcome of a single `match` run.
    pub fn print_match(&mut self, result: &MatchResult, verbose: u8) -> io::Result<()> {
        if result.is_match() {
            self.set_bold(Color::Green)?;
            writeln!(self.stdout, "Match")?;
            return self.reset();
        }

        self.set_bold(Color::Red)?;
        writeln!(self.stdout, "No match")?;
        self.reset()?;
        if let Some(failure) = result.failure() {
            writeln!(self.stdout, "  {}", failure)?;
            if verbose >= 1 {
                self.set_dim()?;
                writeln!(self.stdout, "  expected: {}", failure.expected)?;
                writeln!(self.stdout, "  actual:   {}", failure.actual)?;
                self.reset()?;
            }
        }
        writeln!(self.stdout)?;
        writeln!(self.stdout, "{}", result.message().trim_end())
    }

    pub fn print_outcome(&mut self, passed: bool, text: &str) -> io::Result<()> {
        if passed {
            self.colored(Color::Green, "✓")?;
        } else {
            self.colored(Color::Red, "✗")?;
        }
        writeln!(self.stdout, " {}", text)
    }

    /// Line diff, pattern as the `-` side and actual as the `+` side.
    pub fn print_diff(&mut self, expected: &str, actual: &str) -> io::Result<()> {
        let diff = TextDiff::from_lines(expected, actual);

        for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
            if idx > 0 {
                writeln!(self.stdout, "...")?;
            }

            for op in group {
                for change in diff.iter_changes(op) {
                    let (sign, color) = match change.tag() {
                        ChangeTag::Delete => ("-", Color::Red),
                        ChangeTag::Insert => ("+", Color::Green),
                        ChangeTag::Equal => (" ", Color::White),
                    };

                    self.set_color(color)?;
                    write!(self.stdout, "{}{}", sign, change.value())?;
                    self.reset()?;
                    if change.missing_newline() {
                        writeln!(self.stdout)?;
                    }
                }
            }
        }
        Ok(())
    }
}
