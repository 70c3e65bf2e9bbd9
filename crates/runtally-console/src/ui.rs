//! Terminal sink writing rendered summary lines.

use std::io::{self, Write};

use colored::Colorize;

use runtally_core::TerminalSink;

use crate::markup::render_markup;

/// [`TerminalSink`] for an interactive terminal.
///
/// Summary lines go to stdout; warnings and errors go to stderr with a
/// severity prefix. Color is auto-detected from stdout and can be
/// overridden.
pub struct ConsoleUi {
    use_color: bool,
}

impl ConsoleUi {
    /// Create a sink with color auto-detection.
    pub fn new() -> Self {
        Self {
            use_color: atty::is(atty::Stream::Stdout),
        }
    }

    /// Create a sink with an explicit color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self { use_color }
    }

    fn prefixed(&self, prefix: &str, paint: fn(&str) -> String, line: &str) -> String {
        let rendered = render_markup(line, self.use_color);
        if rendered.is_empty() {
            return rendered;
        }
        if self.use_color {
            format!("{} {}", paint(prefix), rendered)
        } else {
            format!("{prefix} {rendered}")
        }
    }
}

impl Default for ConsoleUi {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSink for ConsoleUi {
    fn output(&mut self, line: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", render_markup(line, self.use_color))?;
        stdout.flush()
    }

    fn warn(&mut self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(
            stderr,
            "{}",
            self.prefixed("warning:", |p| p.yellow().bold().to_string(), line)
        )?;
        stderr.flush()
    }

    fn error(&mut self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(
            stderr,
            "{}",
            self.prefixed("error:", |p| p.red().bold().to_string(), line)
        )?;
        stderr.flush()
    }
}
