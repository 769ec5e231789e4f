use std::io::{self, BufRead, Write};

use crate::error::{PostError, Result};

pub trait Interaction {
    /// Ask for a line of free text, returned without the trailing newline.
    fn prompt(&mut self, text: &str) -> Result<String>;

    /// Ask a yes/no question. An empty answer selects `default`.
    fn confirm(&mut self, text: &str, default: bool) -> Result<bool>;

    /// Progress text, hidden in quiet mode.
    fn echo(&mut self, text: &str);

    /// Warnings and results that are shown even in quiet mode.
    fn always_echo(&mut self, text: &str);
}

/// Line-oriented prompting over any reader/writer pair.
pub struct TerminalInteraction<R, W> {
    input: R,
    output: W,
    quiet: bool,
}

impl TerminalInteraction<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(quiet: bool) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), quiet)
    }
}

impl<R: BufRead, W: Write> TerminalInteraction<R, W> {
    pub fn new(input: R, output: W, quiet: bool) -> Self {
        Self {
            input,
            output,
            quiet,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn read_answer(&mut self, text: &str, suffix: &str) -> Result<String> {
        // Prompt output failures are not fatal, the answer is what matters.
        let _ = write!(self.output, "{text}{suffix}");
        let _ = self.output.flush();
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|error| PostError::io("<stdin>", error))?;
        if read == 0 {
            return Err(PostError::InputClosed {
                prompt: text.to_string(),
            });
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn write_line(&mut self, text: &str) {
        let _ = writeln!(self.output, "{text}");
    }
}

impl<R: BufRead, W: Write> Interaction for TerminalInteraction<R, W> {
    fn prompt(&mut self, text: &str) -> Result<String> {
        self.read_answer(text, ": ")
    }

    fn confirm(&mut self, text: &str, default: bool) -> Result<bool> {
        let suffix = if default { " [Y/n]: " } else { " [y/N]: " };
        loop {
            let answer = self.read_answer(text, suffix)?;
            match answer.trim().to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.write_line("Error: invalid input"),
            }
        }
    }

    fn echo(&mut self, text: &str) {
        if !self.quiet {
            self.write_line(text);
        }
    }

    fn always_echo(&mut self, text: &str) {
        self.write_line(text);
    }
}

/// Non-interactive mode: every question is a hard failure.
///
/// Output goes to stderr so stdout stays free for piped content.
#[derive(Debug, Default)]
pub struct HeadlessInteraction {
    quiet: bool,
}

impl HeadlessInteraction {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Interaction for HeadlessInteraction {
    fn prompt(&mut self, text: &str) -> Result<String> {
        Err(PostError::HeadlessInteraction {
            prompt: text.to_string(),
        })
    }

    fn confirm(&mut self, text: &str, _default: bool) -> Result<bool> {
        Err(PostError::HeadlessInteraction {
            prompt: text.to_string(),
        })
    }

    fn echo(&mut self, text: &str) {
        if !self.quiet {
            eprintln!("{text}");
        }
    }

    fn always_echo(&mut self, text: &str) {
        eprintln!("{text}");
    }
}
