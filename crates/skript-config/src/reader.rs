//! Line reader with a single-step push-back.

use std::io::BufRead;

use crate::error::{ConfigError, ConfigResult};

const BOM: char = '\u{feff}';

/// Reads a config source line by line.
///
/// Line numbers are 1-based. A UTF-8 byte order mark is stripped from the
/// leading lines until the first non-empty line has been read. The section
/// loader uses [`reset`](Self::reset) to hand a dedented line back to its
/// parent section.
pub struct ConfigReader<R> {
    inner: R,
    line: Option<String>,
    line_number: usize,
    reset: bool,
    seen_content: bool,
}

impl<R: BufRead> ConfigReader<R> {
    /// Create a reader over a buffered source.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: None,
            line_number: 0,
            reset: false,
            seen_content: false,
        }
    }

    /// Read the next line without its line terminator.
    ///
    /// After [`reset`](Self::reset) this returns the previous line again
    /// without advancing the line number. Returns `None` at end of input.
    pub fn read_line(&mut self) -> ConfigResult<Option<String>> {
        if self.reset {
            self.reset = false;
            return Ok(self.line.clone());
        }

        let mut buf = String::new();
        if self.inner.read_line(&mut buf)? == 0 {
            self.line = None;
            return Ok(None);
        }
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') {
                buf.pop();
            }
        }
        if !self.seen_content {
            if let Some(stripped) = buf.strip_prefix(BOM) {
                buf = stripped.to_owned();
            }
            self.seen_content = !buf.is_empty();
        }

        self.line_number += 1;
        self.line = Some(buf);
        Ok(self.line.clone())
    }

    /// Push the last line back so the next [`read_line`](Self::read_line) returns it again.
    pub fn reset(&mut self) -> ConfigResult<()> {
        if self.reset {
            return Err(ConfigError::DoubleReset);
        }
        self.reset = true;
        Ok(())
    }

    /// The 1-based number of the last line read, 0 before the first read.
    #[must_use]
    pub const fn line_number(&self) -> usize {
        self.line_number
    }

    /// The last line read.
    #[must_use]
    pub fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }
}
