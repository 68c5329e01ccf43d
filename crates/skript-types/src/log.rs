//! Buffered diagnostics of parse attempts.

use std::mem;

/// How useful an error is to the user. Higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ErrorQuality {
    #[default]
    None,
    /// The text is not this kind of expression at all.
    NotAnExpression,
    /// The text is recognised but semantically wrong.
    SemanticError,
    /// Error raised with an explicit message by a parser.
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub quality: ErrorQuality,
}

/// Collects the diagnostics of one parse attempt.
///
/// Errors are not kept in order: only the best one survives, so that a failed
/// parse against many candidate types reports the most meaningful reason.
/// Warnings are buffered and dropped by [`clear`](Self::clear) when the
/// attempt that produced them is abandoned.
#[derive(Debug, Default)]
pub struct ParseLog {
    entries: Vec<LogEntry>,
    error: Option<LogEntry>,
}

impl ParseLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry {
            level: LogLevel::Warning,
            message: message.into(),
            quality: ErrorQuality::None,
        });
    }

    /// Record an error. It replaces the stored error only if it is strictly better.
    pub fn error(&mut self, message: impl Into<String>, quality: ErrorQuality) {
        if self.error.as_ref().is_none_or(|error| quality > error.quality) {
            self.error = Some(LogEntry {
                level: LogLevel::Error,
                message: message.into(),
                quality,
            });
        }
    }

    /// Drop the buffered warnings, keeping the best error.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn best_error(&self) -> Option<&LogEntry> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Move the warnings of a successful attempt into `parent`.
    pub fn print_log(self, parent: &mut Self) {
        parent.entries.extend(self.entries);
    }

    /// Move the best error of a failed attempt into `parent`, or `default` if
    /// the attempt recorded none.
    pub fn print_error(self, parent: &mut Self, default: Option<&str>) {
        match self.error {
            Some(error) => parent.error(error.message, error.quality),
            None => {
                if let Some(message) = default {
                    parent.error(message, ErrorQuality::SemanticError);
                }
            }
        }
    }

    /// Emit everything through `tracing` and reset the log.
    pub fn flush(&mut self) {
        for entry in mem::take(&mut self.entries) {
            tracing::warn!("{}", entry.message);
        }
        if let Some(error) = self.error.take() {
            tracing::error!("{}", error.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_error_wins() {
        let mut log = ParseLog::new();
        log.error("not a number", ErrorQuality::NotAnExpression);
        log.error("generic", ErrorQuality::Generic);
        log.error("worse", ErrorQuality::SemanticError);
        log.error("tie", ErrorQuality::Generic);
        assert_eq!(log.best_error().unwrap().message, "generic");
    }

    #[test]
    fn test_clear_keeps_error() {
        let mut log = ParseLog::new();
        log.warning("ambiguous");
        log.error("bad", ErrorQuality::SemanticError);
        log.clear();
        assert!(log.entries().is_empty());
        assert!(log.has_error());
    }

    #[test]
    fn test_nested_logs() {
        let mut parent = ParseLog::new();

        let mut attempt = ParseLog::new();
        attempt.warning("deprecated syntax");
        attempt.print_log(&mut parent);
        assert_eq!(parent.entries().len(), 1);

        ParseLog::new().print_error(&mut parent, Some("can't understand this"));
        assert_eq!(parent.best_error().unwrap().message, "can't understand this");
    }
}
