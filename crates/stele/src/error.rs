// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use std::fmt;
use thiserror::Error;

/// A parse failure with a 1-based position into the offending source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line})")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    /// 1-based character column, 0 when unknown.
    pub column: usize,
    pub line_text: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, column: usize, source: &str) -> Self {
        let line_text = source
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or_default()
            .to_string();
        Self {
            message: message.into(),
            line,
            column,
            line_text,
        }
    }

    /// `msg (line N)`, the offending line and a caret under the column.
    pub fn render(&self) -> String {
        if self.line == 0 || self.line_text.is_empty() {
            return self.message.clone();
        }
        let caret = if self.column > 0 {
            format!("{}^", " ".repeat(self.column - 1))
        } else {
            String::new()
        };
        format!("{} (line {})\n{}\n{}", self.message, self.line, self.line_text, caret)
            .trim_end()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Exception,
    AssertionError,
    AttributeError,
    ImportError,
    ModuleNotFoundError,
    IndexError,
    KeyError,
    MemoryError,
    NameError,
    NotImplementedError,
    OverflowError,
    RecursionError,
    RuntimeError,
    StopIteration,
    TypeError,
    ValueError,
    ZeroDivisionError,
    /// The step budget ran out; never catchable by script handlers.
    ExecutionLimitExceeded,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Exception => "Exception",
            ErrorKind::AssertionError => "AssertionError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::ModuleNotFoundError => "ModuleNotFoundError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::MemoryError => "MemoryError",
            ErrorKind::NameError => "NameError",
            ErrorKind::NotImplementedError => "NotImplementedError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::RecursionError => "RecursionError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::StopIteration => "StopIteration",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::ExecutionLimitExceeded => "ExecutionLimitExceeded",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Exception" | "BaseException" | "LookupError" => ErrorKind::Exception,
            "AssertionError" => ErrorKind::AssertionError,
            "AttributeError" => ErrorKind::AttributeError,
            "ImportError" => ErrorKind::ImportError,
            "ModuleNotFoundError" => ErrorKind::ModuleNotFoundError,
            "IndexError" => ErrorKind::IndexError,
            "KeyError" => ErrorKind::KeyError,
            "MemoryError" => ErrorKind::MemoryError,
            "NameError" => ErrorKind::NameError,
            "NotImplementedError" => ErrorKind::NotImplementedError,
            "OverflowError" => ErrorKind::OverflowError,
            "RecursionError" => ErrorKind::RecursionError,
            "RuntimeError" => ErrorKind::RuntimeError,
            "StopIteration" => ErrorKind::StopIteration,
            "TypeError" => ErrorKind::TypeError,
            "ValueError" => ErrorKind::ValueError,
            "ZeroDivisionError" | "ArithmeticError" => ErrorKind::ZeroDivisionError,
            _ => return None,
        })
    }

    /// Whether an `except <handler>` clause catches this kind.
    pub fn caught_by(self, handler: ErrorKind) -> bool {
        if self == ErrorKind::ExecutionLimitExceeded {
            return false;
        }
        handler == ErrorKind::Exception
            || handler == self
            || (handler == ErrorKind::ImportError && self == ErrorKind::ModuleNotFoundError)
    }

    /// Every kind a script can name, for the builtins table.
    pub fn all() -> &'static [ErrorKind] {
        &[
            ErrorKind::Exception,
            ErrorKind::AssertionError,
            ErrorKind::AttributeError,
            ErrorKind::ImportError,
            ErrorKind::ModuleNotFoundError,
            ErrorKind::IndexError,
            ErrorKind::KeyError,
            ErrorKind::MemoryError,
            ErrorKind::NameError,
            ErrorKind::NotImplementedError,
            ErrorKind::OverflowError,
            ErrorKind::RecursionError,
            ErrorKind::RuntimeError,
            ErrorKind::StopIteration,
            ErrorKind::TypeError,
            ErrorKind::ValueError,
            ErrorKind::ZeroDivisionError,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub function: String,
    pub line: usize,
    pub text: Option<String>,
}

/// An exception raised while running script code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Outermost call first.
    pub traceback: Vec<TraceFrame>,
    pub(crate) pending_line: Option<usize>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceback: Vec::new(),
            pending_line: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    pub fn key_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::KeyError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexError, message)
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AttributeError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{name}' is not defined"))
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ZeroDivisionError, message)
    }

    /// `Kind: message`, the one-line form used in diagnostics.
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            self.kind.name().to_string()
        } else {
            format!("{}: {}", self.kind.name(), self.message)
        }
    }

    pub fn format_traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.traceback {
            out.push_str(&format!(
                "  File \"<generated>\", line {}, in {}\n",
                frame.line, frame.function
            ));
            if let Some(text) = frame.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                out.push_str(&format!("    {text}\n"));
            }
        }
        out.push_str(&self.summary());
        out
    }

    pub(crate) fn mark_line(mut self, line: usize) -> Self {
        if self.pending_line.is_none() {
            self.pending_line = Some(line);
        }
        self
    }

    pub(crate) fn push_frame(&mut self, function: &str, default_line: usize, source: &[String]) {
        let line = self.pending_line.take().unwrap_or(default_line);
        let text = source.get(line.saturating_sub(1)).cloned();
        self.traceback.insert(
            0,
            TraceFrame {
                function: function.to_string(),
                line,
                text,
            },
        );
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for RuntimeError {}

pub type RtResult<T> = Result<T, RuntimeError>;

/// Either phase of running a script can fail.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {}", .0.render())]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_renders_caret_under_column() {
        let err = SyntaxError::new("invalid syntax", 2, 5, "x = 1\ny = = 2\n");
        assert_eq!(err.render(), "invalid syntax (line 2)\ny = = 2\n    ^");
    }

    #[test]
    fn syntax_error_without_position_is_just_the_message() {
        let err = SyntaxError::new("unexpected EOF", 0, 0, "");
        assert_eq!(err.render(), "unexpected EOF");
    }

    #[test]
    fn traceback_lists_outermost_frame_first() {
        let source = vec!["def f():".to_string(), "    return d['x']".to_string()];
        let mut err = RuntimeError::key_error("'x'").mark_line(2);
        err.push_frame("f", 1, &source);
        err = err.mark_line(9);
        err.push_frame("aggregate_all_data", 1, &source);
        assert_eq!(err.traceback[0].function, "aggregate_all_data");
        assert_eq!(err.traceback[1].line, 2);
        let text = err.format_traceback();
        assert!(text.contains("line 2, in f\n    return d['x']"));
        assert!(text.ends_with("KeyError: 'x'"));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in ErrorKind::all() {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(ErrorKind::from_name("BaseException"), Some(ErrorKind::Exception));
    }

    #[test]
    fn execution_limit_is_never_caught() {
        assert!(!ErrorKind::ExecutionLimitExceeded.caught_by(ErrorKind::Exception));
        assert!(ErrorKind::KeyError.caught_by(ErrorKind::Exception));
        assert!(!ErrorKind::KeyError.caught_by(ErrorKind::ValueError));
        assert!(ErrorKind::ModuleNotFoundError.caught_by(ErrorKind::ImportError));
    }
}
