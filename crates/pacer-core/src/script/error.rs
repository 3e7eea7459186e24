//! Errors raised by the control-language interpreter.

use std::fmt;

/// Category of a script error, named after the learner-facing exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Indentation,
    Name,
    Type,
    Value,
    ZeroDivision,
    Index,
    Import,
    Attribute,
    Overflow,
    Recursion,
    /// A capability call failed on the host side.
    Capability,
    /// Execution was stopped from outside; never shown to the learner.
    Interrupted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "SyntaxError",
            Self::Indentation => "IndentationError",
            Self::Name => "NameError",
            Self::Type => "TypeError",
            Self::Value => "ValueError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Index => "IndexError",
            Self::Import => "ImportError",
            Self::Attribute => "AttributeError",
            Self::Overflow => "OverflowError",
            Self::Recursion => "RecursionError",
            Self::Capability => "CapabilityError",
            Self::Interrupted => "Interrupted",
        };
        f.write_str(name)
    }
}

/// An error raised while parsing or running a program.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {kind}: {message}")]
pub struct ScriptError {
    /// 1-based source line.
    pub line: usize,
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ScriptError {
    /// Create a new error.
    pub fn new(line: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            line,
            kind,
            message: message.into(),
        }
    }

    /// Error used to unwind a program that is being stopped.
    pub fn interrupted(line: usize) -> Self {
        Self::new(line, ErrorKind::Interrupted, "execution stopped")
    }

    /// Whether this error only signals that execution was stopped.
    pub fn is_interrupted(&self) -> bool {
        self.kind == ErrorKind::Interrupted
    }
}
