//! Error taxonomy for the sketch pipeline.
//!
//! Transform-stage failures and execution faults are both surfaced as
//! values; nothing here is meant to unwind across component boundaries.

use thiserror::Error;

pub type SketchResult<T> = Result<T, SketchError>;

/// Malformed source, with the position where parsing stopped.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Raised when the synchronous loop budget is exceeded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InfiniteLoopError {
    /// The most frequently hit guarded site. `row` is 0-based.
    #[error("A {node_kind} is taking too long to run (row {row})")]
    Located { node_kind: String, row: u32 },
    #[error("KA_INFINITE_LOOP")]
    Unlocated,
}

/// Any exception raised by executing transformed code.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A resource that could not be loaded. Loads are best-effort, so this is
/// logged and swallowed by the resource cache rather than returned.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("failed to load `{filename}`: {reason}")]
pub struct ResourceLoadError {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SketchError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// `line` is 0-based.
    #[error("Use of `{name}` as an identifier is prohibited.")]
    BannedIdentifier { name: String, line: u32 },
    #[error(transparent)]
    InfiniteLoop(#[from] InfiniteLoopError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    ResourceLoad(#[from] ResourceLoadError),
}

impl SketchError {
    pub fn runtime(message: impl Into<String>) -> Self {
        SketchError::Runtime(RuntimeError::new(message))
    }

    /// Short stable name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SketchError::Parse(_) => "parse",
            SketchError::BannedIdentifier { .. } => "banned-identifier",
            SketchError::InfiniteLoop(_) => "infinite-loop",
            SketchError::Runtime(_) => "runtime",
            SketchError::ResourceLoad(_) => "resource-load",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banned_identifier_message() {
        let err = SketchError::BannedIdentifier {
            name: "__env__".to_string(),
            line: 2,
        };
        assert_eq!(
            err.to_string(),
            "Use of `__env__` as an identifier is prohibited."
        );
        assert_eq!(err.kind(), "banned-identifier");
    }

    #[test]
    fn test_unlocated_loop_error_is_bare_signal() {
        let err: SketchError = InfiniteLoopError::Unlocated.into();
        assert_eq!(err.to_string(), "KA_INFINITE_LOOP");
    }
}
