//! Error types shared by the index and query layers.
//!
//! Pattern errors reject a single query and never leave a partial automaton
//! behind. Index errors are fatal for the current process. Running out of
//! search budget is not an error at all: see [`crate::query::runner::Outcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pattern compilation
pub type PatternResult<T> = Result<T, PatternError>;

/// Result type for index reading and writing
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors produced while parsing or compiling a query pattern
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("pattern too complex: automaton exceeded {limit} states")]
    TooComplex { limit: usize },
    #[error("anagram too long: {0}")]
    AnagramTooLong(String),
    #[error("invalid phone number: {0}")]
    InvalidDigits(String),
}

impl PatternError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Byte offset of the offending character, for syntax errors
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Syntax { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// Errors produced by the on-disk index layer
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("can't read index {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt index at byte {offset}: {message}")]
    Corrupt { offset: u64, message: String },
    #[error("unsupported index version {0}")]
    Version(u32),
    #[error("line {line}: byte 0x{byte:02x} is outside the corpus alphabet")]
    InvalidRecord { line: u64, byte: u8 },
    #[error("line {line}: malformed record: {message}")]
    MalformedRecord { line: u64, message: String },
    #[error("text {0:?} contains bytes outside the corpus alphabet")]
    InvalidText(String),
    #[error("empty text can't be indexed")]
    EmptyText,
    #[error("entries out of order: {previous:?} followed by {next:?}")]
    OutOfOrder { previous: String, next: String },
    #[error("search state outgrew its breadcrumb arena")]
    SearchTooLarge,
    #[error("output {0} already exists")]
    OutputExists(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn corrupt(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupt {
            offset,
            message: message.into(),
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }
}
