//! Error types produced by the pager, node codec, and tree operations.

use std::fmt;
use std::io;

/// Errors that can occur while operating the engine.
#[derive(Debug)]
pub enum Error {
    /// Underlying file I/O failure: short read, short write, or an OS error.
    Io(io::Error),
    /// The file on disk is not a valid database: bad magic, or a node header
    /// names a type byte we don't recognize.
    Format(String),
    /// An insert needs more bytes than half of a node's capacity, so a split
    /// would not make progress.
    NoSpace,
    /// The key is already present in the tree.
    DuplicateKey(u32),
    /// An internal consistency check failed. These indicate a bug in the
    /// engine itself rather than a condition callers can recover from.
    Invariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Format(msg) => write!(f, "invalid database format: {}", msg),
            Error::NoSpace => write!(f, "not enough space to complete insert"),
            Error::DuplicateKey(key) => write!(f, "key {} already exists", key),
            Error::Invariant(msg) => write!(f, "internal invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
