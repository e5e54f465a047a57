//! Closed error taxonomy for the search/index pipeline.
//!
//! Every fallible operation in this crate returns [`Error`]. Variants map onto
//! the five error kinds the rest of the system reasons about (see [`ErrorKind`]):
//! user-reportable input mistakes, transient transport failures, unrecoverable
//! storage corruption, query-parse failures from the text index, and cooperative
//! cancellation (which is never actually surfaced as a failure to callers).

use std::fmt;

/// Coarse classification used by callers deciding how to react to an [`Error`]
/// (surface verbatim, retry, bundle, or silently swallow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Transport,
    Storage,
    QueryParse,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Input(String),

    #[error("remote request failed: {0}")]
    Transport(String),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("query parse error: {0}")]
    QueryParse(String),

    #[error("cancelled")]
    Cancelled,

    /// One or more named sub-tasks failed; root causes are preserved.
    #[error("{0}")]
    Bundled(BundledError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn query_parse(msg: impl Into<String>) -> Self {
        Error::QueryParse(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Input(_) => ErrorKind::Input,
            Error::Transport(_) => ErrorKind::Transport,
            Error::NotFound { .. } => ErrorKind::Transport,
            Error::Storage(_) => ErrorKind::Storage,
            Error::QueryParse(_) => ErrorKind::QueryParse,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Bundled(_) => ErrorKind::Transport,
            Error::Io(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// A list of `(task_name, error)` pairs, raised once by the scheduler (§4.D)
/// or a fan-out search stage after every sub-task has finished.
#[derive(Debug)]
pub struct BundledError {
    pub failures: Vec<(String, Error)>,
}

impl BundledError {
    pub fn new(failures: Vec<(String, Error)>) -> Self {
        Self { failures }
    }
}

impl fmt::Display for BundledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed: ", self.failures.len())?;
        for (i, (name, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{name}: {err}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
