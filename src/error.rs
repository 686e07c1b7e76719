//! Crate error type

use thiserror::Error;

use crate::expr::{CompileError, EvalError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid graph file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported graph file version {0}")]
    UnsupportedVersion(u32),
    #[error("no line at index {0}")]
    NoSuchLine(usize),
    #[error("simulation is running")]
    Busy,
    #[error("no data directory available")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, Error>;
