use std::path::PathBuf;
use thiserror::Error;

use crate::locations::{LocationError, LocationsSyntaxError};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Manifest syntax error at line {line}: {message}")]
    ManifestSyntax { line: usize, message: String },

    #[error("Duplicate manifest entry: {0}")]
    DuplicateEntry(PathBuf),

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Path error: {0}")]
    Path(String),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    LocationsSyntax(#[from] LocationsSyntaxError),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
