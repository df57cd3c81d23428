//! Error types for cssfill
//!
//! Most of the engine is deliberately tolerant: malformed CSS parses to a
//! partial tree, unresolvable stylesheet references are skipped, and
//! unsupported media syntax evaluates to a non-match. The variants here cover
//! the places where an operation can genuinely fail and the caller needs to
//! know about it.

use thiserror::Error;

/// Main error type for cssfill operations
#[derive(Error, Debug)]
pub enum CssfillError {
    /// A stylesheet download failed
    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },
    /// A stylesheet reference could not be resolved
    #[error("invalid stylesheet reference: {0}")]
    Stylesheet(String),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for cssfill operations
pub type Result<T> = std::result::Result<T, CssfillError>;
