//! Error types for valuefragments.
//! File and network helpers report `FragmentError`; math helpers report `MathError`.
//! The grouped dispatcher has its own `GroupError`/`JobError` in `task_queue`.

use thiserror::Error;

/// Error from the file, process and network helpers.
#[derive(Debug, Error)]
pub enum FragmentError {
    /// I/O related errors
    #[error("I/O error in {operation}: {source}{}", path_suffix(.path))]
    Io {
        operation: String,
        path: Option<String>,
        #[source]
        source: std::io::Error,
    },
    /// Network/HTTP errors
    #[error("Network error in {operation}: {message}{}", url_suffix(.url))]
    Network {
        operation: String,
        url: Option<String>,
        message: String,
    },
    /// Input that could not be parsed or is out of range
    #[error("Parse error in {operation}: {message}")]
    Parse { operation: String, message: String },
}

fn path_suffix(path: &Option<String>) -> String {
    path.as_ref()
        .map(|p| format!(" (path: {})", p))
        .unwrap_or_default()
}

fn url_suffix(url: &Option<String>) -> String {
    url.as_ref()
        .map(|u| format!(" (url: {})", u))
        .unwrap_or_default()
}

/// Error from the numeric helpers in `mathhelpers`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MathError {
    #[error("Polynomial has no real roots.")]
    NoRealRoots,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("needs and probs must have the same length ({needs} != {probs})")]
    LengthMismatch { needs: usize, probs: usize },
    #[error("points do not determine a unique parabola")]
    Singular,
}

/// Constructors for common error patterns
pub mod utils {
    use super::*;

    /// Convert std::io::Error to FragmentError
    pub fn io_error(operation: &str, path: Option<&str>, source: std::io::Error) -> FragmentError {
        FragmentError::Io {
            operation: operation.to_string(),
            path: path.map(String::from),
            source,
        }
    }

    pub fn network_error(operation: &str, url: Option<&str>, message: impl ToString) -> FragmentError {
        FragmentError::Network {
            operation: operation.to_string(),
            url: url.map(String::from),
            message: message.to_string(),
        }
    }

    pub fn parse_error(operation: &str, message: impl ToString) -> FragmentError {
        FragmentError::Parse {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }
}
