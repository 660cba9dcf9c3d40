//! Error types.
//!
//! [`Error`] is what the public entry points return. [`RenderError`] is what
//! a [`PdfEngine`](crate::export::PdfEngine) reports; the export stage folds
//! it into [`Error::Export`].

use thiserror::Error;

/// Errors surfaced by [`render`](crate::render), [`download`](crate::download)
/// and [`download_from_element`](crate::download_from_element).
#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was not supplied. Raised before any DOM mutation.
    #[error("{argument} is required for {operation}.")]
    MissingArgument {
        argument: &'static str,
        operation: &'static str,
    },

    /// Anything that went wrong inside the export pipeline, normalised to
    /// the original message (or a fixed fallback when there was none).
    #[error("{message}")]
    Export { message: String },
}

impl Error {
    /// Wrap a pipeline failure, substituting `fallback` for an empty message.
    pub fn export(message: impl Into<String>, fallback: &str) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        };
        Error::Export { message }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures inside the HTML → PDF engine.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid format: {0}")]
    UnknownFormat(String),

    #[error("layout failed: {0}")]
    Layout(String),

    #[error("image encoding failed: {0}")]
    Image(String),

    /// Free-form failure from a third-party engine.
    #[error("{0}")]
    Engine(String),

    #[error("could not save {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<taffy::TaffyError> for RenderError {
    fn from(e: taffy::TaffyError) -> Self {
        RenderError::Layout(format!("{e:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_message() {
        let err = Error::MissingArgument {
            argument: "Container element",
            operation: "render",
        };
        assert_eq!(err.to_string(), "Container element is required for render.");
    }

    #[test]
    fn export_keeps_message_or_falls_back() {
        let kept = Error::export("Invalid format: b9", "Failed to generate PDF");
        assert_eq!(kept.to_string(), "Invalid format: b9");

        let fallback = Error::export("  ", "Failed to generate PDF");
        assert_eq!(fallback.to_string(), "Failed to generate PDF");
    }
}
