//! Template engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template with this name was loaded
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Parsing or rendering failed
    #[error("Template error: {0}")]
    Render(String),

    /// Embedded template is not valid UTF-8
    #[error("Invalid template encoding: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
