//! Error types for document parsing and rendering.

/// Errors raised while converting between text and documents.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("YAML parse error: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("YAML render error: {0}")]
    Render(#[source] serde_yaml::Error),
}
