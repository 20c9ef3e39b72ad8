//! Top-level error aggregating the per-module errors.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::config::ConfigError;
use crate::host::TransportError;
use crate::image::ImageError;
use crate::kubeconfig::KubeconfigError;
use crate::manifest::ManifestError;
use crate::release::ReleaseError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("chart generation error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("SSH error: {0}")]
    Transport(#[from] TransportError),

    #[error("setup failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("release error: {0}")]
    Release(#[from] ReleaseError),
}

impl Error {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Manifest(_) => 3,
            Error::Kubeconfig(_) => 4,
            Error::Transport(_) | Error::Bootstrap(_) => 5,
            Error::Image(_) => 6,
            Error::Release(_) => 7,
        }
    }
}

/// Result type for top-level operations
pub type Result<T> = std::result::Result<T, Error>;
