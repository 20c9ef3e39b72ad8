//! Ordered structured documents with deep merge.
//!
//! Generated deployment manifests and local credential files are parsed into
//! [`Document`]s, merged with [`merge`] (incoming values win, mappings merge by
//! key, sequences are replaced), and written back through [`Manifest`], which
//! keeps Helm template actions intact.

mod document;
mod error;
mod manifest;
mod merge;
mod template;

pub use document::{Document, Mapping, Scalar};
pub use error::DocumentError;
pub use manifest::Manifest;
pub use merge::merge;
