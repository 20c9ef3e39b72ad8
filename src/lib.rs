//! k3s-deploy - single-node k3s deployments
//!
//! Bootstraps k3s on a remote server over SSH, keeps the local kubeconfig in
//! sync with it, and generates a Helm chart for the application that is
//! merged with any hand edits already on disk.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod host;
pub mod image;
pub mod kubeconfig;
pub mod logging;
pub mod manifest;
pub mod release;
pub mod tool;

pub use bootstrap::{Bootstrap, BootstrapReport, BootstrapSettings, Step, StepOutcome};
pub use config::{Configuration, Environment, ProcessEnvironment};
pub use error::{Error, Result};
pub use kubeconfig::{absorb, consolidate, CredentialBundle};
pub use manifest::{generate_all, ChartInput, GenerationReport};
