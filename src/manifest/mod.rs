//! Helm chart generation
//!
//! Every artifact of the chart is produced by a pure generator from the
//! configuration. An artifact that already exists on disk is parsed and merged
//! with the freshly generated one (generated values win, keys and documents
//! added by hand survive), so running the generator twice leaves the chart
//! byte-identical.

mod chart;
mod ingress;
mod secrets;
mod service;
mod values;
mod workload;

use std::fs;
use std::path::{Path, PathBuf};

use k3s_document::{DocumentError, Manifest};

use crate::config::{ConfigError, Configuration, Environment, MissingPolicy};

pub use secrets::registry_credential;

/// Default chart directory, relative to the working directory.
pub const CHART_DIR: &str = ".helm";

/// Name of the image pull secret shared by the workload and the secrets template.
pub const REGISTRY_SECRET: &str = "registry-secret";

/// Everything the generators read: the configuration plus the environment
/// values resolved for this run.
#[derive(Debug, Clone)]
pub struct ChartInput<'a> {
    pub config: &'a Configuration,

    /// Clear variables with a value; unset environment-sourced names are left out
    pub clear_env: Vec<(String, String)>,

    /// Registry password, when one of the configured variables is set
    pub registry_password: Option<String>,
}

impl<'a> ChartInput<'a> {
    /// Resolve environment values for generation. Unset variables are skipped.
    pub fn resolve(config: &'a Configuration, env: &dyn Environment) -> Result<Self, ConfigError> {
        let clear_env = config.env.clear_values(env, MissingPolicy::Skip)?;
        let registry_password = config.image.registry.resolve_password(env);
        if registry_password.is_none() {
            tracing::warn!(
                variables = ?config.image.registry.password,
                "registry password not set; keeping any existing registry secret"
            );
        }

        Ok(Self {
            config,
            clear_env,
            registry_password,
        })
    }
}

/// A chart file and the generator that produces it.
#[derive(Clone, Copy)]
pub struct Artifact {
    /// Path relative to the chart directory
    pub name: &'static str,
    generate: fn(&ChartInput<'_>) -> Manifest,
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact").field("name", &self.name).finish()
    }
}

impl Artifact {
    /// Generated documents for this artifact.
    pub fn generate(&self, input: &ChartInput<'_>) -> Manifest {
        (self.generate)(input)
    }

    /// Canonical text of the generated documents.
    pub fn render(&self, input: &ChartInput<'_>) -> Result<String, ManifestError> {
        self.generate(input)
            .render()
            .map_err(|source| ManifestError::Generated {
                artifact: self.name,
                source,
            })
    }
}

/// Chart artifacts in generation order.
pub const ARTIFACTS: &[Artifact] = &[
    Artifact {
        name: "Chart.yaml",
        generate: chart::generate,
    },
    Artifact {
        name: "values.yaml",
        generate: values::generate,
    },
    Artifact {
        name: "templates/deployment.yaml",
        generate: workload::generate,
    },
    Artifact {
        name: "templates/service.yaml",
        generate: service::generate,
    },
    Artifact {
        name: "templates/secrets.yaml",
        generate: secrets::generate,
    },
    Artifact {
        name: "templates/ingress.yaml",
        generate: ingress::generate,
    },
];

/// What happened to one artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// No file existed; the generated text was written
    Created,
    /// Existing file merged with the generated documents and rewritten
    Merged,
    /// Merge result equals the file on disk; nothing written
    Unchanged,
    /// Existing file could not be parsed and was overwritten
    Replaced,
}

/// Outcome of [`generate_all`], in artifact order.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub artifacts: Vec<(PathBuf, ArtifactOutcome)>,
}

impl GenerationReport {
    pub fn outcome(&self, name: &str) -> Option<ArtifactOutcome> {
        self.artifacts
            .iter()
            .find(|(path, _)| path.ends_with(name))
            .map(|(_, outcome)| *outcome)
    }
}

/// Errors for chart generation
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generated content failed to render or re-parse; always a bug
    #[error("generated {artifact} is not valid YAML: {source}")]
    Generated {
        artifact: &'static str,
        #[source]
        source: DocumentError,
    },

    #[error("failed to render merged {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Generate every artifact under `chart_dir`, merging with what is on disk.
pub fn generate_all(input: &ChartInput<'_>, chart_dir: &Path) -> Result<GenerationReport, ManifestError> {
    let templates = chart_dir.join("templates");
    fs::create_dir_all(&templates).map_err(|source| ManifestError::Io {
        path: templates.clone(),
        source,
    })?;

    let mut report = GenerationReport::default();
    for artifact in ARTIFACTS {
        let path = chart_dir.join(artifact.name);
        let outcome = write_artifact(artifact, input, &path)?;
        tracing::info!(artifact = artifact.name, outcome = ?outcome, "chart artifact");
        report.artifacts.push((path, outcome));
    }

    Ok(report)
}

/// Generate one artifact and merge it into `path`.
pub fn write_artifact(
    artifact: &Artifact,
    input: &ChartInput<'_>,
    path: &Path,
) -> Result<ArtifactOutcome, ManifestError> {
    let incoming_text = artifact.render(input)?;
    let io_err = |source: std::io::Error| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        fs::write(path, &incoming_text).map_err(io_err)?;
        return Ok(ArtifactOutcome::Created);
    }

    let existing_text = fs::read_to_string(path).map_err(io_err)?;
    let existing = match Manifest::parse(&existing_text) {
        Ok(existing) => existing,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "existing artifact is not valid YAML, overwriting");
            fs::write(path, &incoming_text).map_err(io_err)?;
            return Ok(ArtifactOutcome::Replaced);
        }
    };
    if !existing.is_empty() && existing.documents().iter().all(|doc| doc.as_mapping().is_none()) {
        tracing::warn!(path = %path.display(), "existing artifact holds no mappings, overwriting");
        fs::write(path, &incoming_text).map_err(io_err)?;
        return Ok(ArtifactOutcome::Replaced);
    }

    let incoming = Manifest::parse(&incoming_text).map_err(|source| ManifestError::Generated {
        artifact: artifact.name,
        source,
    })?;

    let merged_text = Manifest::merge(existing, incoming)
        .render()
        .map_err(|source| ManifestError::Render {
            path: path.to_path_buf(),
            source,
        })?;

    if merged_text == existing_text {
        return Ok(ArtifactOutcome::Unchanged);
    }

    fs::write(path, merged_text).map_err(io_err)?;
    Ok(ArtifactOutcome::Merged)
}

/// Wrap a Go template expression in `{{ }}`.
fn action(expression: &str) -> String {
    format!("{{{{ {} }}}}", expression)
}

const RELEASE_NAME: &str = "{{ .Release.Name }}";
const RELEASE_NAMESPACE: &str = "{{ .Release.Namespace }}";
