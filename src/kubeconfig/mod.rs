//! Local kubeconfig consolidation
//!
//! The bundle fetched from a fresh k3s server names its cluster, context and
//! user `default`, which collides with whatever is already in
//! `~/.kube/config`. [`absorb`] renames colliding incoming entries and
//! re-links the contexts that point at them; [`consolidate`] backs up, merges
//! and atomically rewrites the local file.

mod absorb;
mod store;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use k3s_document::{Document, Mapping};
use serde::{Deserialize, Serialize};

use crate::config::{null_as_default, Environment};

pub use absorb::{absorb, Renames};
pub use store::{backup_path, consolidate, consolidate_at, ConsolidateReport, BACKUP_MARKER};

/// Kubeconfig location relative to the home directory.
pub const DEFAULT_KUBECONFIG: &str = ".kube/config";

/// `~/.kube/config` for the given environment.
pub fn default_kubeconfig_path(env: &dyn Environment) -> Result<PathBuf, KubeconfigError> {
    let home = env.var("HOME").ok_or(KubeconfigError::NoHome)?;
    Ok(Path::new(&home).join(DEFAULT_KUBECONFIG))
}

/// A kubeconfig file.
///
/// Entries keep every field they were read with, and unknown top-level keys
/// (`kind`, `preferences`, ...) are carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub clusters: Vec<NamedEntry>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub contexts: Vec<NamedEntry>,

    #[serde(
        rename = "current-context",
        alias = "currentContext",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,

    #[serde(flatten)]
    pub extra: Mapping,

    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<NamedEntry>,
}

/// One of the three entry namespaces of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Cluster,
    Context,
    User,
}

impl EntryKind {
    /// Key of the reference inside a context body.
    fn reference_key(self) -> &'static str {
        match self {
            EntryKind::Cluster => "cluster",
            EntryKind::Context => "context",
            EntryKind::User => "user",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reference_key())
    }
}

impl CredentialBundle {
    /// Parse kubeconfig YAML.
    pub fn parse(text: &str) -> Result<Self, KubeconfigError> {
        serde_yaml::from_str(text).map_err(KubeconfigError::Parse)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, KubeconfigError> {
        serde_yaml::to_string(self).map_err(KubeconfigError::Serialize)
    }

    pub fn entries(&self, kind: EntryKind) -> &[NamedEntry] {
        match kind {
            EntryKind::Cluster => &self.clusters,
            EntryKind::Context => &self.contexts,
            EntryKind::User => &self.users,
        }
    }

    pub(crate) fn entries_mut(&mut self, kind: EntryKind) -> &mut Vec<NamedEntry> {
        match kind {
            EntryKind::Cluster => &mut self.clusters,
            EntryKind::Context => &mut self.contexts,
            EntryKind::User => &mut self.users,
        }
    }

    /// Names of one namespace, in file order.
    pub fn names(&self, kind: EntryKind) -> Vec<&str> {
        self.entries(kind).iter().map(NamedEntry::name).collect()
    }

    pub fn context(&self, name: &str) -> Option<&NamedEntry> {
        self.contexts.iter().find(|entry| entry.name() == name)
    }

    /// Context references that do not resolve, as `(context, kind, target)`.
    pub fn dangling_references(&self) -> Vec<(String, EntryKind, String)> {
        let clusters: HashSet<&str> = self.clusters.iter().map(NamedEntry::name).collect();
        let users: HashSet<&str> = self.users.iter().map(NamedEntry::name).collect();

        let mut dangling = Vec::new();
        for context in &self.contexts {
            for (kind, known) in [(EntryKind::Cluster, &clusters), (EntryKind::User, &users)] {
                if let Some(target) = context.reference(kind) {
                    if !known.contains(target) {
                        dangling.push((context.name().to_string(), kind, target.to_string()));
                    }
                }
            }
        }
        dangling
    }
}

/// A named list entry (`{name: ..., cluster|context|user: {...}}`).
///
/// Backed by the raw mapping so fields this tool does not know about are
/// written back unchanged and in their original order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Mapping", into = "Mapping")]
pub struct NamedEntry {
    fields: Mapping,
}

impl NamedEntry {
    pub fn name(&self) -> &str {
        self.fields
            .get("name")
            .and_then(Document::as_str)
            .unwrap_or_default()
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.fields.insert("name".to_string(), Document::from(name));
    }

    /// The cluster or user a context entry points at.
    pub fn reference(&self, kind: EntryKind) -> Option<&str> {
        self.fields
            .get("context")?
            .get(kind.reference_key())?
            .as_str()
    }

    pub(crate) fn set_reference(&mut self, kind: EntryKind, target: &str) {
        if let Some(body) = self
            .fields
            .get_mut("context")
            .and_then(Document::as_mapping_mut)
        {
            body.insert(kind.reference_key().to_string(), Document::from(target));
        }
    }

    pub fn fields(&self) -> &Mapping {
        &self.fields
    }
}

impl TryFrom<Mapping> for NamedEntry {
    type Error = String;

    fn try_from(fields: Mapping) -> Result<Self, Self::Error> {
        match fields.get("name") {
            Some(name) if name.as_str().is_some() => Ok(Self { fields }),
            Some(_) => Err("entry 'name' must be a string".to_string()),
            None => Err("entry is missing 'name'".to_string()),
        }
    }
}

impl From<NamedEntry> for Mapping {
    fn from(entry: NamedEntry) -> Self {
        entry.fields
    }
}

/// Errors for kubeconfig handling
#[derive(Debug, thiserror::Error)]
pub enum KubeconfigError {
    #[error("HOME is not set; pass the kubeconfig path explicitly")]
    NoHome,

    #[error("invalid kubeconfig: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("failed to serialize kubeconfig: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
