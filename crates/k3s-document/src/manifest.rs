//! Multi-document manifests.
//!
//! A manifest file holds one or more YAML documents separated by `---`.
//! Parsing and rendering go through the template action table so chart
//! templates survive a round trip unchanged.

use serde::Deserialize;

use crate::document::Document;
use crate::error::DocumentError;
use crate::merge::merge;
use crate::template::Actions;

/// Document separator written between rendered documents.
const SEPARATOR: &str = "---\n";

/// An ordered list of documents read from or written to one file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    documents: Vec<Document>,
}

impl Manifest {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// A manifest holding a single document.
    pub fn single(document: Document) -> Self {
        Self {
            documents: vec![document],
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Find the document with the given `kind` and `metadata.name`.
    pub fn find(&self, kind: &str, name: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|doc| identity(doc) == Some((kind, name)))
    }

    /// Parse YAML text, skipping empty documents.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let mut actions = Actions::new();
        let protected = actions.protect(text);

        let mut documents = Vec::new();
        for deserializer in serde_yaml::Deserializer::from_str(&protected) {
            let value = serde_yaml::Value::deserialize(deserializer).map_err(DocumentError::Parse)?;
            if value.is_null() {
                continue;
            }
            documents.push(actions.restore_document(Document::from(value)));
        }

        Ok(Self { documents })
    }

    /// Render as YAML text.
    ///
    /// Output is canonical: `Manifest::parse(&m.render()?)? == m`.
    pub fn render(&self) -> Result<String, DocumentError> {
        let mut actions = Actions::new();
        let mut out = String::new();

        for (index, document) in self.documents.iter().enumerate() {
            if index > 0 {
                out.push_str(SEPARATOR);
            }
            let protected = actions.protect_document(document.clone());
            let yaml = serde_yaml::to_string(&protected).map_err(DocumentError::Render)?;
            out.push_str(&yaml);
        }

        Ok(actions.restore(&out))
    }

    /// Merge an incoming manifest over an existing one, document by document.
    ///
    /// Documents with a `kind` and `metadata.name` pair by that identity.
    /// Documents without one pair by position with an existing document that
    /// has no identity either. Existing mapping documents left unpaired are
    /// kept after the incoming ones; unpaired scalars and sequences are dropped.
    pub fn merge(existing: Manifest, incoming: Manifest) -> Manifest {
        let mut pool: Vec<Option<Document>> = existing.documents.into_iter().map(Some).collect();
        let mut merged = Vec::with_capacity(incoming.documents.len());

        for (index, document) in incoming.documents.into_iter().enumerate() {
            let slot = match identity(&document) {
                Some(id) => pool
                    .iter()
                    .position(|candidate| candidate.as_ref().and_then(identity) == Some(id)),
                None => pool
                    .get(index)
                    .and_then(Option::as_ref)
                    .filter(|candidate| identity(candidate).is_none())
                    .map(|_| index),
            };

            let paired = slot.and_then(|i| pool[i].take());
            merged.push(match paired {
                Some(previous) => merge(previous, document),
                None => document,
            });
        }

        merged.extend(
            pool.into_iter()
                .flatten()
                .filter(|document| document.as_mapping().is_some()),
        );
        Manifest { documents: merged }
    }
}

/// The `(kind, metadata.name)` of a Kubernetes-style document.
fn identity(document: &Document) -> Option<(&str, &str)> {
    let kind = document.get("kind")?.as_str()?;
    let name = document.pointer("metadata.name")?.as_str()?;
    Some((kind, name))
}
