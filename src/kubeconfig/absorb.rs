//! Rename-and-relink merge of two kubeconfig bundles.

use std::collections::{HashMap, HashSet};

use k3s_document::{merge, Document};

use super::{CredentialBundle, EntryKind, NamedEntry};

/// Incoming names that were changed, per namespace: original name to new name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renames {
    pub clusters: HashMap<String, String>,
    pub contexts: HashMap<String, String>,
    pub users: HashMap<String, String>,
}

impl Renames {
    fn table_mut(&mut self, kind: EntryKind) -> &mut HashMap<String, String> {
        match kind {
            EntryKind::Cluster => &mut self.clusters,
            EntryKind::Context => &mut self.contexts,
            EntryKind::User => &mut self.users,
        }
    }

    /// The name `original` ends up with after the merge.
    pub fn resolve<'a>(&'a self, kind: EntryKind, original: &'a str) -> &'a str {
        let table = match kind {
            EntryKind::Cluster => &self.clusters,
            EntryKind::Context => &self.contexts,
            EntryKind::User => &self.users,
        };
        table.get(original).map(String::as_str).unwrap_or(original)
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.contexts.is_empty() && self.users.is_empty()
    }
}

/// Merge `incoming` into `existing`.
///
/// Existing entries stay first and untouched. An incoming entry whose name is
/// already taken becomes `<name>_1`, `<name>_2`, ... (the first free one),
/// and incoming contexts referring to a renamed cluster or user are
/// rewritten. `current-context` switches to the incoming one.
pub fn absorb(existing: CredentialBundle, incoming: CredentialBundle) -> (CredentialBundle, Renames) {
    let mut merged = existing;
    let mut incoming = incoming;
    let mut renames = Renames::default();
    let first_incoming_index = merged.contexts.len();

    for kind in [EntryKind::Cluster, EntryKind::User, EntryKind::Context] {
        let mut taken: HashSet<String> = merged.names(kind).into_iter().map(str::to_string).collect();

        for mut entry in std::mem::take(incoming.entries_mut(kind)) {
            let original = entry.name().to_string();
            let name = unique_name(&original, &taken);
            if name != original {
                tracing::debug!(kind = %kind, from = %original, to = %name, "renamed kubeconfig entry");
                entry.set_name(&name);
                renames.table_mut(kind).entry(original).or_insert_with(|| name.clone());
            }
            if kind == EntryKind::Context {
                relink(&mut entry, &renames);
            }
            taken.insert(name);
            merged.entries_mut(kind).push(entry);
        }
    }

    let first_incoming = merged
        .contexts
        .get(first_incoming_index)
        .map(|entry| entry.name().to_string());
    let previous = merged.current_context.take();
    merged.current_context = incoming
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| renames.resolve(EntryKind::Context, name).to_string())
        .or(first_incoming)
        .or(previous);

    if merged.api_version.is_none() {
        merged.api_version = incoming.api_version;
    }
    merged.extra = match merge(Document::from(merged.extra), Document::from(incoming.extra)) {
        Document::Mapping(extra) => extra,
        _ => Default::default(),
    };

    (merged, renames)
}

/// `original`, or the first `original_N` (N = 1, 2, ...) not in `taken`.
fn unique_name(original: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(original) {
        return original.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", original, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| original.to_string())
}

/// Point a context at the renamed cluster and user, if they were renamed.
fn relink(context: &mut NamedEntry, renames: &Renames) {
    for kind in [EntryKind::Cluster, EntryKind::User] {
        let Some(target) = context.reference(kind) else {
            continue;
        };
        let resolved = renames.resolve(kind, target);
        if resolved != target {
            let resolved = resolved.to_string();
            context.set_reference(kind, &resolved);
        }
    }
}
