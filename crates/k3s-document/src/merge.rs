//! Deep merge of two documents.
//!
//! - Mappings: merged by key, recursively. Existing keys keep their position,
//!   keys introduced by `incoming` are appended in `incoming` order.
//! - Sequences: REPLACE (incoming wins entirely)
//! - Scalars and mismatched kinds: incoming wins

use crate::document::Document;

/// Merge `incoming` over `existing`.
pub fn merge(existing: Document, incoming: Document) -> Document {
    match (existing, incoming) {
        (Document::Mapping(mut base), Document::Mapping(overlay)) => {
            for (key, overlay_value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => {
                        let base_value = std::mem::take(slot);
                        *slot = merge(base_value, overlay_value);
                    }
                    None => {
                        base.insert(key, overlay_value);
                    }
                }
            }
            Document::Mapping(base)
        }

        // Sequences are never concatenated
        (_, overlay) => overlay,
    }
}
