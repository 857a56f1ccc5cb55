//! Canonical byte encoding and content fingerprinting.

use sha2::{Digest, Sha256};

use crate::document::RedstringDocument;

/// Serialize a document to its canonical byte form.
///
/// `serde_json`'s default map type orders keys (we never enable the
/// `preserve_order` feature), so two documents with identical logical
/// content always produce identical bytes regardless of field insertion
/// order.
pub fn canonical_bytes(document: &RedstringDocument) -> Vec<u8> {
    serde_json::to_vec(document).expect("RedstringDocument always serializes")
}

/// A stable content hash of a document's canonical encoding, used by the
/// Engine to elide no-op commits.
pub fn fingerprint(document: &RedstringDocument) -> String {
    let bytes = canonical_bytes(document);
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, DocumentUniverseInfo};
    use chrono::Utc;
    use serde_json::Map;
    use std::collections::BTreeMap;

    fn sample() -> RedstringDocument {
        RedstringDocument {
            format_version: 1,
            universe: DocumentUniverseInfo {
                slug: "alpha".into(),
                name: "Alpha".into(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            prototype_space: BTreeMap::new(),
            spatial_graphs: BTreeMap::new(),
            edges: BTreeMap::new(),
            open_graph_ids: vec![],
            active_graph_id: None,
            metadata: DocumentMetadata::default(),
            extra: Map::new(),
        }
    }

    #[test]
    fn identical_documents_fingerprint_identically() {
        let a = sample();
        let b = a.clone();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn differing_documents_fingerprint_differently() {
        let a = sample();
        let mut b = a.clone();
        b.universe.name = "Beta".into();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
