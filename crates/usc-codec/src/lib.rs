#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-codec** – Bidirectional, pure translation between in-memory graph
//! state and the persisted `.redstring` document. This crate has zero I/O
//! dependencies by design: it knows nothing of files, git, or the network.
//! Everything here is a plain function over owned data, which is what makes
//! the round-trip property in [`decode`]/[`encode`] testable without any
//! fixture beyond generated values.

pub mod document;
pub mod fingerprint;
pub mod state;
pub mod stats;

pub use document::{decode, encode, DocumentMetadata, DocumentUniverseInfo, RedstringDocument};
pub use fingerprint::{canonical_bytes, fingerprint};
pub use state::{Edge, GraphInstance, GraphStoreState, NodePrototype, SpatialGraph};
pub use stats::{extract_stats, DocumentStats};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::collection::{btree_map, vec as pvec};
    use proptest::prelude::*;
    use serde_json::Map;

    fn id_strategy() -> impl Strategy<Value = String> {
        "[a-z]{3,8}"
    }

    fn prototype_strategy() -> impl Strategy<Value = NodePrototype> {
        (id_strategy(), "[A-Za-z ]{1,12}").prop_map(|(id, name)| NodePrototype {
            id,
            name,
            description: None,
            color: None,
            extra: Map::new(),
        })
    }

    fn instance_strategy(prototype_ids: Vec<String>) -> impl Strategy<Value = GraphInstance> {
        (
            id_strategy(),
            proptest::sample::select(prototype_ids),
            -1000.0..1000.0,
            -1000.0..1000.0,
        )
            .prop_map(|(id, prototype_id, x, y)| GraphInstance {
                id,
                prototype_id,
                x,
                y,
                extra: Map::new(),
            })
    }

    fn store_state_strategy() -> impl Strategy<Value = GraphStoreState> {
        btree_map(id_strategy(), prototype_strategy(), 1..5).prop_flat_map(|prototypes| {
            let prototype_ids: Vec<String> = prototypes.keys().cloned().collect();
            btree_map(id_strategy(), instance_strategy(prototype_ids), 0..5).prop_map(move |instances| {
                let mut graphs = std::collections::BTreeMap::new();
                graphs.insert(
                    "main".to_string(),
                    SpatialGraph {
                        id: "main".into(),
                        name: "Main".into(),
                        instances,
                        extra: Map::new(),
                    },
                );
                GraphStoreState {
                    prototypes: prototypes.clone(),
                    graphs,
                    edges: std::collections::BTreeMap::new(),
                    open_graph_ids: vec!["main".into()],
                    active_graph_id: Some("main".into()),
                }
            })
        })
    }

    fn universe_info() -> DocumentUniverseInfo {
        let now = Utc::now();
        DocumentUniverseInfo {
            slug: "alpha".into(),
            name: "Alpha".into(),
            created_at: now,
            updated_at: now,
        }
    }

    proptest! {
        #[test]
        fn decode_of_encode_is_equivalent(state in store_state_strategy()) {
            let document = encode(&state, universe_info(), None);
            let (decoded, warnings) = decode(&document);
            prop_assert!(warnings.is_empty());
            prop_assert_eq!(decoded, state);
        }

        #[test]
        fn fingerprint_is_stable_across_clones(state in store_state_strategy()) {
            let document_a = encode(&state, universe_info(), None);
            let document_b = document_a.clone();
            prop_assert_eq!(fingerprint(&document_a), fingerprint(&document_b));
        }
    }

    #[test]
    fn decode_preserves_unknown_fields_on_reencode() {
        let mut document = encode(&GraphStoreState::default(), universe_info(), None);
        document.extra.insert("futureField".into(), serde_json::json!("kept"));

        let (state, warnings) = decode(&document);
        assert!(warnings.is_empty());

        // A caller that threads the decoded document back in as `prior`
        // carries its `extra` bag forward; one that passes `None` starts
        // fresh and drops it. The Engine always does the former.
        let reencoded = encode(&state, universe_info(), Some(&document));
        assert_eq!(reencoded.extra.get("futureField"), Some(&serde_json::json!("kept")));

        let reencoded_without_prior = encode(&state, universe_info(), None);
        assert!(reencoded_without_prior.extra.is_empty());
    }

    #[test]
    fn decode_warns_about_dangling_edge_reference() {
        let mut document = encode(&GraphStoreState::default(), universe_info(), None);
        document.edges.insert(
            "e1".into(),
            Edge {
                id: "e1".into(),
                from: "missing-a".into(),
                to: "missing-b".into(),
                kind: None,
                extra: Map::new(),
            },
        );

        let (_, warnings) = decode(&document);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn decode_warns_about_newer_format_version() {
        let mut document = encode(&GraphStoreState::default(), universe_info(), None);
        document.format_version = document::CURRENT_FORMAT_VERSION + 1;

        let (_, warnings) = decode(&document);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn extract_stats_matches_encoded_metadata() {
        let state = GraphStoreState {
            prototypes: {
                let mut m = std::collections::BTreeMap::new();
                m.insert(
                    "p1".into(),
                    NodePrototype {
                        id: "p1".into(),
                        name: "P1".into(),
                        description: None,
                        color: None,
                        extra: Map::new(),
                    },
                );
                m
            },
            ..Default::default()
        };
        let document = encode(&state, universe_info(), None);
        let bytes = canonical_bytes(&document);
        let stats = extract_stats(&bytes).unwrap();
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.graph_count, 0);
        assert_eq!(stats.edge_count, 0);
    }
}
