//! Cheap counter extraction without a full [`crate::decode`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Derived counters read straight off a document's JSON, without
/// deserializing it into [`crate::RedstringDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Number of node prototypes.
    pub node_count: u64,
    /// Number of spatial graphs.
    pub graph_count: u64,
    /// Number of edges.
    pub edge_count: u64,
}

/// Extract [`DocumentStats`] from raw document bytes.
///
/// Prefers the embedded `metadata` block when present (the common case —
/// every document this system writes carries one); falls back to counting
/// `prototypeSpace`/`spatialGraphs`/`edges` map entries directly for
/// documents that predate it.
pub fn extract_stats(bytes: &[u8]) -> Result<DocumentStats, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;

    if let Some(metadata) = value.get("metadata") {
        if let (Some(nodes), Some(graphs), Some(edges)) = (
            metadata.get("nodeCount").and_then(Value::as_u64),
            metadata.get("graphCount").and_then(Value::as_u64),
            metadata.get("edgeCount").and_then(Value::as_u64),
        ) {
            return Ok(DocumentStats {
                node_count: nodes,
                graph_count: graphs,
                edge_count: edges,
            });
        }
    }

    let count_entries = |key: &str| value.get(key).and_then(Value::as_object).map(|m| m.len() as u64).unwrap_or(0);

    Ok(DocumentStats {
        node_count: count_entries("prototypeSpace"),
        graph_count: count_entries("spatialGraphs"),
        edge_count: count_entries("edges"),
    })
}
