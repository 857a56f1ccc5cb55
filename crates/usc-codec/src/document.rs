//! The persisted `.redstring` document shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::{Edge, GraphStoreState, NodePrototype, SpatialGraph};

/// The current document format. Bumped whenever a field is added or
/// reinterpreted in a way [`decode`] needs to branch on.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Identity and timestamps for the universe a document belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUniverseInfo {
    /// The universe's slug.
    pub slug: String,
    /// The universe's display name at the time of encoding.
    pub name: String,
    /// When the universe was first created.
    pub created_at: DateTime<Utc>,
    /// When this document was produced.
    pub updated_at: DateTime<Utc>,
}

/// Derived counters embedded in the document itself, so a reader can show
/// them without a full decode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Number of node prototypes.
    pub node_count: u64,
    /// Number of spatial graphs.
    pub graph_count: u64,
    /// Number of edges.
    pub edge_count: u64,
}

/// The persisted shape of one universe's knowledge graph. Field order here
/// does not matter for byte-stability — [`crate::encode`] always serializes
/// through `serde_json`'s default `BTreeMap`-ordered maps, never `HashMap`,
/// so two documents with the same logical content always produce identical
/// bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedstringDocument {
    /// Format version this document was written at.
    pub format_version: u32,
    /// Universe identity and timestamps.
    pub universe: DocumentUniverseInfo,
    /// Node definitions, keyed by id.
    pub prototype_space: BTreeMap<String, NodePrototype>,
    /// Spatial graphs, keyed by id.
    pub spatial_graphs: BTreeMap<String, SpatialGraph>,
    /// Edges, keyed by id.
    pub edges: BTreeMap<String, Edge>,
    /// Graph ids open in the UI, in tab order. Transient, but preserved
    /// across a save so the next session reopens the same tabs.
    pub open_graph_ids: Vec<String>,
    /// The graph focused at save time, if any.
    pub active_graph_id: Option<String>,
    /// Derived counters.
    pub metadata: DocumentMetadata,
    /// Fields from a newer format version this build does not understand.
    /// Round-tripped verbatim on re-encode.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Build a document from in-memory state and the owning universe's
/// identity. Pure: performs no I/O and never fails.
///
/// `prior` is the last document this state was decoded from (or last
/// committed), if any. Its `extra` bag is carried forward verbatim so a
/// decode-then-encode round trip never drops fields a newer build wrote —
/// callers that have no prior document (e.g. encoding a brand-new universe)
/// pass `None` and start with an empty bag.
pub fn encode(state: &GraphStoreState, universe: DocumentUniverseInfo, prior: Option<&RedstringDocument>) -> RedstringDocument {
    RedstringDocument {
        format_version: CURRENT_FORMAT_VERSION,
        universe,
        prototype_space: state.prototypes.clone(),
        spatial_graphs: state.graphs.clone(),
        edges: state.edges.clone(),
        open_graph_ids: state.open_graph_ids.clone(),
        active_graph_id: state.active_graph_id.clone(),
        metadata: DocumentMetadata {
            node_count: state.prototypes.len() as u64,
            graph_count: state.graphs.len() as u64,
            edge_count: state.edges.len() as u64,
        },
        extra: prior.map(|d| d.extra.clone()).unwrap_or_default(),
    }
}

/// Recover in-memory state from a document, along with any warnings raised
/// while doing so (e.g. a future format version, or a dangling edge
/// reference). Never fails outright — an older or slightly malformed
/// document still decodes to the best state it can.
pub fn decode(document: &RedstringDocument) -> (GraphStoreState, Vec<String>) {
    let mut warnings = Vec::new();

    if document.format_version > CURRENT_FORMAT_VERSION {
        warnings.push(format!(
            "document format version {} is newer than this build understands ({CURRENT_FORMAT_VERSION}); unknown fields are preserved but not interpreted",
            document.format_version
        ));
    }

    for edge in document.edges.values() {
        let instance_exists = |instance_id: &str| {
            document
                .spatial_graphs
                .values()
                .any(|g| g.instances.contains_key(instance_id))
        };
        if !instance_exists(&edge.from) {
            warnings.push(format!("edge '{}' references missing instance '{}'", edge.id, edge.from));
        }
        if !instance_exists(&edge.to) {
            warnings.push(format!("edge '{}' references missing instance '{}'", edge.id, edge.to));
        }
    }

    if let Some(active) = &document.active_graph_id {
        if !document.spatial_graphs.contains_key(active) {
            warnings.push(format!("activeGraphId '{active}' does not name a known spatial graph"));
        }
    }

    let state = GraphStoreState {
        prototypes: document.prototype_space.clone(),
        graphs: document.spatial_graphs.clone(),
        edges: document.edges.clone(),
        open_graph_ids: document.open_graph_ids.clone(),
        active_graph_id: document.active_graph_id.clone(),
    };

    (state, warnings)
}
