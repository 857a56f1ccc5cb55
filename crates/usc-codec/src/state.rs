//! The in-memory graph shape the rest of the system mutates directly.
//!
//! [`GraphStoreState`] has no notion of persistence, files, or git — it is
//! exactly what an editor holds in memory between saves. [`crate::encode`]
//! turns it into a [`crate::RedstringDocument`]; [`crate::decode`] turns a
//! document back into one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node definition, independent of where it is instantiated spatially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePrototype {
    /// Stable identifier, unique within `prototypeSpace`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Display color, as a hex string or named color.
    pub color: Option<String>,
    /// Fields from a newer document version this build does not know about.
    /// Carried verbatim so re-encoding does not lose them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One placement of a prototype within a [`SpatialGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInstance {
    /// Stable identifier, unique within the owning graph.
    pub id: String,
    /// The [`NodePrototype::id`] this instance renders.
    pub prototype_id: String,
    /// Canvas x-coordinate.
    pub x: f64,
    /// Canvas y-coordinate.
    pub y: f64,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One spatial arrangement of prototype instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialGraph {
    /// Stable identifier, unique within `spatialGraphs`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Instances placed on this graph's canvas, keyed by [`GraphInstance::id`].
    pub instances: BTreeMap<String, GraphInstance>,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A directed relationship between two prototype instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Stable identifier, unique within `edges`.
    pub id: String,
    /// Source instance id.
    pub from: String,
    /// Destination instance id.
    pub to: String,
    /// Relationship label, if any.
    pub kind: Option<String>,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The full in-memory state of one universe's knowledge graph.
///
/// Transient UI state (panel tabs, current selection) is deliberately not
/// part of this type — it lives entirely in the UI layer and is excluded
/// from the round-trip equivalence the codec guarantees.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphStoreState {
    /// Node definitions, keyed by [`NodePrototype::id`].
    pub prototypes: BTreeMap<String, NodePrototype>,
    /// Spatial graphs, keyed by [`SpatialGraph::id`].
    pub graphs: BTreeMap<String, SpatialGraph>,
    /// Edges, keyed by [`Edge::id`].
    pub edges: BTreeMap<String, Edge>,
    /// Graph ids currently open in the UI, in tab order.
    pub open_graph_ids: Vec<String>,
    /// The graph currently focused, if any.
    pub active_graph_id: Option<String>,
}
