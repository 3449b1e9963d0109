//! Vertex and edge record payloads.

use std::collections::BTreeMap;

use quiver_core::{EdgeTypeId, GlobalAddress, LabelId, PropertyId, PropertyValue};
use serde::{Deserialize, Serialize};

/// One entry of a vertex's incidence list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEntry {
    /// The vertex on the other side of the edge.
    pub peer: GlobalAddress,
    /// The edge itself.
    pub edge: GlobalAddress,
    /// The edge's type, kept inline so type-filtered expansion does not
    /// have to resolve the edge record.
    pub edge_type: EdgeTypeId,
}

/// The payload of a vertex version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    /// Label multiset.
    pub labels: Vec<LabelId>,
    /// Property map.
    pub properties: BTreeMap<PropertyId, PropertyValue>,
    /// Incoming edges.
    pub in_edges: Vec<EdgeEntry>,
    /// Outgoing edges.
    pub out_edges: Vec<EdgeEntry>,
}

impl VertexRecord {
    /// Creates an empty vertex record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the vertex carries the label.
    #[inline]
    #[must_use]
    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }

    /// Returns the property value, or `Null` when absent.
    #[must_use]
    pub fn property(&self, key: PropertyId) -> PropertyValue {
        self.properties.get(&key).cloned().unwrap_or(PropertyValue::Null)
    }

    /// Incidence entries in the given direction, optionally restricted to
    /// a set of edge types.
    #[must_use]
    pub fn entries(&self, incoming: bool, edge_types: Option<&[EdgeTypeId]>) -> Vec<EdgeEntry> {
        let list = if incoming { &self.in_edges } else { &self.out_edges };
        match edge_types {
            None => list.clone(),
            Some(types) if types.is_empty() => list.clone(),
            Some(types) => {
                list.iter().filter(|e| types.contains(&e.edge_type)).copied().collect()
            }
        }
    }
}

/// The payload of an edge version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// The source vertex.
    pub from: GlobalAddress,
    /// The destination vertex.
    pub to: GlobalAddress,
    /// The edge type.
    pub edge_type: EdgeTypeId,
    /// Property map.
    pub properties: BTreeMap<PropertyId, PropertyValue>,
}

impl EdgeRecord {
    /// Creates an edge record with no properties.
    #[must_use]
    pub fn new(from: GlobalAddress, to: GlobalAddress, edge_type: EdgeTypeId) -> Self {
        Self { from, to, edge_type, properties: BTreeMap::new() }
    }

    /// Returns the property value, or `Null` when absent.
    #[must_use]
    pub fn property(&self, key: PropertyId) -> PropertyValue {
        self.properties.get(&key).cloned().unwrap_or(PropertyValue::Null)
    }
}
