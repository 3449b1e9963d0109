//! Cluster-wide interning of labels, property keys and edge types.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::types::ids::{EdgeTypeId, LabelId, PropertyId};

/// One name ↔ id table.
#[derive(Debug, Default)]
struct Interner {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }
}

fn poisoned(what: &str) -> CoreError {
    CoreError::LockPoisoned(format!("{what} registry"))
}

/// The name service mapping labels, property keys and edge types to ids.
///
/// One registry is shared by every worker of a cluster (interning must be
/// deterministic cluster-wide so that dispatched plans and wire records
/// agree on ids). All methods take `&self`; the registry is safe to share
/// behind an `Arc`.
#[derive(Debug, Default)]
pub struct NameRegistry {
    labels: RwLock<Interner>,
    properties: RwLock<Interner>,
    edge_types: RwLock<Interner>,
}

impl NameRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a label name.
    pub fn label(&self, name: &str) -> CoreResult<LabelId> {
        let mut labels = self.labels.write().map_err(|_| poisoned("label"))?;
        Ok(LabelId::new(labels.intern(name)))
    }

    /// Interns a property key.
    pub fn property(&self, name: &str) -> CoreResult<PropertyId> {
        let mut properties = self.properties.write().map_err(|_| poisoned("property"))?;
        Ok(PropertyId::new(properties.intern(name)))
    }

    /// Interns an edge type name.
    pub fn edge_type(&self, name: &str) -> CoreResult<EdgeTypeId> {
        let mut edge_types = self.edge_types.write().map_err(|_| poisoned("edge type"))?;
        Ok(EdgeTypeId::new(edge_types.intern(name)))
    }

    /// Resolves a label id back to its name.
    pub fn label_name(&self, id: LabelId) -> CoreResult<String> {
        self.labels
            .read()
            .map_err(|_| poisoned("label"))?
            .name(id.raw())
            .map(str::to_owned)
            .ok_or_else(|| CoreError::Validation(format!("unknown label id {id}")))
    }

    /// Resolves a property id back to its name.
    pub fn property_name(&self, id: PropertyId) -> CoreResult<String> {
        self.properties
            .read()
            .map_err(|_| poisoned("property"))?
            .name(id.raw())
            .map(str::to_owned)
            .ok_or_else(|| CoreError::Validation(format!("unknown property id {id}")))
    }

    /// Resolves an edge type id back to its name.
    pub fn edge_type_name(&self, id: EdgeTypeId) -> CoreResult<String> {
        self.edge_types
            .read()
            .map_err(|_| poisoned("edge type"))?
            .name(id.raw())
            .map(str::to_owned)
            .ok_or_else(|| CoreError::Validation(format!("unknown edge type id {id}")))
    }
}
