//! Label and label-property indexes.
//!
//! Index entries are hints: a gid enters an index when some transaction
//! gives it the label (and property), and is never physically removed.
//! Scans revalidate every hit against the record under the reader's view,
//! so stale entries are filtered out rather than cleaned up (garbage
//! collection of index entries belongs to the storage GC, which is out of
//! scope here).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops;
use std::sync::RwLock;

use quiver_core::{Gid, LabelId, PropertyId, PropertyValue};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

fn poisoned(which: &str) -> StorageError {
    StorageError::LockPoisoned(format!("{which} index"))
}

/// One end of a property range, `(value, inclusive?)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    /// The bounding value.
    pub value: PropertyValue,
    /// Whether the bound itself is included.
    pub inclusive: bool,
}

impl Bound {
    /// Creates an inclusive bound.
    #[must_use]
    pub fn inclusive(value: PropertyValue) -> Self {
        Self { value, inclusive: true }
    }

    /// Creates an exclusive bound.
    #[must_use]
    pub fn exclusive(value: PropertyValue) -> Self {
        Self { value, inclusive: false }
    }
}

/// A property value wrapped with a total order, usable as a B-tree key.
///
/// Values order by type rank first, then within the type; doubles use the
/// IEEE total order. This is the *index* order, not Cypher comparison
/// (which promotes Int to Double and propagates Null).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedValue(pub PropertyValue);

impl Eq for OrderedValue {}

fn type_rank(value: &PropertyValue) -> u8 {
    match value {
        PropertyValue::Null => 0,
        PropertyValue::Bool(_) => 1,
        PropertyValue::Int(_) => 2,
        PropertyValue::Double(_) => 3,
        PropertyValue::String(_) => 4,
        PropertyValue::List(_) => 5,
        PropertyValue::Map(_) => 6,
    }
}

fn total_cmp(a: &PropertyValue, b: &PropertyValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (PropertyValue::Null, PropertyValue::Null) => Ordering::Equal,
        (PropertyValue::Bool(x), PropertyValue::Bool(y)) => x.cmp(y),
        (PropertyValue::Int(x), PropertyValue::Int(y)) => x.cmp(y),
        (PropertyValue::Double(x), PropertyValue::Double(y)) => x.total_cmp(y),
        (PropertyValue::String(x), PropertyValue::String(y)) => x.cmp(y),
        (PropertyValue::List(x), PropertyValue::List(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let c = total_cmp(xi, yi);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        (PropertyValue::Map(x), PropertyValue::Map(y)) => {
            for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
                let c = xk.cmp(yk);
                if c != Ordering::Equal {
                    return c;
                }
                let c = total_cmp(xv, yv);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => unreachable!("ranks matched but variants differ"),
    }
}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        total_cmp(&self.0, &other.0)
    }
}

/// The always-maintained label index.
#[derive(Debug, Default)]
pub struct LabelIndex {
    entries: RwLock<BTreeMap<LabelId, BTreeSet<Gid>>>,
}

impl LabelIndex {
    /// Records that `gid` carries `label`.
    pub fn add(&self, label: LabelId, gid: Gid) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("label"))?;
        entries.entry(label).or_default().insert(gid);
        Ok(())
    }

    /// All gids hinted for `label`, in gid order.
    pub fn lookup(&self, label: LabelId) -> StorageResult<Vec<Gid>> {
        let entries = self.entries.read().map_err(|_| poisoned("label"))?;
        Ok(entries.get(&label).map(|set| set.iter().copied().collect()).unwrap_or_default())
    }
}

/// Built-on-demand `(label, property)` value indexes.
#[derive(Debug, Default)]
pub struct LabelPropertyIndex {
    entries: RwLock<HashMap<(LabelId, PropertyId), BTreeMap<OrderedValue, BTreeSet<Gid>>>>,
}

impl LabelPropertyIndex {
    /// Returns `true` when the `(label, property)` index exists.
    pub fn exists(&self, label: LabelId, property: PropertyId) -> StorageResult<bool> {
        let entries = self.entries.read().map_err(|_| poisoned("property"))?;
        Ok(entries.contains_key(&(label, property)))
    }

    /// Creates the `(label, property)` index if absent.
    ///
    /// Returns `false` when the index already existed.
    pub fn create(&self, label: LabelId, property: PropertyId) -> StorageResult<bool> {
        let mut entries = self.entries.write().map_err(|_| poisoned("property"))?;
        match entries.entry((label, property)) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(BTreeMap::new());
                Ok(true)
            }
        }
    }

    /// Records `(value, gid)` under every built index this write touches.
    pub fn add(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
        gid: Gid,
    ) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("property"))?;
        if let Some(index) = entries.get_mut(&(label, property)) {
            index.entry(OrderedValue(value.clone())).or_default().insert(gid);
        }
        Ok(())
    }

    /// Gids hinted for an exact value, in gid order.
    ///
    /// Returns `None` when the index has not been built.
    pub fn lookup_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> StorageResult<Option<Vec<Gid>>> {
        let entries = self.entries.read().map_err(|_| poisoned("property"))?;
        let Some(index) = entries.get(&(label, property)) else {
            return Ok(None);
        };
        Ok(Some(
            index
                .get(&OrderedValue(value.clone()))
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
        ))
    }

    /// Gids hinted for a value range, ordered by value then gid.
    ///
    /// Returns `None` when the index has not been built. At least one bound
    /// must be present; the caller enforces that.
    pub fn lookup_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
    ) -> StorageResult<Option<Vec<Gid>>> {
        let entries = self.entries.read().map_err(|_| poisoned("property"))?;
        let Some(index) = entries.get(&(label, property)) else {
            return Ok(None);
        };

        let lower_bound = match lower {
            None => ops::Bound::Unbounded,
            Some(b) if b.inclusive => ops::Bound::Included(OrderedValue(b.value.clone())),
            Some(b) => ops::Bound::Excluded(OrderedValue(b.value.clone())),
        };
        let upper_bound = match upper {
            None => ops::Bound::Unbounded,
            Some(b) if b.inclusive => ops::Bound::Included(OrderedValue(b.value.clone())),
            Some(b) => ops::Bound::Excluded(OrderedValue(b.value.clone())),
        };

        let mut result = Vec::new();
        for (_, gids) in index.range((lower_bound, upper_bound)) {
            result.extend(gids.iter().copied());
        }
        Ok(Some(result))
    }
}
