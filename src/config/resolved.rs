//! Resolved entity graph: links validated and flattened for runtime use.

use crate::model::ModelSchema;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static NEXT_BRAND: AtomicU32 = AtomicU32::new(1);

/// Identity of a registered entity. Two entities sharing a table are still distinct.
///
/// Ids carry the brand of the builder that issued them, so an id from another
/// builder never resolves here even when its index is in range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) usize, pub(crate) u32);

pub(crate) fn next_brand() -> u32 {
    NEXT_BRAND.fetch_add(1, Ordering::Relaxed)
}

/// This entity references `parent` through `foreign_key` (matching `parent.references`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentLink {
    pub parent: EntityId,
    pub foreign_key: String,
    pub references: String,
    /// Parent column copied onto found rows.
    pub display: String,
    /// Name of the synthetic attribute holding the display value: `<parent_table>_name`.
    pub alias: String,
}

/// `child` references this entity through `child.foreign_key = this.references`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildLink {
    pub child: EntityId,
    pub foreign_key: String,
    pub references: String,
    /// Ordering column for nested fetches; unsorted when absent.
    pub order_by: Option<String>,
}

/// Many-to-many with `other` through `junction`, whose rows carry `this_key` and `other_key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JunctionLink {
    pub junction: EntityId,
    pub other: EntityId,
    pub this_key: String,
    pub other_key: String,
    pub references: String,
}

#[derive(Clone, Debug)]
pub struct EntitySchema {
    pub id: EntityId,
    pub name: String,
    pub table: String,
    pub primary_key: Option<String>,
    pub identifiers: Vec<String>,
    pub model: Arc<ModelSchema>,
    pub parents: Vec<ParentLink>,
    pub children: Vec<ChildLink>,
    pub junctions: Vec<JunctionLink>,
}

impl EntitySchema {
    pub fn is_parent(&self, id: EntityId) -> bool {
        self.parents.iter().any(|l| l.parent == id)
    }

    pub fn is_child(&self, id: EntityId) -> bool {
        self.children.iter().any(|l| l.child == id)
    }

    pub fn is_junction(&self, id: EntityId) -> bool {
        self.junctions.iter().any(|l| l.junction == id)
    }

    pub fn parent_link(&self, parent: EntityId) -> Option<&ParentLink> {
        self.parents.iter().find(|l| l.parent == parent)
    }

    /// The junction link towards `other`.
    pub fn junction_to(&self, other: EntityId) -> Option<&JunctionLink> {
        self.junctions.iter().find(|l| l.other == other)
    }
}

/// Immutable graph of entities, shared by every gateway.
#[derive(Clone, Debug, Default)]
pub struct EntityGraph {
    pub(crate) entities: Vec<EntitySchema>,
    pub(crate) by_name: HashMap<String, EntityId>,
}

impl EntityGraph {
    pub fn get(&self, id: EntityId) -> Option<&EntitySchema> {
        self.entities.get(id.0).filter(|e| e.id == id)
    }

    /// Schema of an id handed out for this graph.
    ///
    /// # Panics
    /// If `id` was not issued for this graph.
    pub fn entity(&self, id: EntityId) -> &EntitySchema {
        match self.get(id) {
            Some(schema) => schema,
            None => panic!("entity id #{} was not issued for this graph", id.0),
        }
    }

    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&EntitySchema> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
