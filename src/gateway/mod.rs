//! Entity gateways: per-entity data access over the shared, immutable entity graph.
//!
//! A gateway holds no per-record state. Identifier values travel in an
//! [`IdentifierStore`] passed to each call, so one gateway can serve many
//! concurrent operations.

mod read;
mod write;

pub use read::{FetchOptions, Fetched};
pub use write::{Payload, Saved};

use crate::config::{EntityGraph, EntityId, EntitySchema};
use crate::error::GatewayError;
use crate::executor::SqlExecutor;
use crate::hydrator::Hydrator;
use crate::identifiers::IdentifierStore;
use crate::model::Record;
use crate::sql::{ColumnRef, Predicate};
use std::sync::Arc;

/// Registry handing out gateways for every entity of a graph.
#[derive(Clone)]
pub struct Gateways {
    graph: Arc<EntityGraph>,
    executor: Arc<dyn SqlExecutor>,
    hydrator: Arc<dyn Hydrator>,
}

impl Gateways {
    pub fn new(graph: impl Into<Arc<EntityGraph>>, executor: Arc<dyn SqlExecutor>, hydrator: Arc<dyn Hydrator>) -> Self {
        Gateways {
            graph: graph.into(),
            executor,
            hydrator,
        }
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    /// Gateway for the entity registered under `name`.
    pub fn get(&self, name: &str) -> Result<EntityGateway, GatewayError> {
        let id = self
            .graph
            .id_of(name)
            .ok_or_else(|| GatewayError::UnknownEntity(name.to_string()))?;
        Ok(self.bind(id))
    }

    pub fn gateway(&self, id: EntityId) -> Result<EntityGateway, GatewayError> {
        match self.graph.get(id) {
            Some(_) => Ok(self.bind(id)),
            None => Err(GatewayError::UnknownEntity(format!("#{}", id.0))),
        }
    }

    fn bind(&self, id: EntityId) -> EntityGateway {
        EntityGateway {
            graph: Arc::clone(&self.graph),
            executor: Arc::clone(&self.executor),
            hydrator: Arc::clone(&self.hydrator),
            id,
        }
    }
}

/// Data access for one entity. Cheap to clone.
#[derive(Clone)]
pub struct EntityGateway {
    graph: Arc<EntityGraph>,
    executor: Arc<dyn SqlExecutor>,
    hydrator: Arc<dyn Hydrator>,
    id: EntityId,
}

impl std::fmt::Debug for EntityGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityGateway")
            .field("entity", &self.schema().name)
            .field("hydrator", &self.hydrator.name())
            .finish()
    }
}

impl EntityGateway {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn schema(&self) -> &EntitySchema {
        self.graph.entity(self.id)
    }

    pub fn name(&self) -> &str {
        &self.schema().name
    }

    pub fn table(&self) -> &str {
        &self.schema().table
    }

    /// A store with this entity's identifiers declared and unset.
    pub fn identifiers(&self) -> IdentifierStore {
        let schema = self.schema();
        let mut ids = IdentifierStore::new(schema.name.clone());
        for key in &schema.identifiers {
            ids.declare(key.clone());
        }
        ids
    }

    /// Empty record of this entity's model.
    pub fn record(&self) -> Record {
        Record::new(Arc::clone(&self.schema().model))
    }

    pub fn is_parent(&self, other: &EntityGateway) -> bool {
        self.schema().is_parent(other.id)
    }

    pub fn is_child(&self, other: &EntityGateway) -> bool {
        self.schema().is_child(other.id)
    }

    pub fn is_junction(&self, other: &EntityGateway) -> bool {
        self.schema().is_junction(other.id)
    }

    fn related(&self, id: EntityId) -> EntityGateway {
        EntityGateway {
            graph: Arc::clone(&self.graph),
            executor: Arc::clone(&self.executor),
            hydrator: Arc::clone(&self.hydrator),
            id,
        }
    }

    /// Equality on every identifier of `ids`. The entity's own identifiers must be
    /// declared and all values set.
    fn identifier_filter(&self, ids: &IdentifierStore) -> Result<Predicate, GatewayError> {
        let schema = self.schema();
        for key in &schema.identifiers {
            ids.get(key)?;
        }
        let mut parts = Vec::with_capacity(ids.len());
        for (key, value) in ids.all() {
            if !schema.model.has_field(key) {
                return Err(GatewayError::InvalidData(format!(
                    "{} is not a field of {}",
                    key, schema.name
                )));
            }
            if value.is_null() {
                return Err(GatewayError::InvalidData(format!(
                    "identifier {} of {} has no value",
                    key, schema.name
                )));
            }
            parts.push(Predicate::Eq(
                ColumnRef::new(key.clone()),
                schema.model.coerce(key, value.clone()),
            ));
        }
        Ok(Predicate::And(parts))
    }
}
