//! Entity gateways: a relational data-access layer that treats tables as a graph of
//! related entities and resolves parents and children on every find.

pub mod case;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod hydrator;
pub mod identifiers;
pub mod model;
pub mod pagination;
pub mod settings;
pub mod sql;

pub use config::{load_from_path, resolve, EntityDef, EntityGraph, EntityId, GraphBuilder, GraphConfig};
pub use error::{BackendError, GatewayError, GraphError};
pub use executor::{ensure_database_exists, MemoryExecutor, PgExecutor, SqlExecutor};
pub use gateway::{EntityGateway, FetchOptions, Fetched, Gateways, Payload, Saved};
pub use hydrator::{FieldHydrator, Hydrator, RecordHydrator};
pub use identifiers::IdentifierStore;
pub use model::{Field, FieldKind, ModelSchema, Record};
pub use pagination::{Page, PageRequest};
pub use settings::Settings;
pub use sql::{Predicate, Row, SortOrder};
