//! Raw graph config types matching the JSON graph file.

use crate::model::{Field, FieldKind};
use serde::{Deserialize, Serialize};

fn default_primary_key() -> Option<String> {
    Some("id".into())
}

/// A model field: either a bare column name (text) or `{ "name": ..., "kind": ... }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldConfig {
    Name(String),
    Typed(Field),
}

impl FieldConfig {
    pub fn to_field(&self) -> Field {
        match self {
            FieldConfig::Name(name) => Field::new(name.clone(), FieldKind::Text),
            FieldConfig::Typed(f) => f.clone(),
        }
    }
}

/// This entity holds a foreign key to `entity`; `display` is the parent column surfaced as `<parent_table>_name`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParentConfig {
    pub entity: String,
    pub display: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
}

/// `entity` holds a foreign key to this entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChildConfig {
    pub entity: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
}

/// Many-to-many with `other` through the `through` junction entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JunctionConfig {
    pub through: String,
    pub other: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    /// `null` for junction tables without a surrogate key.
    #[serde(default = "default_primary_key")]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub parents: Vec<ParentConfig>,
    #[serde(default)]
    pub children: Vec<ChildConfig>,
    #[serde(default)]
    pub junctions: Vec<JunctionConfig>,
}

/// Whole graph file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    pub entities: Vec<EntityConfig>,
}
