//! Record Model: an attribute bag whose attribute names come from an explicit field schema.

use crate::pagination::Page;
use crate::sql::{Casts, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Storage kind of a model field. Drives best-effort coercion of incoming values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    Float,
    #[default]
    Text,
    Bool,
    Timestamp,
    Uuid,
    Json,
}

impl FieldKind {
    /// PostgreSQL cast applied to parameters bound against a column of this kind.
    pub fn pg_cast(self) -> Option<&'static str> {
        match self {
            FieldKind::Timestamp => Some("timestamptz"),
            FieldKind::Uuid => Some("uuid"),
            FieldKind::Json => Some("jsonb"),
            FieldKind::Int | FieldKind::Float | FieldKind::Text | FieldKind::Bool => None,
        }
    }

    /// Convert form-style strings into the field's kind. Values that do not parse are kept as given.
    pub fn coerce(self, value: Value) -> Value {
        let Value::String(s) = &value else {
            return match (self, &value) {
                (FieldKind::Bool, Value::Number(n)) => match n.as_i64() {
                    Some(0) => Value::Bool(false),
                    Some(1) => Value::Bool(true),
                    _ => value,
                },
                _ => value,
            };
        };
        let trimmed = s.trim();
        match self {
            FieldKind::Int => trimmed
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .unwrap_or(value),
            FieldKind::Float => trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(value),
            FieldKind::Bool => match trimmed.to_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => value,
            },
            FieldKind::Timestamp => chrono::DateTime::parse_from_rfc3339(trimmed)
                .map(|d| Value::String(d.with_timezone(&chrono::Utc).to_rfc3339()))
                .unwrap_or(value),
            FieldKind::Uuid => uuid::Uuid::parse_str(trimmed)
                .map(|u| Value::String(u.to_string()))
                .unwrap_or(value),
            FieldKind::Text | FieldKind::Json => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered field list of one record variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        ModelSchema {
            name: name.into(),
            fields,
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Parameter casts for every field whose kind needs one.
    pub fn casts(&self) -> Casts {
        self.fields
            .iter()
            .filter_map(|f| f.kind.pg_cast().map(|c| (f.name.clone(), c.to_string())))
            .collect()
    }

    /// Coerce `value` to the kind of field `name`; unknown names pass through.
    pub fn coerce(&self, name: &str, value: Value) -> Value {
        match self.position(name) {
            Some(i) => self.fields[i].kind.coerce(value),
            None => value,
        }
    }
}

/// One row as a record: schema fields, plus synthetic attributes and nested
/// related pages attached while resolving the entity graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    schema: Arc<ModelSchema>,
    values: Vec<Value>,
    attributes: Vec<(String, Value)>,
    related: Vec<(String, Page)>,
}

impl Record {
    /// Fresh record with every field null.
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let values = vec![Value::Null; schema.fields.len()];
        Record {
            schema,
            values,
            attributes: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.position(name).map(|i| &self.values[i])
    }

    /// Set a known field, coercing to its kind. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.schema.position(name) {
            Some(i) => {
                self.values[i] = self.schema.fields[i].kind.coerce(value.into());
                true
            }
            None => false,
        }
    }

    /// Merge external data. Only known fields are written, and empty strings
    /// count as null: a null never overwrites what the record already holds.
    pub fn merge_from(&mut self, data: &Row) {
        for (key, value) in data {
            let Some(i) = self.schema.position(key) else { continue };
            if is_null_like(value) {
                continue;
            }
            self.values[i] = self.schema.fields[i].kind.coerce(value.clone());
        }
    }

    /// Snapshot: fields in schema order, then synthetic attributes, then `related` when present.
    pub fn to_map(&self) -> Row {
        let mut map = self.columns();
        for (k, v) in &self.attributes {
            map.insert(k.clone(), v.clone());
        }
        if !self.related.is_empty() {
            let related: Row = self
                .related
                .iter()
                .map(|(table, page)| (table.clone(), page.to_value()))
                .collect();
            map.insert("related".into(), Value::Object(related));
        }
        map
    }

    /// Schema fields only, including nulls.
    pub fn columns(&self) -> Row {
        self.schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(f, v)| (f.name.clone(), v.clone()))
            .collect()
    }

    /// Attach a synthetic attribute (e.g. `muscle_name`), replacing one of the same name.
    pub fn attach(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn attributes(&self) -> &[(String, Value)] {
        &self.attributes
    }

    pub fn attach_related(&mut self, table: impl Into<String>, page: Page) {
        let table = table.into();
        match self.related.iter_mut().find(|(k, _)| *k == table) {
            Some((_, slot)) => *slot = page,
            None => self.related.push((table, page)),
        }
    }

    pub fn related(&self, table: &str) -> Option<&Page> {
        self.related.iter().find(|(k, _)| k == table).map(|(_, p)| p)
    }

    pub fn related_tables(&self) -> impl Iterator<Item = &str> {
        self.related.iter().map(|(k, _)| k.as_str())
    }

    /// Names of schema fields whose value differs from `other`'s (matched by name).
    pub fn diff(&self, other: &Record) -> Vec<String> {
        self.schema
            .fields
            .iter()
            .zip(&self.values)
            .filter(|(f, v)| other.get(&f.name) != Some(*v))
            .map(|(f, _)| f.name.clone())
            .collect()
    }
}

fn is_null_like(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
