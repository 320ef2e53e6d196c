//! create, modify, destroy, save, and junction link/unlink.

use super::EntityGateway;
use crate::config::JunctionLink;
use crate::error::{GatewayError, GraphError};
use crate::identifiers::IdentifierStore;
use crate::model::Record;
use crate::sql::{Delete, Insert, Predicate, Row, Update};
use serde_json::Value;

/// Data handed to a write: a plain map (normalized through the model) or a record.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Map(Row),
    Record(Record),
}

impl From<Row> for Payload {
    fn from(row: Row) -> Self {
        Payload::Map(row)
    }
}

impl From<Record> for Payload {
    fn from(record: Record) -> Self {
        Payload::Record(record)
    }
}

/// Outcome of [`EntityGateway::save`].
#[derive(Clone, Debug, PartialEq)]
pub enum Saved {
    /// Identifiers of the inserted row.
    Inserted(IdentifierStore),
    /// Whether an UPDATE was issued.
    Updated(bool),
}

impl EntityGateway {
    /// Maps are merged into `base`; records are taken as they are.
    fn payload_record(&self, payload: Payload, base: Record) -> Record {
        match payload {
            Payload::Map(data) => self.hydrator.hydrate(&data, base),
            Payload::Record(record) => record,
        }
    }

    /// Extracted model fields of `record`; attributes and related pages are dropped.
    fn persistable(&self, record: &Record) -> Row {
        let model = &self.schema().model;
        let mut data = self.hydrator.extract(record);
        data.retain(|k, _| model.has_field(k));
        data
    }

    /// Insert a row and return the identifiers the backend reports for it. Null
    /// fields are left out so column defaults apply.
    pub async fn create(&self, payload: impl Into<Payload>) -> Result<IdentifierStore, GatewayError> {
        let schema = self.schema();
        let record = self.payload_record(payload.into(), self.record());
        let mut values = self.persistable(&record);
        values.retain(|_, v| !v.is_null());
        let insert = Insert {
            table: schema.table.clone(),
            values,
            returning: schema.identifiers.clone(),
            casts: schema.model.casts(),
        };
        let returned = self.executor.insert(&insert).await?;

        let mut ids = self.identifiers();
        for key in &schema.identifiers {
            if let Some(v) = returned.get(key).or_else(|| insert.values.get(key)) {
                ids.set(key, v.clone());
            }
        }
        tracing::debug!(entity = %schema.name, ids = ?ids.all(), "created");
        Ok(ids)
    }

    /// Update the row addressed by `ids`. Map payloads are merged over the stored
    /// row. With `diff`, only changed columns are written and an unchanged record
    /// issues no UPDATE. Returns whether an UPDATE was issued.
    pub async fn modify(
        &self,
        ids: &IdentifierStore,
        payload: impl Into<Payload>,
        diff: bool,
    ) -> Result<bool, GatewayError> {
        let schema = self.schema();
        let filter = self.identifier_filter(ids)?;
        let row = self.load_row(self.executor.as_ref(), filter.clone()).await?;
        let mut current = self.record();
        current.merge_from(&row);

        let next = self.payload_record(payload.into(), current.clone());
        let mut set = self.persistable(&next);
        set.retain(|k, _| !schema.identifiers.contains(k));
        if diff {
            let changed = current.diff(&next);
            set.retain(|k, _| changed.contains(k));
        }
        if set.is_empty() {
            tracing::debug!(entity = %schema.name, "nothing changed, skipping update");
            return Ok(false);
        }

        let update = Update {
            table: schema.table.clone(),
            set,
            filter,
            casts: schema.model.casts(),
        };
        let rows = self.executor.update(&update).await?;
        tracing::debug!(entity = %schema.name, rows, "updated");
        Ok(true)
    }

    /// Delete the row addressed by `ids`. A missing row is `NotFound`; backend
    /// failures (e.g. the row is still referenced) are `Backend`.
    pub async fn destroy(&self, ids: &IdentifierStore) -> Result<(), GatewayError> {
        let filter = self.identifier_filter(ids)?;
        self.destroy_where(filter).await
    }

    async fn destroy_where(&self, filter: Predicate) -> Result<(), GatewayError> {
        let schema = self.schema();
        self.load_row(self.executor.as_ref(), filter.clone()).await?;
        let delete = Delete {
            table: schema.table.clone(),
            filter,
            casts: schema.model.casts(),
        };
        let rows = self.executor.delete(&delete).await.map_err(|e| {
            tracing::warn!(entity = %schema.name, error = %e, "delete failed");
            e
        })?;
        tracing::debug!(entity = %schema.name, rows, "destroyed");
        Ok(())
    }

    /// Insert when `force_insert` (the default mode); otherwise update the row
    /// addressed by the identifier values carried in `payload`.
    pub async fn save(&self, payload: impl Into<Payload>, force_insert: bool) -> Result<Saved, GatewayError> {
        let payload = payload.into();
        if force_insert {
            return Ok(Saved::Inserted(self.create(payload).await?));
        }
        let record = self.payload_record(payload.clone(), self.record());
        let mut ids = self.identifiers();
        for key in &self.schema().identifiers {
            if let Some(v) = record.get(key) {
                ids.set(key, v.clone());
            }
        }
        self.save_with(&ids, payload, false).await
    }

    /// [`EntityGateway::save`] with explicit identifiers for the update path. A
    /// missing row, or identifiers without a value, yields `Updated(false)`.
    pub async fn save_with(
        &self,
        ids: &IdentifierStore,
        payload: impl Into<Payload>,
        force_insert: bool,
    ) -> Result<Saved, GatewayError> {
        if force_insert {
            return Ok(Saved::Inserted(self.create(payload).await?));
        }
        if !ids.is_complete() {
            tracing::debug!(entity = %self.name(), "save without identifier values matches no row");
            return Ok(Saved::Updated(false));
        }
        match self.modify(ids, payload, false).await {
            Ok(updated) => Ok(Saved::Updated(updated)),
            Err(e) if e.is_not_found() => Ok(Saved::Updated(false)),
            Err(e) => Err(e),
        }
    }

    fn junction_to(&self, other: &EntityGateway) -> Result<JunctionLink, GatewayError> {
        self.schema().junction_to(other.id).cloned().ok_or_else(|| {
            GraphError::InvalidLink(format!("{} has no junction to {}", self.name(), other.name())).into()
        })
    }

    /// Insert the junction row pairing `this_key` with `other`'s `other_key`.
    pub async fn link(
        &self,
        other: &EntityGateway,
        this_key: impl Into<Value>,
        other_key: impl Into<Value>,
    ) -> Result<IdentifierStore, GatewayError> {
        let link = self.junction_to(other)?;
        let mut values = Row::new();
        values.insert(link.this_key, this_key.into());
        values.insert(link.other_key, other_key.into());
        self.related(link.junction).create(values).await
    }

    /// Delete the junction row pairing `this_key` with `other_key`; `NotFound` if absent.
    pub async fn unlink(
        &self,
        other: &EntityGateway,
        this_key: impl Into<Value>,
        other_key: impl Into<Value>,
    ) -> Result<(), GatewayError> {
        let link = self.junction_to(other)?;
        let junction = self.related(link.junction);
        let model = &junction.schema().model;
        let pair = [
            (link.this_key.as_str(), model.coerce(&link.this_key, this_key.into())),
            (link.other_key.as_str(), model.coerce(&link.other_key, other_key.into())),
        ];
        junction
            .destroy_where(Predicate::all_eq(pair.iter().map(|(c, v)| (*c, v))))
            .await
    }
}
