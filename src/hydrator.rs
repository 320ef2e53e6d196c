//! Hydration: converting between a [`Record`] and a plain row map.

use crate::model::Record;
use crate::sql::Row;
use std::sync::Arc;

pub trait Hydrator: Send + Sync {
    /// Name the hydrator is configured under.
    fn name(&self) -> &'static str;

    /// Record -> map.
    fn extract(&self, record: &Record) -> Row;

    /// Merge `data` into `record` (known fields only, empty values never overwrite).
    fn hydrate(&self, data: &Row, mut record: Record) -> Record {
        record.merge_from(data);
        record
    }
}

/// Full snapshot: fields, synthetic attributes and related pages.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordHydrator;

impl Hydrator for RecordHydrator {
    fn name(&self) -> &'static str {
        "record"
    }

    fn extract(&self, record: &Record) -> Row {
        record.to_map()
    }
}

/// Schema fields only.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldHydrator;

impl Hydrator for FieldHydrator {
    fn name(&self) -> &'static str {
        "fields"
    }

    fn extract(&self, record: &Record) -> Row {
        record.columns()
    }
}

/// Resolve a hydrator by configured name.
pub fn by_name(name: &str) -> Option<Arc<dyn Hydrator>> {
    match name {
        "record" => Some(Arc::new(RecordHydrator)),
        "fields" => Some(Arc::new(FieldHydrator)),
        _ => None,
    }
}
