//! Identifier Store: the named columns (and current values) addressing one row of an entity.

use crate::error::GatewayError;
use serde_json::Value;

/// Declared identifier columns and their values, in declaration order.
///
/// A store is a per-call value: obtain one from
/// [`crate::gateway::EntityGateway::identifiers`], set the values and pass it to
/// `find`/`modify`/`destroy`. Gateways never hold a "current record".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentifierStore {
    entity: String,
    entries: Vec<(String, Value)>,
}

impl IdentifierStore {
    pub fn new(entity: impl Into<String>) -> Self {
        IdentifierStore {
            entity: entity.into(),
            entries: Vec::new(),
        }
    }

    /// Entity name used in error messages.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Register `key` with no value. Declaring twice is a no-op.
    pub fn declare(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.is_declared(&key) {
            self.entries.push((key, Value::Null));
        }
    }

    pub fn is_declared(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Set the value of a declared key. Undeclared keys are ignored; returns whether the value was stored.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => {
                *slot = value.into();
                true
            }
            None => {
                tracing::debug!(entity = %self.entity, key, "ignoring value for undeclared identifier");
                false
            }
        }
    }

    /// Chaining form of [`IdentifierStore::set`].
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Value of a declared key (possibly still null).
    pub fn get(&self, key: &str) -> Result<&Value, GatewayError> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| GatewayError::NotDeclared {
                entity: self.entity.clone(),
                key: key.to_string(),
            })
    }

    /// Every declared key with its value, in declaration order.
    pub fn all(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when at least one key is declared and none is null.
    pub fn is_complete(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, v)| !v.is_null())
    }
}
