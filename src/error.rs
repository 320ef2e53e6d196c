//! Typed errors for wiring, backend execution and gateway operations.

use thiserror::Error;

/// Errors raised while wiring the entity graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("unknown field: entity {entity} has no field '{field}'")]
    UnknownField { entity: String, field: String },
    #[error("parent cycle: {0}")]
    Cycle(String),
    #[error("invalid link: {0}")]
    InvalidLink(String),
    #[error("graph load: {0}")]
    Load(String),
}

/// Failures reported by a [`crate::executor::SqlExecutor`].
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{key} hasn't been declared as an identifier for entity {entity}")]
    NotDeclared { entity: String, key: String },
    #[error("record for {entity} not found")]
    NotFound { entity: String },
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GatewayError {
    /// True for the recoverable "no row matches" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::Backend(BackendError::Db(e))
    }
}
