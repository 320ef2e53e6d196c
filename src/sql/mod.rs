//! Safe SQL: structured statements, a PostgreSQL renderer, and bind values.

mod builder;
pub mod params;
mod query;
pub use builder::*;
pub use params::*;
pub use query::*;
