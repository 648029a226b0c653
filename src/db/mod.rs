//! Database layer - connection pooling and table schema

pub mod pool;
pub mod schema;

pub use pool::{PgTarget, Pool};
