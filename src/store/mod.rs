//! Persistence layer: libSQL-backed storage for channels, posts, and settings.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Channel, ChannelRole, Database};
