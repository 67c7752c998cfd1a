pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod tx;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{AuditRecorder, RepositoryError};
pub use tx::{write_scope, RetrySchedule, StoreError};
