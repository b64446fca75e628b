//! Database layer: SQLite via sqlx, direct SQL without ORM overhead

pub mod init;
pub mod queue;

pub use init::initialize_database;
pub use queue::{NewQueueEntry, QueueEntry, QueueStatus};
