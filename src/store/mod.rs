//! Durable persistence — task repository and job store.

mod libsql_backend;
mod memory;
mod migrations;
mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::{InMemoryJobStore, InMemoryTaskRepository};
pub use traits::{JobRecord, JobStore, TaskRepository};
