//! SQLite backend for the AgentOS memory store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Job-claim exclusivity uses a
//! conditional `UPDATE … WHERE status = 'queued'` inside an IMMEDIATE
//! transaction, the single-writer equivalent of `FOR UPDATE SKIP LOCKED`.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
