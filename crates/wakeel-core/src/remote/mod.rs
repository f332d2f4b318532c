//! The remote adapter boundary: everything the engine knows about the
//! hosted backend.
//!
//! Adapters are explicitly constructed and injected; there is no ambient
//! global client. Rotating credentials means constructing a new adapter.

mod http;
mod memory;

use crate::error::Result;
use crate::mapper::Row;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

/// Interface over the backend's relational tables and object storage.
///
/// Upserts must be idempotent on the conflict key: the pipelines rely on
/// re-running a pass being safe.
#[allow(async_fn_in_trait)]
pub trait RemoteAdapter {
    /// Fetch rows from a table, restricted to the given columns
    /// (all columns when empty).
    async fn select(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>>;

    /// Idempotently upsert rows, keyed by `conflict_key`. Returns the
    /// rows as stored, in the order they were sent.
    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<Vec<Row>>;

    /// Delete rows whose `key` column matches one of `ids`.
    async fn delete(&self, table: &str, key: &str, ids: &[String]) -> Result<()>;

    /// Confirm a table exposes the expected column. Errors classify as
    /// schema, network or unknown failures.
    async fn probe(&self, table: &str, column: &str) -> Result<()>;

    /// Store a blob at `bucket/path`, replacing any existing object.
    async fn upload_blob(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch a blob's bytes.
    async fn download_blob(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;

    /// Remove a blob. Deleting an absent object is not an error.
    async fn delete_blob(&self, bucket: &str, path: &str) -> Result<()>;
}
