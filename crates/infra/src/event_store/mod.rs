//! Append-only event store boundary.
//!
//! Tenant-scoped streams keyed by `(tenant, aggregate type, aggregate id)`, an
//! atomic multi-stream append, and two backends: in-memory (tests/dev) and
//! Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, StreamKey, UncommittedEvent};
