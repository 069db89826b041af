// Confession storage backends.
// - `sqlite_store.rs` is the durable default.
// - `in_memory.rs` serves ":memory:" runs.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryConfessionStore;
pub use sqlite_store::SqliteConfessionStore;
