pub mod connection;
pub mod operations;
pub mod postgres;
pub mod store;

pub use connection::create_ssl_connector;
pub use operations::{Notifier, Persister};
pub use postgres::PostgresStore;
pub use store::{MemoryStore, RecordQuery, RecordStore, StoreResult};
