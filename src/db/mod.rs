pub mod events;
pub mod postgres;

pub use events::{DataAccessError, EventStore, PgEventStore};
pub use postgres::{create_pool, run_migrations};
