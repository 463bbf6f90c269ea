//! Unit-of-work storage for the marketplace booking core.
//!
//! Every workflow runs inside one [`Transaction`] obtained from a [`Store`].
//! Writes are buffered until [`Transaction::commit`]; dropping a transaction
//! without committing discards them. [`Transaction::get_for_update`] takes a
//! row lock that is held until the transaction ends, which is how concurrent
//! workflows touching the same rows are serialized.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use record::{Record, Version};
pub use store::{Entity, Store, Transaction, TransactionExt};
