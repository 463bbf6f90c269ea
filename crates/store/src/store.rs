use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Record, Result, Version};

/// Source of units of work.
///
/// Implementations must be thread-safe (Send + Sync); each call to
/// [`Store::begin`] returns an independent transaction.
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction handle type.
    type Tx: Transaction;

    /// Starts a new unit of work.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// An atomic scope of reads and writes.
///
/// Writes become visible to other transactions only on [`commit`](Transaction::commit).
/// A transaction dropped without committing is rolled back.
#[async_trait]
pub trait Transaction: Send {
    /// Reads a row. Sees this transaction's own uncommitted writes.
    async fn get(&mut self, kind: &str, id: Uuid) -> Result<Option<Record>>;

    /// Reads a row and locks it until the transaction ends.
    ///
    /// A second transaction calling this for the same row waits until the
    /// first commits or rolls back, then observes the committed state.
    async fn get_for_update(&mut self, kind: &str, id: Uuid) -> Result<Option<Record>>;

    /// Returns all rows of `kind` whose top-level JSON `field` equals `value`.
    async fn find_by(
        &mut self,
        kind: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Vec<Record>>;

    /// Writes a row.
    ///
    /// `record.version` is the version the caller read: `Version::initial()`
    /// inserts a new row, anything else updates an existing one. Fails with
    /// `ConcurrencyConflict` if the row moved on. Returns the new version.
    async fn put(&mut self, record: Record) -> Result<Version>;

    /// Commits every buffered write atomically.
    async fn commit(self) -> Result<()>;

    /// Discards every buffered write and releases held locks.
    async fn rollback(self) -> Result<()>;
}

/// A value persisted as a single row.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// The collection this entity is stored in.
    const KIND: &'static str;

    /// Primary key of the row.
    fn entity_id(&self) -> Uuid;

    /// The version this entity was loaded at.
    fn version(&self) -> Version;

    /// Records the version after loading or saving.
    fn set_version(&mut self, version: Version);
}

fn decode<E: Entity>(record: Record) -> Result<E> {
    let mut entity: E = serde_json::from_value(record.data)?;
    entity.set_version(record.version);
    Ok(entity)
}

/// Typed helpers over any [`Transaction`].
#[async_trait]
pub trait TransactionExt: Transaction {
    /// Loads an entity by id.
    async fn load<E: Entity>(&mut self, id: Uuid) -> Result<Option<E>> {
        self.get(E::KIND, id).await?.map(decode).transpose()
    }

    /// Loads an entity by id and locks its row.
    async fn load_for_update<E: Entity>(&mut self, id: Uuid) -> Result<Option<E>> {
        self.get_for_update(E::KIND, id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Loads every entity whose `field` equals `value`.
    async fn find<E: Entity>(&mut self, field: &str, value: serde_json::Value) -> Result<Vec<E>> {
        self.find_by(E::KIND, field, value)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Inserts or updates an entity, advancing its version on success.
    async fn save<E: Entity>(&mut self, entity: &mut E) -> Result<()> {
        let record = Record::new(E::KIND, entity.entity_id(), entity.version(), &*entity)?;
        let version = self.put(record).await?;
        entity.set_version(version);
        Ok(())
    }
}

impl<T: Transaction> TransactionExt for T {}
