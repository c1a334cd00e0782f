//! Storage abstraction used by the reconciler and the router.

use async_trait::async_trait;

use crate::Score;
use crate::db::{PlayerId, PlayerRecord, StoreError};

/// Durable per-player record storage.
///
/// Implementations must never let two writes for the same id interleave: a
/// concurrent [`create`](PlayerStore::create) may not produce a duplicate row
/// and a concurrent score write may not be lost. Every call is bounded in time;
/// a call that runs too long fails with a retryable [`StoreError`].
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Returns `true` iff a record with this id is present.
    async fn exists(&self, id: PlayerId) -> Result<bool, StoreError>;

    /// Inserts a record with a high score of zero unless one already exists.
    ///
    /// Returns `true` if a new record was inserted.
    async fn create(&self, id: PlayerId, display_name: Option<String>)
    -> Result<bool, StoreError>;

    /// Overwrites the high score of an existing record.
    ///
    /// Unknown ids are left alone; the return value is `false` in that case.
    async fn set_high_score(&self, id: PlayerId, value: Score) -> Result<bool, StoreError>;

    /// Stores `value` only if it beats the current high score.
    ///
    /// Returns the high score held after the write, or `None` for unknown ids.
    async fn raise_high_score(
        &self,
        id: PlayerId,
        value: Score,
    ) -> Result<Option<Score>, StoreError>;

    /// Refreshes the display name of an existing record.
    async fn set_display_name(
        &self,
        id: PlayerId,
        display_name: Option<String>,
    ) -> Result<bool, StoreError>;

    /// Looks up a record by id.
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<i64, StoreError>;
}
