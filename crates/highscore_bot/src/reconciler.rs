//! Applying reported scores to player records.

use std::sync::Arc;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay};
use tracing::{debug, info, instrument, warn};

use crate::db::{PlayerId, PlayerStore, StoreError};
use crate::score::{RawScore, Score};

/// How a reported score is combined with the stored one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, StrumDisplay,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScorePolicy {
    /// The latest report always replaces the stored value, even if lower.
    #[default]
    Overwrite,
    /// The stored value only ever grows.
    KeepHighest,
}

/// Reconciliation failure.
#[derive(Debug, Clone, Display, Error)]
pub enum ReconcileError {
    /// The payload did not decode to a non-negative integer.
    #[display("Malformed score payload: {raw}")]
    MalformedScore {
        /// Debug rendering of the rejected payload.
        raw: String,
    },
    /// No record exists for the reporting user.
    #[display("No player record for id {id}")]
    UnknownPlayer {
        /// The reporting user.
        id: PlayerId,
    },
    /// The store failed.
    #[display("{_0}")]
    Store(StoreError),
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl ReconcileError {
    /// Whether the router should try the same report again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }
}

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct Reconciled {
    /// The value decoded from the report.
    submitted: Score,
    /// The high score held by the record afterwards.
    high_score: Score,
}

/// Validates score reports and writes them through a [`PlayerStore`].
#[derive(Clone)]
pub struct ScoreReconciler {
    store: Arc<dyn PlayerStore>,
    policy: ScorePolicy,
}

impl std::fmt::Debug for ScoreReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreReconciler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ScoreReconciler {
    /// Creates a reconciler applying `policy` to `store`.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn PlayerStore>, policy: ScorePolicy) -> Self {
        info!(policy = %policy, "Creating ScoreReconciler");
        Self { store, policy }
    }

    /// The active policy.
    pub fn policy(&self) -> ScorePolicy {
        self.policy
    }

    /// Decodes `raw` and applies it to the record of `user_id`.
    ///
    /// Malformed payloads are rejected before the store is touched. A report
    /// for an id without a record fails with [`ReconcileError::UnknownPlayer`]
    /// rather than being dropped; creating the record is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] as described above, or when the store fails.
    #[instrument(skip(self, raw), fields(policy = %self.policy))]
    pub async fn reconcile(
        &self,
        user_id: PlayerId,
        raw: &RawScore,
    ) -> Result<Reconciled, ReconcileError> {
        let Some(submitted) = raw.parse() else {
            warn!(user_id, ?raw, "Rejecting malformed score");
            return Err(ReconcileError::MalformedScore {
                raw: format!("{raw:?}"),
            });
        };
        debug!(user_id, score = %submitted, "Score decoded");

        let high_score = match self.policy {
            ScorePolicy::Overwrite => self
                .store
                .set_high_score(user_id, submitted)
                .await?
                .then_some(submitted),
            ScorePolicy::KeepHighest => self.store.raise_high_score(user_id, submitted).await?,
        };

        let Some(high_score) = high_score else {
            warn!(user_id, "Score reported for unknown player");
            return Err(ReconcileError::UnknownPlayer { id: user_id });
        };

        info!(user_id, submitted = %submitted, high_score = %high_score, "Score reconciled");
        Ok(Reconciled {
            submitted,
            high_score,
        })
    }
}
