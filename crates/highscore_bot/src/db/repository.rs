//! SQLite-backed player store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::Score;
use crate::db::{
    NewPlayer, PlayerId, PlayerRecord, PlayerStore, StoreError, StoreErrorKind, schema,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Player store over a single SQLite connection held for the process lifetime.
///
/// The connection sits behind a fair mutex, which makes it the one
/// serialization point for every write: operations run in the order they
/// asked for the connection and never interleave. `op_timeout` bounds the
/// wait for the connection. Once an operation holds it, the operation runs to
/// completion and its outcome is what the caller sees; SQLite's own
/// `busy_timeout` bounds how long it waits on other processes.
#[derive(Clone)]
pub struct SqlitePlayerStore {
    db_path: String,
    conn: Arc<Mutex<SqliteConnection>>,
    op_timeout: Duration,
}

impl fmt::Debug for SqlitePlayerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePlayerStore")
            .field("db_path", &self.db_path)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl SqlitePlayerStore {
    /// Opens the database at `db_path` and applies pending migrations.
    ///
    /// Use `":memory:"` for an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection cannot be established or the
    /// migrations fail.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String, op_timeout: Duration) -> Result<Self, StoreError> {
        info!(path = %db_path, "Opening player store");

        let mut conn = SqliteConnection::establish(&db_path).map_err(|e| {
            StoreError::unavailable(format!("Failed to connect to '{}': {}", db_path, e))
        })?;

        // Let SQLite wait for a competing process instead of failing at once,
        // but never longer than the caller is prepared to wait.
        let busy_ms = op_timeout.as_millis().min(u128::from(u32::MAX));
        conn.batch_execute(&format!("PRAGMA busy_timeout = {busy_ms};"))?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::new(StoreErrorKind::Migration, e.to_string()))?;
        info!(count = applied.len(), "Migrations applied");

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
            op_timeout,
        })
    }

    /// Path the store was opened with.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Runs `op` against the shared connection on the blocking pool.
    ///
    /// Fails with a retryable timeout, without touching the database, when the
    /// connection does not come free within `op_timeout`.
    async fn run<T, F>(&self, operation: &'static str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    {
        let acquire = Arc::clone(&self.conn).lock_owned();
        let mut guard = match tokio::time::timeout(self.op_timeout, acquire).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Store connection busy, giving up"
                );
                return Err(StoreError::timeout(operation, self.op_timeout));
            }
        };

        let task = tokio::task::spawn_blocking(move || {
            op(&mut *guard).map_err(|e| StoreError::from(e))
        });
        match task.await {
            Ok(result) => result,
            Err(join_err) => Err(StoreError::unavailable(format!(
                "{operation} task failed: {join_err}"
            ))),
        }
    }
}

#[async_trait]
impl PlayerStore for SqlitePlayerStore {
    #[instrument(skip(self))]
    async fn exists(&self, id: PlayerId) -> Result<bool, StoreError> {
        self.run("exists", move |conn| {
            diesel::select(diesel::dsl::exists(schema::players::table.find(id)))
                .get_result::<bool>(conn)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn create(
        &self,
        id: PlayerId,
        display_name: Option<String>,
    ) -> Result<bool, StoreError> {
        debug!("Creating player if absent");
        let new_player = NewPlayer::new(id, display_name);

        let inserted = self
            .run("create", move |conn| {
                diesel::insert_into(schema::players::table)
                    .values(&new_player)
                    .on_conflict_do_nothing()
                    .execute(conn)
            })
            .await?;

        if inserted == 1 {
            info!(player_id = id, "Player created");
        } else {
            debug!(player_id = id, "Player already present");
        }
        Ok(inserted == 1)
    }

    #[instrument(skip(self), fields(value = %value))]
    async fn set_high_score(&self, id: PlayerId, value: Score) -> Result<bool, StoreError> {
        let updated = self
            .run("set_high_score", move |conn| {
                diesel::update(schema::players::table.find(id))
                    .set((
                        schema::players::high_score.eq(value.get()),
                        schema::players::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
            })
            .await?;

        if updated == 0 {
            debug!(player_id = id, "No player to update");
        } else {
            info!(player_id = id, high_score = %value, "High score overwritten");
        }
        Ok(updated > 0)
    }

    #[instrument(skip(self), fields(value = %value))]
    async fn raise_high_score(
        &self,
        id: PlayerId,
        value: Score,
    ) -> Result<Option<Score>, StoreError> {
        let stored = self
            .run("raise_high_score", move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::update(
                        schema::players::table
                            .find(id)
                            .filter(schema::players::high_score.lt(value.get())),
                    )
                    .set((
                        schema::players::high_score.eq(value.get()),
                        schema::players::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)?;

                    schema::players::table
                        .find(id)
                        .select(schema::players::high_score)
                        .first::<i64>(conn)
                        .optional()
                })
            })
            .await?;

        let stored = stored.map(Score::from_stored);
        debug!(player_id = id, stored = ?stored, "High score raise applied");
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn set_display_name(
        &self,
        id: PlayerId,
        display_name: Option<String>,
    ) -> Result<bool, StoreError> {
        let updated = self
            .run("set_display_name", move |conn| {
                diesel::update(schema::players::table.find(id))
                    .set((
                        schema::players::display_name.eq(display_name),
                        schema::players::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
            })
            .await?;
        Ok(updated > 0)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>, StoreError> {
        let record = self
            .run("get", move |conn| {
                schema::players::table
                    .find(id)
                    .select(PlayerRecord::as_select())
                    .first::<PlayerRecord>(conn)
                    .optional()
            })
            .await?;

        if record.is_none() {
            debug!(player_id = id, "Player not found");
        }
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn count(&self) -> Result<i64, StoreError> {
        self.run("count", |conn| {
            schema::players::table.count().get_result::<i64>(conn)
        })
        .await
    }
}
