//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use highscore_bot::{
    BotConfig, ChannelError, Event, EventKind, OutboundChannel, PlayerId, PlayerRecord,
    PlayerStore, Reply, Score, SqlitePlayerStore, StoreError, UserRef,
};

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready store.
pub fn setup_store() -> (NamedTempFile, Arc<SqlitePlayerStore>) {
    setup_store_with_timeout(Duration::from_secs(5))
}

/// Like [`setup_store`], with a custom bound on store operations.
pub fn setup_store_with_timeout(
    op_timeout: Duration,
) -> (NamedTempFile, Arc<SqlitePlayerStore>) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let store = SqlitePlayerStore::open(db_path, op_timeout).expect("Failed to open store");
    (db_file, Arc::new(store))
}

/// Defaults with retries fast enough for tests.
pub fn test_config() -> BotConfig {
    BotConfig::from_toml(
        r#"
        [retry]
        attempts = 3
        backoff_base_ms = 1
        backoff_max_ms = 5

        [game]
        url = "https://example.test/game"
        button_label = "Play!"
        "#,
    )
    .expect("Invalid test config")
}

pub fn user(id: PlayerId) -> UserRef {
    UserRef::new(id, Some(format!("Player{id}")), Some(format!("player_{id}")))
}

pub fn command(id: PlayerId, name: &str, args: &[&str]) -> Event {
    Event::new(
        user(id),
        EventKind::Command {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        },
    )
}

pub fn game_result(id: PlayerId, payload: serde_json::Value) -> Event {
    Event::new(user(id), EventKind::GameResult { payload })
}

/// Channel that keeps every reply in delivery order.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    replies: Mutex<Vec<(PlayerId, Reply)>>,
}

impl RecordingChannel {
    pub fn replies(&self) -> Vec<(PlayerId, Reply)> {
        self.replies.lock().expect("poisoned").clone()
    }

    pub fn texts_for(&self, user: PlayerId) -> Vec<String> {
        self.replies()
            .into_iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, reply)| reply.text().clone())
            .collect()
    }
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    async fn send(&self, user: PlayerId, reply: Reply) -> Result<(), ChannelError> {
        self.replies.lock().expect("poisoned").push((user, reply));
        Ok(())
    }
}

/// Wraps a store, counting calls and failing the first `failures` of them.
pub struct FlakyStore {
    inner: Arc<dyn PlayerStore>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn PlayerStore>, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn enter(&self, write: bool) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if write {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            Err(StoreError::unavailable("database is locked"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PlayerStore for FlakyStore {
    async fn exists(&self, id: PlayerId) -> Result<bool, StoreError> {
        self.enter(false)?;
        self.inner.exists(id).await
    }

    async fn create(
        &self,
        id: PlayerId,
        display_name: Option<String>,
    ) -> Result<bool, StoreError> {
        self.enter(true)?;
        self.inner.create(id, display_name).await
    }

    async fn set_high_score(&self, id: PlayerId, value: Score) -> Result<bool, StoreError> {
        self.enter(true)?;
        self.inner.set_high_score(id, value).await
    }

    async fn raise_high_score(
        &self,
        id: PlayerId,
        value: Score,
    ) -> Result<Option<Score>, StoreError> {
        self.enter(true)?;
        self.inner.raise_high_score(id, value).await
    }

    async fn set_display_name(
        &self,
        id: PlayerId,
        display_name: Option<String>,
    ) -> Result<bool, StoreError> {
        self.enter(true)?;
        self.inner.set_display_name(id, display_name).await
    }

    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>, StoreError> {
        self.enter(false)?;
        self.inner.get(id).await
    }

    async fn count(&self) -> Result<i64, StoreError> {
        self.enter(false)?;
        self.inner.count().await
    }
}

pub fn score(value: i64) -> Score {
    Score::new(value).expect("Negative test score")
}
