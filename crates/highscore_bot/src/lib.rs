//! High score bot library.
//!
//! Receives chat commands and game results, keeps one high score per player
//! and answers with text and a button that launches the web game.
//!
//! # Architecture
//!
//! - **Store**: [`PlayerStore`] with a SQLite implementation
//! - **Reconciler**: decodes score payloads and applies the [`ScorePolicy`]
//! - **Router**: routes an [`Event`] to its handler and replies through an [`OutboundChannel`]
//! - **Dispatcher**: per-user mailboxes keeping each user's events in order
//! - **Telegram**: webhook update decoding and `sendMessage` delivery
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use highscore_bot::{BotConfig, EventRouter, SqlitePlayerStore, TracingChannel};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = BotConfig::default();
//! let store = SqlitePlayerStore::open("players.db".to_string(), Duration::from_secs(2))?;
//! let router = EventRouter::new(Arc::new(store), Arc::new(TracingChannel), &config);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod db;
mod dispatcher;
mod event;
mod outbound;
mod reconciler;
mod router;
mod score;
mod server;
mod telegram;

// Crate-level exports - Configuration
pub use config::{
    BotConfig, ConfigError, DatabaseConfig, DispatcherConfig, GameConfig, ReplyTemplates,
    RetryConfig, ScoringConfig, ServerConfig, TelegramConfig, render,
};

// Crate-level exports - Storage
pub use db::{
    NewPlayer, PlayerId, PlayerRecord, PlayerStore, SqlitePlayerStore, StoreError, StoreErrorKind,
};

// Crate-level exports - Scores
pub use reconciler::{ReconcileError, Reconciled, ScorePolicy, ScoreReconciler};
pub use score::{RawScore, Score};

// Crate-level exports - Events and routing
pub use dispatcher::Dispatcher;
pub use event::{CommandName, Event, EventKind, Route, UserRef};
pub use outbound::{ChannelError, LaunchButton, OutboundChannel, Reply, TracingChannel};
pub use router::{Disposition, EventRouter, SessionState};

// Crate-level exports - Transport
pub use server::{app, serve};
pub use telegram::{CallbackQuery, Message, TelegramChannel, Update, User, WebAppData};
