//! Bot configuration loaded from TOML.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below. Secrets never live here: the Telegram token is read from
//! the `TELEGRAM_TOKEN` environment variable (a `.env` file is honoured).

use std::path::Path;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::reconciler::ScorePolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct BotConfig {
    database: DatabaseConfig,
    scoring: ScoringConfig,
    retry: RetryConfig,
    dispatcher: DispatcherConfig,
    game: GameConfig,
    messages: ReplyTemplates,
    server: ServerConfig,
    telegram: TelegramConfig,
}

impl BotConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(
            db_path = %config.database.path,
            policy = %config.scoring.policy,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))
    }

    /// Replaces the database path (command-line override).
    pub fn set_db_path(&mut self, path: String) {
        self.database.path = path;
    }

    /// Replaces the bind address (command-line override).
    pub fn set_bind(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
    }

    /// Replaces the scoring policy (command-line override).
    pub fn set_policy(&mut self, policy: ScorePolicy) {
        self.scoring.policy = policy;
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`.
    path: String,
    /// Upper bound for a single store operation.
    timeout_ms: u64,
}

impl DatabaseConfig {
    /// Store operation bound as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "players.db".to_string(),
            timeout_ms: 2_000,
        }
    }
}

/// Score reconciliation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct ScoringConfig {
    policy: ScorePolicy,
}

/// Retry settings for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    attempts: u32,
    /// Delay before the first retry; doubles each time.
    backoff_base_ms: u64,
    /// Cap on a single delay.
    backoff_max_ms: u64,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(attempts: u32, backoff_base_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            attempts,
            backoff_base_ms,
            backoff_max_ms,
        }
    }

    /// Delay after the `failures`-th consecutive failure: `base * 2^(failures - 1)`,
    /// capped at the maximum.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
        let delay = self.backoff_base_ms.saturating_mul(factor).min(self.backoff_max_ms);
        Duration::from_millis(delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, 100, 2_000)
    }
}

/// Per-user mailbox settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Milliseconds a mailbox may sit empty before its task retires.
    mailbox_idle_ms: u64,
    /// Events a single user may have queued; more are dropped.
    mailbox_capacity: usize,
}

impl DispatcherConfig {
    /// Creates a dispatcher configuration.
    pub fn new(mailbox_idle: Duration, mailbox_capacity: usize) -> Self {
        Self {
            mailbox_idle_ms: u64::try_from(mailbox_idle.as_millis()).unwrap_or(u64::MAX),
            mailbox_capacity,
        }
    }

    /// Idle period as a [`Duration`].
    pub fn mailbox_idle(&self) -> Duration {
        Duration::from_millis(self.mailbox_idle_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mailbox_idle_ms: 300_000,
            mailbox_capacity: 64,
        }
    }
}

/// The external game offered on session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct GameConfig {
    url: String,
    button_label: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            url: "https://chuckis.github.io/flyingpoop/".to_string(),
            button_label: "Play!".to_string(),
        }
    }
}

/// Reply texts. `{name}` and `{score}` are substituted where noted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct ReplyTemplates {
    /// Greeting on session start; `{name}`.
    greeting: String,
    /// Sent together with the launch button.
    launch_prompt: String,
    /// Manual score confirmation; `{score}`.
    score_confirmed: String,
    /// Game result congratulation; `{score}`.
    game_result: String,
    /// Correction hint for malformed scores.
    malformed_hint: String,
    /// Sent when the store stays unavailable.
    failure: String,
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self {
            greeting: "Hi, {name}! Let's play!".to_string(),
            launch_prompt: "Tap the button to start the game!".to_string(),
            score_confirmed: "Your new high score: {score} points!".to_string(),
            game_result: "You scored {score} points!".to_string(),
            malformed_hint: "Scores must be whole numbers, e.g. /set_highscore 42".to_string(),
            failure: "Something went wrong, please try again later.".to_string(),
        }
    }
}

/// Substitutes `{key}` placeholders in `template`.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}

/// Webhook listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(default)]
pub struct TelegramConfig {
    api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
