//! Inbound events and their classification into routes.

use derive_new::new;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::db::PlayerId;
use crate::score::RawScore;

/// The user an event came from, as identified by the transport.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct UserRef {
    /// Stable transport-issued identifier.
    pub id: PlayerId,
    /// First name, used when greeting.
    pub first_name: Option<String>,
    /// Handle, stored as the display name.
    pub username: Option<String>,
}

impl UserRef {
    /// Name stored on the player record: the handle, else the first name.
    pub fn display_name(&self) -> Option<String> {
        self.username.clone().or_else(|| self.first_name.clone())
    }

    /// Name used in greetings: the first name, else the handle.
    pub fn greeting_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("player")
    }
}

/// What arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A slash command with whitespace-separated arguments.
    Command {
        /// Command name as typed, with or without the leading `/`.
        name: String,
        /// Arguments following the name.
        args: Vec<String>,
    },
    /// A result posted back by the embedded game.
    GameResult {
        /// Payload as delivered; an object or a string holding one.
        payload: Value,
    },
    /// Anything else the transport delivered.
    Unrecognized,
}

/// A single unit of inbound work.
#[derive(Debug, Clone, PartialEq, new)]
pub struct Event {
    /// Originating user.
    pub user: UserRef,
    /// Event body.
    pub kind: EventKind,
}

/// Command names understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommandName {
    /// Begins a session and offers the game.
    Start,
    /// Records a score typed by hand.
    SetHighscore,
}

/// The handler an event is routed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Session start.
    SessionStart,
    /// Manual score report; the arguments joined into one token.
    ManualScore(RawScore),
    /// Structured game result.
    GameResult(RawScore),
    /// Nothing to do.
    Ignore,
}

impl Route {
    /// Classifies an event purely by its shape and command name.
    pub fn classify(kind: &EventKind) -> Self {
        match kind {
            EventKind::Command { name, args } => match parse_command_name(name) {
                Some(CommandName::Start) => Route::SessionStart,
                // A missing or extra argument is a malformed report, not an unknown command.
                Some(CommandName::SetHighscore) => {
                    Route::ManualScore(RawScore::Token(args.join(" ")))
                }
                None => Route::Ignore,
            },
            EventKind::GameResult { payload } => {
                Route::GameResult(RawScore::Structured(payload.clone()))
            }
            EventKind::Unrecognized => Route::Ignore,
        }
    }
}

/// Strips the leading `/` and a `@botname` suffix, then matches case-sensitively.
fn parse_command_name(raw: &str) -> Option<CommandName> {
    let name = raw.strip_prefix('/').unwrap_or(raw);
    let name = name.split_once('@').map_or(name, |(head, _)| head);
    name.parse().ok()
}
