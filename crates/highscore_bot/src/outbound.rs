//! Replies and the channel that carries them back to the user.

use async_trait::async_trait;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::Serialize;
use tracing::{info, instrument};

use crate::db::PlayerId;

/// A labelled button that opens the external game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct LaunchButton {
    label: String,
    url: String,
}

impl LaunchButton {
    /// Creates a button labelled `label` pointing at `url`.
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Text sent back to a user, optionally with a single launch button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct Reply {
    text: String,
    button: Option<LaunchButton>,
}

impl Reply {
    /// Plain text reply.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            button: None,
        }
    }

    /// Attaches a launch button.
    pub fn with_button(mut self, button: LaunchButton) -> Self {
        self.button = Some(button);
        self
    }
}

/// Delivery failure.
#[derive(Debug, Clone, Display, Error)]
#[display("Channel error: {} at {}:{}", message, file, line)]
pub struct ChannelError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ChannelError {
    /// Creates a new channel error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Sends replies to the user who raised an event.
///
/// Implementations deliver in call order; the router awaits each send before
/// handling the user's next event.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Delivers `reply` to `user`.
    async fn send(&self, user: PlayerId, reply: Reply) -> Result<(), ChannelError>;
}

/// Channel that only logs replies. Used when no transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChannel;

#[async_trait]
impl OutboundChannel for TracingChannel {
    #[instrument(skip(self, reply))]
    async fn send(&self, user: PlayerId, reply: Reply) -> Result<(), ChannelError> {
        info!(
            user,
            text = %reply.text(),
            button = ?reply.button().as_ref().map(|b| b.url()),
            "Reply"
        );
        Ok(())
    }
}
