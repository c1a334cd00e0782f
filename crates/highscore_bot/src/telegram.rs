//! Telegram Bot API adapter.
//!
//! Inbound, webhook [`Update`]s are turned into [`Event`]s. Results from the
//! web app arrive either as `message.web_app_data` or as a callback query's
//! `data`; both become [`EventKind::GameResult`]. Outbound, [`TelegramChannel`]
//! posts replies to `sendMessage`, rendering a launch button as a one-time
//! reply keyboard that opens the web app.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::db::PlayerId;
use crate::event::{Event, EventKind, UserRef};
use crate::outbound::{ChannelError, OutboundChannel, Reply};

/// Incoming webhook update. Only the fields the bot reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New message, if any.
    pub message: Option<Message>,
    /// Button callback, if any.
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Sender; absent for channel posts.
    pub from: Option<User>,
    /// Message text.
    pub text: Option<String>,
    /// Data sent from a web app.
    pub web_app_data: Option<WebAppData>,
}

/// A Telegram user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// User id.
    pub id: i64,
    /// First name.
    pub first_name: Option<String>,
    /// Handle without the `@`.
    pub username: Option<String>,
}

/// Payload posted by a web app.
#[derive(Debug, Clone, Deserialize)]
pub struct WebAppData {
    /// Raw data string.
    pub data: String,
}

/// Callback from an inline button.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Query id.
    pub id: String,
    /// The user who pressed the button.
    pub from: User,
    /// Data attached to the button.
    pub data: Option<String>,
}

impl From<User> for UserRef {
    fn from(user: User) -> Self {
        UserRef::new(user.id, user.first_name, user.username)
    }
}

impl Update {
    /// Converts the update into an event; `None` when there is no sender.
    #[instrument(skip(self), fields(update_id = self.update_id))]
    pub fn into_event(self) -> Option<Event> {
        if let Some(query) = self.callback_query {
            let kind = match query.data {
                Some(data) => EventKind::GameResult {
                    payload: Value::String(data),
                },
                None => EventKind::Unrecognized,
            };
            return Some(Event::new(query.from.into(), kind));
        }

        let Some(message) = self.message else {
            debug!("Update carries neither message nor callback");
            return None;
        };
        let Some(from) = message.from else {
            debug!("Message without sender");
            return None;
        };

        let kind = if let Some(web_app) = message.web_app_data {
            EventKind::GameResult {
                payload: Value::String(web_app.data),
            }
        } else {
            message
                .text
                .as_deref()
                .and_then(parse_command)
                .unwrap_or(EventKind::Unrecognized)
        };
        Some(Event::new(from.into(), kind))
    }
}

fn parse_command(text: &str) -> Option<EventKind> {
    if !text.starts_with('/') {
        return None;
    }
    let mut words = text.split_whitespace();
    let name = words.next()?.to_string();
    let args = words.map(str::to_string).collect();
    Some(EventKind::Command { name, args })
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: PlayerId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplyKeyboardMarkup<'a> {
    keyboard: Vec<Vec<KeyboardButton<'a>>>,
    one_time_keyboard: bool,
    resize_keyboard: bool,
}

#[derive(Debug, Serialize)]
struct KeyboardButton<'a> {
    text: &'a str,
    web_app: WebAppInfo<'a>,
}

#[derive(Debug, Serialize)]
struct WebAppInfo<'a> {
    url: &'a str,
}

impl<'a> SendMessage<'a> {
    fn from_reply(chat_id: PlayerId, reply: &'a Reply) -> Self {
        let reply_markup = reply.button().as_ref().map(|button| ReplyKeyboardMarkup {
            keyboard: vec![vec![KeyboardButton {
                text: button.label(),
                web_app: WebAppInfo { url: button.url() },
            }]],
            one_time_keyboard: true,
            resize_keyboard: true,
        });
        Self {
            chat_id,
            text: reply.text(),
            reply_markup,
        }
    }
}

/// Delivers replies through the Bot API `sendMessage` method.
#[derive(Clone)]
pub struct TelegramChannel {
    client: reqwest::Client,
    send_message_url: String,
}

impl fmt::Debug for TelegramChannel {
    // The URL embeds the bot token.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel").finish_non_exhaustive()
    }
}

impl TelegramChannel {
    /// Creates a channel for the bot identified by `token`.
    #[instrument(skip(token))]
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_message_url: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                token
            ),
        }
    }
}

#[async_trait]
impl OutboundChannel for TelegramChannel {
    #[instrument(skip(self, reply))]
    async fn send(&self, user: PlayerId, reply: Reply) -> Result<(), ChannelError> {
        let body = SendMessage::from_reply(user, &reply);
        let response = self
            .client
            .post(&self.send_message_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ChannelError::new(format!("sendMessage request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::new(format!(
                "sendMessage returned {status}: {detail}"
            )));
        }
        debug!("Reply delivered");
        Ok(())
    }
}
