//! Routing inbound events to their handlers.

use std::future::Future;
use std::sync::Arc;

use strum::Display;
use tracing::{debug, info, instrument, warn};

use crate::config::{self, BotConfig, GameConfig, ReplyTemplates, RetryConfig};
use crate::db::PlayerStore;
use crate::event::{Event, Route, UserRef};
use crate::outbound::{LaunchButton, OutboundChannel, Reply};
use crate::reconciler::{ReconcileError, Reconciled, ScoreReconciler};
use crate::score::RawScore;

/// Where a user's session stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// Nothing seen yet.
    #[default]
    New,
    /// The game was offered; waiting for a result.
    AwaitingPlay,
    /// A result arrived; waiting for the next start.
    Idle,
}

/// What the router did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Disposition {
    /// Handled and answered.
    Handled,
    /// Not meant for us: no reply, no write.
    Ignored,
    /// The score payload was malformed; a hint was sent and nothing written.
    Rejected,
    /// The store stayed unavailable; a failure message was sent.
    Failed,
}

/// Which kind of score report is being handled; selects the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportKind {
    Manual,
    GameResult,
}

/// Maps events to handlers and answers through an [`OutboundChannel`].
///
/// The router itself holds no per-user state; the caller owns each user's
/// [`SessionState`] and passes it in.
#[derive(Clone)]
pub struct EventRouter {
    store: Arc<dyn PlayerStore>,
    reconciler: ScoreReconciler,
    channel: Arc<dyn OutboundChannel>,
    game: GameConfig,
    messages: ReplyTemplates,
    retry: RetryConfig,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("reconciler", &self.reconciler)
            .field("game", &self.game)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    /// Creates a router over `store`, replying through `channel`.
    #[instrument(skip_all)]
    pub fn new(
        store: Arc<dyn PlayerStore>,
        channel: Arc<dyn OutboundChannel>,
        config: &BotConfig,
    ) -> Self {
        let reconciler = ScoreReconciler::new(Arc::clone(&store), *config.scoring().policy());
        info!(game_url = %config.game().url(), "Creating EventRouter");
        Self {
            store,
            reconciler,
            channel,
            game: config.game().clone(),
            messages: config.messages().clone(),
            retry: *config.retry(),
        }
    }

    /// Handles one event to completion, replies included.
    ///
    /// Never fails: every error ends in a reply (or, for unrecognized events,
    /// in silence) and is reported through the returned [`Disposition`].
    #[instrument(skip(self, event, state), fields(user = event.user.id, state = %state))]
    pub async fn dispatch(&self, event: &Event, state: &mut SessionState) -> Disposition {
        match Route::classify(&event.kind) {
            Route::SessionStart => self.on_start(&event.user, state).await,
            Route::ManualScore(raw) => {
                self.on_score(&event.user, &raw, ReportKind::Manual).await
            }
            Route::GameResult(raw) => {
                if *state != SessionState::AwaitingPlay {
                    debug!(state = %state, "Game result outside an offered session");
                }
                let disposition = self
                    .on_score(&event.user, &raw, ReportKind::GameResult)
                    .await;
                if disposition == Disposition::Handled {
                    *state = SessionState::Idle;
                }
                disposition
            }
            Route::Ignore => {
                debug!("Ignoring unrecognized event");
                Disposition::Ignored
            }
        }
    }

    async fn on_start(&self, user: &UserRef, state: &mut SessionState) -> Disposition {
        let display_name = user.display_name();

        let inserted = match self.ensure_player(user).await {
            Ok(inserted) => inserted,
            Err(err) => return self.fail(user, &err).await,
        };

        if !inserted && display_name.is_some() {
            // Best effort: a stale display name is harmless.
            if let Err(err) = self.store.set_display_name(user.id, display_name).await {
                warn!(error = %err, "Could not refresh display name");
            }
        }

        let greeting = config::render(
            self.messages.greeting(),
            &[("name", user.greeting_name())],
        );
        self.send(user, Reply::plain(greeting)).await;

        let button = LaunchButton::new(self.game.button_label(), self.game.url());
        self.send(user, Reply::plain(self.messages.launch_prompt()).with_button(button))
            .await;

        *state = SessionState::AwaitingPlay;
        info!(inserted, "Session started");
        Disposition::Handled
    }

    async fn on_score(&self, user: &UserRef, raw: &RawScore, kind: ReportKind) -> Disposition {
        let result = match self.reconcile(user, raw).await {
            Err(ReconcileError::UnknownPlayer { .. }) => {
                info!("Creating record for unknown player before applying score");
                match self.ensure_player(user).await {
                    Ok(_) => self.reconcile(user, raw).await,
                    Err(err) => Err(err),
                }
            }
            other => other,
        };

        match result {
            Ok(reconciled) => {
                let (template, score) = match kind {
                    ReportKind::Manual => {
                        (self.messages.score_confirmed(), reconciled.high_score())
                    }
                    ReportKind::GameResult => {
                        (self.messages.game_result(), reconciled.submitted())
                    }
                };
                let score = score.to_string();
                let text = config::render(template, &[("score", score.as_str())]);
                self.send(user, Reply::plain(text)).await;
                Disposition::Handled
            }
            Err(ReconcileError::MalformedScore { .. }) => {
                self.send(user, Reply::plain(self.messages.malformed_hint()))
                    .await;
                Disposition::Rejected
            }
            Err(err) => self.fail(user, &err).await,
        }
    }

    async fn reconcile(
        &self,
        user: &UserRef,
        raw: &RawScore,
    ) -> Result<Reconciled, ReconcileError> {
        let reconciler = &self.reconciler;
        let id = user.id;
        self.retrying("reconcile", move || reconciler.reconcile(id, raw))
            .await
    }

    /// Creates the record if absent; returns whether it was inserted.
    async fn ensure_player(&self, user: &UserRef) -> Result<bool, ReconcileError> {
        let store = &self.store;
        let id = user.id;
        let display_name = user.display_name();
        self.retrying("create", move || {
            let display_name = display_name.clone();
            async move {
                store
                    .create(id, display_name)
                    .await
                    .map_err(ReconcileError::from)
            }
        })
        .await
    }

    /// Runs `op`, retrying transient store failures with exponential backoff.
    async fn retrying<T, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<T, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReconcileError>>,
    {
        let attempts = (*self.retry.attempts()).max(1);
        let mut failures = 0;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && failures + 1 < attempts => {
                    failures += 1;
                    let delay = self.retry.backoff(failures);
                    warn!(
                        operation,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn fail(&self, user: &UserRef, err: &ReconcileError) -> Disposition {
        warn!(error = %err, "Giving up on event");
        self.send(user, Reply::plain(self.messages.failure())).await;
        Disposition::Failed
    }

    async fn send(&self, user: &UserRef, reply: Reply) {
        if let Err(err) = self.channel.send(user.id, reply).await {
            warn!(error = %err, "Reply not delivered");
        }
    }
}
