//! Per-user mailboxes in front of the [`EventRouter`].
//!
//! Each active user gets one task that drains that user's queue in order, so
//! a reply to one event is always sent before the next event of the same user
//! is looked at. Different users run concurrently. A mailbox that stays empty
//! for the configured idle period retires; its session state is dropped and
//! the next event starts from [`SessionState::New`]. Mailboxes are bounded:
//! when a user's queue is full, further events from that user are dropped
//! with a warning until the queue drains.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DispatcherConfig;
use crate::db::PlayerId;
use crate::event::Event;
use crate::router::{EventRouter, SessionState};

#[derive(Debug, Default)]
struct Mailboxes {
    senders: HashMap<PlayerId, (u64, mpsc::Sender<Event>)>,
    tasks: JoinSet<()>,
    next_generation: u64,
}

/// Fans inbound events out to per-user mailbox tasks.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    router: Arc<EventRouter>,
    mailboxes: Arc<Mutex<Mailboxes>>,
    idle: Duration,
    capacity: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with the mailbox idle period and capacity from `config`.
    #[instrument(skip(router))]
    pub fn new(router: EventRouter, config: &DispatcherConfig) -> Self {
        let capacity = (*config.mailbox_capacity()).max(1);
        info!(capacity, "Creating Dispatcher");
        Self {
            router: Arc::new(router),
            mailboxes: Arc::new(Mutex::new(Mailboxes::default())),
            idle: config.mailbox_idle(),
            capacity,
        }
    }

    /// Queues `event` behind earlier events of the same user.
    ///
    /// Returns immediately; `false` when the user's mailbox is full and the
    /// event was dropped. Must be called from within a Tokio runtime.
    #[instrument(skip(self, event), fields(user = event.user.id))]
    pub fn submit(&self, event: Event) -> bool {
        let user = event.user.id;
        let mut mailboxes = lock(&self.mailboxes);

        // Reap finished mailbox tasks so the set does not grow without bound.
        while let Some(result) = mailboxes.tasks.try_join_next() {
            if let Err(err) = result {
                error!(error = %err, "Mailbox task ended abnormally");
            }
        }

        let event = match mailboxes.senders.get(&user) {
            Some((_, tx)) => match tx.try_send(event) {
                Ok(()) => {
                    debug!("Queued in existing mailbox");
                    return true;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(capacity = self.capacity, "Mailbox full, dropping event");
                    return false;
                }
                // The task is gone (it panicked); open a fresh mailbox.
                Err(mpsc::error::TrySendError::Closed(event)) => event,
            },
            None => event,
        };

        let generation = mailboxes.next_generation;
        mailboxes.next_generation += 1;

        let (tx, rx) = mpsc::channel(self.capacity);
        if tx.try_send(event).is_err() {
            // Unreachable: `rx` is alive and the channel is empty.
            return false;
        }
        mailboxes.senders.insert(user, (generation, tx));
        mailboxes.tasks.spawn(run_mailbox(
            Arc::clone(&self.router),
            Arc::clone(&self.mailboxes),
            user,
            generation,
            rx,
            self.idle,
        ));
        debug!(generation, "Opened mailbox");
        true
    }

    /// Number of mailboxes currently accepting events.
    pub fn active_mailboxes(&self) -> usize {
        lock(&self.mailboxes).senders.len()
    }

    /// Closes every mailbox and waits until all queued events are handled.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut mailboxes = lock(&self.mailboxes);
            mailboxes.senders.clear();
            std::mem::take(&mut mailboxes.tasks)
        };
        info!(pending = tasks.len(), "Draining mailboxes");

        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "Mailbox task ended abnormally");
            }
        }
        info!("Dispatcher stopped");
    }
}

fn lock(mailboxes: &Mutex<Mailboxes>) -> MutexGuard<'_, Mailboxes> {
    mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
}

#[instrument(skip(router, mailboxes, rx, idle))]
async fn run_mailbox(
    router: Arc<EventRouter>,
    mailboxes: Arc<Mutex<Mailboxes>>,
    user: PlayerId,
    generation: u64,
    mut rx: mpsc::Receiver<Event>,
    idle: Duration,
) {
    let mut state = SessionState::default();

    loop {
        let event = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                // Retire under the lock so no submit can slip an event in
                // between the emptiness check and the removal.
                let mut guard = lock(&mailboxes);
                match rx.try_recv() {
                    Ok(event) => event,
                    Err(_) => {
                        let ours = guard
                            .senders
                            .get(&user)
                            .is_some_and(|(g, _)| *g == generation);
                        if ours {
                            guard.senders.remove(&user);
                        }
                        debug!("Mailbox idle, retiring");
                        break;
                    }
                }
            }
        };

        let disposition = router.dispatch(&event, &mut state).await;
        debug!(%disposition, state = %state, "Event handled");
    }
}
