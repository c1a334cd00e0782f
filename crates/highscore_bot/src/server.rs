//! HTTP webhook endpoint.

use std::future::Future;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{debug, info, instrument};

use crate::dispatcher::Dispatcher;
use crate::telegram::Update;

/// Builds the router: `POST /telegram/webhook` and `GET /health`.
pub fn app(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/telegram/webhook", post(webhook))
        .with_state(dispatcher)
}

/// Serves [`app`] on `listener` until `shutdown` resolves.
#[instrument(skip_all)]
pub async fn serve(
    listener: TcpListener,
    dispatcher: Dispatcher,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Webhook server listening");
    }
    axum::serve(listener, app(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "ok"
}

/// Accepts the update and hands it to the dispatcher; handling is asynchronous.
#[instrument(skip_all)]
async fn webhook(State(dispatcher): State<Dispatcher>, Json(update): Json<Update>) -> StatusCode {
    let update_id = update.update_id;
    match update.into_event() {
        Some(event) => {
            // Dropped events are not redelivered; the user simply repeats.
            if !dispatcher.submit(event) {
                debug!(update_id, "Update dropped by a full mailbox");
            }
        }
        None => debug!(update_id, "Update has no routable sender"),
    }
    StatusCode::OK
}
