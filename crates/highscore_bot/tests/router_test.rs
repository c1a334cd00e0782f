//! Tests for event routing, per-user dispatch and the webhook endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{FlakyStore, RecordingChannel, command, game_result, setup_store, test_config, user};
use highscore_bot::{
    Dispatcher, DispatcherConfig, Disposition, Event, EventKind, EventRouter, PlayerStore,
    SessionState,
};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_start_game_result_manual_score_scenario() {
    let (_db, store) = setup_store();
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(store.clone(), channel.clone(), &test_config());
    let mut state = SessionState::default();

    // Session start creates the record and offers the game.
    let disposition = router.dispatch(&command(42, "/start", &[]), &mut state).await;
    assert_eq!(disposition, Disposition::Handled);
    assert_eq!(state, SessionState::AwaitingPlay);

    let record = store.get(42).await.expect("Get failed").expect("Missing record");
    assert_eq!(*record.id(), 42);
    assert_eq!(*record.high_score(), 0);

    let replies = channel.replies();
    assert_eq!(replies.len(), 2);
    assert!(replies[0].1.text().contains("Player42"));
    assert!(replies[0].1.button().is_none());
    let button = replies[1].1.button().as_ref().expect("Launch button missing");
    assert_eq!(button.url(), "https://example.test/game");
    assert_eq!(button.label(), "Play!");

    // Game result from the web app.
    let disposition = router
        .dispatch(&game_result(42, json!({"score": 17})), &mut state)
        .await;
    assert_eq!(disposition, Disposition::Handled);
    assert_eq!(state, SessionState::Idle);
    let record = store.get(42).await.expect("Get failed").expect("Missing record");
    assert_eq!(*record.high_score(), 17);
    assert!(channel.texts_for(42)[2].contains("17"));

    // Manual score overwrites, even when lower.
    let disposition = router
        .dispatch(&command(42, "/set_highscore", &["5"]), &mut state)
        .await;
    assert_eq!(disposition, Disposition::Handled);
    assert_eq!(state, SessionState::Idle);
    let record = store.get(42).await.expect("Get failed").expect("Missing record");
    assert_eq!(*record.high_score(), 5);
    assert!(channel.texts_for(42)[3].contains('5'));
}

#[tokio::test]
async fn test_game_result_as_string_payload() {
    let (_db, store) = setup_store();
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(store.clone(), channel.clone(), &test_config());
    let mut state = SessionState::AwaitingPlay;

    let event = game_result(8, json!("{\"score\": \"23\"}"));
    assert_eq!(router.dispatch(&event, &mut state).await, Disposition::Handled);

    let record = store.get(8).await.expect("Get failed").expect("Missing record");
    assert_eq!(*record.high_score(), 23);
}

#[tokio::test]
async fn test_unrecognized_events_are_silent() {
    let (_db, store) = setup_store();
    let flaky = Arc::new(FlakyStore::new(store.clone(), 0));
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(flaky.clone(), channel.clone(), &test_config());
    let mut state = SessionState::default();

    let events = [
        Event::new(user(1), EventKind::Unrecognized),
        command(1, "/help", &[]),
        command(1, "/Start", &[]),
    ];
    for event in &events {
        assert_eq!(router.dispatch(event, &mut state).await, Disposition::Ignored);
    }

    assert!(channel.replies().is_empty());
    assert_eq!(flaky.calls(), 0);
    assert_eq!(state, SessionState::New);
}

#[tokio::test]
async fn test_malformed_scores_get_hint_and_no_write() {
    let (_db, store) = setup_store();
    let flaky = Arc::new(FlakyStore::new(store.clone(), 0));
    let channel = Arc::new(RecordingChannel::default());
    let config = test_config();
    let router = EventRouter::new(flaky.clone(), channel.clone(), &config);
    let mut state = SessionState::AwaitingPlay;

    let events = [
        command(2, "/set_highscore", &["abc"]),
        command(2, "/set_highscore", &[]),
        command(2, "/set_highscore", &["-4"]),
        game_result(2, json!({})),
    ];
    for event in &events {
        assert_eq!(router.dispatch(event, &mut state).await, Disposition::Rejected);
    }

    assert_eq!(flaky.writes(), 0);
    assert_eq!(state, SessionState::AwaitingPlay);
    let texts = channel.texts_for(2);
    assert_eq!(texts.len(), 4);
    assert!(texts.iter().all(|t| t == config.messages().malformed_hint()));
}

#[tokio::test]
async fn test_score_for_unknown_player_creates_record() {
    let (_db, store) = setup_store();
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(store.clone(), channel.clone(), &test_config());
    let mut state = SessionState::default();

    let disposition = router
        .dispatch(&game_result(77, json!({"score": 12})), &mut state)
        .await;
    assert_eq!(disposition, Disposition::Handled);

    let record = store.get(77).await.expect("Get failed").expect("Missing record");
    assert_eq!(*record.high_score(), 12);
    assert_eq!(record.display_name().as_deref(), Some("player_77"));
}

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let (_db, store) = setup_store();
    // Two failures fit inside three attempts.
    let flaky = Arc::new(FlakyStore::new(store.clone(), 2));
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(flaky.clone(), channel.clone(), &test_config());
    let mut state = SessionState::default();

    let disposition = router.dispatch(&command(3, "/start", &[]), &mut state).await;
    assert_eq!(disposition, Disposition::Handled);
    assert!(store.exists(3).await.expect("Exists failed"));
    assert_eq!(channel.texts_for(3).len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_reply_with_failure() {
    let (_db, store) = setup_store();
    let flaky = Arc::new(FlakyStore::new(store.clone(), 100));
    let channel = Arc::new(RecordingChannel::default());
    let config = test_config();
    let router = EventRouter::new(flaky.clone(), channel.clone(), &config);
    let mut state = SessionState::default();

    let disposition = router.dispatch(&command(4, "/start", &[]), &mut state).await;
    assert_eq!(disposition, Disposition::Failed);
    assert_eq!(state, SessionState::New);
    assert_eq!(flaky.calls(), 3);
    assert_eq!(channel.texts_for(4), vec![config.messages().failure().clone()]);

    let disposition = router
        .dispatch(&command(4, "/set_highscore", &["9"]), &mut state)
        .await;
    assert_eq!(disposition, Disposition::Failed);
    assert!(!store.exists(4).await.expect("Exists failed"));
}

/// Polls until `user` has received `count` replies.
async fn wait_for_replies(channel: &RecordingChannel, user: i64, count: usize) -> Vec<String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let texts = channel.texts_for(user);
        if texts.len() >= count || tokio::time::Instant::now() >= deadline {
            return texts;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatcher_keeps_per_user_order() {
    let (_db, store) = setup_store();
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(store.clone(), channel.clone(), &test_config());
    let config = DispatcherConfig::new(Duration::from_secs(60), 64);
    let dispatcher = Dispatcher::new(router, &config);

    for id in [10, 20, 30] {
        assert!(dispatcher.submit(command(id, "/start", &[])));
        for value in 1..=20 {
            let arg = value.to_string();
            assert!(dispatcher.submit(command(id, "/set_highscore", &[arg.as_str()])));
        }
    }
    assert!(dispatcher.active_mailboxes() <= 3);
    dispatcher.shutdown().await;

    for id in [10, 20, 30] {
        let texts = channel.texts_for(id);
        assert_eq!(texts.len(), 22);
        for (i, text) in texts[2..].iter().enumerate() {
            assert!(
                text.contains(&format!(" {} ", i + 1)),
                "reply {i} for {id} out of order: {text}"
            );
        }
        let record = store.get(id).await.expect("Get failed").expect("Missing record");
        assert_eq!(*record.high_score(), 20);
    }
    assert_eq!(dispatcher.active_mailboxes(), 0);
}

#[tokio::test]
async fn test_idle_mailbox_retires_and_reopens() {
    let (_db, store) = setup_store();
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(store.clone(), channel.clone(), &test_config());
    let config = DispatcherConfig::new(Duration::from_millis(50), 64);
    let dispatcher = Dispatcher::new(router, &config);

    dispatcher.submit(command(5, "/start", &[]));
    assert_eq!(wait_for_replies(&channel, 5, 2).await.len(), 2);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while dispatcher.active_mailboxes() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(dispatcher.active_mailboxes(), 0);

    dispatcher.submit(command(5, "/set_highscore", &["8"]));
    let texts = wait_for_replies(&channel, 5, 3).await;
    assert_eq!(texts.len(), 3);
    assert!(texts[2].contains('8'));
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_full_mailbox_drops_further_events() {
    let (_db, store) = setup_store();
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(store.clone(), channel.clone(), &test_config());
    let config = DispatcherConfig::new(Duration::from_secs(60), 2);
    let dispatcher = Dispatcher::new(router, &config);

    // The mailbox task cannot run before this task yields, so the queue fills.
    assert!(dispatcher.submit(command(6, "/start", &[])));
    assert!(dispatcher.submit(command(6, "/set_highscore", &["1"])));
    assert!(!dispatcher.submit(command(6, "/set_highscore", &["2"])));
    assert!(!dispatcher.submit(command(6, "/set_highscore", &["3"])));

    // Other users have their own mailboxes.
    assert!(dispatcher.submit(command(7, "/start", &[])));

    dispatcher.shutdown().await;

    assert_eq!(channel.texts_for(6).len(), 3);
    assert_eq!(channel.texts_for(7).len(), 2);
    let record = store.get(6).await.expect("Get failed").expect("Missing record");
    assert_eq!(*record.high_score(), 1);
}

#[tokio::test]
async fn test_webhook_accepts_updates() {
    let (_db, store) = setup_store();
    let channel = Arc::new(RecordingChannel::default());
    let router = EventRouter::new(store.clone(), channel.clone(), &test_config());
    let config = DispatcherConfig::new(Duration::from_secs(60), 64);
    let dispatcher = Dispatcher::new(router, &config);
    let app = highscore_bot::app(dispatcher.clone());

    let update = json!({
        "update_id": 1,
        "message": {"from": {"id": 42, "first_name": "Ann"}, "text": "/start"}
    });
    let response = app
        .clone()
        .oneshot(
            Request::post("/telegram/webhook")
                .header("content-type", "application/json")
                .body(Body::from(update.to_string()))
                .expect("Invalid request"),
        )
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);

    let texts = wait_for_replies(&channel, 42, 2).await;
    assert!(texts[0].contains("Ann"));
    assert!(store.exists(42).await.expect("Exists failed"));

    let response = app
        .clone()
        .oneshot(
            Request::post("/telegram/webhook")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .expect("Invalid request"),
        )
        .await
        .expect("Request failed");
    assert!(response.status().is_client_error());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).expect("Invalid request"))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.expect("Body failed").to_bytes();
    assert_eq!(&body[..], b"ok");

    dispatcher.shutdown().await;
}
