use std::time::Duration;

use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;
use tally_sync::{
    NotificationSuppressor, SuppressAction, TickOutcome, TitleSynchronizer, UpdateSource,
};
use tally_telegram::{TelegramGateway, Update};

const TOKEN: &str = "123:abc";
const CHAT_ID: i64 = -1001;

fn gateway(server: &MockServer) -> TelegramGateway {
    TelegramGateway::with_api_base(TOKEN, &server.base_url(), 2_000).expect("gateway")
}

fn synchronizer(server: &MockServer) -> TitleSynchronizer {
    TitleSynchronizer::new(
        gateway(server),
        CHAT_ID,
        "readers: ",
        Duration::from_millis(10),
    )
}

fn update(value: serde_json::Value) -> Update {
    serde_json::from_value(value).expect("update payload")
}

#[test]
fn title_updates_only_when_count_changes() {
    let server = MockServer::start();
    let count = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/getChatMemberCount");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":10}"#);
    });
    let rename = server.mock(|when, then| {
        when.method(POST)
            .path("/bot123:abc/setChatTitle")
            .json_body(json!({ "chat_id": CHAT_ID, "title": "readers: 10" }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":true}"#);
    });

    let mut sync = synchronizer(&server);
    assert_eq!(sync.tick(), TickOutcome::Applied("readers: 10".to_string()));
    assert_eq!(sync.last_known(), 10);

    // Same count on the next pass: no further rename request.
    assert_eq!(sync.tick(), TickOutcome::Unchanged);
    assert_eq!(count.hits(), 2);
    assert_eq!(rename.hits(), 1);
}

#[test]
fn fetch_failure_leaves_state_untouched() {
    let server = MockServer::start();
    let _count = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/getChatMemberCount");
        then.status(502).body("bad gateway");
    });
    let rename = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/setChatTitle");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":true}"#);
    });

    let mut sync = synchronizer(&server);
    assert_eq!(sync.tick(), TickOutcome::FetchFailed);
    assert_eq!(sync.last_known(), 0);
    assert_eq!(rename.hits(), 0);

    // The loop keeps going on the next tick.
    assert_eq!(sync.tick(), TickOutcome::FetchFailed);
}

#[test]
fn non_affirmative_ack_is_not_a_success() {
    let server = MockServer::start();
    let _count = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/getChatMemberCount");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":10}"#);
    });
    let rename = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/setChatTitle");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":false}"#);
    });

    let mut sync = synchronizer(&server);
    assert_eq!(sync.tick(), TickOutcome::NotAcknowledged);

    // The count was recorded anyway, so the next pass is a no-op.
    assert_eq!(sync.tick(), TickOutcome::Unchanged);
    assert_eq!(rename.hits(), 1);
}

// The count is recorded before the rename is confirmed, so a failed
// request is not retried until the live count moves again.
#[test]
fn tick_does_not_retry_after_failed_rename() {
    let server = MockServer::start();
    let mut count = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/getChatMemberCount");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":10}"#);
    });
    let failed_rename = server.mock(|when, then| {
        when.method(POST)
            .path("/bot123:abc/setChatTitle")
            .json_body(json!({ "chat_id": CHAT_ID, "title": "readers: 10" }));
        then.status(500).body("internal error");
    });

    let mut sync = synchronizer(&server);
    assert_eq!(sync.tick(), TickOutcome::RequestFailed);
    assert_eq!(sync.last_known(), 10);

    assert_eq!(sync.tick(), TickOutcome::Unchanged);
    assert_eq!(failed_rename.hits(), 1);

    // Only a moved count triggers another rename attempt.
    count.delete();
    let _count = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/getChatMemberCount");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":11}"#);
    });
    let _rename = server.mock(|when, then| {
        when.method(POST)
            .path("/bot123:abc/setChatTitle")
            .json_body(json!({ "chat_id": CHAT_ID, "title": "readers: 11" }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":true}"#);
    });
    assert_eq!(sync.tick(), TickOutcome::Applied("readers: 11".to_string()));
}

#[test]
fn suppressor_ignores_unrelated_updates() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/deleteMessage");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":true}"#);
    });

    let suppressor = NotificationSuppressor::new(gateway(&server));
    let no_post = update(json!({ "update_id": 1 }));
    let plain_post = update(json!({
        "update_id": 2,
        "channel_post": { "message_id": 5, "chat": { "id": CHAT_ID } }
    }));
    let empty_title = update(json!({
        "update_id": 3,
        "channel_post": { "message_id": 6, "chat": { "id": CHAT_ID }, "new_chat_title": "" }
    }));

    assert_eq!(suppressor.handle_update(&no_post), SuppressAction::Ignored);
    assert_eq!(
        suppressor.handle_update(&plain_post),
        SuppressAction::Ignored
    );
    assert_eq!(
        suppressor.handle_update(&empty_title),
        SuppressAction::Ignored
    );
    assert_eq!(delete.hits(), 0);
}

#[test]
fn suppressor_deletes_exactly_the_announcing_message() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(POST)
            .path("/bot123:abc/deleteMessage")
            .json_body(json!({ "chat_id": CHAT_ID, "message_id": 777 }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":true}"#);
    });

    let suppressor = NotificationSuppressor::new(gateway(&server));
    let announcement = update(json!({
        "update_id": 4,
        "channel_post": {
            "message_id": 777,
            "chat": { "id": CHAT_ID, "title": "readers: 10" },
            "new_chat_title": "readers: 10"
        }
    }));

    assert_eq!(
        suppressor.handle_update(&announcement),
        SuppressAction::Deleted
    );
    assert_eq!(delete.hits(), 1);
}

#[test]
fn suppressor_logs_and_moves_on_when_delete_fails() {
    let server = MockServer::start();
    let _delete = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/deleteMessage");
        then.status(400)
            .header("content-type", "application/json")
            .body(r#"{"ok":false,"description":"message can't be deleted"}"#);
    });

    let suppressor = NotificationSuppressor::new(gateway(&server));
    let announcement = update(json!({
        "update_id": 5,
        "channel_post": {
            "message_id": 778,
            "chat": { "id": CHAT_ID },
            "new_chat_title": "readers: 11"
        }
    }));

    assert_eq!(
        suppressor.handle_update(&announcement),
        SuppressAction::DeleteFailed
    );
}

#[test]
fn polling_source_advances_past_delivered_updates() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(POST)
            .path("/bot123:abc/getUpdates")
            .json_body(json!({ "offset": 0, "timeout": 0 }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":[{"update_id":8}]}"#);
    });
    let second = server.mock(|when, then| {
        when.method(POST)
            .path("/bot123:abc/getUpdates")
            .json_body(json!({ "offset": 9, "timeout": 0 }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":[]}"#);
    });

    let mut source = UpdateSource::long_polling(gateway(&server), 0);
    assert_eq!(source.next_batch().len(), 1);
    assert_eq!(source.next_batch().len(), 0);
    assert_eq!(first.hits(), 1);
    assert_eq!(second.hits(), 1);
}

#[test]
fn polling_mode_never_touches_the_webhook_lifecycle() {
    let server = MockServer::start();
    let cleared = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/deleteWebhook");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":true}"#);
    });
    let registered = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/setWebhook");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":true}"#);
    });
    let _pull = server.mock(|when, then| {
        when.method(POST).path("/bot123:abc/getUpdates");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"ok":true,"result":[]}"#);
    });

    let mut source = UpdateSource::long_polling(gateway(&server), 0);
    source.next_batch();

    assert_eq!(cleared.hits(), 0);
    assert_eq!(registered.hits(), 0);
}
