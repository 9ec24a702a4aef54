mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::*;
use messenger_bot_rs::{
    signature::{sign, Algorithm, AppSecret},
    Acknowledge, Bot, BotBuilder, EventContext, EventType, MessagingItem,
};
use serde_json::json;
use tower::ServiceExt;

fn builder() -> BotBuilder {
    Bot::builder()
        .app_secret(APP_SECRET)
        .verify_token(VERIFY_TOKEN)
        .acknowledge(Acknowledge::AfterDispatch)
}

fn hear_logger(
    log: &Log,
    name: &'static str,
) -> impl Fn(EventContext, String, MessagingItem) -> std::future::Ready<()> + Send + Sync + 'static
{
    let log = log.clone();
    move |_ctx: EventContext, text: String, _item: MessagingItem| {
        log.lock().unwrap().push(format!("{name}:{text}"));
        std::future::ready(())
    }
}

fn on_logger(
    log: &Log,
    name: &'static str,
) -> impl Fn(EventContext, MessagingItem) -> std::future::Ready<()> + Send + Sync + 'static {
    let log = log.clone();
    move |_ctx: EventContext, item: MessagingItem| {
        log.lock().unwrap().push(format!("{name}:{}", item.sender.id));
        std::future::ready(())
    }
}

#[tokio::test]
async fn greeting_keywords_route_to_their_hooks() {
    // Arrange
    let log = Log::default();
    let app = builder()
        .hear("hi", hear_logger(&log, "hi"))
        .hear("hello", hear_logger(&log, "hello"))
        .build()
        .unwrap()
        .into_router(WEBHOOK_PATH);

    let body = page_body(vec![
        text_item(USER_ID, "HELLO"),
        text_item(USER_ID, "hi"),
        text_item(USER_ID, "hi there"),
    ]);

    // Act
    let response = app.oneshot(signed_request(body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(entries(&log), ["hello:HELLO", "hi:hi"]);
}

#[tokio::test]
async fn hook_consumes_the_message_event() {
    // Arrange
    let log = Log::default();
    let app = builder()
        .hear("hi", hear_logger(&log, "hook"))
        .on(EventType::Message, on_logger(&log, "message"))
        .build()
        .unwrap()
        .into_router(WEBHOOK_PATH);

    let body = page_body(vec![text_item("A", "Hi"), text_item("B", "what's up")]);

    // Act
    let response = app.oneshot(signed_request(body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(entries(&log), ["hook:Hi", "message:B"]);
}

#[tokio::test]
async fn postbacks_route_by_payload_id() {
    // Arrange
    let log = Log::default();
    let app = builder()
        .on(
            EventType::Postback.with_id("get-started-button"),
            on_logger(&log, "started"),
        )
        .on(EventType::Postback.with_id("MENU_HELP"), on_logger(&log, "help"))
        .on(EventType::Postback, on_logger(&log, "postback"))
        .build()
        .unwrap()
        .into_router(WEBHOOK_PATH);

    let structured = json!({
        "src": "postback-button",
        "data": { "step": 1 },
        "id": "get-started-button"
    })
    .to_string();
    let body = page_body(vec![
        postback_item("A", &structured),
        postback_item("B", "MENU_HELP"),
        postback_item("C", r#"{"src":"persistent-menu","data":null}"#),
    ]);

    // Act
    let response = app.oneshot(signed_request(body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(entries(&log), ["started:A", "help:B", "postback:C"]);
}

#[tokio::test]
async fn failing_item_does_not_stop_the_batch() {
    // Arrange
    let log = Log::default();
    let handler_log = log.clone();
    let app = builder()
        .on(EventType::Message, move |_ctx: EventContext, item: MessagingItem| {
            let log = handler_log.clone();
            async move {
                let text = item.text().unwrap_or_default().to_owned();
                if text == "second" {
                    return Err(format!("cannot handle {text}"));
                }
                log.lock().unwrap().push(text);
                Ok(())
            }
        })
        .build()
        .unwrap()
        .into_router(WEBHOOK_PATH);

    let body = page_body(vec![
        text_item(USER_ID, "first"),
        text_item(USER_ID, "second"),
        text_item(USER_ID, "third"),
    ]);

    // Act
    let response = app.oneshot(signed_request(body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(entries(&log), ["first", "third"]);
}

#[tokio::test]
async fn active_conversation_skips_hooks() {
    // Arrange
    let log = Log::default();
    let busy: Arc<str> = Arc::from("BUSY");
    let app = builder()
        .conversations(move |sender: &str| sender == &*busy)
        .hear("hi", hear_logger(&log, "hook"))
        .on(EventType::Message, on_logger(&log, "message"))
        .build()
        .unwrap()
        .into_router(WEBHOOK_PATH);

    let body = page_body(vec![text_item("BUSY", "hi"), text_item("IDLE", "hi")]);

    // Act
    let response = app.oneshot(signed_request(body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(entries(&log), ["message:BUSY", "hook:hi"]);
}

#[tokio::test]
async fn direct_receive_reports_summary() {
    // Arrange
    let log = Log::default();
    let bot = builder()
        .hear("hi", hear_logger(&log, "hook"))
        .on(EventType::Delivery, on_logger(&log, "delivery"))
        .build()
        .unwrap();

    let delivery = json!({
        "sender": { "id": USER_ID },
        "recipient": { "id": PAGE_ID },
        "timestamp": 1458668856463u64,
        "delivery": {
            "mids": ["mid.1458668856218:ed81099e15d3f4f233"],
            "watermark": 1458668856253u64,
            "seq": 37
        }
    });
    let read = json!({
        "sender": { "id": USER_ID },
        "recipient": { "id": PAGE_ID },
        "timestamp": 1458668856463u64,
        "read": { "watermark": 1458668856253u64, "seq": 38 }
    });
    let body = page_body(vec![text_item(USER_ID, "hi"), delivery, read]);
    let signature = sign(&AppSecret::from(APP_SECRET), Algorithm::Sha1, &body).unwrap();

    // Act
    let summary = bot.receive(Some(&signature), &body).await.unwrap();

    // Assert
    assert_eq!(summary.items, 3);
    assert_eq!(summary.hooks_fired, 1);
    assert_eq!(summary.events_fired, 1);
    assert_eq!(summary.unroutable, 1);
    assert_eq!(summary.failures, 0);
    assert_eq!(entries(&log), ["hook:hi".to_owned(), format!("delivery:{USER_ID}")]);
}

#[tokio::test]
async fn unenumerated_attachment_does_not_reject_the_batch() {
    // Arrange
    let log = Log::default();
    let app = builder()
        .on(EventType::Message, on_logger(&log, "message"))
        .build()
        .unwrap()
        .into_router(WEBHOOK_PATH);

    let template = json!({
        "sender": { "id": "B" },
        "recipient": { "id": PAGE_ID },
        "timestamp": 1458692752478u64,
        "message": {
            "mid": "mid.template",
            "attachments": [{
                "type": "template",
                "payload": { "template_type": "generic", "elements": [] }
            }]
        }
    });
    let body = page_body(vec![text_item("A", "one"), template, text_item("C", "three")]);

    // Act
    let response = app.oneshot(signed_request(body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(entries(&log), ["message:A", "message:B", "message:C"]);
}
