use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, Response},
};
use messenger_bot_rs::signature::{sign, Algorithm, AppSecret, SIGNATURE_256_HEADER};
use serde_json::{json, Value};

// --- CONSTANTS ---
#[allow(dead_code)]
pub const APP_SECRET: &str = "a1b2c3d4e5f6";
#[allow(dead_code)]
pub const VERIFY_TOKEN: &str = "verify_me_please";
#[allow(dead_code)]
pub const PAGE_ID: &str = "106201754209851";
#[allow(dead_code)]
pub const USER_ID: &str = "5744180662310959";
#[allow(dead_code)]
pub const WEBHOOK_PATH: &str = "/webhook";

// --- HANDLER LOG ---

/// Shared record of which handlers ran, in order.
#[allow(dead_code)]
pub type Log = Arc<Mutex<Vec<String>>>;

#[allow(dead_code)]
pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// --- PAYLOAD BUILDERS ---

/// A page webhook body with one entry holding `messaging`.
#[allow(dead_code)]
pub fn page_body(messaging: Vec<Value>) -> Vec<u8> {
    object_body("page", messaging)
}

#[allow(dead_code)]
pub fn object_body(object: &str, messaging: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "object": object,
        "entry": [{
            "id": PAGE_ID,
            "time": 1458692752478u64,
            "messaging": messaging
        }]
    }))
    .unwrap()
}

#[allow(dead_code)]
pub fn text_item(sender: &str, text: &str) -> Value {
    json!({
        "sender": { "id": sender },
        "recipient": { "id": PAGE_ID },
        "timestamp": 1458692752478u64,
        "message": {
            "mid": format!("mid.{sender}.{text}"),
            "text": text
        }
    })
}

#[allow(dead_code)]
pub fn postback_item(sender: &str, payload: &str) -> Value {
    json!({
        "sender": { "id": sender },
        "recipient": { "id": PAGE_ID },
        "timestamp": 1458692752478u64,
        "postback": {
            "title": "Get Started",
            "payload": payload
        }
    })
}

// --- REQUEST HELPERS ---

/// A POST to the webhook path signed with [`APP_SECRET`].
#[allow(dead_code)]
pub fn signed_request(body: Vec<u8>) -> Request<Body> {
    let signature = sign(&AppSecret::from(APP_SECRET), Algorithm::Sha256, &body).unwrap();
    Request::post(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .header(SIGNATURE_256_HEADER, signature)
        .body(Body::from(body))
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
