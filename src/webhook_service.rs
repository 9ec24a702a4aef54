//! HTTP integration.
//!
//! This module provides a [`WebhookService`] that turns HTTP requests into
//! calls on a [`Bot`]. It is designed to be integrated into any web server
//! framework that uses standard `http` types, such as `axum` or `hyper`.
//! Binding a port and running the server stays with the application.
//!
//! - `GET` answers the subscription handshake (`hub.mode`, `hub.verify_token`,
//!   `hub.challenge`).
//! - `POST` verifies the signature, parses the body and dispatches it. Signature
//!   failures answer `401`, unsupported payloads `400`, everything else `200`
//!   whatever the handlers do.
//!
//! # Usage Example (with axum)
//!
//! ```rust,no_run
//! use messenger_bot_rs::{Bot, EventContext, EventType, MessagingItem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bot = Bot::builder()
//!         .app_secret("my_app_secret")
//!         .verify_token("my_verify_token")
//!         .on(EventType::Message, |_ctx: EventContext, item: MessagingItem| async move {
//!             println!("Received message: {:?}", item.text());
//!         })
//!         .build()
//!         .unwrap();
//!
//!     // Mount the webhook and run your server
//!     let app = bot.into_router("/webhook");
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::{borrow::Cow, collections::HashMap};

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::{
    bot::{Acknowledge, Bot},
    error::{Error, InvalidSignatureKind},
    signature::{SIGNATURE_256_HEADER, SIGNATURE_HEADER},
};

/// Largest webhook body accepted by [`WebhookService::handle`].
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

type Reply = (StatusCode, Cow<'static, str>);

/// A service handling Messenger webhook requests for one [`Bot`].
///
/// It's `Clone`, `Send`, `Sync`, and `'static`, making it suitable for use
/// as shared state in any web framework.
#[derive(Clone, Debug)]
pub struct WebhookService {
    bot: Bot,
}

impl WebhookService {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// An axum `Router` serving the webhook at `path`.
    ///
    /// A missing leading `/` is added, so `"webhook"` serves `/webhook`.
    ///
    /// # Panics
    /// Like [`Router::route`], if `path` is otherwise not a valid route, e.g.
    /// it uses the pre-0.8 `/:param` capture syntax.
    pub fn router(self, path: &str) -> Router {
        let path = if path.starts_with('/') {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("/{path}"))
        };
        Router::new()
            .route(&path, get(handle_verification).post(handle_webhook))
            .with_state(self)
    }

    /// Handles one request, whatever its path.
    ///
    /// GET requests are treated as the subscription handshake and POST
    /// requests as webhook notifications; other methods answer `405`.
    pub async fn handle<B>(&self, req: Request<B>) -> Response
    where
        B: Into<Body>,
    {
        let req = req.map(Into::into);
        match *req.method() {
            Method::GET => match Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
                Ok(Query(query)) => self.verification(&query).into_response(),
                Err(rejection) => rejection.into_response(),
            },
            Method::POST => {
                let (parts, body) = req.into_parts();
                match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
                    Ok(body) => self.webhook(&parts.headers, body).await.into_response(),
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to read webhook body");
                        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
                    }
                }
            }
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }

    fn verification(&self, query: &HashMap<String, String>) -> Reply {
        if !self.bot.has_verify_token() {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                "GET method not supported without a verify_token configured.".into(),
            );
        }

        let param = |name: &str| query.get(name).map(String::as_str).unwrap_or_default();
        match self.bot.verify_subscription(
            param("hub.mode"),
            param("hub.verify_token"),
            param("hub.challenge"),
        ) {
            Ok(challenge) => (StatusCode::OK, challenge.into()),
            Err(err) => {
                tracing::warn!(
                    mode = param("hub.mode"),
                    error = %err,
                    "webhook subscription verification rejected"
                );
                (StatusCode::FORBIDDEN, "Invalid verification token".into())
            }
        }
    }

    async fn webhook(&self, headers: &HeaderMap, body: Bytes) -> Reply {
        let request = match signature_header(headers)
            .and_then(|signature| self.bot.process(signature, &body))
        {
            Ok(request) => request,
            Err(err) if err.is_signature() => {
                tracing::warn!(error = %err, "signature verification failed");
                return (
                    StatusCode::UNAUTHORIZED,
                    "Signature verification failed".into(),
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejected webhook payload");
                return (
                    StatusCode::BAD_REQUEST,
                    "Invalid webhook payload. Please ensure the body is a page webhook.".into(),
                );
            }
        };

        match self.bot.acknowledge_mode() {
            Acknowledge::Immediately => {
                let bot = self.bot.clone();
                tokio::spawn(async move { bot.dispatch(request).await });
            }
            Acknowledge::AfterDispatch => {
                self.bot.dispatch(request).await;
            }
        }

        (StatusCode::OK, "".into())
    }
}

impl Bot {
    /// Wraps the bot in a [`WebhookService`].
    pub fn into_service(self) -> WebhookService {
        WebhookService::new(self)
    }

    /// An axum `Router` serving the bot's webhook at `path`. See
    /// [`WebhookService::router`].
    pub fn into_router(self, path: &str) -> Router {
        self.into_service().router(path)
    }
}

// Prefers the SHA-256 signature when Meta sends both headers.
fn signature_header(headers: &HeaderMap) -> Result<Option<&str>, Error> {
    let Some(value) = headers
        .get(SIGNATURE_256_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER))
    else {
        return Ok(None);
    };

    value
        .to_str()
        .map(Some)
        .map_err(|_| InvalidSignatureKind::InvalidHeader.into())
}

async fn handle_verification(
    State(service): State<WebhookService>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    service.verification(&query)
}

async fn handle_webhook(
    State(service): State<WebhookService>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    service.webhook(&headers, body).await
}
