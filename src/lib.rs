// #![deny(missing_docs)]
#![deny(clippy::future_not_send)]
#![deny(clippy::large_enum_variant)]

//! # messenger_bot_rs
//!
//! Receive Messenger Platform webhooks in Rust. This crate authenticates
//! incoming notifications, parses them into typed payloads and routes them to
//! your async handlers.
//!
//! ## ✨ Features
//!
//! - **Signature Verification**: Every request body is checked against your app
//!   secret (`X-Hub-Signature` / `X-Hub-Signature-256`) before it is parsed.
//! - **Typed Payloads**: Messages, attachments, quick replies, echoes, postbacks,
//!   referrals, deliveries, reads and plugin opt-ins as closed Rust enums.
//! - **Hear Hooks**: React to keywords (whole message, any case) or regular
//!   expressions. Hooks run before event handlers and at most one fires per
//!   message.
//! - **Event Handlers**: Subscribe to an event type, optionally narrowed to an
//!   identifier such as a postback button or a persistent menu item.
//! - **Isolation**: A failing or panicking handler never stops the rest of the
//!   batch from being dispatched, in order.
//! - **HTTP Integration**: Mount the webhook on an `axum` router, or call
//!   [`WebhookService::handle`] from any `http`-compatible server.
//!
//! ## 🚀 Example
//!
//! ```rust,no_run
//! use messenger_bot_rs::{Bot, EventContext, EventType, Hook, MessagingItem};
//! use regex::Regex;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bot = Bot::builder()
//!     .app_secret("YOUR_APP_SECRET")
//!     .verify_token("YOUR_VERIFY_TOKEN")
//!     // Keywords and patterns can be mixed
//!     .hear(
//!         [Hook::from("help"), Hook::from(Regex::new(r"^(?i)support\b")?)],
//!         |_ctx: EventContext, text: String, item: MessagingItem| async move {
//!             println!("{} needs help: {text}", item.sender.id);
//!         },
//!     )
//!     // A postback whose payload carries `"id": "get-started"`
//!     .on(
//!         EventType::Postback.with_id("get-started"),
//!         |_ctx: EventContext, item: MessagingItem| async move {
//!             println!("welcome {}", item.sender.id);
//!         },
//!     )
//!     // Handlers may fail; failures are logged and the batch goes on
//!     .on(EventType::Delivery, |_ctx: EventContext, _item: MessagingItem| async move {
//!         Err::<(), _>("delivery tracking is down")
//!     })
//!     .build()?;
//!
//! # #[cfg(feature = "server")]
//! # {
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, bot.into_router("/webhook")).await?;
//! # }
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: rejected requests and handler failures
//! at `warn`, signature checks and dispatch summaries at `debug`, dropped items
//! at `trace`. Install any `tracing` subscriber to see them.

pub mod bot;
pub mod error;
pub mod hook;
pub mod responder;
pub mod signature;
pub mod webhook;
#[cfg(feature = "server")]
pub mod webhook_service;

pub use bot::{Acknowledge, Bot, BotBuilder};
pub use error::{BoxError, Error};
pub use hook::Hook;
pub use responder::{ConversationState, DispatchSummary, EventContext, EventKey, EventType};
pub use signature::AppSecret;
pub use webhook::{MessagingEvent, MessagingItem, WebhookRequest};
#[cfg(feature = "server")]
pub use webhook_service::WebhookService;
