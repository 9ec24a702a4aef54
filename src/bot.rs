//! Bot façade
//!
//! [`Bot`] is what application code talks to: register hear hooks and event
//! subscriptions on a [`BotBuilder`], build it once at startup, then feed it
//! raw webhook requests, either directly through [`Bot::receive`] or through
//! the HTTP adapter in [`crate::webhook_service`].
//!
//! # Example
//! ```rust
//! use messenger_bot_rs::{Bot, EventContext, EventType, MessagingItem};
//!
//! # fn example() -> Result<(), messenger_bot_rs::Error> {
//! let bot = Bot::builder()
//!     .app_secret("YOUR_APP_SECRET")
//!     .verify_token("YOUR_VERIFY_TOKEN")
//!     .hear(["hi", "hello"], |_ctx: EventContext, text: String, item: MessagingItem| async move {
//!         println!("{} greeted us with {text:?}", item.sender.id);
//!     })
//!     .on(EventType::Postback.with_id("get-started-button"), |_ctx: EventContext, item: MessagingItem| async move {
//!         println!("{} pressed Get Started", item.sender.id);
//!     })
//!     .on(EventType::Message, |_ctx: EventContext, item: MessagingItem| async move {
//!         println!("unmatched message: {:?}", item.text());
//!     })
//!     .build()?;
//! # Ok(()) }
//! ```

use std::sync::Arc;

use crate::{
    error::{Error, ParseError, UnsupportedPayloadKind},
    hook::IntoHooks,
    responder::{ConversationState, DispatchSummary, EventHandler, EventKey, HearHandler, Responder},
    signature::{verify_signature, AppSecret},
    webhook::WebhookRequest,
};

/// Environment variable read by [`BotBuilder::from_env`] for the app secret.
pub const APP_SECRET_ENV: &str = "MESSENGER_APP_SECRET";

/// Environment variable read by [`BotBuilder::from_env`] for the verify token.
pub const VERIFY_TOKEN_ENV: &str = "MESSENGER_VERIFY_TOKEN";

/// When the HTTP adapter answers a verified webhook request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Acknowledge {
    /// Answer `200 OK` right away and dispatch on a background task.
    #[default]
    Immediately,
    /// Answer once every handler of the request has completed.
    AfterDispatch,
}

/// Builder for a [`Bot`].
///
/// Registration errors are held back and reported by [`BotBuilder::build`] so
/// that calls can be chained.
#[derive(Debug, Default)]
#[must_use]
pub struct BotBuilder {
    app_secret: Option<AppSecret>,
    verify_token: Option<String>,
    acknowledge: Acknowledge,
    responder: Responder,
    error: Option<Error>,
}

impl BotBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder configured from `MESSENGER_APP_SECRET` and
    /// `MESSENGER_VERIFY_TOKEN`, when set.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        builder.app_secret = std::env::var(APP_SECRET_ENV).ok().map(AppSecret);
        builder.verify_token = std::env::var(VERIFY_TOKEN_ENV).ok();
        builder
    }

    /// Sets the app secret incoming payloads are verified against.
    ///
    /// Required: a bot never dispatches a request it could not authenticate.
    pub fn app_secret(mut self, app_secret: impl Into<AppSecret>) -> Self {
        self.app_secret = Some(app_secret.into());
        self
    }

    /// Sets the token expected in the webhook subscription handshake.
    pub fn verify_token(mut self, verify_token: impl Into<String>) -> Self {
        self.verify_token = Some(verify_token.into());
        self
    }

    /// Consults `conversations` before running hear hooks.
    pub fn conversations(mut self, conversations: impl ConversationState) -> Self {
        self.responder.conversations(conversations);
        self
    }

    /// Chooses when the HTTP adapter answers. Defaults to
    /// [`Acknowledge::Immediately`].
    pub fn acknowledge(mut self, acknowledge: Acknowledge) -> Self {
        self.acknowledge = acknowledge;
        self
    }

    /// Runs `handler` for text messages matching one of `hooks`.
    ///
    /// Hooks run before event subscriptions, in registration order, and at
    /// most one hook handles a message. See [`crate::hook`] for how keywords
    /// and patterns match.
    pub fn hear(mut self, hooks: impl IntoHooks, handler: impl HearHandler) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.responder.hear(hooks, handler).map(|_| ()) {
                self.error = Some(err);
            }
        }
        self
    }

    /// Runs `handler` for items of the given event type, optionally narrowed
    /// to an identifier with [`EventType::with_id`].
    ///
    /// [`EventType::with_id`]: crate::responder::EventType::with_id
    pub fn on(mut self, key: impl Into<EventKey>, handler: impl EventHandler) -> Self {
        self.responder.on(key, handler);
        self
    }

    /// Builds the bot.
    ///
    /// # Errors
    /// - [`Error::Hook`] for the first hook that failed to compile.
    /// - [`Error::Config`] if no app secret was set.
    pub fn build(self) -> Result<Bot, Error> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let app_secret = self
            .app_secret
            .ok_or_else(|| Error::Config("an app secret is required".to_owned()))?;

        Ok(Bot {
            inner: Arc::new(BotInner {
                responder: self.responder,
                app_secret,
                verify_token: self.verify_token,
                acknowledge: self.acknowledge,
            }),
        })
    }
}

#[derive(Debug)]
struct BotInner {
    responder: Responder,
    app_secret: AppSecret,
    verify_token: Option<String>,
    acknowledge: Acknowledge,
}

/// A configured bot. Cheap to clone; clones share the same handlers.
#[derive(Clone, Debug)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Create a bot builder
    pub fn builder() -> BotBuilder {
        BotBuilder::new()
    }

    /// The router holding this bot's handlers.
    pub fn responder(&self) -> &Responder {
        &self.inner.responder
    }

    pub fn acknowledge_mode(&self) -> Acknowledge {
        self.inner.acknowledge
    }

    /// Authenticates and parses a raw webhook body.
    ///
    /// `signature` is the value of the signature header, if present.
    ///
    /// # Errors
    /// - [`Error::MissingSignature`] / [`Error::InvalidSignature`] if the body
    ///   is not authenticated; it is never parsed in that case.
    /// - [`Error::UnsupportedPayload`] if the body is not a page webhook.
    pub fn process(&self, signature: Option<&str>, body: &[u8]) -> Result<WebhookRequest, Error> {
        verify_signature(&self.inner.app_secret, signature, body)?;

        let request: WebhookRequest = serde_json::from_slice(body)
            .map_err(|err| UnsupportedPayloadKind::Parse(ParseError::new(err, body)))?;
        request.ensure_page()?;

        Ok(request)
    }

    /// Dispatches an already verified request to the registered handlers.
    pub async fn dispatch(&self, request: WebhookRequest) -> DispatchSummary {
        self.inner.responder.dispatch(request).await
    }

    /// [`Bot::process`] followed by [`Bot::dispatch`].
    pub async fn receive(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<DispatchSummary, Error> {
        let request = self.process(signature, body)?;
        Ok(self.dispatch(request).await)
    }

    /// Answers the webhook subscription handshake.
    ///
    /// Returns the challenge to echo back when `mode` is `subscribe` and
    /// `token` equals the configured verify token.
    ///
    /// # Errors
    /// - [`Error::Config`] if no verify token was configured.
    /// - [`Error::Verification`] if the mode or token do not match.
    pub fn verify_subscription(
        &self,
        mode: &str,
        token: &str,
        challenge: &str,
    ) -> Result<String, Error> {
        let expected = self
            .inner
            .verify_token
            .as_deref()
            .ok_or_else(|| Error::Config("no verify token configured".to_owned()))?;

        if mode == "subscribe" && token == expected {
            Ok(challenge.to_owned())
        } else {
            Err(Error::Verification)
        }
    }

    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    pub(crate) fn has_verify_token(&self) -> bool {
        self.inner.verify_token.is_some()
    }
}
