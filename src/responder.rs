//! Event routing
//!
//! The [`Responder`] owns the hear-hook table and the event subscription
//! table and decides, for every messaging item of a verified request, which
//! handler runs.
//!
//! For each item, in platform order:
//! 1. A non-echo text message from a sender outside an active conversation is
//!    tested against the hear hooks in registration order. The first hook
//!    with a matching pattern handles the item and nothing else runs for it.
//! 2. Otherwise the item's [`EventType`] and optional sub-identifier are
//!    resolved, and the subscription for `type + id` runs, falling back to
//!    the subscription for the bare `type`.
//! 3. Items nobody subscribed to are dropped.
//!
//! Handler errors and panics are logged and counted; they never stop the
//! remaining items from being dispatched.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    future::Future,
    panic::AssertUnwindSafe,
    str::FromStr,
};

use futures::{future::BoxFuture, FutureExt};
use regex::Regex;

use crate::{
    error::{BoxError, Error, HandlerFailure, HandlerKind, HandlerPanicked},
    hook::{self, IntoHooks},
    webhook::{MessagingEvent, MessagingItem, Timestamp, WebhookRequest},
};

/// Kinds of events a handler can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventType {
    /// A message sent by a user.
    Message,
    /// A message sent by the page, reflected back.
    Echo,
    Postback,
    Delivery,
    Read,
    Optin,
    Referral,
}

impl EventType {
    /// Every event type, in wire-name order.
    pub const ALL: [EventType; 7] = [
        Self::Message,
        Self::Echo,
        Self::Postback,
        Self::Delivery,
        Self::Read,
        Self::Optin,
        Self::Referral,
    ];

    /// The event's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Echo => "echo",
            Self::Postback => "postback",
            Self::Delivery => "delivery",
            Self::Read => "read",
            Self::Optin => "optin",
            Self::Referral => "referral",
        }
    }

    /// Scopes a subscription to items of this type carrying `id`.
    ///
    /// # Example
    /// ```rust
    /// use messenger_bot_rs::responder::EventType;
    ///
    /// let key = EventType::Postback.with_id("get-started-button");
    /// assert_eq!(key.id.as_deref(), Some("get-started-button"));
    /// ```
    pub fn with_id(self, id: impl Into<String>) -> EventKey {
        EventKey {
            event: self,
            id: Some(id.into()),
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown event type '{s}'")))
    }
}

/// What a subscription is registered for: an event type, optionally narrowed
/// to one identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub event: EventType,
    pub id: Option<String>,
}

impl From<EventType> for EventKey {
    fn from(event: EventType) -> Self {
        Self { event, id: None }
    }
}

impl<S: Into<String>> From<(EventType, S)> for EventKey {
    fn from((event, id): (EventType, S)) -> Self {
        event.with_id(id)
    }
}

/// Where an item came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub(crate) page_id: String,
    pub(crate) time: Timestamp,
}

impl EventContext {
    /// ID of the page the entry belongs to.
    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// When the platform sent the entry.
    pub fn time(&self) -> Timestamp {
        self.time
    }
}

/// Values a handler may complete with.
///
/// `()` always succeeds; `Err` values are reported as handler failures.
pub trait HandlerOutput: Send {
    fn into_result(self) -> Result<(), BoxError>;
}

impl HandlerOutput for () {
    #[inline]
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E: Into<BoxError> + Send> HandlerOutput for Result<(), E> {
    #[inline]
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

/// Handler for a hear hook.
///
/// Implemented for every `Fn(EventContext, String, MessagingItem) -> impl Future`
/// whose output is a [`HandlerOutput`]. The `String` is the matched text.
pub trait HearHandler: Send + Sync + 'static {
    fn call(
        &self,
        ctx: EventContext,
        text: String,
        item: MessagingItem,
    ) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut> HearHandler for F
where
    F: Fn(EventContext, String, MessagingItem) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerOutput,
{
    fn call(
        &self,
        ctx: EventContext,
        text: String,
        item: MessagingItem,
    ) -> BoxFuture<'static, Result<(), BoxError>> {
        let fut = self(ctx, text, item);
        Box::pin(async move { fut.await.into_result() })
    }
}

/// Handler for an event subscription.
///
/// Implemented for every `Fn(EventContext, MessagingItem) -> impl Future`
/// whose output is a [`HandlerOutput`].
pub trait EventHandler: Send + Sync + 'static {
    fn call(
        &self,
        ctx: EventContext,
        item: MessagingItem,
    ) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(EventContext, MessagingItem) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerOutput,
{
    fn call(
        &self,
        ctx: EventContext,
        item: MessagingItem,
    ) -> BoxFuture<'static, Result<(), BoxError>> {
        let fut = self(ctx, item);
        Box::pin(async move { fut.await.into_result() })
    }
}

/// Tells the router whether a sender is in the middle of a multi-turn flow.
///
/// Hear hooks are skipped for senders with an active conversation; event
/// subscriptions still run. Implemented for `Fn(&str) -> bool` closures.
pub trait ConversationState: Send + Sync + 'static {
    fn is_active(&self, sender_id: &str) -> bool;
}

impl<F> ConversationState for F
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    #[inline]
    fn is_active(&self, sender_id: &str) -> bool {
        self(sender_id)
    }
}

/// No sender is ever in an active conversation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoConversations;

impl ConversationState for NoConversations {
    #[inline]
    fn is_active(&self, _sender_id: &str) -> bool {
        false
    }
}

/// What a dispatch pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct DispatchSummary {
    /// Messaging items seen.
    pub items: usize,
    /// Items handled by a hear hook.
    pub hooks_fired: usize,
    /// Items handled by an event subscription.
    pub events_fired: usize,
    /// Items no handler was registered for.
    pub unroutable: usize,
    /// Handlers that returned an error or panicked.
    pub failures: usize,
}

struct HearHook {
    patterns: Vec<Regex>,
    handler: Box<dyn HearHandler>,
}

#[derive(Default)]
struct Subscription {
    any: Option<Box<dyn EventHandler>>,
    by_id: HashMap<String, Box<dyn EventHandler>>,
}

/// The hook and subscription tables plus the dispatch algorithm.
///
/// Register everything before the first dispatch; a `Responder` is shared
/// read-only across concurrent requests afterwards.
pub struct Responder {
    hooks: Vec<HearHook>,
    subscriptions: HashMap<EventType, Subscription>,
    conversations: Box<dyn ConversationState>,
}

impl Default for Responder {
    fn default() -> Self {
        Self {
            hooks: Vec::new(),
            subscriptions: HashMap::new(),
            conversations: Box::new(NoConversations),
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("hooks", &self.hooks.len())
            .field(
                "subscriptions",
                &self
                    .subscriptions
                    .iter()
                    .map(|(event, sub)| (event, sub.any.is_some(), sub.by_id.len()))
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Responder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source of active-conversation state.
    pub fn conversations(&mut self, conversations: impl ConversationState) -> &mut Self {
        self.conversations = Box::new(conversations);
        self
    }

    /// Registers a hear hook.
    ///
    /// # Errors
    /// [`Error::Hook`] if a keyword cannot be compiled.
    pub fn hear(
        &mut self,
        hooks: impl IntoHooks,
        handler: impl HearHandler,
    ) -> Result<&mut Self, Error> {
        let patterns = hook::compile(hooks)?;
        self.hooks.push(HearHook {
            patterns,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    /// Registers an event subscription, replacing any previous one for the
    /// same key.
    pub fn on(&mut self, key: impl Into<EventKey>, handler: impl EventHandler) -> &mut Self {
        let EventKey { event, id } = key.into();
        let subscription = self.subscriptions.entry(event).or_default();
        let replaced = match id {
            Some(id) => subscription.by_id.insert(id, Box::new(handler)).is_some(),
            None => subscription.any.replace(Box::new(handler)).is_some(),
        };
        if replaced {
            tracing::warn!(event = %event, "replaced an existing event subscription");
        }
        self
    }

    /// Dispatches every messaging item of `request`, entry by entry and item
    /// by item, waiting for each handler before moving to the next.
    pub async fn dispatch(&self, request: WebhookRequest) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for entry in request.entry {
            let ctx = EventContext {
                page_id: entry.id,
                time: entry.time,
            };
            for item in entry.messaging.into_iter().flatten() {
                summary.items += 1;
                self.dispatch_item(ctx.clone(), item, &mut summary).await;
            }
        }

        tracing::debug!(
            items = summary.items,
            hooks_fired = summary.hooks_fired,
            events_fired = summary.events_fired,
            unroutable = summary.unroutable,
            failures = summary.failures,
            "dispatch finished"
        );
        summary
    }

    async fn dispatch_item(
        &self,
        ctx: EventContext,
        item: MessagingItem,
        summary: &mut DispatchSummary,
    ) {
        let sender = item.sender.id.clone();

        if let Some((hook, text)) = self.find_hook(&item) {
            summary.hooks_fired += 1;
            tracing::trace!(sender = %sender, "hear hook matched");
            let outcome = invoke(hook.handler.call(ctx, text, item)).await;
            report(outcome, HandlerKind::Hear, sender, summary);
            return;
        }

        let Some((event, id)) = identify(&item) else {
            summary.unroutable += 1;
            tracing::trace!(sender = %sender, "unrecognized messaging item dropped");
            return;
        };

        match self.lookup(event, id.as_deref()) {
            Some(handler) => {
                summary.events_fired += 1;
                let outcome = invoke(handler.call(ctx, item)).await;
                report(outcome, HandlerKind::On(event), sender, summary);
            }
            None => {
                summary.unroutable += 1;
                tracing::trace!(event = %event, id = ?id, sender = %sender, "no handler for item");
            }
        }
    }

    fn find_hook(&self, item: &MessagingItem) -> Option<(&HearHook, String)> {
        let message = item.message()?;
        if message.is_echo() {
            return None;
        }
        let text = message.text.as_deref().filter(|text| !text.is_empty())?;
        if self.conversations.is_active(&item.sender.id) {
            return None;
        }

        self.hooks
            .iter()
            .find(|hook| hook.patterns.iter().any(|pattern| pattern.is_match(text)))
            .map(|hook| (hook, text.to_owned()))
    }

    fn lookup(&self, event: EventType, id: Option<&str>) -> Option<&dyn EventHandler> {
        let subscription = self.subscriptions.get(&event)?;
        id.and_then(|id| subscription.by_id.get(id))
            .or(subscription.any.as_ref())
            .map(|handler| &**handler)
    }
}

/// Resolves the event type and sub-identifier of an item.
fn identify(item: &MessagingItem) -> Option<(EventType, Option<String>)> {
    match &item.event {
        MessagingEvent::Message(message) if message.is_echo() => Some((EventType::Echo, None)),
        MessagingEvent::Message(message) => Some((
            EventType::Message,
            message
                .quick_reply
                .as_ref()
                .and_then(|reply| payload_id(&reply.payload)),
        )),
        MessagingEvent::Postback(postback) => {
            Some((EventType::Postback, payload_id(&postback.payload)))
        }
        MessagingEvent::Delivery(_) => Some((EventType::Delivery, None)),
        MessagingEvent::Read(_) => Some((EventType::Read, None)),
        MessagingEvent::Optin(optin) => Some((EventType::Optin, Some(optin.r#ref.clone()))),
        MessagingEvent::Referral(referral) => Some((EventType::Referral, referral.r#ref.clone())),
        MessagingEvent::Unknown => None,
    }
}

/// The `id` of a JSON object payload, or the payload itself when it is not a
/// JSON object.
fn payload_id(payload: &str) -> Option<String> {
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(object)) => object
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned),
        _ => Some(payload.to_owned()),
    }
}

async fn invoke(fut: BoxFuture<'static, Result<(), BoxError>>) -> Result<(), BoxError> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            Err(Box::new(HandlerPanicked(message)))
        }
    }
}

fn report(
    outcome: Result<(), BoxError>,
    kind: HandlerKind,
    sender: String,
    summary: &mut DispatchSummary,
) {
    if let Err(cause) = outcome {
        summary.failures += 1;
        let failure = HandlerFailure {
            event: kind,
            sender,
            cause,
        };
        tracing::warn!(
            event = %failure.event,
            sender = %failure.sender,
            error = %failure,
            "handler failed"
        );
    }
}
