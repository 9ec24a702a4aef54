//! Messenger webhook payload model
//!
//! Typed representation of every notification shape the Messenger Platform
//! pushes to a page webhook. A request is parsed once into a
//! [`WebhookRequest`], dispatched, then dropped.
//!
//! Optional fields are `Option`s that are omitted again on serialization, so
//! parsing and re-serializing a request does not invent values that were not
//! on the wire.
//!
//! # Example
//! ```rust
//! use messenger_bot_rs::webhook::{MessagingEvent, WebhookRequest};
//!
//! let body = r#"{
//!     "object": "page",
//!     "entry": [{
//!         "id": "PAGE_ID",
//!         "time": 1458692752478,
//!         "messaging": [{
//!             "sender": { "id": "USER_ID" },
//!             "recipient": { "id": "PAGE_ID" },
//!             "timestamp": 1458692752478,
//!             "message": { "mid": "mid.1457764197618:41d102a3e1ae206a38", "text": "hello" }
//!         }]
//!     }]
//! }"#;
//!
//! let request: WebhookRequest = serde_json::from_str(body).unwrap();
//! let item = &request.entry[0].messaging()[0];
//! assert!(matches!(item.event, MessagingEvent::Message(_)));
//! assert_eq!(item.text(), Some("hello"));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, UnsupportedPayloadKind};

/// The `object` discriminator carried by every page webhook.
pub const PAGE_OBJECT: &str = "page";

/// Milliseconds since the Unix epoch, as used throughout the Messenger webhook.
#[derive(Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
#[serde(transparent)]
pub struct Timestamp {
    pub(crate) inner: i64,
}

impl Timestamp {
    /// Creates a timestamp from epoch milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self { inner: millis }
    }

    /// Epoch milliseconds.
    pub fn millis(&self) -> i64 {
        self.inner
    }
}

/// Top-level webhook envelope.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct WebhookRequest {
    /// Always `"page"` for Messenger webhooks.
    pub object: String,

    /// Entries batched into this request, in platform order.
    pub entry: Vec<MessageEntry>,
}

impl WebhookRequest {
    /// Checks the `object` discriminator.
    ///
    /// # Errors
    /// [`Error::UnsupportedPayload`] when `object` is anything but `"page"`.
    pub fn ensure_page(&self) -> Result<(), Error> {
        if self.object == PAGE_OBJECT {
            Ok(())
        } else {
            Err(UnsupportedPayloadKind::UnexpectedObject(self.object.clone()).into())
        }
    }

    /// Iterates over every messaging item of every entry, in order.
    pub fn items(&self) -> impl Iterator<Item = (&MessageEntry, &MessagingItem)> {
        self.entry
            .iter()
            .flat_map(|entry| entry.messaging().iter().map(move |item| (entry, item)))
    }
}

/// One page's batch of messaging items.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct MessageEntry {
    /// Page ID.
    pub id: String,

    /// When the batch was sent.
    pub time: Timestamp,

    /// Absent for entries that only carry other webhook fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging: Option<Vec<MessagingItem>>,
}

impl MessageEntry {
    /// The entry's messaging items, empty when the key was absent.
    pub fn messaging(&self) -> &[MessagingItem] {
        self.messaging.as_deref().unwrap_or_default()
    }
}

/// A user or page ID.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Participant {
    pub id: String,
}

/// A single notification addressed to the page.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(from = "RawMessagingItem", into = "RawMessagingItem")]
pub struct MessagingItem {
    /// The user (or, for echoes, the page) who triggered the event.
    pub sender: Participant,

    pub recipient: Participant,

    pub timestamp: Timestamp,

    /// The populated payload.
    pub event: MessagingEvent,
}

impl MessagingItem {
    /// The text of a message item, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.event {
            MessagingEvent::Message(message) => message.text.as_deref(),
            _ => None,
        }
    }

    /// The message payload, if this is a message item.
    pub fn message(&self) -> Option<&Message> {
        match &self.event {
            MessagingEvent::Message(message) => Some(message),
            _ => None,
        }
    }

    /// The postback payload, if this is a postback item.
    pub fn postback(&self) -> Option<&Postback> {
        match &self.event {
            MessagingEvent::Postback(postback) => Some(postback),
            _ => None,
        }
    }
}

/// The payload kinds a [`MessagingItem`] can carry.
#[allow(clippy::large_enum_variant)]
#[derive(PartialEq, Clone, Debug)]
pub enum MessagingEvent {
    Message(Message),
    Postback(Postback),
    Delivery(DeliveryInfo),
    Read(ReadInfo),
    Optin(PluginOptin),
    Referral(Referral),
    /// None of the known payload keys was present.
    Unknown,
}

// Wire shape: the payload kinds are sibling keys next to sender/recipient.
#[derive(Serialize, Deserialize)]
struct RawMessagingItem {
    sender: Participant,
    recipient: Participant,
    timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    postback: Option<Postback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delivery: Option<DeliveryInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    read: Option<ReadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optin: Option<PluginOptin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    referral: Option<Referral>,
}

impl From<RawMessagingItem> for MessagingItem {
    fn from(raw: RawMessagingItem) -> Self {
        let event = if let Some(message) = raw.message {
            MessagingEvent::Message(message)
        } else if let Some(postback) = raw.postback {
            MessagingEvent::Postback(postback)
        } else if let Some(delivery) = raw.delivery {
            MessagingEvent::Delivery(delivery)
        } else if let Some(read) = raw.read {
            MessagingEvent::Read(read)
        } else if let Some(optin) = raw.optin {
            MessagingEvent::Optin(optin)
        } else if let Some(referral) = raw.referral {
            MessagingEvent::Referral(referral)
        } else {
            MessagingEvent::Unknown
        };

        Self {
            sender: raw.sender,
            recipient: raw.recipient,
            timestamp: raw.timestamp,
            event,
        }
    }
}

impl From<MessagingItem> for RawMessagingItem {
    fn from(item: MessagingItem) -> Self {
        let mut raw = RawMessagingItem {
            sender: item.sender,
            recipient: item.recipient,
            timestamp: item.timestamp,
            message: None,
            postback: None,
            delivery: None,
            read: None,
            optin: None,
            referral: None,
        };
        match item.event {
            MessagingEvent::Message(message) => raw.message = Some(message),
            MessagingEvent::Postback(postback) => raw.postback = Some(postback),
            MessagingEvent::Delivery(delivery) => raw.delivery = Some(delivery),
            MessagingEvent::Read(read) => raw.read = Some(read),
            MessagingEvent::Optin(optin) => raw.optin = Some(optin),
            MessagingEvent::Referral(referral) => raw.referral = Some(referral),
            MessagingEvent::Unknown => {}
        }
        raw
    }
}

/// A message sent to (or, when echoed, by) the page.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Message {
    /// Unique message ID.
    pub mid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_reply: Option<QuickReply>,

    /// Set when the message was sent by the page and reflected back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_echo: Option<bool>,

    /// App that sent an echoed message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<u64>,

    /// Custom metadata attached by the sending app of an echoed message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl Message {
    /// If the message originated from the page rather than the user.
    #[inline]
    pub fn is_echo(&self) -> bool {
        self.is_echo.unwrap_or(false)
    }
}

/// A message attachment, tagged by its `type`.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(from = "RawAttachment", into = "RawAttachment")]
#[non_exhaustive]
pub enum Attachment {
    Image(MediaAttachment),
    Audio(MediaAttachment),
    Video(MediaAttachment),
    File(MediaAttachment),
    Location(LocationAttachment),
    /// An attachment the platform could not resolve, e.g. an expired share.
    Fallback(FallbackAttachment),
    /// Any attachment not enumerated (`template`, `story_mention`, ...), or a
    /// known one whose shape did not match. Kept as sent.
    Other(serde_json::Value),
}

// Unknown or unexpected attachments must not fail the whole request.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawAttachment {
    Known(KnownAttachment),
    Other(serde_json::Value),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownAttachment {
    Image(MediaAttachment),
    Audio(MediaAttachment),
    Video(MediaAttachment),
    File(MediaAttachment),
    Location(LocationAttachment),
    Fallback(FallbackAttachment),
}

impl From<RawAttachment> for Attachment {
    fn from(raw: RawAttachment) -> Self {
        match raw {
            RawAttachment::Known(KnownAttachment::Image(media)) => Self::Image(media),
            RawAttachment::Known(KnownAttachment::Audio(media)) => Self::Audio(media),
            RawAttachment::Known(KnownAttachment::Video(media)) => Self::Video(media),
            RawAttachment::Known(KnownAttachment::File(media)) => Self::File(media),
            RawAttachment::Known(KnownAttachment::Location(location)) => Self::Location(location),
            RawAttachment::Known(KnownAttachment::Fallback(fallback)) => Self::Fallback(fallback),
            RawAttachment::Other(value) => Self::Other(value),
        }
    }
}

impl From<Attachment> for RawAttachment {
    fn from(attachment: Attachment) -> Self {
        let known = match attachment {
            Attachment::Image(media) => KnownAttachment::Image(media),
            Attachment::Audio(media) => KnownAttachment::Audio(media),
            Attachment::Video(media) => KnownAttachment::Video(media),
            Attachment::File(media) => KnownAttachment::File(media),
            Attachment::Location(location) => KnownAttachment::Location(location),
            Attachment::Fallback(fallback) => KnownAttachment::Fallback(fallback),
            Attachment::Other(value) => return Self::Other(value),
        };
        Self::Known(known)
    }
}

impl Attachment {
    /// The kind of media behind a media attachment.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Image(_) => Some(MediaKind::Image),
            Self::Audio(_) => Some(MediaKind::Audio),
            Self::Video(_) => Some(MediaKind::Video),
            Self::File(_) => Some(MediaKind::File),
            Self::Location(_) | Self::Fallback(_) | Self::Other(_) => None,
        }
    }

    /// The media attachment, for image/audio/video/file attachments.
    pub fn as_media(&self) -> Option<&MediaAttachment> {
        match self {
            Self::Image(media) | Self::Audio(media) | Self::Video(media) | Self::File(media) => {
                Some(media)
            }
            Self::Location(_) | Self::Fallback(_) | Self::Other(_) => None,
        }
    }
}

/// Media attachment types.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    File,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct MediaAttachment {
    pub payload: MediaPayload,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct MediaPayload {
    pub url: String,

    /// Set on image attachments that are stickers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_id: Option<u64>,
}

/// A shared location.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct LocationAttachment {
    pub payload: LocationPayload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct LocationPayload {
    pub coordinates: Coordinates,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Copy, Debug)]
pub struct Coordinates {
    pub lat: f64,
    pub long: f64,
}

/// The platform gives no guarantee about what a fallback carries.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct FallbackAttachment {
    /// `Some(Value::Null)` when the platform sent `"payload": null`, `None`
    /// when it sent no payload at all.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// The quick reply button a user tapped.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct QuickReply {
    /// Opaque payload set by the app when sending the quick reply.
    pub payload: String,
}

impl QuickReply {
    /// Decodes the payload following the `{"data": .., "id": ..}` convention.
    ///
    /// Returns `None` when the payload is not such a JSON object.
    pub fn decode(&self) -> Option<QuickReplyPayload> {
        serde_json::from_str(&self.payload).ok()
    }
}

/// Conventional structure of a quick reply payload.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct QuickReplyPayload {
    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A postback triggered by a button, the Get Started button or a persistent
/// menu item.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Postback {
    /// Opaque payload set by the app on the button.
    pub payload: String,

    /// Title of the button that was tapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Present when the user entered the thread through a referral.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<Referral>,
}

impl Postback {
    /// Decodes the payload following the `{"src": .., "data": .., "id": ..}`
    /// convention.
    ///
    /// Returns `None` when the payload is not such a JSON object.
    pub fn decode(&self) -> Option<PostbackPayload> {
        serde_json::from_str(&self.payload).ok()
    }
}

/// Conventional structure of a postback payload.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct PostbackPayload {
    pub src: PostbackSource,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Where a postback originated.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum PostbackSource {
    GetStartedButton,
    PostbackButton,
    PersistentMenu,
    /// Any source not enumerated
    #[serde(untagged)]
    Other(String),
}

/// How the user reached the thread.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Referral {
    /// The `ref` parameter of the link, code or ad.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,

    pub source: ReferralSource,

    pub r#type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ReferralSource {
    Shortlink,
    Ads,
    MessengerCode,
    DiscoverTab,
    /// Any source not enumerated
    #[serde(untagged)]
    Other(String),
}

/// Messages up to `watermark` were delivered.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct DeliveryInfo {
    /// IDs of the delivered messages, when the platform knows them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mids: Option<Vec<String>>,

    pub watermark: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

/// Messages up to `watermark` were read.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct ReadInfo {
    pub watermark: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

/// A "Send to Messenger" or checkbox plugin opt-in.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct PluginOptin {
    /// The `data-ref` the plugin was rendered with.
    #[serde(rename = "ref")]
    pub r#ref: String,

    /// Set by the checkbox plugin instead of a sender ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<String>,
}
