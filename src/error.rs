//! Error Handling
//!
//! This module defines the crate's error types. Request-level failures
//! (authentication, malformed envelopes) surface as [`Error`] and are mapped to
//! a rejecting HTTP status by the transport. Failures inside application
//! handlers never leave the router; they are reported as [`HandlerFailure`]
//! in the logs and counted in the dispatch summary.

use std::error::Error as StdError;

use crate::responder::EventType;

/// The **top-level error enum** for the `messenger-bot-rs` crate.
///
/// It uses `#[non_exhaustive]` to allow for future additions of error variants
/// without breaking client code.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The request carried no signature header, or the header had no digest
    /// after the `=`.
    #[error("couldn't validate the request signature, the signature header was not found")]
    MissingSignature,

    /// The request carried a signature that does not authenticate the body.
    #[error("request's signature is not valid: {0}")]
    InvalidSignature(#[from] InvalidSignatureKind),

    /// The body could not be parsed, or its envelope is not a page webhook.
    #[error("unsupported webhook payload: {0}")]
    UnsupportedPayload(#[from] UnsupportedPayloadKind),

    /// A hear hook could not be compiled into a pattern.
    #[error("failed to compile hook: {0}")]
    Hook(#[from] regex::Error),

    /// The verify-token handshake was rejected.
    #[error("webhook subscription verification failed")]
    Verification,

    /// The bot was built with an incomplete configuration.
    #[error("invalid bot configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for authentication failures (missing or invalid signature).
    pub fn is_signature(&self) -> bool {
        matches!(self, Self::MissingSignature | Self::InvalidSignature(_))
    }

    /// Returns `true` when the payload was rejected as unsupported.
    pub fn is_unsupported_payload(&self) -> bool {
        matches!(self, Self::UnsupportedPayload(_))
    }
}

/// Why a present signature failed to authenticate the body.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidSignatureKind {
    /// The header named an algorithm other than `sha1` or `sha256`.
    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// The header value is not valid visible ASCII.
    #[error("signature header is not valid ASCII")]
    InvalidHeader,

    /// The computed digest differs from the supplied one.
    ///
    /// This usually indicates an incorrect app secret or a tampered payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Why a request body was not accepted as a page webhook.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum UnsupportedPayloadKind {
    /// The body is not valid JSON for a webhook request.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The envelope's `object` discriminator is not `"page"`.
    #[error("invalid object type '{0}', expected 'page'")]
    UnexpectedObject(String),
}

/// Represents an error that occurred during **deserialization** of a webhook
/// body into the payload model.
///
/// # Fields
/// - `source`: The underlying `serde_json` failure.
/// - `body`: The original raw content that could not be parsed, useful for
///   debugging. It holds user content and is left out of the `Display` output.
#[derive(thiserror::Error, Debug)]
#[error("failed to parse the webhook body ({} bytes): {source}", .body.len())]
#[non_exhaustive]
pub struct ParseError {
    #[source]
    pub(crate) source: serde_json::Error,
    pub body: String,
}

impl ParseError {
    pub(crate) fn new(source: serde_json::Error, body: &[u8]) -> Self {
        Self {
            source,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

/// An application handler returned an error or panicked.
///
/// The router logs these and moves on to the next messaging item.
#[derive(thiserror::Error, Debug)]
#[error("{event} handler for sender '{sender}' failed: {cause}")]
#[non_exhaustive]
pub struct HandlerFailure {
    /// The registration whose handler failed.
    pub event: HandlerKind,
    /// The sender of the item being handled.
    pub sender: String,
    #[source]
    pub cause: BoxError,
}

/// Which registration produced a [`HandlerFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// A keyword/pattern hook registered with `hear`.
    Hear,
    /// An event subscription registered with `on`.
    On(EventType),
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hear => f.write_str("hear"),
            Self::On(event) => write!(f, "'{event}'"),
        }
    }
}

/// Raised in place of a handler's error when the handler panicked.
#[derive(thiserror::Error, Debug)]
#[error("handler panicked: {0}")]
pub(crate) struct HandlerPanicked(pub(crate) String);

/// A convenient type alias for a boxed, trait-object error that can be sent across threads.
///
/// Handlers may return any error convertible into this type.
pub type BoxError = Box<dyn StdError + Send + Sync>;
