//! Error types for the publish pipeline.
//!
//! Failures are split by where they happen:
//!
//! - [`ValidationError`], serialization and encryption errors are raised
//!   before anything touches the network
//! - [`TransportError`] covers the dispatcher: connect, timeout, non-2xx
//! - [`ServiceError`] is a well-formed rejection from the service

use std::fmt;

use pubwire_core::{CryptoError, SerializationError};
use pubwire_protocol::ServiceError;
use thiserror::Error;

/// A specialized Result type for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// A required field of the publish call is missing, empty or unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ValidationError {
    #[error("publish key is missing or empty")]
    MissingPublishKey,
    #[error("subscribe key is missing or empty")]
    MissingSubscribeKey,
    #[error("channel is missing or empty")]
    MissingChannel,
    #[error("channel {0:?} is not a valid path segment")]
    InvalidChannel(&'static str),
    #[error("message is missing")]
    MissingMessage,
}

/// Any failure of a publish call.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid publish request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("payload encryption failed: {0}")]
    Encryption(#[from] CryptoError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("publish was cancelled")]
    Cancelled,
}

impl PublishError {
    /// Returns true if the error was raised before any request was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Serialization(_) | Self::Encryption(_)
        )
    }

    /// Returns the validation failure, if that is what this is.
    pub fn as_validation(&self) -> Option<ValidationError> {
        match self {
            Self::Validation(err) => Some(*err),
            _ => None,
        }
    }
}

/// The category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// No connection could be established.
    Connect,
    /// The service answered with a non-2xx status and no decodable body.
    Status(u16),
    /// The request could not be built or sent.
    Request,
    /// The response body could not be read.
    Body,
}

impl TransportErrorKind {
    /// Returns true if this failure is transient.
    ///
    /// The pipeline never retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect => true,
            Self::Status(status) => *status == 429 || (500..600).contains(status),
            Self::Request | Self::Body => false,
        }
    }

    /// Returns a short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Status(_) => "status",
            Self::Request => "request",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "status {}", status),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A failure reported by a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Creates a connection error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Creates an error for an unexpected HTTP status.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Status(status), body)
    }

    /// Creates an error for a request that could not be sent.
    pub fn request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Request, message)
    }

    /// Creates an error for an unreadable response body.
    pub fn body(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Body, message)
    }

    /// Sets the underlying cause.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status, for [`TransportErrorKind::Status`].
    pub fn http_status(&self) -> Option<u16> {
        match self.kind {
            TransportErrorKind::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Returns true if this failure is transient.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error ({}): {}", self.kind, self.message)
    }
}
