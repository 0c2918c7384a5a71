//! The publish pipeline.
//!
//! ```text
//! PublishBuilder -> validate -> serialize -> encrypt -> seqn -> HttpRequest
//!                -> Dispatcher -> decode -> PublishResponse
//! ```
//!
//! Everything up to the [`HttpRequest`] runs on the caller's thread, so
//! validation and serialization failures are reported synchronously in
//! every mode.

use std::sync::Arc;

use pubwire_core::{
    Cipher, ClientConfig, SerializationError, SerializationResult, ToRecord, Value,
    encrypt_payload,
};
use pubwire_protocol::{
    HttpMethod, HttpRequest, HttpResponse, PUBLISH_PATH_PREFIX, PublishResponse,
    decode_error_body, decode_publish_response,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::PubSubClient;
use crate::dispatcher::Dispatcher;
use crate::error::{PublishError, PublishResult, TransportError, ValidationError};
use crate::task::{self, CancelHandle, PublishTask};

/// The options of one publish call, frozen.
///
/// Message and metadata keep their serialization outcome so that a value
/// which failed to convert still counts as present during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    channel: String,
    message: Option<SerializationResult<Value>>,
    meta: Option<SerializationResult<Value>>,
    should_store: Option<bool>,
    replicate: bool,
    use_post: bool,
    ttl: Option<u32>,
}

impl Default for PublishRequest {
    fn default() -> Self {
        Self {
            channel: String::new(),
            message: None,
            meta: None,
            should_store: None,
            replicate: true,
            use_post: false,
            ttl: None,
        }
    }
}

impl PublishRequest {
    /// Returns the target channel; empty if none was set.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the message, if one was set and converted successfully.
    pub fn message(&self) -> Option<&Value> {
        self.message.as_ref().and_then(|m| m.as_ref().ok())
    }

    /// Returns the metadata, if set and converted successfully.
    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref().and_then(|m| m.as_ref().ok())
    }

    /// Returns the storage preference; `None` leaves it to the service.
    pub fn should_store(&self) -> Option<bool> {
        self.should_store
    }

    /// Returns false if replication was disabled.
    pub fn replicate(&self) -> bool {
        self.replicate
    }

    /// Returns true if the message travels in a POST body.
    pub fn use_post(&self) -> bool {
        self.use_post
    }

    /// Returns the storage TTL in hours.
    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    fn has_message(&self) -> bool {
        match &self.message {
            None => false,
            Some(Ok(value)) => !value.is_null(),
            Some(Err(_)) => true,
        }
    }
}

/// Checks the required fields. The first failure wins.
///
/// # Errors
///
/// Returns the [`ValidationError`] for the first missing field, in the
/// order publish key, subscribe key, channel, message. A channel of `.` or
/// `..` is rejected right after the missing-channel check.
pub fn validate(request: &PublishRequest, config: &ClientConfig) -> Result<(), ValidationError> {
    if !is_present(config.publish_key.as_deref()) {
        return Err(ValidationError::MissingPublishKey);
    }
    if !is_present(config.subscribe_key.as_deref()) {
        return Err(ValidationError::MissingSubscribeKey);
    }
    if request.channel.is_empty() {
        return Err(ValidationError::MissingChannel);
    }
    if let Some(dots) = dot_segment(&request.channel) {
        return Err(ValidationError::InvalidChannel(dots));
    }
    if !request.has_message() {
        return Err(ValidationError::MissingMessage);
    }
    Ok(())
}

/// `.` and `..` pass percent-encoding unchanged and would be collapsed
/// into the surrounding path.
fn dot_segment(channel: &str) -> Option<&'static str> {
    match channel {
        "." => Some("."),
        ".." => Some(".."),
        _ => None,
    }
}

fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// The message and metadata as they go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Message JSON, encrypted into a string literal when a cipher is set.
    pub message: String,
    /// Metadata JSON. Never encrypted.
    pub meta: Option<String>,
}

/// Serializes message and metadata, then encrypts the message.
///
/// # Errors
///
/// Returns [`PublishError::Serialization`] if either value failed to convert.
pub fn encode_payload(
    request: &PublishRequest,
    cipher: Option<&Cipher>,
) -> PublishResult<EncodedPayload> {
    let message = match &request.message {
        Some(value) => serialize(value)?,
        None => return Err(ValidationError::MissingMessage.into()),
    };
    let meta = match &request.meta {
        Some(Ok(value)) if value.is_null() => None,
        Some(value) => Some(serialize(value)?),
        None => None,
    };

    Ok(EncodedPayload {
        message: encrypt_payload(&message, cipher),
        meta,
    })
}

fn serialize(value: &SerializationResult<Value>) -> Result<String, SerializationError> {
    match value {
        Ok(value) => value.to_json(),
        Err(err) => Err(err.clone()),
    }
}

/// Assembles the HTTP request for an encoded publish.
///
/// The path is `publish/{pub}/{sub}/0/{channel}/0`, followed by the message
/// in GET mode. Query parameters are emitted in a fixed order: `uuid`,
/// `pnsdk`, `auth`, `meta`, `store`, `norep`, `seqn`, `ttl`.
pub fn build_http_request(
    request: &PublishRequest,
    config: &ClientConfig,
    payload: EncodedPayload,
    seqn: u16,
) -> HttpRequest {
    let publish_key = config.publish_key.as_deref().unwrap_or_default();
    let subscribe_key = config.subscribe_key.as_deref().unwrap_or_default();
    let mut segments = vec![
        PUBLISH_PATH_PREFIX,
        publish_key,
        subscribe_key,
        "0",
        request.channel.as_str(),
        "0",
    ];

    let method = if request.use_post {
        HttpMethod::Post
    } else {
        segments.push(payload.message.as_str());
        HttpMethod::Get
    };

    let mut http = HttpRequest::new(method, &segments)
        .with_query("uuid", config.uuid.as_str())
        .with_query("pnsdk", config.sdk_identifier.as_str());

    if let Some(auth) = config.auth_key.as_deref().filter(|a| !a.is_empty()) {
        http.push_query("auth", auth);
    }
    if let Some(meta) = payload.meta {
        http.push_query("meta", meta);
    }
    if let Some(store) = request.should_store {
        http.push_query("store", if store { "1" } else { "0" });
    }
    if !request.replicate {
        http.push_query("norep", "true");
    }
    http.push_query("seqn", seqn.to_string());
    if let Some(ttl) = request.ttl {
        http.push_query("ttl", ttl.to_string());
    }

    if request.use_post {
        http = http.with_body(payload.message);
    }
    http
}

/// Turns a raw response into the publish outcome.
///
/// # Errors
///
/// Non-2xx responses become [`PublishError::Service`] when the body holds a
/// service error, [`PublishError::Transport`] otherwise. 2xx responses that
/// are not a success array become [`PublishError::Service`].
pub fn interpret_response(response: HttpResponse) -> PublishResult<PublishResponse> {
    if response.is_success() {
        return Ok(decode_publish_response(&response.body)?);
    }
    match decode_error_body(response.status, &response.body) {
        Some(err) => Err(err.into()),
        None => Err(TransportError::status(response.status, response.text()).into()),
    }
}

/// Fluent options for one publish call.
///
/// Obtained from [`PubSubClient::publish`] or [`PubSubClient::fire`] and
/// consumed by [`send`](Self::send), [`spawn`](Self::spawn) or
/// [`spawn_with`](Self::spawn_with).
#[must_use = "a publish does nothing until it is sent"]
pub struct PublishBuilder {
    client: PubSubClient,
    request: PublishRequest,
}

impl PublishBuilder {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            client,
            request: PublishRequest::default(),
        }
    }

    /// Sets the target channel.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.request.channel = channel.into();
        self
    }

    /// Sets the message.
    pub fn message(mut self, message: impl Into<Value>) -> Self {
        self.request.message = Some(Ok(message.into()));
        self
    }

    /// Sets the message from any `Serialize` type. Structs keep their field
    /// order and drop `None` fields; maps get sorted keys.
    ///
    /// A value that cannot be represented is reported when the call is
    /// sent, as [`PublishError::Serialization`].
    pub fn message_serde<T: Serialize + ?Sized>(mut self, message: &T) -> Self {
        self.request.message = Some(Value::from_serialize(message));
        self
    }

    /// Sets the message from a record, keeping its field order.
    pub fn message_record<T: ToRecord + ?Sized>(mut self, message: &T) -> Self {
        self.request.message = Some(Ok(Value::record(message)));
        self
    }

    /// Sets the metadata. It is never encrypted.
    pub fn meta(mut self, meta: impl Into<Value>) -> Self {
        self.request.meta = Some(Ok(meta.into()));
        self
    }

    /// Sets the metadata from any `Serialize` type.
    pub fn meta_serde<T: Serialize + ?Sized>(mut self, meta: &T) -> Self {
        self.request.meta = Some(Value::from_serialize(meta));
        self
    }

    /// Asks the service to store, or not store, the message in history.
    pub fn should_store(mut self, store: bool) -> Self {
        self.request.should_store = Some(store);
        self
    }

    /// Disables replication to other regions when `false`.
    pub fn replicate(mut self, replicate: bool) -> Self {
        self.request.replicate = replicate;
        self
    }

    /// Sends the message in a POST body instead of the URL path.
    pub fn use_post(mut self, use_post: bool) -> Self {
        self.request.use_post = use_post;
        self
    }

    /// Sets the storage TTL in hours. Zero clears it.
    pub fn ttl(mut self, hours: u32) -> Self {
        self.request.ttl = (hours > 0).then_some(hours);
        self
    }

    /// Returns the options collected so far.
    pub fn request(&self) -> &PublishRequest {
        &self.request
    }

    /// Freezes the options.
    pub fn into_request(self) -> PublishRequest {
        self.request
    }

    /// Runs the pipeline and waits for the service's answer.
    ///
    /// # Errors
    ///
    /// Any [`PublishError`] except [`PublishError::Cancelled`].
    pub async fn send(self) -> PublishResult<PublishResponse> {
        self.prepare()?.execute().await
    }

    /// Prepares the call and dispatches it on a Tokio task.
    ///
    /// # Errors
    ///
    /// Validation, serialization and encryption failures are returned here;
    /// everything after dispatch comes through [`PublishTask::wait`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self) -> PublishResult<PublishTask> {
        let prepared = self.prepare()?;
        Ok(task::spawn(prepared.execute()))
    }

    /// Prepares the call, dispatches it on a Tokio task and hands the
    /// outcome to `handler`.
    ///
    /// # Errors
    ///
    /// Validation, serialization and encryption failures are returned here
    /// and the handler is dropped without being called.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_with<F>(self, handler: F) -> PublishResult<CancelHandle>
    where
        F: FnOnce(PublishResult<PublishResponse>) + Send + 'static,
    {
        let prepared = self.prepare()?;
        Ok(task::spawn_with(prepared.execute(), Box::new(handler)))
    }

    fn prepare(self) -> PublishResult<Prepared> {
        let config = self.client.config();
        validate(&self.request, &config)?;

        let cipher = config.cipher()?;
        let payload = encode_payload(&self.request, cipher.as_ref())?;
        let seqn = self.client.next_sequence();
        let http = build_http_request(&self.request, &config, payload, seqn);

        Ok(Prepared {
            dispatcher: self.client.dispatcher(),
            channel: self.request.channel,
            seqn,
            http,
        })
    }
}

struct Prepared {
    dispatcher: Arc<dyn Dispatcher>,
    channel: String,
    seqn: u16,
    http: HttpRequest,
}

impl Prepared {
    async fn execute(self) -> PublishResult<PublishResponse> {
        let Self {
            dispatcher,
            channel,
            seqn,
            http,
        } = self;

        debug!(channel = %channel, seqn, method = %http.method, "Publishing");

        let outcome = match dispatcher.dispatch(http).await {
            Ok(response) => interpret_response(response),
            Err(err) => Err(err.into()),
        };

        match &outcome {
            Ok(response) => {
                debug!(channel = %channel, seqn, timetoken = %response.timetoken, "Published");
            }
            Err(err) => {
                warn!(channel = %channel, seqn, error = %err, "Publish failed");
            }
        }
        outcome
    }
}
