//! Publish client for a hosted publish/subscribe service.
//!
//! A [`PubSubClient`] owns the credentials, a per-client sequence counter
//! and a [`Dispatcher`]. Each call goes through one pipeline:
//!
//! 1. validate keys, channel and message
//! 2. serialize message and metadata to JSON
//! 3. encrypt the message when a cipher key is configured
//! 4. take the next `seqn`
//! 5. build the [`HttpRequest`](pubwire_protocol::HttpRequest) and dispatch it
//! 6. decode `[1,"Sent","<timetoken>"]` into a [`PublishResponse`]
//!
//! Steps 1 to 5 run on the caller's thread; only dispatch and decoding
//! are deferred in non-blocking mode.
//!
//! # Example
//!
//! ```rust,no_run
//! use pubwire_client::PubSubClient;
//! use pubwire_core::ClientConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load_from("pubwire.toml")?.resolve_secrets()?;
//! let client = PubSubClient::new(config)?;
//!
//! let task = client.fire().channel("alerts").message("reboot").spawn()?;
//! let response = task.wait().await?;
//! println!("{:?}", response.published_at());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod dispatcher;
mod error;
pub mod publish;
mod task;
#[cfg(test)]
mod test_support;

pub use client::PubSubClient;
pub use dispatcher::{BoxFuture, Dispatcher, HttpDispatcher};
pub use error::{
    PublishError, PublishResult, TransportError, TransportErrorKind, ValidationError,
};
pub use publish::{PublishBuilder, PublishRequest};
pub use pubwire_protocol::PublishResponse;
pub use task::{CancelHandle, CompletionHandler, PublishTask};
