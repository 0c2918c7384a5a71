//! Core types: publishable values, payload encryption, sequencing, configuration

pub mod config;
pub mod crypto;
mod secret;
pub mod sequence;
pub mod tracing;
pub mod value;

pub use config::{ClientConfig, ConfigError, ConfigResult, DEFAULT_ORIGIN, DEFAULT_SDK_IDENTIFIER};
pub use crypto::{Cipher, CryptoError, CryptoResult, decrypt_payload, encrypt_payload};
pub use sequence::{MAX_SEQUENCE, SequenceGenerator};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use value::{Record, SerializationError, SerializationResult, ToRecord, Value, to_json};
