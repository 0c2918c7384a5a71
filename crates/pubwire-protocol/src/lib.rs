//! Wire format of the publish call.
//!
//! This crate knows nothing about sockets or runtimes. It describes what a
//! publish looks like on the wire and how the service's answer is read:
//!
//! - [`HttpRequest`]: method, percent-encoded path, ordered query, body
//! - [`decode_publish_response`]: turns `[1,"Sent","<timetoken>"]` into a
//!   [`PublishResponse`], everything else into a [`ServiceError`]
//!
//! # Example
//!
//! ```rust
//! use pubwire_protocol::decode_publish_response;
//!
//! let response = decode_publish_response(br#"[1,"Sent","14598111595318003"]"#).unwrap();
//! assert_eq!(response.timetoken, "14598111595318003");
//! ```

pub mod encoding;
mod error;
mod response;
mod types;

pub use encoding::{encode_component, encode_path, encode_query};
pub use error::ServiceError;
pub use response::{decode_error_body, decode_publish_response};
pub use types::{HttpMethod, HttpRequest, HttpResponse, PublishResponse};

/// Status code of an accepted publish.
pub const PUBLISH_SUCCESS: i64 = 1;

/// First path segment of every publish call.
pub const PUBLISH_PATH_PREFIX: &str = "publish";
