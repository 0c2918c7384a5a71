//! Transport-agnostic request and response types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::{encode_path, encode_query};

/// HTTP method of a publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Message travels in the last path segment.
    Get,
    /// Message travels in the request body.
    Post,
}

impl HttpMethod {
    /// Returns the method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully assembled HTTP request, independent of any client library.
///
/// The path is stored percent-encoded; query values are stored raw and
/// encoded when rendered.
///
/// # Example
///
/// ```rust
/// use pubwire_protocol::{HttpMethod, HttpRequest};
///
/// let request = HttpRequest::new(HttpMethod::Get, &["publish", "a b"])
///     .with_query("seqn", "1");
/// assert_eq!(request.path_and_query(), "/publish/a%20b?seqn=1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// The method.
    pub method: HttpMethod,
    /// Percent-encoded absolute path.
    pub path: String,
    /// Query parameters in emission order, values unencoded.
    pub query: Vec<(String, String)>,
    /// Request body, sent verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl HttpRequest {
    /// Creates a request whose path is built from unencoded segments.
    pub fn new<S: AsRef<str>>(method: HttpMethod, segments: &[S]) -> Self {
        Self {
            method,
            path: encode_path(segments),
            query: Vec::new(),
            body: None,
        }
    }

    /// Builder: append a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_query(name, value);
        self
    }

    /// Builder: set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Appends a query parameter.
    pub fn push_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query.push((name.into(), value.into()));
    }

    /// Returns the raw value of the first parameter called `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if a parameter called `name` is present.
    pub fn has_query(&self, name: &str) -> bool {
        self.query_value(name).is_some()
    }

    /// Renders the encoded query string, without the leading `?`.
    pub fn query_string(&self) -> String {
        encode_query(&self.query)
    }

    /// Renders the path plus encoded query, as it appears on the wire.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string())
        }
    }

    /// Returns the last path segment, still encoded.
    pub fn last_segment(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

/// A raw response as returned by a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a 200 response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Service-assigned ordering token.
    pub timetoken: String,
    /// Status text, usually `"Sent"`.
    pub description: String,
}

impl PublishResponse {
    /// Creates a publish response.
    pub fn new(timetoken: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            timetoken: timetoken.into(),
            description: description.into(),
        }
    }

    /// Converts the timetoken (100 ns ticks since the Unix epoch) into a
    /// timestamp. Returns `None` if the timetoken is not numeric.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let ticks: u64 = self.timetoken.parse().ok()?;
        let secs = i64::try_from(ticks / 10_000_000).ok()?;
        let nanos = u32::try_from((ticks % 10_000_000) * 100).ok()?;
        DateTime::from_timestamp(secs, nanos)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn method_names() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }

    #[test]
    fn request_rendering() {
        let request = HttpRequest::new(HttpMethod::Get, &["publish", "p", "s", "0", "ch", "0", "\"hi\""])
            .with_query("uuid", "myUUID")
            .with_query("seqn", "1");

        insta::assert_snapshot!(
            request.path_and_query(),
            @"/publish/p/s/0/ch/0/%22hi%22?uuid=myUUID&seqn=1"
        );
        assert_eq!(request.last_segment(), Some("%22hi%22"));
    }

    #[test]
    fn request_without_query() {
        let request = HttpRequest::new(HttpMethod::Post, &["publish"]).with_body("[1]");
        assert_eq!(request.path_and_query(), "/publish");
        assert_eq!(request.body.as_deref(), Some("[1]"));
    }

    #[test]
    fn query_lookup() {
        let mut request = HttpRequest::new(HttpMethod::Get, &["x"]);
        request.push_query("store", "0");

        assert_eq!(request.query_value("store"), Some("0"));
        assert!(request.has_query("store"));
        assert!(!request.has_query("norep"));
    }

    #[test]
    fn request_serializes_for_inspection() {
        let request = HttpRequest::new(HttpMethod::Post, &["publish", "ch"])
            .with_query("seqn", "7")
            .with_body("\"hi\"");

        insta::assert_json_snapshot!(request, @r###"
        {
          "method": "POST",
          "path": "/publish/ch",
          "query": [
            [
              "seqn",
              "7"
            ]
          ],
          "body": "\"hi\""
        }
        "###);
    }

    #[test]
    fn response_status_classes() {
        assert!(HttpResponse::ok("[]").is_success());
        assert!(!HttpResponse::new(403, "").is_success());
        assert_eq!(HttpResponse::ok("abc").text(), "abc");
    }

    #[test]
    fn timetoken_to_timestamp() {
        let response = PublishResponse::new("14598111595318003", "Sent");
        let at = response.published_at().unwrap();
        assert_eq!(at.year(), 2016);
        assert_eq!(at.month(), 4);
        assert_eq!(at.timestamp(), 1_459_811_159);
        assert_eq!(at.nanosecond(), 531_800_300);
    }

    #[test]
    fn non_numeric_timetoken() {
        assert!(PublishResponse::new("soon", "Sent").published_at().is_none());
    }
}
