//! Decoding of publish response bodies.
//!
//! A successful publish answers with a three element array:
//!
//! ```text
//! [1, "Sent", "14598111595318003"]
//! ```
//!
//! Rejections either reuse the array shape with a status other than `1`
//! or, on non-2xx statuses, send an object such as
//! `{"status": 403, "message": "Forbidden", "error": true}`.

use serde_json::Value as Json;

use crate::PUBLISH_SUCCESS;
use crate::error::ServiceError;
use crate::types::PublishResponse;

/// Decodes a publish response body.
///
/// Anything that is not a well-formed success array becomes a
/// [`ServiceError`]: arrays with a non-success status carry that status
/// and description, everything else is reported as unparsable.
pub fn decode_publish_response(body: &[u8]) -> Result<PublishResponse, ServiceError> {
    let json: Json = serde_json::from_slice(body)
        .map_err(|e| ServiceError::unparsable(format!("invalid JSON: {e}")))?;

    match json {
        Json::Array(items) => decode_array(&items),
        Json::Object(_) => Err(decode_object(&json)
            .unwrap_or_else(|| ServiceError::unparsable("expected a JSON array"))),
        other => Err(ServiceError::unparsable(format!(
            "expected a JSON array, got {}",
            kind_of(&other)
        ))),
    }
}

/// Extracts a service error from the body of a non-2xx response.
///
/// Returns `None` when the body carries no recognisable error, in which
/// case the caller should report the HTTP status itself.
pub fn decode_error_body(status: u16, body: &[u8]) -> Option<ServiceError> {
    let json: Json = serde_json::from_slice(body).ok()?;
    match &json {
        Json::Object(_) => {
            let mut err = decode_object(&json)?;
            if err.status_code == ServiceError::UNPARSABLE {
                err.status_code = i64::from(status);
            }
            Some(err)
        }
        Json::Array(items) => match decode_array(items) {
            Err(err) if !err.is_unparsable() => Some(err),
            _ => None,
        },
        _ => None,
    }
}

fn decode_array(items: &[Json]) -> Result<PublishResponse, ServiceError> {
    let status = match items.first() {
        Some(status) => status
            .as_i64()
            .ok_or_else(|| ServiceError::unparsable("status is not an integer"))?,
        None => return Err(ServiceError::unparsable("expected 3 elements, got 0")),
    };
    let description = items
        .get(1)
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();

    // A rejection is reported even when the array is truncated.
    if status != PUBLISH_SUCCESS {
        return Err(ServiceError::new(status, description));
    }

    let timetoken = match items.get(2) {
        Some(Json::String(tt)) => tt.clone(),
        Some(Json::Number(tt)) => tt.to_string(),
        None => {
            return Err(ServiceError::unparsable(format!(
                "expected 3 elements, got {}",
                items.len()
            )));
        }
        Some(other) => {
            return Err(ServiceError::unparsable(format!(
                "timetoken is {}",
                kind_of(other)
            )));
        }
    };

    Ok(PublishResponse {
        timetoken,
        description,
    })
}

fn decode_object(json: &Json) -> Option<ServiceError> {
    let status = json.get("status").and_then(Json::as_i64);
    let message = json
        .get("message")
        .and_then(Json::as_str)
        .or_else(|| json.get("error_message").and_then(Json::as_str));

    match (status, message) {
        (None, None) => None,
        (status, message) => Some(ServiceError::new(
            status.unwrap_or(ServiceError::UNPARSABLE),
            message.unwrap_or("no message").to_string(),
        )),
    }
}

fn kind_of(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_with_string_timetoken() {
        let response = decode_publish_response(br#"[1,"Sent","14598111595318003"]"#).unwrap();
        insta::assert_json_snapshot!(response, @r###"
        {
          "timetoken": "14598111595318003",
          "description": "Sent"
        }
        "###);
    }

    #[test]
    fn success_with_numeric_timetoken() {
        let response = decode_publish_response(br#"[1,"Sent",14598111595318003]"#).unwrap();
        assert_eq!(response.timetoken, "14598111595318003");
        assert_eq!(response.description, "Sent");
    }

    #[test]
    fn extra_elements_are_ignored() {
        let response = decode_publish_response(br#"[1,"Sent","1",{"x":1}]"#).unwrap();
        assert_eq!(response.timetoken, "1");
    }

    #[test]
    fn non_success_status() {
        let err = decode_publish_response(br#"[0,"Invalid Key","14598111595318003"]"#).unwrap_err();
        assert_eq!(err, ServiceError::new(0, "Invalid Key"));
    }

    #[test]
    fn short_array_is_unparsable() {
        let err = decode_publish_response(br#"[1,"Sent"]"#).unwrap_err();
        assert!(err.is_unparsable());
        assert_eq!(err.description, "expected 3 elements, got 2");
    }

    #[test]
    fn short_rejection_keeps_status_and_description() {
        let err = decode_publish_response(br#"[0,"Invalid Key"]"#).unwrap_err();
        assert_eq!(err, ServiceError::new(0, "Invalid Key"));

        let err = decode_publish_response(b"[0]").unwrap_err();
        assert_eq!(err, ServiceError::new(0, ""));
    }

    #[test]
    fn empty_array_is_unparsable() {
        let err = decode_publish_response(b"[]").unwrap_err();
        assert!(err.is_unparsable());
        assert_eq!(err.description, "expected 3 elements, got 0");
    }

    #[test]
    fn non_integer_status_is_unparsable() {
        let err = decode_publish_response(br#"["1","Sent","1"]"#).unwrap_err();
        assert!(err.is_unparsable());
    }

    #[test]
    fn bad_timetoken_is_unparsable() {
        let err = decode_publish_response(br#"[1,"Sent",null]"#).unwrap_err();
        insta::assert_snapshot!(err, @"unparsable publish response: timetoken is null");
    }

    #[test]
    fn garbage_is_unparsable() {
        let err = decode_publish_response(b"<html>").unwrap_err();
        assert!(err.is_unparsable());
        assert!(err.description.starts_with("invalid JSON"));

        let err = decode_publish_response(b"\"Sent\"").unwrap_err();
        assert_eq!(err.description, "expected a JSON array, got a string");
    }

    #[test]
    fn object_body_on_success_status() {
        let err = decode_publish_response(br#"{"status":400,"message":"Invalid JSON"}"#)
            .unwrap_err();
        assert_eq!(err, ServiceError::new(400, "Invalid JSON"));

        let err = decode_publish_response(br#"{"unexpected":true}"#).unwrap_err();
        assert!(err.is_unparsable());
    }

    #[test]
    fn error_body_object() {
        let err = decode_error_body(
            403,
            br#"{"status":403,"message":"Forbidden","error":true,"service":"Access Manager"}"#,
        )
        .unwrap();
        insta::assert_snapshot!(err, @"publish rejected (status 403): Forbidden");
    }

    #[test]
    fn error_body_without_status_uses_http_status() {
        let err = decode_error_body(414, br#"{"message":"Request URI Too Long"}"#).unwrap();
        assert_eq!(err.status_code, 414);
    }

    #[test]
    fn error_body_array() {
        let err = decode_error_body(400, br#"[0,"Invalid Key","1"]"#).unwrap();
        assert_eq!(err, ServiceError::new(0, "Invalid Key"));
    }

    #[test]
    fn error_body_unrecognised() {
        assert!(decode_error_body(502, b"Bad Gateway").is_none());
        assert!(decode_error_body(500, b"{}").is_none());
        assert!(decode_error_body(500, b"[1]").is_none());
    }
}
