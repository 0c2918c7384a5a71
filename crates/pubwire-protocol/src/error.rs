//! Service-side publish failures.

use std::fmt;

use thiserror::Error;

/// The service rejected a publish, or its answer could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ServiceError {
    /// Status code reported by the service, or [`ServiceError::UNPARSABLE`].
    pub status_code: i64,
    /// Human-readable explanation, taken from the response when possible.
    pub description: String,
}

impl ServiceError {
    /// Client-side code for responses that do not have the expected shape.
    pub const UNPARSABLE: i64 = -1;

    /// Creates an error carrying a service status code.
    pub fn new(status_code: i64, description: impl Into<String>) -> Self {
        Self {
            status_code,
            description: description.into(),
        }
    }

    /// Creates an error for a response that could not be decoded.
    pub fn unparsable(description: impl Into<String>) -> Self {
        Self::new(Self::UNPARSABLE, description)
    }

    /// Returns true if the response could not be decoded at all.
    pub fn is_unparsable(&self) -> bool {
        self.status_code == Self::UNPARSABLE
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unparsable() {
            write!(f, "unparsable publish response: {}", self.description)
        } else {
            write!(
                f,
                "publish rejected (status {}): {}",
                self.status_code, self.description
            )
        }
    }
}
