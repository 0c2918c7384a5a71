//! Client configuration.
//!
//! A [`ClientConfig`] carries the credentials and connection settings that
//! every publish reads at build time. It can be built in code or loaded from a
//! TOML file:
//!
//! ```toml
//! publish_key = "pub-c-..."
//! subscribe_key = "sub-c-..."
//! cipher_key = "env::PUBWIRE_CIPHER_KEY"
//! origin = "ps.pndsn.com"
//! request_timeout_secs = 10
//! ```
//!
//! Key values support secret references, expanded by
//! [`ClientConfig::resolve_secrets`]:
//! - `pass::path/in/store`: resolved via `pass show`
//! - `env::VAR_NAME`: resolved from the environment
//! - plain text: used as-is

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::crypto::{Cipher, CryptoResult};

/// Default service origin.
pub const DEFAULT_ORIGIN: &str = "ps.pndsn.com";

/// Default SDK identifier sent as `pnsdk`.
pub const DEFAULT_SDK_IDENTIFIER: &str = concat!("pubwire-rust/", env!("CARGO_PKG_VERSION"));

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ClientConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A secret reference could not be resolved.
    #[error("failed to resolve {field}: {reason}")]
    Secret { field: &'static str, reason: String },

    /// The origin does not form a valid base URL.
    #[error("invalid origin {origin:?}: {source}")]
    InvalidOrigin {
        origin: String,
        #[source]
        source: url::ParseError,
    },
}

/// Credentials and connection settings for one client instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Key authorising publishes.
    pub publish_key: Option<String>,

    /// Key identifying the keyset; part of every publish path.
    pub subscribe_key: Option<String>,

    /// Access token sent as `auth` when non-empty.
    pub auth_key: Option<String>,

    /// Symmetric key; when set, message payloads are encrypted.
    pub cipher_key: Option<String>,

    /// Prepend a random IV to each ciphertext instead of the fixed IV.
    pub use_random_iv: bool,

    /// Identifier of this client instance, sent as `uuid`.
    pub uuid: String,

    /// SDK identifier, sent as `pnsdk`.
    pub sdk_identifier: String,

    /// Service host, or a full base URL such as `http://127.0.0.1:8080`.
    pub origin: String,

    /// Use https when `origin` has no scheme.
    pub secure: bool,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            publish_key: None,
            subscribe_key: None,
            auth_key: None,
            cipher_key: None,
            use_random_iv: false,
            uuid: format!("pn-{}", Uuid::new_v4()),
            sdk_identifier: DEFAULT_SDK_IDENTIFIER.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            secure: true,
            request_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("publish_key", &redacted(&self.publish_key))
            .field("subscribe_key", &self.subscribe_key)
            .field("auth_key", &redacted(&self.auth_key))
            .field("cipher_key", &redacted(&self.cipher_key))
            .field("use_random_iv", &self.use_random_iv)
            .field("uuid", &self.uuid)
            .field("sdk_identifier", &self.sdk_identifier)
            .field("origin", &self.origin)
            .field("secure", &self.secure)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl ClientConfig {
    /// Creates a configuration with the two required keys.
    pub fn new(publish_key: impl Into<String>, subscribe_key: impl Into<String>) -> Self {
        Self {
            publish_key: Some(publish_key.into()),
            subscribe_key: Some(subscribe_key.into()),
            ..Default::default()
        }
    }

    /// Builder: set the auth key.
    #[must_use]
    pub fn with_auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.auth_key = Some(auth_key.into());
        self
    }

    /// Builder: set the cipher key.
    #[must_use]
    pub fn with_cipher_key(mut self, cipher_key: impl Into<String>) -> Self {
        self.cipher_key = Some(cipher_key.into());
        self
    }

    /// Builder: enable or disable random IVs.
    #[must_use]
    pub fn with_random_iv(mut self, random_iv: bool) -> Self {
        self.use_random_iv = random_iv;
        self
    }

    /// Builder: set the client uuid.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Builder: set the SDK identifier.
    #[must_use]
    pub fn with_sdk_identifier(mut self, sdk_identifier: impl Into<String>) -> Self {
        self.sdk_identifier = sdk_identifier.into();
        self
    }

    /// Builder: set the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Builder: choose https or http for scheme-less origins.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Builder: set the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Loads configuration from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Expands `env::` and `pass::` references in the key fields.
    pub fn resolve_secrets(mut self) -> ConfigResult<Self> {
        self.publish_key = resolve_field("publish_key", self.publish_key)?;
        self.subscribe_key = resolve_field("subscribe_key", self.subscribe_key)?;
        self.auth_key = resolve_field("auth_key", self.auth_key)?;
        self.cipher_key = resolve_field("cipher_key", self.cipher_key)?;
        Ok(self)
    }

    /// Returns the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> ConfigResult<Url> {
        let raw = if self.origin.contains("://") {
            self.origin.clone()
        } else {
            let scheme = if self.secure { "https" } else { "http" };
            format!("{}://{}", scheme, self.origin)
        };

        Url::parse(&raw).map_err(|source| ConfigError::InvalidOrigin {
            origin: self.origin.clone(),
            source,
        })
    }

    /// Returns the payload cipher, if a non-empty cipher key is configured.
    pub fn cipher(&self) -> CryptoResult<Option<Cipher>> {
        match self.cipher_key.as_deref() {
            Some(key) if !key.is_empty() => {
                Ok(Some(Cipher::new(key)?.with_random_iv(self.use_random_iv)))
            }
            _ => Ok(None),
        }
    }
}

fn resolve_field(field: &'static str, value: Option<String>) -> ConfigResult<Option<String>> {
    value
        .map(|raw| crate::secret::resolve(&raw).map_err(|reason| ConfigError::Secret { field, reason }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert!(config.publish_key.is_none());
        assert!(config.subscribe_key.is_none());
        assert!(config.uuid.starts_with("pn-"));
        assert!(config.sdk_identifier.starts_with("pubwire-rust/"));
        assert_eq!(config.origin, DEFAULT_ORIGIN);
        assert!(config.secure);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = ClientConfig::new("pub-secret", "sub-visible")
            .with_auth_key("auth-secret")
            .with_cipher_key("cipher-secret");

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("sub-visible"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("pub-secret"));
        assert!(!rendered.contains("auth-secret"));
        assert!(!rendered.contains("cipher-secret"));

        let bare = format!("{:?}", ClientConfig::default());
        assert!(bare.contains("auth_key: None"));
    }

    #[test]
    fn default_uuids_are_unique() {
        assert_ne!(ClientConfig::default().uuid, ClientConfig::default().uuid);
    }

    #[test]
    fn builder_methods() {
        let config = ClientConfig::new("pub", "sub")
            .with_auth_key("auth")
            .with_cipher_key("secret")
            .with_random_iv(true)
            .with_uuid("myUUID")
            .with_sdk_identifier("custom/1.0")
            .with_origin("example.com")
            .with_secure(false)
            .with_request_timeout(Duration::from_secs(3));

        assert_eq!(config.publish_key.as_deref(), Some("pub"));
        assert_eq!(config.subscribe_key.as_deref(), Some("sub"));
        assert_eq!(config.auth_key.as_deref(), Some("auth"));
        assert_eq!(config.cipher_key.as_deref(), Some("secret"));
        assert!(config.use_random_iv);
        assert_eq!(config.uuid, "myUUID");
        assert_eq!(config.sdk_identifier, "custom/1.0");
        assert_eq!(config.request_timeout_secs, 3);
        assert_eq!(config.base_url().unwrap().as_str(), "http://example.com/");
    }

    #[test]
    fn base_url_schemes() {
        let secure = ClientConfig::default();
        assert_eq!(secure.base_url().unwrap().as_str(), "https://ps.pndsn.com/");

        let explicit = ClientConfig::default().with_origin("http://127.0.0.1:8080");
        assert_eq!(
            explicit.base_url().unwrap().as_str(),
            "http://127.0.0.1:8080/"
        );

        let broken = ClientConfig::default().with_origin("http://exa mple.com");
        assert!(matches!(
            broken.base_url(),
            Err(ConfigError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn cipher_only_for_non_empty_key() {
        assert!(ClientConfig::default().cipher().unwrap().is_none());
        assert!(
            ClientConfig::default()
                .with_cipher_key("")
                .cipher()
                .unwrap()
                .is_none()
        );

        let cipher = ClientConfig::default()
            .with_cipher_key("testCipher")
            .with_random_iv(true)
            .cipher()
            .unwrap()
            .unwrap();
        assert!(cipher.uses_random_iv());
    }

    #[test]
    fn parse_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
publish_key = "myPublishKey"
subscribe_key = "mySubscribeKey"
uuid = "myUUID"
secure = false
"#,
        )
        .unwrap();

        assert_eq!(config.publish_key.as_deref(), Some("myPublishKey"));
        assert_eq!(config.subscribe_key.as_deref(), Some("mySubscribeKey"));
        assert_eq!(config.uuid, "myUUID");
        assert!(!config.secure);
        // untouched fields keep their defaults
        assert_eq!(config.origin, DEFAULT_ORIGIN);
    }

    #[test]
    fn serialize_toml() {
        let config = ClientConfig::new("pub", "sub")
            .with_uuid("myUUID")
            .with_sdk_identifier("custom/1.0");

        insta::assert_snapshot!(toml::to_string(&config).unwrap(), @r#"
        publish_key = "pub"
        subscribe_key = "sub"
        use_random_iv = false
        uuid = "myUUID"
        sdk_identifier = "custom/1.0"
        origin = "ps.pndsn.com"
        secure = true
        request_timeout_secs = 10
        "#);
    }

    #[test]
    fn parse_toml_rejects_wrong_types() {
        let result = ClientConfig::from_toml_str("request_timeout_secs = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "publish_key = \"pub\"\nsubscribe_key = \"sub\"").unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.publish_key.as_deref(), Some("pub"));
    }

    #[test]
    fn load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::load_from(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn resolve_env_references() {
        unsafe {
            std::env::set_var("_PUBWIRE_TEST_PUB_KEY", "env-pub");
        }

        let config = ClientConfig::new("env::_PUBWIRE_TEST_PUB_KEY", "plain-sub")
            .resolve_secrets()
            .unwrap();
        assert_eq!(config.publish_key.as_deref(), Some("env-pub"));
        assert_eq!(config.subscribe_key.as_deref(), Some("plain-sub"));

        unsafe {
            std::env::remove_var("_PUBWIRE_TEST_PUB_KEY");
        }
    }

    #[test]
    fn resolve_reports_field_name() {
        let err = ClientConfig::default()
            .with_cipher_key("env::_PUBWIRE_TEST_UNSET_VAR_12345")
            .resolve_secrets()
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Secret {
                field: "cipher_key",
                ..
            }
        ));
    }
}
