//! The client handle shared by all publish calls.

use std::sync::{Arc, PoisonError, RwLock};

use pubwire_core::{ClientConfig, SequenceGenerator};
use tracing::{debug, info};

use crate::dispatcher::{Dispatcher, HttpDispatcher};
use crate::error::PublishResult;
use crate::publish::PublishBuilder;

struct Inner {
    config: RwLock<Arc<ClientConfig>>,
    sequence: SequenceGenerator,
    dispatcher: Arc<dyn Dispatcher>,
}

/// A publish client.
///
/// Cloning is cheap and clones share the configuration, the sequence
/// counter and the dispatcher, so every clone draws from one `seqn` series.
///
/// # Example
///
/// ```rust,no_run
/// use pubwire_client::PubSubClient;
/// use pubwire_core::ClientConfig;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PubSubClient::new(ClientConfig::new("pub-key", "sub-key"))?;
/// let response = client
///     .publish()
///     .channel("sensors")
///     .message(vec!["m1", "m2"])
///     .send()
///     .await?;
/// println!("published at {}", response.timetoken);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PubSubClient {
    inner: Arc<Inner>,
}

impl PubSubClient {
    /// Creates a client that talks HTTP to the configured origin.
    ///
    /// Origin and timeout are read once, here.
    ///
    /// # Errors
    ///
    /// Fails if the origin is not a valid URL or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> PublishResult<Self> {
        let dispatcher = HttpDispatcher::new(&config)?;
        info!(origin = %dispatcher.base_url(), "Publish client ready");
        Ok(Self::with_dispatcher(config, Arc::new(dispatcher)))
    }

    /// Creates a client with a custom dispatcher.
    pub fn with_dispatcher(config: ClientConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(Arc::new(config)),
                sequence: SequenceGenerator::new(),
                dispatcher,
            }),
        }
    }

    /// Starts a publish call.
    pub fn publish(&self) -> PublishBuilder {
        PublishBuilder::new(self.clone())
    }

    /// Starts a publish that is neither stored nor replicated.
    pub fn fire(&self) -> PublishBuilder {
        self.publish().should_store(false).replicate(false)
    }

    /// Returns a snapshot of the current configuration.
    pub fn config(&self) -> Arc<ClientConfig> {
        let guard = self
            .inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the configuration for subsequent calls.
    ///
    /// Calls already past validation keep the snapshot they started with.
    pub fn set_config(&self, config: ClientConfig) {
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        debug!("Client configuration replaced");
    }

    /// Edits the configuration in place for subsequent calls.
    pub fn update_config(&self, edit: impl FnOnce(&mut ClientConfig)) {
        let mut guard = self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        edit(Arc::make_mut(&mut guard));
        debug!("Client configuration updated");
    }

    pub(crate) fn next_sequence(&self) -> u16 {
        self.inner.sequence.next()
    }

    pub(crate) fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }
}

impl std::fmt::Debug for PubSubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.config();
        f.debug_struct("PubSubClient")
            .field("uuid", &config.uuid)
            .field("origin", &config.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test_support::{Recorder, SENT, client_with};

    fn test_config() -> ClientConfig {
        ClientConfig::new("myPublishKey", "mySubscribeKey").with_uuid("myUUID")
    }

    #[test]
    fn new_builds_http_dispatcher() {
        let client = PubSubClient::new(test_config()).unwrap();
        assert_eq!(client.config().uuid, "myUUID");
    }

    #[test]
    fn new_rejects_bad_origin() {
        let err = PubSubClient::new(test_config().with_origin("http://")).unwrap_err();
        assert!(matches!(err, crate::PublishError::Transport(_)));
    }

    #[tokio::test]
    async fn config_updates_apply_to_next_call() {
        let recorder = Recorder::replying(SENT);
        let client = client_with(test_config(), &recorder);

        client.update_config(|config| config.auth_key = Some("authKey".into()));
        client.publish().channel("ch").message("hi").send().await.unwrap();

        client.set_config(test_config().with_uuid("otherUUID"));
        client.publish().channel("ch").message("hi").send().await.unwrap();

        let requests = recorder.requests();
        assert_eq!(requests[0].query_value("auth"), Some("authKey"));
        assert_eq!(requests[1].query_value("uuid"), Some("otherUUID"));
        assert!(!requests[1].has_query("auth"));
    }

    #[tokio::test]
    async fn config_snapshot_is_stable() {
        let recorder = Recorder::replying(SENT);
        let client = client_with(test_config(), &recorder);

        let before = client.config();
        client.update_config(|config| config.uuid = "changed".into());

        assert_eq!(before.uuid, "myUUID");
        assert_eq!(client.config().uuid, "changed");
    }

    #[tokio::test]
    async fn clones_share_sequence() {
        let recorder = Recorder::replying(SENT);
        let client = client_with(test_config(), &recorder);
        let clone = client.clone();

        client.publish().channel("ch").message(1).send().await.unwrap();
        clone.publish().channel("ch").message(2).send().await.unwrap();

        let seqns: Vec<_> = recorder
            .requests()
            .iter()
            .map(|r| r.query_value("seqn").unwrap().to_string())
            .collect();
        assert_eq!(seqns, ["1", "2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_get_distinct_sequence_numbers() {
        let recorder = Recorder::replying(SENT);
        let client = client_with(test_config(), &recorder);

        let mut tasks = Vec::new();
        for i in 0..64 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                client.publish().channel("ch").message(i).send().await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let seqns: HashSet<u16> = recorder
            .requests()
            .iter()
            .map(|r| r.query_value("seqn").unwrap().parse().unwrap())
            .collect();
        assert_eq!(seqns.len(), 64);
        assert_eq!(seqns.iter().min(), Some(&1));
        assert_eq!(seqns.iter().max(), Some(&64));
    }

    #[test]
    fn debug_hides_keys() {
        let recorder = Recorder::replying(SENT);
        let client = client_with(test_config().with_cipher_key("secret"), &recorder);

        let rendered = format!("{:?}", client);
        assert!(rendered.contains("myUUID"));
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("myPublishKey"));
    }
}
