//! Recording dispatcher for pipeline tests.

use std::sync::{Arc, Mutex};

use pubwire_core::ClientConfig;
use pubwire_protocol::{HttpRequest, HttpResponse};

use crate::client::PubSubClient;
use crate::dispatcher::{BoxFuture, Dispatcher};
use crate::error::TransportError;

/// The service's answer to an accepted publish.
pub(crate) const SENT: &str = r#"[1,"Sent","14598111595318003"]"#;

type Reply = Box<dyn Fn() -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Records every dispatched request and answers with a fixed reply.
#[derive(Clone)]
pub(crate) struct Recorder {
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    reply: Arc<Reply>,
}

impl Recorder {
    fn new(reply: Reply) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(reply),
        }
    }

    pub(crate) fn replying(body: &'static str) -> Self {
        Self::with_response(HttpResponse::ok(body))
    }

    pub(crate) fn with_response(response: HttpResponse) -> Self {
        Self::new(Box::new(move || Ok(response.clone())))
    }

    pub(crate) fn failing<F>(make_error: F) -> Self
    where
        F: Fn() -> TransportError + Send + Sync + 'static,
    {
        Self::new(Box::new(move || Err(make_error())))
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Returns the only recorded request.
    pub(crate) fn single(&self) -> HttpRequest {
        let mut requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.remove(0)
    }
}

impl Dispatcher for Recorder {
    fn dispatch(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        self.requests.lock().unwrap().push(request);
        let reply = (self.reply)();
        Box::pin(async move { reply })
    }
}

pub(crate) fn client_with(config: ClientConfig, recorder: &Recorder) -> PubSubClient {
    PubSubClient::with_dispatcher(config, Arc::new(recorder.clone()))
}
