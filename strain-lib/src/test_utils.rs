use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rama::{
    Service,
    error::BoxError,
    http::{Body, Request, Response, StatusCode, Uri},
};

use crate::{config::RunConfig, http::RequestTemplate};

/// Scripted answer of a [`MockClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockReply {
    Status(StatusCode),
    Error,
    /// Never answers, only cancellation gets a worker out of this one.
    Hang,
    /// Panics the calling task.
    Panic,
}

/// In-memory http client with a fixed latency.
///
/// Replies are taken from the script in order,
/// once the script is exhausted the fallback reply is used forever.
#[derive(Debug, Clone)]
pub(crate) struct MockClient {
    latency: Duration,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    fallback: MockReply,
    calls: Arc<AtomicUsize>,
}

impl MockClient {
    pub(crate) fn new(latency: Duration, fallback: MockReply) -> Self {
        Self {
            latency,
            script: Default::default(),
            fallback,
            calls: Default::default(),
        }
    }

    pub(crate) fn ok(latency: Duration) -> Self {
        Self::new(latency, MockReply::Status(StatusCode::OK))
    }

    pub(crate) fn with_script(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.script.lock().unwrap().extend(replies);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

impl Service<Request> for MockClient {
    type Output = Response;
    type Error = BoxError;

    async fn serve(&self, _req: Request) -> Result<Self::Output, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply();

        match reply {
            MockReply::Hang => std::future::pending::<()>().await,
            MockReply::Panic => panic!("mock client panic"),
            _ => {}
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            MockReply::Status(status) => {
                let mut resp = Response::new(Body::empty());
                *resp.status_mut() = status;
                Ok(resp)
            }
            MockReply::Error | MockReply::Hang | MockReply::Panic => {
                Err(BoxError::from("mock connection error"))
            }
        }
    }
}

pub(crate) fn test_uri() -> Uri {
    Uri::from_static("http://strainbench.test/")
}

pub(crate) fn test_config(target_rps: u32) -> RunConfig {
    RunConfig::try_new(test_uri(), target_rps).unwrap()
}

pub(crate) fn test_template() -> RequestTemplate {
    test_config(1).request_template()
}
