//! HTTP mapping of the transport.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use deltasync_protocol::{BootstrapResponse, PullResponse, PushRequest, PushResponse, Transaction};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Minimal blocking HTTP client seam.
///
/// The transport needs exactly two verbs; implementations wrap whatever
/// HTTP stack the embedding application already carries. Returns the status
/// code and the raw body.
pub trait HttpClient: Send + Sync {
    /// Issues a GET and returns `(status, body)`.
    fn get(&self, url: &str) -> SyncResult<(u16, String)>;

    /// Issues a POST with a JSON body and returns `(status, body)`.
    fn post(&self, url: &str, body: &str) -> SyncResult<(u16, String)>;
}

/// [`SyncTransport`] over the three HTTP endpoints.
///
/// Maps bootstrap to `GET {base}/bootstrap`, pull to
/// `GET {base}/pull?sinceSyncId=<n>` and push to `POST {base}/push`.
/// A 5xx or transport-level failure is retryable; a 4xx outside the push
/// rejection contract is a protocol error.
pub struct HttpTransport<C> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport rooted at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    fn decode<T: DeserializeOwned>(body: &str) -> SyncResult<T> {
        serde_json::from_str(body)
            .map_err(|e| SyncError::Protocol(format!("undecodable response body: {e}")))
    }

    fn unexpected<T>(endpoint: &str, status: u16, body: &str) -> SyncResult<T> {
        if status >= 500 {
            Err(SyncError::transport_retryable(format!(
                "{endpoint} answered {status}"
            )))
        } else {
            Err(SyncError::Protocol(format!(
                "{endpoint} answered {status}: {body}"
            )))
        }
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn bootstrap(&self) -> SyncResult<BootstrapResponse> {
        let url = format!("{}/bootstrap", self.base_url);
        let (status, body) = self.client.get(&url)?;
        debug!(status, "bootstrap response");
        match status {
            200 => Self::decode(&body),
            _ => Self::unexpected("bootstrap", status, &body),
        }
    }

    fn pull(&self, since_sync_id: u64) -> SyncResult<PullResponse> {
        let url = format!("{}/pull?sinceSyncId={since_sync_id}", self.base_url);
        let (status, body) = self.client.get(&url)?;
        match status {
            200 => Self::decode(&body),
            _ => Self::unexpected("pull", status, &body),
        }
    }

    fn push(&self, transaction: &Transaction) -> SyncResult<PushResponse> {
        let url = format!("{}/push", self.base_url);
        let request = PushRequest {
            transaction: transaction.clone(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| SyncError::Protocol(format!("unencodable push request: {e}")))?;

        let (status, body) = self.client.post(&url, &body)?;
        match status {
            // A rejection travels as 400 with the same response shape.
            200 | 400 => Self::decode(&body),
            _ => Self::unexpected("push", status, &body),
        }
    }
}

/// An in-process request sink shaped like the server's raw dispatch.
///
/// Lets a client run against a server in the same process without a socket;
/// the signature mirrors the server facade's `handle_request`.
pub trait LoopbackServer: Send + Sync {
    /// Dispatches one request and returns `(status, json_body)`.
    fn dispatch(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: Option<&str>,
    ) -> (u16, String);
}

/// [`HttpClient`] over a [`LoopbackServer`].
///
/// Combine with [`HttpTransport`] to exercise the full wire contract,
/// serialization included, entirely in process.
pub struct LoopbackClient<S> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client over `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    fn split(url: &str) -> (&str, Option<&str>) {
        let path = url.rfind("://").map_or(url, |i| {
            let rest = &url[i + 3..];
            rest.find('/').map_or("/", |j| &rest[j..])
        });
        match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        }
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn get(&self, url: &str) -> SyncResult<(u16, String)> {
        let (path, query) = Self::split(url);
        Ok(self.server.dispatch("GET", path, query, None))
    }

    fn post(&self, url: &str, body: &str) -> SyncResult<(u16, String)> {
        let (path, query) = Self::split(url);
        Ok(self.server.dispatch("POST", path, query, Some(body)))
    }
}
