//! The sync server facade.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::store::ServerStore;
use crate::validate::{AcceptAll, TransactionValidator};
use deltasync_model::ModelRegistry;
use deltasync_protocol::{BootstrapResponse, PullResponse, PushRequest, PushResponse};
use serde::Serialize;
use std::sync::Arc;

/// The sync server.
///
/// Bundles the authoritative store, the validation gate and the request
/// handler. The embedding application exposes HTTP endpoints that call
/// [`SyncServer::handle_request`] (or the typed `handle_*` methods); the
/// transport framework itself is out of scope.
///
/// # Example
///
/// ```
/// use deltasync_model::ModelRegistry;
/// use deltasync_server::SyncServer;
/// use std::sync::Arc;
///
/// let registry = Arc::new(ModelRegistry::new());
/// let server = SyncServer::new(registry);
///
/// let (status, body) = server.handle_request("GET", "/bootstrap", None, None);
/// assert_eq!(status, 200);
/// assert!(body.contains("\"syncId\":0"));
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    store: Arc<ServerStore>,
}

impl SyncServer {
    /// Creates a server that accepts all transactions.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self::with_validator(ServerConfig::default(), registry, Arc::new(AcceptAll))
    }

    /// Creates a server with an explicit config and validation gate.
    pub fn with_validator(
        config: ServerConfig,
        registry: Arc<ModelRegistry>,
        validator: Arc<dyn TransactionValidator>,
    ) -> Self {
        let store = Arc::new(ServerStore::new(registry));
        let handler = RequestHandler::new(config, Arc::clone(&store), validator);
        Self { handler, store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<ServerStore> {
        &self.store
    }

    /// Handles a bootstrap request.
    pub fn handle_bootstrap(&self) -> BootstrapResponse {
        self.handler.handle_bootstrap()
    }

    /// Handles a pull request given the raw `sinceSyncId` parameter.
    pub fn handle_pull(&self, since_sync_id: Option<&str>) -> Result<PullResponse, ServerError> {
        self.handler.handle_pull(since_sync_id)
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: &PushRequest) -> Result<PushResponse, ServerError> {
        self.handler.handle_push(request)
    }

    /// Dispatches a raw request to the matching handler.
    ///
    /// Returns `(status, json_body)` per the endpoint contracts: bootstrap
    /// and pull answer 200 (400 on a bad `sinceSyncId`), push answers 200 on
    /// acceptance and 400 with a `{success: false, delta, error}` body on a
    /// missing/empty transaction or validation failure.
    pub fn handle_request(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: Option<&str>,
    ) -> (u16, String) {
        match (method, path) {
            ("GET", "/bootstrap") => (200, to_json(&self.handle_bootstrap())),
            ("GET", "/pull") => {
                let since = query.and_then(|q| query_param(q, "sinceSyncId"));
                match self.handle_pull(since.as_deref()) {
                    Ok(response) => (200, to_json(&response)),
                    Err(e) => (e.http_status(), error_body(&e)),
                }
            }
            ("POST", "/push") => self.dispatch_push(body),
            _ => (404, error_body(&ServerError::InvalidRequest("not found".into()))),
        }
    }

    fn dispatch_push(&self, body: Option<&str>) -> (u16, String) {
        let current = self.store.current_sync_id();

        let request: PushRequest = match body.map(serde_json::from_str) {
            Some(Ok(request)) => request,
            Some(Err(e)) => {
                let response = PushResponse::rejected(current, format!("malformed push: {e}"));
                return (400, to_json(&response));
            }
            None => {
                let response = PushResponse::rejected(current, "missing transaction");
                return (400, to_json(&response));
            }
        };

        match self.handle_push(&request) {
            Ok(response) => {
                let status = if response.success { 200 } else { 400 };
                (status, to_json(&response))
            }
            Err(e) => {
                let response = PushResponse::rejected(current, e.to_string());
                (e.http_status(), to_json(&response))
            }
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!("{{\"error\":\"serialization failed: {e}\"}}"))
}

fn error_body(error: &ServerError) -> String {
    to_json(&serde_json::json!({ "error": error.to_string() }))
}

/// Extracts a parameter value from a raw query string.
fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltasync_protocol::{DataMap, SyncAction, Transaction};

    fn server() -> SyncServer {
        SyncServer::new(Arc::new(ModelRegistry::new()))
    }

    fn push_body(actions: Vec<SyncAction>) -> String {
        serde_json::to_string(&PushRequest {
            transaction: Transaction::new(actions),
        })
        .unwrap()
    }

    #[test]
    fn bootstrap_route() {
        let server = server();
        let (status, body) = server.handle_request("GET", "/bootstrap", None, None);
        assert_eq!(status, 200);
        assert!(body.contains("\"records\":[]"));
    }

    #[test]
    fn pull_route_requires_since_sync_id() {
        let server = server();

        let (status, _) = server.handle_request("GET", "/pull", Some("sinceSyncId=0"), None);
        assert_eq!(status, 200);

        let (status, _) = server.handle_request("GET", "/pull", None, None);
        assert_eq!(status, 400);

        let (status, _) = server.handle_request("GET", "/pull", Some("sinceSyncId=-3"), None);
        assert_eq!(status, 400);

        let (status, _) = server.handle_request("GET", "/pull", Some("sinceSyncId=nope"), None);
        assert_eq!(status, 400);
    }

    #[test]
    fn push_route_full_cycle() {
        let server = server();
        let body = push_body(vec![SyncAction::create("Task", "t1", DataMap::new())]);

        let (status, response) = server.handle_request("POST", "/push", None, Some(&body));
        assert_eq!(status, 200);
        assert!(response.contains("\"success\":true"));

        let (status, response) =
            server.handle_request("GET", "/pull", Some("sinceSyncId=0"), None);
        assert_eq!(status, 200);
        assert!(response.contains("\"recordId\":\"t1\""));
    }

    #[test]
    fn push_route_missing_body() {
        let server = server();
        let (status, response) = server.handle_request("POST", "/push", None, None);
        assert_eq!(status, 400);
        assert!(response.contains("\"success\":false"));
    }

    #[test]
    fn push_route_empty_transaction() {
        let server = server();
        let body = push_body(vec![]);
        let (status, response) = server.handle_request("POST", "/push", None, Some(&body));
        assert_eq!(status, 400);
        assert!(response.contains("\"success\":false"));
        assert!(response.contains("empty transaction"));
    }

    #[test]
    fn unknown_route_is_404() {
        let server = server();
        let (status, _) = server.handle_request("GET", "/unknown", None, None);
        assert_eq!(status, 404);
    }

    #[test]
    fn query_param_extraction() {
        assert_eq!(
            query_param("a=1&sinceSyncId=42", "sinceSyncId"),
            Some("42".into())
        );
        assert_eq!(query_param("a=1", "sinceSyncId"), None);
        assert_eq!(query_param("sinceSyncId=", "sinceSyncId"), Some("".into()));
    }
}
