//! Request handlers for the sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::ServerStore;
use crate::validate::TransactionValidator;
use deltasync_protocol::{BootstrapResponse, PullResponse, PushRequest, PushResponse};
use std::sync::Arc;
use tracing::debug;

/// Handler for the bootstrap, pull and push contracts.
///
/// Transport-agnostic: the embedding application maps these methods onto
/// its HTTP framework of choice, using [`ServerError::http_status`] for the
/// status code.
pub struct RequestHandler {
    config: ServerConfig,
    store: Arc<ServerStore>,
    validator: Arc<dyn TransactionValidator>,
}

impl RequestHandler {
    /// Creates a handler over a store and a validation gate.
    pub fn new(
        config: ServerConfig,
        store: Arc<ServerStore>,
        validator: Arc<dyn TransactionValidator>,
    ) -> Self {
        Self {
            config,
            store,
            validator,
        }
    }

    /// Handles `GET /bootstrap`: always-fresh full snapshot.
    pub fn handle_bootstrap(&self) -> BootstrapResponse {
        self.store.bootstrap_data()
    }

    /// Handles `GET /pull?sinceSyncId=<n>` given the raw query parameter.
    ///
    /// A missing, negative or non-numeric parameter is an invalid request
    /// (HTTP 400). A backlog longer than `max_pull_batch` is truncated with
    /// the response's `sync_id` rewound to the last included action, so the
    /// client's next pull resumes where this one stopped.
    pub fn handle_pull(&self, since_sync_id: Option<&str>) -> ServerResult<PullResponse> {
        let raw = since_sync_id
            .ok_or_else(|| ServerError::InvalidRequest("missing sinceSyncId".into()))?;

        // Reject negatives explicitly instead of letting u64 parsing fold
        // them into a generic parse failure.
        if raw.trim_start().starts_with('-') {
            return Err(ServerError::InvalidRequest(format!(
                "sinceSyncId must be non-negative, got {raw}"
            )));
        }

        let since: u64 = raw.parse().map_err(|_| {
            ServerError::InvalidRequest(format!("sinceSyncId must be a number, got {raw:?}"))
        })?;

        let mut delta = self.store.delta_since(since);
        if delta.actions.len() > self.config.max_pull_batch {
            delta.actions.truncate(self.config.max_pull_batch);
            if let Some(last) = delta.actions.last() {
                delta.sync_id = last.sync_id;
            }
            debug!(since, sync_id = delta.sync_id, "pull backlog truncated");
        }

        Ok(PullResponse { delta })
    }

    /// Handles `POST /push`.
    ///
    /// The validation gate runs before the store is touched; a rejection
    /// returns a `PushResponse` with `success: false`, an empty delta at the
    /// server's current version, and the rejection reason (HTTP 400; the
    /// caller maps it). Only an accepted transaction consumes sync ids.
    pub fn handle_push(&self, request: &PushRequest) -> ServerResult<PushResponse> {
        let transaction = &request.transaction;

        if transaction.actions.is_empty() {
            return Err(ServerError::InvalidRequest("empty transaction".into()));
        }
        if transaction.actions.len() > self.config.max_push_actions {
            return Err(ServerError::InvalidRequest(format!(
                "too many actions: {} > {}",
                transaction.actions.len(),
                self.config.max_push_actions
            )));
        }

        if let Err(reason) = self.validator.validate(transaction, &self.store) {
            debug!(tx = %transaction.id, %reason, "transaction rejected by validator");
            return Ok(PushResponse::rejected(
                self.store.current_sync_id(),
                reason,
            ));
        }

        let delta = self.store.apply_transaction(transaction);
        Ok(PushResponse::accepted(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{AcceptAll, RecordCapValidator};
    use deltasync_model::ModelRegistry;
    use deltasync_protocol::{DataMap, SyncAction, Transaction};

    fn handler_with(validator: Arc<dyn TransactionValidator>) -> RequestHandler {
        let store = Arc::new(ServerStore::new(Arc::new(ModelRegistry::new())));
        RequestHandler::new(ServerConfig::default(), store, validator)
    }

    fn handler() -> RequestHandler {
        handler_with(Arc::new(AcceptAll))
    }

    fn push(actions: Vec<SyncAction>) -> PushRequest {
        PushRequest {
            transaction: Transaction::new(actions),
        }
    }

    #[test]
    fn bootstrap_empty_store() {
        let handler = handler();
        let response = handler.handle_bootstrap();
        assert!(response.records.is_empty());
        assert_eq!(response.sync_id, 0);
    }

    #[test]
    fn pull_parses_since_sync_id() {
        let handler = handler();
        handler
            .handle_push(&push(vec![SyncAction::create("Task", "t1", DataMap::new())]))
            .unwrap();

        let response = handler.handle_pull(Some("0")).unwrap();
        assert_eq!(response.delta.actions.len(), 1);

        let response = handler.handle_pull(Some("1")).unwrap();
        assert!(response.delta.actions.is_empty());
    }

    #[test]
    fn pull_rejects_bad_parameters() {
        let handler = handler();

        for bad in [None, Some("-1"), Some("abc"), Some("1.5"), Some("")] {
            let err = handler.handle_pull(bad).unwrap_err();
            assert!(err.is_client_error(), "expected client error for {bad:?}");
        }
    }

    #[test]
    fn pull_truncates_long_backlogs() {
        let store = Arc::new(ServerStore::new(Arc::new(ModelRegistry::new())));
        let handler = RequestHandler::new(
            ServerConfig::new().with_max_pull_batch(2),
            store,
            Arc::new(AcceptAll),
        );

        for i in 0..5 {
            handler
                .handle_push(&push(vec![SyncAction::create(
                    "Task",
                    format!("t{i}"),
                    DataMap::new(),
                )]))
                .unwrap();
        }

        // First page stops after two actions, sync id rewound to match
        let page = handler.handle_pull(Some("0")).unwrap().delta;
        assert_eq!(page.actions.len(), 2);
        assert_eq!(page.sync_id, 2);

        // Resuming from the page boundary walks the rest of the backlog
        let page = handler.handle_pull(Some("2")).unwrap().delta;
        assert_eq!(page.actions.len(), 2);
        assert_eq!(page.sync_id, 4);

        let page = handler.handle_pull(Some("4")).unwrap().delta;
        assert_eq!(page.actions.len(), 1);
        assert_eq!(page.sync_id, 5);
    }

    #[test]
    fn push_accepts_and_returns_delta() {
        let handler = handler();
        let response = handler
            .handle_push(&push(vec![SyncAction::create("Task", "t1", DataMap::new())]))
            .unwrap();

        assert!(response.success);
        assert_eq!(response.delta.sync_id, 1);
        assert_eq!(response.delta.actions.len(), 1);
    }

    #[test]
    fn push_rejects_empty_transaction() {
        let handler = handler();
        let err = handler.handle_push(&push(vec![])).unwrap_err();
        assert!(matches!(err, ServerError::InvalidRequest(_)));
    }

    #[test]
    fn push_rejects_oversized_transaction() {
        let store = Arc::new(ServerStore::new(Arc::new(ModelRegistry::new())));
        let handler = RequestHandler::new(
            ServerConfig::new().with_max_push_actions(1),
            store,
            Arc::new(AcceptAll),
        );

        let err = handler
            .handle_push(&push(vec![
                SyncAction::delete("Task", "a"),
                SyncAction::delete("Task", "b"),
            ]))
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidRequest(_)));
    }

    #[test]
    fn validator_rejection_consumes_no_sync_ids() {
        let handler = handler_with(Arc::new(RecordCapValidator::new("Task", 0)));

        let response = handler
            .handle_push(&push(vec![SyncAction::create("Task", "t1", DataMap::new())]))
            .unwrap();

        assert!(!response.success);
        assert!(response.error.is_some());
        assert_eq!(response.delta.sync_id, 0);
        assert!(response.delta.is_empty());

        // A later accepted push starts at sync id 1
        let response = handler
            .handle_push(&push(vec![SyncAction::delete("Task", "ghost")]))
            .unwrap();
        assert!(response.success);
        assert_eq!(response.delta.sync_id, 1);
    }
}
