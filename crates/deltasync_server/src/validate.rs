//! The transaction validation gate.

use crate::store::ServerStore;
use deltasync_protocol::{ActionType, Transaction};

/// Validates transactions before they reach the store.
///
/// The store itself never validates; this gate runs first and a rejection
/// means [`ServerStore::apply_transaction`] is not called at all, so a
/// rejected transaction consumes zero sync ids. Implementations carry the
/// entity-specific rules (field limits, content policy, record caps) that
/// the core treats as external.
pub trait TransactionValidator: Send + Sync {
    /// Accepts or rejects the whole transaction.
    fn validate(&self, transaction: &Transaction, store: &ServerStore) -> Result<(), String>;
}

/// A validator that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl TransactionValidator for AcceptAll {
    fn validate(&self, _transaction: &Transaction, _store: &ServerStore) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects transactions that would push a model past a record cap.
///
/// Counts only live records plus the creates in the incoming transaction;
/// an example of a capacity gate built on [`ServerStore::record_count`].
#[derive(Debug, Clone)]
pub struct RecordCapValidator {
    model: String,
    max_records: usize,
}

impl RecordCapValidator {
    /// Creates a cap of `max_records` live records for `model`.
    pub fn new(model: impl Into<String>, max_records: usize) -> Self {
        Self {
            model: model.into(),
            max_records,
        }
    }
}

impl TransactionValidator for RecordCapValidator {
    fn validate(&self, transaction: &Transaction, store: &ServerStore) -> Result<(), String> {
        let creates = transaction
            .actions
            .iter()
            .filter(|a| a.action_type == ActionType::Create && a.model_name == self.model)
            .count();

        if creates == 0 {
            return Ok(());
        }

        let current = store.record_count(&self.model);
        if current + creates > self.max_records {
            return Err(format!(
                "record cap exceeded for {}: {} existing + {} new > {}",
                self.model, current, creates, self.max_records
            ));
        }
        Ok(())
    }
}
