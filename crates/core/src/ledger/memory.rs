use std::cmp::Reverse;

use tokio::sync::RwLock;

use crate::domain::approval::{ApprovalAction, ApprovalId, ApprovalRecord, ReviewUpdate};
use crate::errors::StoreError;

use super::{ActivityFilter, ApprovalStore, RecordFilter, ReviewOutcome};

#[derive(Default)]
struct LedgerState {
    records: Vec<ApprovalRecord>,
    actions: Vec<ApprovalAction>,
}

/// Approval store kept in process memory. The write lock is held across the whole
/// check-and-set, which gives reviews the same exactly-once outcome as the SQL store.
#[derive(Default)]
pub struct InMemoryApprovalStore {
    state: RwLock<LedgerState>,
}

#[async_trait::async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn find_record(&self, id: &ApprovalId) -> Result<Option<ApprovalRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.records.iter().find(|record| &record.id == id).cloned())
    }

    async fn insert_version(
        &self,
        record: &ApprovalRecord,
        action: &ApprovalAction,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if state.records.iter().any(|existing| existing.id == record.id) {
            return Err(StoreError::Conflict(format!("approval `{}` already exists", record.id.0)));
        }
        match &record.previous_version_id {
            Some(previous_id) => {
                let has_successor = state
                    .records
                    .iter()
                    .any(|existing| existing.previous_version_id.as_ref() == Some(previous_id));
                if has_successor {
                    return Err(StoreError::Conflict(format!(
                        "approval `{}` already has a successor",
                        previous_id.0
                    )));
                }
            }
            None => {
                let has_chain = state.records.iter().any(|existing| {
                    existing.site_ref == record.site_ref && existing.previous_version_id.is_none()
                });
                if has_chain {
                    return Err(StoreError::Conflict(format!(
                        "site `{}` already has an approval chain",
                        record.site_ref.0
                    )));
                }
            }
        }

        state.records.push(record.clone());
        state.actions.push(action.clone());
        Ok(())
    }

    async fn apply_review(
        &self,
        update: &ReviewUpdate,
        action: &ApprovalAction,
    ) -> Result<ReviewOutcome, StoreError> {
        let mut state = self.state.write().await;

        let Some(record) =
            state.records.iter_mut().find(|record| record.id == update.approval_id)
        else {
            return Ok(ReviewOutcome::Missing);
        };
        if record.status.is_terminal() {
            return Ok(ReviewOutcome::NotPending(record.status));
        }

        record.apply_review(update);
        let reviewed = record.clone();
        state.actions.push(action.clone());
        Ok(ReviewOutcome::Applied(reviewed))
    }

    async fn list_actions(&self, id: &ApprovalId) -> Result<Vec<ApprovalAction>, StoreError> {
        let state = self.state.read().await;
        let mut actions: Vec<ApprovalAction> =
            state.actions.iter().filter(|action| &action.approval_id == id).cloned().collect();
        actions.sort_by_key(|action| action.performed_at);
        Ok(actions)
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<ApprovalRecord> =
            state.records.iter().filter(|record| filter.matches(record)).cloned().collect();
        records.sort_by_key(|record| Reverse((record.submitted_at, record.version)));
        if let Some(limit) = filter.limit {
            records.truncate(limit as usize);
        }
        Ok(records)
    }

    async fn list_recent_actions(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ApprovalAction>, StoreError> {
        let state = self.state.read().await;
        let mut actions: Vec<ApprovalAction> = state
            .actions
            .iter()
            .filter(|action| match &filter.submitter_id {
                Some(submitter_id) => state.records.iter().any(|record| {
                    record.id == action.approval_id && &record.submitter_id == submitter_id
                }),
                None => true,
            })
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal timestamps, so reverse it first
        actions.reverse();
        actions.sort_by_key(|action| Reverse(action.performed_at));
        actions.truncate(filter.limit as usize);
        Ok(actions)
    }
}
