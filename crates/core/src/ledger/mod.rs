//! Versioned approval ledger.
//!
//! Each submission creates one pending [`ApprovalRecord`]. A review moves it to a terminal
//! status exactly once, and a resubmission starts a new record linked to its
//! predecessor. Every write lands together with its audit action in a single store call.

pub mod memory;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::domain::approval::{
    ActionId, Actor, ApprovalAction, ApprovalActionKind, ApprovalId, ApprovalRecord,
    ApprovalStatus, ReviewDecision, ReviewUpdate, SiteRef,
};
use crate::domain::cost::CostBreakdown;
use crate::errors::{StoreError, WorkflowError};
use crate::scoping::validator::ValidatedSelection;

pub use memory::InMemoryApprovalStore;

pub const CHANGES_SUMMARY_KEY: &str = "changes_summary";
pub const PREVIOUS_VERSION_KEY: &str = "previous_version_id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewOutcome {
    Applied(ApprovalRecord),
    NotPending(ApprovalStatus),
    Missing,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub site_ref: Option<SiteRef>,
    pub submitter_id: Option<String>,
    pub reviewer_id: Option<String>,
    pub status: Option<ApprovalStatus>,
    pub limit: Option<u32>,
}

impl RecordFilter {
    pub fn matches(&self, record: &ApprovalRecord) -> bool {
        self.site_ref.as_ref().map_or(true, |site_ref| &record.site_ref == site_ref)
            && self
                .submitter_id
                .as_ref()
                .map_or(true, |submitter_id| &record.submitter_id == submitter_id)
            && self
                .reviewer_id
                .as_ref()
                .map_or(true, |reviewer_id| record.reviewer_id.as_ref() == Some(reviewer_id))
            && self.status.map_or(true, |status| record.status == status)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    /// Only actions on records submitted by this actor.
    pub submitter_id: Option<String>,
    pub limit: u32,
}

/// Persistence port for approval records and their audit trail.
///
/// Listings of records are newest first (`submitted_at`, then `version`, descending).
/// Action listings for one record are oldest first.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn find_record(&self, id: &ApprovalId) -> Result<Option<ApprovalRecord>, StoreError>;

    /// Inserts a new version and its audit action atomically. Reports
    /// [`StoreError::Conflict`] when the predecessor already has a successor or when the
    /// site already has a chain.
    async fn insert_version(
        &self,
        record: &ApprovalRecord,
        action: &ApprovalAction,
    ) -> Result<(), StoreError>;

    /// Applies the review only while the record is still pending, together with the
    /// audit action.
    async fn apply_review(
        &self,
        update: &ReviewUpdate,
        action: &ApprovalAction,
    ) -> Result<ReviewOutcome, StoreError>;

    async fn list_actions(&self, id: &ApprovalId) -> Result<Vec<ApprovalAction>, StoreError>;

    async fn list_records(&self, filter: &RecordFilter)
        -> Result<Vec<ApprovalRecord>, StoreError>;

    /// Newest first.
    async fn list_recent_actions(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ApprovalAction>, StoreError>;
}

#[derive(Clone, Debug)]
pub struct NewSubmission {
    pub site_ref: SiteRef,
    pub site_name: String,
    pub selection: ValidatedSelection,
    pub costs: CostBreakdown,
    pub comment: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Resubmission {
    pub previous_id: ApprovalId,
    pub selection: ValidatedSelection,
    pub costs: CostBreakdown,
    pub changes_summary: String,
}

#[derive(Clone, Debug)]
pub struct ReviewRequest {
    pub approval_id: ApprovalId,
    pub decision: ReviewDecision,
    pub comment: Option<String>,
    pub rejection_reason: Option<String>,
}

pub struct ApprovalLedger<S> {
    store: S,
}

impl<S> ApprovalLedger<S>
where
    S: ApprovalStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn submit(
        &self,
        submission: NewSubmission,
        submitter: &Actor,
        timeout: Duration,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let existing = bounded(
            "list_records",
            timeout,
            self.store.list_records(&RecordFilter {
                site_ref: Some(submission.site_ref.clone()),
                limit: Some(1),
                ..RecordFilter::default()
            }),
        )
        .await?;
        if let Some(current) = existing.first() {
            return Err(WorkflowError::InvalidState(format!(
                "site `{}` already has approval chain (current `{}` is {}); resubmit instead",
                submission.site_ref.0,
                current.id.0,
                current.status.as_str()
            )));
        }

        let now = now();
        let record = ApprovalRecord {
            id: ApprovalId(Uuid::new_v4().to_string()),
            site_ref: submission.site_ref,
            site_name: submission.site_name,
            submitter_id: submitter.id.clone(),
            submitter_name: submitter.name.clone(),
            reviewer_id: None,
            reviewer_name: None,
            status: ApprovalStatus::Pending,
            submitted_at: now,
            reviewed_at: None,
            review_comment: None,
            rejection_reason: None,
            selection: submission.selection.into_inner(),
            costs: submission.costs,
            version: 1,
            previous_version_id: None,
        };
        let action = new_action(
            &record.id,
            ApprovalActionKind::Submit,
            submitter,
            now,
            submission.comment,
            BTreeMap::new(),
        );

        bounded("insert_version", timeout, self.store.insert_version(&record, &action)).await?;
        Ok(record)
    }

    pub async fn review(
        &self,
        request: ReviewRequest,
        reviewer: &Actor,
        timeout: Duration,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let now = now();
        let rejection_reason = match request.decision {
            ReviewDecision::Reject => request.rejection_reason.or_else(|| request.comment.clone()),
            _ => None,
        };
        let update = ReviewUpdate {
            approval_id: request.approval_id.clone(),
            status: request.decision.resulting_status(),
            reviewer_id: reviewer.id.clone(),
            reviewer_name: reviewer.name.clone(),
            reviewed_at: now,
            review_comment: request.comment.clone(),
            rejection_reason,
        };
        let action = new_action(
            &request.approval_id,
            request.decision.action_kind(),
            reviewer,
            now,
            request.comment,
            BTreeMap::new(),
        );

        let outcome =
            bounded("apply_review", timeout, self.store.apply_review(&update, &action)).await?;
        match outcome {
            ReviewOutcome::Applied(record) => Ok(record),
            ReviewOutcome::NotPending(status) => Err(WorkflowError::Concurrency {
                approval_id: request.approval_id.0,
                status,
            }),
            ReviewOutcome::Missing => Err(not_found(&request.approval_id)),
        }
    }

    pub async fn resubmit(
        &self,
        resubmission: Resubmission,
        submitter: &Actor,
        timeout: Duration,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let previous = self.require(&resubmission.previous_id, timeout).await?;
        if !previous.status.is_resubmittable() {
            return Err(WorkflowError::InvalidState(format!(
                "approval `{}` is {} and cannot be resubmitted",
                previous.id.0,
                previous.status.as_str()
            )));
        }

        let now = now();
        let record = ApprovalRecord {
            id: ApprovalId(Uuid::new_v4().to_string()),
            site_ref: previous.site_ref.clone(),
            site_name: previous.site_name.clone(),
            submitter_id: submitter.id.clone(),
            submitter_name: submitter.name.clone(),
            reviewer_id: None,
            reviewer_name: None,
            status: ApprovalStatus::Pending,
            submitted_at: now,
            reviewed_at: None,
            review_comment: None,
            rejection_reason: None,
            selection: resubmission.selection.into_inner(),
            costs: resubmission.costs,
            version: previous.version + 1,
            previous_version_id: Some(previous.id.clone()),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(CHANGES_SUMMARY_KEY.to_owned(), resubmission.changes_summary.clone());
        metadata.insert(PREVIOUS_VERSION_KEY.to_owned(), previous.id.0.clone());
        let action = new_action(
            &record.id,
            ApprovalActionKind::Resubmit,
            submitter,
            now,
            Some(resubmission.changes_summary),
            metadata,
        );

        bounded("insert_version", timeout, self.store.insert_version(&record, &action)).await?;
        Ok(record)
    }

    pub async fn history(
        &self,
        approval_id: &ApprovalId,
        timeout: Duration,
    ) -> Result<Vec<ApprovalAction>, WorkflowError> {
        self.require(approval_id, timeout).await?;
        bounded("list_actions", timeout, self.store.list_actions(approval_id)).await
    }

    /// Version chain from version 1 up to `approval_id`.
    pub async fn lineage(
        &self,
        approval_id: &ApprovalId,
        timeout: Duration,
    ) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        let mut current = self.require(approval_id, timeout).await?;
        let mut chain = Vec::with_capacity(current.version as usize);

        while let Some(previous_id) = current.previous_version_id.clone() {
            if chain.len() >= current.version as usize {
                return Err(WorkflowError::Storage(format!(
                    "version chain of `{}` does not terminate",
                    approval_id.0
                )));
            }
            let previous = self.require(&previous_id, timeout).await?;
            chain.push(current);
            current = previous;
        }

        chain.push(current);
        chain.reverse();
        Ok(chain)
    }

    pub async fn current_for_site(
        &self,
        site_ref: &SiteRef,
        timeout: Duration,
    ) -> Result<Option<ApprovalRecord>, WorkflowError> {
        let records = bounded(
            "list_records",
            timeout,
            self.store.list_records(&RecordFilter {
                site_ref: Some(site_ref.clone()),
                ..RecordFilter::default()
            }),
        )
        .await?;

        Ok(records.into_iter().max_by_key(|record| record.version))
    }

    pub async fn find(
        &self,
        approval_id: &ApprovalId,
        timeout: Duration,
    ) -> Result<Option<ApprovalRecord>, WorkflowError> {
        bounded("find_record", timeout, self.store.find_record(approval_id)).await
    }

    pub async fn list(
        &self,
        filter: &RecordFilter,
        timeout: Duration,
    ) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        bounded("list_records", timeout, self.store.list_records(filter)).await
    }

    pub async fn recent_activity(
        &self,
        filter: &ActivityFilter,
        timeout: Duration,
    ) -> Result<Vec<ApprovalAction>, WorkflowError> {
        bounded("list_recent_actions", timeout, self.store.list_recent_actions(filter)).await
    }

    async fn require(
        &self,
        approval_id: &ApprovalId,
        timeout: Duration,
    ) -> Result<ApprovalRecord, WorkflowError> {
        self.find(approval_id, timeout).await?.ok_or_else(|| not_found(approval_id))
    }
}

/// Runs one storage call under `timeout`. Expiry is reported, never retried.
pub(crate) async fn bounded<T, F>(
    operation: &'static str,
    timeout: Duration,
    future: F,
) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(WorkflowError::from),
        Err(_) => Err(WorkflowError::StorageTimeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

fn not_found(approval_id: &ApprovalId) -> WorkflowError {
    WorkflowError::NotFound { entity: "approval", id: approval_id.0.clone() }
}

/// Storage keeps microsecond precision, so records are stamped at that precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn new_action(
    approval_id: &ApprovalId,
    action: ApprovalActionKind,
    actor: &Actor,
    performed_at: DateTime<Utc>,
    comment: Option<String>,
    metadata: BTreeMap<String, String>,
) -> ApprovalAction {
    ApprovalAction {
        id: ActionId(Uuid::new_v4().to_string()),
        approval_id: approval_id.clone(),
        action,
        actor_id: actor.id.clone(),
        actor_role: actor.role,
        performed_at,
        comment,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{
        ActivityFilter, ApprovalLedger, ApprovalStore, InMemoryApprovalStore, NewSubmission,
        RecordFilter, Resubmission, ReviewOutcome, ReviewRequest, CHANGES_SUMMARY_KEY,
    };
    use crate::domain::approval::{
        Actor, ActorRole, ApprovalAction, ApprovalActionKind, ApprovalId, ApprovalRecord,
        ApprovalStatus, ReviewDecision, ReviewUpdate, SiteRef,
    };
    use crate::domain::cost::CostBreakdown;
    use crate::domain::selection::Selection;
    use crate::errors::{StoreError, WorkflowError};
    use crate::scoping::fixtures::demo_catalog;
    use crate::scoping::recommendation::derive_recommendations;
    use crate::scoping::validator::{admit, ValidatedSelection};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn engineer() -> Actor {
        Actor::new("eng-1", "Erin Engineer", ActorRole::DeploymentEngineer)
    }

    fn manager() -> Actor {
        Actor::new("ops-1", "Morgan Manager", ActorRole::OpsManager)
    }

    fn validated(terminals: u32) -> ValidatedSelection {
        let catalog = demo_catalog();
        let selection =
            Selection::new().with_module("pos").with_equipment("terminal", terminals);
        let recommendations = derive_recommendations(&selection.module_ids(), &catalog);
        admit(selection, &recommendations).expect("valid selection")
    }

    fn submission(site: &str) -> NewSubmission {
        NewSubmission {
            site_ref: SiteRef(site.to_owned()),
            site_name: format!("Store {site}"),
            selection: validated(1),
            costs: CostBreakdown::default(),
            comment: None,
        }
    }

    fn review(id: &ApprovalId, decision: ReviewDecision, comment: &str) -> ReviewRequest {
        ReviewRequest {
            approval_id: id.clone(),
            decision,
            comment: Some(comment.to_owned()),
            rejection_reason: None,
        }
    }

    #[tokio::test]
    async fn submit_creates_pending_version_one_with_submit_action() {
        let ledger = ApprovalLedger::new(InMemoryApprovalStore::default());

        let record = ledger.submit(submission("site-1"), &engineer(), TIMEOUT).await.expect("submit");

        assert_eq!(record.status, ApprovalStatus::Pending);
        assert_eq!(record.version, 1);
        assert_eq!(record.previous_version_id, None);
        let history = ledger.history(&record.id, TIMEOUT).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, ApprovalActionKind::Submit);
        assert_eq!(history[0].actor_role, ActorRole::DeploymentEngineer);
    }

    #[tokio::test]
    async fn second_submit_for_same_site_is_invalid_state() {
        let ledger = ApprovalLedger::new(InMemoryApprovalStore::default());
        ledger.submit(submission("site-1"), &engineer(), TIMEOUT).await.expect("first submit");

        let error = ledger
            .submit(submission("site-1"), &engineer(), TIMEOUT)
            .await
            .expect_err("second submit must fail");

        assert!(matches!(error, WorkflowError::InvalidState(_)));
    }

    #[tokio::test]
    async fn reject_defaults_reason_to_comment_and_blocks_second_review() {
        let ledger = ApprovalLedger::new(InMemoryApprovalStore::default());
        let record = ledger.submit(submission("site-1"), &engineer(), TIMEOUT).await.expect("submit");

        let rejected = ledger
            .review(review(&record.id, ReviewDecision::Reject, "too many terminals"), &manager(), TIMEOUT)
            .await
            .expect("reject");
        assert_eq!(rejected.status, ApprovalStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("too many terminals"));
        assert_eq!(rejected.reviewer_id.as_deref(), Some("ops-1"));
        assert!(rejected.reviewed_at.is_some());

        let error = ledger
            .review(review(&record.id, ReviewDecision::Approve, "ok"), &manager(), TIMEOUT)
            .await
            .expect_err("second review must fail");
        assert!(matches!(
            error,
            WorkflowError::Concurrency { status: ApprovalStatus::Rejected, .. }
        ));
        assert_eq!(ledger.history(&record.id, TIMEOUT).await.expect("history").len(), 2);
    }

    #[tokio::test]
    async fn review_of_unknown_record_is_not_found() {
        let ledger = ApprovalLedger::new(InMemoryApprovalStore::default());

        let error = ledger
            .review(review(&ApprovalId("missing".to_owned()), ReviewDecision::Approve, "ok"), &manager(), TIMEOUT)
            .await
            .expect_err("unknown id");

        assert!(matches!(error, WorkflowError::NotFound { entity: "approval", .. }));
    }

    #[tokio::test]
    async fn resubmit_after_rejection_links_new_version() {
        let ledger = ApprovalLedger::new(InMemoryApprovalStore::default());
        let first = ledger.submit(submission("site-1"), &engineer(), TIMEOUT).await.expect("submit");
        ledger
            .review(review(&first.id, ReviewDecision::Reject, "needs scanner"), &manager(), TIMEOUT)
            .await
            .expect("reject");

        let second = ledger
            .resubmit(
                Resubmission {
                    previous_id: first.id.clone(),
                    selection: validated(2),
                    costs: CostBreakdown::default(),
                    changes_summary: "added a second terminal".to_owned(),
                },
                &engineer(),
                TIMEOUT,
            )
            .await
            .expect("resubmit");

        assert_eq!(second.version, 2);
        assert_eq!(second.status, ApprovalStatus::Pending);
        assert_eq!(second.previous_version_id.as_ref(), Some(&first.id));
        assert_eq!(second.site_ref, first.site_ref);

        let first_history: Vec<ApprovalActionKind> = ledger
            .history(&first.id, TIMEOUT)
            .await
            .expect("history")
            .into_iter()
            .map(|action| action.action)
            .collect();
        assert_eq!(first_history, vec![ApprovalActionKind::Submit, ApprovalActionKind::Reject]);

        let second_history = ledger.history(&second.id, TIMEOUT).await.expect("history");
        assert_eq!(second_history.len(), 1);
        assert_eq!(second_history[0].action, ApprovalActionKind::Resubmit);
        assert_eq!(
            second_history[0].metadata.get(CHANGES_SUMMARY_KEY).map(String::as_str),
            Some("added a second terminal")
        );

        let lineage = ledger.lineage(&second.id, TIMEOUT).await.expect("lineage");
        assert_eq!(lineage.iter().map(|record| record.version).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(lineage[0].previous_version_id, None);

        let current = ledger
            .current_for_site(&SiteRef("site-1".to_owned()), TIMEOUT)
            .await
            .expect("current");
        assert_eq!(current.map(|record| record.id), Some(second.id));
    }

    #[tokio::test]
    async fn resubmit_rules_follow_status() {
        let ledger = ApprovalLedger::new(InMemoryApprovalStore::default());
        let first = ledger.submit(submission("site-1"), &engineer(), TIMEOUT).await.expect("submit");
        let resubmission = |previous_id: ApprovalId| Resubmission {
            previous_id,
            selection: validated(1),
            costs: CostBreakdown::default(),
            changes_summary: "retry".to_owned(),
        };

        let pending = ledger
            .resubmit(resubmission(first.id.clone()), &engineer(), TIMEOUT)
            .await
            .expect_err("pending is not resubmittable");
        assert!(matches!(pending, WorkflowError::InvalidState(_)));

        let missing = ledger
            .resubmit(resubmission(ApprovalId("nope".to_owned())), &engineer(), TIMEOUT)
            .await
            .expect_err("unknown previous");
        assert!(matches!(missing, WorkflowError::NotFound { .. }));

        ledger
            .review(review(&first.id, ReviewDecision::RequestChanges, "swap scanner"), &manager(), TIMEOUT)
            .await
            .expect("request changes");
        ledger
            .resubmit(resubmission(first.id.clone()), &engineer(), TIMEOUT)
            .await
            .expect("first successor");
        let duplicate = ledger
            .resubmit(resubmission(first.id.clone()), &engineer(), TIMEOUT)
            .await
            .expect_err("second successor");
        assert!(matches!(duplicate, WorkflowError::InvalidState(_)));
    }

    #[tokio::test]
    async fn approved_record_cannot_be_resubmitted() {
        let ledger = ApprovalLedger::new(InMemoryApprovalStore::default());
        let first = ledger.submit(submission("site-1"), &engineer(), TIMEOUT).await.expect("submit");
        ledger
            .review(review(&first.id, ReviewDecision::Approve, "looks good"), &manager(), TIMEOUT)
            .await
            .expect("approve");

        let error = ledger
            .resubmit(
                Resubmission {
                    previous_id: first.id,
                    selection: validated(1),
                    costs: CostBreakdown::default(),
                    changes_summary: "again".to_owned(),
                },
                &engineer(),
                TIMEOUT,
            )
            .await
            .expect_err("approved spawns nothing");

        assert!(matches!(error, WorkflowError::InvalidState(_)));
    }

    #[tokio::test]
    async fn concurrent_reviews_yield_exactly_one_decision() {
        let ledger = Arc::new(ApprovalLedger::new(InMemoryApprovalStore::default()));
        let record = ledger.submit(submission("site-1"), &engineer(), TIMEOUT).await.expect("submit");

        let mut handles = Vec::new();
        for decision in [ReviewDecision::Approve, ReviewDecision::Reject, ReviewDecision::RequestChanges] {
            let ledger = Arc::clone(&ledger);
            let request = review(&record.id, decision, "race");
            handles.push(tokio::spawn(async move {
                ledger.review(request, &manager(), TIMEOUT).await
            }));
        }

        let mut applied = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.expect("join") {
                Ok(_) => applied += 1,
                Err(WorkflowError::Concurrency { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(conflicts, 2);
        let decisions = ledger
            .history(&record.id, TIMEOUT)
            .await
            .expect("history")
            .into_iter()
            .filter(|action| action.action.is_review())
            .count();
        assert_eq!(decisions, 1);
    }

    struct StalledStore;

    #[async_trait]
    impl ApprovalStore for StalledStore {
        async fn find_record(&self, _id: &ApprovalId) -> Result<Option<ApprovalRecord>, StoreError> {
            std::future::pending().await
        }

        async fn insert_version(
            &self,
            _record: &ApprovalRecord,
            _action: &ApprovalAction,
        ) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn apply_review(
            &self,
            _update: &ReviewUpdate,
            _action: &ApprovalAction,
        ) -> Result<ReviewOutcome, StoreError> {
            std::future::pending().await
        }

        async fn list_actions(&self, _id: &ApprovalId) -> Result<Vec<ApprovalAction>, StoreError> {
            std::future::pending().await
        }

        async fn list_records(
            &self,
            _filter: &RecordFilter,
        ) -> Result<Vec<ApprovalRecord>, StoreError> {
            std::future::pending().await
        }

        async fn list_recent_actions(
            &self,
            _filter: &ActivityFilter,
        ) -> Result<Vec<ApprovalAction>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_storage_surfaces_timeout() {
        let ledger = ApprovalLedger::new(StalledStore);

        let error = ledger
            .review(
                review(&ApprovalId("apr-1".to_owned()), ReviewDecision::Approve, "ok"),
                &manager(),
                Duration::from_millis(20),
            )
            .await
            .expect_err("timeout");

        assert!(matches!(
            error,
            WorkflowError::StorageTimeout { operation: "apply_review", timeout_ms: 20 }
        ));
    }
}
