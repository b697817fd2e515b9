//! Scoping workflow façade: catalog lookup, evaluation, ledger writes and the
//! post-approval site status hand-off.

pub mod dashboard;
pub mod ports;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::approval::{
    Actor, ApprovalAction, ApprovalId, ApprovalRecord, ApprovalStatus, SiteRef,
};
use crate::domain::catalog::CatalogSnapshot;
use crate::domain::selection::Selection;
use crate::errors::WorkflowError;
use crate::ledger::{
    bounded, ActivityFilter, ApprovalLedger, ApprovalStore, NewSubmission, RecordFilter,
    Resubmission, ReviewRequest,
};
use crate::scoping::cost::DeterministicCostEngine;
use crate::scoping::recommendation::DeterministicRecommendationEngine;
use crate::scoping::validator::DeterministicSelectionValidator;
use crate::scoping::{DeterministicScopingRuntime, ScopingEvaluation, ScopingRuntime};

pub use dashboard::{Dashboard, DashboardStatistics};
pub use ports::{
    CatalogSource, InMemoryCatalog, LifecycleError, NoopSiteLifecycle, RecordingSiteLifecycle,
    SiteLifecycle, StatusTransition, READY_FOR_PROCUREMENT,
};

/// Per-call identity and limits.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub actor: Actor,
    pub correlation_id: String,
    pub storage_timeout: Duration,
}

impl RequestContext {
    pub fn new(actor: Actor, correlation_id: impl Into<String>, storage_timeout: Duration) -> Self {
        Self { actor, correlation_id: correlation_id.into(), storage_timeout }
    }
}

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub lifecycle_timeout: Duration,
    pub dashboard_activity_limit: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self { lifecycle_timeout: Duration::from_secs(3), dashboard_activity_limit: 20 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitForApproval {
    pub site_ref: SiteRef,
    pub site_name: String,
    pub selection: Selection,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubmitApproval {
    pub previous_id: ApprovalId,
    pub selection: Selection,
    pub changes_summary: String,
}

/// Result of a review. `warnings` carries downstream failures that did not undo the
/// decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReceipt {
    pub record: ApprovalRecord,
    pub warnings: Vec<String>,
}

pub struct ScopingWorkflow<S, C, L> {
    ledger: ApprovalLedger<S>,
    catalog: C,
    lifecycle: L,
    runtime: DeterministicScopingRuntime<
        DeterministicRecommendationEngine,
        DeterministicSelectionValidator,
        DeterministicCostEngine,
    >,
    settings: WorkflowSettings,
}

impl<S, C, L> ScopingWorkflow<S, C, L>
where
    S: ApprovalStore,
    C: CatalogSource,
    L: SiteLifecycle,
{
    pub fn new(store: S, catalog: C, lifecycle: L, settings: WorkflowSettings) -> Self {
        Self {
            ledger: ApprovalLedger::new(store),
            catalog,
            lifecycle,
            runtime: DeterministicScopingRuntime::default(),
            settings,
        }
    }

    pub fn ledger(&self) -> &ApprovalLedger<S> {
        &self.ledger
    }

    pub async fn load_catalog(
        &self,
        context: &RequestContext,
    ) -> Result<CatalogSnapshot, WorkflowError> {
        let timeout = context.storage_timeout;
        let modules =
            bounded("list_capability_modules", timeout, self.catalog.list_capability_modules())
                .await?;
        let equipment =
            bounded("list_equipment_items", timeout, self.catalog.list_equipment_items()).await?;
        let recommendation_rules = bounded(
            "list_recommendation_rules",
            timeout,
            self.catalog.list_recommendation_rules(),
        )
        .await?;
        let business_rules =
            bounded("list_business_rules", timeout, self.catalog.list_business_rules()).await?;

        Ok(CatalogSnapshot::new(modules, equipment, recommendation_rules, business_rules))
    }

    /// Recommendations, validation and costs for a selection without persisting anything.
    pub async fn preview(
        &self,
        context: &RequestContext,
        selection: &Selection,
    ) -> Result<ScopingEvaluation, WorkflowError> {
        let catalog = self.load_catalog(context).await?;
        check_catalog_references(selection, &catalog)?;
        Ok(self.runtime.evaluate(selection, &catalog))
    }

    pub async fn submit_for_approval(
        &self,
        context: &RequestContext,
        request: SubmitForApproval,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let catalog = self.load_catalog(context).await?;
        check_catalog_references(&request.selection, &catalog)?;
        let evaluation = self.runtime.evaluate(&request.selection, &catalog);
        let selection = evaluation
            .validation
            .into_validated(request.selection)
            .map_err(|violations| WorkflowError::Validation { violations })?;

        let record = self
            .ledger
            .submit(
                NewSubmission {
                    site_ref: request.site_ref,
                    site_name: request.site_name,
                    selection,
                    costs: evaluation.costs,
                    comment: request.comment,
                },
                &context.actor,
                context.storage_timeout,
            )
            .await?;

        info!(
            event_name = "scoping.approval.submitted",
            correlation_id = %context.correlation_id,
            approval_id = %record.id.0,
            site_ref = %record.site_ref.0,
            submitter_id = %record.submitter_id,
            one_time_total = %record.costs.totals.one_time,
            "scoping submitted for approval"
        );
        Ok(record)
    }

    pub async fn review_approval(
        &self,
        context: &RequestContext,
        request: ReviewRequest,
    ) -> Result<ReviewReceipt, WorkflowError> {
        let record =
            self.ledger.review(request, &context.actor, context.storage_timeout).await?;

        info!(
            event_name = "scoping.approval.reviewed",
            correlation_id = %context.correlation_id,
            approval_id = %record.id.0,
            site_ref = %record.site_ref.0,
            status = record.status.as_str(),
            reviewer_id = %context.actor.id,
            "scoping approval reviewed"
        );

        let mut warnings = Vec::new();
        if record.status == ApprovalStatus::Approved {
            if let Err(error) = self.advance_site(&record, &context.actor).await {
                warn!(
                    event_name = "scoping.site_lifecycle.failed",
                    correlation_id = %context.correlation_id,
                    approval_id = %record.id.0,
                    site_ref = %record.site_ref.0,
                    error = %error,
                    "site status update failed after approval"
                );
                warnings.push(format!(
                    "site `{}` was not moved to {READY_FOR_PROCUREMENT}: {error}",
                    record.site_ref.0
                ));
            }
        }

        Ok(ReviewReceipt { record, warnings })
    }

    pub async fn resubmit_approval(
        &self,
        context: &RequestContext,
        request: ResubmitApproval,
    ) -> Result<ApprovalRecord, WorkflowError> {
        let catalog = self.load_catalog(context).await?;
        check_catalog_references(&request.selection, &catalog)?;
        let evaluation = self.runtime.evaluate(&request.selection, &catalog);
        let selection = evaluation
            .validation
            .into_validated(request.selection)
            .map_err(|violations| WorkflowError::Validation { violations })?;

        let record = self
            .ledger
            .resubmit(
                Resubmission {
                    previous_id: request.previous_id,
                    selection,
                    costs: evaluation.costs,
                    changes_summary: request.changes_summary,
                },
                &context.actor,
                context.storage_timeout,
            )
            .await?;

        info!(
            event_name = "scoping.approval.resubmitted",
            correlation_id = %context.correlation_id,
            approval_id = %record.id.0,
            site_ref = %record.site_ref.0,
            version = record.version,
            "scoping resubmitted for approval"
        );
        Ok(record)
    }

    pub async fn get_history(
        &self,
        context: &RequestContext,
        approval_id: &ApprovalId,
    ) -> Result<Vec<ApprovalAction>, WorkflowError> {
        self.ledger.history(approval_id, context.storage_timeout).await
    }

    pub async fn lineage(
        &self,
        context: &RequestContext,
        approval_id: &ApprovalId,
    ) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        self.ledger.lineage(approval_id, context.storage_timeout).await
    }

    pub async fn get_approval(
        &self,
        context: &RequestContext,
        approval_id: &ApprovalId,
    ) -> Result<ApprovalRecord, WorkflowError> {
        self.ledger.find(approval_id, context.storage_timeout).await?.ok_or_else(|| {
            WorkflowError::NotFound { entity: "approval", id: approval_id.0.clone() }
        })
    }

    /// Records matching `filter`, newest first.
    pub async fn list_approvals(
        &self,
        context: &RequestContext,
        filter: &RecordFilter,
    ) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        self.ledger.list(filter, context.storage_timeout).await
    }

    /// Highest version in the site's chain, whatever its status.
    pub async fn current_for_site(
        &self,
        context: &RequestContext,
        site_ref: &SiteRef,
    ) -> Result<Option<ApprovalRecord>, WorkflowError> {
        self.ledger.current_for_site(site_ref, context.storage_timeout).await
    }

    pub async fn get_dashboard(&self, context: &RequestContext) -> Result<Dashboard, WorkflowError> {
        let timeout = context.storage_timeout;
        let actor = &context.actor;
        let activity_limit = self.settings.dashboard_activity_limit;

        if actor.role.is_reviewer() {
            let pending_approvals = self
                .ledger
                .list(
                    &RecordFilter { status: Some(ApprovalStatus::Pending), ..RecordFilter::default() },
                    timeout,
                )
                .await?;
            let my_approvals = self
                .ledger
                .list(
                    &RecordFilter { reviewer_id: Some(actor.id.clone()), ..RecordFilter::default() },
                    timeout,
                )
                .await?;
            let recent_activity = self
                .ledger
                .recent_activity(&ActivityFilter { submitter_id: None, limit: activity_limit }, timeout)
                .await?;
            let all = self.ledger.list(&RecordFilter::default(), timeout).await?;

            return Ok(Dashboard {
                pending_approvals,
                my_approvals,
                recent_activity,
                statistics: DashboardStatistics::from_records(&all),
            });
        }

        let my_approvals = self
            .ledger
            .list(
                &RecordFilter { submitter_id: Some(actor.id.clone()), ..RecordFilter::default() },
                timeout,
            )
            .await?;
        let pending_approvals = my_approvals
            .iter()
            .filter(|record| record.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        let recent_activity = self
            .ledger
            .recent_activity(
                &ActivityFilter { submitter_id: Some(actor.id.clone()), limit: activity_limit },
                timeout,
            )
            .await?;

        Ok(Dashboard {
            statistics: DashboardStatistics::from_records(&my_approvals),
            pending_approvals,
            my_approvals,
            recent_activity,
        })
    }

    async fn advance_site(&self, record: &ApprovalRecord, approver: &Actor) -> Result<(), LifecycleError> {
        let timeout = self.settings.lifecycle_timeout;
        let call =
            self.lifecycle.advance_site_status(&record.site_ref, READY_FOR_PROCUREMENT, &approver.id);
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LifecycleError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// Rejects selections that name unknown or retired catalog entries. Equipment at
/// quantity 0 is not selected and is not checked.
pub fn check_catalog_references(
    selection: &Selection,
    catalog: &CatalogSnapshot,
) -> Result<(), WorkflowError> {
    for module_id in selection.modules() {
        if catalog.active_module(module_id).is_none() {
            return Err(WorkflowError::NotFound {
                entity: "capability_module",
                id: module_id.0.clone(),
            });
        }
    }
    for line in selection.equipment_lines() {
        if line.quantity == 0 {
            continue;
        }
        if catalog.active_equipment_item(&line.equipment_id).is_none() {
            return Err(WorkflowError::NotFound {
                entity: "equipment_item",
                id: line.equipment_id.0,
            });
        }
    }
    Ok(())
}
