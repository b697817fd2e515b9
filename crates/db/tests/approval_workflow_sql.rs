use std::sync::Arc;
use std::time::Duration;

use sitescope_core::domain::approval::{
    Actor, ActorRole, ApprovalActionKind, ApprovalStatus, ReviewDecision, SiteRef,
};
use sitescope_core::domain::selection::Selection;
use sitescope_core::errors::WorkflowError;
use sitescope_core::ledger::ReviewRequest;
use sitescope_core::workflow::{
    NoopSiteLifecycle, RequestContext, ResubmitApproval, ScopingWorkflow, SubmitForApproval,
    WorkflowSettings,
};
use sitescope_db::{
    connect_with_settings, migrations, DemoCatalogSeed, SqlApprovalStore, SqlCatalogRepository,
};

type WorkflowTestResult<T = ()> = Result<T, String>;
type SqlWorkflow = ScopingWorkflow<SqlApprovalStore, SqlCatalogRepository, NoopSiteLifecycle>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn file_backed_workflow(dir: &tempfile::TempDir) -> WorkflowTestResult<SqlWorkflow> {
    let url = format!("sqlite://{}", dir.path().join("sitescope.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.map_err(|error| error.to_string())?;
    migrations::run_pending(&pool).await.map_err(|error| error.to_string())?;
    DemoCatalogSeed::load(&pool).await.map_err(|error| error.to_string())?;

    Ok(ScopingWorkflow::new(
        SqlApprovalStore::new(pool.clone()),
        SqlCatalogRepository::new(pool),
        NoopSiteLifecycle,
        WorkflowSettings::default(),
    ))
}

fn context(id: &str, role: ActorRole) -> RequestContext {
    RequestContext::new(Actor::new(id, id.to_uppercase(), role), format!("req-{id}"), Duration::from_secs(10))
}

fn submission(site: &str) -> SubmitForApproval {
    SubmitForApproval {
        site_ref: SiteRef(site.to_owned()),
        site_name: format!("Store {site}"),
        selection: Selection::new().with_module("pos").with_equipment("terminal", 1),
        comment: Some("first pass".to_owned()),
    }
}

fn review(record_id: &sitescope_core::domain::approval::ApprovalId, decision: ReviewDecision) -> ReviewRequest {
    ReviewRequest {
        approval_id: record_id.clone(),
        decision,
        comment: Some(format!("{decision:?}")),
        rejection_reason: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reviews_resolve_exactly_once() -> WorkflowTestResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let workflow = Arc::new(file_backed_workflow(&dir).await?);
    let engineer = context("eng-1", ActorRole::DeploymentEngineer);
    let record = workflow
        .submit_for_approval(&engineer, submission("site-1"))
        .await
        .map_err(|error| error.to_string())?;

    let mut handles = Vec::new();
    for (reviewer, decision) in [("ops-1", ReviewDecision::Approve), ("ops-2", ReviewDecision::Reject)] {
        let workflow = Arc::clone(&workflow);
        let request = review(&record.id, decision);
        handles.push(tokio::spawn(async move {
            workflow.review_approval(&context(reviewer, ActorRole::OpsManager), request).await
        }));
    }

    let mut applied = 0;
    let mut concurrency_failures = 0;
    for handle in handles {
        match handle.await.map_err(|error| error.to_string())? {
            Ok(_) => applied += 1,
            Err(WorkflowError::Concurrency { .. }) => concurrency_failures += 1,
            Err(other) => return Err(format!("unexpected review failure: {other}")),
        }
    }
    require_eq!(applied, 1);
    require_eq!(concurrency_failures, 1);

    let history = workflow
        .get_history(&engineer, &record.id)
        .await
        .map_err(|error| error.to_string())?;
    let decisions = history.iter().filter(|action| action.action.is_review()).count();
    require_eq!(decisions, 1);
    require_eq!(history[0].action, ApprovalActionKind::Submit);
    Ok(())
}

#[tokio::test]
async fn rejected_scoping_is_resubmitted_as_next_version() -> WorkflowTestResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let workflow = file_backed_workflow(&dir).await?;
    let engineer = context("eng-1", ActorRole::DeploymentEngineer);
    let manager = context("ops-1", ActorRole::OpsManager);

    let first = workflow
        .submit_for_approval(&engineer, submission("site-7"))
        .await
        .map_err(|error| error.to_string())?;
    let rejected = workflow
        .review_approval(&manager, review(&first.id, ReviewDecision::Reject))
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(rejected.record.status, ApprovalStatus::Rejected);
    require!(rejected.record.rejection_reason.is_some(), "rejection reason defaults to comment");

    let second = workflow
        .resubmit_approval(
            &engineer,
            ResubmitApproval {
                previous_id: first.id.clone(),
                selection: Selection::new().with_module("pos").with_equipment("terminal", 2),
                changes_summary: "second lane".to_owned(),
            },
        )
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(second.version, 2);
    require_eq!(second.status, ApprovalStatus::Pending);
    require_eq!(second.previous_version_id.as_ref(), Some(&first.id));

    let first_history: Vec<ApprovalActionKind> = workflow
        .get_history(&engineer, &first.id)
        .await
        .map_err(|error| error.to_string())?
        .into_iter()
        .map(|action| action.action)
        .collect();
    require_eq!(first_history, vec![ApprovalActionKind::Submit, ApprovalActionKind::Reject]);

    let second_history = workflow
        .get_history(&engineer, &second.id)
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(second_history.len(), 1);
    require_eq!(
        second_history[0].metadata.get("changes_summary").map(String::as_str),
        Some("second lane")
    );

    let again = workflow
        .resubmit_approval(
            &engineer,
            ResubmitApproval {
                previous_id: first.id.clone(),
                selection: Selection::new().with_module("pos").with_equipment("terminal", 1),
                changes_summary: "fork".to_owned(),
            },
        )
        .await;
    require!(
        matches!(again, Err(WorkflowError::InvalidState(_))),
        "a version with a successor cannot be resubmitted again: {again:?}"
    );

    let duplicate = workflow.submit_for_approval(&engineer, submission("site-7")).await;
    require!(
        matches!(duplicate, Err(WorkflowError::InvalidState(_))),
        "fresh submit for a site with a chain must fail: {duplicate:?}"
    );

    let lineage =
        workflow.lineage(&engineer, &second.id).await.map_err(|error| error.to_string())?;
    require_eq!(lineage.iter().map(|record| record.version).collect::<Vec<_>>(), vec![1, 2]);
    Ok(())
}
