//! JSON API over the scoping workflow.
//!
//! - `POST /api/scoping/preview`
//! - `POST /api/sites/{site_ref}/scoping/submit`
//! - `GET  /api/sites/{site_ref}/scoping/approval`
//! - `GET  /api/scoping-approvals?status=&site_ref=`
//! - `GET  /api/scoping-approvals/{id}`
//! - `POST /api/scoping-approvals/{id}/review`
//! - `POST /api/scoping-approvals/{id}/resubmit`
//! - `GET  /api/scoping-approvals/{id}/history`
//! - `GET  /api/scoping-approvals/{id}/lineage`
//! - `GET  /api/dashboard`
//!
//! Callers are authenticated upstream; the gateway forwards identity in `x-actor-id`,
//! `x-actor-name` and `x-actor-role`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use sitescope_core::domain::approval::{
    Actor, ActorRole, ApprovalAction, ApprovalId, ApprovalRecord, ApprovalStatus, ReviewDecision,
    SiteRef,
};
use sitescope_core::domain::selection::Selection;
use sitescope_core::errors::{InterfaceError, WorkflowError};
use sitescope_core::ledger::{RecordFilter, ReviewRequest};
use sitescope_core::scoping::validator::SelectionViolation;
use sitescope_core::scoping::ScopingEvaluation;
use sitescope_core::workflow::{
    Dashboard, RequestContext, ResubmitApproval, ReviewReceipt, SubmitForApproval,
};

use crate::bootstrap::ServerWorkflow;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    workflow: Arc<ServerWorkflow>,
    storage_timeout: Duration,
}

impl ApiState {
    pub fn new(workflow: Arc<ServerWorkflow>, storage_timeout: Duration) -> Self {
        Self { workflow, storage_timeout }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/scoping/preview", post(preview))
        .route("/api/sites/{site_ref}/scoping/submit", post(submit))
        .route("/api/sites/{site_ref}/scoping/approval", get(current_for_site))
        .route("/api/scoping-approvals", get(list_approvals))
        .route("/api/scoping-approvals/{id}", get(get_approval))
        .route("/api/scoping-approvals/{id}/review", post(review))
        .route("/api/scoping-approvals/{id}/resubmit", post(resubmit))
        .route("/api/scoping-approvals/{id}/history", get(history))
        .route("/api/scoping-approvals/{id}/lineage", get(lineage))
        .route("/api/dashboard", get(dashboard))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct PreviewBody {
    pub selection: Selection,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub site_name: String,
    pub selection: Selection,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResubmitBody {
    pub selection: Selection,
    pub changes_summary: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub site_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<SelectionViolation>,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_owned(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let user_message = self.0.user_message();
        let (status, error, detail, violations, correlation_id) = match self.0 {
            InterfaceError::BadRequest { message, correlation_id } => {
                (StatusCode::BAD_REQUEST, "bad_request", message, Vec::new(), correlation_id)
            }
            InterfaceError::Unprocessable { message, violations, correlation_id } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                message,
                violations,
                correlation_id,
            ),
            InterfaceError::NotFound { message, correlation_id } => {
                (StatusCode::NOT_FOUND, "not_found", message, Vec::new(), correlation_id)
            }
            InterfaceError::Conflict { message, correlation_id } => {
                (StatusCode::CONFLICT, "conflict", message, Vec::new(), correlation_id)
            }
            InterfaceError::ServiceUnavailable { message, correlation_id } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                message,
                Vec::new(),
                correlation_id,
            ),
            InterfaceError::Internal { message, correlation_id } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message, Vec::new(), correlation_id)
            }
        };

        let body = ErrorBody { error, message: user_message, detail, violations, correlation_id };
        (status, Json(body)).into_response()
    }
}

/// Caller identity and correlation id taken from gateway headers.
#[derive(Clone, Debug)]
pub struct RequestActor {
    pub actor: Actor,
    pub correlation_id: String,
}

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn actor_from_headers(headers: &HeaderMap) -> Result<RequestActor, ApiError> {
    let correlation_id = header(headers, CORRELATION_ID_HEADER)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let id = header(headers, ACTOR_ID_HEADER).ok_or_else(|| {
        ApiError::bad_request(format!("missing `{ACTOR_ID_HEADER}` header"), &correlation_id)
    })?;
    let role_raw = header(headers, ACTOR_ROLE_HEADER).ok_or_else(|| {
        ApiError::bad_request(format!("missing `{ACTOR_ROLE_HEADER}` header"), &correlation_id)
    })?;
    let role = ActorRole::parse(role_raw).ok_or_else(|| {
        ApiError::bad_request(format!("unknown actor role `{role_raw}`"), &correlation_id)
    })?;
    let name = header(headers, ACTOR_NAME_HEADER).unwrap_or(id);

    Ok(RequestActor { actor: Actor::new(id, name, role), correlation_id })
}

impl ApiState {
    fn context(&self, caller: RequestActor) -> RequestContext {
        RequestContext::new(caller.actor, caller.correlation_id, self.storage_timeout)
    }
}

fn workflow_error(error: WorkflowError, context: &RequestContext) -> ApiError {
    if matches!(error, WorkflowError::StorageTimeout { .. } | WorkflowError::Storage(_)) {
        warn!(
            event_name = "api.request.storage_failure",
            correlation_id = %context.correlation_id,
            error_kind = error.kind(),
            error = %error,
            "request failed in storage"
        );
    }
    ApiError(error.into_interface(context.correlation_id.clone()))
}

async fn preview(
    State(state): State<ApiState>,
    caller: RequestActor,
    Json(body): Json<PreviewBody>,
) -> Result<Json<ScopingEvaluation>, ApiError> {
    let context = state.context(caller);
    let evaluation = state
        .workflow
        .preview(&context, &body.selection)
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok(Json(evaluation))
}

async fn submit(
    State(state): State<ApiState>,
    Path(site_ref): Path<String>,
    caller: RequestActor,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<ApprovalRecord>), ApiError> {
    let context = state.context(caller);
    if body.site_name.trim().is_empty() {
        return Err(ApiError::bad_request("site_name is required", &context.correlation_id));
    }

    let record = state
        .workflow
        .submit_for_approval(
            &context,
            SubmitForApproval {
                site_ref: SiteRef(site_ref),
                site_name: body.site_name,
                selection: body.selection,
                comment: body.comment,
            },
        )
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn current_for_site(
    State(state): State<ApiState>,
    Path(site_ref): Path<String>,
    caller: RequestActor,
) -> Result<Json<ApprovalRecord>, ApiError> {
    let context = state.context(caller);
    let record = state
        .workflow
        .current_for_site(&context, &SiteRef(site_ref.clone()))
        .await
        .and_then(|record| {
            record.ok_or(WorkflowError::NotFound { entity: "site_approval", id: site_ref })
        })
        .map_err(|error| workflow_error(error, &context))?;
    Ok(Json(record))
}

async fn list_approvals(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
    caller: RequestActor,
) -> Result<Json<Vec<ApprovalRecord>>, ApiError> {
    let context = state.context(caller);
    let status = match query.status.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(ApprovalStatus::parse(raw).ok_or_else(|| {
            let message = format!("unknown approval status `{raw}`");
            ApiError::bad_request(message, &context.correlation_id)
        })?),
        None => None,
    };
    let site_ref = query
        .site_ref
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
        .map(SiteRef);

    let records = state
        .workflow
        .list_approvals(&context, &RecordFilter { site_ref, status, ..RecordFilter::default() })
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok(Json(records))
}

async fn get_approval(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    caller: RequestActor,
) -> Result<Json<ApprovalRecord>, ApiError> {
    let context = state.context(caller);
    let record = state
        .workflow
        .get_approval(&context, &ApprovalId(id))
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok(Json(record))
}

async fn review(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    caller: RequestActor,
    Json(body): Json<ReviewBody>,
) -> Result<Json<ReviewReceipt>, ApiError> {
    let context = state.context(caller);
    let receipt = state
        .workflow
        .review_approval(
            &context,
            ReviewRequest {
                approval_id: ApprovalId(id),
                decision: body.decision,
                comment: body.comment,
                rejection_reason: body.rejection_reason,
            },
        )
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok(Json(receipt))
}

async fn resubmit(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    caller: RequestActor,
    Json(body): Json<ResubmitBody>,
) -> Result<(StatusCode, Json<ApprovalRecord>), ApiError> {
    let context = state.context(caller);
    let record = state
        .workflow
        .resubmit_approval(
            &context,
            ResubmitApproval {
                previous_id: ApprovalId(id),
                selection: body.selection,
                changes_summary: body.changes_summary,
            },
        )
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    caller: RequestActor,
) -> Result<Json<Vec<ApprovalAction>>, ApiError> {
    let context = state.context(caller);
    let actions = state
        .workflow
        .get_history(&context, &ApprovalId(id))
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok(Json(actions))
}

async fn lineage(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    caller: RequestActor,
) -> Result<Json<Vec<ApprovalRecord>>, ApiError> {
    let context = state.context(caller);
    let records = state
        .workflow
        .lineage(&context, &ApprovalId(id))
        .await
        .map_err(|error| workflow_error(error, &context))?;
    Ok(Json(records))
}

async fn dashboard(
    State(state): State<ApiState>,
    caller: RequestActor,
) -> Result<Json<Dashboard>, ApiError> {
    let context = state.context(caller);
    let dashboard =
        state.workflow.get_dashboard(&context).await.map_err(|error| workflow_error(error, &context))?;
    Ok(Json(dashboard))
}
