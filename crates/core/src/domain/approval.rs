use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cost::CostBreakdown;
use crate::domain::selection::Selection;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteRef(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    ChangesRequested,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::ChangesRequested => "changes_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "changes_requested" => Some(Self::ChangesRequested),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only a rejected record or one sent back for changes may spawn a successor.
    pub fn is_resubmittable(&self) -> bool {
        matches!(self, Self::Rejected | Self::ChangesRequested)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalActionKind {
    Submit,
    Approve,
    Reject,
    RequestChanges,
    Resubmit,
}

impl ApprovalActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestChanges => "request_changes",
            Self::Resubmit => "resubmit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submit" => Some(Self::Submit),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "request_changes" => Some(Self::RequestChanges),
            "resubmit" => Some(Self::Resubmit),
            _ => None,
        }
    }

    pub fn is_review(&self) -> bool {
        matches!(self, Self::Approve | Self::Reject | Self::RequestChanges)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    RequestChanges,
}

impl ReviewDecision {
    pub fn resulting_status(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
            Self::RequestChanges => ApprovalStatus::ChangesRequested,
        }
    }

    pub fn action_kind(&self) -> ApprovalActionKind {
        match self {
            Self::Approve => ApprovalActionKind::Approve,
            Self::Reject => ApprovalActionKind::Reject,
            Self::RequestChanges => ApprovalActionKind::RequestChanges,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    DeploymentEngineer,
    OpsManager,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeploymentEngineer => "deployment_engineer",
            Self::OpsManager => "ops_manager",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deployment_engineer" => Some(Self::DeploymentEngineer),
            "ops_manager" => Some(Self::OpsManager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn is_reviewer(&self) -> bool {
        matches!(self, Self::OpsManager | Self::Admin)
    }
}

/// Already-authenticated caller identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: ActorRole) -> Self {
        Self { id: id.into(), name: name.into(), role }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalId,
    pub site_ref: SiteRef,
    pub site_name: String,
    pub submitter_id: String,
    pub submitter_name: String,
    pub reviewer_id: Option<String>,
    pub reviewer_name: Option<String>,
    pub status: ApprovalStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_comment: Option<String>,
    pub rejection_reason: Option<String>,
    pub selection: Selection,
    pub costs: CostBreakdown,
    pub version: u32,
    pub previous_version_id: Option<ApprovalId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalAction {
    pub id: ActionId,
    pub approval_id: ApprovalId,
    pub action: ApprovalActionKind,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub performed_at: DateTime<Utc>,
    pub comment: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Field changes applied by a successful review; the store applies them only while the
/// record is still pending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewUpdate {
    pub approval_id: ApprovalId,
    pub status: ApprovalStatus,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub reviewed_at: DateTime<Utc>,
    pub review_comment: Option<String>,
    pub rejection_reason: Option<String>,
}

impl ApprovalRecord {
    pub fn apply_review(&mut self, update: &ReviewUpdate) {
        self.status = update.status;
        self.reviewer_id = Some(update.reviewer_id.clone());
        self.reviewer_name = Some(update.reviewer_name.clone());
        self.reviewed_at = Some(update.reviewed_at);
        self.review_comment = update.review_comment.clone();
        self.rejection_reason = update.rejection_reason.clone();
    }
}
