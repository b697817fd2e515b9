pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod scoping;
pub mod workflow;

pub use domain::approval::{
    Actor, ActorRole, ApprovalAction, ApprovalActionKind, ApprovalId, ApprovalRecord,
    ApprovalStatus, ReviewDecision, SiteRef,
};
pub use domain::catalog::{
    BusinessRule, BusinessRuleKind, CapabilityModule, CatalogSnapshot, EquipmentId, EquipmentItem,
    ModuleId, RecommendationRule, RuleId, RuleValue,
};
pub use domain::cost::{CostBreakdown, CostTotals, HardwareCosts, SoftwareCosts};
pub use domain::selection::{EquipmentLine, Selection};
pub use errors::{InterfaceError, StoreError, WorkflowError};
pub use ledger::{ApprovalLedger, ApprovalStore, InMemoryApprovalStore, ReviewRequest};
pub use scoping::recommendation::{EquipmentRecommendation, RecommendationSet, RuleEffect};
pub use scoping::validator::{SelectionViolation, ValidatedSelection, ValidationResult};
pub use scoping::{DeterministicScopingRuntime, ScopingEvaluation, ScopingRuntime};
pub use workflow::{
    CatalogSource, Dashboard, DashboardStatistics, RequestContext, ResubmitApproval,
    ReviewReceipt, ScopingWorkflow, SiteLifecycle, SubmitForApproval, WorkflowSettings,
};
