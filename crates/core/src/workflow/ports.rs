use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::approval::SiteRef;
use crate::domain::catalog::{
    BusinessRule, CapabilityModule, CatalogSnapshot, EquipmentItem, RecommendationRule,
};
use crate::errors::StoreError;

/// Status a site moves to once its scoping is approved.
pub const READY_FOR_PROCUREMENT: &str = "ready_for_procurement";

/// Read-only access to the scoping catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_capability_modules(&self) -> Result<Vec<CapabilityModule>, StoreError>;
    async fn list_equipment_items(&self) -> Result<Vec<EquipmentItem>, StoreError>;
    async fn list_recommendation_rules(&self) -> Result<Vec<RecommendationRule>, StoreError>;
    async fn list_business_rules(&self) -> Result<Vec<BusinessRule>, StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    snapshot: CatalogSnapshot,
}

impl InMemoryCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn list_capability_modules(&self) -> Result<Vec<CapabilityModule>, StoreError> {
        Ok(self.snapshot.modules.clone())
    }

    async fn list_equipment_items(&self) -> Result<Vec<EquipmentItem>, StoreError> {
        Ok(self.snapshot.equipment.clone())
    }

    async fn list_recommendation_rules(&self) -> Result<Vec<RecommendationRule>, StoreError> {
        Ok(self.snapshot.recommendation_rules.clone())
    }

    async fn list_business_rules(&self) -> Result<Vec<BusinessRule>, StoreError> {
        Ok(self.snapshot.business_rules.clone())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("site lifecycle rejected the update with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("site lifecycle transport failure: {0}")]
    Transport(String),
    #[error("site lifecycle call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Downstream collaborator notified when a site's scoping is approved.
#[async_trait]
pub trait SiteLifecycle: Send + Sync {
    async fn advance_site_status(
        &self,
        site_ref: &SiteRef,
        to_status: &str,
        approved_by: &str,
    ) -> Result<(), LifecycleError>;
}

#[async_trait]
impl<T> SiteLifecycle for Arc<T>
where
    T: SiteLifecycle + ?Sized,
{
    async fn advance_site_status(
        &self,
        site_ref: &SiteRef,
        to_status: &str,
        approved_by: &str,
    ) -> Result<(), LifecycleError> {
        (**self).advance_site_status(site_ref, to_status, approved_by).await
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSiteLifecycle;

#[async_trait]
impl SiteLifecycle for NoopSiteLifecycle {
    async fn advance_site_status(
        &self,
        _site_ref: &SiteRef,
        _to_status: &str,
        _approved_by: &str,
    ) -> Result<(), LifecycleError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusTransition {
    pub site_ref: SiteRef,
    pub to_status: String,
    pub approved_by: String,
}

/// Keeps every requested transition; optionally fails each call with a fixed error.
#[derive(Debug, Default)]
pub struct RecordingSiteLifecycle {
    transitions: Mutex<Vec<StatusTransition>>,
    failure: Option<LifecycleError>,
}

impl RecordingSiteLifecycle {
    pub fn failing(error: LifecycleError) -> Self {
        Self { transitions: Mutex::new(Vec::new()), failure: Some(error) }
    }

    pub fn transitions(&self) -> Vec<StatusTransition> {
        match self.transitions.lock() {
            Ok(transitions) => transitions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SiteLifecycle for RecordingSiteLifecycle {
    async fn advance_site_status(
        &self,
        site_ref: &SiteRef,
        to_status: &str,
        approved_by: &str,
    ) -> Result<(), LifecycleError> {
        let transition = StatusTransition {
            site_ref: site_ref.clone(),
            to_status: to_status.to_owned(),
            approved_by: approved_by.to_owned(),
        };
        match self.transitions.lock() {
            Ok(mut transitions) => transitions.push(transition),
            Err(poisoned) => poisoned.into_inner().push(transition),
        }

        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
