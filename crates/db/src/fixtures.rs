use sitescope_core::domain::catalog::CatalogSnapshot;
use sitescope_core::scoping::fixtures::demo_catalog;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlCatalogRepository};

/// Demo catalog seed: POS (25/month, 150 setup) requiring a payment terminal, with an
/// optional barcode scanner.
pub struct DemoCatalogSeed;

impl DemoCatalogSeed {
    pub fn snapshot() -> CatalogSnapshot {
        demo_catalog()
    }

    /// Upserts the demo catalog. Running it twice leaves the same rows.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let catalog = Self::snapshot();
        let repository = SqlCatalogRepository::new(pool.clone());

        for module in &catalog.modules {
            repository.save_module(module).await?;
        }
        for item in &catalog.equipment {
            repository.save_equipment(item).await?;
        }
        for rule in &catalog.recommendation_rules {
            repository.save_recommendation_rule(rule).await?;
        }
        for rule in &catalog.business_rules {
            repository.save_business_rule(rule).await?;
        }

        Ok(SeedResult {
            modules_seeded: catalog.modules.len(),
            equipment_seeded: catalog.equipment.len(),
            recommendation_rules_seeded: catalog.recommendation_rules.len(),
            business_rules_seeded: catalog.business_rules.len(),
        })
    }

    /// Checks that every demo catalog row is present.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let catalog = Self::snapshot();
        let mut checks = Vec::new();

        for module in &catalog.modules {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM capability_module WHERE id = ?1 AND active = 1)",
            )
            .bind(&module.id.0)
            .fetch_one(pool)
            .await?;
            checks.push((format!("module:{}", module.id.0), exists == 1));
        }
        for item in &catalog.equipment {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM equipment_item WHERE id = ?1 AND active = 1)",
            )
            .bind(&item.id.0)
            .fetch_one(pool)
            .await?;
            checks.push((format!("equipment:{}", item.id.0), exists == 1));
        }
        for rule in &catalog.recommendation_rules {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM recommendation_rule WHERE id = ?1 AND is_required = ?2)",
            )
            .bind(&rule.id.0)
            .bind(rule.is_required)
            .fetch_one(pool)
            .await?;
            checks.push((format!("recommendation_rule:{}", rule.id.0), exists == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub modules_seeded: usize,
    pub equipment_seeded: usize,
    pub recommendation_rules_seeded: usize,
    pub business_rules_seeded: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
