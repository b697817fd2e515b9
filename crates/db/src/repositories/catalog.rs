use sqlx::{sqlite::SqliteRow, Row};

use sitescope_core::domain::catalog::{
    BusinessRule, BusinessRuleKind, CapabilityModule, EquipmentId, EquipmentItem, ModuleId,
    RecommendationRule, RuleId, RuleValue,
};
use sitescope_core::errors::StoreError;
use sitescope_core::workflow::CatalogSource;

use super::{parse_decimal, parse_json, parse_u32, to_json, RepositoryError};
use crate::DbPool;

/// Catalog tables. Reads serve the scoping engine; the `save_*` upserts exist for
/// seeding and the admin import path.
#[derive(Clone)]
pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn modules(&self) -> Result<Vec<CapabilityModule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, category, monthly_fee, setup_fee, license_fee, active
             FROM capability_module
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(module_from_row).collect()
    }

    pub async fn equipment(&self) -> Result<Vec<EquipmentItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, category, unit_cost, installation_cost, maintenance_cost, active
             FROM equipment_item
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(equipment_from_row).collect()
    }

    pub async fn recommendation_rules(&self) -> Result<Vec<RecommendationRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, module_id, equipment_id, default_quantity, is_required, min_quantity,
                    max_quantity, cost_multiplier, reason
             FROM recommendation_rule
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(recommendation_rule_from_row).collect()
    }

    pub async fn business_rules(&self) -> Result<Vec<BusinessRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, rule_type, module_ids_json, equipment_ids_json, rule_value_json,
                    priority, cost_impact
             FROM business_rule
             ORDER BY priority ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(business_rule_from_row).collect()
    }

    pub async fn save_module(&self, module: &CapabilityModule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO capability_module (id, name, category, monthly_fee, setup_fee, license_fee, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 monthly_fee = excluded.monthly_fee,
                 setup_fee = excluded.setup_fee,
                 license_fee = excluded.license_fee,
                 active = excluded.active",
        )
        .bind(&module.id.0)
        .bind(&module.name)
        .bind(&module.category)
        .bind(module.monthly_fee.to_string())
        .bind(module.setup_fee.to_string())
        .bind(module.license_fee.to_string())
        .bind(module.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn save_equipment(&self, item: &EquipmentItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO equipment_item (id, name, category, unit_cost, installation_cost, maintenance_cost, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 unit_cost = excluded.unit_cost,
                 installation_cost = excluded.installation_cost,
                 maintenance_cost = excluded.maintenance_cost,
                 active = excluded.active",
        )
        .bind(&item.id.0)
        .bind(&item.name)
        .bind(&item.category)
        .bind(item.unit_cost.to_string())
        .bind(item.installation_cost.to_string())
        .bind(item.maintenance_cost.to_string())
        .bind(item.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn save_recommendation_rule(
        &self,
        rule: &RecommendationRule,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO recommendation_rule (
                id, module_id, equipment_id, default_quantity, is_required, min_quantity,
                max_quantity, cost_multiplier, reason
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 module_id = excluded.module_id,
                 equipment_id = excluded.equipment_id,
                 default_quantity = excluded.default_quantity,
                 is_required = excluded.is_required,
                 min_quantity = excluded.min_quantity,
                 max_quantity = excluded.max_quantity,
                 cost_multiplier = excluded.cost_multiplier,
                 reason = excluded.reason",
        )
        .bind(&rule.id.0)
        .bind(&rule.module_id.0)
        .bind(&rule.equipment_id.0)
        .bind(i64::from(rule.default_quantity))
        .bind(rule.is_required)
        .bind(i64::from(rule.min_quantity))
        .bind(i64::from(rule.max_quantity))
        .bind(rule.cost_multiplier.to_string())
        .bind(&rule.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn save_business_rule(&self, rule: &BusinessRule) -> Result<(), RepositoryError> {
        let module_ids_json = to_json("module_ids_json", &rule.module_ids)?;
        let equipment_ids_json = to_json("equipment_ids_json", &rule.equipment_ids)?;
        let rule_value_json = to_json("rule_value_json", &rule.value)?;

        sqlx::query(
            "INSERT INTO business_rule (
                id, name, rule_type, module_ids_json, equipment_ids_json, rule_value_json,
                priority, cost_impact
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 rule_type = excluded.rule_type,
                 module_ids_json = excluded.module_ids_json,
                 equipment_ids_json = excluded.equipment_ids_json,
                 rule_value_json = excluded.rule_value_json,
                 priority = excluded.priority,
                 cost_impact = excluded.cost_impact",
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(rule.kind().as_str())
        .bind(module_ids_json)
        .bind(equipment_ids_json)
        .bind(rule_value_json)
        .bind(rule.priority)
        .bind(rule.cost_impact.map(|impact| impact.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogSource for SqlCatalogRepository {
    async fn list_capability_modules(&self) -> Result<Vec<CapabilityModule>, StoreError> {
        Ok(self.modules().await?)
    }

    async fn list_equipment_items(&self) -> Result<Vec<EquipmentItem>, StoreError> {
        Ok(self.equipment().await?)
    }

    async fn list_recommendation_rules(&self) -> Result<Vec<RecommendationRule>, StoreError> {
        Ok(self.recommendation_rules().await?)
    }

    async fn list_business_rules(&self) -> Result<Vec<BusinessRule>, StoreError> {
        Ok(self.business_rules().await?)
    }
}

fn module_from_row(row: &SqliteRow) -> Result<CapabilityModule, RepositoryError> {
    Ok(CapabilityModule {
        id: ModuleId(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        monthly_fee: parse_decimal("monthly_fee", &row.try_get::<String, _>("monthly_fee")?)?,
        setup_fee: parse_decimal("setup_fee", &row.try_get::<String, _>("setup_fee")?)?,
        license_fee: parse_decimal("license_fee", &row.try_get::<String, _>("license_fee")?)?,
        active: row.try_get("active")?,
    })
}

fn equipment_from_row(row: &SqliteRow) -> Result<EquipmentItem, RepositoryError> {
    Ok(EquipmentItem {
        id: EquipmentId(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        unit_cost: parse_decimal("unit_cost", &row.try_get::<String, _>("unit_cost")?)?,
        installation_cost: parse_decimal(
            "installation_cost",
            &row.try_get::<String, _>("installation_cost")?,
        )?,
        maintenance_cost: parse_decimal(
            "maintenance_cost",
            &row.try_get::<String, _>("maintenance_cost")?,
        )?,
        active: row.try_get("active")?,
    })
}

fn recommendation_rule_from_row(row: &SqliteRow) -> Result<RecommendationRule, RepositoryError> {
    Ok(RecommendationRule {
        id: RuleId(row.try_get("id")?),
        module_id: ModuleId(row.try_get("module_id")?),
        equipment_id: EquipmentId(row.try_get("equipment_id")?),
        default_quantity: parse_u32("default_quantity", row.try_get("default_quantity")?)?,
        is_required: row.try_get("is_required")?,
        min_quantity: parse_u32("min_quantity", row.try_get("min_quantity")?)?,
        max_quantity: parse_u32("max_quantity", row.try_get("max_quantity")?)?,
        cost_multiplier: parse_decimal(
            "cost_multiplier",
            &row.try_get::<String, _>("cost_multiplier")?,
        )?,
        reason: row.try_get("reason")?,
    })
}

fn business_rule_from_row(row: &SqliteRow) -> Result<BusinessRule, RepositoryError> {
    let id: String = row.try_get("id")?;
    let rule_type_raw = row.try_get::<String, _>("rule_type")?;
    let rule_type = BusinessRuleKind::parse(&rule_type_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown business rule type `{rule_type_raw}`"))
    })?;
    let value: RuleValue =
        parse_json("rule_value_json", &row.try_get::<String, _>("rule_value_json")?)?;
    if value.kind() != rule_type {
        return Err(RepositoryError::Decode(format!(
            "business rule `{id}` is stored as `{}` but its value is `{}`",
            rule_type.as_str(),
            value.kind().as_str()
        )));
    }

    Ok(BusinessRule {
        id: RuleId(id),
        name: row.try_get("name")?,
        module_ids: parse_json("module_ids_json", &row.try_get::<String, _>("module_ids_json")?)?,
        equipment_ids: parse_json(
            "equipment_ids_json",
            &row.try_get::<String, _>("equipment_ids_json")?,
        )?,
        value,
        priority: row.try_get("priority")?,
        cost_impact: row
            .try_get::<Option<String>, _>("cost_impact")?
            .map(|impact| parse_decimal("cost_impact", &impact))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use sitescope_core::domain::catalog::{BusinessRule, ModuleId, RuleId, RuleValue};
    use sitescope_core::errors::StoreError;
    use sitescope_core::scoping::fixtures::demo_catalog;
    use sitescope_core::workflow::CatalogSource;

    use super::SqlCatalogRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlCatalogRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlCatalogRepository::new(pool)
    }

    #[tokio::test]
    async fn saved_catalog_reads_back_unchanged() {
        let repo = setup().await;
        let catalog = demo_catalog();
        for module in &catalog.modules {
            repo.save_module(module).await.expect("module");
        }
        for item in &catalog.equipment {
            repo.save_equipment(item).await.expect("equipment");
        }
        for rule in &catalog.recommendation_rules {
            repo.save_recommendation_rule(rule).await.expect("recommendation rule");
        }

        let modules = repo.list_capability_modules().await.expect("modules");
        let equipment = repo.list_equipment_items().await.expect("equipment");
        let rules = repo.list_recommendation_rules().await.expect("rules");

        assert_eq!(modules, catalog.modules);
        assert_eq!(equipment.len(), catalog.equipment.len());
        assert_eq!(rules.len(), catalog.recommendation_rules.len());
        assert!(rules.iter().any(|rule| rule.is_required));
    }

    #[tokio::test]
    async fn business_rules_come_back_in_priority_order() {
        let repo = setup().await;
        let catalog = demo_catalog();
        for module in &catalog.modules {
            repo.save_module(module).await.expect("module");
        }
        let bundle = BusinessRule {
            id: RuleId("br-bundle".to_owned()),
            name: "POS starter bundle".to_owned(),
            module_ids: vec![ModuleId("pos".to_owned())],
            equipment_ids: Vec::new(),
            value: RuleValue::Bundle,
            priority: 20,
            cost_impact: Some(Decimal::new(-5000, 2)),
        };
        let quantity = BusinessRule {
            id: RuleId("br-quantity".to_owned()),
            name: "Two terminals minimum".to_owned(),
            module_ids: vec![ModuleId("pos".to_owned())],
            equipment_ids: Vec::new(),
            value: RuleValue::Quantity { min: Some(2), max: None, exact: None },
            priority: 10,
            cost_impact: None,
        };
        repo.save_business_rule(&bundle).await.expect("bundle");
        repo.save_business_rule(&quantity).await.expect("quantity");

        let rules = repo.list_business_rules().await.expect("rules");

        assert_eq!(rules, vec![quantity, bundle]);
    }

    #[tokio::test]
    async fn rule_type_disagreeing_with_payload_is_a_decode_error() {
        let repo = setup().await;
        sqlx::query(
            "INSERT INTO business_rule (id, name, rule_type, rule_value_json, priority)
             VALUES ('br-bad', 'Mislabelled', 'cost', '{\"kind\":\"bundle\"}', 1)",
        )
        .execute(&repo.pool)
        .await
        .expect("insert raw rule");

        let error = repo.list_business_rules().await.expect_err("mismatch");

        assert!(matches!(error, StoreError::Decode(message) if message.contains("br-bad")));
    }
}
