//! Builders for the demo catalog: a POS module that requires one terminal and
//! optionally suggests a barcode scanner. Used by `sitescope seed` and by tests.

use rust_decimal::Decimal;

use crate::domain::catalog::{
    CapabilityModule, CatalogSnapshot, EquipmentId, EquipmentItem, ModuleId, RecommendationRule,
    RuleId,
};

pub fn demo_catalog() -> CatalogSnapshot {
    let mut scanner_rule = recommendation_rule("pos-scanner", "pos", "scanner", 1, false);
    scanner_rule.reason = "Speeds up checkout for barcoded stock".to_owned();
    let mut terminal_rule = recommendation_rule("pos-terminal", "pos", "terminal", 1, true);
    terminal_rule.reason = "Every POS lane needs a payment terminal".to_owned();

    CatalogSnapshot::new(
        vec![module("pos", "Point of Sale", Decimal::new(25, 0), Decimal::new(150, 0))],
        vec![
            equipment("terminal", Decimal::new(450, 0)),
            equipment("scanner", Decimal::new(120, 0)),
        ],
        vec![scanner_rule, terminal_rule],
        Vec::new(),
    )
}

pub fn module(id: &str, name: &str, monthly_fee: Decimal, setup_fee: Decimal) -> CapabilityModule {
    CapabilityModule {
        id: ModuleId(id.to_owned()),
        name: name.to_owned(),
        category: "software".to_owned(),
        monthly_fee,
        setup_fee,
        license_fee: Decimal::ZERO,
        active: true,
    }
}

pub fn equipment(id: &str, unit_cost: Decimal) -> EquipmentItem {
    let mut name = id.to_owned();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }

    EquipmentItem {
        id: EquipmentId(id.to_owned()),
        name,
        category: "hardware".to_owned(),
        unit_cost,
        installation_cost: Decimal::ZERO,
        maintenance_cost: Decimal::ZERO,
        active: true,
    }
}

pub fn recommendation_rule(
    id: &str,
    module_id: &str,
    equipment_id: &str,
    default_quantity: u32,
    is_required: bool,
) -> RecommendationRule {
    RecommendationRule {
        id: RuleId(id.to_owned()),
        module_id: ModuleId(module_id.to_owned()),
        equipment_id: EquipmentId(equipment_id.to_owned()),
        default_quantity,
        is_required,
        min_quantity: if is_required { 1 } else { 0 },
        max_quantity: 10,
        cost_multiplier: Decimal::ONE,
        reason: format!("{module_id} uses {equipment_id}"),
    }
}
