use rust_decimal::Decimal;

use crate::domain::catalog::CatalogSnapshot;
use crate::domain::cost::{CostBreakdown, HardwareCosts, SoftwareCosts};
use crate::domain::selection::Selection;
use crate::scoping::recommendation::RecommendationSet;

pub trait CostEngine: Send + Sync {
    fn compute(
        &self,
        selection: &Selection,
        recommendations: &RecommendationSet,
        catalog: &CatalogSnapshot,
    ) -> CostBreakdown;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicCostEngine;

impl CostEngine for DeterministicCostEngine {
    fn compute(
        &self,
        selection: &Selection,
        recommendations: &RecommendationSet,
        catalog: &CatalogSnapshot,
    ) -> CostBreakdown {
        compute_costs(selection, recommendations, catalog)
    }
}

/// Rolls the selection up into software and hardware costs. Unknown ids contribute
/// nothing; callers reject them before costing.
pub fn compute_costs(
    selection: &Selection,
    recommendations: &RecommendationSet,
    catalog: &CatalogSnapshot,
) -> CostBreakdown {
    let mut software = SoftwareCosts::default();
    for module in selection.modules().filter_map(|id| catalog.module(id)) {
        software.monthly_fees += module.monthly_fee;
        software.setup_fees += module.setup_fee;
        software.license_fees += module.license_fee;
    }

    let mut hardware = HardwareCosts::default();
    for line in selection.equipment_lines() {
        if line.quantity == 0 {
            continue;
        }
        let Some(item) = catalog.equipment_item(&line.equipment_id) else {
            continue;
        };

        let quantity = Decimal::from(line.quantity);
        let multiplier = recommendations
            .recommendation_for(&line.equipment_id)
            .map(|recommendation| recommendation.cost_multiplier)
            .unwrap_or(Decimal::ONE);

        hardware.unit_costs += quantity * item.unit_cost * multiplier;
        hardware.installation_costs += quantity * item.installation_cost;
        hardware.maintenance_costs += quantity * item.maintenance_cost;
    }

    hardware.unit_costs = (hardware.unit_costs + recommendations.bundle_delta()).max(Decimal::ZERO);

    CostBreakdown::from_components(software, hardware)
}
