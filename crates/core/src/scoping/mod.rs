pub mod cost;
pub mod fixtures;
pub mod recommendation;
pub mod validator;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::CatalogSnapshot;
use crate::domain::cost::CostBreakdown;
use crate::domain::selection::Selection;

use self::{
    cost::{CostEngine, DeterministicCostEngine},
    recommendation::{DeterministicRecommendationEngine, RecommendationEngine, RecommendationSet},
    validator::{DeterministicSelectionValidator, SelectionValidator, ValidationResult},
};

/// Everything the scoping panel shows for one selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopingEvaluation {
    pub recommendations: RecommendationSet,
    pub validation: ValidationResult,
    pub costs: CostBreakdown,
}

pub trait ScopingRuntime: Send + Sync {
    fn evaluate(&self, selection: &Selection, catalog: &CatalogSnapshot) -> ScopingEvaluation;
}

pub struct DeterministicScopingRuntime<R, V, C> {
    recommendation_engine: R,
    validator: V,
    cost_engine: C,
}

impl<R, V, C> DeterministicScopingRuntime<R, V, C> {
    pub fn new(recommendation_engine: R, validator: V, cost_engine: C) -> Self {
        Self { recommendation_engine, validator, cost_engine }
    }
}

impl Default
    for DeterministicScopingRuntime<
        DeterministicRecommendationEngine,
        DeterministicSelectionValidator,
        DeterministicCostEngine,
    >
{
    fn default() -> Self {
        Self::new(
            DeterministicRecommendationEngine,
            DeterministicSelectionValidator,
            DeterministicCostEngine,
        )
    }
}

impl<R, V, C> ScopingRuntime for DeterministicScopingRuntime<R, V, C>
where
    R: RecommendationEngine,
    V: SelectionValidator,
    C: CostEngine,
{
    fn evaluate(&self, selection: &Selection, catalog: &CatalogSnapshot) -> ScopingEvaluation {
        let recommendations =
            self.recommendation_engine.derive(&selection.module_ids(), catalog);
        let validation = self.validator.validate(selection, &recommendations);
        let costs = self.cost_engine.compute(selection, &recommendations, catalog);

        ScopingEvaluation { recommendations, validation, costs }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{DeterministicScopingRuntime, ScopingRuntime};
    use crate::domain::selection::Selection;
    use crate::scoping::fixtures::demo_catalog;

    #[test]
    fn runtime_returns_recommendations_validation_and_costs() {
        let runtime = DeterministicScopingRuntime::default();
        let selection = Selection::new().with_module("pos").with_equipment("terminal", 1);

        let evaluation = runtime.evaluate(&selection, &demo_catalog());

        assert_eq!(evaluation.recommendations.equipment.len(), 2);
        assert!(evaluation.validation.ok);
        assert_eq!(evaluation.costs.totals.one_time, Decimal::new(600, 0));
    }

    #[test]
    fn runtime_still_costs_an_invalid_selection() {
        let runtime = DeterministicScopingRuntime::default();
        let selection = Selection::new().with_module("pos");

        let evaluation = runtime.evaluate(&selection, &demo_catalog());

        assert!(!evaluation.validation.ok);
        assert_eq!(evaluation.costs.totals.one_time, Decimal::new(150, 0));
        assert_eq!(evaluation.costs.totals.annual, Decimal::new(300, 0));
    }
}
