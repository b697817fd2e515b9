use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{EquipmentId, ModuleId, RuleId};
use crate::domain::selection::Selection;
use crate::scoping::recommendation::{RecommendationSet, RuleEffect};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionViolation {
    MissingRequired {
        equipment_id: EquipmentId,
        required_by: Vec<ModuleId>,
    },
    QuantityOutOfBounds {
        equipment_id: EquipmentId,
        quantity: u32,
        min: u32,
        max: u32,
    },
    ExclusionConflict {
        rule_id: RuleId,
        conflicting_modules: Vec<ModuleId>,
        conflicting_equipment: Vec<EquipmentId>,
    },
    DependencyUnmet {
        rule_id: RuleId,
        dependents: Vec<ModuleId>,
        missing: Vec<ModuleId>,
    },
}

impl SelectionViolation {
    pub fn message(&self) -> String {
        match self {
            Self::MissingRequired { equipment_id, required_by } => format!(
                "equipment `{}` is required by {}",
                equipment_id.0,
                join_ids(required_by.iter().map(|id| id.0.as_str()))
            ),
            Self::QuantityOutOfBounds { equipment_id, quantity, min, max } => format!(
                "quantity {quantity} for `{}` is outside the allowed range {min}..={max}",
                equipment_id.0
            ),
            Self::ExclusionConflict { rule_id, conflicting_modules, conflicting_equipment } => {
                format!(
                    "rule `{}` excludes {}",
                    rule_id.0,
                    join_ids(
                        conflicting_modules
                            .iter()
                            .map(|id| id.0.as_str())
                            .chain(conflicting_equipment.iter().map(|id| id.0.as_str()))
                    )
                )
            }
            Self::DependencyUnmet { rule_id, missing, .. } => format!(
                "rule `{}` requires module(s) {}",
                rule_id.0,
                join_ids(missing.iter().map(|id| id.0.as_str()))
            ),
        }
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    ids.map(|id| format!("`{id}`")).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub violations: Vec<SelectionViolation>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self { ok: true, violations: Vec::new() }
    }
}

impl ValidationResult {
    fn push(&mut self, violation: SelectionViolation) {
        self.ok = false;
        self.violations.push(violation);
    }

    /// Pairs a passing result with the selection it was computed for.
    pub fn into_validated(
        self,
        selection: Selection,
    ) -> Result<ValidatedSelection, Vec<SelectionViolation>> {
        if self.ok {
            Ok(ValidatedSelection { selection })
        } else {
            Err(self.violations)
        }
    }
}

/// A selection that has passed validation. Only the validator can mint one, and the
/// approval ledger accepts nothing else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedSelection {
    selection: Selection,
}

impl ValidatedSelection {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn into_inner(self) -> Selection {
        self.selection
    }
}

pub trait SelectionValidator: Send + Sync {
    fn validate(&self, selection: &Selection, recommendations: &RecommendationSet)
        -> ValidationResult;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicSelectionValidator;

impl SelectionValidator for DeterministicSelectionValidator {
    fn validate(
        &self,
        selection: &Selection,
        recommendations: &RecommendationSet,
    ) -> ValidationResult {
        validate_selection(selection, recommendations)
    }
}

/// Runs validation and, when it passes, hands back the selection as a validated token.
pub fn admit(
    selection: Selection,
    recommendations: &RecommendationSet,
) -> Result<ValidatedSelection, ValidationResult> {
    let result = validate_selection(&selection, recommendations);
    if result.ok {
        Ok(ValidatedSelection { selection })
    } else {
        Err(result)
    }
}

pub fn validate_selection(
    selection: &Selection,
    recommendations: &RecommendationSet,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    for recommendation in recommendations.required() {
        if !selection.has_equipment(&recommendation.equipment_id) {
            result.push(SelectionViolation::MissingRequired {
                equipment_id: recommendation.equipment_id.clone(),
                required_by: recommendation.required_by.clone(),
            });
        }
    }

    for line in selection.equipment_lines() {
        if line.quantity == 0 {
            continue;
        }
        let Some(recommendation) = recommendations.recommendation_for(&line.equipment_id) else {
            continue;
        };
        if line.quantity < recommendation.effective_min
            || line.quantity > recommendation.effective_max
        {
            result.push(SelectionViolation::QuantityOutOfBounds {
                equipment_id: line.equipment_id.clone(),
                quantity: line.quantity,
                min: recommendation.effective_min,
                max: recommendation.effective_max,
            });
        }
    }

    for effect in &recommendations.effects {
        match effect {
            RuleEffect::Exclusion {
                rule_id,
                trigger_modules,
                trigger_equipment,
                excludes_modules,
                excludes_equipment,
            } => {
                let triggered = trigger_modules.iter().all(|id| selection.has_module(id))
                    && trigger_equipment.iter().all(|id| selection.has_equipment(id));
                if !triggered {
                    continue;
                }

                let conflicting_modules: Vec<ModuleId> = excludes_modules
                    .iter()
                    .filter(|id| selection.has_module(id))
                    .cloned()
                    .collect();
                let conflicting_equipment: Vec<EquipmentId> = excludes_equipment
                    .iter()
                    .filter(|id| selection.has_equipment(id))
                    .cloned()
                    .collect();
                if !conflicting_modules.is_empty() || !conflicting_equipment.is_empty() {
                    result.push(SelectionViolation::ExclusionConflict {
                        rule_id: rule_id.clone(),
                        conflicting_modules,
                        conflicting_equipment,
                    });
                }
            }
            RuleEffect::Dependency { rule_id, dependents, requires } => {
                let missing: BTreeSet<ModuleId> =
                    requires.iter().filter(|id| !selection.has_module(id)).cloned().collect();
                if !missing.is_empty() {
                    result.push(SelectionViolation::DependencyUnmet {
                        rule_id: rule_id.clone(),
                        dependents: dependents.clone(),
                        missing: missing.into_iter().collect(),
                    });
                }
            }
            _ => {}
        }
    }

    result
}
