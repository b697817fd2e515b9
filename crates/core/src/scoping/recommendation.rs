use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::catalog::{
    BusinessRule, CatalogSnapshot, EquipmentId, ModuleId, RecommendationRule, RuleId, RuleValue,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentRecommendation {
    pub equipment_id: EquipmentId,
    pub equipment_name: String,
    pub is_required: bool,
    pub suggested_quantity: u32,
    pub effective_min: u32,
    pub effective_max: u32,
    pub cost_multiplier: Decimal,
    /// Selected modules whose rule marks this item as required.
    pub required_by: Vec<ModuleId>,
    pub reasons: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleEffect {
    Dependency {
        rule_id: RuleId,
        dependents: Vec<ModuleId>,
        requires: Vec<ModuleId>,
    },
    Exclusion {
        rule_id: RuleId,
        trigger_modules: Vec<ModuleId>,
        trigger_equipment: Vec<EquipmentId>,
        excludes_modules: Vec<ModuleId>,
        excludes_equipment: Vec<EquipmentId>,
    },
    QuantityOverride {
        rule_id: RuleId,
        equipment_id: EquipmentId,
        min: u32,
        max: u32,
        suggested: u32,
    },
    CostOverride {
        rule_id: RuleId,
        equipment_id: EquipmentId,
        multiplier: Decimal,
    },
    BundleAdjustment {
        rule_id: RuleId,
        delta: Decimal,
    },
}

impl RuleEffect {
    pub fn rule_id(&self) -> &RuleId {
        match self {
            Self::Dependency { rule_id, .. }
            | Self::Exclusion { rule_id, .. }
            | Self::QuantityOverride { rule_id, .. }
            | Self::CostOverride { rule_id, .. }
            | Self::BundleAdjustment { rule_id, .. } => rule_id,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub selected_modules: Vec<ModuleId>,
    /// Ascending by equipment id.
    pub equipment: Vec<EquipmentRecommendation>,
    /// In the order the business rules were applied.
    pub effects: Vec<RuleEffect>,
}

impl RecommendationSet {
    pub fn recommendation_for(&self, equipment_id: &EquipmentId) -> Option<&EquipmentRecommendation> {
        self.equipment
            .binary_search_by(|entry| entry.equipment_id.cmp(equipment_id))
            .ok()
            .and_then(|index| self.equipment.get(index))
    }

    pub fn required(&self) -> impl Iterator<Item = &EquipmentRecommendation> {
        self.equipment.iter().filter(|entry| entry.is_required)
    }

    pub fn bundle_delta(&self) -> Decimal {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                RuleEffect::BundleAdjustment { delta, .. } => Some(*delta),
                _ => None,
            })
            .sum()
    }

    /// SHA-256 over the canonical JSON encoding; equal inputs give equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let payload = match serde_json::to_vec(self) {
            Ok(payload) => payload,
            Err(_) => format!("{self:?}").into_bytes(),
        };
        let digest = Sha256::digest(&payload);

        let mut output = String::with_capacity(digest.len() * 2);
        for byte in digest.as_slice() {
            output.push_str(&format!("{byte:02x}"));
        }
        output
    }
}

pub trait RecommendationEngine: Send + Sync {
    fn derive(&self, selected_modules: &[ModuleId], catalog: &CatalogSnapshot) -> RecommendationSet;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicRecommendationEngine;

impl RecommendationEngine for DeterministicRecommendationEngine {
    fn derive(&self, selected_modules: &[ModuleId], catalog: &CatalogSnapshot) -> RecommendationSet {
        derive_recommendations(selected_modules, catalog)
    }
}

pub fn derive_recommendations(
    selected_modules: &[ModuleId],
    catalog: &CatalogSnapshot,
) -> RecommendationSet {
    let selected: BTreeSet<ModuleId> = selected_modules.iter().cloned().collect();

    let mut merged: BTreeMap<EquipmentId, EquipmentRecommendation> = BTreeMap::new();
    for rule in contributing_rules(&selected, catalog) {
        let Some(item) = catalog.active_equipment_item(&rule.equipment_id) else {
            continue;
        };

        match merged.get_mut(&rule.equipment_id) {
            Some(entry) => merge_rule(entry, rule),
            None => {
                merged.insert(
                    rule.equipment_id.clone(),
                    EquipmentRecommendation {
                        equipment_id: rule.equipment_id.clone(),
                        equipment_name: item.name.clone(),
                        is_required: rule.is_required,
                        suggested_quantity: rule.default_quantity,
                        effective_min: rule.min_quantity,
                        effective_max: rule.max_quantity,
                        cost_multiplier: rule.cost_multiplier,
                        required_by: if rule.is_required {
                            vec![rule.module_id.clone()]
                        } else {
                            Vec::new()
                        },
                        reasons: reason_list(&rule.reason),
                    },
                );
            }
        }
    }

    let mut business_rules: Vec<&BusinessRule> = catalog.business_rules.iter().collect();
    business_rules.sort_by(|left, right| {
        left.priority.cmp(&right.priority).then_with(|| left.id.cmp(&right.id))
    });

    let mut effects = Vec::new();
    for rule in business_rules {
        if !is_armed(rule, &selected) {
            continue;
        }
        apply_business_rule(rule, &mut merged, &mut effects);
    }

    RecommendationSet {
        selected_modules: selected.into_iter().collect(),
        equipment: merged.into_values().collect(),
        effects,
    }
}

/// A business rule is armed once every module it names is selected.
pub fn is_armed(rule: &BusinessRule, selected: &BTreeSet<ModuleId>) -> bool {
    rule.module_ids.iter().all(|module_id| selected.contains(module_id))
}

fn contributing_rules<'a>(
    selected: &BTreeSet<ModuleId>,
    catalog: &'a CatalogSnapshot,
) -> Vec<&'a RecommendationRule> {
    let mut rules: Vec<&RecommendationRule> = catalog
        .recommendation_rules
        .iter()
        .filter(|rule| {
            selected.contains(&rule.module_id) && catalog.active_module(&rule.module_id).is_some()
        })
        .collect();
    rules.sort_by(|left, right| left.id.cmp(&right.id));
    rules
}

fn merge_rule(entry: &mut EquipmentRecommendation, rule: &RecommendationRule) {
    entry.is_required |= rule.is_required;
    entry.suggested_quantity = entry.suggested_quantity.max(rule.default_quantity);
    entry.effective_min = entry.effective_min.max(rule.min_quantity);
    entry.effective_max = entry.effective_max.min(rule.max_quantity);
    entry.cost_multiplier = entry.cost_multiplier.max(rule.cost_multiplier);

    if rule.is_required && !entry.required_by.contains(&rule.module_id) {
        entry.required_by.push(rule.module_id.clone());
        entry.required_by.sort();
    }
    for reason in reason_list(&rule.reason) {
        if !entry.reasons.contains(&reason) {
            entry.reasons.push(reason);
        }
    }
}

fn reason_list(reason: &str) -> Vec<String> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_owned()]
    }
}

fn apply_business_rule(
    rule: &BusinessRule,
    merged: &mut BTreeMap<EquipmentId, EquipmentRecommendation>,
    effects: &mut Vec<RuleEffect>,
) {
    match &rule.value {
        RuleValue::Dependency { requires } => effects.push(RuleEffect::Dependency {
            rule_id: rule.id.clone(),
            dependents: rule.module_ids.clone(),
            requires: requires.clone(),
        }),
        RuleValue::Exclusion { excludes_modules, excludes_equipment } => {
            effects.push(RuleEffect::Exclusion {
                rule_id: rule.id.clone(),
                trigger_modules: rule.module_ids.clone(),
                trigger_equipment: rule.equipment_ids.clone(),
                excludes_modules: excludes_modules.clone(),
                excludes_equipment: excludes_equipment.clone(),
            })
        }
        RuleValue::Quantity { min, max, exact } => {
            for equipment_id in &rule.equipment_ids {
                let Some(entry) = merged.get_mut(equipment_id) else {
                    continue;
                };

                match exact {
                    Some(exact) => {
                        entry.effective_min = *exact;
                        entry.effective_max = *exact;
                        entry.suggested_quantity = *exact;
                    }
                    None => {
                        if let Some(min) = min {
                            entry.effective_min = *min;
                        }
                        if let Some(max) = max {
                            entry.effective_max = *max;
                        }
                        if entry.effective_min <= entry.effective_max {
                            entry.suggested_quantity = entry
                                .suggested_quantity
                                .clamp(entry.effective_min, entry.effective_max);
                        }
                    }
                }

                effects.push(RuleEffect::QuantityOverride {
                    rule_id: rule.id.clone(),
                    equipment_id: equipment_id.clone(),
                    min: entry.effective_min,
                    max: entry.effective_max,
                    suggested: entry.suggested_quantity,
                });
            }
        }
        RuleValue::Cost { multiplier } => {
            for equipment_id in &rule.equipment_ids {
                let Some(entry) = merged.get_mut(equipment_id) else {
                    continue;
                };
                entry.cost_multiplier = *multiplier;
                effects.push(RuleEffect::CostOverride {
                    rule_id: rule.id.clone(),
                    equipment_id: equipment_id.clone(),
                    multiplier: *multiplier,
                });
            }
        }
        RuleValue::Bundle => {
            if let Some(delta) = rule.cost_impact {
                effects.push(RuleEffect::BundleAdjustment { rule_id: rule.id.clone(), delta });
            }
        }
    }
}
