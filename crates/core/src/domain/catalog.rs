use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EquipmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityModule {
    pub id: ModuleId,
    pub name: String,
    pub category: String,
    pub monthly_fee: Decimal,
    pub setup_fee: Decimal,
    pub license_fee: Decimal,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentItem {
    pub id: EquipmentId,
    pub name: String,
    pub category: String,
    pub unit_cost: Decimal,
    pub installation_cost: Decimal,
    pub maintenance_cost: Decimal,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRule {
    pub id: RuleId,
    pub module_id: ModuleId,
    pub equipment_id: EquipmentId,
    pub default_quantity: u32,
    pub is_required: bool,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub cost_multiplier: Decimal,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRuleKind {
    Dependency,
    Exclusion,
    Quantity,
    Cost,
    Bundle,
}

impl BusinessRuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dependency => "dependency",
            Self::Exclusion => "exclusion",
            Self::Quantity => "quantity",
            Self::Cost => "cost",
            Self::Bundle => "bundle",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dependency" => Some(Self::Dependency),
            "exclusion" => Some(Self::Exclusion),
            "quantity" => Some(Self::Quantity),
            "cost" => Some(Self::Cost),
            "bundle" => Some(Self::Bundle),
            _ => None,
        }
    }
}

/// Kind-specific payload of a [`BusinessRule`]. The variant decides the rule type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleValue {
    /// Every gate module requires each of `requires` to be selected as well.
    Dependency { requires: Vec<ModuleId> },
    /// The gate side (rule modules plus rule equipment) may not coexist with any of these.
    Exclusion {
        #[serde(default)]
        excludes_modules: Vec<ModuleId>,
        #[serde(default)]
        excludes_equipment: Vec<EquipmentId>,
    },
    /// Bounds override for the rule's equipment; `exact` pins min, max and suggestion.
    Quantity {
        #[serde(default)]
        min: Option<u32>,
        #[serde(default)]
        max: Option<u32>,
        #[serde(default)]
        exact: Option<u32>,
    },
    Cost { multiplier: Decimal },
    /// Signed delta comes from [`BusinessRule::cost_impact`].
    Bundle,
}

impl RuleValue {
    pub fn kind(&self) -> BusinessRuleKind {
        match self {
            Self::Dependency { .. } => BusinessRuleKind::Dependency,
            Self::Exclusion { .. } => BusinessRuleKind::Exclusion,
            Self::Quantity { .. } => BusinessRuleKind::Quantity,
            Self::Cost { .. } => BusinessRuleKind::Cost,
            Self::Bundle => BusinessRuleKind::Bundle,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub id: RuleId,
    pub name: String,
    pub module_ids: Vec<ModuleId>,
    pub equipment_ids: Vec<EquipmentId>,
    pub value: RuleValue,
    pub priority: i32,
    pub cost_impact: Option<Decimal>,
}

impl BusinessRule {
    pub fn kind(&self) -> BusinessRuleKind {
        self.value.kind()
    }
}

/// Immutable view of the catalog used for one engine evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub modules: Vec<CapabilityModule>,
    pub equipment: Vec<EquipmentItem>,
    pub recommendation_rules: Vec<RecommendationRule>,
    pub business_rules: Vec<BusinessRule>,
}

impl CatalogSnapshot {
    pub fn new(
        modules: Vec<CapabilityModule>,
        equipment: Vec<EquipmentItem>,
        recommendation_rules: Vec<RecommendationRule>,
        business_rules: Vec<BusinessRule>,
    ) -> Self {
        Self { modules, equipment, recommendation_rules, business_rules }
    }

    pub fn module(&self, id: &ModuleId) -> Option<&CapabilityModule> {
        self.modules.iter().find(|module| &module.id == id)
    }

    pub fn equipment_item(&self, id: &EquipmentId) -> Option<&EquipmentItem> {
        self.equipment.iter().find(|item| &item.id == id)
    }

    pub fn active_module(&self, id: &ModuleId) -> Option<&CapabilityModule> {
        self.module(id).filter(|module| module.active)
    }

    pub fn active_equipment_item(&self, id: &EquipmentId) -> Option<&EquipmentItem> {
        self.equipment_item(id).filter(|item| item.active)
    }
}
