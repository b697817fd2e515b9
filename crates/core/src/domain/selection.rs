use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{EquipmentId, ModuleId};

/// A user's chosen modules and equipment for one site.
///
/// Fields are private so that every change goes through a setter: module ids stay unique
/// and each equipment item carries exactly one quantity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    modules: BTreeSet<ModuleId>,
    equipment: BTreeMap<EquipmentId, u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentLine {
    pub equipment_id: EquipmentId,
    pub quantity: u32,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.select_module(ModuleId(module_id.into()));
        self
    }

    pub fn with_equipment(mut self, equipment_id: impl Into<String>, quantity: u32) -> Self {
        self.set_equipment_quantity(EquipmentId(equipment_id.into()), quantity);
        self
    }

    /// Returns `false` when the module was already selected.
    pub fn select_module(&mut self, module_id: ModuleId) -> bool {
        self.modules.insert(module_id)
    }

    pub fn deselect_module(&mut self, module_id: &ModuleId) -> bool {
        self.modules.remove(module_id)
    }

    /// Replaces any previous quantity for the item.
    pub fn set_equipment_quantity(&mut self, equipment_id: EquipmentId, quantity: u32) {
        self.equipment.insert(equipment_id, quantity);
    }

    pub fn remove_equipment(&mut self, equipment_id: &EquipmentId) -> Option<u32> {
        self.equipment.remove(equipment_id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.iter()
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.iter().cloned().collect()
    }

    pub fn has_module(&self, module_id: &ModuleId) -> bool {
        self.modules.contains(module_id)
    }

    pub fn quantity_of(&self, equipment_id: &EquipmentId) -> u32 {
        self.equipment.get(equipment_id).copied().unwrap_or(0)
    }

    /// An item counts as present only with a quantity of at least one.
    pub fn has_equipment(&self, equipment_id: &EquipmentId) -> bool {
        self.quantity_of(equipment_id) > 0
    }

    pub fn equipment_lines(&self) -> Vec<EquipmentLine> {
        self.equipment
            .iter()
            .map(|(equipment_id, quantity)| EquipmentLine {
                equipment_id: equipment_id.clone(),
                quantity: *quantity,
            })
            .collect()
    }

    pub fn from_parts(
        modules: impl IntoIterator<Item = ModuleId>,
        equipment: impl IntoIterator<Item = EquipmentLine>,
    ) -> Self {
        let mut selection = Self::new();
        for module_id in modules {
            selection.select_module(module_id);
        }
        for line in equipment {
            selection.set_equipment_quantity(line.equipment_id, line.quantity);
        }
        selection
    }
}
