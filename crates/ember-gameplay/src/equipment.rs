//! Equipped items, as far as combat cares about them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Weapon families with distinct damage and speed profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponCategory {
    /// No weapon wielded
    #[default]
    Unarmed,
    /// Swords, daggers, axes
    Blade,
    /// Maces, hammers, staves
    Club,
    /// Spears, halberds
    Polearm,
}

impl WeaponCategory {
    /// Name of the mastery skill trained by this category.
    #[must_use]
    pub const fn skill_name(self) -> &'static str {
        match self {
            Self::Unarmed => "unarmed",
            Self::Blade => "blade",
            Self::Club => "club",
            Self::Polearm => "polearm",
        }
    }
}

impl fmt::Display for WeaponCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.skill_name())
    }
}

/// Where an item is worn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentSlot {
    /// Main hand
    Wield,
    /// Off hand
    Offhand,
    /// Torso
    Body,
}

/// What an item does when equipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "category", rename_all = "snake_case")]
pub enum ItemKind {
    /// A weapon of the given category
    Weapon(WeaponCategory),
    /// A shield
    Shield,
    /// Body armor
    Armor,
}

/// An equippable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Display name
    pub name: String,
    /// Item kind
    pub kind: ItemKind,
}

impl Item {
    /// Creates a weapon.
    pub fn weapon(name: impl Into<String>, category: WeaponCategory) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Weapon(category),
        }
    }

    /// Creates a shield.
    pub fn shield(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Shield,
        }
    }

    /// Creates body armor.
    pub fn armor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Armor,
        }
    }
}

/// Items by slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Equipment {
    slots: BTreeMap<EquipmentSlot, Item>,
}

impl Equipment {
    /// Creates empty equipment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts an item in a slot, returning whatever was there.
    pub fn equip(&mut self, slot: EquipmentSlot, item: Item) -> Option<Item> {
        self.slots.insert(slot, item)
    }

    /// Empties a slot.
    pub fn unequip(&mut self, slot: EquipmentSlot) -> Option<Item> {
        self.slots.remove(&slot)
    }

    /// Item in a slot.
    #[must_use]
    pub fn get(&self, slot: EquipmentSlot) -> Option<&Item> {
        self.slots.get(&slot)
    }

    /// Category of the wielded weapon; unarmed when the main hand holds no
    /// weapon.
    #[must_use]
    pub fn weapon_category(&self) -> WeaponCategory {
        match self.get(EquipmentSlot::Wield).map(|item| item.kind) {
            Some(ItemKind::Weapon(category)) => category,
            _ => WeaponCategory::Unarmed,
        }
    }

    /// Returns true if any slot holds a shield.
    #[must_use]
    pub fn has_shield(&self) -> bool {
        self.slots.values().any(|item| item.kind == ItemKind::Shield)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weapon_category_defaults_to_unarmed() {
        let mut equipment = Equipment::new();
        assert_eq!(equipment.weapon_category(), WeaponCategory::Unarmed);

        equipment.equip(EquipmentSlot::Wield, Item::shield("buckler"));
        assert_eq!(equipment.weapon_category(), WeaponCategory::Unarmed);
        assert!(equipment.has_shield());

        equipment.equip(EquipmentSlot::Wield, Item::weapon("spear", WeaponCategory::Polearm));
        assert_eq!(equipment.weapon_category(), WeaponCategory::Polearm);
        assert!(!equipment.has_shield());
    }

    #[test]
    fn test_skill_names() {
        assert_eq!(WeaponCategory::Blade.skill_name(), "blade");
        assert_eq!(WeaponCategory::Unarmed.to_string(), "unarmed");
    }
}
