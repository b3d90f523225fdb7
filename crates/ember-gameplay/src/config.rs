//! Tunable combat, progression and regeneration parameters.
//!
//! Every constant the round resolver and the damage pipeline use lives here,
//! so balance changes never touch the algorithms. All structs deserialize
//! with `#[serde(default)]`, a partial file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::equipment::WeaponCategory;

/// Linear damage and speed profile for one weapon category.
///
/// ```text
/// min   = min_base   + mastery * min_mastery   + brawn * min_brawn
/// max   = max_base   + mastery * max_mastery   + brawn * max_brawn
/// speed = speed_base - mastery / speed_mastery_divisor - reflexes / speed_reflexes_divisor
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponProfile {
    /// Minimum damage at zero skill and brawn
    pub min_base: f64,
    /// Minimum damage gained per mastery point
    pub min_mastery: f64,
    /// Minimum damage gained per brawn point
    pub min_brawn: f64,
    /// Maximum damage at zero skill and brawn
    pub max_base: f64,
    /// Maximum damage gained per mastery point
    pub max_mastery: f64,
    /// Maximum damage gained per brawn point
    pub max_brawn: f64,
    /// Seconds per round at zero skill and reflexes
    pub speed_base: f64,
    /// Mastery points per second of speed gained
    pub speed_mastery_divisor: f64,
    /// Reflex points per second of speed gained
    pub speed_reflexes_divisor: f64,
}

impl Default for WeaponProfile {
    fn default() -> Self {
        Self::unarmed()
    }
}

impl WeaponProfile {
    /// Fists and feet.
    #[must_use]
    pub fn unarmed() -> Self {
        Self {
            min_base: 1.0,
            min_mastery: 0.05,
            min_brawn: 0.1,
            max_base: 3.0,
            max_mastery: 0.1,
            max_brawn: 0.2,
            speed_base: 2.0,
            speed_mastery_divisor: 100.0,
            speed_reflexes_divisor: 250.0,
        }
    }

    /// Swords, daggers and axes.
    #[must_use]
    pub fn blade() -> Self {
        Self {
            min_base: 3.0,
            min_mastery: 0.07,
            min_brawn: 0.08,
            max_base: 7.0,
            max_mastery: 0.12,
            max_brawn: 0.12,
            speed_base: 2.6,
            speed_mastery_divisor: 100.0,
            speed_reflexes_divisor: 250.0,
        }
    }

    /// Maces, hammers and staves.
    #[must_use]
    pub fn club() -> Self {
        Self {
            min_base: 2.0,
            min_mastery: 0.05,
            min_brawn: 0.12,
            max_base: 9.0,
            max_mastery: 0.1,
            max_brawn: 0.2,
            speed_base: 3.2,
            speed_mastery_divisor: 110.0,
            speed_reflexes_divisor: 260.0,
        }
    }

    /// Spears and halberds.
    #[must_use]
    pub fn polearm() -> Self {
        Self {
            min_base: 4.0,
            min_mastery: 0.06,
            min_brawn: 0.1,
            max_base: 10.0,
            max_mastery: 0.12,
            max_brawn: 0.16,
            speed_base: 3.6,
            speed_mastery_divisor: 90.0,
            speed_reflexes_divisor: 240.0,
        }
    }
}

/// Weapon profiles by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponTable {
    /// Unarmed profile
    pub unarmed: WeaponProfile,
    /// Blade profile
    pub blade: WeaponProfile,
    /// Club profile
    pub club: WeaponProfile,
    /// Polearm profile
    pub polearm: WeaponProfile,
}

impl Default for WeaponTable {
    fn default() -> Self {
        Self {
            unarmed: WeaponProfile::unarmed(),
            blade: WeaponProfile::blade(),
            club: WeaponProfile::club(),
            polearm: WeaponProfile::polearm(),
        }
    }
}

impl WeaponTable {
    /// Profile for a category.
    #[must_use]
    pub fn profile(&self, category: WeaponCategory) -> &WeaponProfile {
        match category {
            WeaponCategory::Unarmed => &self.unarmed,
            WeaponCategory::Blade => &self.blade,
            WeaponCategory::Club => &self.club,
            WeaponCategory::Polearm => &self.polearm,
        }
    }
}

/// Probabilistic skill improvement.
///
/// ```text
/// aptitude = intellect * intellect_weight + perception * perception_weight + luck * luck_weight
/// chance   = max_chance / (1 + e^((skill - aptitude) / spread))
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillConfig {
    /// Upper bound of the improvement probability (0.0-1.0)
    pub max_chance: f64,
    /// Steepness of the sigmoid; larger is flatter
    pub spread: f64,
    /// Skills never rise above this base value
    pub cap: f64,
    /// Weight of intellect in aptitude
    pub intellect_weight: f64,
    /// Weight of perception in aptitude
    pub perception_weight: f64,
    /// Weight of luck in aptitude
    pub luck_weight: f64,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            max_chance: 0.1,
            spread: 10.0,
            cap: 100.0,
            intellect_weight: 0.4,
            perception_weight: 0.3,
            luck_weight: 0.3,
        }
    }
}

/// Post-combat regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenConfig {
    /// Milliseconds between regeneration pulses
    pub interval_ms: u64,
    /// Fraction of max restored per pulse while fighting
    pub in_combat_rate: f64,
    /// Fraction of max restored per pulse out of combat
    pub out_of_combat_rate: f64,
    /// Favor lost per pulse while not fighting
    pub favor_drain: f64,
    /// Attributes restored by regeneration
    pub attributes: Vec<String>,
}

impl Default for RegenConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            in_combat_rate: 0.02,
            out_of_combat_rate: 0.1,
            favor_drain: 1.0,
            attributes: vec!["health".into(), "energy".into(), "mana".into()],
        }
    }
}

/// Combat tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Flat dodge chance in percent
    pub dodge_base: f64,
    /// Dodge skill points per percent of dodge chance
    pub dodge_skill_divisor: f64,
    /// Block base when the defender carries a shield
    pub block_base_shield: f64,
    /// Block base when the defender is armed and the attacker is not
    pub block_base_armed: f64,
    /// Block base otherwise
    pub block_base_unarmed: f64,
    /// Block skill points per percent of block chance
    pub block_skill_divisor: f64,
    /// Armor points per point of damage absorbed
    pub armor_divisor: f64,
    /// Defense skill points per point of damage absorbed
    pub defense_divisor: f64,
    /// Default multiplier applied to critical hits
    pub critical_multiplier: f64,
    /// Fastest possible weapon speed in seconds
    pub min_weapon_speed: f64,
    /// Weapon speed at which normalized damage equals the raw roll
    pub reference_speed: f64,
    /// Weapon profiles
    pub weapons: WeaponTable,
    /// Skill improvement tuning
    pub skills: SkillConfig,
    /// Regeneration tuning
    pub regen: RegenConfig,
    /// Whether players may fight each other
    pub pvp: bool,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            dodge_base: 20.0,
            dodge_skill_divisor: 5.0,
            block_base_shield: 20.0,
            block_base_armed: 15.0,
            block_base_unarmed: 10.0,
            block_skill_divisor: 5.0,
            armor_divisor: 6.0,
            defense_divisor: 8.0,
            critical_multiplier: 1.5,
            min_weapon_speed: 0.5,
            reference_speed: 2.5,
            weapons: WeaponTable::default(),
            skills: SkillConfig::default(),
            regen: RegenConfig::default(),
            pvp: false,
        }
    }
}
