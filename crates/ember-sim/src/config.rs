//! Simulation configuration.
//!
//! Holds the tick rate, the arena roster and the combat tuning. The file is
//! TOML; a missing or broken file falls back to the built-in arena.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use ember_common::{EmberError, EmberResult};
use ember_gameplay::{CharacterKind, CombatConfig, WeaponCategory};

/// Configuration file name.
pub const CONFIG_FILE: &str = "ember.toml";

/// One combatant placed in the arena at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatantSpec {
    /// Display name, also used to reference the combatant in fights
    pub name: String,
    /// Player or NPC
    pub kind: CharacterKind,
    /// Attribute bases
    pub attributes: BTreeMap<String, f64>,
    /// Skill bases
    pub skills: BTreeMap<String, f64>,
    /// Wielded weapon, if any
    pub weapon: Option<WeaponCategory>,
    /// Carries a shield
    pub shield: bool,
    /// Wears body armor
    pub armor: bool,
    /// Refuses all fights
    pub pacifist: bool,
    /// Effect templates applied at spawn
    pub effects: Vec<String>,
}

impl Default for CombatantSpec {
    fn default() -> Self {
        Self {
            name: "Nobody".into(),
            kind: CharacterKind::Npc,
            attributes: BTreeMap::from([("health".into(), 100.0)]),
            skills: BTreeMap::new(),
            weapon: None,
            shield: false,
            armor: false,
            pacifist: false,
            effects: Vec::new(),
        }
    }
}

/// A fight started when the arena opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightSpec {
    /// Name of the combatant that engages
    pub attacker: String,
    /// Name of the combatant being engaged
    pub target: String,
}

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulated milliseconds per tick
    pub tick_ms: u64,
    /// Ticks to run before stopping (0 = until every fight is over)
    pub max_ticks: u64,
    /// Random seed (None = random)
    pub seed: Option<u64>,
    /// Sleep between ticks to run at wall-clock speed
    pub realtime: bool,
    /// Log every drained event, not only the summary
    pub log_events: bool,
    /// Combat tuning
    pub combat: CombatConfig,
    /// Combatants spawned at start-up
    pub roster: Vec<CombatantSpec>,
    /// Fights started at start-up
    pub fights: Vec<FightSpec>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            max_ticks: 2_400,
            seed: None,
            realtime: false,
            log_events: true,
            combat: CombatConfig::default(),
            roster: vec![
                CombatantSpec {
                    name: "Aldric".into(),
                    kind: CharacterKind::Player,
                    attributes: BTreeMap::from([
                        ("health".into(), 120.0),
                        ("energy".into(), 60.0),
                        ("brawn".into(), 14.0),
                        ("reflexes".into(), 12.0),
                        ("endurance".into(), 10.0),
                        ("intellect".into(), 10.0),
                        ("perception".into(), 10.0),
                        ("luck".into(), 8.0),
                        ("critical".into(), 5.0),
                    ]),
                    skills: BTreeMap::from([
                        ("blade".into(), 20.0),
                        ("offense".into(), 15.0),
                        ("defense".into(), 10.0),
                        ("dodge".into(), 10.0),
                        ("block".into(), 10.0),
                    ]),
                    weapon: Some(WeaponCategory::Blade),
                    shield: true,
                    armor: true,
                    ..CombatantSpec::default()
                },
                CombatantSpec {
                    name: "Cave Troll".into(),
                    kind: CharacterKind::Npc,
                    attributes: BTreeMap::from([
                        ("health".into(), 150.0),
                        ("brawn".into(), 18.0),
                        ("reflexes".into(), 6.0),
                        ("endurance".into(), 16.0),
                        ("armor".into(), 12.0),
                    ]),
                    skills: BTreeMap::from([("club".into(), 15.0), ("offense".into(), 10.0)]),
                    weapon: Some(WeaponCategory::Club),
                    effects: vec!["stoneskin".into()],
                    ..CombatantSpec::default()
                },
            ],
            fights: vec![FightSpec {
                attacker: "Aldric".into(),
                target: "Cave Troll".into(),
            }],
        }
    }
}

impl SimConfig {
    /// Load configuration from `ember.toml` in the working directory.
    /// Returns the default arena if the file doesn't exist.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns the default arena if the file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to load config file: {e}");
                Self::default()
            },
        }
    }

    /// Load configuration from a specific path, reporting every failure.
    pub fn try_load_from<P: AsRef<Path>>(path: P) -> EmberResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|e| EmberError::Config(e.to_string()))?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Default configuration file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }

    /// Clamp values to sensible ranges.
    pub fn validate(&mut self) {
        self.tick_ms = self.tick_ms.clamp(10, 10_000);
        self.combat.min_weapon_speed = self.combat.min_weapon_speed.max(0.1);
        self.combat.critical_multiplier = self.combat.critical_multiplier.max(1.0);
        self.combat.regen.interval_ms = self.combat.regen.interval_ms.max(self.tick_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_arena_has_a_fight() {
        let config = SimConfig::default();
        assert_eq!(config.roster.len(), 2);
        assert_eq!(config.fights.len(), 1);
        assert!(config
            .roster
            .iter()
            .any(|spec| spec.name == config.fights[0].target));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("arena.toml");

        let mut config = SimConfig::default();
        config.tick_ms = 100;
        config.seed = Some(12345);
        config.combat.pvp = true;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded.tick_ms, 100);
        assert_eq!(loaded.seed, Some(12345));
        assert!(loaded.combat.pvp);
        assert_eq!(loaded.roster, config.roster);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(
            &config_path,
            "tick_ms = 500\n\n[combat]\ndodge_base = 30.0\n",
        )
        .expect("write");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded.tick_ms, 500);
        assert_eq!(loaded.combat.dodge_base, 30.0);
        assert_eq!(loaded.combat.block_base_shield, 20.0);
        assert_eq!(loaded.roster.len(), 2);
    }

    #[test]
    fn test_broken_file_falls_back() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "tick_ms = \"fast\"").expect("write");

        assert!(matches!(
            SimConfig::try_load_from(&config_path),
            Err(EmberError::Config(_))
        ));
        assert_eq!(SimConfig::load_from(&config_path), SimConfig::default());
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = SimConfig::load_from("/nonexistent/path/ember.toml");
        assert_eq!(config.tick_ms, 250);
    }

    #[test]
    fn test_validation_clamps() {
        let mut config = SimConfig::default();
        config.tick_ms = 0;
        config.combat.critical_multiplier = 0.5;
        config.validate();
        assert_eq!(config.tick_ms, 10);
        assert_eq!(config.combat.critical_multiplier, 1.0);
    }
}
