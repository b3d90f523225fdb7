//! Named effect templates.
//!
//! Regeneration, cooldowns and skill-granted effects are all built here from
//! a template plus per-call overrides. Templates can be registered in code or
//! loaded from JSON content:
//!
//! ```json
//! {
//!   "stoneskin": {
//!     "config": { "name": "Stoneskin", "type": "stoneskin", "max_stacks": 3 },
//!     "modifiers": [
//!       { "kind": "attribute", "attribute": "armor", "op": { "op": "add_per_stack", "value": 10 } }
//!     ]
//!   }
//! }
//! ```

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::CombatConfig;
use crate::context::Millis;
use crate::damage::DamageType;
use crate::effect::{
    Effect, EffectBehavior, EffectConfig, EffectError, EffectFlag, EffectResult, EffectState,
    EffectType, Lifetime, RegenSettings,
};
use crate::modifier::{Modifier, ModifierOp};

/// Template name of the regeneration effect.
pub const REGEN: &str = "regen";
/// Template name of skill cooldowns.
pub const COOLDOWN: &str = "cooldown";

/// Blueprint for fresh effect instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectTemplate {
    /// Configuration
    pub config: EffectConfig,
    /// Flags
    pub flags: BTreeSet<EffectFlag>,
    /// Modifiers
    pub modifiers: Vec<Modifier>,
    /// Behaviour
    pub behavior: EffectBehavior,
    /// Initial state
    pub state: EffectState,
}

impl EffectTemplate {
    /// Creates a template.
    #[must_use]
    pub fn new(config: EffectConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Adds a modifier.
    #[must_use]
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Adds a flag.
    #[must_use]
    pub fn with_flag(mut self, flag: EffectFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Sets the behaviour.
    #[must_use]
    pub fn with_behavior(mut self, behavior: EffectBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn instantiate(&self, config: EffectConfig, state: EffectState) -> Effect {
        let mut effect = Effect::new(config)
            .with_state(state)
            .with_behavior(self.behavior.clone());
        for flag in &self.flags {
            effect = effect.with_flag(*flag);
        }
        for modifier in &self.modifiers {
            effect = effect.with_modifier(modifier.clone());
        }
        effect
    }
}

/// Per-instance configuration overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Display name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Stacking identity
    pub effect_type: Option<EffectType>,
    /// Duration
    pub duration: Option<Lifetime>,
    /// Uniqueness
    pub unique: Option<bool>,
    /// Refresh on re-application
    pub refreshes: Option<bool>,
    /// Stack ceiling
    pub max_stacks: Option<u32>,
    /// Persistence
    pub persists: Option<bool>,
    /// Tick interval
    pub tick_interval: Option<Millis>,
    /// Hidden from players
    pub hidden: Option<bool>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut EffectConfig) {
        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            config.description.clone_from(description);
        }
        if let Some(effect_type) = &self.effect_type {
            config.effect_type = effect_type.clone();
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(unique) = self.unique {
            config.unique = unique;
        }
        if let Some(refreshes) = self.refreshes {
            config.refreshes = refreshes;
        }
        if let Some(max_stacks) = self.max_stacks {
            config.max_stacks = Some(max_stacks);
        }
        if let Some(persists) = self.persists {
            config.persists = persists;
        }
        if let Some(interval) = self.tick_interval {
            config.tick_interval = Some(interval);
        }
        if let Some(hidden) = self.hidden {
            config.hidden = hidden;
        }
    }
}

/// Registry of effect templates.
#[derive(Debug, Clone, Default)]
pub struct EffectFactory {
    templates: AHashMap<String, EffectTemplate>,
}

impl EffectFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory with the built-in templates.
    #[must_use]
    pub fn with_builtins(config: &CombatConfig) -> Self {
        let mut factory = Self::new();

        factory.register(
            REGEN,
            EffectTemplate::new(EffectConfig {
                name: "Regeneration".into(),
                description: "Recovering health, energy and mana.".into(),
                effect_type: EffectType::Regen,
                hidden: true,
                persists: false,
                tick_interval: Some(config.regen.interval_ms),
                ..EffectConfig::default()
            })
            .with_flag(EffectFlag::Buff)
            .with_behavior(EffectBehavior::Regen(RegenSettings::from(&config.regen))),
        );

        factory.register(
            COOLDOWN,
            EffectTemplate::new(EffectConfig {
                name: "Cooldown".into(),
                effect_type: EffectType::named(COOLDOWN),
                duration: Lifetime::Timed(0),
                hidden: true,
                ..EffectConfig::default()
            }),
        );

        factory.register(
            "poison",
            EffectTemplate::new(EffectConfig {
                name: "Poison".into(),
                description: "Venom burns through your veins.".into(),
                effect_type: EffectType::named("poison"),
                duration: Lifetime::Timed(15_000),
                refreshes: true,
                max_stacks: Some(5),
                tick_interval: Some(3_000),
                ..EffectConfig::default()
            })
            .with_flag(EffectFlag::Debuff)
            .with_flag(EffectFlag::Ailment)
            .with_behavior(EffectBehavior::DamageOverTime {
                attribute: "health".into(),
                amount: 2.0,
                damage_type: DamageType::Poison,
            }),
        );

        factory.register(
            "berserk",
            EffectTemplate::new(EffectConfig {
                name: "Berserk".into(),
                description: "You hit harder and guard less.".into(),
                effect_type: EffectType::named("berserk"),
                duration: Lifetime::Timed(10_000),
                ..EffectConfig::default()
            })
            .with_flag(EffectFlag::Buff)
            .with_modifier(Modifier::outgoing(ModifierOp::Multiply(1.25)))
            .with_modifier(Modifier::incoming(ModifierOp::Multiply(1.1))),
        );

        factory.register(
            "stoneskin",
            EffectTemplate::new(EffectConfig {
                name: "Stoneskin".into(),
                description: "Your skin hardens like granite.".into(),
                effect_type: EffectType::named("stoneskin"),
                duration: Lifetime::Timed(30_000),
                max_stacks: Some(3),
                ..EffectConfig::default()
            })
            .with_flag(EffectFlag::Buff)
            .with_modifier(Modifier::attribute("armor", ModifierOp::AddPerStack(10.0))),
        );

        factory.register(
            "ward",
            EffectTemplate::new(EffectConfig {
                name: "Ward".into(),
                description: "A shimmering barrier blunts the next few blows.".into(),
                effect_type: EffectType::named("ward"),
                duration: Lifetime::Timed(60_000),
                refreshes: true,
                ..EffectConfig::default()
            })
            .with_flag(EffectFlag::Buff)
            .with_modifier(Modifier::incoming(ModifierOp::Multiply(0.5)))
            .with_behavior(EffectBehavior::Ward { charges: 3 }),
        );

        factory
    }

    /// Registers a template, replacing any template with the same name.
    pub fn register(&mut self, name: impl Into<String>, template: EffectTemplate) -> Option<EffectTemplate> {
        self.templates.insert(name.into(), template)
    }

    /// Returns true if a template is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered template names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds a fresh effect from a template.
    ///
    /// `data` entries are merged over the template's initial state data.
    pub fn create(
        &self,
        name: &str,
        overrides: &ConfigOverrides,
        data: Option<BTreeMap<String, serde_json::Value>>,
    ) -> EffectResult<Effect> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| EffectError::UnknownTemplate(name.to_owned()))?;
        let mut config = template.config.clone();
        overrides.apply(&mut config);
        let mut state = template.state.clone();
        if let Some(data) = data {
            state.data.extend(data);
        }
        Ok(template.instantiate(config, state))
    }

    /// Builds a cooldown for `skill` lasting `duration` milliseconds.
    pub fn cooldown(&self, skill: &str, duration: Millis) -> EffectResult<Effect> {
        self.create(
            COOLDOWN,
            &ConfigOverrides {
                name: Some(format!("{skill} cooldown")),
                effect_type: Some(EffectType::Cooldown(skill.to_owned())),
                duration: Some(Lifetime::Timed(duration)),
                ..ConfigOverrides::default()
            },
            None,
        )
    }

    /// Registers every template in a JSON object keyed by template name.
    /// Returns how many were loaded.
    pub fn load_json(&mut self, json: &str) -> EffectResult<usize> {
        let templates: BTreeMap<String, EffectTemplate> = serde_json::from_str(json)?;
        let count = templates.len();
        for (name, template) in templates {
            debug!(template = %name, "effect template loaded");
            self.register(name, template);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins() {
        let factory = EffectFactory::with_builtins(&CombatConfig::default());
        assert_eq!(
            factory.names(),
            vec!["berserk", "cooldown", "poison", "regen", "stoneskin", "ward"]
        );
        let regen = factory
            .create(REGEN, &ConfigOverrides::default(), None)
            .expect("regen");
        assert_eq!(regen.effect_type(), &EffectType::Regen);
        assert_eq!(regen.config().tick_interval, Some(3_000));
        assert!(regen.config().hidden);
    }

    #[test]
    fn test_overrides_and_state_data() {
        let factory = EffectFactory::with_builtins(&CombatConfig::default());
        let mut data = BTreeMap::new();
        data.insert("caster".to_string(), json!("Morgana"));
        let poison = factory
            .create(
                "poison",
                &ConfigOverrides {
                    duration: Some(Lifetime::Timed(6_000)),
                    max_stacks: Some(2),
                    ..ConfigOverrides::default()
                },
                Some(data),
            )
            .expect("poison");
        assert_eq!(poison.config().duration, Lifetime::Timed(6_000));
        assert_eq!(poison.config().max_stacks, Some(2));
        assert!(poison.config().refreshes);
        assert_eq!(poison.state().data["caster"], json!("Morgana"));
        assert!(poison.has_flag(EffectFlag::Ailment));
    }

    #[test]
    fn test_cooldown_type() {
        let factory = EffectFactory::with_builtins(&CombatConfig::default());
        let cooldown = factory.cooldown("bash", 4_000).expect("cooldown");
        assert_eq!(cooldown.effect_type(), &EffectType::Cooldown("bash".into()));
        assert_eq!(cooldown.remaining(0), Some(4_000));
        assert_eq!(cooldown.name(), "bash cooldown");
    }

    #[test]
    fn test_unknown_template() {
        let factory = EffectFactory::new();
        assert!(matches!(
            factory.create("nope", &ConfigOverrides::default(), None),
            Err(EffectError::UnknownTemplate(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_load_json() {
        let mut factory = EffectFactory::new();
        let loaded = factory
            .load_json(
                r#"{
                    "ward": {
                        "config": { "name": "Ward", "type": "ward", "duration": { "timed": 5000 } },
                        "flags": ["buff"],
                        "behavior": { "behavior": "ward", "charges": 2 },
                        "modifiers": [
                            { "kind": "incoming_damage", "op": { "op": "multiply", "value": 0.5 } }
                        ]
                    }
                }"#,
            )
            .expect("load");
        assert_eq!(loaded, 1);
        let ward = factory
            .create("ward", &ConfigOverrides::default(), None)
            .expect("ward");
        assert_eq!(ward.effect_type(), &EffectType::named("ward"));
        assert_eq!(ward.config().duration, Lifetime::Timed(5_000));
        assert!(ward.config().unique);
        assert_eq!(ward.modifiers().len(), 1);
        assert_eq!(ward.behavior(), &EffectBehavior::Ward { charges: 2 });

        assert!(factory.load_json("not json").is_err());
    }
}
