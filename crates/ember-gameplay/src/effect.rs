//! Effects: timed or permanent modifiers attached to one character.
//!
//! An effect moves through a small state machine:
//!
//! ```text
//! inactive --activate--> active <--pause/resume--> paused
//!                           |
//!                        remove (terminal)
//! ```
//!
//! Effects never touch their owner directly. Attribute and damage modifiers
//! are plain data folded by [`crate::effect_list::EffectList`], and periodic
//! behaviour returns [`EffectCommand`]s that the owning character applies
//! after the event has been delivered to every effect.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::{trace, warn};

use ember_common::{EffectId, EntityId, SchemaVersion};

use crate::config::RegenConfig;
use crate::context::Millis;
use crate::damage::{Damage, DamageSource, DamageType};
use crate::events::CharacterEvent;
use crate::modifier::Modifier;

/// State key counting hits soaked by a ward.
const WARD_HITS: &str = "hits";

/// Effect error types.
#[derive(Debug, Error)]
pub enum EffectError {
    /// The effect is not in this list
    #[error("effect {0} is not in this effect list")]
    NotFound(EffectId),
    /// No template with this name is registered
    #[error("unknown effect template `{0}`")]
    UnknownTemplate(String),
    /// The effect was built for another character
    #[error("effect targets {actual}, list belongs to {expected}")]
    ForeignTarget {
        /// Owner of the list
        expected: EntityId,
        /// Target recorded on the effect
        actual: EntityId,
    },
    /// The effect instance was already removed from a list
    #[error("effect {0} was removed and can not be reused")]
    Terminated(EffectId),
    /// A persisted record has an unreadable schema version
    #[error("effect record version {found} is not readable (supported {supported})")]
    IncompatibleRecord {
        /// Version found in the record
        found: SchemaVersion,
        /// Version this build writes
        supported: SchemaVersion,
    },
    /// Template or record payload could not be parsed
    #[error("effect data error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for effect operations.
pub type EffectResult<T> = Result<T, EffectError>;

/// Stacking identity of an effect.
///
/// Serialized as a plain string: `"regen"`, `"cooldown.<skill>"`, or any
/// other name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectType {
    /// Post-combat regeneration
    Regen,
    /// Skill cooldown for the named skill
    Cooldown(String),
    /// Any other effect family
    Named(String),
}

impl EffectType {
    /// Shorthand for a named type.
    pub fn named(name: impl Into<String>) -> Self {
        Self::from(name.into())
    }
}

impl Default for EffectType {
    fn default() -> Self {
        Self::Named("undef".into())
    }
}

impl From<String> for EffectType {
    fn from(value: String) -> Self {
        if value == "regen" {
            Self::Regen
        } else if let Some(skill) = value.strip_prefix("cooldown.") {
            Self::Cooldown(skill.to_owned())
        } else {
            Self::Named(value)
        }
    }
}

impl From<EffectType> for String {
    fn from(value: EffectType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regen => f.write_str("regen"),
            Self::Cooldown(skill) => write!(f, "cooldown.{skill}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// How long an effect lasts once active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// Until removed
    #[default]
    Infinite,
    /// For this many milliseconds of unpaused time
    Timed(Millis),
}

/// Immutable effect metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Display name
    pub name: String,
    /// Display description
    pub description: String,
    /// Stacking identity
    #[serde(rename = "type")]
    pub effect_type: EffectType,
    /// Duration
    pub duration: Lifetime,
    /// Activate as soon as the effect joins a list
    pub auto_activate: bool,
    /// At most one effect of this type per character
    pub unique: bool,
    /// Re-application resets the duration instead of being rejected
    pub refreshes: bool,
    /// Re-application adds a stack up to this count
    pub max_stacks: Option<u32>,
    /// Included when the effect list is serialized
    pub persists: bool,
    /// Minimum milliseconds between accepted ticks
    pub tick_interval: Option<Millis>,
    /// Not shown to players
    pub hidden: bool,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            name: "Unnamed Effect".into(),
            description: String::new(),
            effect_type: EffectType::default(),
            duration: Lifetime::Infinite,
            auto_activate: true,
            unique: true,
            refreshes: false,
            max_stacks: None,
            persists: true,
            tick_interval: None,
            hidden: false,
        }
    }
}

/// Mutable per-instance effect state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectState {
    /// Current stack count
    pub stacks: u32,
    /// Accepted ticks so far
    pub ticks: u64,
    /// Time of the last accepted tick
    pub last_tick: Option<Millis>,
    /// Effect-specific keyed data
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Default for EffectState {
    fn default() -> Self {
        Self {
            stacks: 1,
            ticks: 0,
            last_tick: None,
            data: BTreeMap::new(),
        }
    }
}

/// Classification flags used by outer layers (cleansing, display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectFlag {
    /// Beneficial
    Buff,
    /// Harmful
    Debuff,
    /// Disease, poison and similar conditions
    Ailment,
}

/// Regeneration tuning carried by a regen effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenSettings {
    /// Fraction of max restored per tick while fighting
    pub in_combat_rate: f64,
    /// Fraction of max restored per tick out of combat
    pub out_of_combat_rate: f64,
    /// Favor drained per tick out of combat
    pub favor_drain: f64,
    /// Attributes to restore
    pub attributes: Vec<String>,
}

impl Default for RegenSettings {
    fn default() -> Self {
        Self::from(&RegenConfig::default())
    }
}

impl From<&RegenConfig> for RegenSettings {
    fn from(config: &RegenConfig) -> Self {
        Self {
            in_combat_rate: config.in_combat_rate,
            out_of_combat_rate: config.out_of_combat_rate,
            favor_drain: config.favor_drain,
            attributes: config.attributes.clone(),
        }
    }
}

/// Behaviour run on accepted ticks and on forwarded events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum EffectBehavior {
    /// Modifiers only
    #[default]
    Passive,
    /// Restore resources toward max, drain favor out of combat
    Regen(RegenSettings),
    /// Damage the owner every tick, scaled by stacks
    DamageOverTime {
        /// Attribute to damage
        attribute: String,
        /// Damage per stack per tick
        amount: f64,
        /// Damage type
        #[serde(default)]
        damage_type: DamageType,
    },
    /// Soak damaging hits, expiring after `charges` of them
    Ward {
        /// Hits absorbed before the ward breaks
        charges: u32,
    },
}

/// Current and max value of one attribute at event time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeValue {
    /// Current value
    pub current: f64,
    /// Max value
    pub max: f64,
}

/// Read-only view of the owner's attributes handed to effects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSnapshot {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeSnapshot {
    /// Records one attribute.
    pub fn insert(&mut self, name: impl Into<String>, current: f64, max: f64) {
        self.values
            .insert(name.into(), AttributeValue { current, max });
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<AttributeValue> {
        self.values.get(name).copied()
    }
}

/// What an effect sees while handling an event.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    /// Current time
    pub now: Millis,
    /// Owning character
    pub owner: EntityId,
    /// Whether the owner is fighting
    pub in_combat: bool,
    /// Owner attributes
    pub attributes: &'a AttributeSnapshot,
}

/// Side effect requested by an effect, applied by the owning character.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectCommand {
    /// Commit damage or a heal against the owner
    Commit(Damage),
    /// Heal the owner, never above max
    Restore {
        /// Attribute to restore
        attribute: String,
        /// Amount before modifiers
        amount: f64,
        /// Name of the requesting effect
        source: String,
    },
    /// Lower an attribute without going through the damage pipeline
    Drain {
        /// Attribute to drain
        attribute: String,
        /// Amount to drain
        amount: f64,
    },
    /// Remove the requesting effect from the owner's list
    Expire(EffectId),
}

/// A modifier instance attached to one character.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    id: EffectId,
    target: Option<EntityId>,
    config: EffectConfig,
    state: EffectState,
    flags: BTreeSet<EffectFlag>,
    modifiers: Vec<Modifier>,
    behavior: EffectBehavior,
    started_at: Option<Millis>,
    paused: Option<Millis>,
    banked: Millis,
    active: bool,
    removed: bool,
}

impl Effect {
    /// Creates an inactive effect.
    #[must_use]
    pub fn new(config: EffectConfig) -> Self {
        Self {
            id: EffectId::new(),
            target: None,
            config,
            state: EffectState::default(),
            flags: BTreeSet::new(),
            modifiers: Vec::new(),
            behavior: EffectBehavior::Passive,
            started_at: None,
            paused: None,
            banked: 0,
            active: false,
            removed: false,
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

    /// Sets the periodic behaviour.
    #[must_use]
    pub fn with_behavior(mut self, behavior: EffectBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Replaces the state.
    #[must_use]
    pub fn with_state(mut self, state: EffectState) -> Self {
        self.state = state;
        self
    }

    /// Binds the effect to a character.
    #[must_use]
    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target = Some(target);
        self
    }

    /// Starts the clock as if `elapsed` milliseconds had already run.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Millis) -> Self {
        self.banked = elapsed;
        self
    }

    /// Instance id.
    #[must_use]
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Character this effect is attached to.
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub(crate) fn set_target(&mut self, target: EntityId) {
        self.target = Some(target);
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Display description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.config.description
    }

    /// Stacking identity.
    #[must_use]
    pub fn effect_type(&self) -> &EffectType {
        &self.config.effect_type
    }

    /// State.
    #[must_use]
    pub fn state(&self) -> &EffectState {
        &self.state
    }

    /// Mutable state.
    pub fn state_mut(&mut self) -> &mut EffectState {
        &mut self.state
    }

    /// Current stack count.
    #[must_use]
    pub fn stacks(&self) -> u32 {
        self.state.stacks
    }

    /// Flags.
    #[must_use]
    pub fn flags(&self) -> &BTreeSet<EffectFlag> {
        &self.flags
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub fn has_flag(&self, flag: EffectFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Modifiers in application order.
    #[must_use]
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Periodic behaviour.
    #[must_use]
    pub fn behavior(&self) -> &EffectBehavior {
        &self.behavior
    }

    /// Time the clock was last (re)started.
    #[must_use]
    pub fn started_at(&self) -> Option<Millis> {
        self.started_at
    }

    /// Returns true while active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns true while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    /// Returns true once removed from a list.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns true if modifiers and behaviour currently apply.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active && !self.removed && self.paused.is_none()
    }

    /// Milliseconds of unpaused active time.
    #[must_use]
    pub fn elapsed(&self, now: Millis) -> Millis {
        if let Some(frozen) = self.paused {
            return frozen;
        }
        match (self.active, self.started_at) {
            (true, Some(started)) => now.saturating_sub(started),
            _ => self.banked,
        }
    }

    /// Milliseconds left, `None` for infinite effects.
    #[must_use]
    pub fn remaining(&self, now: Millis) -> Option<Millis> {
        match self.config.duration {
            Lifetime::Infinite => None,
            Lifetime::Timed(duration) => Some(duration.saturating_sub(self.elapsed(now))),
        }
    }

    /// Returns false once removed or once the duration has elapsed.
    #[must_use]
    pub fn is_current(&self, now: Millis) -> bool {
        if self.removed {
            return false;
        }
        match self.config.duration {
            Lifetime::Infinite => true,
            Lifetime::Timed(duration) => self.elapsed(now) < duration,
        }
    }

    /// Starts the clock. Returns false if already active or removed.
    pub fn activate(&mut self, now: Millis) -> bool {
        if self.active || self.removed {
            return false;
        }
        self.started_at = Some(now.saturating_sub(self.banked));
        self.active = true;
        true
    }

    /// Stops the clock, keeping elapsed time. Returns false if inactive.
    pub fn deactivate(&mut self, now: Millis) -> bool {
        if !self.active {
            return false;
        }
        self.banked = self.elapsed(now);
        self.paused = None;
        self.active = false;
        true
    }

    /// Freezes elapsed time. Returns false if inactive or already paused.
    pub fn pause(&mut self, now: Millis) -> bool {
        if !self.active || self.paused.is_some() {
            return false;
        }
        self.paused = Some(self.elapsed(now));
        true
    }

    /// Unfreezes elapsed time. Returns false if not paused.
    pub fn resume(&mut self, now: Millis) -> bool {
        match self.paused.take() {
            Some(frozen) => {
                self.started_at = Some(now.saturating_sub(frozen));
                true
            }
            None => false,
        }
    }

    /// Restarts the duration.
    pub fn refresh(&mut self, now: Millis) {
        self.banked = 0;
        if self.paused.is_some() {
            self.paused = Some(0);
        } else if self.active {
            self.started_at = Some(now);
        }
    }

    /// Adds one stack, saturating at `max_stacks`. Returns the new count.
    pub fn add_stack(&mut self) -> u32 {
        let max = self.config.max_stacks.unwrap_or(1).max(1);
        self.state.stacks = self.state.stacks.saturating_add(1).min(max);
        self.state.stacks
    }

    pub(crate) fn mark_removed(&mut self, now: Millis) {
        self.deactivate(now);
        self.removed = true;
    }

    /// Applies this effect's modifiers for `attribute` to `value`.
    #[must_use]
    pub fn modify_attribute(&self, attribute: &str, value: f64) -> f64 {
        self.modifiers.iter().fold(value, |acc, modifier| match modifier {
            Modifier::Attribute { attribute: name, op } if name == attribute => {
                op.apply(acc, self.state.stacks)
            }
            _ => acc,
        })
    }

    /// Applies this effect's incoming damage modifiers.
    #[must_use]
    pub fn modify_incoming(&self, damage: &Damage, value: f64) -> f64 {
        self.modifiers.iter().fold(value, |acc, modifier| match modifier {
            Modifier::IncomingDamage { op, scope } if scope.covers(damage.kind()) => {
                op.apply(acc, self.state.stacks)
            }
            _ => acc,
        })
    }

    /// Applies this effect's outgoing damage modifiers.
    #[must_use]
    pub fn modify_outgoing(&self, damage: &Damage, value: f64) -> f64 {
        self.modifiers.iter().fold(value, |acc, modifier| match modifier {
            Modifier::OutgoingDamage { op, scope } if scope.covers(damage.kind()) => {
                op.apply(acc, self.state.stacks)
            }
            _ => acc,
        })
    }

    /// Reacts to a proxied character event.
    ///
    /// Only running effects react. `UpdateTick` is subject to the tick
    /// interval; a never-ticked effect always accepts its first tick. Every
    /// other event is delivered ungated.
    pub fn handle(&mut self, event: &CharacterEvent, ctx: &EffectContext<'_>) -> Vec<EffectCommand> {
        if !self.is_running() {
            return Vec::new();
        }
        if !matches!(event, CharacterEvent::UpdateTick) {
            return self.on_event(event);
        }
        if let (Some(interval), Some(last)) = (self.config.tick_interval, self.state.last_tick) {
            if ctx.now.saturating_sub(last) < interval {
                trace!(effect = %self.id, "tick gated");
                return Vec::new();
            }
        }
        self.state.ticks += 1;
        self.state.last_tick = Some(ctx.now);
        self.on_tick(ctx)
    }

    fn on_event(&mut self, event: &CharacterEvent) -> Vec<EffectCommand> {
        match (&self.behavior, event) {
            (EffectBehavior::Ward { charges }, CharacterEvent::Damaged { .. }) => {
                let charges = *charges;
                let used = self.absorbed_hits() + 1;
                self.state.data.insert(WARD_HITS.into(), used.into());
                trace!(effect = %self.id, used, charges, "ward absorbed a hit");
                if used >= u64::from(charges) {
                    vec![EffectCommand::Expire(self.id)]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    /// Hits a ward has absorbed so far.
    #[must_use]
    pub fn absorbed_hits(&self) -> u64 {
        self.state
            .data
            .get(WARD_HITS)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }

    fn on_tick(&self, ctx: &EffectContext<'_>) -> Vec<EffectCommand> {
        match &self.behavior {
            EffectBehavior::Passive | EffectBehavior::Ward { .. } => Vec::new(),
            EffectBehavior::Regen(settings) => self.regen_tick(settings, ctx),
            EffectBehavior::DamageOverTime {
                attribute,
                amount,
                damage_type,
            } => {
                let total = amount * f64::from(self.state.stacks);
                match Damage::new(total, attribute.clone()) {
                    Ok(damage) => vec![EffectCommand::Commit(
                        damage
                            .with_type(*damage_type)
                            .with_source(DamageSource::Effect(self.config.name.clone()))
                            .with_hidden(self.config.hidden),
                    )],
                    Err(err) => {
                        warn!(effect = %self.id, %err, "damage over time misconfigured");
                        Vec::new()
                    }
                }
            }
        }
    }

    fn regen_tick(&self, settings: &RegenSettings, ctx: &EffectContext<'_>) -> Vec<EffectCommand> {
        // The dead do not regenerate.
        if ctx
            .attributes
            .get("health")
            .is_some_and(|health| health.current <= 0.0)
        {
            return Vec::new();
        }
        let rate = if ctx.in_combat {
            settings.in_combat_rate
        } else {
            settings.out_of_combat_rate
        };
        let mut commands = Vec::new();
        for name in &settings.attributes {
            let Some(value) = ctx.attributes.get(name) else {
                continue;
            };
            let headroom = value.max - value.current;
            if headroom <= 0.0 {
                continue;
            }
            let amount = (value.max * rate).ceil().min(headroom);
            if amount > 0.0 {
                commands.push(EffectCommand::Restore {
                    attribute: name.clone(),
                    amount,
                    source: self.config.name.clone(),
                });
            }
        }
        if !ctx.in_combat && settings.favor_drain > 0.0 {
            if let Some(favor) = ctx.attributes.get("favor") {
                if favor.current > 0.0 {
                    commands.push(EffectCommand::Drain {
                        attribute: "favor".into(),
                        amount: settings.favor_drain.min(favor.current),
                    });
                }
            }
        }
        commands
    }
}
