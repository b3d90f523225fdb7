//! Ordered, self-pruning effect collection for one character.
//!
//! The list is the single place where attribute and damage modifiers are
//! folded. Folds run oldest effect first, skip paused, inactive and lapsed
//! effects, and clamp the result to zero.
//!
//! Lapsed effects are never removed in the middle of a fold. Shared reads
//! filter them out; [`EffectList::prune`] removes them in two passes
//! (partition, then replace) and hands them back so the owner can announce
//! the removal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error};

use ember_common::{EffectId, EntityId, SchemaVersion};

use crate::context::Millis;
use crate::damage::Damage;
use crate::effect::{
    Effect, EffectBehavior, EffectCommand, EffectConfig, EffectContext, EffectError, EffectFlag,
    EffectResult, EffectState, EffectType,
};
use crate::events::CharacterEvent;
use crate::modifier::Modifier;

/// Outcome of [`EffectList::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectAddition {
    /// Inserted as a new instance
    Added {
        /// New effect id
        id: EffectId,
        /// Whether the effect was activated on insertion
        activated: bool,
    },
    /// Merged into an existing instance as one more stack
    Stacked {
        /// Existing effect id
        id: EffectId,
        /// Stack count after merging
        stacks: u32,
    },
    /// Reset the duration of an existing instance
    Refreshed {
        /// Existing effect id
        id: EffectId,
    },
    /// Rejected by a unique effect of the same type
    Rejected {
        /// The effect that blocked the add
        existing: EffectId,
    },
}

impl EffectAddition {
    /// Returns false when the add was rejected.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Id of the effect that now carries the application.
    #[must_use]
    pub fn id(&self) -> EffectId {
        match *self {
            Self::Added { id, .. } | Self::Stacked { id, .. } | Self::Refreshed { id } => id,
            Self::Rejected { existing } => existing,
        }
    }
}

/// Plain-data form of a persisting effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRecord {
    /// Record schema version
    pub version: SchemaVersion,
    /// Configuration
    pub config: EffectConfig,
    /// State
    pub state: EffectState,
    /// Flags
    #[serde(default)]
    pub flags: BTreeSet<EffectFlag>,
    /// Modifiers
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    /// Behaviour
    #[serde(default)]
    pub behavior: EffectBehavior,
    /// Elapsed time when saved
    pub elapsed: Millis,
    /// Whether the effect was active
    pub active: bool,
    /// Whether the effect was paused
    #[serde(default)]
    pub paused: bool,
}

/// Effects attached to one character, oldest first.
#[derive(Debug, Clone)]
pub struct EffectList {
    owner: EntityId,
    effects: Vec<Effect>,
}

impl EffectList {
    /// Creates an empty list for `owner`.
    #[must_use]
    pub fn new(owner: EntityId) -> Self {
        Self {
            owner,
            effects: Vec::new(),
        }
    }

    /// Owning character.
    #[must_use]
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Adds an effect, resolving conflicts with an effect of the same type.
    ///
    /// Against an existing effect of the same type, in order: add a stack if
    /// it has room, refresh it if it refreshes, reject if it is unique or a
    /// full stacking effect. Otherwise the new effect is inserted and, if
    /// configured to, activated.
    pub fn add(&mut self, mut effect: Effect, now: Millis) -> EffectResult<EffectAddition> {
        if effect.is_removed() {
            return Err(EffectError::Terminated(effect.id()));
        }
        match effect.target() {
            Some(target) if target != self.owner => {
                return Err(EffectError::ForeignTarget {
                    expected: self.owner,
                    actual: target,
                });
            }
            _ => effect.set_target(self.owner),
        }

        if let Some(existing) = self
            .effects
            .iter_mut()
            .find(|e| e.is_current(now) && e.effect_type() == effect.effect_type())
        {
            let id = existing.id();
            let (max_stacks, refreshes, unique) = {
                let config = existing.config();
                (config.max_stacks, config.refreshes, config.unique)
            };
            if let Some(max) = max_stacks {
                if existing.stacks() < max {
                    let stacks = existing.add_stack();
                    return Ok(EffectAddition::Stacked { id, stacks });
                }
            }
            if refreshes {
                existing.refresh(now);
                return Ok(EffectAddition::Refreshed { id });
            }
            if unique || max_stacks.is_some() {
                debug!(owner = %self.owner, effect_type = %effect.effect_type(), "unique effect rejected");
                return Ok(EffectAddition::Rejected { existing: id });
            }
        }

        let id = effect.id();
        let activated = effect.config().auto_activate && effect.activate(now);
        self.effects.push(effect);
        Ok(EffectAddition::Added { id, activated })
    }

    /// Deactivates and detaches an effect.
    ///
    /// Removing an effect that is not in the list is a caller bug and is
    /// reported as [`EffectError::NotFound`].
    pub fn remove(&mut self, id: EffectId, now: Millis) -> EffectResult<Effect> {
        let Some(index) = self.effects.iter().position(|e| e.id() == id) else {
            error!(owner = %self.owner, effect = %id, "removing effect that is not in the list");
            return Err(EffectError::NotFound(id));
        };
        let mut effect = self.effects.remove(index);
        effect.mark_removed(now);
        Ok(effect)
    }

    /// Removes every effect of a type.
    pub fn remove_by_type(&mut self, effect_type: &EffectType, now: Millis) -> Vec<Effect> {
        self.extract(now, |e| e.effect_type() == effect_type)
    }

    /// Removes lapsed effects and returns them.
    pub fn prune(&mut self, now: Millis) -> Vec<Effect> {
        self.extract(now, |e| !e.is_current(now))
    }

    /// Removes every effect.
    pub fn clear(&mut self, now: Millis) -> Vec<Effect> {
        self.extract(now, |_| true)
    }

    fn extract(&mut self, now: Millis, mut predicate: impl FnMut(&Effect) -> bool) -> Vec<Effect> {
        let (mut removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.effects).into_iter().partition(|e| predicate(e));
        self.effects = kept;
        for effect in &mut removed {
            effect.mark_removed(now);
        }
        removed
    }

    /// Number of current effects.
    #[must_use]
    pub fn len(&self, now: Millis) -> usize {
        self.iter(now).count()
    }

    /// Returns true if no effect is current.
    #[must_use]
    pub fn is_empty(&self, now: Millis) -> bool {
        self.iter(now).next().is_none()
    }

    /// Current effects, oldest first.
    pub fn iter(&self, now: Millis) -> impl Iterator<Item = &Effect> {
        self.effects.iter().filter(move |e| e.is_current(now))
    }

    /// Looks up an effect by id.
    #[must_use]
    pub fn get(&self, id: EffectId) -> Option<&Effect> {
        self.effects.iter().find(|e| e.id() == id)
    }

    /// Looks up an effect by id for mutation.
    pub fn get_mut(&mut self, id: EffectId) -> Option<&mut Effect> {
        self.effects.iter_mut().find(|e| e.id() == id)
    }

    /// Returns true if a current effect has this type.
    #[must_use]
    pub fn has_type(&self, effect_type: &EffectType, now: Millis) -> bool {
        self.get_by_type(effect_type, now).is_some()
    }

    /// Oldest current effect of a type.
    #[must_use]
    pub fn get_by_type(&self, effect_type: &EffectType, now: Millis) -> Option<&Effect> {
        self.iter(now).find(|e| e.effect_type() == effect_type)
    }

    fn running(&self, now: Millis) -> impl Iterator<Item = &Effect> {
        self.iter(now).filter(|e| e.is_running())
    }

    /// Folds `base` through every running effect's modifiers for `attribute`.
    #[must_use]
    pub fn evaluate_attribute(&self, attribute: &str, base: f64, now: Millis) -> f64 {
        self.running(now)
            .fold(base, |value, effect| effect.modify_attribute(attribute, value))
            .max(0.0)
    }

    /// Folds a damage amount through incoming damage modifiers.
    #[must_use]
    pub fn evaluate_incoming_damage(&self, damage: &Damage, amount: f64, now: Millis) -> f64 {
        self.running(now)
            .fold(amount, |value, effect| effect.modify_incoming(damage, value))
            .max(0.0)
    }

    /// Folds a damage amount through outgoing damage modifiers.
    #[must_use]
    pub fn evaluate_outgoing_damage(&self, damage: &Damage, amount: f64, now: Millis) -> f64 {
        self.running(now)
            .fold(amount, |value, effect| effect.modify_outgoing(damage, value))
            .max(0.0)
    }

    /// Delivers a proxied event to every current effect and collects the
    /// commands they return.
    pub fn dispatch(&mut self, event: &CharacterEvent, ctx: &EffectContext<'_>) -> Vec<EffectCommand> {
        if !event.is_proxied() {
            return Vec::new();
        }
        let now = ctx.now;
        self.effects
            .iter_mut()
            .filter(|e| e.is_current(now))
            .flat_map(|e| e.handle(event, ctx))
            .collect()
    }

    /// Pauses every running effect. Returns how many were paused.
    pub fn pause_all(&mut self, now: Millis) -> usize {
        self.effects
            .iter_mut()
            .map(|e| e.pause(now))
            .filter(|changed| *changed)
            .count()
    }

    /// Resumes every paused effect. Returns how many were resumed.
    pub fn resume_all(&mut self, now: Millis) -> usize {
        self.effects
            .iter_mut()
            .map(|e| e.resume(now))
            .filter(|changed| *changed)
            .count()
    }

    /// Plain-data records of current effects that persist.
    #[must_use]
    pub fn serialize(&self, now: Millis) -> Vec<EffectRecord> {
        self.iter(now)
            .filter(|e| e.config().persists)
            .map(|e| EffectRecord {
                version: SchemaVersion::EFFECT_RECORD,
                config: e.config().clone(),
                state: e.state().clone(),
                flags: e.flags().clone(),
                modifiers: e.modifiers().to_vec(),
                behavior: e.behavior().clone(),
                elapsed: e.elapsed(now),
                active: e.is_active(),
                paused: e.is_paused(),
            })
            .collect()
    }

    /// Rebuilds effects from records through the normal add path.
    pub fn hydrate(
        &mut self,
        records: impl IntoIterator<Item = EffectRecord>,
        now: Millis,
    ) -> EffectResult<Vec<EffectAddition>> {
        let mut additions = Vec::new();
        for record in records {
            if !SchemaVersion::EFFECT_RECORD.can_read(&record.version) {
                return Err(EffectError::IncompatibleRecord {
                    found: record.version,
                    supported: SchemaVersion::EFFECT_RECORD,
                });
            }
            let mut effect = Effect::new(record.config)
                .with_state(record.state)
                .with_behavior(record.behavior)
                .with_elapsed(record.elapsed);
            for flag in record.flags {
                effect = effect.with_flag(flag);
            }
            for modifier in record.modifiers {
                effect = effect.with_modifier(modifier);
            }

            let addition = self.add(effect, now)?;
            if let EffectAddition::Added { id, activated } = addition {
                if let Some(effect) = self.get_mut(id) {
                    match (record.active, activated) {
                        (true, false) => {
                            effect.activate(now);
                        }
                        (false, true) => {
                            effect.deactivate(now);
                        }
                        _ => {}
                    }
                    if record.paused {
                        effect.pause(now);
                    }
                }
            }
            additions.push(addition);
        }
        Ok(additions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Lifetime;
    use crate::modifier::ModifierOp;
    use proptest::prelude::*;

    fn list() -> EffectList {
        EffectList::new(EntityId::from_raw(7))
    }

    fn typed(name: &str) -> EffectConfig {
        EffectConfig {
            effect_type: EffectType::named(name),
            ..EffectConfig::default()
        }
    }

    #[test]
    fn test_unique_rejects_and_leaves_original_untouched() {
        let mut effects = list();
        let first = effects
            .add(Effect::new(typed("shield")), 100)
            .expect("add")
            .id();
        let before = effects.get(first).cloned().expect("present");

        let second = effects.add(Effect::new(typed("shield")), 900).expect("add");
        assert_eq!(second, EffectAddition::Rejected { existing: first });
        assert!(!second.is_applied());
        assert_eq!(effects.len(900), 1);
        let after = effects.get(first).expect("present");
        assert_eq!(after.state(), before.state());
        assert_eq!(after.started_at(), Some(100));
    }

    #[test]
    fn test_non_unique_effects_coexist() {
        let mut effects = list();
        let config = EffectConfig {
            unique: false,
            ..typed("blessing")
        };
        effects.add(Effect::new(config.clone()), 0).expect("add");
        effects.add(Effect::new(config), 0).expect("add");
        assert_eq!(effects.len(0), 2);
    }

    #[test]
    fn test_stacking_then_rejecting() {
        let mut effects = list();
        let config = EffectConfig {
            max_stacks: Some(3),
            ..typed("rage")
        };
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(effects.add(Effect::new(config.clone()), 0).expect("add"));
        }
        assert!(matches!(outcomes[1], EffectAddition::Stacked { stacks: 2, .. }));
        assert!(matches!(outcomes[2], EffectAddition::Stacked { stacks: 3, .. }));
        assert!(matches!(outcomes[3], EffectAddition::Rejected { .. }));
        assert_eq!(effects.len(0), 1);
        assert_eq!(effects.iter(0).next().expect("one").stacks(), 3);
    }

    #[test]
    fn test_refresh_resets_duration() {
        let mut effects = list();
        let config = EffectConfig {
            refreshes: true,
            duration: Lifetime::Timed(1_000),
            ..typed("haste")
        };
        let id = effects.add(Effect::new(config.clone()), 0).expect("add").id();
        let again = effects.add(Effect::new(config), 800).expect("add");
        assert_eq!(again, EffectAddition::Refreshed { id });
        assert_eq!(effects.get(id).expect("present").remaining(800), Some(1_000));
    }

    #[test]
    fn test_lapsed_effects_are_invisible_then_pruned() {
        let mut effects = list();
        let config = EffectConfig {
            duration: Lifetime::Timed(500),
            ..typed("flash")
        };
        let id = effects.add(Effect::new(config), 0).expect("add").id();
        assert_eq!(effects.len(499), 1);
        assert_eq!(effects.len(500), 0);
        assert!(!effects.has_type(&EffectType::named("flash"), 500));

        let pruned = effects.prune(500);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].id(), id);
        assert!(pruned[0].is_removed());
        assert!(effects.get(id).is_none());
    }

    #[test]
    fn test_remove_unknown_is_error() {
        let mut effects = list();
        let stray = EffectId::new();
        assert!(matches!(
            effects.remove(stray, 0),
            Err(EffectError::NotFound(id)) if id == stray
        ));
    }

    #[test]
    fn test_removed_effect_can_not_be_reinserted() {
        let mut effects = list();
        let id = effects.add(Effect::new(typed("ward")), 0).expect("add").id();
        let removed = effects.remove(id, 10).expect("remove");
        assert!(!removed.is_active());
        assert!(matches!(
            effects.add(removed, 20),
            Err(EffectError::Terminated(_))
        ));
    }

    #[test]
    fn test_foreign_target_rejected() {
        let mut effects = list();
        let effect = Effect::new(typed("curse")).with_target(EntityId::from_raw(99));
        assert!(matches!(
            effects.add(effect, 0),
            Err(EffectError::ForeignTarget { .. })
        ));
    }

    #[test]
    fn test_evaluation_order_and_pause() {
        let mut effects = list();
        let add = effects
            .add(
                Effect::new(typed("a")).with_modifier(Modifier::attribute("brawn", ModifierOp::Add(5.0))),
                0,
            )
            .expect("add")
            .id();
        effects
            .add(
                Effect::new(typed("b"))
                    .with_modifier(Modifier::attribute("brawn", ModifierOp::Multiply(2.0))),
                0,
            )
            .expect("add");
        // (10 + 5) * 2, oldest first
        assert_eq!(effects.evaluate_attribute("brawn", 10.0, 0), 30.0);

        effects.get_mut(add).expect("present").pause(0);
        assert_eq!(effects.evaluate_attribute("brawn", 10.0, 0), 20.0);
        assert_eq!(effects.resume_all(0), 1);
        assert_eq!(effects.evaluate_attribute("brawn", 10.0, 0), 30.0);
    }

    #[test]
    fn test_serialize_and_hydrate_persisting_effects() {
        let mut effects = list();
        let timed = EffectConfig {
            duration: Lifetime::Timed(10_000),
            ..typed("blessing")
        };
        effects
            .add(
                Effect::new(timed)
                    .with_flag(EffectFlag::Buff)
                    .with_modifier(Modifier::attribute("luck", ModifierOp::Add(3.0))),
                0,
            )
            .expect("add");
        effects
            .add(
                Effect::new(EffectConfig {
                    persists: false,
                    ..typed("transient")
                }),
                0,
            )
            .expect("add");

        let records = effects.serialize(4_000);
        assert_eq!(records.len(), 1);
        let json = serde_json::to_string(&records).expect("serialize");
        let records: Vec<EffectRecord> = serde_json::from_str(&json).expect("deserialize");

        let mut restored = EffectList::new(EntityId::from_raw(8));
        let additions = restored.hydrate(records, 50_000).expect("hydrate");
        assert_eq!(additions.len(), 1);
        let effect = restored.get(additions[0].id()).expect("present");
        assert_eq!(effect.remaining(50_000), Some(6_000));
        assert!(effect.has_flag(EffectFlag::Buff));
        assert_eq!(restored.evaluate_attribute("luck", 1.0, 50_000), 4.0);
    }

    #[test]
    fn test_hydrate_rejects_newer_major_version() {
        let mut effects = list();
        let record = EffectRecord {
            version: SchemaVersion::new(2, 0, 0),
            config: EffectConfig::default(),
            state: EffectState::default(),
            flags: BTreeSet::new(),
            modifiers: Vec::new(),
            behavior: EffectBehavior::Passive,
            elapsed: 0,
            active: true,
            paused: false,
        };
        assert!(matches!(
            effects.hydrate([record], 0),
            Err(EffectError::IncompatibleRecord { .. })
        ));
    }

    #[test]
    fn test_pause_all_freezes_running_effects() {
        let mut effects = list();
        let config = EffectConfig {
            duration: Lifetime::Timed(1_000),
            ..typed("haste")
        };
        let haste = effects.add(Effect::new(config), 0).expect("add").id();
        let idle = effects
            .add(
                Effect::new(EffectConfig {
                    auto_activate: false,
                    ..typed("idle")
                }),
                0,
            )
            .expect("add")
            .id();

        assert_eq!(effects.pause_all(400), 1);
        assert_eq!(effects.pause_all(500), 0);
        assert!(effects.get(haste).expect("present").is_paused());
        assert!(!effects.get(idle).expect("present").is_paused());
        assert_eq!(effects.get(haste).expect("present").remaining(9_000), Some(600));

        assert_eq!(effects.resume_all(9_000), 1);
        assert_eq!(effects.get(haste).expect("present").remaining(9_200), Some(400));
    }

    #[test]
    fn test_manually_activated_effect_survives_round_trip() {
        let mut effects = list();
        let id = effects
            .add(
                Effect::new(EffectConfig {
                    auto_activate: false,
                    ..typed("ward")
                })
                .with_modifier(Modifier::attribute("armor", ModifierOp::Add(10.0))),
                0,
            )
            .expect("add")
            .id();
        assert_eq!(effects.evaluate_attribute("armor", 5.0, 0), 5.0);
        assert!(effects.get_mut(id).expect("present").activate(0));
        assert_eq!(effects.evaluate_attribute("armor", 5.0, 0), 15.0);

        let mut restored = EffectList::new(EntityId::from_raw(8));
        let additions = restored.hydrate(effects.serialize(100), 100).expect("hydrate");
        let effect = restored.get(additions[0].id()).expect("present");
        assert!(effect.is_active());
        assert_eq!(restored.evaluate_attribute("armor", 5.0, 100), 15.0);
    }

    #[test]
    fn test_paused_and_inactive_states_survive_round_trip() {
        let mut effects = list();
        let timed = EffectConfig {
            duration: Lifetime::Timed(2_000),
            ..typed("frozen")
        };
        let frozen = effects
            .add(
                Effect::new(timed).with_modifier(Modifier::attribute("brawn", ModifierOp::Add(4.0))),
                0,
            )
            .expect("add")
            .id();
        effects.get_mut(frozen).expect("present").pause(500);
        effects
            .add(
                Effect::new(EffectConfig {
                    auto_activate: false,
                    ..typed("dormant")
                }),
                0,
            )
            .expect("add");

        let records = effects.serialize(1_000);
        assert!(records[0].paused);
        assert!(!records[1].active);

        let mut restored = EffectList::new(EntityId::from_raw(8));
        let additions = restored.hydrate(records, 20_000).expect("hydrate");
        let frozen = restored.get(additions[0].id()).expect("present");
        assert!(frozen.is_active());
        assert!(frozen.is_paused());
        assert_eq!(frozen.remaining(30_000), Some(1_500));
        assert_eq!(restored.evaluate_attribute("brawn", 10.0, 20_000), 10.0);
        assert!(!restored.get(additions[1].id()).expect("present").is_active());

        assert_eq!(restored.resume_all(20_000), 1);
        assert_eq!(restored.evaluate_attribute("brawn", 10.0, 20_000), 14.0);
    }

    proptest! {
        #[test]
        fn prop_attribute_never_negative(
            base in 0.0f64..500.0,
            adds in proptest::collection::vec(-1_000.0f64..1_000.0, 0..8),
            factors in proptest::collection::vec(-3.0f64..3.0, 0..4),
        ) {
            let mut effects = list();
            for (i, add) in adds.iter().enumerate() {
                let effect = Effect::new(typed(&format!("add{i}")))
                    .with_modifier(Modifier::attribute("health", ModifierOp::Add(*add)));
                effects.add(effect, 0).expect("add");
            }
            for (i, factor) in factors.iter().enumerate() {
                let effect = Effect::new(typed(&format!("mul{i}")))
                    .with_modifier(Modifier::attribute("health", ModifierOp::Multiply(*factor)));
                effects.add(effect, 0).expect("add");
            }
            prop_assert!(effects.evaluate_attribute("health", base, 0) >= 0.0);
        }

        #[test]
        fn prop_stacks_never_exceed_max(max in 1u32..6, adds in 1usize..12) {
            let mut effects = list();
            let config = EffectConfig { max_stacks: Some(max), ..typed("stack") };
            for _ in 0..adds {
                effects.add(Effect::new(config.clone()), 0).expect("add");
            }
            let stacks = effects.iter(0).next().expect("one").stacks();
            prop_assert!(stacks <= max);
            prop_assert_eq!(effects.len(0), 1);
        }
    }
}
