//! Character facade: attributes, skills, effects, equipment and combat state.
//!
//! Current and max attribute values are always derived:
//!
//! ```text
//! max     = effects.evaluate_attribute(name, base)
//! current = max(0, max + delta)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use ember_common::{EffectId, EntityId};

use crate::attribute::{Attribute, AttributeError, AttributeMap, AttributeResult};
use crate::context::{Millis, SimContext};
use crate::damage::{Damage, DamageResult, DamageSource};
use crate::effect::{
    AttributeSnapshot, Effect, EffectCommand, EffectContext, EffectError, EffectResult,
    EffectType,
};
use crate::effect_list::{EffectAddition, EffectList};
use crate::equipment::{Equipment, WeaponCategory};
use crate::events::{CharacterEvent, EventHandler, EventPublisher, GameEvent, Listeners};
use crate::factory::EffectFactory;
use crate::relationship::{RelationSet, Related};

/// Player or world-controlled character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterKind {
    /// Controlled by a connection
    #[default]
    Player,
    /// Controlled by the world
    Npc,
}

/// Transient per-fight bookkeeping, reset whenever combat starts or ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatData {
    /// Milliseconds to wait before the next round
    pub lag: Millis,
    /// When the current lag budget was last sampled
    pub round_started: Millis,
    /// Who landed the killing blow
    pub killed_by: Option<EntityId>,
    /// Free-form data for outer layers
    pub meta: BTreeMap<String, serde_json::Value>,
    /// Pending combat narration
    pub buffer: Vec<String>,
}

impl CombatData {
    /// Fresh data for a fight starting at `now`.
    #[must_use]
    pub fn started(now: Millis) -> Self {
        Self {
            round_started: now,
            ..Self::default()
        }
    }
}

/// A cost paid from a resource attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCost {
    /// Resource attribute
    pub attribute: String,
    /// Amount required
    pub amount: f64,
}

impl ResourceCost {
    /// Creates a cost.
    pub fn new(attribute: impl Into<String>, amount: f64) -> Self {
        Self {
            attribute: attribute.into(),
            amount,
        }
    }
}

/// A player or NPC as seen by the simulation core.
#[derive(Debug)]
pub struct Character {
    id: EntityId,
    name: String,
    kind: CharacterKind,
    attributes: AttributeMap,
    skills: AttributeMap,
    effects: EffectList,
    equipment: Equipment,
    combatants: RelationSet,
    combat_data: CombatData,
    combat_prompt: Option<String>,
    pacifist: bool,
    death_handled: bool,
    listeners: Listeners,
    bus: Option<EventPublisher>,
}

impl Character {
    /// Creates a character with no attributes.
    pub fn new(name: impl Into<String>, kind: CharacterKind) -> Self {
        let id = EntityId::new();
        Self {
            id,
            name: name.into(),
            kind,
            attributes: AttributeMap::new(),
            skills: AttributeMap::new(),
            effects: EffectList::new(id),
            equipment: Equipment::new(),
            combatants: RelationSet::default(),
            combat_data: CombatData::default(),
            combat_prompt: None,
            pacifist: false,
            death_handled: false,
            listeners: Listeners::default(),
            bus: None,
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, base: f64) -> AttributeResult<Self> {
        self.attributes.insert(Attribute::new(name, base)?);
        Ok(self)
    }

    /// Adds a skill.
    pub fn with_skill(mut self, name: impl Into<String>, base: f64) -> AttributeResult<Self> {
        self.skills.insert(Attribute::new(name, base)?);
        Ok(self)
    }

    /// Sets the equipment.
    #[must_use]
    pub fn with_equipment(mut self, equipment: Equipment) -> Self {
        self.equipment = equipment;
        self
    }

    /// Id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Player or NPC.
    #[must_use]
    pub fn kind(&self) -> CharacterKind {
        self.kind
    }

    /// Returns true for world-controlled characters.
    #[must_use]
    pub fn is_npc(&self) -> bool {
        self.kind == CharacterKind::Npc
    }

    /// Whether this character refuses to be attacked.
    #[must_use]
    pub fn is_pacifist(&self) -> bool {
        self.pacifist
    }

    /// Marks the character as refusing combat.
    pub fn set_pacifist(&mut self, pacifist: bool) {
        self.pacifist = pacifist;
    }

    // ---- attributes ----

    /// Raw attributes.
    #[must_use]
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Adds or replaces an attribute.
    pub fn insert_attribute(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute);
    }

    /// Returns true if the attribute exists.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// Current value: `max(0, max + delta)`.
    pub fn attribute(&self, name: &str, now: Millis) -> AttributeResult<f64> {
        let attribute = self.attributes.require(name)?;
        Ok(self.current_of(attribute, now))
    }

    /// Max value: base folded through the effect list.
    pub fn max_attribute(&self, name: &str, now: Millis) -> AttributeResult<f64> {
        let attribute = self.attributes.require(name)?;
        Ok(self.effects.evaluate_attribute(name, attribute.base(), now))
    }

    /// Unmodified base.
    pub fn attribute_base(&self, name: &str) -> AttributeResult<f64> {
        Ok(self.attributes.require(name)?.base())
    }

    /// Current value, or 0 when the attribute does not exist.
    #[must_use]
    pub fn attribute_or_zero(&self, name: &str, now: Millis) -> f64 {
        self.attributes
            .get(name)
            .map_or(0.0, |attribute| self.current_of(attribute, now))
    }

    fn current_of(&self, attribute: &Attribute, now: Millis) -> f64 {
        let max = self
            .effects
            .evaluate_attribute(attribute.name(), attribute.base(), now);
        (max + attribute.delta()).max(0.0)
    }

    /// Raises the delta of an attribute.
    pub fn raise_attribute(&mut self, name: &str, amount: f64) -> AttributeResult<()> {
        self.attributes.require_mut(name)?.raise(amount)
    }

    /// Lowers the delta of an attribute.
    pub fn lower_attribute(&mut self, name: &str, amount: f64) -> AttributeResult<()> {
        self.attributes.require_mut(name)?.lower(amount)
    }

    /// Permanently changes the base of an attribute.
    pub fn set_attribute_base(&mut self, name: &str, amount: f64) -> AttributeResult<()> {
        self.attributes.require_mut(name)?.set_base(amount)
    }

    /// Overwrites the delta of an attribute.
    pub fn set_attribute_delta(&mut self, name: &str, amount: f64) -> AttributeResult<()> {
        self.attributes.require_mut(name)?.set_delta(amount)
    }

    /// Current and max of every attribute.
    #[must_use]
    pub fn snapshot(&self, now: Millis) -> AttributeSnapshot {
        let mut snapshot = AttributeSnapshot::default();
        for attribute in self.attributes.iter() {
            let max = self
                .effects
                .evaluate_attribute(attribute.name(), attribute.base(), now);
            snapshot.insert(attribute.name(), (max + attribute.delta()).max(0.0), max);
        }
        snapshot
    }

    /// Returns true if every cost can be paid from current values.
    #[must_use]
    pub fn has_enough_resources(&self, costs: &[ResourceCost], now: Millis) -> bool {
        costs.iter().all(|cost| {
            self.has_attribute(&cost.attribute)
                && self.attribute_or_zero(&cost.attribute, now) >= cost.amount
        })
    }

    /// Pays every cost, or nothing if any cannot be paid.
    pub fn spend_resources(&mut self, costs: &[ResourceCost], now: Millis) -> AttributeResult<()> {
        for cost in costs {
            let available = self.attribute(&cost.attribute, now)?;
            if available < cost.amount {
                return Err(AttributeError::Insufficient {
                    name: cost.attribute.clone(),
                    required: cost.amount,
                    available,
                });
            }
        }
        for cost in costs {
            self.lower_attribute(&cost.attribute, cost.amount)?;
        }
        Ok(())
    }

    // ---- skills ----

    /// Raw skills.
    #[must_use]
    pub fn skills(&self) -> &AttributeMap {
        &self.skills
    }

    /// Returns true if the skill exists.
    #[must_use]
    pub fn has_skill(&self, name: &str) -> bool {
        self.skills.contains(name)
    }

    /// Effective skill value, modified by effects like an attribute.
    pub fn skill(&self, name: &str, now: Millis) -> AttributeResult<f64> {
        let skill = self.skills.require(name)?;
        Ok(self.current_of(skill, now))
    }

    /// Effective skill value, or 0 when the skill does not exist.
    #[must_use]
    pub fn skill_or_zero(&self, name: &str, now: Millis) -> f64 {
        self.skills
            .get(name)
            .map_or(0.0, |skill| self.current_of(skill, now))
    }

    /// Permanently changes a skill.
    pub fn set_skill_base(&mut self, name: &str, value: f64) -> AttributeResult<()> {
        self.skills.require_mut(name)?.set_base(value)
    }

    // ---- equipment ----

    /// Equipment.
    #[must_use]
    pub fn equipment(&self) -> &Equipment {
        &self.equipment
    }

    /// Mutable equipment.
    pub fn equipment_mut(&mut self) -> &mut Equipment {
        &mut self.equipment
    }

    /// Category of the wielded weapon.
    #[must_use]
    pub fn weapon_category(&self) -> WeaponCategory {
        self.equipment.weapon_category()
    }

    /// Returns true if a weapon is wielded.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.weapon_category() != WeaponCategory::Unarmed
    }

    /// Returns true if a shield is equipped.
    #[must_use]
    pub fn has_shield(&self) -> bool {
        self.equipment.has_shield()
    }

    // ---- effects ----

    /// Effect list.
    #[must_use]
    pub fn effects(&self) -> &EffectList {
        &self.effects
    }

    /// Mutable effect list. Adds and removals made here are not announced.
    pub fn effects_mut(&mut self) -> &mut EffectList {
        &mut self.effects
    }

    /// Returns true if a current effect has this type.
    #[must_use]
    pub fn has_effect_type(&self, effect_type: &EffectType, now: Millis) -> bool {
        self.effects.has_type(effect_type, now)
    }

    /// Adds an effect and announces the outcome.
    pub fn add_effect(
        &mut self,
        effect: Effect,
        ctx: &mut SimContext<'_>,
    ) -> EffectResult<EffectAddition> {
        self.prune_effects(ctx);
        let name = effect.name().to_owned();
        let addition = self.effects.add(effect, ctx.now)?;
        match addition {
            EffectAddition::Added { id, activated } => {
                debug!(entity = %self.id, effect = %id, %name, "effect added");
                self.emit(CharacterEvent::EffectAdded { effect: id, name }, ctx);
                if activated {
                    self.emit(CharacterEvent::EffectActivated { effect: id }, ctx);
                }
            }
            EffectAddition::Stacked { id, stacks } => {
                debug!(entity = %self.id, effect = %id, stacks, "effect stacked");
                self.emit(CharacterEvent::EffectStackAdded { effect: id, stacks }, ctx);
            }
            EffectAddition::Refreshed { id } => {
                self.emit(CharacterEvent::EffectRefreshed { effect: id }, ctx);
            }
            EffectAddition::Rejected { .. } => {}
        }
        Ok(addition)
    }

    /// Removes an effect and announces it.
    pub fn remove_effect(&mut self, id: EffectId, ctx: &mut SimContext<'_>) -> EffectResult<Effect> {
        let effect = self.effects.remove(id, ctx.now)?;
        self.announce_removed(&effect, ctx);
        Ok(effect)
    }

    /// Removes every effect of a type. Returns how many were removed.
    pub fn remove_effects_by_type(
        &mut self,
        effect_type: &EffectType,
        ctx: &mut SimContext<'_>,
    ) -> usize {
        let removed = self.effects.remove_by_type(effect_type, ctx.now);
        for effect in &removed {
            self.announce_removed(effect, ctx);
        }
        removed.len()
    }

    /// Starts an inactive effect and announces it. Returns false if it was
    /// already active.
    pub fn activate_effect(&mut self, id: EffectId, ctx: &mut SimContext<'_>) -> EffectResult<bool> {
        let effect = self.effects.get_mut(id).ok_or(EffectError::NotFound(id))?;
        let activated = effect.activate(ctx.now);
        if activated {
            self.emit(CharacterEvent::EffectActivated { effect: id }, ctx);
        }
        Ok(activated)
    }

    /// Stops an active effect, keeping its elapsed time, and announces it.
    /// Returns false if it was not active.
    pub fn deactivate_effect(&mut self, id: EffectId, ctx: &mut SimContext<'_>) -> EffectResult<bool> {
        let effect = self.effects.get_mut(id).ok_or(EffectError::NotFound(id))?;
        let deactivated = effect.deactivate(ctx.now);
        if deactivated {
            self.emit(CharacterEvent::EffectDeactivated { effect: id }, ctx);
        }
        Ok(deactivated)
    }

    /// Freezes every running effect. Returns how many were paused.
    pub fn pause_effects(&mut self, now: Millis) -> usize {
        self.effects.pause_all(now)
    }

    /// Unfreezes every paused effect. Returns how many were resumed.
    pub fn resume_effects(&mut self, now: Millis) -> usize {
        self.effects.resume_all(now)
    }

    /// Drops lapsed effects and announces them.
    pub fn prune_effects(&mut self, ctx: &mut SimContext<'_>) {
        for effect in self.effects.prune(ctx.now) {
            self.announce_removed(&effect, ctx);
        }
    }

    fn announce_removed(&mut self, effect: &Effect, ctx: &mut SimContext<'_>) {
        debug!(entity = %self.id, effect = %effect.id(), name = effect.name(), "effect removed");
        self.emit(
            CharacterEvent::EffectRemoved {
                effect: effect.id(),
                name: effect.name().to_owned(),
            },
            ctx,
        );
    }

    /// Returns true while a cooldown for `skill` is running.
    #[must_use]
    pub fn is_on_cooldown(&self, skill: &str, now: Millis) -> bool {
        self.effects
            .has_type(&EffectType::Cooldown(skill.to_owned()), now)
    }

    /// Starts a cooldown for `skill`.
    pub fn start_cooldown(
        &mut self,
        skill: &str,
        duration: Millis,
        factory: &EffectFactory,
        ctx: &mut SimContext<'_>,
    ) -> EffectResult<EffectAddition> {
        let effect = factory.cooldown(skill, duration)?;
        self.add_effect(effect, ctx)
    }

    // ---- events ----

    /// Registers a character-level listener.
    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        self.listeners.subscribe(handler);
    }

    pub(crate) fn attach_bus(&mut self, publisher: EventPublisher) {
        self.bus = Some(publisher);
    }

    /// Delivers an event: listeners first, then the bus, then effects.
    ///
    /// Commands returned by effects are applied after every effect has seen
    /// the event.
    pub fn emit(&mut self, event: CharacterEvent, ctx: &mut SimContext<'_>) {
        let message = GameEvent {
            entity: self.id,
            event,
        };
        self.listeners.notify(&message);
        if let Some(bus) = &self.bus {
            bus.publish(message.clone());
        }
        if !message.event.is_proxied() || self.effects.is_empty(ctx.now) {
            return;
        }

        let snapshot = self.snapshot(ctx.now);
        let effect_ctx = EffectContext {
            now: ctx.now,
            owner: self.id,
            in_combat: self.is_in_combat(),
            attributes: &snapshot,
        };
        let commands = self.effects.dispatch(&message.event, &effect_ctx);
        for command in commands {
            if let Err(err) = self.apply_command(command, ctx) {
                warn!(entity = %self.id, %err, "effect command failed");
            }
        }
    }

    fn apply_command(&mut self, command: EffectCommand, ctx: &mut SimContext<'_>) -> DamageResult<()> {
        match command {
            EffectCommand::Commit(mut damage) => damage.commit(self, None, ctx).map(|_| ()),
            EffectCommand::Restore {
                attribute,
                amount,
                source,
            } => {
                // Corpses are not restored.
                if self.has_attribute("health") && self.attribute_or_zero("health", ctx.now) <= 0.0 {
                    return Ok(());
                }
                let mut heal = Damage::heal(amount, attribute.as_str())?
                    .with_source(DamageSource::Effect(source))
                    .with_hidden(true);
                let healed = heal.evaluate(self, None, ctx);
                let headroom = self.max_attribute(&attribute, ctx.now)?
                    - self.attribute(&attribute, ctx.now)?;
                let capped = healed.min(headroom.max(0.0).floor() as u32);
                if capped == 0 {
                    return Ok(());
                }
                heal.apply(self, None, capped, ctx)
            }
            EffectCommand::Drain { attribute, amount } => {
                Ok(self.lower_attribute(&attribute, amount)?)
            }
            EffectCommand::Expire(id) => {
                if let Err(err) = self.remove_effect(id, ctx) {
                    warn!(entity = %self.id, %err, "expiring effect failed");
                }
                Ok(())
            }
        }
    }

    /// Advances one simulation tick: prunes lapsed effects, then delivers
    /// `UpdateTick`.
    pub fn update_tick(&mut self, ctx: &mut SimContext<'_>) {
        self.prune_effects(ctx);
        self.emit(CharacterEvent::UpdateTick, ctx);
    }

    // ---- combat ----

    /// Current combatants in the order they were engaged.
    #[must_use]
    pub fn combatants(&self) -> &RelationSet {
        &self.combatants
    }

    /// Returns true if fighting anyone.
    #[must_use]
    pub fn is_in_combat(&self) -> bool {
        !self.combatants.is_empty()
    }

    /// Returns true if fighting `other`.
    #[must_use]
    pub fn is_in_combat_with(&self, other: EntityId) -> bool {
        self.combatants.contains(other)
    }

    pub(crate) fn combatants_mut(&mut self) -> &mut RelationSet {
        &mut self.combatants
    }

    /// Per-fight bookkeeping.
    #[must_use]
    pub fn combat_data(&self) -> &CombatData {
        &self.combat_data
    }

    /// Mutable per-fight bookkeeping.
    pub fn combat_data_mut(&mut self) -> &mut CombatData {
        &mut self.combat_data
    }

    /// Combat-only prompt shown while fighting.
    #[must_use]
    pub fn combat_prompt(&self) -> Option<&str> {
        self.combat_prompt.as_deref()
    }

    /// Sets the combat-only prompt.
    pub fn set_combat_prompt(&mut self, prompt: impl Into<String>) {
        self.combat_prompt = Some(prompt.into());
    }

    /// Clears combat-only UI state.
    pub fn clear_combat_prompt(&mut self) {
        self.combat_prompt = None;
    }

    pub(crate) fn is_death_handled(&self) -> bool {
        self.death_handled
    }

    pub(crate) fn set_death_handled(&mut self, handled: bool) {
        self.death_handled = handled;
    }
}

impl Related for Character {
    fn relation_id(&self) -> EntityId {
        self.id
    }

    fn relations_mut(&mut self) -> &mut RelationSet {
        &mut self.combatants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CombatConfig;
    use crate::effect::{EffectConfig, Lifetime};
    use crate::modifier::{Modifier, ModifierOp};
    use crate::random::ScriptedRng;
    use std::sync::Mutex;

    fn hero() -> Character {
        Character::new("hero", CharacterKind::Player)
            .with_attribute("health", 100.0)
            .and_then(|c| c.with_attribute("mana", 40.0))
            .and_then(|c| c.with_attribute("energy", 30.0))
            .expect("finite")
    }

    #[test]
    fn test_current_and_max_are_derived() {
        let config = CombatConfig::default();
        let mut rng = ScriptedRng::constant(0.5);
        let mut ctx = SimContext::new(0, &mut rng, &config);
        let mut c = hero();
        c.add_effect(
            Effect::new(EffectConfig::default())
                .with_modifier(Modifier::attribute("health", ModifierOp::Add(20.0))),
            &mut ctx,
        )
        .expect("add");
        c.lower_attribute("health", 30.0).expect("lower");

        assert_eq!(c.max_attribute("health", 0).expect("max"), 120.0);
        assert_eq!(c.attribute("health", 0).expect("current"), 90.0);
        assert_eq!(c.attribute_base("health").expect("base"), 100.0);

        c.lower_attribute("health", 500.0).expect("lower");
        assert_eq!(c.attribute("health", 0).expect("current"), 0.0);
    }

    #[test]
    fn test_missing_attribute() {
        let c = hero();
        assert_eq!(
            c.attribute("favor", 0).expect_err("missing"),
            AttributeError::Missing("favor".into())
        );
        assert_eq!(c.attribute_or_zero("favor", 0), 0.0);
    }

    #[test]
    fn test_resources_all_or_nothing() {
        let mut c = hero();
        let affordable = [ResourceCost::new("mana", 30.0), ResourceCost::new("energy", 10.0)];
        let too_much = [ResourceCost::new("mana", 5.0), ResourceCost::new("energy", 31.0)];

        assert!(c.has_enough_resources(&affordable, 0));
        assert!(!c.has_enough_resources(&too_much, 0));
        assert!(!c.has_enough_resources(&[ResourceCost::new("rage", 1.0)], 0));

        assert!(matches!(
            c.spend_resources(&too_much, 0),
            Err(AttributeError::Insufficient { .. })
        ));
        assert_eq!(c.attribute("mana", 0).expect("mana"), 40.0);

        c.spend_resources(&affordable, 0).expect("spend");
        assert_eq!(c.attribute("mana", 0).expect("mana"), 10.0);
        assert_eq!(c.attribute("energy", 0).expect("energy"), 20.0);
    }

    #[test]
    fn test_listeners_before_effects() {
        let config = CombatConfig::default();
        let mut rng = ScriptedRng::constant(0.5);
        let mut ctx = SimContext::new(0, &mut rng, &config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut c = hero();
        {
            let seen = Arc::clone(&seen);
            c.subscribe(Arc::new(move |event: &GameEvent| {
                seen.lock().expect("lock").push(event.event.name());
            }));
        }
        c.add_effect(Effect::new(EffectConfig::default()), &mut ctx)
            .expect("add");
        c.update_tick(&mut ctx);

        assert_eq!(
            *seen.lock().expect("lock"),
            vec!["effect_added", "effect_activated", "update_tick"]
        );
        let effect = c.effects().iter(0).next().expect("effect");
        assert_eq!(effect.state().ticks, 1);
    }

    #[test]
    fn test_lapsed_effects_announced_on_tick() {
        let config = CombatConfig::default();
        let mut rng = ScriptedRng::constant(0.5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut c = hero();
        {
            let seen = Arc::clone(&seen);
            c.subscribe(Arc::new(move |event: &GameEvent| {
                if let CharacterEvent::EffectRemoved { name, .. } = &event.event {
                    seen.lock().expect("lock").push(name.clone());
                }
            }));
        }
        {
            let mut ctx = SimContext::new(0, &mut rng, &config);
            c.add_effect(
                Effect::new(EffectConfig {
                    name: "sprint".into(),
                    duration: Lifetime::Timed(1_000),
                    ..EffectConfig::default()
                }),
                &mut ctx,
            )
            .expect("add");
        }
        let mut ctx = SimContext::new(1_000, &mut rng, &config);
        c.update_tick(&mut ctx);
        assert_eq!(*seen.lock().expect("lock"), vec!["sprint".to_string()]);
        assert!(c.effects().is_empty(1_000));
    }

    #[test]
    fn test_cooldowns() {
        let config = CombatConfig::default();
        let factory = EffectFactory::with_builtins(&config);
        let mut rng = ScriptedRng::constant(0.5);
        let mut c = hero();
        {
            let mut ctx = SimContext::new(0, &mut rng, &config);
            c.start_cooldown("bash", 5_000, &factory, &mut ctx)
                .expect("cooldown");
            assert!(!c
                .start_cooldown("bash", 5_000, &factory, &mut ctx)
                .expect("cooldown")
                .is_applied());
        }
        assert!(c.is_on_cooldown("bash", 4_999));
        assert!(!c.is_on_cooldown("kick", 0));
        assert!(!c.is_on_cooldown("bash", 5_000));
    }

    #[test]
    fn test_full_heal_and_drain_through_delta() {
        let mut c = hero();
        c.lower_attribute("health", 35.0).expect("lower");
        assert_eq!(c.attribute("health", 0).expect("health"), 65.0);

        c.set_attribute_delta("health", 0.0).expect("heal");
        assert_eq!(c.attribute("health", 0).expect("health"), 100.0);

        let max = c.max_attribute("mana", 0).expect("max");
        c.set_attribute_delta("mana", -max).expect("drain");
        assert_eq!(c.attribute("mana", 0).expect("mana"), 0.0);
        assert_eq!(c.max_attribute("mana", 0).expect("max"), 40.0);

        assert!(c.set_attribute_delta("health", f64::NAN).is_err());
        assert!(c.set_attribute_delta("favor", 0.0).is_err());
    }

    #[test]
    fn test_activation_changes_are_announced() {
        let config = CombatConfig::default();
        let mut rng = ScriptedRng::constant(0.5);
        let mut ctx = SimContext::new(0, &mut rng, &config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut c = hero();
        {
            let seen = Arc::clone(&seen);
            c.subscribe(Arc::new(move |event: &GameEvent| {
                seen.lock().expect("lock").push(event.event.name());
            }));
        }
        let id = c
            .add_effect(
                Effect::new(EffectConfig {
                    auto_activate: false,
                    ..EffectConfig::default()
                }),
                &mut ctx,
            )
            .expect("add")
            .id();

        assert!(c.activate_effect(id, &mut ctx).expect("activate"));
        assert!(!c.activate_effect(id, &mut ctx).expect("activate"));
        assert!(c.deactivate_effect(id, &mut ctx).expect("deactivate"));
        assert!(!c.deactivate_effect(id, &mut ctx).expect("deactivate"));
        assert!(c.deactivate_effect(EffectId::new(), &mut ctx).is_err());

        assert_eq!(
            *seen.lock().expect("lock"),
            vec!["effect_added", "effect_activated", "effect_deactivated"]
        );
    }

    #[test]
    fn test_pause_effects_suspends_modifiers() {
        let config = CombatConfig::default();
        let mut rng = ScriptedRng::constant(0.5);
        let mut ctx = SimContext::new(0, &mut rng, &config);
        let mut c = hero();
        c.add_effect(
            Effect::new(EffectConfig::default())
                .with_modifier(Modifier::attribute("health", ModifierOp::Add(20.0))),
            &mut ctx,
        )
        .expect("add");

        assert_eq!(c.pause_effects(100), 1);
        assert_eq!(c.max_attribute("health", 100).expect("max"), 100.0);
        assert_eq!(c.resume_effects(200), 1);
        assert_eq!(c.max_attribute("health", 200).expect("max"), 120.0);
    }

    #[test]
    fn test_ward_soaks_hits_then_expires() {
        let config = CombatConfig::default();
        let factory = EffectFactory::with_builtins(&config);
        let mut rng = ScriptedRng::constant(0.5);
        let mut ctx = SimContext::new(0, &mut rng, &config);
        let removed = Arc::new(Mutex::new(Vec::new()));
        let mut c = hero();
        {
            let removed = Arc::clone(&removed);
            c.subscribe(Arc::new(move |event: &GameEvent| {
                if let CharacterEvent::EffectRemoved { name, .. } = &event.event {
                    removed.lock().expect("lock").push(name.clone());
                }
            }));
        }
        let ward = factory
            .create("ward", &crate::factory::ConfigOverrides::default(), None)
            .expect("ward");
        c.add_effect(ward, &mut ctx).expect("add");

        let mut dealt = Vec::new();
        for _ in 0..4 {
            let mut hit = Damage::new(10.0, "health").expect("valid");
            dealt.push(hit.commit(&mut c, None, &mut ctx).expect("commit"));
        }

        assert_eq!(dealt, vec![5, 5, 5, 10]);
        assert_eq!(*removed.lock().expect("lock"), vec!["Ward".to_string()]);
        assert!(!c.has_effect_type(&EffectType::named("ward"), 0));
        assert_eq!(c.attribute("health", 0).expect("health"), 75.0);
    }

    #[test]
    fn test_remove_unknown_effect_is_error() {
        let config = CombatConfig::default();
        let mut rng = ScriptedRng::constant(0.5);
        let mut ctx = SimContext::new(0, &mut rng, &config);
        let mut c = hero();
        assert!(c.remove_effect(EffectId::new(), &mut ctx).is_err());
    }
}
