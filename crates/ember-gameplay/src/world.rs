//! World host: owns the characters and drives the simulation tick.
//!
//! Characters live in a map ordered by id, which fixes the visiting order of
//! [`World::tick`]. Every combatant change goes through this type so both
//! sides of the relationship are always updated together.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, trace};

use ember_common::EntityId;

use crate::character::{Character, CombatData};
use crate::combat::{self, CombatError, CombatResult};
use crate::config::CombatConfig;
use crate::context::{Millis, SimContext};
use crate::effect::EffectType;
use crate::events::{CharacterEvent, EventBus};
use crate::factory::{ConfigOverrides, EffectFactory, REGEN};
use crate::random::RandomSource;
use crate::relationship;

/// All simulated characters plus the shared services they use.
#[derive(Debug)]
pub struct World {
    characters: BTreeMap<EntityId, Character>,
    factory: EffectFactory,
    config: Arc<CombatConfig>,
    bus: EventBus,
}

impl World {
    /// Creates an empty world with the built-in effect templates.
    #[must_use]
    pub fn new(config: CombatConfig) -> Self {
        let factory = EffectFactory::with_builtins(&config);
        Self::with_factory(config, factory)
    }

    /// Creates an empty world with a custom effect factory.
    #[must_use]
    pub fn with_factory(config: CombatConfig, factory: EffectFactory) -> Self {
        Self {
            characters: BTreeMap::new(),
            factory,
            config: Arc::new(config),
            bus: EventBus::default(),
        }
    }

    /// Combat tuning.
    #[must_use]
    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Shared handle to the combat tuning, for building a [`SimContext`].
    #[must_use]
    pub fn config_handle(&self) -> Arc<CombatConfig> {
        Arc::clone(&self.config)
    }

    /// Effect templates.
    #[must_use]
    pub fn factory(&self) -> &EffectFactory {
        &self.factory
    }

    /// Mutable effect templates.
    pub fn factory_mut(&mut self) -> &mut EffectFactory {
        &mut self.factory
    }

    /// Bus every character publishes to.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Adds a character and connects it to the bus.
    pub fn spawn(&mut self, mut character: Character) -> EntityId {
        let id = character.id();
        character.attach_bus(self.bus.publisher());
        debug!(entity = %id, name = character.name(), "spawned");
        self.characters.insert(id, character);
        id
    }

    /// Removes a character, ending its fights first.
    pub fn despawn(&mut self, id: EntityId, ctx: &mut SimContext<'_>) -> Option<Character> {
        if !self.characters.contains_key(&id) {
            return None;
        }
        self.remove_from_combat(id, ctx);
        debug!(entity = %id, "despawned");
        self.characters.remove(&id)
    }

    /// Looks up a character.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Character> {
        self.characters.get(&id)
    }

    /// Looks up a character for mutation.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    /// Returns true if the character exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.characters.contains_key(&id)
    }

    /// Character ids in tick order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.characters.keys().copied().collect()
    }

    /// Number of characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    /// Returns true if there are no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Runs `f` with two distinct characters borrowed mutably.
    ///
    /// Returns `None` if `a == b` or either is missing.
    pub fn with_pair<R>(
        &mut self,
        a: EntityId,
        b: EntityId,
        f: impl FnOnce(&mut Character, &mut Character) -> R,
    ) -> Option<R> {
        if a == b || !self.characters.contains_key(&b) {
            return None;
        }
        let mut first = self.characters.remove(&a)?;
        let result = self.characters.get_mut(&b).map(|second| f(&mut first, second));
        self.characters.insert(a, first);
        result
    }

    /// Validates and starts a fight initiated by `attacker`.
    pub fn engage(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        ctx: &mut SimContext<'_>,
    ) -> CombatResult<()> {
        let a = self.get(attacker).ok_or(CombatError::EntityNotFound(attacker))?;
        let b = self.get(target).ok_or(CombatError::EntityNotFound(target))?;
        combat::validate_target(a, b, &self.config)?;
        self.initiate_combat(attacker, target, ctx)
    }

    /// Makes `a` and `b` fight each other.
    ///
    /// A character entering combat gets fresh combat data and `CombatStart`;
    /// each side that gained an opponent gets `CombatantAdded`.
    pub fn initiate_combat(
        &mut self,
        a: EntityId,
        b: EntityId,
        ctx: &mut SimContext<'_>,
    ) -> CombatResult<()> {
        if a == b {
            return Err(CombatError::SelfTarget);
        }
        for id in [a, b] {
            if !self.contains(id) {
                return Err(CombatError::EntityNotFound(id));
            }
        }
        self.with_pair(a, b, |first, second| {
            let first_starts = !first.is_in_combat();
            let second_starts = !second.is_in_combat();
            let linked = relationship::link(first, second);

            for (character, starts, added, opponent) in [
                (&mut *first, first_starts, linked.a_added, b),
                (&mut *second, second_starts, linked.b_added, a),
            ] {
                if starts {
                    *character.combat_data_mut() = CombatData::started(ctx.now);
                    character.emit(CharacterEvent::CombatStart, ctx);
                }
                if added {
                    character.emit(CharacterEvent::CombatantAdded { target: opponent }, ctx);
                }
            }
        });
        debug!(%a, %b, "combat initiated");
        Ok(())
    }

    /// Ends the fight between `a` and `b` on both sides.
    ///
    /// A side left without opponents gets `CombatEnd` once, loses its combat
    /// data and starts regenerating.
    pub fn remove_combatant(&mut self, a: EntityId, b: EntityId, ctx: &mut SimContext<'_>) {
        let changed = if self.contains(b) {
            self.with_pair(a, b, |first, second| {
                let changed = relationship::unlink(first, second);
                if changed {
                    first.emit(CharacterEvent::CombatantRemoved { target: b }, ctx);
                    second.emit(CharacterEvent::CombatantRemoved { target: a }, ctx);
                }
                changed
            })
            .unwrap_or(false)
        } else {
            // The other side already left the world.
            self.get_mut(a)
                .is_some_and(|first| first.combatants_mut().remove(b))
        };
        if !changed {
            return;
        }
        for id in [a, b] {
            let ended = self
                .get(id)
                .is_some_and(|character| !character.is_in_combat());
            if ended {
                self.end_combat(id, ctx);
            }
        }
    }

    /// Ends every fight `id` is in.
    pub fn remove_from_combat(&mut self, id: EntityId, ctx: &mut SimContext<'_>) {
        let opponents: Vec<EntityId> = match self.get(id) {
            Some(character) => character.combatants().iter().collect(),
            None => return,
        };
        for opponent in opponents {
            self.remove_combatant(id, opponent, ctx);
        }
    }

    fn end_combat(&mut self, id: EntityId, ctx: &mut SimContext<'_>) {
        let alive = match self.get_mut(id) {
            Some(character) => {
                *character.combat_data_mut() = CombatData::default();
                character.clear_combat_prompt();
                character.emit(CharacterEvent::CombatEnd, ctx);
                character.attribute_or_zero("health", ctx.now) > 0.0
            }
            None => return,
        };
        debug!(entity = %id, "combat ended");
        if alive {
            self.ensure_regen(id, ctx);
        }
    }

    /// Gives `id` a regeneration effect unless it already has one. Returns
    /// true if one was added.
    pub fn ensure_regen(&mut self, id: EntityId, ctx: &mut SimContext<'_>) -> bool {
        let Some(character) = self.characters.get_mut(&id) else {
            return false;
        };
        if character.has_effect_type(&EffectType::Regen, ctx.now) {
            return false;
        }
        let effect = match self.factory.create(REGEN, &ConfigOverrides::default(), None) {
            Ok(effect) => effect,
            Err(err) => {
                error!(entity = %id, %err, "regeneration template unavailable");
                return false;
            }
        };
        match character.add_effect(effect, ctx) {
            Ok(addition) => addition.is_applied(),
            Err(err) => {
                error!(entity = %id, %err, "failed to add regeneration");
                false
            }
        }
    }

    /// Runs one simulation tick at `now`.
    ///
    /// Each character, in id order, resolves its combat round, then receives
    /// `UpdateTick` (which drives its effects), then is checked for death.
    /// Combat errors are collected and returned with the character they
    /// belong to.
    pub fn tick(&mut self, now: Millis, rng: &mut dyn RandomSource) -> Vec<(EntityId, CombatError)> {
        let config = Arc::clone(&self.config);
        let mut ctx = SimContext::new(now, rng, &config);
        let mut errors = Vec::new();

        for id in self.ids() {
            if !self.contains(id) {
                continue;
            }
            match combat::update_round(self, id, &mut ctx) {
                Ok(outcome) => trace!(entity = %id, ?outcome, "round"),
                Err(err) => errors.push((id, err)),
            }
            if let Some(character) = self.get_mut(id) {
                character.update_tick(&mut ctx);
            }
            self.check_death(id, &mut ctx);
        }
        errors
    }

    fn check_death(&mut self, id: EntityId, ctx: &mut SimContext<'_>) {
        let Some(character) = self.get_mut(id) else {
            return;
        };
        if !character.has_attribute("health") {
            return;
        }
        let dead = character.attribute_or_zero("health", ctx.now) <= 0.0;
        if !dead {
            character.set_death_handled(false);
            return;
        }
        if !character.is_death_handled() {
            let killer = character.combat_data().killed_by;
            combat::handle_death(self, id, killer, ctx);
        }
    }
}
