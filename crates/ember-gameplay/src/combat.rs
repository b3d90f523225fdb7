//! Combat round resolver.
//!
//! [`update_round`] runs once per tick for each character. It short-circuits
//! in this order:
//!
//! 1. health at zero: nothing happens;
//! 2. not fighting: combat UI state is cleared and regeneration ensured;
//! 3. lag left: the lag budget is reduced by the time since the last sample;
//! 4. no living target: the character leaves combat.
//!
//! Otherwise the target may dodge, then block; if both fail the attack lands
//! as [`Damage`] on the target's `health`. Every action ends with skill-gain
//! rolls and `lag = weapon_speed * 1000`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use ember_common::EntityId;

use crate::attribute::AttributeError;
use crate::character::{Character, CharacterKind};
use crate::config::CombatConfig;
use crate::context::{Millis, SimContext};
use crate::damage::{Damage, DamageError, DamageSource};
use crate::events::CharacterEvent;
use crate::skill;
use crate::world::World;

/// Combat error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CombatError {
    /// No character with this id
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    /// A combatant can not be fought (it has no health)
    #[error("invalid combat target {0}")]
    InvalidTarget(EntityId),
    /// A character tried to fight itself
    #[error("you can not attack yourself")]
    SelfTarget,
    /// Player versus player combat is disabled
    #[error("player versus player combat is disabled")]
    NonPvp,
    /// The target refuses combat
    #[error("{0} is a pacifist")]
    Pacifist(EntityId),
    /// Attribute error
    #[error(transparent)]
    Attribute(#[from] AttributeError),
    /// Damage error
    #[error(transparent)]
    Damage(#[from] DamageError),
}

/// Result type for combat operations.
pub type CombatResult<T> = Result<T, CombatError>;

/// What one call to [`update_round`] did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// The character has no health left
    Dead,
    /// The character is not fighting
    OutOfCombat,
    /// The character is still recovering from its last action
    Lagging {
        /// Lag left after this tick
        remaining: Millis,
    },
    /// Every combatant is dead; the character left combat
    NoTarget,
    /// The target dodged
    Dodged {
        /// Defender
        target: EntityId,
    },
    /// The target blocked
    Blocked {
        /// Defender
        target: EntityId,
    },
    /// The attack landed
    Hit {
        /// Defender
        target: EntityId,
        /// Damage dealt
        damage: u32,
        /// Whether it was a critical hit
        critical: bool,
        /// Whether the defender died
        killed: bool,
    },
}

/// Runs one combat round for `id`.
///
/// An [`CombatError::InvalidTarget`] removes the attacker from combat before
/// it is returned.
pub fn update_round(
    world: &mut World,
    id: EntityId,
    ctx: &mut SimContext<'_>,
) -> CombatResult<RoundOutcome> {
    let now = ctx.now;
    {
        let attacker = world.get_mut(id).ok_or(CombatError::EntityNotFound(id))?;
        if attacker.attribute_or_zero("health", now) <= 0.0 {
            return Ok(RoundOutcome::Dead);
        }
        if attacker.is_in_combat() {
            let data = attacker.combat_data_mut();
            if data.lag > 0 {
                let elapsed = now.saturating_sub(data.round_started);
                data.lag = data.lag.saturating_sub(elapsed);
                data.round_started = now;
                trace!(entity = %id, remaining = data.lag, "lagging");
                return Ok(RoundOutcome::Lagging {
                    remaining: data.lag,
                });
            }
        } else {
            attacker.clear_combat_prompt();
        }
    }

    if !world.get(id).is_some_and(Character::is_in_combat) {
        world.ensure_regen(id, ctx);
        return Ok(RoundOutcome::OutOfCombat);
    }

    let target_id = match find_target(world, id, now) {
        Ok(Some(target)) => target,
        Ok(None) => {
            debug!(entity = %id, "no living target");
            world.remove_from_combat(id, ctx);
            return Ok(RoundOutcome::NoTarget);
        }
        Err(err) => {
            warn!(entity = %id, %err, "invalid combat target");
            world.remove_from_combat(id, ctx);
            return Err(err);
        }
    };

    let outcome = world
        .with_pair(id, target_id, |attacker, target| {
            resolve_action(attacker, target, ctx)
        })
        .ok_or(CombatError::EntityNotFound(target_id))??;
    debug!(entity = %id, ?outcome, "round resolved");

    if let RoundOutcome::Hit { killed: true, .. } = outcome {
        handle_death(world, target_id, Some(id), ctx);
    }
    Ok(outcome)
}

/// First combatant, in engagement order, with health above zero.
///
/// A combatant without a `health` attribute is an invalid target. Combatants
/// that are no longer in the world are skipped.
pub fn find_target(world: &World, id: EntityId, now: Millis) -> CombatResult<Option<EntityId>> {
    let attacker = world.get(id).ok_or(CombatError::EntityNotFound(id))?;
    for candidate in attacker.combatants().iter() {
        let Some(target) = world.get(candidate) else {
            continue;
        };
        if !target.has_attribute("health") {
            return Err(CombatError::InvalidTarget(candidate));
        }
        if target.attribute("health", now)? > 0.0 {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

fn resolve_action(
    attacker: &mut Character,
    target: &mut Character,
    ctx: &mut SimContext<'_>,
) -> CombatResult<RoundOutcome> {
    let now = ctx.now;
    let config = ctx.config;
    let target_id = target.id();

    if ctx.rng.chance(dodge_chance(attacker, target, now, config)) {
        attacker.emit(CharacterEvent::AttackDodged { target: target_id }, ctx);
        target.emit(CharacterEvent::Dodged { attacker: attacker.id() }, ctx);
        skill::roll_gain(target, "dodge", ctx);
        finish_action(attacker, ctx);
        return Ok(RoundOutcome::Dodged { target: target_id });
    }

    if ctx.rng.chance(block_chance(attacker, target, now, config)) {
        attacker.emit(CharacterEvent::AttackBlocked { target: target_id }, ctx);
        target.emit(CharacterEvent::Blocked { attacker: attacker.id() }, ctx);
        skill::roll_gain(target, "block", ctx);
        finish_action(attacker, ctx);
        return Ok(RoundOutcome::Blocked { target: target_id });
    }

    let (min, max) = weapon_damage_range(attacker, now, config);
    let roll = ctx
        .rng
        .range_u32(min.round() as u32, max.round() as u32);
    let speed = weapon_speed(attacker, now, config);
    let amount = normalize_damage(attacker, f64::from(roll), speed, now, config);

    let mut damage = Damage::new(f64::from(amount), "health")?
        .with_attacker(attacker.id())
        .with_source(DamageSource::Weapon(attacker.weapon_category()))
        .with_critical_multiplier(config.critical_multiplier);
    let dealt = damage.commit(target, Some(&mut *attacker), ctx)?;

    let killed = target.attribute("health", now)? <= 0.0;
    if killed {
        target.combat_data_mut().killed_by = Some(attacker.id());
    }
    finish_action(attacker, ctx);

    Ok(RoundOutcome::Hit {
        target: target_id,
        damage: dealt,
        critical: damage.is_critical(),
        killed,
    })
}

/// Offense and weapon skill gains, then post-action lag.
fn finish_action(attacker: &mut Character, ctx: &mut SimContext<'_>) {
    let weapon_skill = attacker.weapon_category().skill_name();
    skill::roll_gain(attacker, "offense", ctx);
    skill::roll_gain(attacker, weapon_skill, ctx);

    let speed = weapon_speed(attacker, ctx.now, ctx.config);
    let data = attacker.combat_data_mut();
    data.lag = (speed * 1000.0).round() as Millis;
    data.round_started = ctx.now;
}

/// Chance in percent that `target` dodges `attacker`.
///
/// `dodge_base + max(0, target.reflexes - attacker.reflexes) + target.dodge / 5`
#[must_use]
pub fn dodge_chance(attacker: &Character, target: &Character, now: Millis, config: &CombatConfig) -> f64 {
    let reflexes =
        (target.attribute_or_zero("reflexes", now) - attacker.attribute_or_zero("reflexes", now)).max(0.0);
    let skill = target.skill_or_zero("dodge", now) / config.dodge_skill_divisor;
    (config.dodge_base + reflexes + skill).max(0.0)
}

/// Chance in percent that `target` blocks `attacker`.
///
/// Zero when an unarmed target faces an armed attacker. Otherwise
/// `base + max(0, target.endurance - attacker.brawn) + target.block / 5`,
/// where `base` depends on shield and weapons.
#[must_use]
pub fn block_chance(attacker: &Character, target: &Character, now: Millis, config: &CombatConfig) -> f64 {
    if !target.is_armed() && attacker.is_armed() {
        return 0.0;
    }
    let base = if target.has_shield() {
        config.block_base_shield
    } else if target.is_armed() && !attacker.is_armed() {
        config.block_base_armed
    } else {
        config.block_base_unarmed
    };
    let strength =
        (target.attribute_or_zero("endurance", now) - attacker.attribute_or_zero("brawn", now)).max(0.0);
    let skill = target.skill_or_zero("block", now) / config.block_skill_divisor;
    (base + strength + skill).max(0.0)
}

/// `(min, max)` raw damage for the wielded weapon.
#[must_use]
pub fn weapon_damage_range(character: &Character, now: Millis, config: &CombatConfig) -> (f64, f64) {
    let category = character.weapon_category();
    let profile = config.weapons.profile(category);
    let mastery = character.skill_or_zero(category.skill_name(), now);
    let brawn = character.attribute_or_zero("brawn", now);

    let min = profile.min_base + mastery * profile.min_mastery + brawn * profile.min_brawn;
    let max = profile.max_base + mastery * profile.max_mastery + brawn * profile.max_brawn;
    (min.max(0.0), max.max(min).max(0.0))
}

/// Seconds per round for the wielded weapon, rounded to two decimals.
#[must_use]
pub fn weapon_speed(character: &Character, now: Millis, config: &CombatConfig) -> f64 {
    let category = character.weapon_category();
    let profile = config.weapons.profile(category);
    let mastery = character.skill_or_zero(category.skill_name(), now);
    let reflexes = character.attribute_or_zero("reflexes", now);

    let speed = profile.speed_base
        - mastery / profile.speed_mastery_divisor
        - reflexes / profile.speed_reflexes_divisor;
    ((speed * 100.0).round() / 100.0).max(config.min_weapon_speed)
}

/// Turns a raw weapon roll into the integer damage of an attack.
///
/// `(roll + offense/10 + brawn/5) * (1 + (reflexes + endurance)/200) * speed/reference_speed`,
/// rounded, at least 1.
#[must_use]
pub fn normalize_damage(
    character: &Character,
    roll: f64,
    speed: f64,
    now: Millis,
    config: &CombatConfig,
) -> u32 {
    let offense = character.skill_or_zero("offense", now);
    let brawn = character.attribute_or_zero("brawn", now);
    let reflexes = character.attribute_or_zero("reflexes", now);
    let endurance = character.attribute_or_zero("endurance", now);

    let raw = (roll + offense / 10.0 + brawn / 5.0)
        * (1.0 + (reflexes + endurance) / 200.0)
        * (speed / config.reference_speed);
    raw.round().max(1.0) as u32
}

/// Death of `id`: leaves combat, `Killed` and `Deathblow` are emitted, NPCs
/// leave the world. Runs at most once per death.
pub fn handle_death(
    world: &mut World,
    id: EntityId,
    killer: Option<EntityId>,
    ctx: &mut SimContext<'_>,
) {
    match world.get_mut(id) {
        Some(corpse) if !corpse.is_death_handled() => corpse.set_death_handled(true),
        _ => return,
    }
    world.remove_from_combat(id, ctx);

    let kind = match world.get_mut(id) {
        Some(corpse) => {
            corpse.combat_data_mut().killed_by = killer;
            corpse.emit(CharacterEvent::Killed { killer }, ctx);
            corpse.kind()
        }
        None => return,
    };
    if let Some(killer) = killer.and_then(|killer| world.get_mut(killer)) {
        killer.emit(CharacterEvent::Deathblow { target: id }, ctx);
    }
    debug!(entity = %id, ?killer, "died");

    if kind == CharacterKind::Npc {
        world.despawn(id, ctx);
    }
}

/// Checks whether `attacker` may start a fight with `target`.
pub fn validate_target(attacker: &Character, target: &Character, config: &CombatConfig) -> CombatResult<()> {
    if !target.has_attribute("health") {
        return Err(CombatError::InvalidTarget(target.id()));
    }
    if attacker.id() == target.id() {
        return Err(CombatError::SelfTarget);
    }
    if target.is_pacifist() {
        return Err(CombatError::Pacifist(target.id()));
    }
    if !config.pvp && !attacker.is_npc() && !target.is_npc() {
        return Err(CombatError::NonPvp);
    }
    Ok(())
}
