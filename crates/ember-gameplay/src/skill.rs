//! Skill improvement through use.

use tracing::debug;

use crate::character::Character;
use crate::config::SkillConfig;
use crate::context::{Millis, SimContext};
use crate::events::CharacterEvent;

/// Learning aptitude from intellect, perception and luck.
#[must_use]
pub fn aptitude(character: &Character, config: &SkillConfig, now: Millis) -> f64 {
    character.attribute_or_zero("intellect", now) * config.intellect_weight
        + character.attribute_or_zero("perception", now) * config.perception_weight
        + character.attribute_or_zero("luck", now) * config.luck_weight
}

/// Probability (0.0-1.0) that a use of a skill at `value` improves it.
///
/// Sigmoid centered on `aptitude`: skills below the character's aptitude
/// approach `max_chance`, skills far above it approach zero.
#[must_use]
pub fn gain_chance(value: f64, aptitude: f64, config: &SkillConfig) -> f64 {
    let spread = if config.spread > 0.0 { config.spread } else { 1.0 };
    config.max_chance / (1.0 + ((value - aptitude) / spread).exp())
}

/// Rolls for an improvement of `skill`. Returns the new base on success.
///
/// Only skills the character already has can improve, and never past the
/// configured cap.
pub fn roll_gain(character: &mut Character, skill: &str, ctx: &mut SimContext<'_>) -> Option<f64> {
    let tuning = ctx.config;
    let config = &tuning.skills;
    let current = character.skills().get(skill)?.base();
    if current >= config.cap {
        return None;
    }
    let chance = gain_chance(current, aptitude(character, config, ctx.now), config);
    if ctx.rng.next_f64() >= chance {
        return None;
    }

    let value = (current + 1.0).min(config.cap);
    character.set_skill_base(skill, value).ok()?;
    debug!(entity = %character.id(), skill, value, "skill improved");
    character.emit(
        CharacterEvent::SkillImproved {
            skill: skill.to_owned(),
            value,
        },
        ctx,
    );
    Some(value)
}
