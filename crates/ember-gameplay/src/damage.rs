//! Damage and heal computation.
//!
//! A [`Damage`] is a one-shot proposal to change one attribute of one
//! character. [`Damage::evaluate`] runs the mitigation, critical and modifier
//! pipeline without touching anything; [`Damage::apply`] mutates the target
//! and emits the notification pair; [`Damage::commit`] does both.
//!
//! Heals are the same object with [`DamageKind::Heal`]: they skip armor and
//! defense, raise instead of lower, and emit `Heal`/`Healed` instead of
//! `Hit`/`Damaged`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ember_common::EntityId;

use crate::attribute::AttributeError;
use crate::character::Character;
use crate::context::SimContext;
use crate::equipment::WeaponCategory;
use crate::events::{CharacterEvent, DamageReport};
use crate::skill;

/// Default multiplier applied to critical hits.
pub const DEFAULT_CRITICAL_MULTIPLIER: f64 = 1.5;

/// Damage error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DamageError {
    /// Amount was NaN or infinite
    #[error("damage amount must be a finite number, got {0}")]
    NonFiniteAmount(f64),
    /// No attribute named
    #[error("damage requires a target attribute")]
    MissingAttribute,
    /// Target attribute error
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// Result type for damage operations.
pub type DamageResult<T> = Result<T, DamageError>;

/// Direction of the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageKind {
    /// Lowers the attribute
    Damage,
    /// Raises the attribute
    Heal,
}

/// Damage element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    /// Weapons and fists
    #[default]
    Physical,
    /// Fire
    Fire,
    /// Cold
    Cold,
    /// Poison
    Poison,
    /// Magic
    Arcane,
    /// Unmitigated by element
    True,
}

/// What produced a damage or heal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DamageSource {
    /// Unspecified
    #[default]
    Unknown,
    /// A weapon attack
    Weapon(WeaponCategory),
    /// A skill
    Skill(String),
    /// A periodic effect
    Effect(String),
}

/// One proposed change to one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Damage {
    kind: DamageKind,
    amount: f64,
    final_amount: Option<u32>,
    attribute: String,
    damage_type: DamageType,
    source: DamageSource,
    attacker: Option<EntityId>,
    hidden: bool,
    critical: bool,
    critical_multiplier: f64,
}

impl Damage {
    /// Creates damage against `attribute`.
    pub fn new(amount: f64, attribute: impl Into<String>) -> DamageResult<Self> {
        Self::build(DamageKind::Damage, amount, attribute.into())
    }

    /// Creates a heal of `attribute`.
    pub fn heal(amount: f64, attribute: impl Into<String>) -> DamageResult<Self> {
        Self::build(DamageKind::Heal, amount, attribute.into())
    }

    fn build(kind: DamageKind, amount: f64, attribute: String) -> DamageResult<Self> {
        if !amount.is_finite() {
            return Err(DamageError::NonFiniteAmount(amount));
        }
        if attribute.is_empty() {
            return Err(DamageError::MissingAttribute);
        }
        Ok(Self {
            kind,
            amount,
            final_amount: None,
            attribute,
            damage_type: DamageType::Physical,
            source: DamageSource::Unknown,
            attacker: None,
            hidden: false,
            critical: false,
            critical_multiplier: DEFAULT_CRITICAL_MULTIPLIER,
        })
    }

    /// Sets who is responsible.
    #[must_use]
    pub fn with_attacker(mut self, attacker: EntityId) -> Self {
        self.attacker = Some(attacker);
        self
    }

    /// Sets the damage element.
    #[must_use]
    pub fn with_type(mut self, damage_type: DamageType) -> Self {
        self.damage_type = damage_type;
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: DamageSource) -> Self {
        self.source = source;
        self
    }

    /// Suppresses narration.
    #[must_use]
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Sets the critical multiplier.
    #[must_use]
    pub fn with_critical_multiplier(mut self, multiplier: f64) -> Self {
        self.critical_multiplier = multiplier;
        self
    }

    /// Damage or heal.
    #[must_use]
    pub fn kind(&self) -> DamageKind {
        self.kind
    }

    /// Raw amount before the pipeline.
    #[must_use]
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Amount applied by the last commit.
    #[must_use]
    pub fn final_amount(&self) -> Option<u32> {
        self.final_amount
    }

    /// Target attribute.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Element.
    #[must_use]
    pub fn damage_type(&self) -> DamageType {
        self.damage_type
    }

    /// Source.
    #[must_use]
    pub fn source(&self) -> &DamageSource {
        &self.source
    }

    /// Responsible character.
    #[must_use]
    pub fn attacker(&self) -> Option<EntityId> {
        self.attacker
    }

    /// Whether narration is suppressed.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Whether the last evaluation rolled a critical.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Runs the pipeline and returns the amount that would be applied.
    ///
    /// Damage is reduced by `armor / armor_divisor` and
    /// `defense / defense_divisor`; heals skip mitigation. With an attacker a
    /// critical is rolled against the attacker's `critical` attribute, then
    /// the attacker's outgoing and the target's incoming modifiers run.
    pub fn evaluate(
        &mut self,
        target: &Character,
        attacker: Option<&Character>,
        ctx: &mut SimContext<'_>,
    ) -> u32 {
        let now = ctx.now;
        let mut amount = self.amount;
        if self.kind == DamageKind::Damage {
            amount -= target.attribute_or_zero("armor", now) / ctx.config.armor_divisor;
            amount -= target.skill_or_zero("defense", now) / ctx.config.defense_divisor;
        }

        self.critical = false;
        if let Some(attacker) = attacker {
            let chance = attacker
                .attribute_or_zero("critical", now)
                .clamp(0.0, 100.0);
            if ctx.rng.chance(chance) {
                self.critical = true;
                amount = (amount * self.critical_multiplier).ceil();
            }
            amount = attacker
                .effects()
                .evaluate_outgoing_damage(self, amount, now);
        }
        amount = target.effects().evaluate_incoming_damage(self, amount, now);

        // NaN from a zero divisor collapses to 0 here as well.
        amount.max(0.0).floor() as u32
    }

    /// Applies `amount` to the target and emits the notification pair.
    pub fn apply(
        &mut self,
        target: &mut Character,
        attacker: Option<&mut Character>,
        amount: u32,
        ctx: &mut SimContext<'_>,
    ) -> DamageResult<()> {
        let value = f64::from(amount);
        match self.kind {
            DamageKind::Damage => target.lower_attribute(&self.attribute, value)?,
            DamageKind::Heal => target.raise_attribute(&self.attribute, value)?,
        }
        self.final_amount = Some(amount);

        let report = self.report(amount);
        let target_id = target.id();
        let responsible = attacker.as_ref().map(|a| a.id()).or(self.attacker);
        debug!(
            target = %target_id,
            attribute = %self.attribute,
            amount,
            critical = self.critical,
            kind = ?self.kind,
            "damage applied"
        );

        match self.kind {
            DamageKind::Damage => {
                if let Some(attacker) = attacker {
                    attacker.emit(
                        CharacterEvent::Hit {
                            target: target_id,
                            report: report.clone(),
                        },
                        ctx,
                    );
                }
                target.emit(
                    CharacterEvent::Damaged {
                        attacker: responsible,
                        report,
                    },
                    ctx,
                );
                skill::roll_gain(target, "defense", ctx);
            }
            DamageKind::Heal => {
                if let Some(healer) = attacker {
                    healer.emit(
                        CharacterEvent::Heal {
                            target: target_id,
                            report: report.clone(),
                        },
                        ctx,
                    );
                }
                target.emit(
                    CharacterEvent::Healed {
                        healer: responsible,
                        report,
                    },
                    ctx,
                );
            }
        }
        Ok(())
    }

    /// Evaluates and applies. Returns the final amount.
    pub fn commit(
        &mut self,
        target: &mut Character,
        mut attacker: Option<&mut Character>,
        ctx: &mut SimContext<'_>,
    ) -> DamageResult<u32> {
        if !target.has_attribute(&self.attribute) {
            return Err(AttributeError::Missing(self.attribute.clone()).into());
        }
        let amount = self.evaluate(target, attacker.as_deref(), ctx);
        self.apply(target, attacker.take(), amount, ctx)?;
        Ok(amount)
    }

    fn report(&self, amount: u32) -> DamageReport {
        DamageReport {
            attribute: self.attribute.clone(),
            amount,
            critical: self.critical,
            hidden: self.hidden,
            damage_type: self.damage_type,
            source: self.source.clone(),
        }
    }
}
