//! Effect modifiers.
//!
//! A modifier is plain data: which value it applies to and how it transforms
//! it. Effects carry a list of modifiers and the effect list folds them in
//! insertion order.

use serde::{Deserialize, Serialize};

use crate::damage::DamageKind;

/// Arithmetic applied by a modifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum ModifierOp {
    /// Add a flat value.
    Add(f64),
    /// Multiply by a factor (1.0 = no change).
    Multiply(f64),
    /// Add a flat value once per stack.
    AddPerStack(f64),
    /// Multiply by `1 + factor * stacks`.
    MultiplyPerStack(f64),
}

impl ModifierOp {
    /// Applies the operation to `value` for an effect with `stacks` stacks.
    #[must_use]
    pub fn apply(self, value: f64, stacks: u32) -> f64 {
        let stacks = f64::from(stacks);
        match self {
            Self::Add(v) => value + v,
            Self::Multiply(f) => value * f,
            Self::AddPerStack(v) => value + v * stacks,
            Self::MultiplyPerStack(f) => value * (1.0 + f * stacks),
        }
    }
}

/// Which damage objects a damage modifier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageScope {
    /// Only harmful damage.
    #[default]
    Damage,
    /// Only heals.
    Heal,
    /// Both.
    Any,
}

impl DamageScope {
    /// Returns true if this scope covers the given kind.
    #[must_use]
    pub fn covers(self, kind: DamageKind) -> bool {
        match self {
            Self::Any => true,
            Self::Damage => kind == DamageKind::Damage,
            Self::Heal => kind == DamageKind::Heal,
        }
    }
}

/// A single transformation contributed by an effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Modifier {
    /// Transforms the evaluated value of a named attribute or skill.
    Attribute {
        /// Attribute name
        attribute: String,
        /// Operation
        op: ModifierOp,
    },
    /// Transforms damage received by the effect's owner.
    IncomingDamage {
        /// Operation
        op: ModifierOp,
        /// Damage kinds affected
        #[serde(default)]
        scope: DamageScope,
    },
    /// Transforms damage dealt by the effect's owner.
    OutgoingDamage {
        /// Operation
        op: ModifierOp,
        /// Damage kinds affected
        #[serde(default)]
        scope: DamageScope,
    },
}

impl Modifier {
    /// Attribute modifier shorthand.
    pub fn attribute(attribute: impl Into<String>, op: ModifierOp) -> Self {
        Self::Attribute {
            attribute: attribute.into(),
            op,
        }
    }

    /// Incoming damage modifier shorthand (harmful damage only).
    #[must_use]
    pub fn incoming(op: ModifierOp) -> Self {
        Self::IncomingDamage {
            op,
            scope: DamageScope::Damage,
        }
    }

    /// Outgoing damage modifier shorthand (harmful damage only).
    #[must_use]
    pub fn outgoing(op: ModifierOp) -> Self {
        Self::OutgoingDamage {
            op,
            scope: DamageScope::Damage,
        }
    }
}
