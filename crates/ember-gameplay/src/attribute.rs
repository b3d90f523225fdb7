//! Character attributes.
//!
//! An attribute is a numeric stat with a permanent `base` and a transient
//! `delta`. The current and maximum values are never stored: the owning
//! character derives them by folding its effect list over `base`
//! (see [`crate::effect_list::EffectList::evaluate_attribute`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Attribute error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttributeError {
    /// A base or delta value was NaN or infinite
    #[error("attribute `{name}`: {field} must be a finite number, got {value}")]
    NonFinite {
        /// Attribute name
        name: String,
        /// Which field was rejected (`base`, `delta` or `amount`)
        field: &'static str,
        /// Rejected value
        value: f64,
    },
    /// The character has no attribute with this name
    #[error("attribute `{0}` not found")]
    Missing(String),
    /// Not enough of a resource attribute to pay a cost
    #[error("insufficient {name}: required {required}, available {available}")]
    Insufficient {
        /// Attribute name
        name: String,
        /// Amount required
        required: f64,
        /// Amount currently available
        available: f64,
    },
}

/// Result type for attribute operations.
pub type AttributeResult<T> = Result<T, AttributeError>;

fn ensure_finite(name: &str, field: &'static str, value: f64) -> AttributeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AttributeError::NonFinite {
            name: name.to_owned(),
            field,
            value,
        })
    }
}

/// A single numeric stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    base: f64,
    #[serde(default)]
    delta: f64,
}

impl Attribute {
    /// Creates an attribute with the given base and no delta.
    pub fn new(name: impl Into<String>, base: f64) -> AttributeResult<Self> {
        Self::with_delta(name, base, 0.0)
    }

    /// Creates an attribute with an explicit delta.
    pub fn with_delta(name: impl Into<String>, base: f64, delta: f64) -> AttributeResult<Self> {
        let name = name.into();
        let base = ensure_finite(&name, "base", base)?;
        let delta = ensure_finite(&name, "delta", delta)?;
        Ok(Self { name, base, delta })
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the permanent base value.
    #[must_use]
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Returns the transient delta.
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Raises the delta by `amount`.
    pub fn raise(&mut self, amount: f64) -> AttributeResult<()> {
        let amount = ensure_finite(&self.name, "amount", amount)?;
        self.delta = ensure_finite(&self.name, "delta", self.delta + amount)?;
        Ok(())
    }

    /// Lowers the delta by `amount`.
    pub fn lower(&mut self, amount: f64) -> AttributeResult<()> {
        self.raise(-amount)
    }

    /// Permanently changes the base value.
    pub fn set_base(&mut self, amount: f64) -> AttributeResult<()> {
        self.base = ensure_finite(&self.name, "base", amount)?;
        Ok(())
    }

    /// Overwrites the delta, bypassing raise/lower.
    ///
    /// `set_delta(0.0)` fully restores the attribute; `set_delta(-max)`
    /// fully drains it.
    pub fn set_delta(&mut self, amount: f64) -> AttributeResult<()> {
        self.delta = ensure_finite(&self.name, "delta", amount)?;
        Ok(())
    }
}

/// Name-keyed attribute storage for one character.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap {
    attributes: BTreeMap<String, Attribute>,
}

impl AttributeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an attribute, replacing any attribute with the same name.
    pub fn insert(&mut self, attribute: Attribute) -> Option<Attribute> {
        self.attributes.insert(attribute.name.clone(), attribute)
    }

    /// Returns true if the attribute exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Gets an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Gets an attribute, failing with [`AttributeError::Missing`].
    pub fn require(&self, name: &str) -> AttributeResult<&Attribute> {
        self.get(name)
            .ok_or_else(|| AttributeError::Missing(name.to_owned()))
    }

    /// Gets a mutable attribute, failing with [`AttributeError::Missing`].
    pub fn require_mut(&mut self, name: &str) -> AttributeResult<&mut Attribute> {
        self.attributes
            .get_mut(name)
            .ok_or_else(|| AttributeError::Missing(name.to_owned()))
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_and_lower_touch_delta_only() {
        let mut health = Attribute::new("health", 100.0).expect("finite");
        health.lower(30.0).expect("lower");
        assert_eq!(health.base(), 100.0);
        assert_eq!(health.delta(), -30.0);

        health.raise(50.0).expect("raise");
        // No self-clamping: delta may go above zero.
        assert_eq!(health.delta(), 20.0);
    }

    #[test]
    fn test_non_finite_construction_fails() {
        let err = Attribute::new("health", f64::NAN).expect_err("nan base");
        assert!(matches!(err, AttributeError::NonFinite { field: "base", .. }));

        let err = Attribute::with_delta("mana", 10.0, f64::INFINITY).expect_err("inf delta");
        assert!(matches!(err, AttributeError::NonFinite { field: "delta", .. }));
    }

    #[test]
    fn test_non_finite_mutation_leaves_value_untouched() {
        let mut energy = Attribute::new("energy", 40.0).expect("finite");
        assert!(energy.raise(f64::NAN).is_err());
        assert!(energy.set_base(f64::NEG_INFINITY).is_err());
        assert_eq!(energy.base(), 40.0);
        assert_eq!(energy.delta(), 0.0);
    }

    #[test]
    fn test_set_delta_resets() {
        let mut health = Attribute::with_delta("health", 100.0, -75.0).expect("finite");
        health.set_delta(0.0).expect("reset");
        assert_eq!(health.delta(), 0.0);
    }

    #[test]
    fn test_map_require() {
        let mut map = AttributeMap::new();
        map.insert(Attribute::new("brawn", 12.0).expect("finite"));
        assert!(map.contains("brawn"));
        assert_eq!(map.require("brawn").expect("present").base(), 12.0);
        assert_eq!(
            map.require("luck").expect_err("absent"),
            AttributeError::Missing("luck".into())
        );
    }
}
