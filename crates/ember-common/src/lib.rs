//! # Ember Common
//!
//! Common types and shared abstractions for the Ember simulation core.
//!
//! This crate provides foundational types used across all Ember crates:
//! - ID types (EntityId, EffectId)
//! - Version information for persisted schemas
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!EntityId::NULL.is_valid());
    }

    #[test]
    fn test_effect_ids_are_unique() {
        let a = EffectId::new();
        let b = EffectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = SchemaVersion::new(1, 0, 0);
        let v2 = SchemaVersion::new(1, 1, 0);
        let v3 = SchemaVersion::new(2, 0, 0);

        assert!(v2.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v3));
        assert!(v1.can_read(&v2));
        assert!(!v3.can_read(&v1));
    }

    #[test]
    fn test_entity_id_serde_is_transparent_number() {
        let id = EntityId::from_raw(42);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "42");
    }
}
