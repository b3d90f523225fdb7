//! # Ember Gameplay
//!
//! Simulation core for a text-based multiplayer RPG.
//!
//! This crate provides the character layer and the combat systems:
//! - Attributes with base, delta and modifier pipelines
//! - Timed, stacking and ticking effects
//! - Damage and healing with mitigation and criticals
//! - Skill improvement through use
//! - Tick-driven combat rounds (dodge, block, attack, lag)
//! - Regeneration
//! - A world host that owns characters and drives ticks
//! - Event bus for the outer layers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod attribute;
pub mod character;
pub mod combat;
pub mod config;
pub mod context;
pub mod damage;
pub mod effect;
pub mod effect_list;
pub mod equipment;
pub mod events;
pub mod factory;
pub mod modifier;
pub mod random;
pub mod relationship;
pub mod skill;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::attribute::*;
    pub use crate::character::*;
    pub use crate::combat::*;
    pub use crate::config::*;
    pub use crate::context::*;
    pub use crate::damage::*;
    pub use crate::effect::*;
    pub use crate::effect_list::*;
    pub use crate::equipment::*;
    pub use crate::events::*;
    pub use crate::factory::*;
    pub use crate::modifier::*;
    pub use crate::random::*;
    pub use crate::relationship::*;
    pub use crate::skill::*;
    pub use crate::world::*;
}

pub use prelude::*;
