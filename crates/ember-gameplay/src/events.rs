//! Character events and the event bus outer layers drain.
//!
//! Every notification the simulation produces is a [`CharacterEvent`]
//! addressed to one character. Emission delivers it, in order, to the
//! character's own [`EventHandler`]s, to the shared [`EventBus`], and finally
//! to the character's effects (see [`CharacterEvent::is_proxied`]).

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use ember_common::{EffectId, EntityId};

use crate::damage::{DamageSource, DamageType};

/// Numbers behind a hit or heal notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageReport {
    /// Attribute that changed
    pub attribute: String,
    /// Final amount applied
    pub amount: u32,
    /// Whether the amount was a critical hit
    pub critical: bool,
    /// Whether narration should be suppressed
    pub hidden: bool,
    /// Damage type
    pub damage_type: DamageType,
    /// What produced the change
    pub source: DamageSource,
}

/// Notification delivered to one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CharacterEvent {
    /// One simulation tick elapsed
    UpdateTick,
    /// The character entered combat
    CombatStart,
    /// The character left combat
    CombatEnd,
    /// A combatant was added
    CombatantAdded {
        /// The new opponent
        target: EntityId,
    },
    /// A combatant was removed
    CombatantRemoved {
        /// The former opponent
        target: EntityId,
    },
    /// This character damaged someone
    Hit {
        /// Who was damaged
        target: EntityId,
        /// Damage numbers
        report: DamageReport,
    },
    /// This character was damaged
    Damaged {
        /// Who dealt the damage, if anyone
        attacker: Option<EntityId>,
        /// Damage numbers
        report: DamageReport,
    },
    /// This character healed someone
    Heal {
        /// Who was healed
        target: EntityId,
        /// Heal numbers
        report: DamageReport,
    },
    /// This character was healed
    Healed {
        /// Who healed, if anyone
        healer: Option<EntityId>,
        /// Heal numbers
        report: DamageReport,
    },
    /// This character dodged an attack
    Dodged {
        /// The attacker
        attacker: EntityId,
    },
    /// This character's attack was dodged
    AttackDodged {
        /// The defender
        target: EntityId,
    },
    /// This character blocked an attack
    Blocked {
        /// The attacker
        attacker: EntityId,
    },
    /// This character's attack was blocked
    AttackBlocked {
        /// The defender
        target: EntityId,
    },
    /// This character died
    Killed {
        /// Who landed the killing blow, if anyone
        killer: Option<EntityId>,
    },
    /// This character landed a killing blow
    Deathblow {
        /// Who died
        target: EntityId,
    },
    /// A skill improved through use
    SkillImproved {
        /// Skill name
        skill: String,
        /// New base value
        value: f64,
    },
    /// An effect joined the character's effect list
    EffectAdded {
        /// Effect id
        effect: EffectId,
        /// Effect name
        name: String,
    },
    /// An effect left the character's effect list
    EffectRemoved {
        /// Effect id
        effect: EffectId,
        /// Effect name
        name: String,
    },
    /// An effect started running
    EffectActivated {
        /// Effect id
        effect: EffectId,
    },
    /// An effect stopped running
    EffectDeactivated {
        /// Effect id
        effect: EffectId,
    },
    /// An effect's duration was reset by a re-application
    EffectRefreshed {
        /// Effect id
        effect: EffectId,
    },
    /// An effect gained a stack
    EffectStackAdded {
        /// Effect id
        effect: EffectId,
        /// Stack count after the addition
        stacks: u32,
    },
}

impl CharacterEvent {
    /// Returns true if the event is forwarded to the character's effects.
    ///
    /// Effect list membership changes stay at character level so an effect
    /// never reacts to its own insertion or removal.
    #[must_use]
    pub fn is_proxied(&self) -> bool {
        !matches!(self, Self::EffectAdded { .. } | Self::EffectRemoved { .. })
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateTick => "update_tick",
            Self::CombatStart => "combat_start",
            Self::CombatEnd => "combat_end",
            Self::CombatantAdded { .. } => "combatant_added",
            Self::CombatantRemoved { .. } => "combatant_removed",
            Self::Hit { .. } => "hit",
            Self::Damaged { .. } => "damaged",
            Self::Heal { .. } => "heal",
            Self::Healed { .. } => "healed",
            Self::Dodged { .. } => "dodged",
            Self::AttackDodged { .. } => "attack_dodged",
            Self::Blocked { .. } => "blocked",
            Self::AttackBlocked { .. } => "attack_blocked",
            Self::Killed { .. } => "killed",
            Self::Deathblow { .. } => "deathblow",
            Self::SkillImproved { .. } => "skill_improved",
            Self::EffectAdded { .. } => "effect_added",
            Self::EffectRemoved { .. } => "effect_removed",
            Self::EffectActivated { .. } => "effect_activated",
            Self::EffectDeactivated { .. } => "effect_deactivated",
            Self::EffectRefreshed { .. } => "effect_refreshed",
            Self::EffectStackAdded { .. } => "effect_stack_added",
        }
    }
}

/// A character event tagged with the character it was delivered to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Receiving character
    pub entity: EntityId,
    /// The event
    pub event: CharacterEvent,
}

/// Cloneable publishing half of an [`EventBus`].
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: Sender<GameEvent>,
}

impl EventPublisher {
    /// Publishes an event to the bus.
    pub fn publish(&self, event: GameEvent) {
        // Non-blocking send - if full, event is dropped
        let _ = self.sender.try_send(event);
    }
}

/// Event bus for broadcasting events to outer layers.
#[derive(Debug)]
pub struct EventBus {
    /// Publishing handle
    publisher: EventPublisher,
    /// Receiver for collecting events
    receiver: Receiver<GameEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            publisher: EventPublisher { sender },
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: GameEvent) {
        self.publisher.publish(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new handle for publishing events.
    #[must_use]
    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }
}

/// Typed event handler trait.
pub trait EventHandler: Send + Sync {
    /// Handles an event.
    fn handle(&self, event: &GameEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&GameEvent) + Send + Sync,
{
    fn handle(&self, event: &GameEvent) {
        self(event);
    }
}

/// Character-level subscribers, notified in registration order.
#[derive(Clone, Default)]
pub struct Listeners {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl Listeners {
    /// Registers a handler.
    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Delivers an event to every handler.
    pub fn notify(&self, event: &GameEvent) {
        for handler in &self.handlers {
            handler.handle(event);
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_bus_drain() {
        let bus = EventBus::new(4);
        let entity = EntityId::new();
        bus.publish(GameEvent {
            entity,
            event: CharacterEvent::CombatStart,
        });
        bus.publish(GameEvent {
            entity,
            event: CharacterEvent::CombatEnd,
        });
        assert_eq!(bus.pending_count(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, CharacterEvent::CombatEnd);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops() {
        let bus = EventBus::new(1);
        let entity = EntityId::new();
        for _ in 0..3 {
            bus.publish(GameEvent {
                entity,
                event: CharacterEvent::UpdateTick,
            });
        }
        assert_eq!(bus.drain().len(), 1);
    }

    #[test]
    fn test_publisher_feeds_bus() {
        let bus = EventBus::new(4);
        let publisher = bus.publisher();
        publisher.publish(GameEvent {
            entity: EntityId::from_raw(5),
            event: CharacterEvent::CombatStart,
        });
        let events = bus.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity, EntityId::from_raw(5));
    }

    #[test]
    fn test_listeners_receive_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::default();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            listeners.subscribe(Arc::new(move |_: &GameEvent| {
                seen.lock().expect("lock").push(tag);
            }));
        }
        listeners.notify(&GameEvent {
            entity: EntityId::new(),
            event: CharacterEvent::UpdateTick,
        });
        assert_eq!(*seen.lock().expect("lock"), vec!["first", "second"]);
    }

    #[test]
    fn test_proxy_filter() {
        let effect = EffectId::new();
        assert!(!CharacterEvent::EffectAdded {
            effect,
            name: "x".into()
        }
        .is_proxied());
        assert!(CharacterEvent::EffectRefreshed { effect }.is_proxied());
        assert!(CharacterEvent::UpdateTick.is_proxied());
    }

    #[test]
    fn test_event_json_tag() {
        let json = serde_json::to_value(CharacterEvent::Dodged {
            attacker: EntityId::from_raw(3),
        })
        .expect("serialize");
        assert_eq!(json["event"], "dodged");
        assert_eq!(json["attacker"], 3);
    }
}
