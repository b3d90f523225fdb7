//! Arena: builds a world from the roster and runs it tick by tick.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use ember_common::EntityId;
use ember_gameplay::{
    Character, CharacterEvent, ConfigOverrides, Equipment, EquipmentSlot, FastRng, GameEvent,
    Item, SimContext, World,
};

use crate::config::{CombatantSpec, SimConfig};
use crate::timing::TickClock;

/// Builds a character from its roster entry.
pub fn build_character(spec: &CombatantSpec) -> Result<Character> {
    let mut character = Character::new(spec.name.as_str(), spec.kind);
    for (name, base) in &spec.attributes {
        character = character
            .with_attribute(name.as_str(), *base)
            .with_context(|| format!("{}: attribute {name}", spec.name))?;
    }
    for (name, base) in &spec.skills {
        character = character
            .with_skill(name.as_str(), *base)
            .with_context(|| format!("{}: skill {name}", spec.name))?;
    }

    let mut equipment = Equipment::new();
    if let Some(category) = spec.weapon {
        equipment.equip(EquipmentSlot::Wield, Item::weapon(category.to_string(), category));
    }
    if spec.shield {
        equipment.equip(EquipmentSlot::Offhand, Item::shield("shield"));
    }
    if spec.armor {
        equipment.equip(EquipmentSlot::Body, Item::armor("armor"));
    }
    character.set_pacifist(spec.pacifist);
    Ok(character.with_equipment(equipment))
}

/// Drained bus traffic, counted per event name.
#[derive(Debug, Default)]
pub struct EventLog {
    names: BTreeMap<EntityId, String>,
    counts: BTreeMap<&'static str, u64>,
    verbose: bool,
}

impl EventLog {
    /// Create a log; `verbose` logs every event as it is drained.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// Remember the display name of `id`.
    pub fn register(&mut self, id: EntityId, name: &str) {
        self.names.insert(id, name.to_owned());
    }

    fn name_of(&self, id: EntityId) -> &str {
        self.names.get(&id).map_or("?", String::as_str)
    }

    /// Count and optionally log one event.
    pub fn record(&mut self, message: &GameEvent) {
        let name = message.event.name();
        *self.counts.entry(name).or_insert(0) += 1;
        if !self.verbose {
            return;
        }

        let who = self.name_of(message.entity);
        match &message.event {
            CharacterEvent::Hit { target, report } if !report.hidden => {
                info!(
                    "{who} hits {} for {}{}",
                    self.name_of(*target),
                    report.amount,
                    if report.critical { " (critical)" } else { "" }
                );
            },
            CharacterEvent::AttackDodged { target } => {
                info!("{} dodges {who}", self.name_of(*target));
            },
            CharacterEvent::AttackBlocked { target } => {
                info!("{} blocks {who}", self.name_of(*target));
            },
            CharacterEvent::Killed { killer } => {
                let killer = killer.map_or("something", |id| self.name_of(id));
                info!("{who} was killed by {killer}");
            },
            CharacterEvent::SkillImproved { skill, value } => {
                info!("{who} improves {skill} to {value}");
            },
            CharacterEvent::CombatStart | CharacterEvent::CombatEnd => {
                info!("{who}: {name}");
            },
            event => debug!(entity = %message.entity, ?event, "{name}"),
        }
    }

    /// Count of events with the given name.
    #[must_use]
    pub fn count(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Counts of every event name seen.
    #[must_use]
    pub fn counts(&self) -> &BTreeMap<&'static str, u64> {
        &self.counts
    }
}

/// A running arena.
#[derive(Debug)]
pub struct Arena {
    world: World,
    rng: FastRng,
    clock: TickClock,
    max_ticks: u64,
    roster: BTreeMap<String, EntityId>,
    log: EventLog,
}

impl Arena {
    /// Spawn the roster, apply start-up effects and engage the configured
    /// fights.
    pub fn new(config: &SimConfig) -> Result<Self> {
        let mut world = World::new(config.combat.clone());
        let mut rng = config.seed.map_or_else(FastRng::new, FastRng::with_seed);
        let mut log = EventLog::new(config.log_events);
        let mut roster = BTreeMap::new();

        for spec in &config.roster {
            if roster.contains_key(&spec.name) {
                bail!("duplicate combatant name {}", spec.name);
            }
            let id = world.spawn(build_character(spec)?);
            log.register(id, &spec.name);
            roster.insert(spec.name.clone(), id);
        }

        let combat = world.config_handle();
        let mut ctx = SimContext::new(0, &mut rng, &combat);
        for spec in &config.roster {
            let id = roster[&spec.name];
            for template in &spec.effects {
                let effect = world
                    .factory()
                    .create(template, &ConfigOverrides::default(), None)
                    .with_context(|| format!("{}: effect {template}", spec.name))?;
                if let Some(character) = world.get_mut(id) {
                    character.add_effect(effect, &mut ctx)?;
                }
            }
        }

        for fight in &config.fights {
            let (Some(&attacker), Some(&target)) =
                (roster.get(&fight.attacker), roster.get(&fight.target))
            else {
                bail!("fight {} vs {} names an unknown combatant", fight.attacker, fight.target);
            };
            match world.engage(attacker, target, &mut ctx) {
                Ok(()) => info!("{} engages {}", fight.attacker, fight.target),
                Err(e) => warn!("{} can not engage {}: {e}", fight.attacker, fight.target),
            }
        }

        Ok(Self {
            world,
            rng,
            clock: TickClock::new(config.tick_ms).with_realtime(config.realtime),
            max_ticks: config.max_ticks,
            roster,
            log,
        })
    }

    /// Events drained so far.
    #[must_use]
    #[allow(dead_code)]
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Ticks run so far.
    #[must_use]
    #[allow(dead_code)]
    pub fn ticks(&self) -> u64 {
        self.clock.ticks()
    }

    /// Id of a roster entry, if it is still in the world.
    #[must_use]
    #[allow(dead_code)]
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.roster
            .get(name)
            .copied()
            .filter(|id| self.world.contains(*id))
    }

    /// True once nobody is fighting.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.world
            .ids()
            .into_iter()
            .filter_map(|id| self.world.get(id))
            .all(|character| !character.is_in_combat())
    }

    /// Run one tick and drain the bus.
    pub fn step(&mut self) {
        let now = self.clock.now();
        for (id, err) in self.world.tick(now, &mut self.rng) {
            warn!(entity = %id, "combat error: {err}");
        }
        for message in self.world.bus().drain() {
            self.log.record(&message);
        }
        self.clock.advance();
    }

    /// Run until every fight is over or the tick limit is reached.
    pub fn run(&mut self) {
        while !self.is_settled() {
            if self.max_ticks > 0 && self.clock.ticks() >= self.max_ticks {
                warn!("tick limit {} reached with fights still running", self.max_ticks);
                break;
            }
            self.step();
        }
        info!(
            ticks = self.clock.ticks(),
            simulated_ms = self.clock.now(),
            avg_tick_ms = self.clock.average_tick_time_ms(),
            "arena settled"
        );
    }

    /// Log the survivors and event totals.
    pub fn report(&self) {
        for (name, id) in &self.roster {
            match self.world.get(*id) {
                Some(character) => {
                    let now = self.clock.now();
                    info!(
                        "{name}: health {}/{}",
                        character.attribute_or_zero("health", now),
                        character.max_attribute("health", now).unwrap_or(0.0)
                    );
                },
                None => info!("{name}: gone"),
            }
        }
        info!(
            hits = self.log.count("hit"),
            dodges = self.log.count("dodged"),
            blocks = self.log.count("blocked"),
            kills = self.log.count("killed"),
            "fight totals"
        );
        for (event, count) in self.log.counts() {
            debug!("{event}: {count}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FightSpec;
    use ember_gameplay::{CharacterKind, WeaponCategory};

    fn spec(name: &str, kind: CharacterKind, health: f64) -> CombatantSpec {
        CombatantSpec {
            name: name.into(),
            kind,
            attributes: BTreeMap::from([
                ("health".into(), health),
                ("brawn".into(), 10.0),
                ("reflexes".into(), 10.0),
            ]),
            ..CombatantSpec::default()
        }
    }

    fn duel(max_ticks: u64) -> SimConfig {
        SimConfig {
            seed: Some(7),
            max_ticks,
            log_events: false,
            roster: vec![
                spec("hero", CharacterKind::Player, 200.0),
                spec("rat", CharacterKind::Npc, 10.0),
            ],
            fights: vec![FightSpec {
                attacker: "hero".into(),
                target: "rat".into(),
            }],
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_build_character_equips_items() {
        let mut spec = spec("guard", CharacterKind::Npc, 50.0);
        spec.weapon = Some(WeaponCategory::Polearm);
        spec.shield = true;
        spec.pacifist = true;

        let guard = build_character(&spec).expect("build");
        assert_eq!(guard.weapon_category(), WeaponCategory::Polearm);
        assert!(guard.has_shield());
        assert!(guard.is_pacifist());
        assert_eq!(guard.attribute_base("health"), Ok(50.0));
    }

    #[test]
    fn test_npc_dies_and_arena_settles() {
        let mut arena = Arena::new(&duel(10_000)).expect("arena");
        assert!(!arena.is_settled());

        arena.run();
        assert!(arena.is_settled());
        assert!(arena.lookup("hero").is_some());
        assert!(arena.lookup("rat").is_none());
        assert_eq!(arena.log().count("killed"), 1);
        assert_eq!(arena.log().count("deathblow"), 1);
    }

    #[test]
    fn test_tick_limit_stops_run() {
        let mut config = duel(3);
        config.roster[1].attributes.insert("health".into(), 1_000_000.0);
        let mut arena = Arena::new(&config).expect("arena");

        arena.run();
        assert_eq!(arena.ticks(), 3);
        assert!(!arena.is_settled());
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let mut config = duel(1);
        config.fights[0].target = "ghost".into();
        assert!(Arena::new(&config).is_err());

        let mut config = duel(1);
        config.roster[0].effects = vec!["no-such-effect".into()];
        assert!(Arena::new(&config).is_err());
    }

    #[test]
    fn test_refused_fight_is_skipped() {
        let mut config = duel(1);
        config.roster[1].pacifist = true;
        let arena = Arena::new(&config).expect("arena");
        assert!(arena.is_settled());
    }
}
