//! Snapshot and delta construction for the outgoing state stream
//!
//! The broadcaster remembers what the world looked like at the previous
//! broadcast and diffs the current world against it by value. Anything new
//! or different goes out as a whole record, anything gone goes out as an id,
//! and categories without changes are left out.
//!
//! There is no acknowledgment. A lost delta heals on its own because the
//! next one carries the latest record of every entity that changed. Lost
//! removals are caught by the client's orphan sweep, which is also why
//! unchanged entities are re-sent on a staggered keep-alive schedule: the
//! client must hear about every live entity well within one sweep interval.

use crate::game::World;
use crate::profile::PerformanceProfile;
use shared::{Delta, EntityKey, EntityMap, Meta, MetaDelta, Snapshot};

/// Longest an unchanged entity goes without being re-sent, in seconds.
const REFRESH_WINDOW_SECS: f64 = 0.5;

#[derive(Debug)]
pub struct StateBroadcaster {
    baseline: EntityMap,
    baseline_meta: Meta,
    broadcast_count: u64,
    refresh_every: u64,
}

impl StateBroadcaster {
    /// Every unchanged entity is re-sent once per `refresh_every` broadcasts.
    pub fn new(refresh_every: u64) -> Self {
        Self {
            baseline: EntityMap::new(),
            baseline_meta: Meta::default(),
            broadcast_count: 0,
            refresh_every: refresh_every.max(1),
        }
    }

    pub fn for_profile(profile: &PerformanceProfile) -> Self {
        Self::new(Self::refresh_every_for(profile))
    }

    fn refresh_every_for(profile: &PerformanceProfile) -> u64 {
        (profile.broadcast_rate as f64 * REFRESH_WINDOW_SECS).ceil() as u64
    }

    pub fn reload(&mut self, profile: &PerformanceProfile) {
        self.refresh_every = Self::refresh_every_for(profile).max(1);
    }

    pub fn refresh_every(&self) -> u64 {
        self.refresh_every
    }

    pub fn broadcast_count(&self) -> u64 {
        self.broadcast_count
    }

    /// Full state for a client that just connected or reconnected.
    pub fn snapshot(&self, world: &World) -> Snapshot {
        world.snapshot()
    }

    /// Diffs the world against the previous broadcast and advances the baseline.
    pub fn next_delta(&mut self, world: &World) -> Delta {
        let mut delta = Delta::new(world.tick);
        let current = world.entities();

        for (category, entities) in current {
            let previous = self.baseline.get(category);

            for (id, entity) in entities {
                let key = EntityKey::new(*category, *id);
                let changed = previous.and_then(|table| table.get(id)) != Some(entity);

                if changed || self.refresh_due(*id) {
                    delta.insert_updated(key, entity.clone());
                }
            }
        }

        for (category, entities) in &self.baseline {
            let still_alive = current.get(category);
            let mut gone: Vec<_> = entities
                .keys()
                .filter(|id| !still_alive.is_some_and(|table| table.contains_key(*id)))
                .copied()
                .collect();

            if !gone.is_empty() {
                gone.sort_unstable();
                delta.removed.insert(*category, gone);
            }
        }

        delta.meta = MetaDelta::between(&self.baseline_meta, &world.meta);

        self.baseline = current.clone();
        self.baseline_meta = world.meta.clone();
        self.broadcast_count += 1;

        delta
    }

    fn refresh_due(&self, id: u32) -> bool {
        (id as u64 + self.broadcast_count) % self.refresh_every == 0
    }

    pub fn compact(&mut self) {
        for table in self.baseline.values_mut() {
            table.shrink_to_fit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Entity, EntityCategory, Wall};

    // Large enough that keep-alive never fires inside a short test
    const NO_REFRESH: u64 = 1_000_000;

    fn zombie(id: u32) -> EntityKey {
        EntityKey::new(EntityCategory::Zombie, id)
    }

    fn world_with_zombies(count: u32) -> World {
        let mut world = World::new();
        for i in 0..count {
            world.spawn(EntityCategory::Zombie, Entity::new(i as f32 * 10.0, 50.0));
        }
        world
    }

    #[test]
    fn test_first_delta_contains_everything() {
        let world = world_with_zombies(3);
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);

        let delta = broadcaster.next_delta(&world);
        assert_eq!(delta.updated[&EntityCategory::Zombie].len(), 3);
        assert!(delta.removed.is_empty());
        assert_eq!(delta.meta.wave, Some(1));
        assert!(delta.meta.walls.is_some());
    }

    #[test]
    fn test_unchanged_world_yields_empty_delta() {
        let world = world_with_zombies(3);
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);

        broadcaster.next_delta(&world);
        let delta = broadcaster.next_delta(&world);

        assert!(delta.is_empty());
        assert!(delta.updated.is_empty());
    }

    #[test]
    fn test_changed_entity_sent_whole() {
        let mut world = world_with_zombies(3);
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);
        broadcaster.next_delta(&world);

        world.get_mut(zombie(2)).unwrap().health = 40.0;
        let delta = broadcaster.next_delta(&world);

        let zombies = &delta.updated[&EntityCategory::Zombie];
        assert_eq!(zombies.len(), 1);
        assert_eq!(zombies[&2], *world.get(zombie(2)).unwrap());
    }

    #[test]
    fn test_removed_entity_listed_by_id() {
        let mut world = world_with_zombies(3);
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);
        broadcaster.next_delta(&world);

        world.despawn(zombie(1));
        world.despawn(zombie(3));
        let delta = broadcaster.next_delta(&world);

        assert_eq!(delta.removed[&EntityCategory::Zombie], vec![1, 3]);
        assert!(delta.updated.is_empty());
        assert!(delta.validate().is_ok());
    }

    #[test]
    fn test_untouched_category_omitted() {
        let mut world = world_with_zombies(2);
        world.spawn(EntityCategory::Powerup, Entity::new(1.0, 1.0));
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);
        broadcaster.next_delta(&world);

        world.get_mut(zombie(1)).unwrap().x += 5.0;
        let delta = broadcaster.next_delta(&world);

        assert!(delta.updated.contains_key(&EntityCategory::Zombie));
        assert!(!delta.updated.contains_key(&EntityCategory::Powerup));
        assert!(!delta.removed.contains_key(&EntityCategory::Powerup));
    }

    #[test]
    fn test_meta_changes_are_sparse() {
        let mut world = world_with_zombies(0);
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);
        broadcaster.next_delta(&world);

        world.meta.boss_present = true;
        let delta = broadcaster.next_delta(&world);
        assert_eq!(delta.meta.boss_present, Some(true));
        assert!(delta.meta.wave.is_none());
        assert!(delta.meta.walls.is_none());

        world.meta.walls.push(Wall::new(0.0, 0.0, 5.0, 5.0));
        let delta = broadcaster.next_delta(&world);
        assert_eq!(delta.meta.walls.as_ref(), Some(&world.meta.walls));
    }

    #[test]
    fn test_respawned_category_after_full_removal() {
        let mut world = world_with_zombies(1);
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);
        broadcaster.next_delta(&world);

        world.despawn(zombie(1));
        let delta = broadcaster.next_delta(&world);
        assert_eq!(delta.removed[&EntityCategory::Zombie], vec![1]);

        let id = world.spawn(EntityCategory::Zombie, Entity::new(0.0, 0.0));
        let delta = broadcaster.next_delta(&world);
        assert!(delta.updated_entity(zombie(id)).is_some());
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn test_keep_alive_refreshes_every_entity_within_window() {
        let world = world_with_zombies(10);
        let mut broadcaster = StateBroadcaster::new(4);
        broadcaster.next_delta(&world);

        let mut refreshed = std::collections::HashSet::new();
        for _ in 0..4 {
            let delta = broadcaster.next_delta(&world);
            if let Some(zombies) = delta.updated.get(&EntityCategory::Zombie) {
                // Staggered: never the whole table at once
                assert!(zombies.len() < 10);
                refreshed.extend(zombies.keys().copied());
            }
        }

        assert_eq!(refreshed.len(), 10);
    }

    #[test]
    fn test_refresh_window_follows_profile() {
        let balanced = StateBroadcaster::for_profile(&PerformanceProfile::balanced());
        assert_eq!(balanced.refresh_every(), 23);

        let mut broadcaster = StateBroadcaster::for_profile(&PerformanceProfile::low());
        assert_eq!(broadcaster.refresh_every(), 5);

        broadcaster.reload(&PerformanceProfile::high());
        assert_eq!(broadcaster.refresh_every(), 15);
    }

    #[test]
    fn test_broadcast_count_advances() {
        let world = world_with_zombies(1);
        let mut broadcaster = StateBroadcaster::new(NO_REFRESH);
        assert_eq!(broadcaster.broadcast_count(), 0);
        broadcaster.next_delta(&world);
        broadcaster.next_delta(&world);
        assert_eq!(broadcaster.broadcast_count(), 2);
    }
}
