//! Dead reckoning for entities the client does not control
//!
//! Authoritative positions arrive once per broadcast. Between them each
//! remote entity is extrapolated along its estimated velocity and the drawn
//! position is eased toward that guess. When updates stop arriving for too
//! long the entity is pinned to its last known position instead of drifting.

use crate::table::EntityTable;
use shared::{Delta, EntityKey, Snapshot, Vec2};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const INTERPOLATION_DELAY: Duration = Duration::from_millis(100);
/// No update for this long and extrapolation stops.
pub const STALL_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
struct Track {
    current: Vec2,
    target: Vec2,
    /// Pixels per second.
    velocity: Vec2,
    last_update: Instant,
}

#[derive(Debug)]
pub struct Interpolator {
    tracks: HashMap<EntityKey, Track>,
    delay: Duration,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::with_delay(INTERPOLATION_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            tracks: HashMap::new(),
            delay,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Records a fresh authoritative position for `key`.
    pub fn observe(&mut self, key: EntityKey, position: Vec2, now: Instant) {
        match self.tracks.get_mut(&key) {
            Some(track) => {
                let elapsed = now.saturating_duration_since(track.last_update).as_secs_f32();
                if elapsed > 0.0 {
                    track.velocity = (position - track.target).scale(1.0 / elapsed);
                }
                track.target = position;
                track.last_update = now;
            }
            None => {
                self.tracks.insert(
                    key,
                    Track {
                        current: position,
                        target: position,
                        velocity: Vec2::ZERO,
                        last_update: now,
                    },
                );
            }
        }
    }

    /// Observes every entity in a snapshot except `skip`.
    pub fn observe_snapshot(&mut self, snapshot: &Snapshot, skip: Option<EntityKey>, now: Instant) {
        for (category, entities) in &snapshot.entities {
            for (id, entity) in entities {
                let key = EntityKey::new(*category, *id);
                if Some(key) != skip {
                    self.observe(key, entity.position(), now);
                }
            }
        }
    }

    /// Observes every updated entity in a delta except `skip`, and forgets removed ones.
    pub fn observe_delta(&mut self, delta: &Delta, skip: Option<EntityKey>, now: Instant) {
        for (category, ids) in &delta.removed {
            for id in ids {
                self.tracks.remove(&EntityKey::new(*category, *id));
            }
        }

        for (category, entities) in &delta.updated {
            for (id, entity) in entities {
                let key = EntityKey::new(*category, *id);
                if Some(key) != skip {
                    self.observe(key, entity.position(), now);
                }
            }
        }
    }

    /// Advances every tracked entity to its position for this frame.
    pub fn advance(&mut self, now: Instant) {
        let delay = self.delay.as_secs_f32();

        for track in self.tracks.values_mut() {
            let elapsed = now.saturating_duration_since(track.last_update);

            if elapsed >= STALL_THRESHOLD {
                track.current = track.target;
                continue;
            }

            let elapsed = elapsed.as_secs_f32();
            let predicted = track.target + track.velocity.scale(elapsed);
            let factor = if delay > 0.0 {
                (elapsed / delay).min(1.0)
            } else {
                1.0
            };
            track.current = track.current.lerp(predicted, factor);
        }
    }

    pub fn render_position(&self, key: EntityKey) -> Option<Vec2> {
        self.tracks.get(&key).map(|track| track.current)
    }

    pub fn velocity(&self, key: EntityKey) -> Option<Vec2> {
        self.tracks.get(&key).map(|track| track.velocity)
    }

    pub fn remove(&mut self, key: EntityKey) {
        self.tracks.remove(&key);
    }

    /// Forgets entities that are no longer in the reconciled table.
    pub fn retain_present(&mut self, table: &EntityTable) {
        self.tracks.retain(|key, _| table.contains(*key));
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Entity, EntityCategory, EntityMap, Meta};

    fn zombie(id: u32) -> EntityKey {
        EntityKey::new(EntityCategory::Zombie, id)
    }

    #[test]
    fn test_first_sighting_starts_at_target() {
        let now = Instant::now();
        let mut interpolator = Interpolator::new();
        interpolator.observe(zombie(1), Vec2::new(10.0, 20.0), now);

        assert_eq!(interpolator.render_position(zombie(1)), Some(Vec2::new(10.0, 20.0)));
        assert_eq!(interpolator.velocity(zombie(1)), Some(Vec2::ZERO));
    }

    #[test]
    fn test_velocity_estimated_from_consecutive_targets() {
        let t0 = Instant::now();
        let mut interpolator = Interpolator::new();
        interpolator.observe(zombie(1), Vec2::new(0.0, 0.0), t0);
        interpolator.observe(zombie(1), Vec2::new(5.0, -10.0), t0 + Duration::from_millis(500));

        let velocity = interpolator.velocity(zombie(1)).unwrap();
        assert_approx_eq!(velocity.x, 10.0, 0.001);
        assert_approx_eq!(velocity.y, -20.0, 0.001);
    }

    #[test]
    fn test_same_instant_keeps_previous_velocity() {
        let t0 = Instant::now();
        let mut interpolator = Interpolator::new();
        interpolator.observe(zombie(1), Vec2::new(0.0, 0.0), t0);
        interpolator.observe(zombie(1), Vec2::new(10.0, 0.0), t0 + Duration::from_secs(1));
        interpolator.observe(zombie(1), Vec2::new(99.0, 0.0), t0 + Duration::from_secs(1));

        assert_eq!(interpolator.velocity(zombie(1)), Some(Vec2::new(10.0, 0.0)));
    }

    #[test]
    fn test_partial_blend_before_delay_elapses() {
        let t0 = Instant::now();
        let mut interpolator = Interpolator::new();
        interpolator.observe(zombie(1), Vec2::new(0.0, 0.0), t0);
        interpolator.observe(zombie(1), Vec2::new(100.0, 0.0), t0 + Duration::from_millis(1));

        // Velocity is huge but only 50 ms have passed: halfway to the prediction
        interpolator.advance(t0 + Duration::from_millis(51));
        let position = interpolator.render_position(zombie(1)).unwrap();
        let predicted = 100.0 + 100_000.0 * 0.05;
        assert_approx_eq!(position.x, predicted * 0.5, 1.0);
    }

    #[test]
    fn test_stall_snaps_to_target() {
        let t0 = Instant::now();
        let mut interpolator = Interpolator::new();
        interpolator.observe(zombie(1), Vec2::new(0.0, 0.0), t0);
        interpolator.observe(zombie(1), Vec2::new(50.0, 0.0), t0 + Duration::from_millis(100));

        interpolator.advance(t0 + Duration::from_millis(700));
        assert_eq!(interpolator.render_position(zombie(1)), Some(Vec2::new(50.0, 0.0)));
    }

    #[test]
    fn test_observe_snapshot_skips_local_player() {
        let mut entities = EntityMap::new();
        entities
            .entry(EntityCategory::Player)
            .or_default()
            .insert(1, Entity::new(0.0, 0.0));
        entities
            .entry(EntityCategory::Zombie)
            .or_default()
            .insert(1, Entity::new(5.0, 5.0));
        let snapshot = Snapshot {
            tick: 1,
            entities,
            meta: Meta::default(),
        };

        let mut interpolator = Interpolator::new();
        let local = EntityKey::new(EntityCategory::Player, 1);
        interpolator.observe_snapshot(&snapshot, Some(local), Instant::now());

        assert_eq!(interpolator.len(), 1);
        assert!(interpolator.render_position(local).is_none());
    }

    #[test]
    fn test_observe_delta_forgets_removed() {
        let now = Instant::now();
        let mut interpolator = Interpolator::new();
        interpolator.observe(zombie(1), Vec2::ZERO, now);
        interpolator.observe(zombie(2), Vec2::ZERO, now);

        let mut delta = Delta::new(2);
        delta.insert_removed(zombie(1));
        interpolator.observe_delta(&delta, None, now);

        assert!(interpolator.render_position(zombie(1)).is_none());
        assert!(interpolator.render_position(zombie(2)).is_some());
    }

    #[test]
    fn test_retain_present_drops_missing() {
        let now = Instant::now();
        let mut interpolator = Interpolator::new();
        interpolator.observe(zombie(1), Vec2::ZERO, now);

        interpolator.retain_present(&EntityTable::new());
        assert!(interpolator.is_empty());
    }
}
