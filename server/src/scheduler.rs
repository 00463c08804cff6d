//! Tick cadence, broadcast cadence and spawn admission control
//!
//! The scheduler decouples three rates that would otherwise be tied to the
//! simulation step: how often state goes out on the wire, how often
//! pathfinding is recomputed, and how often memory is compacted. It also
//! owns the capacity gates the spawn logic consults before creating
//! entities. A refused spawn is not an error; the caller simply skips it.

use crate::profile::{PerformanceProfile, MAX_TICK_RATE};
use log::info;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TickScheduler {
    profile: PerformanceProfile,
    broadcast_every: u64,
    last_compaction: Instant,
}

impl TickScheduler {
    pub fn new(profile: PerformanceProfile) -> Self {
        Self {
            broadcast_every: Self::broadcast_stride(&profile),
            profile,
            last_compaction: Instant::now(),
        }
    }

    fn broadcast_stride(profile: &PerformanceProfile) -> u64 {
        let tick_rate = profile.tick_rate.max(1);
        let broadcast_rate = profile.broadcast_rate.max(1);
        (tick_rate.div_ceil(broadcast_rate) as u64).max(1)
    }

    pub fn profile(&self) -> &PerformanceProfile {
        &self.profile
    }

    /// Swaps in a new profile. Callers must only do this between ticks.
    pub fn reload(&mut self, profile: PerformanceProfile) {
        info!(
            "Switching performance profile {} -> {} ({} Hz sim, {} Hz net)",
            self.profile.name, profile.name, profile.tick_rate, profile.broadcast_rate
        );
        self.broadcast_every = Self::broadcast_stride(&profile);
        self.profile = profile;
    }

    /// Milliseconds between simulation steps.
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.profile.tick_rate.max(1) as f64
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.profile.tick_rate.clamp(1, MAX_TICK_RATE) as u64)
    }

    /// Number of ticks between two broadcasts.
    pub fn broadcast_every(&self) -> u64 {
        self.broadcast_every
    }

    pub fn should_broadcast(&self, tick: u64) -> bool {
        tick % self.broadcast_every == 0
    }

    pub fn should_update_pathfinding(&self, tick: u64) -> bool {
        tick % self.profile.pathfinding_rate.max(1) == 0
    }

    pub fn can_spawn_zombie(&self, current_count: usize) -> bool {
        current_count < self.profile.max_zombies
    }

    pub fn can_spawn_player(&self, current_count: usize) -> bool {
        current_count < self.profile.max_players
    }

    pub fn can_spawn_powerup(&self, current_count: usize) -> bool {
        current_count < self.profile.max_powerups
    }

    pub fn spawn_multiplier(&self) -> f32 {
        self.profile.spawn_multiplier
    }

    /// Returns true when the memory compaction hint is due.
    ///
    /// Profiles without an interval never fire.
    pub fn compaction_due(&mut self, now: Instant) -> bool {
        let Some(interval) = self.profile.gc_interval() else {
            return false;
        };

        if now.saturating_duration_since(self.last_compaction) >= interval {
            self.last_compaction = now;
            true
        } else {
            false
        }
    }
}
