//! Performance profiles selecting simulation and network cadence
//!
//! A profile is resolved once at process start and then handed to the
//! scheduler by value. Presets:
//!
//! - `low`: constrained hardware (single-board computers, tiny VPS). Slow
//!   cadence, small caps, periodic memory compaction.
//! - `balanced`: the default when nothing or an unknown name is requested.
//! - `high`: dedicated hosts with headroom for more entities.

use log::warn;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROFILE: ProfileName = ProfileName::Balanced;

/// Fastest accepted simulation rate; the tick interval must stay non-zero.
pub const MAX_TICK_RATE: u32 = 1000;
/// Slowest accepted network rate. Below this the keep-alive refresh cannot
/// reach every entity inside the client's one second orphan sweep.
pub const MIN_BROADCAST_RATE: u32 = 2;

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("tick rate must be greater than zero")]
    ZeroTickRate,
    #[error("tick rate {0} exceeds the maximum of {MAX_TICK_RATE}")]
    TickRateTooHigh(u32),
    #[error("broadcast rate must be greater than zero")]
    ZeroBroadcastRate,
    #[error("broadcast rate {0} is below the minimum of {MIN_BROADCAST_RATE}")]
    BroadcastTooSlow(u32),
    #[error("broadcast rate {broadcast_rate} exceeds tick rate {tick_rate}")]
    BroadcastFasterThanTick { tick_rate: u32, broadcast_rate: u32 },
    #[error("pathfinding rate must be greater than zero")]
    ZeroPathfindingRate,
    #[error("{0} capacity must be greater than zero")]
    ZeroCapacity(&'static str),
    #[error("spawn multiplier must be positive, got {0}")]
    InvalidSpawnMultiplier(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileName {
    Low,
    Balanced,
    High,
}

impl FromStr for ProfileName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "raspberry" | "constrained" => Ok(ProfileName::Low),
            "balanced" | "default" => Ok(ProfileName::Balanced),
            "high" | "performance" => Ok(ProfileName::High),
            other => Err(format!("unknown performance profile '{}'", other)),
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileName::Low => "low",
            ProfileName::Balanced => "balanced",
            ProfileName::High => "high",
        };
        f.write_str(name)
    }
}

/// Immutable cadence and capacity settings for one server process.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceProfile {
    pub name: ProfileName,
    /// Simulation steps per second.
    pub tick_rate: u32,
    /// Network updates per second, at most `tick_rate`.
    pub broadcast_rate: u32,
    pub max_players: usize,
    pub max_zombies: usize,
    pub max_powerups: usize,
    /// Scales how often zombies spawn, never how many may exist.
    pub spawn_multiplier: f32,
    /// Pathfinding is recomputed every this many ticks.
    pub pathfinding_rate: u64,
    /// Memory compaction hint interval; `None` disables it.
    pub gc_interval_ms: Option<u64>,
}

impl PerformanceProfile {
    pub fn low() -> Self {
        Self {
            name: ProfileName::Low,
            tick_rate: 20,
            broadcast_rate: 10,
            max_players: 4,
            max_zombies: 50,
            max_powerups: 5,
            spawn_multiplier: 0.5,
            pathfinding_rate: 6,
            gc_interval_ms: Some(30_000),
        }
    }

    pub fn balanced() -> Self {
        Self {
            name: ProfileName::Balanced,
            tick_rate: 45,
            broadcast_rate: 45,
            max_players: 8,
            max_zombies: 150,
            max_powerups: 10,
            spawn_multiplier: 1.0,
            pathfinding_rate: 3,
            gc_interval_ms: None,
        }
    }

    pub fn high() -> Self {
        Self {
            name: ProfileName::High,
            tick_rate: 60,
            broadcast_rate: 30,
            max_players: 16,
            max_zombies: 300,
            max_powerups: 20,
            spawn_multiplier: 1.5,
            pathfinding_rate: 2,
            gc_interval_ms: None,
        }
    }

    pub fn preset(name: ProfileName) -> Self {
        match name {
            ProfileName::Low => Self::low(),
            ProfileName::Balanced => Self::balanced(),
            ProfileName::High => Self::high(),
        }
    }

    /// Resolves a requested profile name, falling back to `balanced`.
    pub fn resolve(requested: Option<&str>) -> Self {
        let Some(requested) = requested else {
            return Self::preset(DEFAULT_PROFILE);
        };

        match requested.parse::<ProfileName>() {
            Ok(name) => Self::preset(name),
            Err(e) => {
                warn!("{}, falling back to '{}'", e, DEFAULT_PROFILE);
                Self::preset(DEFAULT_PROFILE)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.tick_rate == 0 {
            return Err(ProfileError::ZeroTickRate);
        }
        if self.tick_rate > MAX_TICK_RATE {
            return Err(ProfileError::TickRateTooHigh(self.tick_rate));
        }
        if self.broadcast_rate == 0 {
            return Err(ProfileError::ZeroBroadcastRate);
        }
        if self.broadcast_rate < MIN_BROADCAST_RATE {
            return Err(ProfileError::BroadcastTooSlow(self.broadcast_rate));
        }
        if self.broadcast_rate > self.tick_rate {
            return Err(ProfileError::BroadcastFasterThanTick {
                tick_rate: self.tick_rate,
                broadcast_rate: self.broadcast_rate,
            });
        }
        if self.pathfinding_rate == 0 {
            return Err(ProfileError::ZeroPathfindingRate);
        }
        if self.max_players == 0 {
            return Err(ProfileError::ZeroCapacity("player"));
        }
        if self.max_zombies == 0 {
            return Err(ProfileError::ZeroCapacity("zombie"));
        }
        if self.max_powerups == 0 {
            return Err(ProfileError::ZeroCapacity("powerup"));
        }
        if self.spawn_multiplier.is_nan() || self.spawn_multiplier <= 0.0 {
            return Err(ProfileError::InvalidSpawnMultiplier(self.spawn_multiplier));
        }
        Ok(())
    }

    pub fn gc_interval(&self) -> Option<Duration> {
        self.gc_interval_ms.map(Duration::from_millis)
    }
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self::preset(DEFAULT_PROFILE)
    }
}
