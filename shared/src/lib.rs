//! Types and rules shared by the authoritative server and its clients.
//!
//! Both sides must agree on the wire format and on how a player's movement
//! input turns into a new position, otherwise client prediction drifts from
//! the server on every frame. Everything that has to be identical on both
//! ends of the connection lives here.

pub mod entity;
pub mod protocol;

pub use entity::{Entity, EntityCategory, EntityId, EntityKey, Meta, Scalar, Wall};
pub use protocol::{
    decode_packet, encode_packet, Delta, EntityMap, MetaDelta, Packet, ProtocolError, Snapshot,
    REASON_SERVER_FULL, REASON_VERSION_MISMATCH,
};

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const ARENA_WIDTH: f32 = 1600.0;
pub const ARENA_HEIGHT: f32 = 1200.0;
pub const PLAYER_SPEED: f32 = 220.0;
pub const PLAYER_RADIUS: f32 = 16.0;
pub const ZOMBIE_RADIUS: f32 = 18.0;

/// Simulated time covered by one movement input, on both client and server.
pub const INPUT_DT: f32 = 1.0 / 60.0;

/// Largest datagram either side will try to read.
pub const MAX_PACKET_SIZE: usize = 65_507;

/// A point or direction on the arena plane, in pixels.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (other - *self).length()
    }

    pub fn normalize(&self) -> Vec2 {
        let len = self.length();
        if len == 0.0 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn scale(&self, factor: f32) -> Vec2 {
        Vec2::new(self.x * factor, self.y * factor)
    }

    /// Moves `t` of the way from `self` toward `target`.
    pub fn lerp(&self, target: Vec2, t: f32) -> Vec2 {
        *self + (target - *self).scale(t)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// One sampled movement command from a client.
#[derive(Debug, Clone, PartialEq)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub move_x: f32,
    pub move_y: f32,
    pub angle: f32,
}

impl InputState {
    pub fn direction(&self) -> Vec2 {
        Vec2::new(self.move_x, self.move_y)
    }
}

/// Advances a player position by one movement input.
///
/// Direction vectors longer than one are capped to unit length so a
/// modified client cannot move faster than `PLAYER_SPEED`.
pub fn step_movement(position: Vec2, direction: Vec2, dt: f32) -> Vec2 {
    let direction = if direction.length() > 1.0 {
        direction.normalize()
    } else {
        direction
    };
    position + direction.scale(PLAYER_SPEED * dt)
}

/// Keeps a circle of `radius` inside the arena and outside every wall.
pub fn constrain_position(position: Vec2, radius: f32, walls: &[Wall]) -> Vec2 {
    let mut resolved = Vec2::new(
        position.x.clamp(radius, ARENA_WIDTH - radius),
        position.y.clamp(radius, ARENA_HEIGHT - radius),
    );

    for wall in walls {
        resolved = wall.push_out(resolved, radius);
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec2_distance() {
        let a = Vec2::new(100.0, 200.0);
        let b = Vec2::new(105.0, 205.0);
        assert_approx_eq!(a.distance(b), 7.0710678, 0.0001);
        assert_approx_eq!(b.distance(a), a.distance(b), 0.0001);
    }

    #[test]
    fn test_vec2_lerp_halfway() {
        let from = Vec2::new(40.0, 40.0);
        let to = Vec2::new(50.0, 50.0);
        let mid = from.lerp(to, 0.5);
        assert_approx_eq!(mid.x, 45.0, 0.0001);
        assert_approx_eq!(mid.y, 45.0, 0.0001);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_step_movement_caps_speed() {
        let start = Vec2::new(500.0, 500.0);
        let dt = 1.0 / 60.0;

        let honest = step_movement(start, Vec2::new(1.0, 0.0), dt);
        let boosted = step_movement(start, Vec2::new(50.0, 0.0), dt);

        assert_approx_eq!(honest.x, boosted.x, 0.0001);
        assert_approx_eq!(honest.x - start.x, PLAYER_SPEED * dt, 0.0001);
    }

    #[test]
    fn test_step_movement_partial_stick() {
        let start = Vec2::new(500.0, 500.0);
        let moved = step_movement(start, Vec2::new(0.5, 0.0), 1.0);
        assert_approx_eq!(moved.x, 500.0 + PLAYER_SPEED * 0.5, 0.001);
    }

    #[test]
    fn test_constrain_position_arena_bounds() {
        let outside = Vec2::new(-50.0, ARENA_HEIGHT + 50.0);
        let resolved = constrain_position(outside, PLAYER_RADIUS, &[]);
        assert_eq!(resolved.x, PLAYER_RADIUS);
        assert_eq!(resolved.y, ARENA_HEIGHT - PLAYER_RADIUS);
    }

    #[test]
    fn test_constrain_position_inside_untouched() {
        let inside = Vec2::new(300.0, 300.0);
        assert_eq!(constrain_position(inside, PLAYER_RADIUS, &[]), inside);
    }

    #[test]
    fn test_constrain_position_wall() {
        let wall = Wall::new(100.0, 100.0, 100.0, 100.0);
        let resolved = constrain_position(Vec2::new(105.0, 150.0), 10.0, &[wall]);
        assert!(resolved.x <= 90.0 + 0.001);
        assert_approx_eq!(resolved.y, 150.0, 0.001);
    }
}
