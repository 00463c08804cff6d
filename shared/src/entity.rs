//! Synchronized entity records and the top-level arena metadata.

use crate::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type EntityId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityCategory {
    Player,
    Zombie,
    Bullet,
    Powerup,
    Loot,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 5] = [
        EntityCategory::Player,
        EntityCategory::Zombie,
        EntityCategory::Bullet,
        EntityCategory::Powerup,
        EntityCategory::Loot,
    ];
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityCategory::Player => "player",
            EntityCategory::Zombie => "zombie",
            EntityCategory::Bullet => "bullet",
            EntityCategory::Powerup => "powerup",
            EntityCategory::Loot => "loot",
        };
        f.write_str(name)
    }
}

/// Identifies an entity across the wire. Ids are only unique per category.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub category: EntityCategory,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(category: EntityCategory, id: EntityId) -> Self {
        Self { category, id }
    }
}

/// A type-specific attribute value carried alongside the common fields.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f32),
    Bool(bool),
    Text(String),
}

/// The synchronized payload of one entity.
///
/// Entities always travel whole: an update replaces the previous record
/// outright, there is no per-field patch format.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Entity {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub health: f32,
    pub attributes: BTreeMap<String, Scalar>,
}

impl Entity {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            angle: 0.0,
            health: 100.0,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: Scalar) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Scalar> {
        self.attributes.get(name)
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.x = position.x;
        self.y = position.y;
    }
}

/// Axis-aligned obstacle in the arena layout.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Wall {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pushes a circle out of the wall along the shallowest axis.
    pub fn push_out(&self, center: Vec2, radius: f32) -> Vec2 {
        let right = self.x + self.width;
        let bottom = self.y + self.height;

        let closest = Vec2::new(center.x.clamp(self.x, right), center.y.clamp(self.y, bottom));
        let offset = center - closest;
        let distance = offset.length();

        if distance > 0.0 {
            if distance >= radius {
                return center;
            }
            return closest + offset.scale(radius / distance);
        }

        // Center is inside the rectangle
        let escapes = [
            (center.x - self.x + radius, Vec2::new(self.x - radius, center.y)),
            (right - center.x + radius, Vec2::new(right + radius, center.y)),
            (center.y - self.y + radius, Vec2::new(center.x, self.y - radius)),
            (bottom - center.y + radius, Vec2::new(center.x, bottom + radius)),
        ];

        escapes
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, position)| *position)
            .unwrap_or(center)
    }
}

/// Top-level scalar state broadcast next to the entity graph.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Meta {
    pub wave: u32,
    pub walls: Vec<Wall>,
    pub current_room: u32,
    pub boss_present: bool,
}
