//! Wire messages exchanged between the server and its clients.
//!
//! The server sends one [`Snapshot`] when a client (re)connects and a
//! sparse [`Delta`] on every broadcast tick after that. Both carry whole
//! entity records, so applying an update is always a plain replacement.

use crate::entity::{Entity, EntityCategory, EntityId, EntityKey, Meta, Wall};
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Entities grouped by category, then by id.
pub type EntityMap = BTreeMap<EntityCategory, HashMap<EntityId, Entity>>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("delta lists {category} {id} as both updated and removed")]
    ConflictingEntry {
        category: EntityCategory,
        id: EntityId,
    },

    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),
}

/// `Disconnected` reason for a client speaking another protocol version.
///
/// Retrying cannot help, so clients stop reconnecting when they see it.
pub const REASON_VERSION_MISMATCH: &str = "Protocol version mismatch";
/// `Disconnected` reason when the player cap is reached.
pub const REASON_SERVER_FULL: &str = "Server full";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        move_x: f32,
        move_y: f32,
        angle: f32,
    },
    Disconnect,

    /// The player's entity id equals `client_id` in the player category.
    Connected {
        client_id: u32,
    },
    Snapshot(Snapshot),
    Delta(Delta),
    PositionCorrection {
        x: f32,
        y: f32,
    },
    Disconnected {
        reason: String,
    },
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    serialize(packet).map_err(ProtocolError::Encode)
}

pub fn decode_packet(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    deserialize(bytes).map_err(ProtocolError::Decode)
}

/// Full entity graph plus metadata, sent on connect and reconnect.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub tick: u64,
    pub entities: EntityMap,
    pub meta: Meta,
}

impl Snapshot {
    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(&key.category)?.get(&key.id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.values().map(HashMap::len).sum()
    }
}

/// Sparse subset of the top-level metadata; `None` means unchanged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct MetaDelta {
    pub wave: Option<u32>,
    pub walls: Option<Vec<Wall>>,
    pub current_room: Option<u32>,
    pub boss_present: Option<bool>,
}

impl MetaDelta {
    /// Collects every field that differs between two metadata values.
    pub fn between(previous: &Meta, current: &Meta) -> Self {
        Self {
            wave: (previous.wave != current.wave).then_some(current.wave),
            walls: (previous.walls != current.walls).then(|| current.walls.clone()),
            current_room: (previous.current_room != current.current_room)
                .then_some(current.current_room),
            boss_present: (previous.boss_present != current.boss_present)
                .then_some(current.boss_present),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wave.is_none()
            && self.walls.is_none()
            && self.current_room.is_none()
            && self.boss_present.is_none()
    }

    pub fn apply_to(&self, meta: &mut Meta) {
        if let Some(wave) = self.wave {
            meta.wave = wave;
        }
        if let Some(walls) = &self.walls {
            meta.walls = walls.clone();
        }
        if let Some(room) = self.current_room {
            meta.current_room = room;
        }
        if let Some(boss) = self.boss_present {
            meta.boss_present = boss;
        }
    }
}

/// Changes since the previous broadcast.
///
/// Categories without changes are left out of both maps. An id must never
/// appear in `updated` and `removed` for the same category; see
/// [`Delta::validate`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Delta {
    pub tick: u64,
    pub updated: EntityMap,
    pub removed: BTreeMap<EntityCategory, Vec<EntityId>>,
    pub meta: MetaDelta,
}

impl Delta {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }

    pub fn insert_updated(&mut self, key: EntityKey, entity: Entity) {
        self.updated
            .entry(key.category)
            .or_default()
            .insert(key.id, entity);
    }

    pub fn insert_removed(&mut self, key: EntityKey) {
        self.removed.entry(key.category).or_default().push(key.id);
    }

    pub fn updated_entity(&self, key: EntityKey) -> Option<&Entity> {
        self.updated.get(&key.category)?.get(&key.id)
    }

    pub fn is_removed(&self, key: EntityKey) -> bool {
        self.removed
            .get(&key.category)
            .is_some_and(|ids| ids.contains(&key.id))
    }

    pub fn is_empty(&self) -> bool {
        self.updated.values().all(HashMap::is_empty)
            && self.removed.values().all(Vec::is_empty)
            && self.meta.is_empty()
    }

    /// Rejects a delta that both updates and removes the same entity.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        for (category, ids) in &self.removed {
            let Some(updated) = self.updated.get(category) else {
                continue;
            };
            if let Some(id) = ids.iter().find(|id| updated.contains_key(id)) {
                return Err(ProtocolError::ConflictingEntry {
                    category: *category,
                    id: *id,
                });
            }
        }
        Ok(())
    }
}
