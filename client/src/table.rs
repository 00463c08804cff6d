//! Client-side copy of the server's entity graph

use shared::{Delta, Entity, EntityCategory, EntityId, EntityKey, EntityMap};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
struct TableEntry {
    entity: Entity,
    /// Referenced by a snapshot or delta since the last orphan sweep.
    seen: bool,
}

/// Last-known entity per `(category, id)`, with a seen marker per entry
///
/// Every write replaces the whole record. Entries that no message mentions
/// between two sweeps are treated as orphans of a lost removal and dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTable {
    entries: BTreeMap<EntityCategory, HashMap<EntityId, TableEntry>>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.entries
            .get(&key.category)?
            .get(&key.id)
            .map(|entry| &entry.entity)
    }

    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entries
            .get_mut(&key.category)?
            .get_mut(&key.id)
            .map(|entry| &mut entry.entity)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.get(key).is_some()
    }

    pub fn count(&self, category: EntityCategory) -> usize {
        self.entries.get(&category).map_or(0, HashMap::len)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entries.iter().flat_map(|(category, table)| {
            table
                .iter()
                .map(move |(id, entry)| (EntityKey::new(*category, *id), &entry.entity))
        })
    }

    /// Discards everything and loads the snapshot's entities, all marked seen.
    pub fn apply_snapshot(&mut self, entities: &EntityMap) {
        self.entries.clear();
        for (category, table) in entities {
            let copied = table
                .iter()
                .map(|(id, entity)| {
                    let entry = TableEntry {
                        entity: entity.clone(),
                        seen: true,
                    };
                    (*id, entry)
                })
                .collect();
            self.entries.insert(*category, copied);
        }
    }

    /// Overwrites every updated entity and deletes every removed one.
    ///
    /// The delta must already have passed `Delta::validate`.
    pub fn apply_delta(&mut self, delta: &Delta) {
        for (category, ids) in &delta.removed {
            if let Some(table) = self.entries.get_mut(category) {
                for id in ids {
                    table.remove(id);
                }
                if table.is_empty() {
                    self.entries.remove(category);
                }
            }
        }

        for (category, updated) in &delta.updated {
            let table = self.entries.entry(*category).or_default();
            for (id, entity) in updated {
                table.insert(
                    *id,
                    TableEntry {
                        entity: entity.clone(),
                        seen: true,
                    },
                );
            }
        }
    }

    /// Drops entries unseen since the previous sweep and resets the markers.
    ///
    /// Returns the keys that were dropped.
    pub fn sweep_orphans(&mut self) -> Vec<EntityKey> {
        let mut orphans = Vec::new();

        for (category, table) in self.entries.iter_mut() {
            table.retain(|id, entry| {
                if !entry.seen {
                    orphans.push(EntityKey::new(*category, *id));
                }
                entry.seen
            });
            for entry in table.values_mut() {
                entry.seen = false;
            }
        }

        self.entries.retain(|_, table| !table.is_empty());
        orphans
    }
}
