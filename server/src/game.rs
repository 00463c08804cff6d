use log::info;
use shared::{
    constrain_position, step_movement, Entity, EntityCategory, EntityId, EntityKey, EntityMap,
    InputState, Meta, Scalar, Snapshot, Vec2, Wall, ARENA_HEIGHT, ARENA_WIDTH, PLAYER_RADIUS,
    PLAYER_SPEED,
};
use std::collections::{BTreeMap, HashMap};

/// Slack on the unit-length direction cap for float noise in honest inputs.
pub const DIRECTION_TOLERANCE: f32 = 1e-3;

pub fn default_walls() -> Vec<Wall> {
    vec![
        Wall::new(400.0, 300.0, 40.0, 240.0),
        Wall::new(1160.0, 660.0, 40.0, 240.0),
        Wall::new(700.0, 560.0, 200.0, 40.0),
    ]
}

/// Authoritative entity graph and arena metadata.
#[derive(Debug, Clone)]
pub struct World {
    pub tick: u64,
    pub meta: Meta,
    entities: EntityMap,
    next_ids: BTreeMap<EntityCategory, EntityId>,
    relocations: HashMap<u32, Vec2>,
}

impl World {
    pub fn new() -> Self {
        Self::with_meta(Meta {
            wave: 1,
            walls: default_walls(),
            current_room: 0,
            boss_present: false,
        })
    }

    pub fn with_meta(meta: Meta) -> Self {
        Self {
            tick: 0,
            meta,
            entities: EntityMap::new(),
            next_ids: BTreeMap::new(),
            relocations: HashMap::new(),
        }
    }

    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(&key.category)?.get(&key.id)
    }

    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(&key.category)?.get_mut(&key.id)
    }

    pub fn count(&self, category: EntityCategory) -> usize {
        self.entities.get(&category).map_or(0, HashMap::len)
    }

    pub fn iter_category(
        &self,
        category: EntityCategory,
    ) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entities.get(&category).into_iter().flatten()
    }

    pub fn iter_category_mut(
        &mut self,
        category: EntityCategory,
    ) -> impl Iterator<Item = (&EntityId, &mut Entity)> {
        self.entities.get_mut(&category).into_iter().flatten()
    }

    /// Inserts an entity under a freshly allocated id.
    ///
    /// Admission control is the caller's job; see `TickScheduler::can_spawn_*`.
    pub fn spawn(&mut self, category: EntityCategory, entity: Entity) -> EntityId {
        let next = self.next_ids.entry(category).or_insert(1);
        let id = *next;
        *next += 1;
        self.insert(EntityKey::new(category, id), entity);
        id
    }

    pub fn insert(&mut self, key: EntityKey, entity: Entity) {
        self.entities
            .entry(key.category)
            .or_default()
            .insert(key.id, entity);
    }

    pub fn despawn(&mut self, key: EntityKey) -> Option<Entity> {
        let table = self.entities.get_mut(&key.category)?;
        let removed = table.remove(&key.id);
        if table.is_empty() {
            self.entities.remove(&key.category);
        }
        removed
    }

    pub fn add_player(&mut self, client_id: u32) {
        let spawn_x = 200.0 + (client_id as f32 * 90.0) % (ARENA_WIDTH - 400.0);
        let spawn_y = ARENA_HEIGHT / 2.0;
        let position = constrain_position(
            Vec2::new(spawn_x, spawn_y),
            PLAYER_RADIUS,
            &self.meta.walls,
        );

        let player = Entity::new(position.x, position.y)
            .with_attribute("score", Scalar::Int(0))
            .with_attribute("speed", Scalar::Float(PLAYER_SPEED));

        info!("Added player {} at ({}, {})", client_id, player.x, player.y);
        self.insert(EntityKey::new(EntityCategory::Player, client_id), player);
    }

    pub fn remove_player(&mut self, client_id: &u32) {
        self.despawn(EntityKey::new(EntityCategory::Player, *client_id));
        info!("Removed player {}", client_id);
    }

    /// Applies one movement input to a player.
    ///
    /// Walls and arena edges are resolved by the same rules the client
    /// predicts with, so they never produce a correction. Only an input
    /// over the speed cap does, since an honest client never sends one.
    pub fn apply_input(&mut self, client_id: u32, input: &InputState, dt: f32) -> Option<Vec2> {
        let walls = &self.meta.walls;
        let player = self
            .entities
            .get_mut(&EntityCategory::Player)?
            .get_mut(&client_id)?;

        let moved = step_movement(player.position(), input.direction(), dt);
        let resolved = constrain_position(moved, PLAYER_RADIUS, walls);

        player.set_position(resolved);
        player.angle = input.angle;

        let over_cap = input.direction().length() > 1.0 + DIRECTION_TOLERANCE;
        over_cap.then_some(resolved)
    }

    /// Moves a player somewhere its client cannot predict, such as a respawn.
    ///
    /// The move is remembered until [`World::take_relocations`] so the
    /// client can be told out of band.
    pub fn relocate_player(&mut self, client_id: u32, position: Vec2) {
        if let Some(player) = self.get_mut(EntityKey::new(EntityCategory::Player, client_id)) {
            player.set_position(position);
            self.relocations.insert(client_id, position);
        }
    }

    pub fn take_relocations(&mut self) -> HashMap<u32, Vec2> {
        std::mem::take(&mut self.relocations)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            entities: self.entities.clone(),
            meta: self.meta.clone(),
        }
    }

    /// Releases spare capacity left behind by despawned entities.
    pub fn compact(&mut self) {
        for table in self.entities.values_mut() {
            table.shrink_to_fit();
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
