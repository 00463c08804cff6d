//! Gameplay collaborator driven once per tick by the server loop
//!
//! The sync layer does not care what happens inside a simulation step; it
//! only needs every mutation for a tick to be finished before the tick is
//! broadcast. `ArenaSimulation` is a small stand-in that keeps
//! the entity graph busy: zombies spawn and chase, powerups appear and get
//! picked up, and waves advance the arena metadata.

use crate::game::World;
use crate::scheduler::TickScheduler;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    constrain_position, Entity, EntityCategory, EntityId, EntityKey, Scalar, Vec2, Wall,
    ARENA_HEIGHT, ARENA_WIDTH, PLAYER_RADIUS, ZOMBIE_RADIUS,
};
use std::collections::HashMap;

const ZOMBIE_SPEED: f32 = 70.0;
const BOSS_SPEED: f32 = 55.0;
const ZOMBIE_DAMAGE: f32 = 10.0;
const BOSS_DAMAGE: f32 = 35.0;
const ZOMBIE_SPAWNS_PER_SECOND: f32 = 1.5;
const POWERUP_INTERVAL_SECS: f32 = 8.0;
const POWERUP_RADIUS: f32 = 14.0;
const POWERUP_HEAL: f32 = 25.0;
const MAX_HEALTH: f32 = 100.0;
const WAVES_PER_ROOM: u32 = 5;

pub struct TickContext<'a> {
    pub tick: u64,
    pub dt: f32,
    pub scheduler: &'a TickScheduler,
}

pub trait Simulation: Send + Sync {
    fn step(&mut self, world: &mut World, ctx: &TickContext<'_>);
}

pub fn room_layouts() -> Vec<Vec<Wall>> {
    vec![
        crate::game::default_walls(),
        vec![
            Wall::new(300.0, 200.0, 1000.0, 40.0),
            Wall::new(300.0, 960.0, 1000.0, 40.0),
        ],
        vec![
            Wall::new(780.0, 0.0, 40.0, 450.0),
            Wall::new(780.0, 750.0, 40.0, 450.0),
        ],
    ]
}

pub struct ArenaSimulation {
    rng: StdRng,
    spawn_budget: f32,
    powerup_timer: f32,
    spawned_this_wave: u32,
    headings: HashMap<EntityId, Vec2>,
    rooms: Vec<Vec<Wall>>,
}

impl ArenaSimulation {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spawn_budget: 0.0,
            powerup_timer: 0.0,
            spawned_this_wave: 0,
            headings: HashMap::new(),
            rooms: room_layouts(),
        }
    }

    fn wave_size(wave: u32) -> u32 {
        10 + 5 * wave
    }

    fn spawn_zombies(&mut self, world: &mut World, ctx: &TickContext<'_>) {
        let wave_speedup = 1.0 + world.meta.wave as f32 * 0.1;
        self.spawn_budget +=
            ctx.dt * ZOMBIE_SPAWNS_PER_SECOND * ctx.scheduler.spawn_multiplier() * wave_speedup;

        while self.spawn_budget >= 1.0 {
            self.spawn_budget -= 1.0;

            if !ctx.scheduler.can_spawn_zombie(world.count(EntityCategory::Zombie)) {
                continue;
            }

            let position = self.edge_position();
            let boss = world.meta.boss_present
                && !world
                    .iter_category(EntityCategory::Zombie)
                    .any(|(_, z)| z.attribute("boss") == Some(&Scalar::Bool(true)));

            let mut zombie = Entity::new(position.x, position.y)
                .with_attribute("boss", Scalar::Bool(boss));
            if boss {
                zombie.health = 500.0;
            }

            world.spawn(EntityCategory::Zombie, zombie);
            self.spawned_this_wave += 1;

            if self.spawned_this_wave >= Self::wave_size(world.meta.wave) {
                self.advance_wave(world);
            }
        }
    }

    fn advance_wave(&mut self, world: &mut World) {
        self.spawned_this_wave = 0;
        world.meta.wave += 1;
        world.meta.boss_present = world.meta.wave % WAVES_PER_ROOM == 0;

        let room = ((world.meta.wave - 1) / WAVES_PER_ROOM) % self.rooms.len() as u32;
        if room != world.meta.current_room {
            world.meta.current_room = room;
            world.meta.walls = self.rooms[room as usize].clone();
        }

        debug!(
            "Wave {} (room {}, boss: {})",
            world.meta.wave, world.meta.current_room, world.meta.boss_present
        );
    }

    fn edge_position(&mut self) -> Vec2 {
        let along = self.rng.gen_range(0.0..1.0f32);
        match self.rng.gen_range(0..4) {
            0 => Vec2::new(along * ARENA_WIDTH, ZOMBIE_RADIUS),
            1 => Vec2::new(along * ARENA_WIDTH, ARENA_HEIGHT - ZOMBIE_RADIUS),
            2 => Vec2::new(ZOMBIE_RADIUS, along * ARENA_HEIGHT),
            _ => Vec2::new(ARENA_WIDTH - ZOMBIE_RADIUS, along * ARENA_HEIGHT),
        }
    }

    fn move_zombies(&mut self, world: &mut World, ctx: &TickContext<'_>) {
        let players: Vec<Vec2> = world
            .iter_category(EntityCategory::Player)
            .map(|(_, p)| p.position())
            .collect();
        let walls = world.meta.walls.clone();
        let recompute = ctx.scheduler.should_update_pathfinding(ctx.tick);

        for (id, zombie) in world.iter_category_mut(EntityCategory::Zombie) {
            let position = zombie.position();

            if recompute || !self.headings.contains_key(id) {
                let heading = nearest(position, &players)
                    .map(|target| (target - position).normalize())
                    .unwrap_or(Vec2::ZERO);
                self.headings.insert(*id, heading);
            }

            let heading = self.headings.get(id).copied().unwrap_or(Vec2::ZERO);
            let speed = if is_boss(zombie) { BOSS_SPEED } else { ZOMBIE_SPEED };
            let moved = position + heading.scale(speed * ctx.dt);

            zombie.set_position(constrain_position(moved, ZOMBIE_RADIUS, &walls));
            if heading != Vec2::ZERO {
                zombie.angle = heading.y.atan2(heading.x);
            }
        }
    }

    fn resolve_bites(&mut self, world: &mut World) {
        let zombies: Vec<(EntityId, Vec2, f32)> = world
            .iter_category(EntityCategory::Zombie)
            .map(|(id, z)| {
                let damage = if is_boss(z) { BOSS_DAMAGE } else { ZOMBIE_DAMAGE };
                (*id, z.position(), damage)
            })
            .collect();

        let reach = PLAYER_RADIUS + ZOMBIE_RADIUS;
        let mut spent = Vec::new();
        let mut fallen = Vec::new();

        for (player_id, player) in world.iter_category_mut(EntityCategory::Player) {
            for (zombie_id, position, damage) in &zombies {
                if spent.contains(zombie_id) || player.position().distance(*position) > reach {
                    continue;
                }
                player.health -= damage;
                spent.push(*zombie_id);

                if player.health <= 0.0 {
                    player.health = MAX_HEALTH;
                    fallen.push(*player_id);
                    break;
                }
            }
        }

        let respawn = Vec2::new(ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0);
        for player_id in fallen {
            debug!("Player {} fell and respawns", player_id);
            world.relocate_player(player_id, respawn);
        }

        for id in spent {
            world.despawn(EntityKey::new(EntityCategory::Zombie, id));
            self.headings.remove(&id);
        }
    }

    fn spawn_powerups(&mut self, world: &mut World, ctx: &TickContext<'_>) {
        self.powerup_timer += ctx.dt * ctx.scheduler.spawn_multiplier();
        if self.powerup_timer < POWERUP_INTERVAL_SECS {
            return;
        }
        self.powerup_timer = 0.0;

        if !ctx.scheduler.can_spawn_powerup(world.count(EntityCategory::Powerup)) {
            return;
        }

        let position = constrain_position(
            Vec2::new(
                self.rng.gen_range(0.0..ARENA_WIDTH),
                self.rng.gen_range(0.0..ARENA_HEIGHT),
            ),
            POWERUP_RADIUS,
            &world.meta.walls,
        );
        let kind = ["heal", "speed", "shield"][self.rng.gen_range(0..3usize)];

        world.spawn(
            EntityCategory::Powerup,
            Entity::new(position.x, position.y).with_attribute("kind", Scalar::Text(kind.into())),
        );
    }

    fn collect_powerups(&mut self, world: &mut World) {
        let powerups: Vec<(EntityId, Vec2)> = world
            .iter_category(EntityCategory::Powerup)
            .map(|(id, p)| (*id, p.position()))
            .collect();

        let reach = PLAYER_RADIUS + POWERUP_RADIUS;
        let mut taken = Vec::new();

        for (_, player) in world.iter_category_mut(EntityCategory::Player) {
            for (id, position) in &powerups {
                if !taken.contains(id) && player.position().distance(*position) <= reach {
                    player.health = (player.health + POWERUP_HEAL).min(MAX_HEALTH);
                    taken.push(*id);
                }
            }
        }

        for id in taken {
            world.despawn(EntityKey::new(EntityCategory::Powerup, id));
        }
    }
}

impl Simulation for ArenaSimulation {
    fn step(&mut self, world: &mut World, ctx: &TickContext<'_>) {
        if world.count(EntityCategory::Player) == 0 {
            return;
        }

        self.spawn_zombies(world, ctx);
        self.move_zombies(world, ctx);
        self.resolve_bites(world);
        self.spawn_powerups(world, ctx);
        self.collect_powerups(world);

        self.headings
            .retain(|id, _| world.get(EntityKey::new(EntityCategory::Zombie, *id)).is_some());
    }
}

fn nearest(from: Vec2, targets: &[Vec2]) -> Option<Vec2> {
    targets
        .iter()
        .copied()
        .min_by(|a, b| from.distance(*a).total_cmp(&from.distance(*b)))
}

fn is_boss(zombie: &Entity) -> bool {
    zombie.attribute("boss") == Some(&Scalar::Bool(true))
}
