//! Merging server state into the client's view of the world
//!
//! The engine is the only writer of the client entity table. It applies
//! snapshots and deltas whole-entity, keeps the locally predicted position
//! of the player when the server only disagrees a little, and lets the
//! server win outright when it disagrees a lot.

use crate::table::EntityTable;
use log::{debug, warn};
use shared::{
    constrain_position, step_movement, Delta, EntityCategory, EntityId, EntityKey, InputState,
    Meta, ProtocolError, Snapshot, Vec2, PLAYER_RADIUS,
};
use std::time::{Duration, Instant};

/// Server and prediction closer than this keep the prediction.
pub const PREDICTION_THRESHOLD: f32 = 100.0;
/// Out-of-band corrections below this distance are blended instead of snapped.
pub const SOFT_CORRECTION_THRESHOLD: f32 = 30.0;
/// Snaps further than this are worth telling the player about.
pub const CORRECTION_NOTICE_THRESHOLD: f32 = 50.0;
/// Share of the gap closed by a soft correction.
pub const CORRECTION_BLEND: f32 = 0.5;
pub const ORPHAN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// What happened to the local player while applying one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// The message did not carry the local player.
    NotChecked,
    /// Server position discarded in favour of the local prediction.
    PredictionKept { divergence: f32 },
    /// Prediction too far off; server position taken.
    ServerAccepted { divergence: f32 },
    /// First message after a reconnect, taken as-is.
    Resynced,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionOutcome {
    pub position: Vec2,
    pub snapped: bool,
    /// Distance to the target, set only when it is large enough to surface.
    pub notice: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Prediction {
    x: f32,
    y: f32,
    angle: f32,
}

pub struct ReconciliationEngine {
    table: EntityTable,
    meta: Meta,
    local_player: Option<EntityId>,
    just_reconnected: bool,
    last_tick: u64,
    last_sweep: Instant,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Engine whose first orphan sweep is due one interval after `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self {
            table: EntityTable::new(),
            meta: Meta::default(),
            local_player: None,
            just_reconnected: false,
            last_tick: 0,
            last_sweep: now,
        }
    }

    pub fn table(&self) -> &EntityTable {
        &self.table
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    pub fn set_local_player(&mut self, id: EntityId) {
        self.local_player = Some(id);
    }

    pub fn local_player_key(&self) -> Option<EntityKey> {
        self.local_player
            .map(|id| EntityKey::new(EntityCategory::Player, id))
    }

    pub fn local_position(&self) -> Option<Vec2> {
        self.table.get(self.local_player_key()?).map(|p| p.position())
    }

    pub fn is_resyncing(&self) -> bool {
        self.just_reconnected
    }

    /// Takes server truth unconditionally for the next message.
    pub fn reconnected(&mut self) {
        self.just_reconnected = true;
    }

    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> Reconciliation {
        let present = self
            .local_player_key()
            .is_some_and(|key| snapshot.entity(key).is_some());

        let prediction = self.capture_prediction();
        self.table.apply_snapshot(&snapshot.entities);
        self.meta = snapshot.meta.clone();
        self.last_tick = snapshot.tick;

        self.finish(prediction, present)
    }

    /// Applies a delta, or drops it untouched when it fails validation.
    ///
    /// A dropped delta leaves the table and the reconnect flag as they were.
    pub fn on_delta(&mut self, delta: &Delta) -> Result<Reconciliation, ProtocolError> {
        delta.validate()?;

        let present = self
            .local_player_key()
            .is_some_and(|key| delta.updated_entity(key).is_some());

        let prediction = self.capture_prediction();
        self.table.apply_delta(delta);
        delta.meta.apply_to(&mut self.meta);
        self.last_tick = self.last_tick.max(delta.tick);

        Ok(self.finish(prediction, present))
    }

    fn capture_prediction(&self) -> Option<Prediction> {
        if self.just_reconnected {
            return None;
        }
        let player = self.table.get(self.local_player_key()?)?;
        Some(Prediction {
            x: player.x,
            y: player.y,
            angle: player.angle,
        })
    }

    fn finish(&mut self, prediction: Option<Prediction>, present: bool) -> Reconciliation {
        let was_reconnected = std::mem::take(&mut self.just_reconnected);

        if !present {
            return Reconciliation::NotChecked;
        }

        let player = match self.local_player_key().and_then(|key| self.table.get_mut(key)) {
            Some(player) => player,
            None => return Reconciliation::NotChecked,
        };

        match prediction {
            Some(predicted) => {
                let divergence = Vec2::new(predicted.x, predicted.y).distance(player.position());
                if divergence < PREDICTION_THRESHOLD {
                    player.x = predicted.x;
                    player.y = predicted.y;
                    player.angle = predicted.angle;
                    Reconciliation::PredictionKept { divergence }
                } else {
                    debug!("Server correction of {:.1}px accepted", divergence);
                    Reconciliation::ServerAccepted { divergence }
                }
            }
            None if was_reconnected => Reconciliation::Resynced,
            None => Reconciliation::NotChecked,
        }
    }

    /// Moves the local player toward an out-of-band correction target.
    pub fn apply_position_correction(&mut self, target: Vec2) -> Option<CorrectionOutcome> {
        let key = self.local_player_key()?;
        let player = self.table.get_mut(key)?;

        let current = player.position();
        let distance = current.distance(target);

        let (position, snapped) = if distance < SOFT_CORRECTION_THRESHOLD {
            (current.lerp(target, CORRECTION_BLEND), false)
        } else {
            (target, true)
        };
        player.set_position(position);

        let notice = (distance > CORRECTION_NOTICE_THRESHOLD).then_some(distance);
        if let Some(distance) = notice {
            warn!("Position corrected by server ({:.0}px)", distance);
        }

        Some(CorrectionOutcome {
            position,
            snapped,
            notice,
        })
    }

    /// Applies a local input to the player ahead of the server.
    pub fn predict_local(&mut self, input: &InputState, dt: f32) -> Option<Vec2> {
        let key = self.local_player_key()?;
        let player = self.table.get_mut(key)?;

        let moved = step_movement(player.position(), input.direction(), dt);
        let resolved = constrain_position(moved, PLAYER_RADIUS, &self.meta.walls);
        player.set_position(resolved);
        player.angle = input.angle;

        Some(resolved)
    }

    /// Runs the orphan sweep if an interval has passed since the last one.
    pub fn maybe_sweep(&mut self, now: Instant) -> Vec<EntityKey> {
        if now.saturating_duration_since(self.last_sweep) < ORPHAN_SWEEP_INTERVAL {
            return Vec::new();
        }
        self.last_sweep = now;

        let orphans = self.table.sweep_orphans();
        if !orphans.is_empty() {
            debug!("Reclaimed {} orphaned entities", orphans.len());
        }
        orphans
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}
