//! # Arena Client Library
//!
//! This library provides the client side of the arena survival game's state
//! synchronization. It keeps a local copy of the server's entity graph,
//! predicts the local player's movement ahead of the server, and smooths
//! the movement of everything else between network updates.
//!
//! ## Architecture Overview
//!
//! The server sends one full snapshot when a session starts and sparse deltas
//! after that. Entities always arrive whole, so applying an update is a plain
//! overwrite. Several pieces cooperate to turn that stream into a smooth view:
//!
//! ### Client-Side Prediction
//! Inputs move the local player immediately using the same movement rules the
//! server runs (`shared::step_movement` and `shared::constrain_position`).
//! The player never waits a round trip to see their own motion.
//!
//! ### Reconciliation
//! When the server's view of the player arrives, the prediction survives if
//! the two are within 100 px of each other. Beyond that the server wins,
//! which covers cheating, collisions the client missed and post-reconnect
//! desyncs. The first message after a reconnect is always taken as-is.
//!
//! ### Out-of-Band Corrections
//! The server can nudge the player directly. Small nudges under 30 px are
//! blended halfway; larger ones snap, and anything over 50 px is surfaced
//! as a notice.
//!
//! ### Dead Reckoning
//! Remote entities are extrapolated along an estimated velocity and eased
//! toward the guess over 100 ms. After 500 ms without news they are pinned
//! to their last known position.
//!
//! ### Orphan Sweep
//! Deltas are not acknowledged, so a removal can be lost. Once a second the
//! engine drops every entity no message has mentioned since the last sweep.
//!
//! ## Module Organization
//!
//! ### Table Module (`table`)
//! Per-category entity storage with the seen markers the sweep relies on.
//!
//! ### Reconciliation Module (`reconciliation`)
//! Snapshot and delta application, prediction thresholds, position
//! corrections and the reconnect flag.
//!
//! ### Interpolation Module (`interpolation`)
//! Per-entity velocity estimates and render positions.
//!
//! ### Input Module (`input`)
//! Sequenced movement inputs from a scripted wandering path.
//!
//! ### Network Module (`network`)
//! The UDP loop: handshake, packet dispatch, input sending, render frames
//! and automatic reconnection.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Simulate 80 ms of round-trip latency
//!     let mut client = Client::new("127.0.0.1:8080", 80).await?;
//!
//!     // Play for thirty seconds, then disconnect
//!     client.run(Some(Duration::from_secs(30))).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod interpolation;
pub mod network;
pub mod reconciliation;
pub mod table;
