//! # Arena Server Library
//!
//! This library provides the authoritative server for the arena survival game.
//! It owns the canonical entity graph, applies client inputs, drives the
//! gameplay simulation and streams state to every connected client as a
//! full snapshot on connect followed by sparse deltas.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every position, health value and wave counter is decided here. Clients
//! predict their own movement with the same rules from the `shared` crate
//! and conform to whatever the server broadcasts.
//!
//! ### Cadence Control
//! Simulation rate and network rate are separate knobs. The tick scheduler
//! turns a performance profile into a broadcast stride, a pathfinding
//! cadence, spawn caps and an optional memory compaction interval, so the
//! same binary runs on a small board or a desktop.
//!
//! ### State Broadcasting
//! The broadcaster diffs the world against the previous broadcast by value
//! and sends only what changed, plus a staggered keep-alive refresh of
//! unchanged entities so clients can reclaim anything they stop hearing about.
//!
//! ## Module Organization
//!
//! ### Profile Module (`profile`)
//! Named performance presets (`low`, `balanced`, `high`), name resolution
//! with fallback, and validation of operator overrides.
//!
//! ### Scheduler Module (`scheduler`)
//! Broadcast and pathfinding cadence, spawn admission control and the
//! memory compaction timer.
//!
//! ### Game Module (`game`)
//! The entity graph keyed by category and id, player movement with wall
//! and arena constraints, and snapshot construction.
//!
//! ### Broadcaster Module (`broadcaster`)
//! Snapshot and delta construction against the last broadcast baseline.
//!
//! ### Simulation Module (`simulation`)
//! The per-tick gameplay collaborator: zombie spawning and pursuit,
//! powerups and wave progression.
//!
//! ### Session Module (`session`)
//! Address-to-player sessions, deduplicated input inboxes and expiry.
//!
//! ### Network Module (`network`)
//! UDP socket tasks and the tick loop tying everything together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::profile::PerformanceProfile;
//! use server::simulation::ArenaSimulation;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Pick a preset by name; unknown names fall back to "balanced"
//!     let profile = PerformanceProfile::resolve(Some("low"));
//!     profile.validate()?;
//!
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         profile,
//!         Box::new(ArenaSimulation::new(42)),
//!     ).await?;
//!
//!     // Runs until a Shutdown message arrives on `server.handle()`
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes outgoing packets and pre-encoded broadcasts
//! - **Timeout Checker**: Removes clients silent for more than five seconds
//! - **Main Loop**: Applies inputs, steps the simulation, broadcasts on the
//!   scheduler's stride and applies profile reloads between ticks

pub mod broadcaster;
pub mod game;
pub mod network;
pub mod profile;
pub mod scheduler;
pub mod session;
pub mod simulation;
