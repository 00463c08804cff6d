//! Server network layer handling UDP communications and the tick loop

use crate::broadcaster::StateBroadcaster;
use crate::game::World;
use crate::profile::PerformanceProfile;
use crate::scheduler::TickScheduler;
use crate::session::{SessionRegistry, SESSION_TIMEOUT};
use crate::simulation::{Simulation, TickContext};
use log::{debug, error, info, warn};
use shared::{
    decode_packet, encode_packet, EntityCategory, InputState, Packet, Vec2, INPUT_DT,
    MAX_PACKET_SIZE, PROTOCOL_VERSION, REASON_SERVER_FULL, REASON_VERSION_MISMATCH,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Messages sent from network tasks (or operators) to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SessionExpired {
        client_id: u32,
    },
    /// Swap the performance profile. Applied between ticks.
    ReloadProfile(PerformanceProfile),
    Shutdown,
}

/// Messages sent from the tick loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Already encoded so a delta is serialized once, not once per client.
    Broadcast {
        data: Vec<u8>,
    },
}

/// Main server coordinating networking, simulation and state broadcast
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionRegistry>>,
    world: World,
    scheduler: TickScheduler,
    broadcaster: StateBroadcaster,
    simulation: Box<dyn Simulation>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        profile: PerformanceProfile,
        simulation: Box<dyn Simulation>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionRegistry::new())),
            world: World::new(),
            broadcaster: StateBroadcaster::for_profile(&profile),
            scheduler: TickScheduler::new(profile),
            simulation,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Channel for feeding control messages (profile reloads, shutdown) into the loop.
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_packet(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::Broadcast { data } => {
                        let addrs = sessions.read().await.addrs();

                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send broadcast to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that expires silent sessions once a second
    async fn spawn_timeout_checker(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let expired = sessions
                    .write()
                    .await
                    .expire(Instant::now(), SESSION_TIMEOUT);

                for client_id in expired {
                    if let Err(e) = server_tx.send(ServerMessage::SessionExpired { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode_packet(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: &Packet) {
        let data = match encode_packet(packet) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode broadcast: {}", e);
                return;
            }
        };

        if data.len() > MAX_PACKET_SIZE {
            warn!("Broadcast of {} bytes exceeds datagram limit", data.len());
        }

        if let Err(e) = self.game_tx.send(GameMessage::Broadcast { data }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets and updates session state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: REASON_VERSION_MISMATCH.to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // A reconnect from the same address replaces the old session
                let previous = self.sessions.read().await.id_for(addr);
                if let Some(previous) = previous {
                    info!("Replacing session {} from {}", previous, addr);
                    self.sessions.write().await.close(previous);
                    self.world.remove_player(&previous);
                }

                let player_count = self.world.count(EntityCategory::Player);
                if !self.scheduler.can_spawn_player(player_count) {
                    warn!("Refusing {}: {} players connected", addr, player_count);
                    self.send_packet(
                        Packet::Disconnected {
                            reason: REASON_SERVER_FULL.to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let (client_id, _) = self.sessions.write().await.admit(addr, Instant::now());

                self.world.add_player(client_id);
                self.send_packet(Packet::Connected { client_id }, addr);

                let snapshot = self.broadcaster.snapshot(&self.world);
                debug!(
                    "Sending snapshot of {} entities to client {}",
                    snapshot.entity_count(),
                    client_id
                );
                self.send_packet(Packet::Snapshot(snapshot), addr);
            }

            Packet::Input {
                sequence,
                timestamp,
                move_x,
                move_y,
                angle,
            } => {
                let input = InputState {
                    sequence,
                    timestamp,
                    move_x,
                    move_y,
                    angle,
                };
                let mut sessions = self.sessions.write().await;
                if sessions.receive_input(addr, input, Instant::now()).is_none() {
                    debug!("Input from {} without a session", addr);
                }
            }

            Packet::Disconnect => {
                let mut sessions = self.sessions.write().await;
                if let Some(session) = sessions.id_for(addr).and_then(|id| sessions.close(id)) {
                    self.world.remove_player(&session.id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies queued inputs in timestamp order and collects corrections
    ///
    /// Only the last correction per client matters; earlier ones are
    /// superseded by the position the later input resolved to.
    async fn process_inputs(&mut self) -> HashMap<u32, Vec2> {
        let inputs = self.sessions.write().await.drain_inputs();
        let mut corrections = HashMap::new();

        for (client_id, input) in &inputs {
            match self.world.apply_input(*client_id, input, INPUT_DT) {
                Some(position) => {
                    corrections.insert(*client_id, position);
                }
                None => {
                    corrections.remove(client_id);
                }
            }
        }

        corrections
    }

    /// Runs one full server tick
    ///
    /// Every mutation of the tick (inputs, then simulation) is finished before
    /// anything goes out, so a broadcast never contains a half-applied tick.
    async fn tick(&mut self) {
        let mut corrections = self.process_inputs().await;

        let ctx = TickContext {
            tick: self.world.tick + 1,
            dt: self.scheduler.tick_interval().as_secs_f32(),
            scheduler: &self.scheduler,
        };
        self.simulation.step(&mut self.world, &ctx);
        self.world.tick += 1;
        corrections.extend(self.world.take_relocations());

        if !corrections.is_empty() {
            let sessions = self.sessions.read().await;
            for (client_id, position) in corrections {
                if let Some(addr) = sessions.addr_of(client_id) {
                    self.send_packet(
                        Packet::PositionCorrection {
                            x: position.x,
                            y: position.y,
                        },
                        addr,
                    );
                }
            }
        }

        if self.scheduler.should_broadcast(self.world.tick) {
            let delta = self.broadcaster.next_delta(&self.world);
            let has_clients = !self.sessions.read().await.is_empty();
            if has_clients {
                self.broadcast_packet(&Packet::Delta(delta));
            }
        }

        if self.scheduler.compaction_due(Instant::now()) {
            self.world.compact();
            self.broadcaster.compact();
            debug!("Compacted entity tables at tick {}", self.world.tick);
        }
    }

    /// Validates and applies a new profile between ticks.
    ///
    /// Returns false when the profile was rejected.
    fn reload_profile(&mut self, profile: PerformanceProfile) -> bool {
        if let Err(e) = profile.validate() {
            warn!("Ignoring profile reload: {}", e);
            return false;
        }

        self.broadcaster.reload(&profile);
        self.scheduler.reload(profile);
        true
    }

    fn tick_interval(&self) -> Interval {
        let mut ticker = interval(self.scheduler.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = self.tick_interval();
        let profile = self.scheduler.profile();

        info!(
            "Server started with {} profile ({} Hz sim, {} Hz net, broadcast every {} ticks)",
            profile.name,
            profile.tick_rate,
            profile.broadcast_rate,
            self.scheduler.broadcast_every()
        );

        loop {
            tokio::select! {
                // Handle network and control events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::SessionExpired { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.world.remove_player(&client_id);
                        },
                        Some(ServerMessage::ReloadProfile(profile)) => {
                            if self.reload_profile(profile) {
                                tick_interval = self.tick_interval();
                            }
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.tick().await;

                    // Periodic performance monitoring, roughly once a second
                    let tick_rate = self.scheduler.profile().tick_rate.max(1) as u64;
                    if self.world.tick % tick_rate == 0 {
                        let client_count = self.sessions.read().await.len();
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} players, {} zombies, wave {}",
                                self.world.tick,
                                client_count,
                                self.world.count(EntityCategory::Player),
                                self.world.count(EntityCategory::Zombie),
                                self.world.meta.wave
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
