use crate::input::InputManager;
use crate::interpolation::Interpolator;
use crate::reconciliation::{Reconciliation, ReconciliationEngine};
use log::{debug, error, info, warn};
use shared::{
    decode_packet, encode_packet, InputState, Packet, Vec2, INPUT_DT, MAX_PACKET_SIZE,
    PROTOCOL_VERSION, REASON_VERSION_MISMATCH,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

/// Quiet time after which the server is presumed gone and we reconnect.
pub const SERVER_SILENCE_TIMEOUT: Duration = Duration::from_secs(3);
/// Wait before the second reconnect attempt; doubles after each failure.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(8);
const LINK_CHECK_INTERVAL: Duration = Duration::from_millis(250);
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before reconnect attempt number `attempt`, counting from zero.
///
/// The first attempt goes out immediately.
pub fn reconnect_delay(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    RECONNECT_BASE_DELAY
        .saturating_mul(factor)
        .min(RECONNECT_MAX_DELAY)
}

/// Things worth showing the player, drained once per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected { client_id: u32 },
    Notice(String),
    Disconnected { reason: String },
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,

    engine: ReconciliationEngine,
    interpolator: Interpolator,
    input_manager: InputManager,
    events: Vec<ClientEvent>,

    fake_ping_ms: u64,
    last_server_packet: Instant,
    last_stats: Instant,

    failed_attempts: u32,
    next_reconnect: Option<Instant>,
    abandoned: bool,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            engine: ReconciliationEngine::new(),
            interpolator: Interpolator::new(),
            input_manager: InputManager::new(),
            events: Vec::new(),
            fake_ping_ms,
            last_server_packet: Instant::now(),
            last_stats: Instant::now(),
            failed_attempts: 0,
            next_reconnect: None,
            abandoned: false,
        })
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// True once the server refused us for a reason retrying cannot fix.
    pub fn has_given_up(&self) -> bool {
        self.abandoned
    }

    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server at {}...", self.server_addr);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    /// Marks the session lost and schedules the next `Connect`.
    ///
    /// The next message after the new handshake is taken unconditionally.
    fn schedule_reconnect(&mut self, now: Instant) {
        let delay = reconnect_delay(self.failed_attempts);
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.connected = false;
        self.engine.reconnected();
        self.next_reconnect = Some(now + delay);
        debug!("Reconnect attempt {} in {:?}", self.failed_attempts, delay);
    }

    /// Sends a due reconnect, or schedules one when the server went quiet.
    async fn check_link(&mut self, now: Instant) {
        if self.abandoned {
            return;
        }

        if self.next_reconnect.is_none()
            && now.saturating_duration_since(self.last_server_packet) > SERVER_SILENCE_TIMEOUT
        {
            warn!("No word from server in {:?}, reconnecting", SERVER_SILENCE_TIMEOUT);
            self.schedule_reconnect(now);
        }

        match self.next_reconnect {
            Some(due) if now >= due => {
                self.next_reconnect = None;
                // Silence is measured from the attempt, not the last packet
                self.last_server_packet = now;
                if let Err(e) = self.connect().await {
                    error!("Failed to send reconnect: {}", e);
                }
            }
            _ => {}
        }
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = encode_packet(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet, receive_time: Instant) {
        self.last_server_packet = receive_time;

        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.connected = true;
                self.failed_attempts = 0;
                self.next_reconnect = None;
                self.engine.set_local_player(client_id);
                self.events.push(ClientEvent::Connected { client_id });
            }

            Packet::Snapshot(snapshot) => {
                debug!(
                    "Snapshot for tick {} with {} entities",
                    snapshot.tick,
                    snapshot.entity_count()
                );
                self.engine.on_snapshot(&snapshot);

                let local = self.engine.local_player_key();
                self.interpolator
                    .observe_snapshot(&snapshot, local, receive_time);
                self.interpolator.retain_present(self.engine.table());
            }

            Packet::Delta(delta) => match self.engine.on_delta(&delta) {
                Ok(outcome) => {
                    if let Reconciliation::ServerAccepted { divergence } = outcome {
                        debug!("Tick {}: prediction off by {:.1}px", delta.tick, divergence);
                    }

                    let local = self.engine.local_player_key();
                    self.interpolator.observe_delta(&delta, local, receive_time);
                }
                Err(e) => {
                    warn!("Dropping delta for tick {}: {}", delta.tick, e);
                }
            },

            Packet::PositionCorrection { x, y } => {
                let outcome = self.engine.apply_position_correction(Vec2::new(x, y));
                if let Some(distance) = outcome.and_then(|o| o.notice) {
                    self.events.push(ClientEvent::Notice(format!(
                        "Position corrected by {:.0}px",
                        distance
                    )));
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.client_id = None;
                self.connected = false;

                if reason == REASON_VERSION_MISMATCH {
                    error!("Server speaks another protocol version, not reconnecting");
                    self.abandoned = true;
                    self.next_reconnect = None;
                } else if self.next_reconnect.is_none() {
                    self.schedule_reconnect(receive_time);
                }
                self.events.push(ClientEvent::Disconnected { reason });
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    async fn send_input(&mut self, input: InputState) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected || self.client_id.is_none() {
            return Ok(());
        }

        let packet = Packet::Input {
            sequence: input.sequence,
            timestamp: input.timestamp,
            move_x: input.move_x,
            move_y: input.move_y,
            angle: input.angle,
        };

        self.send_packet(&packet).await?;
        self.engine.predict_local(&input, INPUT_DT);

        Ok(())
    }

    /// One render frame: extrapolate remote entities and reclaim orphans.
    fn render_frame(&mut self, now: Instant) {
        self.interpolator.advance(now);

        for key in self.engine.maybe_sweep(now) {
            self.interpolator.remove(key);
        }

        for event in self.take_events() {
            match event {
                ClientEvent::Notice(message) => warn!("{}", message),
                other => debug!("{:?}", other),
            }
        }

        if now.saturating_duration_since(self.last_stats) >= STATS_INTERVAL {
            self.last_stats = now;
            let meta = self.engine.meta();
            info!(
                "Tick {}: {} entities, {} interpolated, wave {}, position {:?}",
                self.engine.last_tick(),
                self.engine.table().len(),
                self.interpolator.len(),
                meta.wave,
                self.engine.local_position()
            );
        }
    }

    /// Runs the client until `duration` elapses, or forever without one.
    pub async fn run(
        &mut self,
        duration: Option<Duration>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut input_interval = interval(Duration::from_millis(16));
        let mut render_interval = interval(Duration::from_millis(16));
        let mut link_interval = interval(LINK_CHECK_INTERVAL);
        let deadline = duration.map(|d| Instant::now() + d);

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
            if self.abandoned {
                break;
            }

            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    let receive_time = Instant::now();
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match decode_packet(&buffer[..len]) {
                                Ok(packet) => self.handle_packet(packet, receive_time).await,
                                Err(e) => warn!("Dropping undecodable packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    let input = self.input_manager.next_input();
                    if let Err(e) = self.send_input(input).await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = render_interval.tick() => {
                    self.render_frame(Instant::now());
                },

                _ = link_interval.tick() => {
                    self.check_link(Instant::now()).await;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
