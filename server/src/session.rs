//! Per-client sessions and their input inboxes
//!
//! A session ties a socket address to the id of the player entity it
//! controls. Inputs are kept per session keyed by sequence number, so a
//! resent datagram overwrites its earlier copy instead of applying twice.
//!
//! Capacity is not decided here. The server asks the tick scheduler whether
//! another player may be admitted before calling [`SessionRegistry::admit`].

use log::info;
use shared::InputState;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a session is dropped.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub addr: SocketAddr,
    pub last_heard: Instant,
    /// Highest input sequence already applied to the world.
    pub applied_through: u32,
    inbox: BTreeMap<u32, InputState>,
}

impl Session {
    fn open(id: u32, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            last_heard: now,
            applied_through: 0,
            inbox: BTreeMap::new(),
        }
    }

    /// Queues an input unless it was already applied.
    fn accept(&mut self, input: InputState, now: Instant) {
        self.last_heard = now;
        if input.sequence > self.applied_through {
            self.inbox.insert(input.sequence, input);
        }
    }

    pub fn queued(&self) -> usize {
        self.inbox.len()
    }

    pub fn is_silent(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heard) > timeout
    }
}

/// All live sessions, indexed by id and by address.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    by_addr: HashMap<SocketAddr, u32>,
    next_id: u32,
}

impl SessionRegistry {
    /// Ids start at 1 and are never handed out twice in one process.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            by_addr: HashMap::new(),
            next_id: 1,
        }
    }

    /// Opens a session for `addr`, closing any earlier one from the same address.
    ///
    /// Returns the new id and the id of the replaced session, if any.
    pub fn admit(&mut self, addr: SocketAddr, now: Instant) -> (u32, Option<u32>) {
        let replaced = self.by_addr.get(&addr).copied();
        if let Some(old) = replaced {
            self.close(old);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(id, Session::open(id, addr, now));
        self.by_addr.insert(addr, id);
        info!("Session {} opened for {}", id, addr);

        (id, replaced)
    }

    pub fn close(&mut self, id: u32) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_addr.remove(&session.addr);
        info!("Session {} closed", id);
        Some(session)
    }

    pub fn id_for(&self, addr: SocketAddr) -> Option<u32> {
        self.by_addr.get(&addr).copied()
    }

    pub fn addr_of(&self, id: u32) -> Option<SocketAddr> {
        self.sessions.get(&id).map(|session| session.addr)
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Queues an input from `addr`. Returns the session id, or `None` for strangers.
    pub fn receive_input(
        &mut self,
        addr: SocketAddr,
        input: InputState,
        now: Instant,
    ) -> Option<u32> {
        let id = self.id_for(addr)?;
        let session = self.sessions.get_mut(&id)?;
        session.accept(input, now);
        Some(id)
    }

    /// Empties every inbox and returns the inputs in client-timestamp order.
    ///
    /// Ties break on session id, then sequence, so the order is deterministic.
    pub fn drain_inputs(&mut self) -> Vec<(u32, InputState)> {
        let mut drained = Vec::new();

        for session in self.sessions.values_mut() {
            let inbox = std::mem::take(&mut session.inbox);
            if let Some(&last) = inbox.keys().next_back() {
                session.applied_through = session.applied_through.max(last);
            }
            drained.extend(inbox.into_values().map(|input| (session.id, input)));
        }

        drained.sort_by_key(|(id, input)| (input.timestamp, *id, input.sequence));
        drained
    }

    /// Closes sessions silent for longer than `timeout` and returns their ids.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<u32> {
        let mut silent: Vec<u32> = self
            .sessions
            .values()
            .filter(|session| session.is_silent(now, timeout))
            .map(|session| session.id)
            .collect();
        silent.sort_unstable();

        for id in &silent {
            self.close(*id);
        }
        silent
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.by_addr.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn input(sequence: u32, timestamp: u64) -> InputState {
        InputState {
            sequence,
            timestamp,
            move_x: 1.0,
            move_y: 0.0,
            angle: 0.0,
        }
    }

    #[test]
    fn test_admit_assigns_increasing_ids() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();
        assert!(registry.is_empty());

        let (first, _) = registry.admit(addr(7001), now);
        let (second, _) = registry.admit(addr(7002), now);

        assert_eq!((first, second), (1, 2));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.addr_of(second), Some(addr(7002)));
        assert_eq!(registry.id_for(addr(7001)), Some(first));
    }

    #[test]
    fn test_readmit_replaces_session_from_same_address() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        let (first, replaced) = registry.admit(addr(7001), now);
        assert_eq!(replaced, None);

        let (second, replaced) = registry.admit(addr(7001), now);
        assert_eq!(replaced, Some(first));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(first).is_none());
    }

    #[test]
    fn test_ids_not_reused_after_close() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        let (first, _) = registry.admit(addr(7001), now);
        assert!(registry.close(first).is_some());
        assert!(registry.close(first).is_none());
        let (second, _) = registry.admit(addr(7001), now);

        assert!(second > first);
        assert_eq!(registry.id_for(addr(7001)), Some(second));
    }

    #[test]
    fn test_input_from_stranger_is_ignored() {
        let mut registry = SessionRegistry::new();
        assert_eq!(
            registry.receive_input(addr(9999), input(1, 10), Instant::now()),
            None
        );
    }

    #[test]
    fn test_resent_input_is_queued_once() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();
        let (id, _) = registry.admit(addr(7001), now);

        registry.receive_input(addr(7001), input(4, 10), now);
        registry.receive_input(addr(7001), input(4, 10), now);

        assert_eq!(registry.get(id).unwrap().queued(), 1);
    }

    #[test]
    fn test_drain_orders_by_timestamp_across_sessions() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();
        let (a, _) = registry.admit(addr(7001), now);
        let (b, _) = registry.admit(addr(7002), now);

        registry.receive_input(addr(7001), input(1, 100), now);
        registry.receive_input(addr(7002), input(1, 50), now);
        registry.receive_input(addr(7001), input(2, 200), now);
        registry.receive_input(addr(7002), input(2, 100), now);

        let drained = registry.drain_inputs();
        let order: Vec<(u32, u64)> = drained
            .iter()
            .map(|(id, input)| (*id, input.timestamp))
            .collect();

        assert_eq!(order, vec![(b, 50), (a, 100), (b, 100), (a, 200)]);
        assert!(registry.drain_inputs().is_empty());
    }

    #[test]
    fn test_applied_inputs_are_not_requeued() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();
        let (id, _) = registry.admit(addr(7001), now);

        registry.receive_input(addr(7001), input(1, 10), now);
        registry.receive_input(addr(7001), input(3, 30), now);
        registry.drain_inputs();

        // A late copy of an applied input arrives after the drain
        registry.receive_input(addr(7001), input(2, 20), now);
        registry.receive_input(addr(7001), input(4, 40), now);

        let drained = registry.drain_inputs();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1.sequence, 4);
        assert_eq!(registry.get(id).unwrap().applied_through, 4);
    }

    #[test]
    fn test_expire_closes_only_silent_sessions() {
        let mut registry = SessionRegistry::new();
        let t0 = Instant::now();
        let (quiet, _) = registry.admit(addr(7001), t0);
        let (chatty, _) = registry.admit(addr(7002), t0);

        let later = t0 + Duration::from_secs(4);
        registry.receive_input(addr(7002), input(1, 10), later);

        assert!(registry.expire(later, SESSION_TIMEOUT).is_empty());

        let expired = registry.expire(t0 + Duration::from_secs(6), SESSION_TIMEOUT);
        assert_eq!(expired, vec![quiet]);
        assert_eq!(registry.id_for(addr(7002)), Some(chatty));
        assert_eq!(registry.id_for(addr(7001)), None);
    }
}
