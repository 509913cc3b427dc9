//! Session task - one running simulation per room, driven by a tokio interval

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use glam::Vec2;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::ws::protocol::ServerMsg;

use super::clock::SimulationClock;
use super::error::SimError;
use super::input::InputChannel;
use super::presenter::{BroadcastPresenter, PresentationAdapter, SnapshotStats};
use super::PlayerId;

/// Membership notifications from the transport, applied between ticks.
/// `conn` identifies the socket so a late close from a replaced socket can
/// be told apart from the current one.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Connect {
        player: PlayerId,
        conn: Uuid,
        name: String,
    },
    Disconnect {
        player: PlayerId,
        conn: Uuid,
    },
}

/// The socket currently driving a device
#[derive(Debug, Clone)]
struct DeviceLink {
    conn: Uuid,
    name: String,
}

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub room: String,
    /// Device connections write here directly
    pub inputs: Arc<InputChannel>,
    pub command_tx: mpsc::Sender<SessionCommand>,
    pub frame_tx: broadcast::Sender<Arc<str>>,
    pub player_count: Arc<AtomicUsize>,
    pub stats: Arc<Mutex<SnapshotStats>>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Receive serialized screen frames
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.frame_tx.subscribe()
    }

    /// Register a new socket for `player`. Returns the connection id to pass
    /// back to `disconnect`.
    pub async fn connect(&self, player: PlayerId, name: String) -> Uuid {
        let conn = Uuid::new_v4();
        if self
            .command_tx
            .send(SessionCommand::Connect { player, conn, name })
            .await
            .is_err()
        {
            warn!(room = %self.room, "Session closed before connect");
        }
        conn
    }

    pub async fn disconnect(&self, player: PlayerId, conn: Uuid) {
        if self
            .command_tx
            .send(SessionCommand::Disconnect { player, conn })
            .await
            .is_err()
        {
            debug!(room = %self.room, "Session closed before disconnect");
        }
    }
}

/// Registry of all running sessions, keyed by room code
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    sim: SimConfig,
    idle_grace: Duration,
}

impl SessionRegistry {
    pub fn new(sim: SimConfig, idle_grace: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            sim,
            idle_grace,
        }
    }

    pub fn get(&self, room: &str) -> Option<SessionHandle> {
        self.sessions.get(room).map(|s| s.value().clone())
    }

    /// Return the room's session, starting one if needed
    pub fn get_or_create(self: &Arc<Self>, room: &str) -> SessionHandle {
        let entry = self.sessions.entry(room.to_string()).or_insert_with(|| {
            let seed = rand::random::<u64>();
            let (session, handle) =
                GameSession::new(room.to_string(), seed, self.sim, self.idle_grace);

            let registry = Arc::clone(self);
            let room = handle.room.clone();
            let id = handle.id;
            tokio::spawn(async move {
                session.run().await;
                registry.sessions.remove_if(&room, |_, h| h.id == id);
            });
            handle
        });
        entry.value().clone()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions
            .iter()
            .map(|s| s.value().player_count())
            .sum()
    }

    /// (room, players) pairs sorted by room
    pub fn summaries(&self) -> Vec<(String, usize)> {
        let mut rooms: Vec<(String, usize)> = self
            .sessions
            .iter()
            .map(|s| (s.key().clone(), s.value().player_count()))
            .collect();
        rooms.sort();
        rooms
    }
}

/// The authoritative session for one room
pub struct GameSession {
    id: Uuid,
    room: String,
    clock: SimulationClock,
    command_rx: mpsc::Receiver<SessionCommand>,
    frame_tx: broadcast::Sender<Arc<str>>,
    presenter: BroadcastPresenter,
    rng: ChaCha8Rng,
    /// Devices with an open connection
    connected: BTreeMap<PlayerId, DeviceLink>,
    player_count: Arc<AtomicUsize>,
    idle_grace: Duration,
}

impl GameSession {
    pub fn new(
        room: String,
        seed: u64,
        sim: SimConfig,
        idle_grace: Duration,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (frame_tx, _) = broadcast::channel(64);
        let inputs = Arc::new(InputChannel::new());
        let player_count = Arc::new(AtomicUsize::new(0));
        let presenter = BroadcastPresenter::new(frame_tx.clone(), sim.snapshot_interval);

        let handle = SessionHandle {
            id: Uuid::new_v4(),
            room: room.clone(),
            inputs: inputs.clone(),
            command_tx,
            frame_tx: frame_tx.clone(),
            player_count: player_count.clone(),
            stats: presenter.stats(),
        };

        let session = Self {
            id: handle.id,
            room,
            clock: SimulationClock::new(sim, inputs),
            command_rx,
            frame_tx,
            presenter,
            rng: ChaCha8Rng::seed_from_u64(seed),
            connected: BTreeMap::new(),
            player_count,
            idle_grace,
        };

        (session, handle)
    }

    /// Run the tick loop until the session is empty for the idle grace period
    pub async fn run(mut self) {
        info!(session = %self.id, room = %self.room, "Session started");

        let tick_rate = self.clock.config().tick_rate;
        let mut tick_interval = interval(Duration::from_micros(1_000_000 / u64::from(tick_rate)));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut empty_since: Option<Instant> = None;

        loop {
            tick_interval.tick().await;

            self.process_commands();
            self.rejoin_returning_devices();

            match self.clock.tick(started.elapsed().as_secs_f64()) {
                Ok(snapshot) => self.presenter.present(&snapshot),
                Err(e) => {
                    error!(session = %self.id, error = %e, "Simulation invariant violated, ending session");
                    break;
                }
            }

            self.player_count
                .store(self.connected.len(), Ordering::Relaxed);

            if self.connected.is_empty() && self.frame_tx.receiver_count() == 0 {
                let since = *empty_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.idle_grace {
                    info!(session = %self.id, room = %self.room, "Session empty, shutting down");
                    break;
                }
            } else {
                empty_since = None;
            }
        }

        let end = ServerMsg::SessionEnded {
            room: self.room.clone(),
        };
        if let Ok(json) = serde_json::to_string(&end) {
            let _ = self.frame_tx.send(Arc::from(json));
        }
    }

    /// Apply all queued membership notifications
    fn process_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                SessionCommand::Connect { player, conn, name } => {
                    self.handle_connect(player, conn, name)
                }
                SessionCommand::Disconnect { player, conn } => self.handle_disconnect(player, conn),
            }
        }
    }

    fn handle_connect(&mut self, player: PlayerId, conn: Uuid, name: String) {
        let link = DeviceLink {
            conn,
            name: name.clone(),
        };
        if let Some(replaced) = self.connected.insert(player.clone(), link) {
            debug!(room = %self.room, player = %player, old_conn = %replaced.conn, old_name = %replaced.name, "Socket replaced");
        }

        let spawn = self.spawn_point();
        match self.clock.join(player.clone(), spawn) {
            Ok(entity) => {
                info!(room = %self.room, player = %player, name = %name, instance = entity.instance, "Device joined");
            }
            Err(SimError::AlreadyJoined(_)) => {
                // Reconnect: keep driving the existing entity
                if self.clock.cancel_leave(&player) {
                    debug!(room = %self.room, player = %player, "Pending leave withdrawn");
                }
                info!(room = %self.room, player = %player, "Device reattached to live entity");
            }
            Err(e) => warn!(room = %self.room, player = %player, error = %e, "Join failed"),
        }
    }

    fn handle_disconnect(&mut self, player: PlayerId, conn: Uuid) {
        if self.connected.get(&player).map(|link| link.conn) != Some(conn) {
            debug!(room = %self.room, player = %player, conn = %conn, "Stale disconnect ignored");
            return;
        }
        self.connected.remove(&player);
        match self.clock.leave(&player) {
            Ok(()) => info!(room = %self.room, player = %player, "Device disconnected"),
            Err(e) => debug!(room = %self.room, player = %player, error = %e, "Leave ignored"),
        }
    }

    /// Connected devices whose entity was recycled come back on fresh input
    fn rejoin_returning_devices(&mut self) {
        let returning: Vec<PlayerId> = self
            .connected
            .keys()
            .filter(|player| {
                !self.clock.registry().contains(player)
                    && self.clock.inputs().read(player).is_some()
            })
            .cloned()
            .collect();

        for player in returning {
            let spawn = self.spawn_point();
            if let Ok(entity) = self.clock.join(player.clone(), spawn) {
                info!(room = %self.room, player = %player, instance = entity.instance, "Device respawned");
            }
        }
    }

    /// Uniform spawn position inside the arena
    fn spawn_point(&mut self) -> Vec2 {
        let cfg = self.clock.config();
        let half_x = (cfg.arena_width / 2.0 - cfg.entity_radius).max(1.0);
        let half_y = (cfg.arena_height / 2.0 - cfg.entity_radius).max(1.0);
        let x = self.rng.gen_range(-half_x..half_x);
        let y = self.rng.gen_range(-half_y..half_y);
        Vec2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{DestroyCause, GameEvent, PartialInput};

    fn session() -> GameSession {
        GameSession::new("room".into(), 1, SimConfig::default(), Duration::from_secs(1)).0
    }

    fn moving() -> PartialInput {
        PartialInput {
            moving: Some(true),
            ..Default::default()
        }
    }

    /// One scheduler step: drain commands, respawn, tick
    fn step(session: &mut GameSession, n: u64) -> crate::game::TickSnapshot {
        session.process_commands();
        session.rejoin_returning_devices();
        session.clock.tick(n as f64 / 60.0).unwrap()
    }

    #[test]
    fn same_seed_gives_same_spawn_sequence() {
        let sim = SimConfig::default();
        let (mut a, _) = GameSession::new("a".into(), 7, sim, Duration::from_secs(1));
        let (mut b, _) = GameSession::new("b".into(), 7, sim, Duration::from_secs(1));

        for _ in 0..5 {
            let (pa, pb) = (a.spawn_point(), b.spawn_point());
            assert_eq!(pa, pb);
            assert!(pa.x.abs() <= sim.arena_width / 2.0);
            assert!(pa.y.abs() <= sim.arena_height / 2.0);
        }
    }

    #[test]
    fn reconnect_keeps_existing_entity() {
        let mut session = session();
        let alice = PlayerId::from("alice");

        session.handle_connect(alice.clone(), Uuid::new_v4(), "Alice".into());
        let instance = session.clock.registry().get(&alice).unwrap().instance;
        session.handle_connect(alice.clone(), Uuid::new_v4(), "Alice".into());

        assert_eq!(session.clock.registry().len(), 1);
        assert_eq!(session.clock.registry().get(&alice).unwrap().instance, instance);
    }

    #[test]
    fn late_close_of_replaced_socket_is_ignored() {
        let mut session = session();
        let alice = PlayerId::from("alice");
        let old_conn = Uuid::new_v4();
        let new_conn = Uuid::new_v4();

        session.handle_connect(alice.clone(), old_conn, "Alice".into());
        session.clock.tick(1.0 / 60.0).unwrap();
        let instance = session.clock.registry().get(&alice).unwrap().instance;

        session.handle_connect(alice.clone(), new_conn, "Alice".into());
        session.handle_disconnect(alice.clone(), old_conn);
        assert!(session.connected.contains_key(&alice));

        for n in 2..=60 {
            session.clock.inputs().update(&alice, moving());
            let snapshot = step(&mut session, n);
            assert!(snapshot.events.is_empty());
        }
        let entity = session.clock.registry().get(&alice).unwrap();
        assert_eq!(entity.instance, instance);
        assert!(entity.is_live());

        // The current socket still disconnects normally
        session.handle_disconnect(alice.clone(), new_conn);
        assert!(session.connected.is_empty());
    }

    #[test]
    fn reconnect_within_one_tick_cancels_pending_leave() {
        let mut session = session();
        let alice = PlayerId::from("alice");
        let first = Uuid::new_v4();

        session.handle_connect(alice.clone(), first, "Alice".into());
        session.clock.tick(1.0 / 60.0).unwrap();
        let instance = session.clock.registry().get(&alice).unwrap().instance;
        session.clock.inputs().update(&alice, moving());

        session.handle_disconnect(alice.clone(), first);
        session.handle_connect(alice.clone(), Uuid::new_v4(), "Alice".into());
        let snapshot = session.clock.tick(2.0 / 60.0).unwrap();

        assert!(!snapshot.events.iter().any(|e| matches!(
            e,
            GameEvent::Destroy {
                cause: DestroyCause::Left,
                ..
            }
        )));
        let entity = snapshot.entity(&alice).unwrap();
        assert_eq!(entity.instance, instance);
        assert!(entity.is_live());
        assert!(session.clock.inputs().read(&alice).is_some());
    }

    #[test]
    fn handle_commands_apply_at_next_drain() {
        let (mut session, handle) =
            GameSession::new("room".into(), 3, SimConfig::default(), Duration::from_secs(1));
        let bob = PlayerId::from("bob");

        let conn = tokio_test::block_on(handle.connect(bob.clone(), "Bob".into()));
        assert!(!session.clock.registry().contains(&bob));

        session.process_commands();
        assert!(session.clock.registry().contains(&bob));

        tokio_test::block_on(handle.disconnect(bob.clone(), conn));
        session.process_commands();
        assert!(session.connected.is_empty());
        // Leave is applied by the next tick
        assert!(session.clock.registry().get(&bob).is_some_and(|e| e.is_live()));
        session.clock.tick(1.0 / 60.0).unwrap();
        assert!(!session.clock.registry().get(&bob).is_some_and(|e| e.is_live()));
    }

    #[test]
    fn recycled_device_respawns_only_after_new_input() {
        let mut session = session();
        let alice = PlayerId::from("alice");
        session.handle_connect(alice.clone(), Uuid::new_v4(), "Alice".into());
        let first = session.clock.registry().get(&alice).unwrap().instance;

        // Drain the entity without closing the connection
        session.clock.leave(&alice).unwrap();
        for i in 1..=3 {
            session.clock.tick(i as f64 / 60.0).unwrap();
        }
        assert!(!session.clock.registry().contains(&alice));

        session.rejoin_returning_devices();
        assert!(!session.clock.registry().contains(&alice));

        session.clock.inputs().update(&alice, PartialInput::default());
        session.rejoin_returning_devices();
        let second = session.clock.registry().get(&alice).unwrap().instance;
        assert_ne!(first, second);
    }
}
