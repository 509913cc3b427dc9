//! Presentation boundary - hands tick snapshots to whatever draws them

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::ws::protocol::ServerMsg;

use super::snapshot::{GameEvent, TickSnapshot};

/// Consumer of tick snapshots. Implementations must treat the snapshot as
/// read-only and must not hold on to it past the call.
pub trait PresentationAdapter {
    fn present(&mut self, snapshot: &TickSnapshot);
}

/// Serializes snapshots into screen frames and broadcasts them.
///
/// Sends one frame every `interval` ticks; events from skipped ticks are
/// carried into the next frame.
pub struct BroadcastPresenter {
    tx: broadcast::Sender<Arc<str>>,
    interval: u32,
    ticks_since_frame: u32,
    carried_events: Vec<GameEvent>,
    stats: Arc<Mutex<SnapshotStats>>,
}

impl BroadcastPresenter {
    pub fn new(tx: broadcast::Sender<Arc<str>>, interval: u32) -> Self {
        Self {
            tx,
            interval: interval.max(1),
            // First snapshot always goes out
            ticks_since_frame: interval.max(1) - 1,
            carried_events: Vec::new(),
            stats: Arc::new(Mutex::new(SnapshotStats::default())),
        }
    }

    pub fn stats(&self) -> Arc<Mutex<SnapshotStats>> {
        self.stats.clone()
    }

    /// Check if it's time to send a frame
    fn should_send(&mut self) -> bool {
        self.ticks_since_frame += 1;
        if self.ticks_since_frame >= self.interval {
            self.ticks_since_frame = 0;
            true
        } else {
            false
        }
    }
}

impl PresentationAdapter for BroadcastPresenter {
    fn present(&mut self, snapshot: &TickSnapshot) {
        self.carried_events.extend(snapshot.events.iter().cloned());
        if !self.should_send() {
            return;
        }

        let frame = ServerMsg::Frame {
            tick: snapshot.tick,
            entities: snapshot.entities.clone(),
            projectiles: snapshot.projectiles.clone(),
            events: std::mem::take(&mut self.carried_events),
        };

        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!(tick = snapshot.tick, error = %e, "Failed to serialize frame");
                return;
            }
        };

        self.stats.lock().record(snapshot.entities.len(), json.len());

        // No screens attached is fine
        let _ = self.tx.send(Arc::from(json));
    }
}

/// Frame statistics for debugging
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotStats {
    pub total_frames: u64,
    pub total_bytes: u64,
    pub avg_entities_per_frame: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, entity_count: usize, bytes: usize) {
        self.total_frames += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_frames as f32;
        self.avg_entities_per_frame =
            self.avg_entities_per_frame * ((n - 1.0) / n) + (entity_count as f32 / n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snapshot::DestroyCause;
    use crate::game::PlayerId;

    fn snapshot(tick: u64, events: Vec<GameEvent>) -> TickSnapshot {
        TickSnapshot {
            tick,
            dt: 1.0 / 60.0,
            entities: Vec::new(),
            projectiles: Vec::new(),
            events,
        }
    }

    fn left(name: &str) -> GameEvent {
        GameEvent::Destroy {
            player: PlayerId::from(name),
            instance: 1,
            cause: DestroyCause::Left,
        }
    }

    #[test]
    fn skipped_ticks_carry_events_forward() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut presenter = BroadcastPresenter::new(tx, 2);

        presenter.present(&snapshot(1, vec![]));
        presenter.present(&snapshot(2, vec![left("alice")]));
        presenter.present(&snapshot(3, vec![left("bob")]));

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["tick"], 1);

        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["type"], "frame");
        assert_eq!(second["tick"], 3);
        let players: Vec<&str> = second["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["player"].as_str().unwrap())
            .collect();
        assert_eq!(players, ["alice", "bob"]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stats_track_sent_frames() {
        let (tx, _rx) = broadcast::channel(8);
        let mut presenter = BroadcastPresenter::new(tx, 1);
        presenter.present(&snapshot(1, vec![]));
        presenter.present(&snapshot(2, vec![]));

        let stats = *presenter.stats().lock();
        assert_eq!(stats.total_frames, 2);
        assert!(stats.total_bytes > 0);
    }
}
