//! Per-station state: identity, tuning, and the live connection set.
//!
//! An Interface owns the registration handles of its connections; a
//! connection's tasks carry only an `Arc<Interface>` back-reference, so there
//! is no ownership cycle.  Dial mutation and connection enumeration share one
//! lock, so no broadcast ever observes a half-updated interface.

use std::sync::Mutex;

use js8_protocol::Frame;
use tokio::sync::mpsc;
use tracing::debug;

use crate::clock;

/// A cheap handle onto one connection's ordered outbound queue.
///
/// Enqueueing never blocks; the queue is drained by the connection's single
/// writer task, which preserves FIFO order and never interleaves two frames.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    tx: mpsc::UnboundedSender<Frame>,
}

impl ConnectionHandle {
    pub fn new(id: u64, tx: mpsc::UnboundedSender<Frame>) -> Self {
        ConnectionHandle { id, tx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a frame for delivery.  Returns false when the writer is gone.
    pub fn enqueue(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

struct State {
    dial_hz: u64,
    connections: Vec<ConnectionHandle>,
}

/// One emulated station.
pub struct Interface {
    port: u16,
    callsign: String,
    grid: String,
    offset_hz: u64,
    state: Mutex<State>,
}

impl Interface {
    pub fn new(port: u16, callsign: String, dial_hz: u64, offset_hz: u64, grid: String) -> Self {
        Interface {
            port,
            callsign,
            grid,
            offset_hz,
            state: Mutex::new(State {
                dial_hz,
                connections: Vec::new(),
            }),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn callsign(&self) -> &str {
        &self.callsign
    }

    pub fn grid(&self) -> &str {
        &self.grid
    }

    pub fn offset_hz(&self) -> u64 {
        self.offset_hz
    }

    pub fn dial_hz(&self) -> u64 {
        self.lock().dial_hz
    }

    /// Derived, never stored: dial plus audio offset.
    pub fn freq_hz(&self) -> u64 {
        self.dial_hz() + self.offset_hz
    }

    /// Retune the station and notify every attached connection with a
    /// STATION.STATUS reflecting the new state.
    pub fn set_dial(&self, dial_hz: u64) {
        let mut state = self.lock();
        state.dial_hz = dial_hz;
        let status = js8_protocol::station_status(clock::status_id(), dial_hz, self.offset_hz);
        state.connections.retain(|conn| conn.enqueue(status.clone()));
    }

    pub fn attach(&self, handle: ConnectionHandle) {
        self.lock().connections.push(handle);
    }

    pub fn detach(&self, id: u64) {
        self.lock().connections.retain(|conn| conn.id() != id);
    }

    pub fn detach_all(&self) {
        self.lock().connections.clear();
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Enqueue a frame on every attached connection, pruning dead handles.
    pub fn broadcast(&self, frame: Frame) {
        self.broadcast_all(std::slice::from_ref(&frame));
    }

    /// Enqueue `frames` back-to-back on every attached connection.  The
    /// frames land adjacently in each queue (the lock is held across both
    /// sends), which is what keeps RX.DIRECTED and RX.SPOT paired.
    pub fn broadcast_all(&self, frames: &[Frame]) {
        let mut state = self.lock();
        let before = state.connections.len();
        state
            .connections
            .retain(|conn| frames.iter().all(|frame| conn.enqueue(frame.clone())));
        let pruned = before - state.connections.len();
        if pruned > 0 {
            debug!(callsign = %self.callsign, pruned, "dropped dead connections during broadcast");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("interface state lock poisoned")
    }
}
