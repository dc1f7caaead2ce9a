//! Table-driven message dispatch.
//!
//! The read loop never matches on message types itself: it hands every
//! decoded frame to the table, which looks the handler up by the `type`
//! string.  New message kinds register without touching the loop.

use std::collections::HashMap;
use std::sync::Arc;

use js8_protocol::{Frame, kinds};
use tracing::warn;

use crate::interface::{ConnectionHandle, Interface};
use crate::{Engine, transmit};

/// Everything a handler can reach: the shared engine, the interface the
/// connection is attached to, and the connection's own outbound queue.
pub struct Context {
    pub engine: Engine,
    pub iface: Arc<Interface>,
    pub conn: ConnectionHandle,
}

pub type Handler = fn(&Context, Frame);

/// Registration table keyed by the wire `type` string.
pub struct HandlerTable {
    handlers: HashMap<&'static str, Handler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        HandlerTable {
            handlers: HashMap::new(),
        }
    }

    /// The standard client-request handlers.
    pub fn with_defaults() -> Self {
        let mut table = HandlerTable::new();
        table.register(kinds::STATION_GET_CALLSIGN, get_callsign);
        table.register(kinds::RIG_GET_FREQ, get_freq);
        table.register(kinds::RIG_SET_FREQ, set_freq);
        table.register(kinds::TX_SEND_MESSAGE, send_message);
        table
    }

    pub fn register(&mut self, kind: &'static str, handler: Handler) {
        self.handlers.insert(kind, handler);
    }

    pub fn dispatch(&self, ctx: &Context, frame: Frame) {
        match self.handlers.get(frame.kind.as_str()) {
            Some(handler) => handler(ctx, frame),
            None => warn!(kind = %frame.kind, "ignoring unknown message type"),
        }
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        HandlerTable::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Standard handlers
// ---------------------------------------------------------------------------

fn get_callsign(ctx: &Context, frame: Frame) {
    let Some(id) = frame.request_id() else {
        warn!(kind = %frame.kind, "request without usable _ID, ignoring");
        return;
    };
    ctx.conn
        .enqueue(js8_protocol::station_callsign(id, ctx.iface.callsign()));
}

fn get_freq(ctx: &Context, frame: Frame) {
    let Some(id) = frame.request_id() else {
        warn!(kind = %frame.kind, "request without usable _ID, ignoring");
        return;
    };
    ctx.conn.enqueue(js8_protocol::rig_freq(
        id,
        ctx.iface.dial_hz(),
        ctx.iface.offset_hz(),
    ));
}

fn set_freq(ctx: &Context, frame: Frame) {
    let Some(dial) = frame.dial_param() else {
        warn!(kind = %frame.kind, "RIG.SET_FREQ without usable DIAL, ignoring");
        return;
    };
    // STATION.STATUS reflects interface state, so every connection attached
    // to the interface hears about the retune, not just the requester.
    ctx.iface.set_dial(dial);
}

fn send_message(ctx: &Context, frame: Frame) {
    if frame.request_id().is_none() {
        warn!(kind = %frame.kind, "request without usable _ID, ignoring");
        return;
    }
    transmit::spawn(ctx, frame.value);
}
