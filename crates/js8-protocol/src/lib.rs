// js8-protocol: JS8Call service wire frames and serialization.
//
// On the wire every message is a single line: a JSON object carrying exactly
// the keys `type`, `value`, `params`, terminated by a line-feed byte (0x0A).
// `value` is always a string (possibly empty); `params` is an object whose
// members depend on `type`.  Field order is not part of the contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// The `type` strings of every recognized message.
pub mod kinds {
    // client -> emulator
    pub const STATION_GET_CALLSIGN: &str = "STATION.GET_CALLSIGN";
    pub const RIG_GET_FREQ: &str = "RIG.GET_FREQ";
    pub const RIG_SET_FREQ: &str = "RIG.SET_FREQ";
    pub const TX_SEND_MESSAGE: &str = "TX.SEND_MESSAGE";

    // emulator -> client
    pub const STATION_CALLSIGN: &str = "STATION.CALLSIGN";
    pub const STATION_STATUS: &str = "STATION.STATUS";
    pub const RIG_FREQ: &str = "RIG.FREQ";
    pub const RIG_PTT: &str = "RIG.PTT";
    pub const RX_ACTIVITY: &str = "RX.ACTIVITY";
    pub const RX_DIRECTED: &str = "RX.DIRECTED";
    pub const RX_SPOT: &str = "RX.SPOT";
}

/// The five bytes appended to a reassembled payload in RX.DIRECTED text:
/// space, U+2666 BLACK DIAMOND SUIT (0xE2 0x99 0xA6), space.
pub const DIRECTED_TERMINATOR: &str = " \u{2666} ";

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A single wire message.
///
/// Frames are transient: decoded, handled, and discarded.  Emulator-originated
/// frames are built with the constructors below so numeric params keep their
/// JSON type (`DIAL`/`FREQ`/`OFFSET`/`SNR`/`UTC`/`SPEED` integers, `TDRIFT`
/// float, `PTT` boolean).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Frame {
    pub fn new(kind: &str, value: impl Into<String>) -> Self {
        Frame {
            kind: kind.to_owned(),
            value: value.into(),
            params: Map::new(),
        }
    }

    /// Add one param, builder-style.
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_owned(), value.into());
        self
    }

    /// Parse one line (without its terminating line feed) into a frame.
    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Serialize to UTF-8 JSON followed by a single line feed.
    ///
    /// serde_json emits non-ASCII text verbatim, so the U+2666 delimiter
    /// travels as its three UTF-8 bytes rather than a \u escape.
    pub fn encode_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// The inbound `_ID` as an integer.
    ///
    /// Clients send `_ID` as a decimal string (e.g. "1769098601798"); a JSON
    /// integer is accepted too.  Replies must echo the integer form.
    pub fn request_id(&self) -> Option<i64> {
        match self.params.get("_ID")? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// The inbound `DIAL` param of a RIG.SET_FREQ, in Hz.
    pub fn dial_param(&self) -> Option<u64> {
        match self.params.get("DIAL")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Directed-text conventions
// ---------------------------------------------------------------------------

/// The finalized text of a transmission: the payload plus the terminator.
pub fn directed_text(payload: &str) -> String {
    let mut text = String::with_capacity(payload.len() + DIRECTED_TERMINATOR.len());
    text.push_str(payload);
    text.push_str(DIRECTED_TERMINATOR);
    text
}

/// The addressee of a directed payload: its second whitespace-delimited word,
/// or the empty string.
pub fn directed_addressee(payload: &str) -> &str {
    payload.split_whitespace().nth(1).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Emulator-originated frames
// ---------------------------------------------------------------------------

/// STATION.CALLSIGN reply; `id` echoes the request `_ID`.
pub fn station_callsign(id: i64, callsign: &str) -> Frame {
    Frame::new(kinds::STATION_CALLSIGN, callsign).param("_ID", id)
}

/// RIG.FREQ reply; `id` echoes the request `_ID`.
pub fn rig_freq(id: i64, dial_hz: u64, offset_hz: u64) -> Frame {
    Frame::new(kinds::RIG_FREQ, "")
        .param("_ID", id)
        .param("DIAL", dial_hz)
        .param("OFFSET", offset_hz)
        .param("FREQ", dial_hz + offset_hz)
}

/// STATION.STATUS notification; `id` is the station-status epoch offset form,
/// not an echo, and travels as a decimal string rather than a JSON integer.
pub fn station_status(id: i64, dial_hz: u64, offset_hz: u64) -> Frame {
    Frame::new(kinds::STATION_STATUS, "")
        .param("_ID", id.to_string())
        .param("DIAL", dial_hz)
        .param("OFFSET", offset_hz)
        .param("FREQ", dial_hz + offset_hz)
        .param("SELECTED", "")
        .param("SPEED", 1)
}

/// RIG.PTT transition on the sender's rig.
pub fn rig_ptt(keyed: bool, utc_ms: i64) -> Frame {
    Frame::new(kinds::RIG_PTT, if keyed { "on" } else { "off" })
        .param("PTT", keyed)
        .param("UTC", utc_ms)
        .param("_ID", -1)
}

/// One received fragment on a co-frequency station.
pub fn rx_activity(
    fragment: &str,
    dial_hz: u64,
    offset_hz: u64,
    snr: i64,
    tdrift: f64,
    utc_ms: i64,
) -> Frame {
    Frame::new(kinds::RX_ACTIVITY, fragment)
        .param("DIAL", dial_hz)
        .param("OFFSET", offset_hz)
        .param("FREQ", dial_hz + offset_hz)
        .param("SNR", snr)
        .param("SPEED", 1)
        .param("TDRIFT", tdrift)
        .param("UTC", utc_ms)
        .param("_ID", -1)
}

/// The reassembled, terminated transmission as seen by a receiving station.
#[allow(clippy::too_many_arguments)]
pub fn rx_directed(
    text: &str,
    from: &str,
    to: &str,
    dial_hz: u64,
    offset_hz: u64,
    snr: i64,
    tdrift: f64,
    utc_ms: i64,
) -> Frame {
    Frame::new(kinds::RX_DIRECTED, text)
        .param("CMD", " ")
        .param("DIAL", dial_hz)
        .param("OFFSET", offset_hz)
        .param("FREQ", dial_hz + offset_hz)
        .param("FROM", from)
        .param("TO", to)
        .param("GRID", "")
        .param("EXTRA", "")
        .param("SNR", snr)
        .param("SPEED", 1)
        .param("TDRIFT", tdrift)
        .param("UTC", utc_ms)
        .param("_ID", -1)
        .param("TEXT", text)
}

/// The spot announcement paired with an RX.DIRECTED.  `grid` is the sender's
/// locator; the wire form keeps a single leading space (e.g. `" JO01"`).
pub fn rx_spot(call: &str, grid: &str, dial_hz: u64, offset_hz: u64, snr: i64) -> Frame {
    Frame::new(kinds::RX_SPOT, "")
        .param("CALL", call)
        .param("DIAL", dial_hz)
        .param("OFFSET", offset_hz)
        .param("FREQ", dial_hz + offset_hz)
        .param("GRID", format!(" {grid}"))
        .param("SNR", snr)
        .param("_ID", -1)
}
