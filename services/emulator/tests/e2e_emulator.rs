//! End-to-end tests: a full emulator bound on OS-assigned ports, driven by
//! real TCP clients speaking the newline-delimited JSON protocol.

use std::net::SocketAddr;
use std::time::Duration;

use js8emu::{Emulator, load_config_from_str};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{Instant, timeout};

/// Four stations, two dial frequencies, fast frames for test speed.
const CONFIG: &str = r#"
[general]
fragment_size = 4
frame_time = 0.05
seed = 7

[interface_1]
port = 0
callsign = "2E0FGO"
frequency = 3578000
offset = 1250
maidenhead = "JO01"

[interface_2]
port = 0
callsign = "M0PXO"
frequency = 7078000
offset = 1500
maidenhead = "IO91"

[interface_3]
port = 0
callsign = "G8KHF"
frequency = 3578000
offset = 2000
maidenhead = "JO02"

[interface_4]
port = 0
callsign = "2E1HNK"
frequency = 7078000
offset = 1750
maidenhead = "IO83"
"#;

async fn start_emulator() -> Vec<SocketAddr> {
    let config = load_config_from_str(CONFIG).expect("config");
    let emulator = Emulator::bind(&config).await.expect("bind");
    let addrs = emulator.local_addrs();
    tokio::spawn(emulator.serve(std::future::pending()));
    addrs
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", addr.port()))
            .await
            .expect("connect");
        let (read_half, write_half) = stream.into_split();
        Client {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write");
    }

    async fn recv(&mut self) -> Value {
        let mut line = String::new();
        timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .expect("read");
        serde_json::from_str(line.trim_end()).expect("frame must be JSON")
    }

    /// Read every frame that arrives within `window`.
    async fn collect_for(&mut self, window: Duration) -> Vec<Value> {
        let deadline = Instant::now() + window;
        let mut frames = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return frames;
            }
            let mut line = String::new();
            match timeout(remaining, self.reader.read_line(&mut line)).await {
                Err(_) => return frames,
                Ok(Ok(0)) => return frames,
                Ok(Ok(_)) => frames.push(serde_json::from_str(line.trim_end()).expect("JSON")),
                Ok(Err(e)) => panic!("read failed: {e}"),
            }
        }
    }

    /// Round-trip a query so the emulator has definitely registered this
    /// client before a broadcast starts.
    async fn ready(&mut self) {
        self.send(r#"{"type":"STATION.GET_CALLSIGN","value":"","params":{"_ID":"0"}}"#)
            .await;
        let _ = self.recv().await;
    }

    async fn expect_silence(&mut self, window: Duration) {
        let frames = self.collect_for(window).await;
        assert!(frames.is_empty(), "expected silence, got: {frames:?}");
    }
}

fn kind(frame: &Value) -> &str {
    frame["type"].as_str().expect("type")
}

// ---------------------------------------------------------------------------
// Scenario 1: callsign query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn callsign_query_echoes_id_as_integer() {
    let addrs = start_emulator().await;
    let mut client = Client::connect(addrs[0]).await;

    client
        .send(r#"{"type":"STATION.GET_CALLSIGN","value":"","params":{"_ID":"1"}}"#)
        .await;
    let reply = client.recv().await;
    assert_eq!(
        reply,
        serde_json::json!({"type": "STATION.CALLSIGN", "value": "2E0FGO", "params": {"_ID": 1}})
    );
}

// ---------------------------------------------------------------------------
// Scenario 2: frequency query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn freq_query_reports_dial_offset_and_derived_freq() {
    let addrs = start_emulator().await;
    let mut client = Client::connect(addrs[1]).await;

    client
        .send(r#"{"type":"RIG.GET_FREQ","value":"","params":{"_ID":"2"}}"#)
        .await;
    let reply = client.recv().await;
    assert_eq!(kind(&reply), "RIG.FREQ");
    assert_eq!(reply["params"]["_ID"], 2);
    assert_eq!(reply["params"]["DIAL"], 7_078_000);
    assert_eq!(reply["params"]["OFFSET"], 1_500);
    assert_eq!(reply["params"]["FREQ"], 7_079_500);
}

// ---------------------------------------------------------------------------
// Scenario 3: dial change
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dial_change_emits_status_and_sticks() {
    let addrs = start_emulator().await;
    let mut client = Client::connect(addrs[0]).await;

    client
        .send(r#"{"type":"RIG.SET_FREQ","value":"","params":{"_ID":"3","DIAL":7078000}}"#)
        .await;
    let status = client.recv().await;
    assert_eq!(kind(&status), "STATION.STATUS");
    assert_eq!(status["params"]["DIAL"], 7_078_000);
    assert_eq!(status["params"]["OFFSET"], 1_250);
    assert_eq!(status["params"]["FREQ"], 7_079_250);
    assert_eq!(status["params"]["SPEED"], 1);
    assert_eq!(status["params"]["SELECTED"], "");
    let status_id = status["params"]["_ID"]
        .as_str()
        .expect("status _ID is a decimal string");
    assert!(status_id.parse::<i64>().expect("decimal integer") > 0);

    client
        .send(r#"{"type":"RIG.GET_FREQ","value":"","params":{"_ID":"4"}}"#)
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["params"]["_ID"], 4);
    assert_eq!(reply["params"]["FREQ"], 7_079_250);
}

// ---------------------------------------------------------------------------
// Scenario 4: cross-frequency broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transmission_reaches_co_frequency_stations_only() {
    let addrs = start_emulator().await;
    let mut sender = Client::connect(addrs[0]).await;
    let mut off_dial_1 = Client::connect(addrs[1]).await;
    let mut receiver = Client::connect(addrs[2]).await;
    let mut off_dial_2 = Client::connect(addrs[3]).await;
    for client in [&mut sender, &mut off_dial_1, &mut receiver, &mut off_dial_2] {
        client.ready().await;
    }

    sender
        .send(r#"{"type":"TX.SEND_MESSAGE","value":"ABCDEFGHI","params":{"_ID":"5"}}"#)
        .await;

    // Receiver on the shared dial: fragments in order, then directed + spot.
    let frames = receiver.collect_for(Duration::from_millis(800)).await;
    assert_eq!(frames.len(), 5, "got: {frames:?}");

    let activity: Vec<&Value> = frames.iter().filter(|f| kind(f) == "RX.ACTIVITY").collect();
    let values: Vec<&str> = activity.iter().map(|f| f["value"].as_str().unwrap()).collect();
    assert_eq!(values, ["ABCD", "EFGH", "I"]);
    for frame in &activity {
        assert_eq!(frame["params"]["DIAL"], 3_578_000);
        assert_eq!(frame["params"]["OFFSET"], 2_000);
        assert_eq!(frame["params"]["FREQ"], 3_580_000);
        let snr = frame["params"]["SNR"].as_i64().unwrap();
        assert!((-20..=20).contains(&snr), "SNR out of range: {snr}");
        let tdrift = frame["params"]["TDRIFT"].as_f64().unwrap();
        assert!((-2.0..=2.0).contains(&tdrift), "TDRIFT out of range: {tdrift}");
    }

    let directed = &frames[3];
    assert_eq!(kind(directed), "RX.DIRECTED");
    assert_eq!(directed["params"]["TEXT"], "ABCDEFGHI \u{2666} ");
    assert_eq!(directed["value"], "ABCDEFGHI \u{2666} ");
    assert_eq!(directed["params"]["FROM"], "2E0FGO");
    assert_eq!(directed["params"]["TO"], "");
    assert_eq!(directed["params"]["CMD"], " ");

    let spot = &frames[4];
    assert_eq!(kind(spot), "RX.SPOT");
    assert_eq!(spot["params"]["CALL"], "2E0FGO");
    assert_eq!(spot["params"]["GRID"], " JO01");
    assert_eq!(spot["params"]["SNR"], directed["params"]["SNR"]);

    // Sender: three PTT on/off brackets and no RX traffic.
    let sender_frames = sender.collect_for(Duration::from_millis(400)).await;
    assert_eq!(sender_frames.len(), 6, "got: {sender_frames:?}");
    for (i, frame) in sender_frames.iter().enumerate() {
        assert_eq!(kind(frame), "RIG.PTT");
        let keyed = i % 2 == 0;
        assert_eq!(frame["value"], if keyed { "on" } else { "off" });
        assert_eq!(frame["params"]["PTT"], keyed);
        assert_eq!(frame["params"]["_ID"], -1);
        assert!(frame["params"]["UTC"].is_i64());
    }

    // Stations on the other dial hear nothing.
    off_dial_1.expect_silence(Duration::from_millis(200)).await;
    off_dial_2.expect_silence(Duration::from_millis(200)).await;
}

// ---------------------------------------------------------------------------
// Scenario 5: directed addressee extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn directed_addressee_is_second_word() {
    let addrs = start_emulator().await;
    let mut sender = Client::connect(addrs[1]).await;
    let mut receiver = Client::connect(addrs[3]).await;
    sender.ready().await;
    receiver.ready().await;

    sender
        .send(r#"{"type":"TX.SEND_MESSAGE","value":"M0PXO: 2E0FGO +E65","params":{"_ID":"6"}}"#)
        .await;

    let frames = receiver.collect_for(Duration::from_millis(900)).await;
    let directed = frames
        .iter()
        .find(|f| kind(f) == "RX.DIRECTED")
        .expect("directed frame");
    assert_eq!(directed["params"]["FROM"], "M0PXO");
    assert_eq!(directed["params"]["TO"], "2E0FGO");
    assert_eq!(directed["params"]["TEXT"], "M0PXO: 2E0FGO +E65 \u{2666} ");
}

// ---------------------------------------------------------------------------
// Scenario 6: isolation under concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simultaneous_jobs_keep_per_connection_ordering() {
    let addrs = start_emulator().await;
    let mut station_a = Client::connect(addrs[0]).await; // 2E0FGO, 3578000
    let mut station_b = Client::connect(addrs[2]).await; // G8KHF, 3578000
    station_a.ready().await;
    station_b.ready().await;

    station_a
        .send(r#"{"type":"TX.SEND_MESSAGE","value":"AAAABBBBCCCC","params":{"_ID":"7"}}"#)
        .await;
    station_b
        .send(r#"{"type":"TX.SEND_MESSAGE","value":"XXXXYYYYZZZZ","params":{"_ID":"8"}}"#)
        .await;

    let frames_a = station_a.collect_for(Duration::from_millis(900)).await;
    let frames_b = station_b.collect_for(Duration::from_millis(900)).await;

    // Each sender sees its own PTT brackets strictly alternating, and
    // receives the other's fragments in order.
    for (frames, expected_payload) in [(&frames_a, "XXXXYYYYZZZZ"), (&frames_b, "AAAABBBBCCCC")] {
        let ptt: Vec<&Value> = frames.iter().filter(|f| kind(f) == "RIG.PTT").collect();
        assert_eq!(ptt.len(), 6, "got: {frames:?}");
        for (i, frame) in ptt.iter().enumerate() {
            assert_eq!(frame["value"], if i % 2 == 0 { "on" } else { "off" });
        }

        let received: String = frames
            .iter()
            .filter(|f| kind(f) == "RX.ACTIVITY")
            .map(|f| f["value"].as_str().unwrap())
            .collect();
        assert_eq!(received, expected_payload);

        let directed = frames
            .iter()
            .find(|f| kind(f) == "RX.DIRECTED")
            .expect("directed frame");
        assert_eq!(
            directed["params"]["TEXT"],
            format!("{expected_payload} \u{2666} ")
        );
    }
}
