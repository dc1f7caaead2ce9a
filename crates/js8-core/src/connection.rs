//! One reader task and one writer task per accepted TCP connection.
//!
//! The reader splits the inbound byte stream on line feeds and hands decoded
//! frames to the dispatch table; malformed lines are dropped with a warning
//! and the connection survives.  The writer is the only task that touches the
//! socket's write half: it drains the ordered queue one line at a time,
//! flushing after each, so writes on a connection are strictly FIFO.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use js8_protocol::Frame;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Engine;
use crate::dispatch::Context;
use crate::interface::{ConnectionHandle, Interface};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Drive one client connection until the peer goes away.
pub async fn serve(engine: Engine, iface: Arc<Interface>, stream: TcpStream, peer: SocketAddr) {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = ConnectionHandle::new(id, tx);
    iface.attach(handle.clone());
    let writer = tokio::spawn(write_loop(iface.clone(), id, peer, write_half, rx));

    let ctx = Context {
        engine: engine.clone(),
        iface: iface.clone(),
        conn: handle,
    };

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Frame::decode(&line) {
                    Ok(frame) => engine.table.dispatch(&ctx, frame),
                    Err(error) => warn!(%peer, %error, "dropping malformed frame"),
                }
            }
            Ok(None) => {
                debug!(%peer, "client disconnected");
                break;
            }
            Err(error) => {
                warn!(%peer, %error, "read failed, closing connection");
                break;
            }
        }
    }

    // The peer is gone: deregister and discard whatever is still queued.
    iface.detach(id);
    writer.abort();
    let _ = writer.await;
}

async fn write_loop(
    iface: Arc<Interface>,
    id: u64,
    peer: SocketAddr,
    mut half: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = queue.recv().await {
        let line = match frame.encode_line() {
            Ok(line) => line,
            Err(error) => {
                warn!(%peer, %error, "failed to encode frame, skipping");
                continue;
            }
        };
        if half.write_all(line.as_bytes()).await.is_err() || half.flush().await.is_err() {
            warn!(%peer, "write failed, closing connection");
            iface.detach(id);
            return;
        }
    }
}
