//! The transmit scheduler: one task per accepted TX.SEND_MESSAGE.
//!
//! A job splits the payload into fragment_size byte slices, snapshots its
//! destination set, then walks the fragments: PTT-on to the sender, a
//! frame_time sleep while the transmitter "holds the air", PTT-off, and one
//! RX.ACTIVITY per destination.  Finalization emits the terminated directed
//! text and its spot, paired, on every destination.
//!
//! The frame_time wait suspends only the job's own task; receivers are fed
//! through their per-connection writer queues, so one slow socket cannot
//! stall the scheduler's clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::clock;
use crate::dispatch::Context;
use crate::interface::Interface;
use crate::registry::Registry;

// ---------------------------------------------------------------------------
// Job tracking
// ---------------------------------------------------------------------------

/// Counts in-flight transmit jobs so shutdown can wait for the air to clear,
/// and numbers them so seeded runs are reproducible.
pub struct JobTracker {
    active: AtomicUsize,
    next_seq: AtomicU64,
    idle: Notify,
}

impl JobTracker {
    pub fn new() -> Self {
        JobTracker {
            active: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            idle: Notify::new(),
        }
    }

    /// Register a job before it is spawned; returns its sequence number.
    pub fn begin(&self) -> u64 {
        self.active.fetch_add(1, Ordering::AcqRel);
        self.next_seq.fetch_add(1, Ordering::AcqRel)
    }

    pub fn finish(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Resolve once no jobs are in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // notify_waiters stores no permit, so register before the
            // re-check or a finish() landing in between is lost.
            notified.as_mut().enable();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        JobTracker::new()
    }
}

// ---------------------------------------------------------------------------
// Fragmentation
// ---------------------------------------------------------------------------

/// Split a payload into consecutive `fragment_size`-byte slices; the final
/// slice may be shorter, and nothing is padded.  A boundary can land inside a
/// multi-byte character; such a fragment is carried lossily since the wire
/// format is JSON.
pub fn split_fragments(payload: &str, fragment_size: usize) -> Vec<String> {
    payload
        .as_bytes()
        .chunks(fragment_size.max(1))
        .map(|chunk| match std::str::from_utf8(chunk) {
            Ok(s) => s.to_owned(),
            Err(_) => {
                debug!("fragment boundary split a multi-byte character");
                String::from_utf8_lossy(chunk).into_owned()
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// TransmitJob
// ---------------------------------------------------------------------------

/// One accepted transmission, from fragmentation to the directed/spot pair.
pub struct TransmitJob {
    origin: Arc<Interface>,
    payload: String,
    fragments: Vec<String>,
    destinations: Vec<Arc<Interface>>,
}

impl TransmitJob {
    /// Fragment the payload and snapshot the destination set.
    pub fn prepare(
        origin: Arc<Interface>,
        registry: &Registry,
        payload: String,
        fragment_size: usize,
    ) -> Self {
        let fragments = split_fragments(&payload, fragment_size);
        let destinations = registry.co_channel(&origin);
        TransmitJob {
            origin,
            payload,
            fragments,
            destinations,
        }
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Run the job to completion.  The origin sees a PTT on/off bracket per
    /// fragment; each destination sees the fragments in order followed by
    /// RX.DIRECTED and RX.SPOT as an adjacent pair sharing one SNR draw.
    pub async fn run<R: Rng>(self, frame_time: Duration, mut rng: R) {
        for fragment in &self.fragments {
            self.origin.broadcast(js8_protocol::rig_ptt(true, clock::now_ms()));
            sleep(frame_time).await;
            self.origin.broadcast(js8_protocol::rig_ptt(false, clock::now_ms()));

            for dest in &self.destinations {
                let snr = rng.gen_range(-20..=20);
                let tdrift = rng.gen_range(-2.0..=2.0);
                dest.broadcast(js8_protocol::rx_activity(
                    fragment,
                    dest.dial_hz(),
                    dest.offset_hz(),
                    snr,
                    tdrift,
                    clock::now_ms(),
                ));
            }
        }

        let text = js8_protocol::directed_text(&self.payload);
        let to = js8_protocol::directed_addressee(&self.payload);
        for dest in &self.destinations {
            let snr = rng.gen_range(-20..=20);
            let tdrift = rng.gen_range(-2.0..=2.0);
            let directed = js8_protocol::rx_directed(
                &text,
                self.origin.callsign(),
                to,
                dest.dial_hz(),
                dest.offset_hz(),
                snr,
                tdrift,
                clock::now_ms(),
            );
            let spot = js8_protocol::rx_spot(
                self.origin.callsign(),
                self.origin.grid(),
                dest.dial_hz(),
                dest.offset_hz(),
                snr,
            );
            dest.broadcast_all(&[directed, spot]);
        }
    }
}

/// Accept a TX.SEND_MESSAGE: build the job and put it on the air.
pub fn spawn(ctx: &Context, payload: String) {
    let engine = &ctx.engine;
    let job = TransmitJob::prepare(
        ctx.iface.clone(),
        &engine.registry,
        payload,
        engine.settings.fragment_size,
    );
    // Register before spawning so shutdown never misses an accepted job.
    let seq = engine.jobs.begin();
    let rng = match engine.settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(seq)),
        None => StdRng::from_entropy(),
    };
    info!(
        from = %ctx.iface.callsign(),
        fragments = job.fragment_count(),
        destinations = job.destination_count(),
        "transmit accepted"
    );
    let frame_time = engine.settings.frame_time;
    let jobs = engine.jobs.clone();
    tokio::spawn(async move {
        job.run(frame_time, rng).await;
        jobs.finish();
    });
}
