// js8-core: the multi-interface broadcast engine.
//
// One Interface per emulated station, one reader+writer task pair per
// accepted connection, one task per in-flight transmit job.  The bootstrap
// (listener binding, configuration) lives in the emulator service; this crate
// owns everything between an accepted socket and the frames it sees.

pub mod clock;
pub mod connection;
pub mod dispatch;
pub mod interface;
pub mod registry;
pub mod transmit;

use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::HandlerTable;
use crate::registry::Registry;
use crate::transmit::JobTracker;

/// Process-wide transmit settings, read-only after boot.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Byte count of each transmitted fragment.
    pub fragment_size: usize,
    /// Inter-frame pacing.
    pub frame_time: Duration,
    /// When set, job `k` draws SNR/TDRIFT from a generator seeded with
    /// `seed + k`, making emitted sequences reproducible.
    pub seed: Option<u64>,
}

/// Shared engine state handed to every connection task.
#[derive(Clone)]
pub struct Engine {
    pub registry: Arc<Registry>,
    pub settings: Settings,
    pub table: Arc<HandlerTable>,
    pub jobs: Arc<JobTracker>,
}

impl Engine {
    /// An engine with the standard message handlers registered.
    pub fn new(registry: Arc<Registry>, settings: Settings) -> Self {
        Engine::with_table(registry, settings, HandlerTable::with_defaults())
    }

    /// An engine with a caller-supplied handler table, for registering
    /// additional message types.
    pub fn with_table(registry: Arc<Registry>, settings: Settings, table: HandlerTable) -> Self {
        Engine {
            registry,
            settings,
            table: Arc::new(table),
            jobs: Arc::new(JobTracker::new()),
        }
    }
}
