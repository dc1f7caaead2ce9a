//! The boot-built interface registry and the broadcast fabric.

use std::sync::Arc;

use crate::interface::Interface;

/// All configured interfaces, in configuration order.  Built once at boot
/// and read-only afterwards; per-interface state stays mutable behind each
/// interface's own lock.
pub struct Registry {
    interfaces: Vec<Arc<Interface>>,
}

impl Registry {
    pub fn new(interfaces: Vec<Arc<Interface>>) -> Self {
        Registry { interfaces }
    }

    pub fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }

    /// Destination snapshot for a transmission from `origin`: every *other*
    /// interface currently tuned to the origin's dial, in configuration
    /// order.  The snapshot is taken once per job; later dial changes do not
    /// affect a job already on the air.
    pub fn co_channel(&self, origin: &Arc<Interface>) -> Vec<Arc<Interface>> {
        let dial = origin.dial_hz();
        self.interfaces
            .iter()
            .filter(|iface| !Arc::ptr_eq(iface, origin) && iface.dial_hz() == dial)
            .cloned()
            .collect()
    }

    /// Drop every connection registration, letting writer tasks drain their
    /// queues and exit.  Used during shutdown.
    pub fn detach_all(&self) {
        for iface in &self.interfaces {
            iface.detach_all();
        }
    }
}
