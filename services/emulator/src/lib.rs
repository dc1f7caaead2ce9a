//! Emulator bootstrap: bind one listener per configured interface, serve
//! connections, and coordinate an orderly shutdown.

pub mod config;

pub use config::{
    ConfigError, EmulatorConfig, InterfaceConfig, load_config_from_path, load_config_from_str,
};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, select_all};
use js8_core::interface::Interface;
use js8_core::registry::Registry;
use js8_core::{Engine, Settings, connection};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{info, warn};

/// How long shutdown waits for in-flight transmit jobs and queue drains.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("binding [{section}] on port {port}: {source}")]
    Bind {
        section: String,
        port: u16,
        source: std::io::Error,
    },
}

/// A bound emulator: every interface is listening, nothing is accepted yet.
///
/// Binding is separate from serving so callers (tests in particular) can
/// learn the OS-assigned addresses of `port = 0` interfaces before any
/// client connects.
pub struct Emulator {
    engine: Engine,
    listeners: Vec<(Arc<Interface>, TcpListener)>,
}

impl Emulator {
    pub async fn bind(config: &EmulatorConfig) -> Result<Self, StartupError> {
        let mut interfaces = Vec::with_capacity(config.interfaces.len());
        let mut listeners = Vec::with_capacity(config.interfaces.len());
        for ic in &config.interfaces {
            let listener = TcpListener::bind(("0.0.0.0", ic.port)).await.map_err(|source| {
                StartupError::Bind {
                    section: ic.section.clone(),
                    port: ic.port,
                    source,
                }
            })?;
            let port = listener
                .local_addr()
                .expect("local_addr always succeeds after bind")
                .port();
            let iface = Arc::new(Interface::new(
                port,
                ic.callsign.clone(),
                ic.dial_hz,
                ic.offset_hz,
                ic.grid.clone(),
            ));
            info!(
                section = %ic.section,
                callsign = %ic.callsign,
                port,
                dial = ic.dial_hz,
                offset = ic.offset_hz,
                "interface listening"
            );
            interfaces.push(iface.clone());
            listeners.push((iface, listener));
        }

        let registry = Arc::new(Registry::new(interfaces));
        let engine = Engine::new(
            registry,
            Settings {
                fragment_size: config.fragment_size,
                frame_time: config.frame_time,
                seed: config.seed,
            },
        );
        Ok(Emulator { engine, listeners })
    }

    /// The bound address of every interface, in configuration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .map(|(_, listener)| {
                listener
                    .local_addr()
                    .expect("local_addr always succeeds after bind")
            })
            .collect()
    }

    /// Serve until `shutdown` resolves, then drain: stop accepting, let
    /// in-flight jobs run to completion (bounded by the grace timeout), and
    /// drop the connection registrations so writer queues flush and close.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) {
        let engine = self.engine;
        let mut futures: Vec<BoxFuture<'static, ()>> = self
            .listeners
            .into_iter()
            .map(|(iface, listener)| accept_loop(engine.clone(), iface, listener).boxed())
            .collect();
        futures.push(shutdown.boxed());
        // Accept loops never return, so this resolves when shutdown fires.
        select_all(futures).await;

        info!(jobs = engine.jobs.active(), "shutting down");
        if timeout(SHUTDOWN_GRACE, engine.jobs.wait_idle()).await.is_err() {
            warn!("grace timeout elapsed with transmit jobs still in flight");
        }
        engine.registry.detach_all();
        // Give per-connection writers a moment to flush their tails.
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("shutdown complete");
    }
}

async fn accept_loop(engine: Engine, iface: Arc<Interface>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, callsign = %iface.callsign(), "client connected");
                tokio::spawn(connection::serve(engine.clone(), iface.clone(), stream, peer));
            }
            Err(error) => {
                warn!(callsign = %iface.callsign(), %error, "accept failed");
            }
        }
    }
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn run(config: EmulatorConfig) -> Result<(), StartupError> {
    let emulator = Emulator::bind(&config).await?;
    emulator.serve(shutdown_signal()).await;
    Ok(())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
