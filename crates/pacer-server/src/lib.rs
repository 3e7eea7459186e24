//! Pacer session host.
//!
//! Serves the control channel over WebSocket and drives submitted programs
//! against the simulation collaborators.
//!
//! # Architecture
//!
//! The server consists of:
//! - **Session**: the coordinator owning the one live execution context
//! - **Protocol**: control-channel parsing and telemetry encoding
//! - **Routes**: HTTP and WebSocket handlers
//! - **Sim**: in-process simulation collaborators and the renderer task

pub mod error;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod sim;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pacer_core::{
    Collaborators, ExecutionSession, Isolation, ProcessRuntime, Runtime, ThreadRuntime,
};

pub use error::{ServerError, ServerResult};
pub use protocol::{CadenceUpdate, ClientMessage, FREQUENCY_PREFIX, Telemetry};
pub use routes::{AppState, create_router};
pub use session::{CoordinatorHandle, SessionCoordinator, SubmitOutcome};
pub use sim::{LocalSimulation, RendererCadence, SimulationControl, spawn_renderer};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Where submitted programs run.
    pub isolation: Isolation,
    /// Time a replaced program gets to stop before it is killed.
    pub grace_period: Duration,
    /// Interval between unsolicited telemetry messages.
    pub telemetry_interval: Duration,
    /// Initial executor cycle time in milliseconds.
    pub brain_cycle_ms: f64,
    /// Initial renderer cycle time in milliseconds.
    pub gui_cycle_ms: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1905,
            isolation: Isolation::Process,
            grace_period: Duration::ZERO,
            telemetry_interval: Duration::from_secs(2),
            brain_cycle_ms: 80.0,
            gui_cycle_ms: 80.0,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn addr(&self) -> ServerResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

/// Runtime for an isolation level.
pub fn build_runtime(isolation: Isolation, collaborators: Collaborators) -> Arc<dyn Runtime> {
    match isolation {
        Isolation::Process => Arc::new(ProcessRuntime::new(collaborators)),
        Isolation::Thread => Arc::new(ThreadRuntime::new(collaborators)),
    }
}

/// Start the Pacer server and run until Ctrl+C.
pub async fn serve(config: ServerConfig) -> ServerResult<()> {
    let addr = config.addr()?;

    let simulation = Arc::new(LocalSimulation::new());
    let collaborators = Collaborators::new(simulation.clone(), simulation.clone(), simulation.clone());
    let session = ExecutionSession::new(config.brain_cycle_ms)?;
    let renderer = RendererCadence::new(config.gui_cycle_ms)?;

    let coordinator = SessionCoordinator::new(
        session,
        build_runtime(config.isolation, collaborators.clone()),
        collaborators,
        simulation.clone(),
        renderer.clone(),
    )
    .with_grace_period(config.grace_period);
    let handle = CoordinatorHandle::spawn(coordinator, config.telemetry_interval);
    let renderer_task = spawn_renderer(simulation, renderer);

    let state = Arc::new(AppState {
        coordinator: handle.clone(),
    });
    let app = create_router(state);

    tracing::info!(
        "Starting Pacer server at ws://{}/ws ({} isolation)",
        addr,
        config.isolation
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    // Stop the running program before the runtime goes away.
    if let Err(e) = handle.shutdown().await {
        tracing::warn!("Failed to stop running program: {}", e);
    }
    renderer_task.abort();
    let _ = renderer_task.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 1905);
        assert_eq!(config.isolation, Isolation::Process);
        assert_eq!(config.grace_period, Duration::ZERO);
        assert_eq!(config.brain_cycle_ms, 80.0);
    }

    #[test]
    fn test_invalid_address() {
        let config = ServerConfig {
            host: "not an address".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.addr(), Err(ServerError::InvalidAddress(_))));
        assert_eq!(ServerConfig::default().addr().unwrap().port(), 1905);
    }
}
