//! Shared setup for the server integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pacer_core::{Collaborators, ExecutionSession, ThreadRuntime};
use pacer_server::{
    AppState, CoordinatorHandle, LocalSimulation, RendererCadence, SessionCoordinator, create_router,
};

/// A server on an ephemeral port, running programs on threads.
pub struct TestServer {
    pub addr: SocketAddr,
    pub simulation: Arc<LocalSimulation>,
}

impl TestServer {
    /// Start a server whose periodic telemetry stays out of the way.
    pub async fn start() -> Self {
        let simulation = Arc::new(LocalSimulation::new());
        let collaborators = Collaborators::new(simulation.clone(), simulation.clone(), simulation.clone());
        let coordinator = SessionCoordinator::new(
            ExecutionSession::new(80.0).unwrap(),
            Arc::new(ThreadRuntime::new(collaborators.clone())),
            collaborators,
            simulation.clone(),
            RendererCadence::new(80.0).unwrap(),
        );
        let state = Arc::new(AppState {
            coordinator: CoordinatorHandle::spawn(coordinator, Duration::from_secs(60)),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        Self { addr, simulation }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
