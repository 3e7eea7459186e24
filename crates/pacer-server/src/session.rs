//! Session coordination.
//!
//! [`SessionCoordinator`] owns the single live execution context and the
//! long-lived [`ExecutionSession`] cells it runs against. It is driven by a
//! single actor task (see [`CoordinatorHandle`]) so submissions, cadence
//! changes and telemetry requests are handled strictly in arrival order.

use std::sync::Arc;
use std::time::Duration;

use pacer_core::execute::cycle_ms_from_hz;
use pacer_core::{
    Collaborators, Directive, ExecutionContext, ExecutionSession, ExecutorExit, ProgramSubmission,
    Runtime,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::protocol::{CadenceUpdate, Telemetry};
use crate::sim::{RendererCadence, SimulationControl};

/// Console line shown when a submission header could not be read.
pub const MALFORMED_HEADER_NOTICE: &str =
    "Submission header unreadable: running with debug level 1 and an empty program";

/// What a submission led to.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// A directive was forwarded to simulation control.
    Directive(Directive),
    /// A new context is running the program.
    Started(Uuid),
    /// The context could not be started; the session is idle.
    StartFailed(String),
}

/// Owner of the execution session and its one live context.
pub struct SessionCoordinator {
    session: ExecutionSession,
    runtime: Arc<dyn Runtime>,
    collaborators: Collaborators,
    simulation: Arc<dyn SimulationControl>,
    renderer: RendererCadence,
    grace: Duration,
    context: Option<Box<dyn ExecutionContext>>,
}

impl SessionCoordinator {
    pub fn new(
        session: ExecutionSession,
        runtime: Arc<dyn Runtime>,
        collaborators: Collaborators,
        simulation: Arc<dyn SimulationControl>,
        renderer: RendererCadence,
    ) -> Self {
        Self {
            session,
            runtime,
            collaborators,
            simulation,
            renderer,
            grace: Duration::ZERO,
            context: None,
        }
    }

    /// How long a stopping context may take before it is forcibly ended.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn session(&self) -> &ExecutionSession {
        &self.session
    }

    pub fn renderer(&self) -> &RendererCadence {
        &self.renderer
    }

    /// Identifier of the running context, if any.
    pub fn active_context(&self) -> Option<Uuid> {
        self.context.as_ref().map(|ctx| ctx.id())
    }

    /// Handle one submission.
    ///
    /// Directives go straight to simulation control. Programs replace the
    /// running context: the old pair is stopped and joined before the new
    /// one starts, so two executors never overlap.
    pub fn submit(&mut self, submission: &ProgramSubmission) -> SubmitOutcome {
        let program = submission.partition();

        match program.directive {
            Directive::Resume => {
                self.simulation.resume();
                return SubmitOutcome::Directive(Directive::Resume);
            }
            Directive::Pause => {
                self.simulation.pause();
                return SubmitOutcome::Directive(Directive::Pause);
            }
            Directive::Reset => {
                self.simulation.reset();
                self.collaborators.display.reset();
                return SubmitOutcome::Directive(Directive::Reset);
            }
            Directive::None => {}
        }

        self.stop();
        self.collaborators.robot.stop();

        if !program.header_valid {
            tracing::warn!(
                "Submission header unreadable ({} bytes); falling back to an empty program",
                submission.text.len()
            );
            self.collaborators.console.write(MALFORMED_HEADER_NOTICE);
        }

        match self.runtime.start(&program, &self.session) {
            Ok(ctx) => {
                let id = ctx.id();
                tracing::info!(
                    "Program started in context {} ({} isolation, debug level {}, loop: {})",
                    id,
                    self.runtime.isolation(),
                    program.debug_level,
                    program.has_loop()
                );
                self.context = Some(ctx);
                SubmitOutcome::Started(id)
            }
            Err(e) => {
                let message = format!("Failed to start program: {}", e);
                tracing::error!("{}", message);
                self.collaborators.console.write(&message);
                SubmitOutcome::StartFailed(message)
            }
        }
    }

    /// Stop the running context, if any, and wait for it.
    ///
    /// Leaves the cancel flag cleared for the next pair.
    pub fn stop(&mut self) -> Option<ExecutorExit> {
        let ctx = self.context.take()?;
        let id = ctx.id();
        self.session.cancel().set();
        let exit = ctx.terminate(self.grace);
        self.session.cancel().clear();
        tracing::debug!("Context {} stopped: {:?}", id, exit);
        Some(exit)
    }

    /// Apply a cadence request and report the current telemetry.
    ///
    /// Each frequency is applied independently; invalid ones are logged
    /// and leave the previous target in place.
    pub fn update_cadence(&mut self, update: &CadenceUpdate) -> Telemetry {
        match update.brain.hz().and_then(|hz| cycle_ms_from_hz(hz).map_err(ServerError::from)) {
            Ok(ms) => self.set_brain_cycle(ms),
            Err(e) => tracing::warn!("Ignoring brain frequency: {}", e),
        }

        match update.gui.hz().and_then(|hz| cycle_ms_from_hz(hz).map_err(ServerError::from)) {
            Ok(ms) => {
                if let Err(e) = self.renderer.set_target_cycle_ms(ms) {
                    tracing::warn!("Ignoring gui frequency: {}", e);
                }
            }
            Err(e) => tracing::warn!("Ignoring gui frequency: {}", e),
        }

        self.telemetry()
    }

    fn set_brain_cycle(&mut self, ms: f64) {
        if let Err(e) = self.session.set_target_cycle_ms(ms) {
            tracing::warn!("Ignoring brain frequency: {}", e);
            return;
        }
        if let Some(ctx) = self.context.as_mut()
            && let Err(e) = ctx.set_target_cycle(ms)
        {
            tracing::warn!("Failed to push cycle time to context {}: {}", ctx.id(), e);
        }
        tracing::debug!("Target cycle time now {:.2} ms", ms);
    }

    /// Realized frequencies of the executor and the renderer.
    pub fn telemetry(&self) -> Telemetry {
        Telemetry::from_cycles(
            self.session.realized_cycle_ms(),
            self.renderer.realized_cycle_ms(),
        )
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Requests handled by the coordinator actor.
enum Request {
    Submit {
        submission: ProgramSubmission,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Cadence {
        update: CadenceUpdate,
        reply: oneshot::Sender<Telemetry>,
    },
    Telemetry {
        reply: oneshot::Sender<Telemetry>,
    },
    Shutdown {
        reply: oneshot::Sender<Option<ExecutorExit>>,
    },
}

/// Queue depth before callers wait.
const REQUEST_QUEUE: usize = 64;

/// Cloneable client for the coordinator actor.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Request>,
    telemetry: broadcast::Sender<Telemetry>,
}

impl CoordinatorHandle {
    /// Move `coordinator` into an actor task.
    ///
    /// Telemetry is broadcast every `telemetry_interval`. Must be called
    /// inside a tokio runtime.
    pub fn spawn(coordinator: SessionCoordinator, telemetry_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let (telemetry, _) = broadcast::channel(16);
        tokio::spawn(run_actor(coordinator, rx, telemetry.clone(), telemetry_interval));
        Self { tx, telemetry }
    }

    /// Submit a program or directive; resolves once it has been handled.
    pub async fn submit(&self, text: impl Into<String>) -> ServerResult<SubmitOutcome> {
        let submission = ProgramSubmission::new(text);
        self.request(|reply| Request::Submit { submission, reply }).await
    }

    /// Apply a cadence update; resolves to the telemetry after it.
    pub async fn update_cadence(&self, update: CadenceUpdate) -> ServerResult<Telemetry> {
        self.request(|reply| Request::Cadence { update, reply }).await
    }

    /// Current telemetry.
    pub async fn telemetry(&self) -> ServerResult<Telemetry> {
        self.request(|reply| Request::Telemetry { reply }).await
    }

    /// Stop the running program. The actor keeps serving requests.
    pub async fn shutdown(&self) -> ServerResult<Option<ExecutorExit>> {
        self.request(|reply| Request::Shutdown { reply }).await
    }

    /// Periodic telemetry feed.
    pub fn subscribe(&self) -> broadcast::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> ServerResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ServerError::CoordinatorClosed)?;
        rx.await.map_err(|_| ServerError::CoordinatorClosed)
    }
}

async fn run_actor(
    mut coordinator: SessionCoordinator,
    mut rx: mpsc::Receiver<Request>,
    telemetry: broadcast::Sender<Telemetry>,
    telemetry_interval: Duration,
) {
    let mut ticker = tokio::time::interval(telemetry_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else { break };
                coordinator = match handle_request(coordinator, request).await {
                    Ok(coordinator) => coordinator,
                    Err(e) => {
                        tracing::error!("Coordinator stopped: {}", e);
                        return;
                    }
                };
            }
            _ = ticker.tick() => {
                // No subscribers is fine.
                let _ = telemetry.send(coordinator.telemetry());
            }
        }
    }

    tracing::debug!("All coordinator handles dropped; stopping session");
    let _ = tokio::task::spawn_blocking(move || drop(coordinator)).await;
}

/// Run one request. Steps that join threads or reap processes run on the
/// blocking pool; the coordinator moves there and back.
async fn handle_request(
    mut coordinator: SessionCoordinator,
    request: Request,
) -> ServerResult<SessionCoordinator> {
    match request {
        Request::Submit { submission, reply } => {
            let (coordinator, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = coordinator.submit(&submission);
                (coordinator, outcome)
            })
            .await
            .map_err(|e| ServerError::Task(e.to_string()))?;
            let _ = reply.send(outcome);
            Ok(coordinator)
        }
        Request::Cadence { update, reply } => {
            let telemetry = coordinator.update_cadence(&update);
            let _ = reply.send(telemetry);
            Ok(coordinator)
        }
        Request::Telemetry { reply } => {
            let _ = reply.send(coordinator.telemetry());
            Ok(coordinator)
        }
        Request::Shutdown { reply } => {
            let (coordinator, exit) = tokio::task::spawn_blocking(move || {
                let exit = coordinator.stop();
                (coordinator, exit)
            })
            .await
            .map_err(|e| ServerError::Task(e.to_string()))?;
            let _ = reply.send(exit);
            Ok(coordinator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::partition::with_header;
    use pacer_core::{Console, Display, Image, PartitionResult, Robot};
    use std::sync::Mutex;

    /// Records every collaborator call in order.
    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl Journal {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Robot for Journal {
        fn read_image(&self) -> Image {
            Image::blank(1, 1, 3)
        }

        fn set_linear_velocity(&self, v: f64) {
            self.push(format!("v={v}"));
        }

        fn set_angular_velocity(&self, w: f64) {
            self.push(format!("w={w}"));
        }
    }

    impl Display for Journal {
        fn show_image(&self, _image: &Image) {
            self.push("show");
        }

        fn reset(&self) {
            self.push("display-reset");
        }
    }

    impl Console for Journal {
        fn write(&self, text: &str) {
            self.push(format!("console:{text}"));
        }
    }

    impl SimulationControl for Journal {
        fn resume(&self) {
            self.push("resume");
        }

        fn pause(&self) {
            self.push("pause");
        }

        fn reset(&self) {
            self.push("sim-reset");
        }
    }

    /// Runtime whose contexts only record their lifecycle.
    struct FakeRuntime {
        journal: Arc<Journal>,
        fail: bool,
    }

    struct FakeContext {
        id: Uuid,
        journal: Arc<Journal>,
        session: ExecutionSession,
    }

    impl Runtime for FakeRuntime {
        fn isolation(&self) -> pacer_core::Isolation {
            pacer_core::Isolation::Thread
        }

        fn start(
            &self,
            program: &PartitionResult,
            session: &ExecutionSession,
        ) -> pacer_core::Result<Box<dyn ExecutionContext>> {
            if self.fail {
                return Err(pacer_core::Error::Worker("no worker".into()));
            }
            assert!(!session.cancel().is_set(), "started with cancel still set");
            self.journal.push(format!("start:{}|{}", program.setup_code, program.loop_code));
            Ok(Box::new(FakeContext {
                id: Uuid::new_v4(),
                journal: self.journal.clone(),
                session: session.clone(),
            }))
        }
    }

    impl ExecutionContext for FakeContext {
        fn id(&self) -> Uuid {
            self.id
        }

        fn set_target_cycle(&mut self, ms: f64) -> pacer_core::Result<()> {
            self.journal.push(format!("cycle={ms}"));
            Ok(())
        }

        fn is_running(&mut self) -> bool {
            true
        }

        fn terminate(self: Box<Self>, _grace: Duration) -> ExecutorExit {
            assert!(self.session.cancel().is_set(), "terminated without cancel");
            self.journal.push("terminate");
            ExecutorExit::Cancelled
        }
    }

    fn coordinator(journal: &Arc<Journal>, fail: bool) -> SessionCoordinator {
        let runtime = Arc::new(FakeRuntime {
            journal: journal.clone(),
            fail,
        });
        SessionCoordinator::new(
            ExecutionSession::new(80.0).unwrap(),
            runtime,
            Collaborators::new(journal.clone(), journal.clone(), journal.clone()),
            journal.clone(),
            RendererCadence::new(80.0).unwrap(),
        )
    }

    #[test]
    fn test_hot_swap_stops_before_starting() {
        let journal = Arc::new(Journal::default());
        let mut coordinator = coordinator(&journal, false);

        let first = coordinator.submit(&ProgramSubmission::new(with_header("a = 1\n", 0)));
        assert!(matches!(first, SubmitOutcome::Started(_)));
        let second = coordinator.submit(&ProgramSubmission::new(with_header(
            "while True:\n    b = 2\n",
            0,
        )));
        assert!(matches!(second, SubmitOutcome::Started(_)));
        assert_ne!(first, second);

        assert_eq!(
            journal.entries(),
            vec![
                "v=0",
                "w=0",
                "start:a = 1\n|",
                "terminate",
                "v=0",
                "w=0",
                "start:|b = 2\n",
            ]
        );
        assert!(!coordinator.session().cancel().is_set());
    }

    #[test]
    fn test_directives_leave_program_running() {
        let journal = Arc::new(Journal::default());
        let mut coordinator = coordinator(&journal, false);
        coordinator.submit(&ProgramSubmission::new(with_header("x = 1\n", 0)));
        let running = coordinator.active_context();

        assert_eq!(
            coordinator.submit(&ProgramSubmission::new("#paus")),
            SubmitOutcome::Directive(Directive::Pause)
        );
        coordinator.submit(&ProgramSubmission::new("#resu"));
        coordinator.submit(&ProgramSubmission::new("#rest"));

        assert_eq!(coordinator.active_context(), running);
        let entries = journal.entries();
        assert_eq!(
            &entries[entries.len() - 4..],
            ["pause", "resume", "sim-reset", "display-reset"]
        );
        assert!(!entries.contains(&"terminate".to_string()));
    }

    #[test]
    fn test_malformed_header_surfaces_diagnostic() {
        let journal = Arc::new(Journal::default());
        let mut coordinator = coordinator(&journal, false);

        let outcome = coordinator.submit(&ProgramSubmission::new("#codeX#debugprint(1)"));
        assert!(matches!(outcome, SubmitOutcome::Started(_)));
        assert!(journal.entries().contains(&format!("console:{MALFORMED_HEADER_NOTICE}")));
        assert!(journal.entries().contains(&"start:|".to_string()));
    }

    #[test]
    fn test_start_failure_is_reported_and_idle() {
        let journal = Arc::new(Journal::default());
        let mut coordinator = coordinator(&journal, true);

        let outcome = coordinator.submit(&ProgramSubmission::new(with_header("x = 1\n", 0)));
        assert!(matches!(outcome, SubmitOutcome::StartFailed(_)));
        assert!(coordinator.active_context().is_none());
        assert!(journal.entries().iter().any(|e| e.starts_with("console:Failed to start program")));
    }

    #[test]
    fn test_cadence_update_reaches_context_and_renderer() {
        let journal = Arc::new(Journal::default());
        let mut coordinator = coordinator(&journal, false);
        coordinator.submit(&ProgramSubmission::new(with_header("x = 1\n", 0)));

        coordinator.update_cadence(&CadenceUpdate::hz(20.0, 25.0));
        assert_eq!(coordinator.session().target_cycle_ms(), 50.0);
        assert_eq!(coordinator.renderer().target_cycle_ms(), 40.0);
        assert!(journal.entries().contains(&"cycle=50".to_string()));
    }

    #[test]
    fn test_invalid_frequencies_keep_previous_targets() {
        let journal = Arc::new(Journal::default());
        let mut coordinator = coordinator(&journal, false);

        coordinator.update_cadence(&CadenceUpdate::hz(0.0, f64::INFINITY));
        assert_eq!(coordinator.session().target_cycle_ms(), 80.0);
        assert_eq!(coordinator.renderer().target_cycle_ms(), 80.0);

        // One bad value does not block the other.
        coordinator.update_cadence(&CadenceUpdate::hz(-5.0, 10.0));
        assert_eq!(coordinator.session().target_cycle_ms(), 80.0);
        assert_eq!(coordinator.renderer().target_cycle_ms(), 100.0);
    }

    #[test]
    fn test_telemetry_from_realized_cells() {
        let journal = Arc::new(Journal::default());
        let coordinator = coordinator(&journal, false);
        assert_eq!(coordinator.telemetry(), Telemetry { brain: 0.0, gui: 0.0 });

        coordinator.session().realized_cycle().set(80.0);
        coordinator.renderer().set_realized_cycle_ms(30.0);
        assert_eq!(coordinator.telemetry(), Telemetry { brain: 12.5, gui: 33.3 });
    }

    #[tokio::test]
    async fn test_actor_serializes_requests() {
        let journal = Arc::new(Journal::default());
        let handle = CoordinatorHandle::spawn(coordinator(&journal, false), Duration::from_secs(60));

        let (a, b) = tokio::join!(
            handle.submit(with_header("a = 1\n", 0)),
            handle.submit(with_header("b = 2\n", 0)),
        );
        assert!(matches!(a.unwrap(), SubmitOutcome::Started(_)));
        assert!(matches!(b.unwrap(), SubmitOutcome::Started(_)));

        let telemetry = handle.update_cadence(CadenceUpdate::hz(10.0, 10.0)).await.unwrap();
        assert_eq!(telemetry, Telemetry { brain: 0.0, gui: 0.0 });
        assert_eq!(handle.shutdown().await.unwrap(), Some(ExecutorExit::Cancelled));
        assert_eq!(handle.shutdown().await.unwrap(), None);

        let starts = journal.entries().iter().filter(|e| e.starts_with("start:")).count();
        let stops = journal.entries().iter().filter(|e| *e == "terminate").count();
        assert_eq!((starts, stops), (2, 2));
    }

    #[tokio::test]
    async fn test_periodic_telemetry_broadcast() {
        let journal = Arc::new(Journal::default());
        let handle = CoordinatorHandle::spawn(coordinator(&journal, false), Duration::from_millis(10));
        let mut feed = handle.subscribe();
        let telemetry = tokio::time::timeout(Duration::from_secs(1), feed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(telemetry, Telemetry { brain: 0.0, gui: 0.0 });
    }
}
