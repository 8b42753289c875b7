//! Scan session controller
//!
//! [`ScanSession`] owns the camera handle and decode engine, and is the only
//! component allowed to start or stop them. It is driven by explicit calls
//! (`start`, `stop`, `flip_camera`, `retry`, `reset`) and by asynchronous
//! completions delivered through its own event queue and fed back into
//! [`ScanSession::dispatch`].
//!
//! ```text
//! Idle --start--> Initializing --device ready--> Scanning
//! Scanning --decoded--> Captured --reset--> Idle
//! Scanning --stop--> Paused --start--> Initializing
//! Scanning --camera error--> CameraFault --retry--> Initializing
//! Scanning --fatal decode error--> DecodeFault --retry--> Initializing
//! ```
//!
//! Every entry into `Initializing` bumps the [`Generation`]. Acquisitions and
//! engine events stamped with an older generation are discarded, and a camera
//! handle arriving late is released on the spot.

mod state;

pub use state::{DecodedPayload, Generation, SessionState, SessionStatus};

use crate::auth::AuthGate;
use crate::camera::{CameraBackend, CameraDeviceManager, CameraHandle, Facing};
use crate::error::{Error, Result};
use crate::qr::{DecodeEngine, DecodeErrorKind, EngineEvent, EngineFactory, EngineOutcome, EngineSink};
use crate::review::{CheckinReviewForm, ReviewDraft};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Asynchronous completion delivered to the session
pub enum SessionEvent {
    /// A camera acquisition finished
    DeviceAcquired {
        /// Generation that requested the camera
        generation: Generation,
        /// The handle, or why the host refused it
        outcome: Result<Box<dyn CameraHandle>>,
    },
    /// The decode engine reported an attempt
    Engine(EngineEvent),
}

impl SessionEvent {
    /// Free any resource carried by an event that will not be dispatched
    fn discard(self) {
        if let SessionEvent::DeviceAcquired {
            outcome: Ok(mut camera),
            ..
        } = self
        {
            camera.release();
        }
    }
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::DeviceAcquired { generation, outcome } => f
                .debug_struct("DeviceAcquired")
                .field("generation", generation)
                .field(
                    "outcome",
                    &outcome.as_ref().map(|camera| camera.descriptor().id.clone()),
                )
                .finish(),
            SessionEvent::Engine(event) => f.debug_tuple("Engine").field(event).finish(),
        }
    }
}

/// Camera and engine bound to the generation that acquired them
struct LiveScan {
    generation: Generation,
    camera: Box<dyn CameraHandle>,
    engine: Box<dyn DecodeEngine>,
}

/// The scan-session state machine. One instance serves many sequential check-ins.
pub struct ScanSession {
    state: SessionState,
    generation: Generation,
    facing: Facing,
    devices: CameraDeviceManager,
    backend: Arc<dyn CameraBackend>,
    engines: Arc<dyn EngineFactory>,
    gate: Arc<dyn AuthGate>,
    live: Option<LiveScan>,
    acquisitions: Vec<JoinHandle<()>>,
    draft: Option<ReviewDraft>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
}

impl ScanSession {
    /// Create an idle session facing the environment
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        engines: Arc<dyn EngineFactory>,
        gate: Arc<dyn AuthGate>,
        devices: CameraDeviceManager,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let facing = Facing::default();
        let (status_tx, _) = watch::channel(SessionStatus {
            state: SessionState::Idle,
            message: SessionState::Idle.status_message(),
            generation: Generation::default(),
            facing,
        });

        Self {
            state: SessionState::Idle,
            generation: Generation::default(),
            facing,
            devices,
            backend,
            engines,
            gate,
            live: None,
            acquisitions: Vec::new(),
            draft: None,
            events_tx,
            events_rx,
            status_tx,
        }
    }

    /// Set the facing used by the first acquisition
    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self.publish();
        self
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current status snapshot
    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    /// Live generation counter
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Facing used by the next or current acquisition
    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Devices enumerated at startup
    pub fn devices(&self) -> &CameraDeviceManager {
        &self.devices
    }

    /// Whether a decode engine is currently running
    pub fn has_live_engine(&self) -> bool {
        self.live.is_some()
    }

    /// Observe status changes. Transient decode noise never produces an update.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Begin scanning from `Idle`, `Paused` or a fault.
    ///
    /// Already scanning or initializing is a no-op. A captured ticket must be
    /// reset first; restart is never implicit.
    pub fn start(&mut self) -> Result<()> {
        let auth = self.gate.authorization();
        if !auth.authorized {
            return Err(Error::Unauthorized(
                "An operator must sign in before scanning".to_string(),
            ));
        }

        match self.state {
            SessionState::Initializing | SessionState::Scanning => {
                tracing::debug!(generation = %self.generation, "Start ignored, already scanning");
                Ok(())
            }
            SessionState::Captured(_) => Err(Error::InvalidTransition {
                from: self.state.name(),
                action: "start",
            }),
            SessionState::Idle
            | SessionState::Paused
            | SessionState::CameraFault(_)
            | SessionState::DecodeFault(_) => {
                tracing::info!(operator = %auth.operator, facing = %self.facing, "Starting scan");
                self.begin_generation();
                Ok(())
            }
        }
    }

    /// Retry after a fault. Identical to [`ScanSession::start`].
    pub fn retry(&mut self) -> Result<()> {
        self.start()
    }

    /// Stop scanning and release the camera. No-op unless scanning or initializing.
    pub fn stop(&mut self) {
        match self.state {
            SessionState::Scanning | SessionState::Initializing => {
                self.teardown("stopped");
                self.set_state(SessionState::Paused);
            }
            _ => tracing::debug!(state = self.state.name(), "Stop ignored"),
        }
    }

    /// Switch to the opposite facing.
    ///
    /// While scanning or initializing this restarts acquisition under a new
    /// generation; otherwise the new facing applies to the next start.
    /// Returns false when fewer than two cameras were enumerated.
    pub fn flip_camera(&mut self) -> bool {
        if !self.devices.has_multiple_cameras() {
            tracing::debug!("Flip ignored, only one camera known");
            return false;
        }

        self.facing = self.facing.opposite();
        tracing::info!(facing = %self.facing, "Camera flipped");

        if matches!(
            self.state,
            SessionState::Scanning | SessionState::Initializing
        ) {
            self.begin_generation();
        } else {
            self.publish();
        }
        true
    }

    /// Drop the captured payload and review draft and return to `Idle`
    pub fn reset(&mut self) {
        self.teardown("reset");
        self.draft = None;
        self.set_state(SessionState::Idle);
    }

    /// Release everything: live camera and engine, pending acquisitions, and
    /// any camera handle still queued for delivery.
    pub fn close(&mut self) {
        self.teardown("closed");
        for task in self.acquisitions.drain(..) {
            task.abort();
        }
        while let Ok(event) = self.events_rx.try_recv() {
            event.discard();
        }
        self.draft = None;
        self.set_state(SessionState::Idle);
    }

    /// Wait for the next asynchronous completion
    pub async fn next_event(&mut self) -> SessionEvent {
        match self.events_rx.recv().await {
            Some(event) => event,
            // The session holds a sender, so the queue never closes.
            None => std::future::pending().await,
        }
    }

    /// Wait for one completion and dispatch it
    pub async fn pump(&mut self) -> bool {
        let event = self.next_event().await;
        self.dispatch(event)
    }

    /// Dispatch every completion already queued; returns how many were handled
    pub fn drain_ready(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Apply an asynchronous completion. Returns whether the state changed.
    pub fn dispatch(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::DeviceAcquired {
                generation,
                outcome,
            } => self.on_device(generation, outcome),
            SessionEvent::Engine(event) => self.on_engine(event),
        }
    }

    /// Review form for the captured ticket, if one is captured
    pub fn review(&mut self) -> Option<CheckinReviewForm<'_>> {
        match self.state {
            SessionState::Captured(_) => Some(CheckinReviewForm::new(self)),
            _ => None,
        }
    }

    /// Current review draft, present only while a ticket is captured
    pub fn review_draft(&self) -> Option<&ReviewDraft> {
        self.draft.as_ref()
    }

    pub(crate) fn draft_mut(&mut self) -> &mut ReviewDraft {
        self.draft.get_or_insert_with(ReviewDraft::default)
    }

    fn begin_generation(&mut self) {
        self.teardown("superseded");
        self.acquisitions.retain(|task| !task.is_finished());

        self.generation = self.generation.next();
        let generation = self.generation;
        self.set_state(SessionState::Initializing);

        let Some(descriptor) = self.devices.resolve(self.facing) else {
            tracing::warn!(generation = %generation, facing = %self.facing, "No camera for facing");
            self.set_state(SessionState::CameraFault(format!(
                "No {} camera available",
                self.facing
            )));
            return;
        };

        tracing::debug!(generation = %generation, device = %descriptor.id, "Acquiring camera");
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        self.acquisitions.push(tokio::spawn(async move {
            let outcome = backend.acquire(&descriptor).await;
            if let Err(mpsc::error::SendError(event)) =
                events.send(SessionEvent::DeviceAcquired { generation, outcome })
            {
                event.discard();
            }
        }));
    }

    fn on_device(&mut self, generation: Generation, outcome: Result<Box<dyn CameraHandle>>) -> bool {
        if generation != self.generation || !matches!(self.state, SessionState::Initializing) {
            tracing::debug!(
                generation = %generation,
                live = %self.generation,
                "Discarding stale camera acquisition"
            );
            if let Ok(mut camera) = outcome {
                camera.release();
            }
            return false;
        }

        let mut camera = match outcome {
            Ok(camera) => camera,
            Err(err) => {
                tracing::warn!(generation = %generation, error = %err, "Camera acquisition failed");
                self.set_state(SessionState::CameraFault(err.platform_message()));
                return true;
            }
        };

        let mut engine = self.engines.create();
        let events = self.events_tx.clone();
        let sink = EngineSink::new(generation, move |event| {
            let _ = events.send(SessionEvent::Engine(event));
        });

        match engine.start(camera.video_source(), sink) {
            Ok(()) => {
                tracing::info!(
                    generation = %generation,
                    device = %camera.descriptor().id,
                    "Scanning"
                );
                self.live = Some(LiveScan {
                    generation,
                    camera,
                    engine,
                });
                self.set_state(SessionState::Scanning);
            }
            Err(err) => {
                tracing::warn!(generation = %generation, error = %err, "Decode engine failed to start");
                engine.destroy();
                camera.release();
                self.set_state(SessionState::DecodeFault(err.to_string()));
            }
        }
        true
    }

    fn on_engine(&mut self, event: EngineEvent) -> bool {
        if event.generation != self.generation || !matches!(self.state, SessionState::Scanning) {
            tracing::trace!(generation = %event.generation, "Discarding stale engine event");
            return false;
        }

        match event.outcome {
            EngineOutcome::Failed {
                kind: DecodeErrorKind::NotFoundTransient,
                ..
            } => false,
            EngineOutcome::Decoded(raw) => {
                let Some(payload) = DecodedPayload::new(raw) else {
                    tracing::trace!("Ignoring empty payload");
                    return false;
                };
                self.teardown("captured");
                tracing::info!(generation = %event.generation, ticket = payload.ticket_id(), "Ticket captured");
                self.draft = Some(ReviewDraft::default());
                self.set_state(SessionState::Captured(payload));
                true
            }
            EngineOutcome::Failed { kind, message } => {
                self.teardown("engine fault");
                tracing::warn!(generation = %event.generation, %kind, %message, "Decode loop failed");
                let state = if kind.is_camera_fault() {
                    SessionState::CameraFault(message)
                } else {
                    SessionState::DecodeFault(message)
                };
                self.set_state(state);
                true
            }
        }
    }

    fn teardown(&mut self, reason: &str) {
        if let Some(LiveScan {
            generation,
            mut camera,
            mut engine,
        }) = self.live.take()
        {
            engine.stop();
            engine.destroy();
            camera.release();
            tracing::debug!(generation = %generation, reason, "Released camera and decode engine");
        }
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(from = self.state.name(), to = state.name(), "Session transition");
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(SessionStatus {
            state: self.state.clone(),
            message: self.state.status_message(),
            generation: self.generation,
            facing: self.facing,
        });
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("facing", &self.facing)
            .field("live", &self.live.as_ref().map(|l| l.generation))
            .finish_non_exhaustive()
    }
}
