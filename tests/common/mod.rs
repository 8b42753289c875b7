#![allow(dead_code)]

use async_trait::async_trait;
use image::DynamicImage;
use qcheckin::{
    AuthGate, CameraBackend, CameraDescriptor, CameraDeviceManager, CameraHandle, CheckinAck,
    CheckinRequest, CheckinService, DecodeEngine, DecodeErrorKind, EngineFactory, EngineSink,
    Error, Facing, FrameSource, Generation, Result, ScanSession, StaticGate, VideoSource,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub const REAR: &str = "/dev/video0";
pub const FRONT: &str = "/dev/video1";

pub fn two_cameras() -> Vec<CameraDescriptor> {
    vec![
        CameraDescriptor::new(REAR, Facing::Environment).with_label("Rear Camera"),
        CameraDescriptor::new(FRONT, Facing::User).with_label("Integrated Webcam"),
    ]
}

/// Let spawned acquisition tasks run, then dispatch whatever they queued
pub async fn settle(session: &mut ScanSession) -> usize {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    session.drain_ready()
}

// ---------------------------------------------------------------------------
// Camera backend

#[derive(Default)]
struct CameraCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Holds acquisitions for one facing until opened
pub struct Gate(watch::Sender<bool>);

impl Gate {
    pub fn open(&self) {
        self.0.send_replace(true);
    }
}

pub struct FakeBackend {
    cameras: Vec<CameraDescriptor>,
    gates: Mutex<HashMap<Facing, watch::Receiver<bool>>>,
    failures: Mutex<HashMap<Facing, String>>,
    requested: Mutex<Vec<CameraDescriptor>>,
    counters: Arc<CameraCounters>,
}

impl FakeBackend {
    pub fn new(cameras: Vec<CameraDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            cameras,
            gates: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            requested: Mutex::new(Vec::new()),
            counters: Arc::new(CameraCounters::default()),
        })
    }

    pub fn devices(&self) -> CameraDeviceManager {
        CameraDeviceManager::from_descriptors(self.cameras.clone())
    }

    /// Block acquisitions for `facing` until the returned gate is opened
    pub fn hold(&self, facing: Facing) -> Gate {
        let (tx, rx) = watch::channel(false);
        self.gates.lock().unwrap().insert(facing, rx);
        Gate(tx)
    }

    /// Fail acquisitions for `facing` with a permission error
    pub fn deny(&self, facing: Facing, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(facing, message.to_string());
    }

    pub fn allow(&self, facing: Facing) {
        self.failures.lock().unwrap().remove(&facing);
    }

    pub fn requested(&self) -> Vec<CameraDescriptor> {
        self.requested.lock().unwrap().clone()
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Handles acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released()
    }
}

#[async_trait]
impl CameraBackend for FakeBackend {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>> {
        Ok(self.cameras.clone())
    }

    async fn acquire(&self, descriptor: &CameraDescriptor) -> Result<Box<dyn CameraHandle>> {
        self.requested.lock().unwrap().push(descriptor.clone());

        let gate = self.gates.lock().unwrap().get(&descriptor.facing).cloned();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        if let Some(message) = self.failures.lock().unwrap().get(&descriptor.facing) {
            return Err(Error::PermissionDenied(message.clone()));
        }

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCamera {
            descriptor: descriptor.clone(),
            released: false,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeCamera {
    descriptor: CameraDescriptor,
    released: bool,
    counters: Arc<CameraCounters>,
}

impl CameraHandle for FakeCamera {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn video_source(&self) -> VideoSource {
        Arc::new(NoFrames)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.release();
    }
}

struct NoFrames;

#[async_trait]
impl FrameSource for NoFrames {
    async fn next_frame(&self) -> Result<DynamicImage> {
        Err(Error::FrameCapture("fake camera has no frames".into()))
    }
}

// ---------------------------------------------------------------------------
// Decode engines

#[derive(Default)]
struct EngineLog {
    created: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    sinks: Mutex<Vec<EngineSink>>,
}

/// Engines that decode nothing on their own; tests emit events through their sinks
#[derive(Default)]
pub struct FakeEngines {
    log: Arc<EngineLog>,
}

impl FakeEngines {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.log.created.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.log.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.log.max_live.load(Ordering::SeqCst)
    }

    /// Sink of the engine started for `generation`
    pub fn sink(&self, generation: Generation) -> EngineSink {
        self.log
            .sinks
            .lock()
            .unwrap()
            .iter()
            .find(|sink| sink.generation() == generation)
            .cloned()
            .unwrap_or_else(|| panic!("no engine started for generation {generation}"))
    }

    /// Sink of the most recently started engine
    pub fn latest(&self) -> EngineSink {
        self.log
            .sinks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no engine started")
    }

    pub fn emit_success(&self, payload: &str) {
        self.latest().success(payload);
    }

    pub fn emit_not_found(&self) {
        self.latest()
            .error(DecodeErrorKind::NotFoundTransient, "No QR code detected");
    }
}

impl EngineFactory for FakeEngines {
    fn create(&self) -> Box<dyn DecodeEngine> {
        self.log.created.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeEngine {
            log: Arc::clone(&self.log),
            running: false,
        })
    }
}

struct FakeEngine {
    log: Arc<EngineLog>,
    running: bool,
}

impl DecodeEngine for FakeEngine {
    fn start(&mut self, _source: VideoSource, sink: EngineSink) -> Result<()> {
        self.running = true;
        let live = self.log.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_live.fetch_max(live, Ordering::SeqCst);
        self.log.sinks.lock().unwrap().push(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.log.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn destroy(mut self: Box<Self>) {
        self.stop();
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Check-in service

#[derive(Default)]
pub struct FakeService {
    failure: Mutex<Option<(Option<u16>, String)>>,
    requests: Mutex<Vec<CheckinRequest>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, status: Option<u16>, message: &str) {
        *self.failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CheckinRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckinService for FakeService {
    async fn check_in(&self, request: &CheckinRequest) -> Result<CheckinAck> {
        self.requests.lock().unwrap().push(request.clone());
        match self.failure.lock().unwrap().clone() {
            Some((status, message)) => Err(Error::Submission { status, message }),
            None => Ok(CheckinAck {
                status: 200,
                body: json!({ "ticketId": request.ticket_id, "checkedIn": true }),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Session wiring

pub struct Harness {
    pub session: ScanSession,
    pub backend: Arc<FakeBackend>,
    pub engines: Arc<FakeEngines>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cameras(two_cameras())
    }

    pub fn with_cameras(cameras: Vec<CameraDescriptor>) -> Self {
        Self::with_gate(cameras, Arc::new(StaticGate::new("door-1")))
    }

    pub fn with_gate(cameras: Vec<CameraDescriptor>, gate: Arc<dyn AuthGate>) -> Self {
        let backend = FakeBackend::new(cameras);
        let engines = FakeEngines::new();
        let session = ScanSession::new(
            backend.clone(),
            engines.clone(),
            gate,
            backend.devices(),
        );
        Self {
            session,
            backend,
            engines,
        }
    }

    /// Start and wait until the decode engine is running
    pub async fn scanning(mut self) -> Self {
        self.session.start().expect("start");
        settle(&mut self.session).await;
        assert_eq!(self.session.state().name(), "scanning");
        self
    }

    /// Start, scan `payload`, and stop at the captured state
    pub async fn captured(self, payload: &str) -> Self {
        let mut harness = self.scanning().await;
        harness.engines.emit_success(payload);
        settle(&mut harness.session).await;
        assert_eq!(harness.session.state().name(), "captured");
        harness
    }
}
