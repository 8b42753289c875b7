//! Frame-loop decode engine: pull a frame, try to read a code, repeat

use crate::camera::VideoSource;
use crate::error::{Error, Result};
use crate::qr::{DecodeEngine, DecodeErrorKind, EngineFactory, EngineSink, FrameDecoder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Decodes frames on a background task until the first payload or a fatal error.
pub struct FrameLoopEngine {
    interval: Duration,
    stopped: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FrameLoopEngine {
    /// Engine pausing `interval` between empty frames
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stopped: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

impl DecodeEngine for FrameLoopEngine {
    fn start(&mut self, source: VideoSource, sink: EngineSink) -> Result<()> {
        if self.task.is_some() {
            return Err(Error::Other("Decode engine already started".to_string()));
        }

        let stopped = Arc::clone(&self.stopped);
        let interval = self.interval;
        tracing::debug!(generation = %sink.generation(), "Decode loop starting");

        self.task = Some(tokio::spawn(async move {
            run_loop(source, sink, stopped, interval).await;
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn destroy(mut self: Box<Self>) {
        self.stop();
    }
}

impl Drop for FrameLoopEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    source: VideoSource,
    sink: EngineSink,
    stopped: Arc<AtomicBool>,
    interval: Duration,
) {
    while !stopped.load(Ordering::Acquire) {
        let attempt = match source.next_frame().await {
            Ok(frame) => tokio::task::spawn_blocking(move || FrameDecoder::new().decode(&frame))
                .await
                .unwrap_or_else(|e| Err(Error::Other(format!("Decoder task failed: {e}")))),
            Err(err) => Err(err),
        };
        // A code carrying no data is not a capture; keep scanning.
        let attempt = attempt.and_then(|payload| {
            if payload.is_empty() {
                Err(Error::QrDecode("QR code carries no data".to_string()))
            } else {
                Ok(payload)
            }
        });

        if stopped.load(Ordering::Acquire) {
            break;
        }

        match attempt {
            Ok(payload) => {
                sink.success(payload);
                break;
            }
            Err(err) => {
                let kind = DecodeErrorKind::classify(&err);
                sink.error(kind, err.platform_message());
                if !kind.is_transient() {
                    tracing::debug!(generation = %sink.generation(), %kind, "Decode loop ending on fault");
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Builds [`FrameLoopEngine`]s with a shared frame interval
#[derive(Debug, Clone)]
pub struct FrameLoopFactory {
    interval: Duration,
}

impl FrameLoopFactory {
    /// Factory for engines pausing `interval` between empty frames
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl EngineFactory for FrameLoopFactory {
    fn create(&self) -> Box<dyn DecodeEngine> {
        Box::new(FrameLoopEngine::new(self.interval))
    }
}
