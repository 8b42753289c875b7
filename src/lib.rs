//! QCHECKIN - camera-driven ticket check-in for event staff
//!
//! A signed-in operator points a camera at an attendee's ticket QR code. The
//! [`ScanSession`] state machine acquires the camera, runs a decode engine,
//! and on the first readable payload captures it for review. The reviewer
//! confirms presence and identity, and the check-in is submitted to a
//! [`CheckinService`].
//!
//! # Features
//!
//! - **Camera Integration**: V4L2 capture with facing inference (`camera` feature)
//! - **QR Processing**: rqrr decoding in a cancellable frame loop
//! - **Generation-guarded sessions**: stale completions from superseded scans are discarded
//! - **Async-first**: Built on Tokio for non-blocking operations
//!
//! # Example
//!
//! ```no_run
//! use qcheckin::{
//!     CameraDeviceManager, DraftUpdate, FrameLoopFactory, HttpCheckinService, ScanSession,
//!     ServiceOptions, SessionState, StaticGate, V4lBackend,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> qcheckin::Result<()> {
//!     let backend = Arc::new(V4lBackend::new(Default::default()));
//!     let devices = CameraDeviceManager::discover(backend.as_ref()).await;
//!     let mut session = ScanSession::new(
//!         backend,
//!         Arc::new(FrameLoopFactory::new(Duration::from_millis(90))),
//!         Arc::new(StaticGate::new("door-1")),
//!         devices,
//!     );
//!
//!     session.start()?;
//!     while !matches!(session.state(), SessionState::Captured(_)) {
//!         session.pump().await;
//!     }
//!
//!     let service = HttpCheckinService::new(&ServiceOptions::default())?;
//!     if let Some(mut review) = session.review() {
//!         review.update_draft(
//!             DraftUpdate::default()
//!                 .reviewer_name("Ada Lovelace")
//!                 .reviewer_email("ada@example.org")
//!                 .presence_confirmed(true),
//!         );
//!         review.submit(&service).await?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;
pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod qr;
pub mod review;
pub mod service;
pub mod session;

// Re-exports for convenience
pub use error::{Error, Result, ValidationError};

pub use auth::{AuthGate, Authorization, SharedSecretGate, StaticGate};
pub use camera::{
    CameraBackend, CameraConfig, CameraDescriptor, CameraDeviceManager, CameraHandle, Facing,
    FrameSource, VideoSource,
};
#[cfg(feature = "camera")]
#[cfg_attr(docsrs, doc(cfg(feature = "camera")))]
pub use camera::{V4lBackend, V4lCamera};
pub use config::{
    AuthOptions, CameraOptions, LogRotation, LoggingOptions, QcheckinConfig, ScannerOptions,
    ServiceOptions,
};
pub use qr::{
    DecodeEngine, DecodeErrorKind, EngineEvent, EngineFactory, EngineOutcome, EngineSink,
    FrameDecoder, FrameLoopEngine, FrameLoopFactory, QrEncoder,
};
pub use review::{CheckinReviewForm, DraftUpdate, ReviewDraft};
pub use service::{CheckinAck, CheckinRequest, CheckinService, HttpCheckinService};
pub use session::{
    DecodedPayload, Generation, ScanSession, SessionEvent, SessionState, SessionStatus,
};
