mod common;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use qcheckin::{
    CameraBackend, CameraDescriptor, CameraDeviceManager, CameraHandle, DraftUpdate, Facing,
    FrameLoopFactory, FrameSource, QrEncoder, Result, ScanSession, SessionState, StaticGate,
    VideoSource,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Shows `lead_in` for a few frames, then the attendee's ticket
struct TicketSource {
    lead_in: DynamicImage,
    ticket: DynamicImage,
    blank_frames: usize,
    served: AtomicUsize,
}

#[async_trait]
impl FrameSource for TicketSource {
    async fn next_frame(&self) -> Result<DynamicImage> {
        let n = self.served.fetch_add(1, Ordering::SeqCst);
        if n < self.blank_frames {
            Ok(self.lead_in.clone())
        } else {
            Ok(self.ticket.clone())
        }
    }
}

struct TicketCamera {
    descriptor: CameraDescriptor,
    source: Arc<TicketSource>,
}

impl CameraHandle for TicketCamera {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn video_source(&self) -> VideoSource {
        self.source.clone()
    }

    fn release(&mut self) {}
}

struct TicketBackend {
    lead_in: DynamicImage,
    ticket: DynamicImage,
}

impl TicketBackend {
    /// An empty desk before the ticket
    fn new(ticket: DynamicImage) -> Self {
        Self {
            lead_in: DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([235]))),
            ticket,
        }
    }
}

#[async_trait]
impl CameraBackend for TicketBackend {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>> {
        Ok(vec![CameraDescriptor::new("/dev/video0", Facing::Environment)])
    }

    async fn acquire(&self, descriptor: &CameraDescriptor) -> Result<Box<dyn CameraHandle>> {
        Ok(Box::new(TicketCamera {
            descriptor: descriptor.clone(),
            source: Arc::new(TicketSource {
                lead_in: self.lead_in.clone(),
                ticket: self.ticket.clone(),
                blank_frames: 3,
                served: AtomicUsize::new(0),
            }),
        }))
    }
}

#[tokio::test]
async fn printed_ticket_is_scanned_and_checked_in() {
    let ticket = QrEncoder::new().render("TIX-2024-0042").unwrap();
    let backend = Arc::new(TicketBackend::new(ticket));
    let devices = CameraDeviceManager::discover(backend.as_ref()).await;
    assert_eq!(devices.list_cameras().len(), 1);

    let mut session = ScanSession::new(
        backend,
        Arc::new(FrameLoopFactory::new(Duration::from_millis(5))),
        Arc::new(StaticGate::new("door-1")),
        devices,
    );
    let mut status = session.subscribe();

    session.start().unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !matches!(session.state(), SessionState::Captured(_)) {
            session.pump().await;
        }
    })
    .await
    .expect("ticket should be decoded");

    assert_eq!(
        session.state().payload().map(|p| p.ticket_id()),
        Some("TIX-2024-0042")
    );
    assert!(!session.has_live_engine());
    assert_eq!(status.borrow_and_update().message, "Scan complete");

    let service = common::FakeService::new();
    let mut review = session.review().unwrap();
    review.update_draft(
        DraftUpdate::default()
            .reviewer_name("Ada Lovelace")
            .reviewer_email("ada@example.org")
            .presence_confirmed(true),
    );
    review.submit(&service).await.unwrap();

    assert_eq!(session.state(), &SessionState::Idle);
    assert_eq!(service.requests()[0].ticket_id, "TIX-2024-0042");
}

#[tokio::test]
async fn code_without_data_does_not_stall_scanning() {
    let encoder = QrEncoder::new();
    let backend = Arc::new(TicketBackend {
        lead_in: encoder.render("").unwrap(),
        ticket: encoder.render("TIX-2024-0043").unwrap(),
    });
    let devices = CameraDeviceManager::discover(backend.as_ref()).await;
    let mut session = ScanSession::new(
        backend,
        Arc::new(FrameLoopFactory::new(Duration::from_millis(5))),
        Arc::new(StaticGate::new("door-1")),
        devices,
    );

    session.start().unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !matches!(session.state(), SessionState::Captured(_)) {
            session.pump().await;
        }
    })
    .await
    .expect("scanning should continue past a code with no data");

    assert_eq!(
        session.state().payload().map(|p| p.ticket_id()),
        Some("TIX-2024-0043")
    );
}
