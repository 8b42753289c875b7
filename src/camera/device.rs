//! V4L2 camera backend

use crate::camera::{
    CameraBackend, CameraConfig, CameraDescriptor, CameraHandle, Facing, FrameSource, PixelFormat,
    VideoSource,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageBuffer};
use std::io;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

const MAX_DEVICE_INDEX: usize = 10;
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);
const USER_KEYWORDS: [&str; 4] = ["front", "user", "integrated", "facetime"];
const ENVIRONMENT_KEYWORDS: [&str; 4] = ["rear", "back", "world", "environment"];

/// A capture-capable `/dev/videoN` node
#[derive(Debug, Clone)]
pub struct V4lDeviceInfo {
    /// Device index (N in /dev/videoN)
    pub index: usize,
    /// Device path
    pub path: String,
    /// Card name reported by the driver
    pub name: String,
    /// Driver name
    pub driver: String,
}

/// List V4L2 nodes that support video capture. Nodes that fail to open are skipped.
pub fn list_devices() -> Vec<V4lDeviceInfo> {
    let mut devices = Vec::new();

    for index in 0..MAX_DEVICE_INDEX {
        let Ok(dev) = v4l::Device::new(index) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            devices.push(V4lDeviceInfo {
                index,
                path: format!("/dev/video{index}"),
                name: caps.card,
                driver: caps.driver,
            });
        }
    }

    devices
}

/// Assign a facing to each device: config hints first, then name keywords,
/// then alternating environment/user in enumeration order.
fn assign_facing(devices: &[V4lDeviceInfo], config: &CameraConfig) -> Vec<CameraDescriptor> {
    let mut unlabeled = 0usize;

    devices
        .iter()
        .map(|dev| {
            let lower = dev.name.to_lowercase();
            let facing = config.hinted_facing(&dev.name).unwrap_or_else(|| {
                if USER_KEYWORDS.iter().any(|k| lower.contains(k)) {
                    Facing::User
                } else if ENVIRONMENT_KEYWORDS.iter().any(|k| lower.contains(k)) {
                    Facing::Environment
                } else {
                    let facing = if unlabeled % 2 == 0 {
                        Facing::Environment
                    } else {
                        Facing::User
                    };
                    unlabeled += 1;
                    facing
                }
            });
            CameraDescriptor::new(dev.path.clone(), facing).with_label(dev.name.clone())
        })
        .collect()
}

fn device_index(descriptor: &CameraDescriptor) -> Option<usize> {
    descriptor
        .id
        .strip_prefix("/dev/video")
        .and_then(|n| n.parse().ok())
}

fn open_error(context: &str, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::PermissionDenied {
        Error::PermissionDenied(err.to_string())
    } else {
        Error::Camera(format!("{context}: {err}"))
    }
}

/// Camera backend over Video4Linux2
#[derive(Debug, Clone, Default)]
pub struct V4lBackend {
    config: CameraConfig,
}

impl V4lBackend {
    /// Create a backend applying `config` to every acquisition
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CameraBackend for V4lBackend {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>> {
        let devices = tokio::task::spawn_blocking(list_devices)
            .await
            .map_err(|e| Error::Camera(format!("Enumeration task failed: {e}")))?;
        Ok(assign_facing(&devices, &self.config))
    }

    async fn acquire(&self, descriptor: &CameraDescriptor) -> Result<Box<dyn CameraHandle>> {
        let resolved = if descriptor.is_bound() {
            descriptor.clone()
        } else {
            // No enumeration data at startup; look again for the facing constraint.
            self.enumerate()
                .await?
                .into_iter()
                .find(|d| d.facing == descriptor.facing)
                .ok_or_else(|| {
                    Error::CameraNotFound(format!(
                        "No {} camera is connected",
                        descriptor.facing
                    ))
                })?
        };

        let index = device_index(&resolved).ok_or_else(|| {
            Error::CameraNotFound(format!("'{}' is not a V4L2 device path", resolved.id))
        })?;

        let config = self.config.clone();
        let camera = tokio::task::spawn_blocking(move || V4lCamera::open(index, resolved, config))
            .await
            .map_err(|e| Error::Camera(format!("Acquisition task failed: {e}")))??;

        Ok(Box::new(camera))
    }
}

/// Streaming resources, dropped together on release
struct Stream {
    /// Memory-mapped buffers kept warm between captures
    stream: MmapStream<'static>,
    /// Owning handle to the V4L device. Field order drops the stream first.
    _device: Box<Device>,
}

struct Shared {
    stream: Mutex<Option<Stream>>,
    config: CameraConfig,
}

/// An acquired V4L2 camera
pub struct V4lCamera {
    descriptor: CameraDescriptor,
    shared: Arc<Shared>,
}

impl V4lCamera {
    /// Open and configure `/dev/video{index}` and start streaming
    pub fn open(index: usize, descriptor: CameraDescriptor, config: CameraConfig) -> Result<Self> {
        tracing::info!(device = %descriptor.id, facing = %descriptor.facing, "Opening camera");

        let dev = Device::new(index).map_err(|e| open_error("Failed to open device", e))?;

        let mut fmt = dev
            .format()
            .map_err(|e| open_error("Failed to get format", e))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = config.format.to_fourcc();
        let fmt = dev
            .set_format(&fmt)
            .map_err(|e| open_error("Failed to set format", e))?;

        let mut params = dev
            .params()
            .map_err(|e| open_error("Failed to get params", e))?;
        params.interval = v4l::Fraction::new(1, config.fps.max(1));
        dev.set_params(&params)
            .map_err(|e| open_error("Failed to set params", e))?;

        // The driver may have adjusted the requested geometry.
        let config = CameraConfig {
            width: fmt.width,
            height: fmt.height,
            ..config
        };

        tracing::debug!(
            width = fmt.width,
            height = fmt.height,
            fps = config.fps,
            fourcc = %String::from_utf8_lossy(&fmt.fourcc.repr),
            "Camera configured"
        );

        // SAFETY: the boxed device lives in the same `Stream` as the mmap stream
        // and is dropped after it.
        let device = Box::new(dev);
        let static_device: &'static Device =
            unsafe { mem::transmute::<&Device, &'static Device>(device.as_ref()) };

        let mut stream =
            MmapStream::with_buffers(static_device, Type::VideoCapture, config.buffer_count.max(2))
                .map_err(|e| open_error("Failed to create stream", e))?;
        // A device that stops delivering frames surfaces as a capture error.
        stream.set_timeout(FRAME_TIMEOUT);

        Ok(Self {
            descriptor,
            shared: Arc::new(Shared {
                stream: Mutex::new(Some(Stream {
                    stream,
                    _device: device,
                })),
                config,
            }),
        })
    }
}

impl CameraHandle for V4lCamera {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn video_source(&self) -> VideoSource {
        Arc::new(V4lFrames(Arc::clone(&self.shared)))
    }

    fn release(&mut self) {
        let released = match self.shared.stream.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if released {
            tracing::info!(device = %self.descriptor.id, "Camera released");
        }
    }
}

impl Drop for V4lCamera {
    fn drop(&mut self) {
        self.release();
    }
}

impl Shared {
    /// Dequeue one buffer and convert it. Blocks until the driver delivers a
    /// frame or the stream timeout elapses.
    fn capture(&self) -> Result<DynamicImage> {
        let buf = {
            let mut guard = self
                .stream
                .lock()
                .map_err(|_| Error::Camera("Camera stream lock poisoned".to_string()))?;
            let inner = guard
                .as_mut()
                .ok_or_else(|| Error::FrameCapture("Camera has been released".to_string()))?;
            let (buf, _meta) = inner
                .stream
                .next()
                .map_err(|e| Error::FrameCapture(format!("Failed to capture: {e}")))?;
            buf.to_vec()
        };

        decode_frame(&buf, &self.config)
    }
}

/// Frame source handed to decode engines; captures run on the blocking pool
struct V4lFrames(Arc<Shared>);

#[async_trait]
impl FrameSource for V4lFrames {
    async fn next_frame(&self) -> Result<DynamicImage> {
        let shared = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || shared.capture())
            .await
            .map_err(|e| Error::FrameCapture(format!("Capture task failed: {e}")))?
    }
}

fn decode_frame(buf: &[u8], config: &CameraConfig) -> Result<DynamicImage> {
    match config.format {
        PixelFormat::Mjpeg => image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
            .map_err(|e| Error::Image(format!("MJPEG decode failed: {e}"))),
        PixelFormat::Yuyv => yuyv_luma(buf, config.width, config.height),
        PixelFormat::Rgb24 => ImageBuffer::from_raw(config.width, config.height, buf.to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| Error::Image("RGB24 frame shorter than configured size".to_string())),
    }
}

/// QR detection only needs luminance, so YUYV frames keep their Y samples.
fn yuyv_luma(yuyv: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let luma: Vec<u8> = yuyv.iter().step_by(2).copied().collect();
    let pixels = width as usize * height as usize;
    if luma.len() < pixels {
        return Err(Error::Image(format!(
            "YUYV frame has {} samples, expected {pixels}",
            luma.len()
        )));
    }

    GrayImage::from_raw(width, height, luma[..pixels].to_vec())
        .map(DynamicImage::ImageLuma8)
        .ok_or_else(|| Error::Image("Failed to build luma image from YUYV".to_string()))
}
