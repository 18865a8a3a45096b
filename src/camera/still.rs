use crate::config::CameraConfig;
use crate::error::CaptureError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer::prelude::*;
#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer_app::AppSink;

/// MIME type of every captured still
pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

/// Filename the submission endpoint expects for the image part
pub const PHOTO_FILENAME: &str = "face_verification.jpg";

/// One still photo, owned exclusively by the attempt that captured it.
///
/// A recapture supersedes the previous photo; the submission path drops the
/// photo after every call so a retry always captures a fresh frame.
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    pub data: Arc<Vec<u8>>,
    pub mime_type: &'static str,
    pub captured_at: SystemTime,
}

impl CapturedPhoto {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            mime_type: PHOTO_MIME_TYPE,
            captured_at: SystemTime::now(),
        }
    }

    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get photo age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.captured_at)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StillBackend {
    /// Capture from the configured video device
    Device,
    /// Synthesize deterministic frames without hardware
    Mock,
}

/// GStreamer-based one-shot still camera.
///
/// Produces exactly one frame per `capture_frame` call and retains nothing
/// between calls. The mock backend synthesizes frames for tests and for
/// platforms without the camera feature.
pub struct StillCamera {
    config: CameraConfig,
    backend: StillBackend,
    is_ready: AtomicBool,
    frame_counter: AtomicU64,
}

impl StillCamera {
    /// Create a camera backed by the configured video device
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            backend: StillBackend::Device,
            is_ready: AtomicBool::new(false),
            frame_counter: AtomicU64::new(0),
        }
    }

    /// Create a camera that synthesizes frames without hardware
    pub fn mock(config: CameraConfig) -> Self {
        Self {
            config,
            backend: StillBackend::Mock,
            is_ready: AtomicBool::new(false),
            frame_counter: AtomicU64::new(0),
        }
    }

    /// Initialize the capture backend. Must complete before the first
    /// `capture_frame`; capturing earlier fails with `CameraNotReady`.
    pub async fn initialize(&self) -> Result<(), CaptureError> {
        match self.backend {
            StillBackend::Device => {
                #[cfg(all(target_os = "linux", feature = "camera"))]
                {
                    info!(
                        "Initializing still camera for device {} ({}x{})",
                        self.config.index, self.config.resolution.0, self.config.resolution.1
                    );

                    gstreamer::init().map_err(|e| CaptureError::CameraConfiguration {
                        details: format!("Failed to initialize GStreamer: {}", e),
                    })?;
                }

                #[cfg(not(all(target_os = "linux", feature = "camera")))]
                {
                    warn!("Camera backend unavailable on this platform; stills will be mocked");
                }
            }
            StillBackend::Mock => {
                debug!("Mock still camera initialized");
            }
        }

        self.is_ready.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Check if the camera has signaled readiness
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }

    /// Probe camera availability for the permission gate. Never raises;
    /// a failed probe reads as camera-denied.
    pub async fn probe(&self) -> bool {
        if self.is_ready() {
            return true;
        }

        match self.initialize().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Camera probe failed: {}", e);
                false
            }
        }
    }

    /// Get the number of frames captured so far
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    /// Capture exactly one still frame.
    pub async fn capture_frame(&self) -> Result<CapturedPhoto, CaptureError> {
        if !self.is_ready() {
            return Err(CaptureError::CameraNotReady {
                details: "capture requested before initialization".to_string(),
            });
        }

        let photo = match self.backend {
            StillBackend::Device => self.acquire_device_still().await?,
            StillBackend::Mock => self.synthesize_still(),
        };

        let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Captured still frame {} ({} bytes)",
            frame_id,
            photo.byte_count()
        );

        Ok(photo)
    }

    /// Build GStreamer pipeline string for a single MJPEG still
    #[cfg(all(target_os = "linux", feature = "camera"))]
    fn build_pipeline_string(&self) -> String {
        let (width, height) = self.config.resolution;
        let device_index = self.config.index;

        format!(
            "v4l2src device=/dev/video{} num-buffers=1 do-timestamp=true ! \
             image/jpeg,width={},height={} ! \
             appsink name=sink sync=false max-buffers=1 drop=false emit-signals=false",
            device_index, width, height
        )
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    async fn acquire_device_still(&self) -> Result<CapturedPhoto, CaptureError> {
        use tokio::sync::mpsc;

        let pipeline_desc = self.build_pipeline_string();
        debug!("Creating still pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CaptureError::CameraConfiguration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CaptureError::CameraConfiguration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::CameraConfiguration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::CameraConfiguration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let _ = tx.send(sample);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CaptureError::CameraCapture {
                details: format!("Failed to start pipeline: {}", e),
            })?;

        let timeout = std::time::Duration::from_secs(self.config.frame_timeout_seconds);
        let received = tokio::time::timeout(timeout, rx.recv()).await;

        let _ = pipeline.set_state(gstreamer::State::Null);

        let sample = match received {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                return Err(CaptureError::CameraCapture {
                    details: "Pipeline ended without delivering a frame".to_string(),
                })
            }
            Err(_) => {
                return Err(CaptureError::CameraCapture {
                    details: format!("No frame within {:?}", timeout),
                })
            }
        };

        let buffer = sample.buffer().ok_or_else(|| CaptureError::CameraCapture {
            details: "No buffer in sample".to_string(),
        })?;

        let map = buffer
            .map_readable()
            .map_err(|e| CaptureError::CameraCapture {
                details: format!("Failed to map buffer: {}", e),
            })?;

        Ok(CapturedPhoto::new(map.as_slice().to_vec()))
    }

    /// Without the camera feature, device capture degrades to mock frames
    #[cfg(not(all(target_os = "linux", feature = "camera")))]
    async fn acquire_device_still(&self) -> Result<CapturedPhoto, CaptureError> {
        Ok(self.synthesize_still())
    }

    /// Synthesize a deterministic JPEG-shaped still
    fn synthesize_still(&self) -> CapturedPhoto {
        let frame_id = self.frame_counter.load(Ordering::Relaxed);

        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];

        let pattern_size =
            1000 + (self.config.jpeg_quality as usize * 10) + (frame_id % 500) as usize;
        let pattern_byte = (frame_id % 256) as u8;
        data.extend(vec![pattern_byte; pattern_size]);
        data.extend_from_slice(&[0xFF, 0xD9]);

        CapturedPhoto::new(data)
    }
}
