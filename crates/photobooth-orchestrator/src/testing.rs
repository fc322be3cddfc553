//! Fast, instrumented hardware for orchestrator tests.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use image::{DynamicImage, Rgba, RgbaImage};
use photobooth_camera::{camera_error, CameraDevice, StreamingOutput, SyntheticCamera};
use photobooth_leds::{PixelStrip, StripProbe, VirtualStrip};
use photobooth_types::{
    config::{CameraConfig, LedConfig, PhotoboothConfig, UploadConfig},
    PhotoboothError, Result,
};
use photobooth_upload::{upload_error, DirectoryUploader, StorageUploader, UploadedFile};
use tempfile::TempDir;

use crate::{CameraCaptureSystem, HardwareProvider};

/// Config scaled down so a capture sequence takes tens of milliseconds.
pub(crate) fn fast_config(root: &Path) -> PhotoboothConfig {
    let mut config = PhotoboothConfig::default();
    config.camera.width = 64;
    config.camera.height = 80;
    config.camera.frame_rate = 100;
    config.camera.jpeg_quality = 60;
    config.leds.num_pixels = 4;

    let capture = &mut config.capture;
    capture.capture_dir = path_string(&root.join("captures"));
    capture.watermark_path = None;
    capture.watermark_width = 64;
    capture.watermark_height = 10;
    capture.watermark_bottom_offset = 5;
    capture.countdown_ms = 30;
    capture.flash_ms = 5;
    capture.flash_settle_ms = 1;
    capture.burst_interval_ms = 150;
    capture.stream_frame_interval_ms = 5;
    capture.stream_idle_timeout_ms = 100;
    capture.ready_pulse_ms = 10;

    config.upload.credentials_path = None;
    config.upload.mirror_dir = path_string(&root.join("remote"));
    config.upload.poll_timeout_ms = 20;

    config.startup.max_attempts = 3;
    config.startup.retry_backoff_ms = 5;
    config
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// What the instrumented camera saw.
#[derive(Default)]
pub(crate) struct CameraProbe {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub fail_next: AtomicBool,
    pub capture_delay_ms: AtomicU64,
    pub starts: AtomicUsize,
    captures: Mutex<Vec<Instant>>,
}

impl CameraProbe {
    /// When each still grab began, oldest first.
    pub fn capture_times(&self) -> Vec<Instant> {
        self.captures.lock().expect("captures").clone()
    }
}

/// Synthetic camera that records overlap and timing of still grabs.
pub(crate) struct InstrumentedCamera {
    inner: SyntheticCamera,
    probe: Arc<CameraProbe>,
}

impl CameraDevice for InstrumentedCamera {
    fn start(&mut self) -> Result<()> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.inner.start()
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn start_recording(&mut self, sink: Arc<StreamingOutput>) -> Result<()> {
        self.inner.start_recording(sink)
    }

    fn stop_recording(&mut self) -> Result<()> {
        self.inner.stop_recording()
    }

    fn capture_jpeg(&mut self) -> Result<Vec<u8>> {
        self.probe.captures.lock().expect("captures").push(Instant::now());
        let active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = self.probe.capture_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        let result = if self.probe.fail_next.swap(false, Ordering::SeqCst) {
            Err(camera_error("sensor timeout"))
        } else {
            self.inner.capture_jpeg()
        };

        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub(crate) struct FailingUploader;

impl StorageUploader for FailingUploader {
    fn upload(&self, path: &Path) -> Result<UploadedFile> {
        Err(upload_error(format!("remote unreachable for {}", path.display())))
    }
}

/// Test provider. Camera opens fail while `camera_failures` is non-zero.
pub(crate) struct TestHardware {
    pub camera: Arc<CameraProbe>,
    pub camera_failures: AtomicU32,
    pub open_attempts: AtomicU32,
    pub failing_uploads: bool,
    pub panic_on_open: AtomicBool,
    strip: Mutex<Option<StripProbe>>,
}

impl TestHardware {
    pub fn new() -> Self {
        Self {
            camera: Arc::new(CameraProbe::default()),
            camera_failures: AtomicU32::new(0),
            open_attempts: AtomicU32::new(0),
            failing_uploads: false,
            panic_on_open: AtomicBool::new(false),
            strip: Mutex::new(None),
        }
    }

    pub fn failing_camera(failures: u32) -> Self {
        let hardware = Self::new();
        hardware.camera_failures.store(failures, Ordering::SeqCst);
        hardware
    }

    /// Probe of the most recently opened strip.
    pub fn strip(&self) -> StripProbe {
        self.strip
            .lock()
            .expect("strip probe")
            .clone()
            .expect("no strip opened yet")
    }
}

impl HardwareProvider for TestHardware {
    fn open_camera(&self, config: &CameraConfig) -> Result<Box<dyn CameraDevice>> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_open.load(Ordering::SeqCst) {
            panic!("camera driver crashed");
        }
        let remaining = self.camera_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.camera_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PhotoboothError::Hardware("camera not detected".into()));
        }
        Ok(Box::new(InstrumentedCamera {
            inner: SyntheticCamera::new(config.clone()),
            probe: Arc::clone(&self.camera),
        }))
    }

    fn open_strip(&self, config: &LedConfig) -> Result<Box<dyn PixelStrip>> {
        let strip = VirtualStrip::new(config.num_pixels);
        *self.strip.lock().expect("strip probe") = Some(strip.probe());
        Ok(Box::new(strip))
    }

    fn open_uploader(&self, config: &UploadConfig) -> Result<Option<Arc<dyn StorageUploader>>> {
        if !config.enabled {
            return Ok(None);
        }
        if self.failing_uploads {
            return Ok(Some(Arc::new(FailingUploader)));
        }
        Ok(Some(Arc::new(DirectoryUploader::from_config(config))))
    }
}

/// Temp directory, fast config and instrumented hardware for one test.
pub(crate) struct Rig {
    _root: TempDir,
    pub config: PhotoboothConfig,
    pub hardware: Arc<TestHardware>,
    pub camera: Arc<CameraProbe>,
}

impl Rig {
    pub fn new() -> Self {
        Self::build(TestHardware::new(), |_| {})
    }

    pub fn with(adjust: impl FnOnce(&mut PhotoboothConfig)) -> Self {
        Self::build(TestHardware::new(), adjust)
    }

    pub fn with_hardware(hardware: TestHardware) -> Self {
        Self::build(hardware, |_| {})
    }

    pub fn with_failing_uploads() -> Self {
        let mut hardware = TestHardware::new();
        hardware.failing_uploads = true;
        Self::build(hardware, |_| {})
    }

    pub fn with_watermark() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("watermark.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 5, Rgba([255, 255, 255, 255])))
            .save(&path)
            .expect("save watermark");
        let mut config = fast_config(root.path());
        config.capture.watermark_path = Some(path_string(&path));
        Self::finish(root, config, TestHardware::new())
    }

    fn build(hardware: TestHardware, adjust: impl FnOnce(&mut PhotoboothConfig)) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let mut config = fast_config(root.path());
        adjust(&mut config);
        Self::finish(root, config, hardware)
    }

    fn finish(root: TempDir, config: PhotoboothConfig, hardware: TestHardware) -> Self {
        config.validate().expect("test config valid");
        let camera = Arc::clone(&hardware.camera);
        Self {
            _root: root,
            config,
            hardware: Arc::new(hardware),
            camera,
        }
    }

    pub fn system(&self) -> CameraCaptureSystem {
        let parts = self
            .hardware
            .open_all(&self.config.camera, &self.config.leds, &self.config.upload)
            .expect("open hardware");
        CameraCaptureSystem::new(&self.config, parts).expect("capture system")
    }

    pub fn strip(&self) -> StripProbe {
        self.hardware.strip()
    }

    pub fn capture_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.capture.capture_dir)
    }

    pub fn remote_dir(&self) -> PathBuf {
        let upload = &self.config.upload;
        Path::new(&upload.mirror_dir).join(&upload.folder_id)
    }
}
