use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, TryLockError,
    },
    thread,
    time::{Duration, Instant},
};

use photobooth_camera::{compose_photo, CameraDevice, StreamingOutput, Watermark};
use photobooth_leds::{AnimationRequest, PixelAnimator};
use photobooth_ops::ensure_capture_dir;
use photobooth_types::{
    color::Rgb,
    config::{CaptureConfig, PhotoboothConfig},
    lifecycle::LifecycleState,
    photo::{list_photo_names, next_photo_number, CapturedPhoto},
    PhotoboothError, Result,
};
use photobooth_upload::{UploadQueue, UploadStats};
use tracing::{debug, info, warn};

use crate::{orchestrator_error, stream::MjpegStream, CaptureParts};

/// Photos taken by [`CameraCaptureSystem::capture_three`].
pub const BURST_SIZE: usize = 3;

/// Owns the camera, watermark, animator, frame slot and upload queue, and
/// serializes capture sequences against each other.
pub struct CameraCaptureSystem {
    settings: CaptureConfig,
    capture_dir: PathBuf,
    /// Held for a whole capture sequence. Guards the next photo number.
    capture: Mutex<u64>,
    camera: Mutex<CameraState>,
    output: Arc<StreamingOutput>,
    watermark: Option<Watermark>,
    animator: PixelAnimator,
    uploads: Option<UploadQueue>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for CameraCaptureSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraCaptureSystem")
            .field("capture_dir", &self.capture_dir)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

struct CameraState {
    device: Box<dyn CameraDevice>,
    streaming: bool,
    released: bool,
}

impl CameraCaptureSystem {
    pub fn new(config: &PhotoboothConfig, parts: CaptureParts) -> Result<Self> {
        let settings = config.capture.clone();
        let capture_dir = ensure_capture_dir(&settings.capture_dir)?;
        let next_number = next_photo_number(&capture_dir).map_err(|err| {
            PhotoboothError::Initialization(format!(
                "unable to scan {}: {err}",
                capture_dir.display()
            ))
        })?;
        info!("Photo numbering resumes at {next_number}");

        let watermark = match &settings.watermark_path {
            Some(path) => Some(Watermark::load(
                path,
                settings.watermark_width,
                settings.watermark_height,
                settings.watermark_opacity,
                config.watermark_position(),
            )?),
            None => None,
        };

        let uploads = match parts.uploader {
            Some(uploader) => Some(UploadQueue::start(
                uploader,
                Duration::from_millis(config.upload.poll_timeout_ms),
            )?),
            None => None,
        };

        let mut device = parts.camera;
        if let Err(err) = device.start() {
            if let Some(queue) = &uploads {
                queue.stop();
            }
            return Err(PhotoboothError::Initialization(format!(
                "camera failed to start: {err}"
            )));
        }

        Ok(Self {
            settings,
            capture_dir,
            capture: Mutex::new(next_number),
            camera: Mutex::new(CameraState {
                device,
                streaming: false,
                released: false,
            }),
            output: Arc::new(StreamingOutput::new()),
            watermark,
            animator: PixelAnimator::new(parts.strip),
            uploads,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Blocking green pulse telling people at the booth it is ready.
    pub fn announce_ready(&self) -> Result<()> {
        self.animator.start(
            AnimationRequest::pulse(
                Duration::from_millis(self.settings.ready_pulse_ms),
                Rgb::GREEN,
            ),
            true,
        )?;
        info!("Camera system ready.");
        Ok(())
    }

    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    pub fn output(&self) -> Arc<StreamingOutput> {
        Arc::clone(&self.output)
    }

    pub fn animator(&self) -> &PixelAnimator {
        &self.animator
    }

    pub fn settings(&self) -> &CaptureConfig {
        &self.settings
    }

    /// Number the next photo will get. Waits for an in-flight capture.
    pub fn next_photo_number(&self) -> u64 {
        *self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_streaming(&self) -> bool {
        self.camera_state().streaming
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn upload_stats(&self) -> Option<UploadStats> {
        self.uploads.as_ref().map(UploadQueue::stats)
    }

    pub fn uploads(&self) -> Option<&UploadQueue> {
        self.uploads.as_ref()
    }

    /// Countdown, then one watermarked photo. The stream is stopped afterwards.
    pub fn capture_one(&self) -> Result<CapturedPhoto> {
        let mut next_number = self.lock_capture()?;
        self.countdown();
        let photo = self.capture_single(&mut next_number)?;
        self.stop_streaming();
        self.enqueue_upload(&photo);
        Ok(photo)
    }

    /// One countdown, then [`BURST_SIZE`] photos at fixed offsets from its end.
    pub fn capture_three(&self) -> Result<Vec<CapturedPhoto>> {
        let mut next_number = self.lock_capture()?;
        self.countdown();

        let interval = Duration::from_millis(self.settings.burst_interval_ms);
        let started = Instant::now();
        let mut photos = Vec::with_capacity(BURST_SIZE);
        for shot in 0..BURST_SIZE {
            let target = started + interval * shot as u32;
            let now = Instant::now();
            if target > now {
                thread::sleep(target - now);
            }
            match self.capture_single(&mut next_number) {
                Ok(photo) => photos.push(photo),
                Err(err) => {
                    warn!("Burst aborted after {} photo(s): {err}", photos.len());
                    photos.iter().for_each(|photo| self.enqueue_upload(photo));
                    return Err(err);
                }
            }
        }

        if self.settings.burst_skips_number {
            // Saturating: the last number is never handed out, see capture_single.
            *next_number = next_number.saturating_add(1);
        }
        photos.iter().for_each(|photo| self.enqueue_upload(photo));

        if let Err(err) = self.ensure_streaming() {
            warn!("Could not restart stream after burst: {err}");
        }
        Ok(photos)
    }

    /// Live MJPEG parts; starts the encoder if it is not running.
    pub fn mjpeg_stream(self: &Arc<Self>) -> Result<MjpegStream> {
        if self.is_shut_down() {
            return Err(PhotoboothError::NotReady(LifecycleState::ShuttingDown));
        }
        self.ensure_streaming()?;
        Ok(MjpegStream::new(
            Arc::clone(self),
            Duration::from_millis(self.settings.stream_frame_interval_ms),
            Duration::from_millis(self.settings.stream_idle_timeout_ms),
        ))
    }

    /// Photo file names, most recent first.
    pub fn list_photos(&self) -> Result<Vec<String>> {
        list_photo_names(&self.capture_dir).map_err(|err| {
            orchestrator_error(format!(
                "unable to list {}: {err}",
                self.capture_dir.display()
            ))
        })
    }

    pub fn latest_photo(&self) -> Result<Option<String>> {
        Ok(self.list_photos()?.into_iter().next())
    }

    /// Stop streaming, release the camera, switch the LEDs off and stop the
    /// upload worker. Waits for an in-flight capture; later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down camera system");
        let _capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut camera = self.camera_state();
            if camera.streaming {
                camera.streaming = false;
                if let Err(err) = camera.device.stop_recording() {
                    warn!("Error stopping recording: {err}");
                }
            }
            if !camera.released {
                camera.released = true;
                if let Err(err) = camera.device.stop() {
                    warn!("Error releasing camera: {err}");
                }
            }
        }

        self.animator.stop();
        if let Some(queue) = &self.uploads {
            queue.stop();
        }
        info!("Camera system shut down");
    }

    /// Restart the encoder for a waiting viewer unless a capture owns the camera.
    pub(crate) fn resume_stream_if_idle(&self) {
        match self.capture.try_lock() {
            Ok(_capture) => {
                if self.is_shut_down() {
                    return;
                }
                if let Err(err) = self.ensure_streaming() {
                    debug!("Stream resume skipped: {err}");
                }
            }
            Err(TryLockError::WouldBlock) => {}
            Err(TryLockError::Poisoned(_)) => warn!("Capture lock poisoned; stream not resumed"),
        }
    }

    fn lock_capture(&self) -> Result<MutexGuard<'_, u64>> {
        let guard = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_shut_down() {
            return Err(PhotoboothError::NotReady(LifecycleState::ShuttingDown));
        }
        Ok(guard)
    }

    fn countdown(&self) {
        let request =
            AnimationRequest::countdown(Duration::from_millis(self.settings.countdown_ms));
        if let Err(err) = self.animator.start(request, true) {
            warn!("Countdown animation failed: {err}");
        }
    }

    /// Flash, grab, watermark and persist one photo. The caller holds the
    /// capture lock; the photo number is consumed even if this fails.
    fn capture_single(&self, next_number: &mut u64) -> Result<CapturedPhoto> {
        let following = next_number.checked_add(1).ok_or_else(|| {
            PhotoboothError::Capture(format!(
                "photo numbering exhausted at {}",
                *next_number
            ))
        })?;
        let photo = CapturedPhoto::new(&self.capture_dir, *next_number);
        *next_number = following;

        self.ensure_streaming()?;
        let flash = AnimationRequest::flash(Duration::from_millis(self.settings.flash_ms));
        if let Err(err) = self.animator.start(flash, false) {
            warn!("Flash animation failed: {err}");
        }
        thread::sleep(Duration::from_millis(self.settings.flash_settle_ms));

        let raw = self.camera_state().device.capture_jpeg()?;
        let composed = compose_photo(&raw, self.watermark.as_ref(), self.settings.photo_quality)?;
        write_photo(&photo.path, &composed)?;
        info!("Image captured: {}", photo.path.display());
        Ok(photo)
    }

    fn ensure_streaming(&self) -> Result<()> {
        let mut camera = self.camera_state();
        if camera.released {
            return Err(PhotoboothError::NotReady(LifecycleState::ShuttingDown));
        }
        if !camera.streaming {
            camera.device.start_recording(Arc::clone(&self.output))?;
            camera.streaming = true;
            debug!("MJPEG stream started");
        }
        Ok(())
    }

    fn stop_streaming(&self) {
        let mut camera = self.camera_state();
        if camera.streaming {
            camera.streaming = false;
            if let Err(err) = camera.device.stop_recording() {
                warn!("Error stopping recording: {err}");
            }
            debug!("MJPEG stream stopped");
        }
    }

    fn enqueue_upload(&self, photo: &CapturedPhoto) {
        let Some(queue) = &self.uploads else {
            return;
        };
        if let Err(err) = queue.enqueue(&photo.path) {
            warn!("{} not queued for upload: {err}", photo.file_name);
        }
    }

    fn camera_state(&self) -> MutexGuard<'_, CameraState> {
        self.camera.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write through a `.part` file so listings never show a half-written photo.
fn write_photo(path: &Path, contents: &[u8]) -> Result<()> {
    let staging = path.with_extension("jpg.part");
    let result = fs::write(&staging, contents).and_then(|_| fs::rename(&staging, path));
    result.map_err(|err| {
        let _ = fs::remove_file(&staging);
        PhotoboothError::Capture(format!("failed to save {}: {err}", path.display()))
    })
}
