use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use image::{imageops, Rgb, RgbImage};
use photobooth_types::{config::CameraConfig, Result};
use tracing::{debug, info, warn};

use crate::{camera_error, encode_jpeg, CameraDevice, StreamingOutput};

const BAR_WIDTH: u32 = 24;

/// Software sensor rendering a moving test pattern. Stands in for the real
/// camera on development machines and in tests.
pub struct SyntheticCamera {
    config: CameraConfig,
    started: bool,
    frames_rendered: Arc<AtomicU64>,
    recorder: Option<Recorder>,
}

struct Recorder {
    running: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            started: false,
            frames_rendered: Arc::new(AtomicU64::new(0)),
            recorder: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(camera_error("camera has not been started"))
        }
    }
}

fn render_frame(config: &CameraConfig, index: u64) -> RgbImage {
    let (width, height) = (config.width, config.height);
    let bar_x = ((index * 8) % width.max(1) as u64) as u32;
    let mut frame = RgbImage::from_fn(width, height, |x, y| {
        if x >= bar_x && x < bar_x + BAR_WIDTH {
            return Rgb([240, 240, 240]);
        }
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 96])
    });
    if config.vflip {
        imageops::flip_vertical_in_place(&mut frame);
    }
    frame
}

impl CameraDevice for SyntheticCamera {
    fn start(&mut self) -> Result<()> {
        info!(
            "Synthetic camera configured at {}x{} @ {} fps",
            self.config.width, self.config.height, self.config.frame_rate
        );
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_recording()?;
        self.started = false;
        info!("Synthetic camera released");
        Ok(())
    }

    fn start_recording(&mut self, sink: Arc<StreamingOutput>) -> Result<()> {
        self.ensure_started()?;
        if self.recorder.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let config = self.config.clone();
        let rendered = Arc::clone(&self.frames_rendered);
        let flag = Arc::clone(&running);
        let frame_interval = Duration::from_secs_f64(1.0 / config.frame_rate.max(1) as f64);

        let worker = thread::Builder::new()
            .name("camera-encoder".into())
            .spawn(move || {
                let mut next_frame = Instant::now();
                while flag.load(Ordering::Acquire) {
                    let index = rendered.fetch_add(1, Ordering::Relaxed);
                    match encode_jpeg(&render_frame(&config, index), config.jpeg_quality) {
                        Ok(jpeg) => {
                            let sequence = sink.write(jpeg);
                            debug!("Encoded preview frame {sequence}");
                        }
                        Err(err) => warn!("Preview encode failed: {err}"),
                    }
                    next_frame += frame_interval;
                    let now = Instant::now();
                    if next_frame > now {
                        thread::sleep(next_frame - now);
                    } else {
                        next_frame = now;
                    }
                }
            })
            .map_err(|err| camera_error(format!("failed to spawn encoder thread: {err}")))?;

        self.recorder = Some(Recorder { running, worker });
        debug!("Synthetic camera recording started");
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        let Some(recorder) = self.recorder.take() else {
            return Ok(());
        };
        recorder.running.store(false, Ordering::Release);
        recorder
            .worker
            .join()
            .map_err(|_| camera_error("encoder thread panicked"))?;
        debug!("Synthetic camera recording stopped");
        Ok(())
    }

    fn capture_jpeg(&mut self) -> Result<Vec<u8>> {
        self.ensure_started()?;
        let index = self.frames_rendered.fetch_add(1, Ordering::Relaxed);
        encode_jpeg(&render_frame(&self.config, index), 95)
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        if let Err(err) = self.stop_recording() {
            warn!("Synthetic camera teardown failed: {err}");
        }
    }
}
