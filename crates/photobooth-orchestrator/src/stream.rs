use std::{sync::Arc, thread, time::Duration};

use bytes::Bytes;
use photobooth_camera::mjpeg_part;
use tracing::{debug, warn};

use crate::CameraCaptureSystem;

/// One viewer's MJPEG feed. Each item is a complete multipart part.
///
/// The iterator blocks between frames. It ends only when the capture system
/// shuts down; dropping it never affects other viewers or the encoder.
pub struct MjpegStream {
    system: Arc<CameraCaptureSystem>,
    last_sequence: u64,
    frame_interval: Duration,
    idle_timeout: Duration,
}

impl MjpegStream {
    pub(crate) fn new(
        system: Arc<CameraCaptureSystem>,
        frame_interval: Duration,
        idle_timeout: Duration,
    ) -> Self {
        // Start from the current frame so a new viewer gets only fresh output.
        let last_sequence = system.output().sequence();
        Self {
            system,
            last_sequence,
            frame_interval,
            idle_timeout,
        }
    }
}

impl Iterator for MjpegStream {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let output = self.system.output();
        thread::sleep(self.frame_interval);
        loop {
            if self.system.is_shut_down() {
                debug!("MJPEG viewer closed by shutdown");
                return None;
            }
            let Some(frame) = output.read_newer(self.last_sequence, self.idle_timeout) else {
                // Encoder idle: a capture stopped it, or nobody restarted it yet.
                self.system.resume_stream_if_idle();
                continue;
            };
            self.last_sequence = frame.sequence;
            if frame.is_empty() {
                warn!("Skipping empty frame {}", frame.sequence);
                continue;
            }
            return Some(mjpeg_part(&frame.data));
        }
    }
}
