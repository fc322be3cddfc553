//! Camera capability contract, frame hand-off and image post-processing.

use std::sync::Arc;

use photobooth_types::{PhotoboothError, Result};

mod mjpeg;
mod output;
mod synthetic;
mod watermark;

pub use mjpeg::{mjpeg_part, MJPEG_BOUNDARY, MJPEG_CONTENT_TYPE};
pub use output::StreamingOutput;
pub use synthetic::SyntheticCamera;
pub use watermark::{compose_photo, encode_jpeg, Watermark};

/// What the capture system needs from a camera sensor.
pub trait CameraDevice: Send {
    /// Configure and power up the sensor.
    fn start(&mut self) -> Result<()>;
    /// Release the sensor. Stops recording first if needed.
    fn stop(&mut self) -> Result<()>;
    /// Begin continuous JPEG encoding into `sink` on the device's own thread.
    fn start_recording(&mut self, sink: Arc<StreamingOutput>) -> Result<()>;
    fn stop_recording(&mut self) -> Result<()>;
    /// Grab one still frame, JPEG encoded.
    fn capture_jpeg(&mut self) -> Result<Vec<u8>>;
}

pub fn camera_error(message: impl Into<String>) -> PhotoboothError {
    PhotoboothError::Capture(message.into())
}
