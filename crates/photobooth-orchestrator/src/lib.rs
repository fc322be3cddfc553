//! Capture orchestration: camera, LEDs, watermarking, uploads and the live
//! stream behind one lock discipline, plus the lifecycle around it.

mod handle;
mod hardware;
mod stream;
mod system;

#[cfg(test)]
mod testing;

pub use handle::{boot, SystemHandle};
pub use hardware::{CaptureParts, HardwareProvider, SimulatedHardware};
pub use stream::MjpegStream;
pub use system::{CameraCaptureSystem, BURST_SIZE};

use photobooth_types::PhotoboothError;

pub fn orchestrator_error(message: impl Into<String>) -> PhotoboothError {
    PhotoboothError::Ops(message.into())
}
