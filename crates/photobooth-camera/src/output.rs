use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use photobooth_types::frame::JpegFrame;

/// Single-slot frame buffer between the camera encoder and stream readers.
///
/// Every write replaces the previous frame and wakes all readers. Nothing is
/// queued: a reader slower than the encoder skips frames and always gets the
/// freshest one.
#[derive(Default)]
pub struct StreamingOutput {
    slot: Mutex<Slot>,
    frame_ready: Condvar,
}

#[derive(Default)]
struct Slot {
    latest: Option<JpegFrame>,
    sequence: u64,
}

impl StreamingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame and return the sequence number it was given.
    pub fn write(&self, data: impl Into<Bytes>) -> u64 {
        let mut frame = JpegFrame::new(data);
        let mut slot = self.lock();
        slot.sequence += 1;
        frame.sequence = slot.sequence;
        slot.latest = Some(frame);
        let sequence = slot.sequence;
        drop(slot);
        self.frame_ready.notify_all();
        sequence
    }

    /// Block until a frame exists and return the latest one.
    pub fn read(&self) -> JpegFrame {
        let mut slot = self.lock();
        loop {
            if let Some(frame) = &slot.latest {
                return frame.clone();
            }
            slot = self
                .frame_ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait up to `timeout` for a frame newer than sequence `after`.
    pub fn read_newer(&self, after: u64, timeout: Duration) -> Option<JpegFrame> {
        let (slot, _) = self
            .frame_ready
            .wait_timeout_while(self.lock(), timeout, |slot| slot.sequence <= after)
            .unwrap_or_else(PoisonError::into_inner);
        slot.latest
            .as_ref()
            .filter(|frame| frame.sequence > after)
            .cloned()
    }

    pub fn latest(&self) -> Option<JpegFrame> {
        self.lock().latest.clone()
    }

    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
