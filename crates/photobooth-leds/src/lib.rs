//! Addressable LED strip abstraction and the animation driver on top of it.

use std::sync::{Arc, Mutex, PoisonError};

use photobooth_types::{color::Rgb, PhotoboothError, Result};

mod animator;
mod cancel;
mod pattern;

pub use animator::PixelAnimator;
pub use cancel::CancelToken;
pub use pattern::{AnimationPattern, AnimationRequest};

/// Capability contract of an addressable strip: stage colors, then flush.
pub trait PixelStrip: Send {
    fn len(&self) -> usize;
    fn fill(&mut self, color: Rgb);
    fn set(&mut self, index: usize, color: Rgb);
    /// Push the staged colors to the hardware.
    fn show(&mut self) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the strip last displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripSnapshot {
    pub pixels: Vec<Rgb>,
    pub flushes: u64,
}

impl StripSnapshot {
    pub fn is_dark(&self) -> bool {
        self.pixels.iter().all(|p| p.is_off())
    }
}

/// In-memory strip used on development machines and in tests.
pub struct VirtualStrip {
    staged: Vec<Rgb>,
    shown: Arc<Mutex<StripSnapshot>>,
}

impl VirtualStrip {
    pub fn new(num_pixels: usize) -> Self {
        Self {
            staged: vec![Rgb::OFF; num_pixels],
            shown: Arc::new(Mutex::new(StripSnapshot {
                pixels: vec![Rgb::OFF; num_pixels],
                flushes: 0,
            })),
        }
    }

    pub fn probe(&self) -> StripProbe {
        StripProbe {
            shown: Arc::clone(&self.shown),
        }
    }
}

impl PixelStrip for VirtualStrip {
    fn len(&self) -> usize {
        self.staged.len()
    }

    fn fill(&mut self, color: Rgb) {
        self.staged.fill(color);
    }

    fn set(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.staged.get_mut(index) {
            *pixel = color;
        }
    }

    fn show(&mut self) -> Result<()> {
        let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        shown.pixels.clone_from(&self.staged);
        shown.flushes += 1;
        Ok(())
    }
}

/// Read-only view of a [`VirtualStrip`] that outlives handing the strip to an animator.
#[derive(Clone)]
pub struct StripProbe {
    shown: Arc<Mutex<StripSnapshot>>,
}

impl StripProbe {
    pub fn snapshot(&self) -> StripSnapshot {
        self.shown
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_dark(&self) -> bool {
        self.snapshot().is_dark()
    }

    pub fn flushes(&self) -> u64 {
        self.snapshot().flushes
    }
}

pub fn leds_error(message: impl Into<String>) -> PhotoboothError {
    PhotoboothError::Hardware(message.into())
}
