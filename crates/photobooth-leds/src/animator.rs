use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use photobooth_types::{color::Rgb, Result};
use tracing::{debug, warn};

use crate::{leds_error, AnimationPattern, AnimationRequest, CancelToken, PixelStrip};

const COUNTDOWN_PALETTE: [Rgb; 3] = [Rgb::RED, Rgb::YELLOW, Rgb::GREEN];
const TRAIL_BRIGHTNESS: f32 = 0.3;
const PULSE_LEVEL_STEP: usize = 5;
const PULSE_STEP_DELAY: Duration = Duration::from_millis(10);

type SharedStrip = Arc<Mutex<Box<dyn PixelStrip>>>;

/// Runs one animation at a time on a strip; a new request preempts the
/// running one.
pub struct PixelAnimator {
    strip: SharedStrip,
    num_pixels: usize,
    current: Mutex<Option<ActiveAnimation>>,
}

struct ActiveAnimation {
    pattern: AnimationPattern,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl ActiveAnimation {
    fn preempt(self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker {
            if worker.join().is_err() {
                warn!("{} animation worker panicked", self.pattern);
            }
        }
    }
}

impl PixelAnimator {
    pub fn new(strip: Box<dyn PixelStrip>) -> Self {
        let num_pixels = strip.len();
        Self {
            strip: Arc::new(Mutex::new(strip)),
            num_pixels,
            current: Mutex::new(None),
        }
    }

    pub fn num_pixels(&self) -> usize {
        self.num_pixels
    }

    /// Parse `name` and start it. Unknown names fail before the strip is touched.
    pub fn start_named(
        &self,
        name: &str,
        duration: Duration,
        blocking: bool,
        color: Option<Rgb>,
    ) -> Result<()> {
        let pattern: AnimationPattern = name.parse()?;
        self.start(
            AnimationRequest {
                pattern,
                duration,
                color,
            },
            blocking,
        )
    }

    /// Stop whatever is running, then run `request`. With `blocking` the
    /// animation runs on the calling thread until it completes or is
    /// preempted; otherwise a worker thread is spawned.
    pub fn start(&self, request: AnimationRequest, blocking: bool) -> Result<()> {
        let cancel = CancelToken::new();
        let mut current = self
            .current
            .lock()
            .map_err(|_| leds_error("animator state lock poisoned"))?;
        if let Some(previous) = current.take() {
            previous.preempt();
        }

        debug!(
            "Starting {} animation for {:?} (blocking: {blocking})",
            request.pattern, request.duration
        );

        if blocking {
            *current = Some(ActiveAnimation {
                pattern: request.pattern,
                cancel: cancel.clone(),
                worker: None,
            });
            drop(current);
            return run_animation(&self.strip, &request, &cancel);
        }

        let strip = Arc::clone(&self.strip);
        let pattern = request.pattern;
        let token = cancel.clone();
        let worker = thread::Builder::new()
            .name(format!("led-{pattern}"))
            .spawn(move || {
                if let Err(err) = run_animation(&strip, &request, &token) {
                    warn!("{} animation failed: {err}", request.pattern);
                }
            })
            .map_err(|err| leds_error(format!("failed to spawn animation worker: {err}")))?;
        *current = Some(ActiveAnimation {
            pattern,
            cancel,
            worker: Some(worker),
        });
        Ok(())
    }

    /// Signal the running animation, join its worker and leave the strip dark.
    pub fn stop(&self) {
        let previous = match self.current.lock() {
            Ok(mut current) => current.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.preempt();
        }
        // Waits out a blocking animation on another thread before blanking.
        drop(LitStrip::acquire(&self.strip));
    }
}

/// Exclusive hold on the strip that switches every pixel off when released,
/// whichever way the animation exits.
struct LitStrip<'a> {
    strip: MutexGuard<'a, Box<dyn PixelStrip>>,
}

impl<'a> LitStrip<'a> {
    fn acquire(strip: &'a SharedStrip) -> Self {
        Self {
            strip: strip.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl Deref for LitStrip<'_> {
    type Target = dyn PixelStrip;

    fn deref(&self) -> &Self::Target {
        &**self.strip
    }
}

impl DerefMut for LitStrip<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.strip
    }
}

impl Drop for LitStrip<'_> {
    fn drop(&mut self) {
        self.strip.fill(Rgb::OFF);
        if let Err(err) = self.strip.show() {
            warn!("failed to switch LED strip off: {err}");
        }
    }
}

fn run_animation(strip: &SharedStrip, request: &AnimationRequest, cancel: &CancelToken) -> Result<()> {
    let mut strip = LitStrip::acquire(strip);
    if cancel.is_cancelled() {
        return Ok(());
    }
    match request.pattern {
        AnimationPattern::Countdown => countdown(&mut *strip, request.duration, cancel),
        AnimationPattern::Pulse => pulse(
            &mut *strip,
            request.duration,
            request.color.unwrap_or(Rgb::GREEN),
            cancel,
        ),
        AnimationPattern::Flash => flash(&mut *strip, request.duration, cancel),
    }
}

fn countdown(strip: &mut dyn PixelStrip, duration: Duration, cancel: &CancelToken) -> Result<()> {
    let num_pixels = strip.len();
    if num_pixels == 0 {
        cancel.sleep(duration);
        return Ok(());
    }
    let hold = duration / COUNTDOWN_PALETTE.len() as u32;
    let step = hold / num_pixels as u32;

    for color in COUNTDOWN_PALETTE {
        for index in 0..num_pixels {
            strip.fill(Rgb::OFF);
            strip.set(index, color);
            if index > 0 {
                strip.set(index - 1, color.scale(TRAIL_BRIGHTNESS));
            }
            strip.show()?;
            if cancel.sleep(step) {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn pulse(
    strip: &mut dyn PixelStrip,
    duration: Duration,
    color: Rgb,
    cancel: &CancelToken,
) -> Result<()> {
    let started = Instant::now();
    let rising = (0..255).step_by(PULSE_LEVEL_STEP);
    let falling = (1..=255).rev().step_by(PULSE_LEVEL_STEP);
    let cycle: Vec<usize> = rising.chain(falling).collect();

    loop {
        for &level in &cycle {
            if started.elapsed() >= duration {
                return Ok(());
            }
            strip.fill(color.scale(level as f32 / 255.0));
            strip.show()?;
            if cancel.sleep(PULSE_STEP_DELAY) {
                return Ok(());
            }
        }
    }
}

fn flash(strip: &mut dyn PixelStrip, duration: Duration, cancel: &CancelToken) -> Result<()> {
    strip.fill(Rgb::WHITE);
    strip.show()?;
    cancel.sleep(duration);
    Ok(())
}
