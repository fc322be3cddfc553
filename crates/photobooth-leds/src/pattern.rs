use std::{fmt, str::FromStr, time::Duration};

use photobooth_types::{color::Rgb, PhotoboothError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationPattern {
    /// Red, yellow, green sweep with a fading trail.
    Countdown,
    /// Brightness ramp up and down in a single color.
    Pulse,
    /// Full white, used as the shutter cue.
    Flash,
}

impl AnimationPattern {
    pub fn name(self) -> &'static str {
        match self {
            AnimationPattern::Countdown => "countdown",
            AnimationPattern::Pulse => "pulse",
            AnimationPattern::Flash => "flash",
        }
    }
}

impl fmt::Display for AnimationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnimationPattern {
    type Err = PhotoboothError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "countdown" => Ok(AnimationPattern::Countdown),
            "pulse" => Ok(AnimationPattern::Pulse),
            "flash" => Ok(AnimationPattern::Flash),
            other => Err(PhotoboothError::InvalidArgument(format!(
                "unknown animation type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnimationRequest {
    pub pattern: AnimationPattern,
    pub duration: Duration,
    pub color: Option<Rgb>,
}

impl AnimationRequest {
    pub fn countdown(duration: Duration) -> Self {
        Self {
            pattern: AnimationPattern::Countdown,
            duration,
            color: None,
        }
    }

    pub fn pulse(duration: Duration, color: Rgb) -> Self {
        Self {
            pattern: AnimationPattern::Pulse,
            duration,
            color: Some(color),
        }
    }

    pub fn flash(duration: Duration) -> Self {
        Self {
            pattern: AnimationPattern::Flash,
            duration,
            color: None,
        }
    }
}
