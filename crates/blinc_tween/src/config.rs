//! Tween and registry configuration
//!
//! Both structs deserialize with defaults for missing fields, so hosts can
//! keep presets in TOML or JSON next to the rest of their settings.

use crate::curve::EaseCurve;
use crate::easing::Ease;
use crate::error::{Result, TweenError};
use serde::{Deserialize, Serialize};

/// Loop count meaning "repeat forever"
pub const INFINITE_LOOPS: i32 = -1;

/// How a tween behaves when it wraps into its next iteration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopType {
    /// Jump back to the start value each iteration
    #[default]
    Restart,
    /// Alternate forward and backward each iteration
    PingPong,
    /// Each iteration continues from where the last one ended
    Incremental,
}

/// Options recognized when creating a tween
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweenConfig {
    /// Seconds per iteration (> 0)
    pub duration: f32,
    /// Seconds before the first iteration; negative is treated as 0
    pub delay: f32,
    pub ease: EaseCurve,
    /// Extra iterations after the first: 0 plays once, -1 loops forever
    pub loop_count: i32,
    pub loop_type: LoopType,
    /// Multiplier applied to every tick delta (> 0)
    pub speed: f32,
    /// Let eased values leave `[0, 1]`
    pub allow_overshoot: bool,
    /// Fire end callbacks when a running tween is stopped because it was
    /// played again
    pub invoke_end_on_manual_stop: bool,
}

impl Default for TweenConfig {
    fn default() -> Self {
        Self {
            duration: 1.0,
            delay: 0.0,
            ease: EaseCurve::Named(Ease::Linear),
            loop_count: 0,
            loop_type: LoopType::Restart,
            speed: 1.0,
            allow_overshoot: false,
            invoke_end_on_manual_stop: false,
        }
    }
}

impl TweenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_delay(mut self, seconds: f32) -> Self {
        self.delay = seconds;
        self
    }

    pub fn with_ease(mut self, ease: impl Into<EaseCurve>) -> Self {
        self.ease = ease.into();
        self
    }

    pub fn with_loops(mut self, count: i32, loop_type: LoopType) -> Self {
        self.loop_count = count;
        self.loop_type = loop_type;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_overshoot(mut self, allow: bool) -> Self {
        self.allow_overshoot = allow;
        self
    }

    pub fn with_invoke_end_on_manual_stop(mut self, invoke: bool) -> Self {
        self.invoke_end_on_manual_stop = invoke;
        self
    }

    /// Check every range; returns the first violation found
    pub fn validate(&self) -> Result<()> {
        validate_duration(self.duration)?;
        validate_speed(self.speed)?;
        validate_loop_count(self.loop_count)?;
        Ok(())
    }
}

pub(crate) fn validate_duration(seconds: f32) -> Result<()> {
    if seconds.is_finite() && seconds > 0.0 {
        Ok(())
    } else {
        Err(TweenError::InvalidDuration(seconds))
    }
}

pub(crate) fn validate_speed(speed: f32) -> Result<()> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(TweenError::InvalidSpeed(speed))
    }
}

pub(crate) fn validate_loop_count(count: i32) -> Result<()> {
    if count >= INFINITE_LOOPS {
        Ok(())
    } else {
        Err(TweenError::InvalidLoopCount(count))
    }
}

/// Negative and non-finite delays collapse to zero
pub(crate) fn sanitize_delay(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

/// Registry-wide time controls
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Multiplier applied to every delta passed to `advance` (>= 0)
    pub time_scale: f32,
    /// Upper bound for a single tick, in seconds, applied before scaling
    pub max_delta: Option<f32>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            max_delta: None,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        validate_time_scale(self.time_scale)
    }
}

pub(crate) fn validate_time_scale(scale: f32) -> Result<()> {
    if scale.is_finite() && scale >= 0.0 {
        Ok(())
    } else {
        Err(TweenError::InvalidTimeScale(scale))
    }
}
