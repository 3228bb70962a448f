//! Interpolation context
//!
//! Binds a start/end pair, a lerp function and the timing parameters of one
//! tween. The context is pure data: it knows how to turn a loop iteration and
//! a normalized time into a value, but keeps no playback state.

use crate::config::{
    sanitize_delay, validate_duration, validate_loop_count, validate_speed, LoopType, TweenConfig,
    INFINITE_LOOPS,
};
use crate::curve::{CurveTable, EaseCurve, EaseFn};
use crate::error::Result;
use crate::values::Interpolate;
use std::fmt;
use std::sync::Arc;

/// Lerp function bound into a context; must not clamp `t`
pub type LerpFn<T> = Arc<dyn Fn(&T, &T, f32) -> T + Send + Sync>;

/// Start/end values plus everything needed to evaluate them over time
pub struct InterpolationContext<T> {
    start: T,
    end: T,
    lerp: LerpFn<T>,
    duration: f32,
    delay: f32,
    loop_count: i32,
    loop_type: LoopType,
    speed: f32,
    ease: EaseFn,
    allow_overshoot: bool,
}

impl<T: 'static> InterpolationContext<T> {
    /// Create a context with default timing (1 second, linear, no loops)
    pub fn new<F>(start: T, end: T, lerp: F) -> Self
    where
        F: Fn(&T, &T, f32) -> T + Send + Sync + 'static,
    {
        let defaults = TweenConfig::default();
        Self {
            start,
            end,
            lerp: Arc::new(lerp),
            duration: defaults.duration,
            delay: defaults.delay,
            loop_count: defaults.loop_count,
            loop_type: defaults.loop_type,
            speed: defaults.speed,
            ease: EaseFn::default(),
            allow_overshoot: defaults.allow_overshoot,
        }
    }

    /// Create a context using the value type's own [`Interpolate`] impl
    pub fn interpolate(start: T, end: T) -> Self
    where
        T: Interpolate,
    {
        Self::new(start, end, |a: &T, b: &T, t| a.lerp(b, t))
    }

    /// Create a context from a config, resolving custom curves in `curves`
    pub fn from_config<F>(
        start: T,
        end: T,
        lerp: F,
        config: &TweenConfig,
        curves: &CurveTable,
    ) -> Result<Self>
    where
        F: Fn(&T, &T, f32) -> T + Send + Sync + 'static,
    {
        let mut context = Self::new(start, end, lerp);
        context.apply_config(config, curves)?;
        Ok(context)
    }

    /// Overwrite every timing parameter from a config.
    ///
    /// All fields are validated before any is written, so a failed call
    /// leaves the context untouched.
    pub fn apply_config(&mut self, config: &TweenConfig, curves: &CurveTable) -> Result<&mut Self> {
        config.validate()?;
        let ease = curves.resolve(config.ease)?;

        self.duration = config.duration;
        self.delay = sanitize_delay(config.delay);
        self.loop_count = config.loop_count;
        self.loop_type = config.loop_type;
        self.speed = config.speed;
        self.ease = ease;
        self.allow_overshoot = config.allow_overshoot;
        Ok(self)
    }

    // =========================================================================
    // Validating setters
    // =========================================================================

    pub fn set_duration(&mut self, seconds: f32) -> Result<&mut Self> {
        validate_duration(seconds)?;
        self.duration = seconds;
        Ok(self)
    }

    /// Negative delays are treated as zero
    pub fn set_delay(&mut self, seconds: f32) -> &mut Self {
        self.delay = sanitize_delay(seconds);
        self
    }

    pub fn set_loop_count(&mut self, count: i32) -> Result<&mut Self> {
        validate_loop_count(count)?;
        self.loop_count = count;
        Ok(self)
    }

    pub fn set_loop_type(&mut self, loop_type: LoopType) -> &mut Self {
        self.loop_type = loop_type;
        self
    }

    pub fn set_ease(&mut self, ease: impl Into<EaseFn>) -> &mut Self {
        self.ease = ease.into();
        self
    }

    /// Set a config-level ease, resolving custom curve ids against `curves`
    pub fn set_ease_curve(&mut self, ease: EaseCurve, curves: &CurveTable) -> Result<&mut Self> {
        self.ease = curves.resolve(ease)?;
        Ok(self)
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<&mut Self> {
        validate_speed(speed)?;
        self.speed = speed;
        Ok(self)
    }

    pub fn set_overshoot(&mut self, allow: bool) -> &mut Self {
        self.allow_overshoot = allow;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn start(&self) -> &T {
        &self.start
    }

    pub fn end(&self) -> &T {
        &self.end
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn delay(&self) -> f32 {
        self.delay
    }

    pub fn loop_count(&self) -> i32 {
        self.loop_count
    }

    pub fn loop_type(&self) -> LoopType {
        self.loop_type
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn ease(&self) -> &EaseFn {
        &self.ease
    }

    pub fn uses_curve(&self) -> bool {
        self.ease.uses_curve()
    }

    pub fn allows_overshoot(&self) -> bool {
        self.allow_overshoot
    }

    /// Total number of iterations, or `None` when looping forever
    pub fn iterations(&self) -> Option<u32> {
        if self.loop_count == INFINITE_LOOPS {
            None
        } else {
            Some(self.loop_count.max(0) as u32 + 1)
        }
    }

    /// Wall time from play to completion at this context's speed
    pub fn total_duration(&self) -> f32 {
        match self.iterations() {
            Some(n) => (self.delay + self.duration * n as f32) / self.speed,
            None => f32::INFINITY,
        }
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Ease `normalized_time`, clamp unless overshoot is allowed
    pub fn eased(&self, normalized_time: f32) -> f32 {
        let eased = self.ease.apply(normalized_time);
        if self.allow_overshoot {
            eased
        } else {
            eased.clamp(0.0, 1.0)
        }
    }

    /// Value between start and end at `normalized_time`
    pub fn evaluate(&self, normalized_time: f32) -> T {
        (self.lerp)(&self.start, &self.end, self.eased(normalized_time))
    }

    /// Value at `local` time inside loop `iteration`, honoring the loop type
    pub fn sample(&self, iteration: u32, local: f32) -> T {
        match self.loop_type {
            LoopType::Restart => self.evaluate(local),
            LoopType::PingPong => {
                if iteration % 2 == 1 {
                    self.evaluate(1.0 - local)
                } else {
                    self.evaluate(local)
                }
            }
            LoopType::Incremental => {
                if iteration == 0 {
                    return self.evaluate(local);
                }
                // Iteration k runs from lerp(start, end, k) to lerp(start, end, k + 1)
                let k = iteration as f32;
                let from = (self.lerp)(&self.start, &self.end, k);
                let to = (self.lerp)(&self.start, &self.end, k + 1.0);
                (self.lerp)(&from, &to, self.eased(local))
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for InterpolationContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpolationContext")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("duration", &self.duration)
            .field("delay", &self.delay)
            .field("loop_count", &self.loop_count)
            .field("loop_type", &self.loop_type)
            .field("speed", &self.speed)
            .field("ease", &self.ease)
            .field("allow_overshoot", &self.allow_overshoot)
            .finish_non_exhaustive()
    }
}
