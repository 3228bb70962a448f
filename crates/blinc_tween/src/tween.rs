//! Tweens
//!
//! [`Tweenable`] is the non-generic surface the scheduler works with; both a
//! single [`Tween<T>`] and a [`crate::Sequence`] implement it, so one registry
//! can drive values of any type.

use crate::config::{validate_duration, TweenConfig};
use crate::context::InterpolationContext;
use crate::curve::CurveTable;
use crate::error::{CallbackError, CallbackFailure, CallbackKind, Result, TweenError};
use crate::lifecycle::{guard, Failures, Lifecycle, TweenState};
use crate::values::Interpolate;
use smallvec::SmallVec;

/// Per-tick decision returned by a suspend condition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SuspendDecision {
    #[default]
    Continue,
    /// Skip this tick without leaving the running state
    Suspend,
}

impl From<bool> for SuspendDecision {
    /// `true` suspends
    fn from(suspend: bool) -> Self {
        if suspend {
            SuspendDecision::Suspend
        } else {
            SuspendDecision::Continue
        }
    }
}

/// Something the registry can schedule
pub trait Tweenable: Send {
    fn state(&self) -> TweenState;

    /// Start playing. Restarts a running or paused tweenable; fails on a
    /// terminal one and on invalid timing.
    fn play(&mut self) -> Result<()>;

    /// Advance by `delta` seconds of parent time. Returns whether the
    /// tweenable should stay registered.
    fn advance(&mut self, delta: f32) -> bool;

    /// Returns false (and logs) when not running or paused
    fn pause(&mut self) -> bool;

    /// Returns false (and logs) when not running or paused
    fn resume(&mut self) -> bool;

    /// Force a terminal state. No-op when already terminal.
    fn stop(&mut self, invoke_end: bool);

    /// Back to `Pending` with elapsed time and loop counter cleared
    fn reset(&mut self);

    /// Progress through the current iteration, 0 to 1
    fn progress(&self) -> f32;

    /// Seconds of parent time from play to completion; infinite when looping
    /// forever
    fn duration(&self) -> f32;

    /// Drain callback failures collected since the last call
    fn take_failures(&mut self) -> Failures;

    fn is_playing(&self) -> bool {
        self.state() == TweenState::Running
    }

    fn is_paused(&self) -> bool {
        self.state() == TweenState::Paused
    }

    fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }
}

impl<T: Tweenable + ?Sized> Tweenable for Box<T> {
    fn state(&self) -> TweenState {
        (**self).state()
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn advance(&mut self, delta: f32) -> bool {
        (**self).advance(delta)
    }

    fn pause(&mut self) -> bool {
        (**self).pause()
    }

    fn resume(&mut self) -> bool {
        (**self).resume()
    }

    fn stop(&mut self, invoke_end: bool) {
        (**self).stop(invoke_end)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn progress(&self) -> f32 {
        (**self).progress()
    }

    fn duration(&self) -> f32 {
        (**self).duration()
    }

    fn take_failures(&mut self) -> Failures {
        (**self).take_failures()
    }
}

type Setter<T> = Box<dyn FnMut(T) -> std::result::Result<(), CallbackError> + Send>;
type SuspendCondition = Box<dyn FnMut() -> SuspendDecision + Send>;
type LoopCallback = Box<dyn FnMut(u32) + Send>;

/// Relative slack on the completion check, so frame deltas that add up to the
/// duration finish on the last frame despite float rounding
const COMPLETION_TOLERANCE: f64 = 1e-6;

/// A single typed interpolation driven through a setter
pub struct Tween<T> {
    context: InterpolationContext<T>,
    setter: Setter<T>,
    suspend: Option<SuspendCondition>,
    loop_callbacks: SmallVec<[LoopCallback; 1]>,
    lifecycle: Lifecycle,
    /// Speed-scaled seconds since play, delay included
    elapsed: f64,
    iteration: u32,
    progress: f32,
}

impl<T: Send + 'static> Tween<T> {
    /// Tween driven by an infallible setter
    pub fn from_context<S>(context: InterpolationContext<T>, mut setter: S) -> Self
    where
        S: FnMut(T) + Send + 'static,
    {
        Self::from_context_fallible(context, move |value| {
            setter(value);
            Ok(())
        })
    }

    /// Tween driven by a setter that may report an error; an `Err` is handled
    /// like a panic and force-completes the tween
    pub fn from_context_fallible<S>(context: InterpolationContext<T>, setter: S) -> Self
    where
        S: FnMut(T) -> std::result::Result<(), CallbackError> + Send + 'static,
    {
        Self {
            context,
            setter: Box::new(setter),
            suspend: None,
            loop_callbacks: SmallVec::new(),
            lifecycle: Lifecycle::new(),
            elapsed: 0.0,
            iteration: 0,
            progress: 0.0,
        }
    }

    /// Tween with an explicit lerp function and default timing
    pub fn new<F, S>(start: T, end: T, lerp: F, setter: S) -> Self
    where
        F: Fn(&T, &T, f32) -> T + Send + Sync + 'static,
        S: FnMut(T) + Send + 'static,
    {
        Self::from_context(InterpolationContext::new(start, end, lerp), setter)
    }

    /// Tween using the value type's [`Interpolate`] impl and default timing
    pub fn interpolate<S>(start: T, end: T, setter: S) -> Self
    where
        T: Interpolate,
        S: FnMut(T) + Send + 'static,
    {
        Self::from_context(InterpolationContext::interpolate(start, end), setter)
    }

    /// Apply a full config; custom curve ids resolve against `curves`
    pub fn with_config(mut self, config: &TweenConfig, curves: &CurveTable) -> Result<Self> {
        self.context.apply_config(config, curves)?;
        self.lifecycle.invoke_end_on_manual_stop = config.invoke_end_on_manual_stop;
        Ok(self)
    }

    /// Whether restarting a running tween fires its end callbacks first
    pub fn with_invoke_end_on_manual_stop(mut self, invoke: bool) -> Self {
        self.lifecycle.invoke_end_on_manual_stop = invoke;
        self
    }

    /// Add a callback fired once when the tween completes or is stopped with
    /// `invoke_end`
    pub fn on_end<F: FnMut() + Send + 'static>(mut self, callback: F) -> Self {
        self.lifecycle.on_end(Box::new(callback));
        self
    }

    /// Add a callback fired with the new iteration index whenever a tick
    /// crosses one or more loop boundaries
    pub fn on_loop<F: FnMut(u32) + Send + 'static>(mut self, callback: F) -> Self {
        self.loop_callbacks.push(Box::new(callback));
        self
    }

    /// Bind a condition checked at the start of every tick
    pub fn suspend_when<F, D>(mut self, mut condition: F) -> Self
    where
        F: FnMut() -> D + Send + 'static,
        D: Into<SuspendDecision>,
    {
        self.suspend = Some(Box::new(move || condition().into()));
        self
    }

    pub fn context(&self) -> &InterpolationContext<T> {
        &self.context
    }

    /// Timing can be changed at any time; the next tick picks it up
    pub fn context_mut(&mut self) -> &mut InterpolationContext<T> {
        &mut self.context
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed as f32
    }

    /// Where the tween sits for a given amount of speed-scaled elapsed time:
    /// `(iteration, local time, finished)`
    fn position(&self, elapsed: f64) -> (u32, f32, bool) {
        let duration = f64::from(self.context.duration());
        let active = (elapsed - f64::from(self.context.delay())).max(0.0);

        if let Some(n) = self.context.iterations() {
            let total = duration * f64::from(n);
            if active >= total * (1.0 - COMPLETION_TOLERANCE) {
                return (n - 1, 1.0, true);
            }
        }

        let cycles = active / duration;
        let iteration = cycles.floor();
        (iteration as u32, (cycles - iteration) as f32, false)
    }
}

impl<T: Send + 'static> Tweenable for Tween<T> {
    fn state(&self) -> TweenState {
        self.lifecycle.state()
    }

    fn play(&mut self) -> Result<()> {
        match self.lifecycle.state() {
            TweenState::Pending => {
                validate_duration(self.context.duration())?;
                self.elapsed = 0.0;
                self.iteration = 0;
                self.progress = 0.0;
                self.lifecycle.start();
                Ok(())
            }
            TweenState::Running | TweenState::Paused => {
                let invoke_end = self.lifecycle.invoke_end_on_manual_stop;
                self.stop(invoke_end);
                self.reset();
                self.play()
            }
            TweenState::Completed | TweenState::Cancelled => Err(TweenError::Terminal),
        }
    }

    fn advance(&mut self, delta: f32) -> bool {
        match self.lifecycle.state() {
            TweenState::Running => {}
            state => return !state.is_terminal(),
        }

        if let Some(suspend) = self.suspend.as_mut() {
            match guard(CallbackKind::Suspend, || suspend()) {
                Ok(SuspendDecision::Suspend) => return true,
                Ok(SuspendDecision::Continue) => {}
                Err(failure) => {
                    self.lifecycle.fail(failure);
                    return false;
                }
            }
        }

        self.elapsed += f64::from(delta.max(0.0)) * f64::from(self.context.speed());
        if self.elapsed < f64::from(self.context.delay()) {
            return true;
        }

        let (iteration, local, finished) = self.position(self.elapsed);
        let crossed = iteration > self.iteration;
        self.iteration = iteration;
        self.progress = local;

        let context = &self.context;
        let value = match guard(CallbackKind::Lerp, || context.sample(iteration, local)) {
            Ok(value) => value,
            Err(failure) => {
                self.lifecycle.fail(failure);
                return false;
            }
        };
        let setter = &mut self.setter;
        let outcome = match guard(CallbackKind::Setter, || setter(value)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CallbackFailure::new(CallbackKind::Setter, err.to_string())),
            Err(failure) => Err(failure),
        };
        if let Err(failure) = outcome {
            self.lifecycle.fail(failure);
            return false;
        }

        if crossed {
            for callback in self.loop_callbacks.iter_mut() {
                if let Err(failure) = guard(CallbackKind::Loop, || callback(iteration)) {
                    self.lifecycle.fail(failure);
                    return false;
                }
            }
        }

        if finished {
            tracing::trace!("tween completed after {} iterations", iteration + 1);
            self.lifecycle.finish(TweenState::Completed, true);
            return false;
        }
        true
    }

    fn pause(&mut self) -> bool {
        self.lifecycle.pause()
    }

    fn resume(&mut self) -> bool {
        self.lifecycle.resume()
    }

    fn stop(&mut self, invoke_end: bool) {
        self.lifecycle.finish(TweenState::Cancelled, invoke_end);
    }

    fn reset(&mut self) {
        self.elapsed = 0.0;
        self.iteration = 0;
        self.progress = 0.0;
        self.lifecycle.reset();
    }

    fn progress(&self) -> f32 {
        self.progress
    }

    fn duration(&self) -> f32 {
        self.context.total_duration()
    }

    fn take_failures(&mut self) -> Failures {
        self.lifecycle.take_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoopType, INFINITE_LOOPS};
    use crate::easing::Ease;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<f32>>>, impl FnMut(f32) + Send + 'static) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        (values, move |v| sink.lock().unwrap().push(v))
    }

    fn last(values: &Arc<Mutex<Vec<f32>>>) -> f32 {
        *values.lock().unwrap().last().unwrap()
    }

    #[test]
    fn test_linear_tween_reaches_end() {
        let (values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter);
        tween.play().unwrap();

        assert!(tween.advance(0.5));
        assert!((last(&values) - 5.0).abs() < 1e-5);

        assert!(!tween.advance(0.5));
        assert!((last(&values) - 10.0).abs() < 1e-5);
        assert_eq!(tween.state(), TweenState::Completed);
        assert_eq!(tween.progress(), 1.0);
    }

    #[test]
    fn test_pending_does_not_advance() {
        let (values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 1.0, setter);

        assert!(tween.advance(0.5));
        assert!(values.lock().unwrap().is_empty());
        assert_eq!(tween.state(), TweenState::Pending);
    }

    #[test]
    fn test_delay_holds_setter() {
        let (values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter);
        tween.context_mut().set_delay(0.5);
        tween.play().unwrap();

        assert!(tween.advance(0.25));
        assert!(values.lock().unwrap().is_empty());

        assert!(tween.advance(0.5));
        assert!((last(&values) - 2.5).abs() < 1e-5);
    }

    #[test]
    fn test_speed_scales_delta() {
        let (values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter);
        tween.context_mut().set_speed(2.0).unwrap();
        tween.play().unwrap();

        assert!((tween.duration() - 0.5).abs() < 1e-6);
        assert!(tween.advance(0.25));
        assert!((last(&values) - 5.0).abs() < 1e-5);
        assert!(!tween.advance(0.25));
    }

    #[test]
    fn test_ping_pong_returns_to_start() {
        let (values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter);
        tween
            .context_mut()
            .set_loop_count(1)
            .unwrap()
            .set_loop_type(LoopType::PingPong);
        tween.play().unwrap();

        assert!(tween.advance(1.0));
        assert!((last(&values) - 10.0).abs() < 1e-5);

        assert!(!tween.advance(1.0));
        assert!((last(&values) - 0.0).abs() < 1e-5);
        assert_eq!(tween.state(), TweenState::Completed);
    }

    #[test]
    fn test_restart_loops_and_reports_boundaries() {
        let (values, setter) = recorder();
        let loops = Arc::new(Mutex::new(Vec::new()));
        let loops_clone = loops.clone();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter)
            .on_loop(move |i| loops_clone.lock().unwrap().push(i));
        tween.context_mut().set_loop_count(2).unwrap();
        tween.play().unwrap();

        assert!(tween.advance(1.25));
        assert!((last(&values) - 2.5).abs() < 1e-5);
        assert_eq!(tween.iteration(), 1);

        assert!(tween.advance(1.0));
        assert!((last(&values) - 2.5).abs() < 1e-5);

        assert!(!tween.advance(5.0));
        assert!((last(&values) - 10.0).abs() < 1e-5);
        assert_eq!(*loops.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_incremental_accumulates() {
        let (values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter);
        tween
            .context_mut()
            .set_loop_count(2)
            .unwrap()
            .set_loop_type(LoopType::Incremental);
        tween.play().unwrap();

        tween.advance(1.5);
        assert!((last(&values) - 15.0).abs() < 1e-4);
        assert!(!tween.advance(1.5));
        assert!((last(&values) - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_infinite_loops_never_complete() {
        let (_values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 1.0, setter);
        tween.context_mut().set_loop_count(INFINITE_LOOPS).unwrap();
        tween.play().unwrap();

        for _ in 0..1000 {
            assert!(tween.advance(0.37));
        }
        assert_eq!(tween.state(), TweenState::Running);
        assert!(tween.duration().is_infinite());
    }

    #[test]
    fn test_suspend_skips_time() {
        let (values, setter) = recorder();
        let suspended = Arc::new(AtomicBool::new(true));
        let flag = suspended.clone();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter)
            .suspend_when(move || flag.load(Ordering::SeqCst));
        tween.play().unwrap();

        assert!(tween.advance(0.5));
        assert!(values.lock().unwrap().is_empty());
        assert_eq!(tween.state(), TweenState::Running);

        suspended.store(false, Ordering::SeqCst);
        assert!(tween.advance(0.5));
        assert!((last(&values) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_pause_keeps_elapsed() {
        let (values, setter) = recorder();
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter);
        tween.play().unwrap();
        tween.advance(0.25);

        assert!(tween.pause());
        assert!(tween.is_paused());
        assert!(tween.advance(10.0));
        assert!((last(&values) - 2.5).abs() < 1e-5);

        assert!(tween.resume());
        tween.advance(0.25);
        assert!((last(&values) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let ended = Arc::new(AtomicUsize::new(0));
        let ended_clone = ended.clone();
        let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| {}).on_end(move || {
            ended_clone.fetch_add(1, Ordering::SeqCst);
        });
        tween.play().unwrap();
        assert!(!tween.advance(1.0));
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        tween.stop(false);
        tween.stop(true);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(tween.state(), TweenState::Completed);
    }

    #[test]
    fn test_stop_invokes_end_synchronously() {
        let ended = Arc::new(AtomicUsize::new(0));
        let ended_clone = ended.clone();
        let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| {}).on_end(move || {
            ended_clone.fetch_add(1, Ordering::SeqCst);
        });
        tween.play().unwrap();
        tween.stop(true);

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(tween.state(), TweenState::Cancelled);
    }

    #[test]
    fn test_terminal_requires_reset() {
        let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| {});
        tween.play().unwrap();
        tween.advance(2.0);

        assert_eq!(tween.play(), Err(TweenError::Terminal));

        tween.reset();
        assert_eq!(tween.state(), TweenState::Pending);
        assert_eq!(tween.elapsed(), 0.0);
        assert!(tween.play().is_ok());
    }

    #[test]
    fn test_restart_honors_invoke_end_flag() {
        for (invoke, expected) in [(false, 0), (true, 1)] {
            let ended = Arc::new(AtomicUsize::new(0));
            let ended_clone = ended.clone();
            let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| {})
                .with_invoke_end_on_manual_stop(invoke)
                .on_end(move || {
                    ended_clone.fetch_add(1, Ordering::SeqCst);
                });
            tween.play().unwrap();
            tween.advance(0.5);

            tween.play().unwrap();
            assert_eq!(ended.load(Ordering::SeqCst), expected);
            assert_eq!(tween.state(), TweenState::Running);
            assert_eq!(tween.elapsed(), 0.0);
        }
    }

    #[test]
    fn test_panicking_setter_completes_and_fires_end() {
        let ended = Arc::new(AtomicUsize::new(0));
        let ended_clone = ended.clone();
        let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| panic!("setter exploded")).on_end(
            move || {
                ended_clone.fetch_add(1, Ordering::SeqCst);
            },
        );
        tween.play().unwrap();

        assert!(!tween.advance(0.1));
        assert_eq!(tween.state(), TweenState::Completed);
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        let failures = tween.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, CallbackKind::Setter);
        assert_eq!(failures[0].message, "setter exploded");
    }

    #[test]
    fn test_panicking_lerp_completes_and_fires_end() {
        let (values, setter) = recorder();
        let ended = Arc::new(AtomicUsize::new(0));
        let ended_clone = ended.clone();
        let mut tween = Tween::new(0.0_f32, 1.0, |_, _, _| panic!("lerp exploded"), setter)
            .on_end(move || {
                ended_clone.fetch_add(1, Ordering::SeqCst);
            });
        tween.play().unwrap();

        assert!(!tween.advance(0.1));
        assert_eq!(tween.state(), TweenState::Completed);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(values.lock().unwrap().is_empty());

        let failures = tween.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, CallbackKind::Lerp);
        assert_eq!(failures[0].message, "lerp exploded");
    }

    #[test]
    fn test_frame_deltas_complete_on_last_frame() {
        for (duration, frames) in [(1.0_f32, 60), (1.0, 144), (1.5, 90), (0.3, 7)] {
            let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| {});
            tween.context_mut().set_duration(duration).unwrap();
            tween.play().unwrap();

            let step = duration / frames as f32;
            for _ in 1..frames {
                assert!(tween.advance(step));
            }
            assert!(!tween.advance(step), "{frames} frames of {duration}s");
            assert_eq!(tween.state(), TweenState::Completed);
        }
    }

    #[test]
    fn test_fallible_setter_error_is_a_failure() {
        let context = InterpolationContext::interpolate(0.0_f32, 1.0);
        let mut tween = Tween::from_context_fallible(context, |v: f32| {
            if v > 0.4 {
                Err("out of range".into())
            } else {
                Ok(())
            }
        });
        tween.play().unwrap();

        assert!(tween.advance(0.25));
        assert!(!tween.advance(0.25));
        let failures = tween.take_failures();
        assert_eq!(failures[0].message, "out of range");
    }

    #[test]
    fn test_rejects_invalid_duration_on_play() {
        let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| {});
        let config = TweenConfig::new().with_duration(0.0);
        assert_eq!(
            tween.context_mut().set_duration(config.duration).err(),
            Some(TweenError::InvalidDuration(0.0))
        );
        assert!(Tween::interpolate(0.0_f32, 1.0, |_| {})
            .with_config(&config, &CurveTable::new())
            .is_err());
    }

    #[test]
    fn test_overshoot_flag() {
        let (values, setter) = recorder();
        let config = TweenConfig::new()
            .with_ease(Ease::BackIn)
            .with_overshoot(true);
        let mut tween = Tween::interpolate(0.0_f32, 10.0, setter)
            .with_config(&config, &CurveTable::new())
            .unwrap();
        tween.play().unwrap();
        tween.advance(0.2);
        assert!(last(&values) < 0.0);
    }
}
