//! Lifecycle bookkeeping shared by tweens and sequences
//!
//! ```text
//! Pending ──play──▶ Running ◀──resume/pause──▶ Paused
//!                      │                          │
//!                      ├──complete──▶ Completed   │
//!                      └──stop──────▶ Cancelled ◀─┘
//! ```
//!
//! Terminal states only leave through an explicit reset.

use crate::error::{CallbackFailure, CallbackKind};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Lifecycle state of a tweenable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TweenState {
    /// Constructed, not started
    #[default]
    Pending,
    Running,
    Paused,
    /// Ran to the end of its loop budget (or its callback failed)
    Completed,
    /// Stopped before completing
    Cancelled,
}

impl TweenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TweenState::Completed | TweenState::Cancelled)
    }

    /// Running or paused
    pub fn is_active(self) -> bool {
        matches!(self, TweenState::Running | TweenState::Paused)
    }
}

/// Callback invoked once when a tweenable reaches a terminal state
pub type EndCallback = Box<dyn FnMut() + Send>;

/// Failures collected since the owner last drained them
pub type Failures = SmallVec<[CallbackFailure; 1]>;

/// State, end callbacks and collected failures of one tweenable
pub(crate) struct Lifecycle {
    state: TweenState,
    end_callbacks: SmallVec<[EndCallback; 2]>,
    /// Set once end callbacks have run for the current play-through
    ended: bool,
    failures: Failures,
    pub(crate) invoke_end_on_manual_stop: bool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: TweenState::Pending,
            end_callbacks: SmallVec::new(),
            ended: false,
            failures: SmallVec::new(),
            invoke_end_on_manual_stop: false,
        }
    }

    pub(crate) fn state(&self) -> TweenState {
        self.state
    }

    pub(crate) fn on_end(&mut self, callback: EndCallback) {
        self.end_callbacks.push(callback);
    }

    pub(crate) fn start(&mut self) {
        self.state = TweenState::Running;
    }

    pub(crate) fn pause(&mut self) -> bool {
        match self.state {
            TweenState::Running | TweenState::Paused => {
                self.state = TweenState::Paused;
                true
            }
            state => {
                tracing::warn!("pause() ignored on {:?} tweenable", state);
                false
            }
        }
    }

    pub(crate) fn resume(&mut self) -> bool {
        match self.state {
            TweenState::Running | TweenState::Paused => {
                self.state = TweenState::Running;
                true
            }
            state => {
                tracing::warn!("resume() ignored on {:?} tweenable", state);
                false
            }
        }
    }

    /// Enter a terminal state; end callbacks run at most once per play-through
    pub(crate) fn finish(&mut self, state: TweenState, invoke_end: bool) {
        debug_assert!(state.is_terminal());
        if self.state.is_terminal() {
            return;
        }
        self.state = state;

        if invoke_end && !self.ended {
            self.ended = true;
            for callback in self.end_callbacks.iter_mut() {
                if let Err(failure) = guard(CallbackKind::End, || callback()) {
                    self.failures.push(failure);
                }
            }
        }
    }

    /// Force-complete after a callback failure; end callbacks still fire
    pub(crate) fn fail(&mut self, failure: CallbackFailure) {
        self.failures.push(failure);
        self.finish(TweenState::Completed, true);
    }

    pub(crate) fn reset(&mut self) {
        self.state = TweenState::Pending;
        self.ended = false;
    }

    pub(crate) fn take_failures(&mut self) -> Failures {
        std::mem::take(&mut self.failures)
    }
}

/// Run a user callback, turning a panic into a [`CallbackFailure`]
pub(crate) fn guard<R>(
    kind: CallbackKind,
    f: impl FnOnce() -> R,
) -> std::result::Result<R, CallbackFailure> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| CallbackFailure::new(kind, panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}
