//! Tween error types

use crate::curve::CurveId;
use crate::registry::TweenId;
use thiserror::Error;

/// Misuse of the tween API, reported synchronously to the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TweenError {
    /// Duration must be strictly positive
    #[error("Invalid duration: {0} (must be > 0 seconds)")]
    InvalidDuration(f32),

    /// Speed must be strictly positive
    #[error("Invalid speed: {0} (must be > 0)")]
    InvalidSpeed(f32),

    /// Loop count must be -1 (infinite) or non-negative
    #[error("Invalid loop count: {0} (must be -1 or >= 0)")]
    InvalidLoopCount(i32),

    /// Global time scale must be non-negative
    #[error("Invalid time scale: {0} (must be >= 0)")]
    InvalidTimeScale(f32),

    /// A custom ease curve id that was never registered
    #[error("Ease curve {0:?} is not registered")]
    UnknownCurve(CurveId),

    /// Sampled curve keys were rejected
    #[error("Invalid curve: {0}")]
    InvalidCurve(String),

    /// The tweenable is completed or cancelled and must be reset first
    #[error("Tweenable is in a terminal state; reset it before playing again")]
    Terminal,

    /// The registry no longer accepts registrations
    #[error("Registry is shutting down")]
    ShuttingDown,

    /// No tween is registered under this id
    #[error("Tween {0:?} is not registered")]
    UnknownTween(TweenId),

    /// The registry behind a handle has been dropped
    #[error("Registry has been dropped")]
    RegistryDropped,

    /// `set_global_registry` was called twice
    #[error("Global registry is already set")]
    GlobalRegistryAlreadySet,
}

/// Result type for tween operations
pub type Result<T> = std::result::Result<T, TweenError>;

/// Which user callback failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    Setter,
    /// The value type's lerp function
    Lerp,
    Suspend,
    End,
    Loop,
    /// A method of a user `Tweenable` impl called by the registry
    Tweenable,
}

/// A user callback panicked or returned an error.
///
/// Never returned from a public call. The failing tween is force-completed and
/// the failure is handed to the registry's diagnostics sink.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?} callback failed for tween {tween:?}: {message}")]
pub struct CallbackFailure {
    /// Filled in by the registry; `None` while the tweenable is unregistered
    pub tween: Option<TweenId>,
    pub kind: CallbackKind,
    pub message: String,
}

impl CallbackFailure {
    pub(crate) fn new(kind: CallbackKind, message: impl Into<String>) -> Self {
        Self {
            tween: None,
            kind,
            message: message.into(),
        }
    }
}

/// Error type returned by fallible setters
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;
