//! Blinc Tween Engine
//!
//! Typed, time-based interpolations driven by a host tick.
//!
//! # Features
//!
//! - **Tweens**: Any value type with a lerp function, with delay, loops and speed
//! - **Easing**: Named curves, cubic bezier, and user-sampled curves
//! - **Sequences**: Append and join tweens into one controllable unit
//! - **Registry**: Advances everything in registration order and isolates
//!   failing callbacks
//!
//! # Example
//!
//! ```
//! use blinc_tween::{Registry, TweenConfig};
//! use std::sync::{Arc, Mutex};
//!
//! let registry = Registry::new();
//! let value = Arc::new(Mutex::new(0.0_f32));
//! let target = value.clone();
//!
//! let handle = registry
//!     .create_tween(0.0_f32, 10.0, move |v| *target.lock().unwrap() = v, &TweenConfig::default())
//!     .unwrap();
//! handle.play().unwrap();
//!
//! registry.advance(0.5);
//! assert!((*value.lock().unwrap() - 5.0).abs() < 1e-5);
//! ```

pub mod config;
pub mod context;
pub mod curve;
pub mod easing;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod sequence;
pub mod tween;
pub mod values;

pub use config::{LoopType, RegistryConfig, TweenConfig, INFINITE_LOOPS};
pub use context::{InterpolationContext, LerpFn};
pub use curve::{CurveId, CurveKey, CurveTable, EaseCurve, EaseFn, SampledCurve};
pub use easing::Ease;
pub use error::{CallbackError, CallbackFailure, CallbackKind, Result, TweenError};
pub use lifecycle::{EndCallback, Failures, TweenState};
pub use registry::{
    is_global_registry_set, set_global_registry, try_global_registry, DiagnosticsSink, Registry,
    RegistryHandle, RunningTweens, TweenHandle, TweenId, TweenStatus,
};
pub use sequence::Sequence;
pub use tween::{SuspendDecision, Tween, Tweenable};
pub use values::Interpolate;
