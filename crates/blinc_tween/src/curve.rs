//! User-defined ease curves
//!
//! A [`SampledCurve`] is built from `(time, value)` control points and
//! evaluated with monotone cubic Hermite interpolation, so it never rings
//! between keys that are themselves monotone. Curves are registered in a
//! [`CurveTable`] and referenced from tween configs by [`CurveId`].

use crate::easing::Ease;
use crate::error::{Result, TweenError};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use std::sync::Arc;

new_key_type! {
    /// Handle to a registered sampled curve
    pub struct CurveId;
}

/// A control point of a sampled curve
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
}

/// Piecewise monotone cubic curve through a set of control points
#[derive(Clone, Debug, PartialEq)]
pub struct SampledCurve {
    keys: Vec<CurveKey>,
    /// Fritsch-Carlson tangents, one per key
    tangents: Vec<f32>,
}

impl SampledCurve {
    /// Build a curve from `(time, value)` pairs.
    ///
    /// Keys are sorted by time. Fails if there are no keys, a key is not
    /// finite, or two keys share the same time.
    pub fn new(points: impl IntoIterator<Item = (f32, f32)>) -> Result<Self> {
        let mut keys: Vec<CurveKey> = points
            .into_iter()
            .map(|(time, value)| CurveKey { time, value })
            .collect();

        if keys.is_empty() {
            return Err(TweenError::InvalidCurve("curve has no keys".into()));
        }
        if let Some(bad) = keys
            .iter()
            .find(|k| !k.time.is_finite() || !k.value.is_finite())
        {
            return Err(TweenError::InvalidCurve(format!(
                "non-finite key ({}, {})",
                bad.time, bad.value
            )));
        }

        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        if let Some(pair) = keys.windows(2).find(|w| w[0].time >= w[1].time) {
            return Err(TweenError::InvalidCurve(format!(
                "duplicate key time {}",
                pair[1].time
            )));
        }

        let tangents = monotone_tangents(&keys);
        Ok(Self { keys, tangents })
    }

    pub fn keys(&self) -> &[CurveKey] {
        &self.keys
    }

    /// Evaluate the curve. Time outside the key range holds the end values.
    pub fn evaluate(&self, t: f32) -> f32 {
        let first = self.keys[0];
        let last = self.keys[self.keys.len() - 1];
        if self.keys.len() == 1 || t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        // Index of the first key strictly after t; t is inside the range so
        // this is in 1..len
        let i = self.keys.partition_point(|k| k.time <= t);
        let (k0, k1) = (self.keys[i - 1], self.keys[i]);
        let (m0, m1) = (self.tangents[i - 1], self.tangents[i]);

        let h = k1.time - k0.time;
        let s = (t - k0.time) / h;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        h00 * k0.value + h10 * h * m0 + h01 * k1.value + h11 * h * m1
    }
}

fn monotone_tangents(keys: &[CurveKey]) -> Vec<f32> {
    let n = keys.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let secants: Vec<f32> = keys
        .windows(2)
        .map(|w| (w[1].value - w[0].value) / (w[1].time - w[0].time))
        .collect();

    let mut tangents = Vec::with_capacity(n);
    tangents.push(secants[0]);
    for k in 1..n - 1 {
        let (a, b) = (secants[k - 1], secants[k]);
        if a * b <= 0.0 {
            tangents.push(0.0);
        } else {
            tangents.push((a + b) / 2.0);
        }
    }
    tangents.push(secants[n - 2]);

    for k in 0..n - 1 {
        let d = secants[k];
        if d == 0.0 {
            tangents[k] = 0.0;
            tangents[k + 1] = 0.0;
            continue;
        }
        let a = tangents[k] / d;
        let b = tangents[k + 1] / d;
        let s = a * a + b * b;
        if s > 9.0 {
            let tau = 3.0 / s.sqrt();
            tangents[k] = tau * a * d;
            tangents[k + 1] = tau * b * d;
        }
    }

    tangents
}

/// Ease selection as written in a tween config.
///
/// Serialized untagged, so a config file can say `ease = "QuadOut"`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EaseCurve {
    /// One of the built-in curves
    Named(Ease),
    /// A curve registered in the [`CurveTable`]
    Custom(CurveId),
}

impl Default for EaseCurve {
    fn default() -> Self {
        EaseCurve::Named(Ease::Linear)
    }
}

impl From<Ease> for EaseCurve {
    fn from(ease: Ease) -> Self {
        EaseCurve::Named(ease)
    }
}

impl From<CurveId> for EaseCurve {
    fn from(id: CurveId) -> Self {
        EaseCurve::Custom(id)
    }
}

/// An ease curve resolved against a [`CurveTable`], ready to evaluate
#[derive(Clone, Debug)]
pub enum EaseFn {
    Named(Ease),
    Sampled(Arc<SampledCurve>),
}

impl EaseFn {
    pub fn apply(&self, t: f32) -> f32 {
        match self {
            EaseFn::Named(ease) => ease.apply(t),
            EaseFn::Sampled(curve) => curve.evaluate(t),
        }
    }

    /// Whether this ease is backed by a user curve
    pub fn uses_curve(&self) -> bool {
        matches!(self, EaseFn::Sampled(_))
    }
}

impl Default for EaseFn {
    fn default() -> Self {
        EaseFn::Named(Ease::Linear)
    }
}

impl From<Ease> for EaseFn {
    fn from(ease: Ease) -> Self {
        EaseFn::Named(ease)
    }
}

impl From<SampledCurve> for EaseFn {
    fn from(curve: SampledCurve) -> Self {
        EaseFn::Sampled(Arc::new(curve))
    }
}

/// Table of user curves shared by every tween of a registry
#[derive(Default, Debug)]
pub struct CurveTable {
    curves: SlotMap<CurveId, Arc<SampledCurve>>,
}

impl CurveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, curve: SampledCurve) -> CurveId {
        self.curves.insert(Arc::new(curve))
    }

    pub fn remove(&mut self, id: CurveId) -> Option<Arc<SampledCurve>> {
        self.curves.remove(id)
    }

    pub fn get(&self, id: CurveId) -> Option<&Arc<SampledCurve>> {
        self.curves.get(id)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Resolve a config-level ease into something a context can evaluate
    pub fn resolve(&self, ease: EaseCurve) -> Result<EaseFn> {
        match ease {
            EaseCurve::Named(ease) => Ok(EaseFn::Named(ease)),
            EaseCurve::Custom(id) => self
                .curves
                .get(id)
                .cloned()
                .map(EaseFn::Sampled)
                .ok_or(TweenError::UnknownCurve(id)),
        }
    }

    /// Evaluate any ease at `t` without building a context
    pub fn evaluate(&self, ease: EaseCurve, t: f32) -> Result<f32> {
        Ok(self.resolve(ease)?.apply(t))
    }
}
