//! Interpolable value types
//!
//! Tweens take their lerp as a plain function; this trait is the default
//! source of that function for common value types. Implementations must not
//! clamp `t`, since overshooting eases and incremental loops rely on
//! extrapolation.

/// Trait for values that can be linearly interpolated
pub trait Interpolate: Clone {
    /// Interpolate between self and other by factor t (unclamped)
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for f64 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t as f64
    }
}

impl<const N: usize> Interpolate for [f32; N] {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        std::array::from_fn(|i| self[i].lerp(&other[i], t))
    }
}

impl Interpolate for (f32, f32) {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        (self.0.lerp(&other.0, t), self.1.lerp(&other.1, t))
    }
}
