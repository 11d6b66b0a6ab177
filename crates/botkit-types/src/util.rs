//! Numeric helpers shared by drivers and user `work` code.

use rand::Rng;

/// Convert `input` from the `[min, max]` range to `0.0..=1.0`.
///
/// The bounds may be given in either order.
pub fn from_scale(input: f64, min: f64, max: f64) -> f64 {
    let (lo, hi) = (min.min(max), min.max(max));
    (input - lo) / (hi - lo)
}

/// Convert `input` from `0.0..=1.0` to the `[min, max]` range, clamping
/// the result to the bounds.
pub fn to_scale(input: f64, min: f64, max: f64) -> f64 {
    let (lo, hi) = (min.min(max), min.max(max));
    (input * (hi - lo) + lo).clamp(lo, hi)
}

/// Uniform random integer in `[0, n)`. Returns 0 when `n` is 0.
pub fn rand(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..n)
}

/// Semantic version of the framework.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
