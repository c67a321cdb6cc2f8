//! Stability scoring
//!
//! Pure grow/decay functions applied to an endpoint's stability score after
//! every probe. Growth is fast near 0 and slows towards the ceiling; decay
//! accelerates as the score rises and always drops by at least `MIN_DROP`,
//! so a failure is never a no-op while the score is positive.

/// Growth factor applied on a successful probe
pub const GAIN: f64 = 1.5;
/// Decay factor applied on a failed probe
pub const DECAY: f64 = 0.7;
/// Growth curve exponent
pub const P: f64 = 1.5;
/// Decay curve exponent
pub const Q: f64 = 1.3;
/// Minimum decrement on any failure
pub const MIN_DROP: f64 = 2.0;
/// Score ceiling
pub const MAX: f64 = 100.0;

/// Next score after a successful probe, clamped to [0, 100]
pub fn on_success(old: f64) -> f64 {
    let next = old + GAIN * (1.0 - old / MAX).powf(P);
    next.min(MAX)
}

/// Next score after a failed probe, clamped to [0, 100]
pub fn on_failure(old: f64) -> f64 {
    let next = old - (DECAY * (old / MAX).powf(Q) * old + MIN_DROP);
    next.max(0.0)
}
