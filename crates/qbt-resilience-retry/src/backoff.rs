use rand::Rng;
use std::time::Duration;

/// `min(max, base * factor^(attempt - 1))` for a 1-based attempt number.
pub(crate) fn exponential(base: Duration, factor: f64, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = base.as_secs_f64() * factor.powi(exponent);
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(max)
}

/// Spreads `delay` uniformly over `delay * (1 ± fraction)`, clamped at zero.
pub(crate) fn jitter(delay: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 || delay.is_zero() {
        return delay;
    }
    let secs = delay.as_secs_f64();
    let spread = secs * fraction;
    let jittered = rand::rng().random_range((secs - spread)..=(secs + spread));
    Duration::try_from_secs_f64(jittered.max(0.0)).unwrap_or(delay)
}
