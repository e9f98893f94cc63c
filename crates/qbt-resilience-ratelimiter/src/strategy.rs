//! Per-strategy admission math.
//!
//! Every function here is pure with respect to time: callers pass `now` in,
//! and state is refreshed lazily on each call.

use crate::config::{RateLimiterConfig, Strategy};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

// absorbs float drift in refill arithmetic
const EPSILON: f64 = 1e-9;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The tokens were granted.
    Admitted,
    /// The tokens were not granted.
    ///
    /// `wait_hint` estimates how long until the same request could succeed.
    /// `None` means it never can: the request is larger than the capacity, or
    /// nothing ever replenishes the limiter.
    Denied { wait_hint: Option<Duration> },
}

impl Admission {
    /// True for [`Admission::Admitted`].
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    /// The wait hint of a denial.
    pub fn wait_hint(&self) -> Option<Duration> {
        match self {
            Admission::Admitted => None,
            Admission::Denied { wait_hint } => *wait_hint,
        }
    }
}

pub(crate) enum Bucket {
    Token {
        tokens: f64,
        last_refill: Instant,
    },
    Leaky {
        level: f64,
        last_leak: Instant,
    },
    Fixed {
        origin: Instant,
        window_start: Instant,
        count: f64,
    },
    Sliding {
        entries: VecDeque<(Instant, f64)>,
        total: f64,
    },
}

impl Bucket {
    pub(crate) fn new(config: &RateLimiterConfig, now: Instant) -> Self {
        match config.strategy {
            Strategy::TokenBucket => Bucket::Token {
                tokens: config.capacity,
                last_refill: now,
            },
            Strategy::LeakyBucket => Bucket::Leaky {
                level: 0.0,
                last_leak: now,
            },
            Strategy::FixedWindow => Bucket::Fixed {
                origin: now,
                window_start: now,
                count: 0.0,
            },
            Strategy::SlidingWindow => Bucket::Sliding {
                entries: VecDeque::new(),
                total: 0.0,
            },
        }
    }

    /// Brings the state up to `now`: refill, leak, roll or prune.
    fn refresh(&mut self, config: &RateLimiterConfig, now: Instant) {
        match self {
            Bucket::Token {
                tokens,
                last_refill,
            } => {
                let elapsed = now.saturating_duration_since(*last_refill).as_secs_f64();
                *tokens = (*tokens + elapsed * config.rate).min(config.capacity);
                *last_refill = now.max(*last_refill);
            }
            Bucket::Leaky { level, last_leak } => {
                let elapsed = now.saturating_duration_since(*last_leak).as_secs_f64();
                *level = (*level - elapsed * config.rate).max(0.0);
                *last_leak = now.max(*last_leak);
            }
            Bucket::Fixed {
                origin,
                window_start,
                count,
            } => {
                if config.window.is_zero() {
                    return;
                }
                if now.saturating_duration_since(*window_start) >= config.window {
                    let since_origin = now.saturating_duration_since(*origin).as_nanos();
                    let windows = since_origin / config.window.as_nanos();
                    let offset = config.window.as_nanos() * windows;
                    *window_start = *origin + nanos(offset);
                    *count = 0.0;
                }
            }
            Bucket::Sliding { entries, total } => {
                // an entry exactly `window` old still counts
                while let Some(&(at, weight)) = entries.front() {
                    if now.saturating_duration_since(at) > config.window {
                        entries.pop_front();
                        *total -= weight;
                    } else {
                        break;
                    }
                }
                if entries.is_empty() {
                    *total = 0.0;
                }
            }
        }
    }

    /// Checks and, on success, consumes `requested` tokens.
    pub(crate) fn try_acquire(
        &mut self,
        config: &RateLimiterConfig,
        requested: f64,
        now: Instant,
    ) -> Admission {
        let requested = requested.max(0.0);
        if config.capacity <= 0.0 || requested > config.capacity + EPSILON {
            return Admission::Denied { wait_hint: None };
        }
        self.refresh(config, now);

        match self {
            Bucket::Token { tokens, .. } => {
                if *tokens + EPSILON >= requested {
                    *tokens = (*tokens - requested).max(0.0);
                    Admission::Admitted
                } else {
                    Admission::Denied {
                        wait_hint: per_rate(requested - *tokens, config.rate),
                    }
                }
            }
            Bucket::Leaky { level, .. } => {
                if *level + requested <= config.capacity + EPSILON {
                    *level = (*level + requested).min(config.capacity);
                    Admission::Admitted
                } else {
                    Admission::Denied {
                        wait_hint: per_rate(*level + requested - config.capacity, config.rate),
                    }
                }
            }
            Bucket::Fixed {
                window_start,
                count,
                ..
            } => {
                if *count < config.capacity && *count + requested <= config.capacity + EPSILON {
                    *count += requested;
                    Admission::Admitted
                } else if config.window.is_zero() {
                    Admission::Denied { wait_hint: None }
                } else {
                    let next = *window_start + config.window;
                    Admission::Denied {
                        wait_hint: Some(next.saturating_duration_since(now)),
                    }
                }
            }
            Bucket::Sliding { entries, total } => {
                if *total < config.capacity && *total + requested <= config.capacity + EPSILON {
                    if requested > 0.0 {
                        entries.push_back((now, requested));
                        *total += requested;
                    }
                    Admission::Admitted
                } else {
                    // walk from the oldest entry until enough weight ages out
                    let mut remaining = *total;
                    let mut hint = None;
                    for &(at, weight) in entries.iter() {
                        remaining -= weight;
                        if remaining + requested <= config.capacity + EPSILON {
                            let expiry = at + config.window + Duration::from_nanos(1);
                            hint = Some(expiry.saturating_duration_since(now));
                            break;
                        }
                    }
                    Admission::Denied { wait_hint: hint }
                }
            }
        }
    }

    /// Tokens that could be granted right now.
    pub(crate) fn available(&mut self, config: &RateLimiterConfig, now: Instant) -> f64 {
        self.refresh(config, now);
        let available = match self {
            Bucket::Token { tokens, .. } => *tokens,
            Bucket::Leaky { level, .. } => config.capacity - *level,
            Bucket::Fixed { count, .. } => config.capacity - *count,
            Bucket::Sliding { total, .. } => config.capacity - *total,
        };
        available.clamp(0.0, config.capacity)
    }
}

fn per_rate(deficit: f64, rate: f64) -> Option<Duration> {
    if rate <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64((deficit / rate).max(0.0)).ok()
}

fn nanos(n: u128) -> Duration {
    let secs = (n / 1_000_000_000) as u64;
    let sub = (n % 1_000_000_000) as u32;
    Duration::new(secs, sub)
}
