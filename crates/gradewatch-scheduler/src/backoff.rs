//! Backoff and jitter arithmetic.

use std::time::Duration;

use rand::Rng;

/// Delay before retry `attempt` (1-based): base doubled per attempt,
/// capped. base=5s, cap=300s gives 5, 10, 20, 40 ... 300.
pub fn delay_for_attempt(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(32);
    let delay = base.saturating_mul(1u32 << exp.min(31));
    delay.min(cap)
}

/// Shift an inter-cycle wait by a uniform ± jitter, never below zero.
/// Spreads targets sharing an interval so they stop firing in lockstep.
pub fn jittered(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    let j = jitter.as_millis() as i64;
    let shift = rand::thread_rng().gen_range(-j..=j);
    if shift >= 0 {
        interval + Duration::from_millis(shift as u64)
    } else {
        interval.saturating_sub(Duration::from_millis((-shift) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_with_cap() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(300);
        assert_eq!(delay_for_attempt(1, base, cap), Duration::from_secs(5));
        assert_eq!(delay_for_attempt(2, base, cap), Duration::from_secs(10));
        assert_eq!(delay_for_attempt(3, base, cap), Duration::from_secs(20));
        assert_eq!(delay_for_attempt(7, base, cap), Duration::from_secs(300));
        assert_eq!(delay_for_attempt(100, base, cap), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let i = Duration::from_secs(3600);
        assert_eq!(jittered(i, Duration::ZERO), i);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let i = Duration::from_secs(100);
        let j = Duration::from_secs(30);
        for _ in 0..200 {
            let w = jittered(i, j);
            assert!(w >= Duration::from_secs(70) && w <= Duration::from_secs(130));
        }
    }

    #[test]
    fn test_jitter_never_underflows() {
        let w = jittered(Duration::from_secs(1), Duration::from_secs(30));
        assert!(w <= Duration::from_secs(31));
    }
}
