// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnection backoff schedule.

use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based).
///
/// Doubles per attempt starting at `base`, capped at `cap`:
/// `min(base * 2^(attempt-1), cap)`.
pub fn reconnect_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(5_000);
    const CAP: Duration = Duration::from_millis(30_000);

    #[test]
    fn doubles_per_attempt() {
        assert_eq!(reconnect_delay(1, BASE, CAP), Duration::from_secs(5));
        assert_eq!(reconnect_delay(2, BASE, CAP), Duration::from_secs(10));
        assert_eq!(reconnect_delay(3, BASE, CAP), Duration::from_secs(20));
    }

    #[test]
    fn caps_at_maximum() {
        assert_eq!(reconnect_delay(4, BASE, CAP), Duration::from_secs(30));
        assert_eq!(reconnect_delay(10, BASE, CAP), Duration::from_secs(30));
        assert_eq!(reconnect_delay(u32::MAX, BASE, CAP), Duration::from_secs(30));
    }

    #[test]
    fn attempt_zero_behaves_like_first() {
        assert_eq!(reconnect_delay(0, BASE, CAP), Duration::from_secs(5));
    }
}
