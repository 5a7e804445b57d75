//! Wall-clock timestamps derived from `Instant`.
//!
//! All external time enters the crate as `Instant`, but nonce derivation
//! wants a unix-epoch timestamp, which `Instant` cannot express. The two
//! clocks are pinned together once, on first use; later instants are
//! translated relative to that anchor.

use std::time::{Duration, Instant, SystemTime};

use once_cell::sync::Lazy;

static ANCHOR: Lazy<(Instant, SystemTime)> = Lazy::new(|| (Instant::now(), SystemTime::now()));

/// Unix-epoch timestamp for `now`.
///
/// Instants from before the anchor was pinned collapse onto the anchor
/// itself. The nonce sequence counter covers uniqueness, not the clock, so
/// a small translation error is acceptable.
pub fn unix_timestamp(now: Instant) -> Duration {
    let (instant_anchor, system_anchor) = *ANCHOR;
    let since_anchor = now.saturating_duration_since(instant_anchor);

    (system_anchor + since_anchor)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_instants_give_later_timestamps() {
        let a = Instant::now();
        let b = a + Duration::from_millis(5);

        assert!(unix_timestamp(b) > unix_timestamp(a));
    }

    #[test]
    fn timestamps_are_contemporary() {
        // Within a year of the system clock, not stuck at the epoch.
        let wall = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap();
        let translated = unix_timestamp(Instant::now());

        let drift = if translated > wall {
            translated - wall
        } else {
            wall - translated
        };
        assert!(drift < Duration::from_secs(86400));
    }
}
