//! Round-trip freshness measurements.
//!
//! Wall-clock samples bracket network wait vs. local computation during the
//! key-authentication phase. The only consumer is the burst guard: a reply
//! arriving outside the measured budget is treated as a possible replay and
//! forces a restart.

use std::time::{Duration, Instant};

/// Upper bound for a processing hint accepted off the wire.
const MAX_HINT_SECS: f64 = 3600.0;

/// Timing markers for one handshake round trip.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundTrip {
    network_started: Option<Instant>,
    processing_started: Option<Instant>,
    round_started: Option<Instant>,
    network: Duration,
    processing: Duration,
}

impl RoundTrip {
    /// Start measuring network wait.
    pub fn start_network(&mut self, now: Instant) {
        self.network_started = Some(now);
    }

    /// Stop the network measurement, subtracting the peer's reported
    /// processing overhead from the elapsed wait.
    pub fn stop_network(&mut self, now: Instant, peer_processing: Duration) {
        let Some(started) = self.network_started.take() else {
            return;
        };
        self.network = now
            .saturating_duration_since(started)
            .saturating_sub(peer_processing);
    }

    /// Start measuring local computation.
    pub fn start_processing(&mut self, now: Instant) {
        self.processing_started = Some(now);
    }

    /// Stop the local computation measurement.
    pub fn stop_processing(&mut self, now: Instant) {
        let Some(started) = self.processing_started.take() else {
            return;
        };
        self.processing = now.saturating_duration_since(started);
    }

    /// Our own processing time, reported to the peer as a hint.
    pub fn processing(&self) -> Duration {
        self.processing
    }

    /// Mark the start of a full round trip (message sent, reply awaited).
    pub fn start_round(&mut self, now: Instant) {
        self.round_started = Some(now);
    }

    /// Elapsed time since the round started.
    pub fn round_elapsed(&self, now: Instant) -> Duration {
        match self.round_started {
            Some(started) => now.saturating_duration_since(started),
            None => Duration::ZERO,
        }
    }

    /// The budget a reply must arrive within: measured network plus
    /// processing time, widened by the slack fraction.
    pub fn limit(&self, slack: f64) -> Duration {
        let base = self.network + self.processing;
        base.mul_f64(1.0 + slack.max(0.0))
    }

    pub fn reset(&mut self) {
        *self = RoundTrip::default();
    }
}

/// Decode a processing hint from the wire, discarding nonsense values.
pub fn hint_to_duration(hint: f64) -> Duration {
    if hint.is_finite() && (0.0..=MAX_HINT_SECS).contains(&hint) {
        Duration::from_secs_f64(hint)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_includes_slack() {
        let base = Instant::now();
        let mut rt = RoundTrip::default();

        rt.start_network(base);
        rt.stop_network(base + Duration::from_millis(100), Duration::ZERO);
        rt.start_processing(base + Duration::from_millis(100));
        rt.stop_processing(base + Duration::from_millis(200));

        // (100ms + 100ms) * 1.1
        assert_eq!(rt.limit(0.1), Duration::from_millis(220));
    }

    #[test]
    fn network_wait_is_rectified_by_peer_hint() {
        let base = Instant::now();
        let mut rt = RoundTrip::default();

        rt.start_network(base);
        rt.stop_network(base + Duration::from_millis(100), Duration::from_millis(30));

        assert_eq!(rt.limit(0.0), Duration::from_millis(70));
    }

    #[test]
    fn round_elapsed_without_start_is_zero() {
        let rt = RoundTrip::default();
        assert_eq!(rt.round_elapsed(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn hints_are_sanitized() {
        assert_eq!(hint_to_duration(0.5), Duration::from_millis(500));
        assert_eq!(hint_to_duration(-1.0), Duration::ZERO);
        assert_eq!(hint_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(hint_to_duration(f64::INFINITY), Duration::ZERO);
    }
}
