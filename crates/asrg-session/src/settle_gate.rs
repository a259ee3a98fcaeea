//! Dynamic end-of-utterance detection (spec §4.4).
//!
//! Fixed trailing-silence padding either overshoots (hurting latency) or
//! undershoots (truncating the last word); this gate decides `should_flush`
//! from observed silence instead of a fixed budget.

use std::time::{Duration, Instant};

/// Configuration for [`SettleGate`]. Defaults mirror spec §4.4: 220/140/160ms.
#[derive(Debug, Clone, Copy)]
pub struct SettleGateConfig {
    /// Target time-to-end-of-utterance.
    pub target_eos_ms: u64,
    /// Observed-silence threshold that alone triggers a flush.
    pub quiet_ms: u64,
    /// VAD hangover: how long "voice stopped" reports lag actual silence.
    pub vad_hangover_ms: u64,
}

impl Default for SettleGateConfig {
    fn default() -> Self {
        Self {
            target_eos_ms: 220,
            quiet_ms: 140,
            vad_hangover_ms: 160,
        }
    }
}

/// Tracks silence/word events for one session and decides when enough quiet
/// has accumulated to finalize the current utterance.
#[derive(Debug)]
pub struct SettleGate {
    config: SettleGateConfig,
    vad_off_since: Option<Instant>,
    last_partial_ts: Option<Instant>,
    has_end_word: bool,
}

impl SettleGate {
    #[must_use]
    pub fn new(config: SettleGateConfig) -> Self {
        Self {
            config,
            vad_off_since: None,
            last_partial_ts: None,
            has_end_word: false,
        }
    }

    /// Record a partial transcript or word event at `now`.
    pub fn on_partial(&mut self, now: Instant) {
        self.last_partial_ts = Some(now);
        self.vad_off_since = None;
    }

    /// Record an explicit end-of-word marker.
    pub fn on_end_word(&mut self, now: Instant) {
        self.has_end_word = true;
        self.vad_off_since.get_or_insert(now);
    }

    /// Record that VAD reports silence at `now`, without an explicit
    /// end-of-word marker (the server-side signal source: there is no word
    /// boundary detector, only the tail-energy check).
    pub fn on_vad_off(&mut self, now: Instant) {
        self.vad_off_since.get_or_insert(now);
    }

    fn observed_silence_ms(&self, now: Instant) -> u64 {
        let since_vad_off = self
            .vad_off_since
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        let since_last_partial = self
            .last_partial_ts
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        #[allow(clippy::cast_possible_truncation)]
        since_vad_off.max(since_last_partial).as_millis() as u64
    }

    /// Whether enough silence has accumulated to finalize now.
    #[must_use]
    pub fn should_flush(&self, now: Instant) -> bool {
        let observed = self.observed_silence_ms(now);
        if observed >= self.config.quiet_ms {
            return true;
        }
        self.has_end_word && observed >= self.config.quiet_ms.div_ceil(2).max(80)
    }

    /// Poll `should_flush` at 10ms granularity until true or `max_wait` elapses.
    /// Returns `true` if the gate settled before the deadline.
    pub async fn wait_for_settle(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            let now = Instant::now();
            if self.should_flush(now) {
                return true;
            }
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Target time-to-end-of-utterance this gate was configured for.
    #[must_use]
    pub const fn target_eos(&self) -> Duration {
        Duration::from_millis(self.config.target_eos_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_gate_does_not_flush() {
        let gate = SettleGate::new(SettleGateConfig::default());
        assert!(!gate.should_flush(Instant::now()));
    }

    #[test]
    fn flushes_after_quiet_ms_of_silence() {
        let mut gate = SettleGate::new(SettleGateConfig {
            quiet_ms: 50,
            ..SettleGateConfig::default()
        });
        let t0 = Instant::now();
        gate.on_partial(t0);
        assert!(!gate.should_flush(t0 + Duration::from_millis(10)));
        assert!(gate.should_flush(t0 + Duration::from_millis(60)));
    }

    #[test]
    fn end_word_flushes_sooner_than_plain_quiet() {
        let mut gate = SettleGate::new(SettleGateConfig {
            quiet_ms: 200,
            ..SettleGateConfig::default()
        });
        let t0 = Instant::now();
        gate.on_partial(t0);
        gate.on_end_word(t0);
        // half of quiet_ms (100) exceeds the 80ms floor, so this should flush
        // well before the full 200ms quiet threshold would.
        assert!(gate.should_flush(t0 + Duration::from_millis(110)));
    }

    #[test]
    fn vad_off_alone_flushes_after_quiet_ms() {
        let mut gate = SettleGate::new(SettleGateConfig {
            quiet_ms: 50,
            ..SettleGateConfig::default()
        });
        let t0 = Instant::now();
        gate.on_vad_off(t0);
        assert!(!gate.should_flush(t0 + Duration::from_millis(10)));
        assert!(gate.should_flush(t0 + Duration::from_millis(60)));
    }

    #[tokio::test]
    async fn wait_for_settle_times_out_when_never_quiet() {
        let mut gate = SettleGate::new(SettleGateConfig {
            quiet_ms: 10_000,
            ..SettleGateConfig::default()
        });
        gate.on_partial(Instant::now());
        let settled = gate.wait_for_settle(Duration::from_millis(30)).await;
        assert!(!settled);
    }
}
