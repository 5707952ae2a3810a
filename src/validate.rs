//! Stateful pulse-id/timestamp validation for one stream.
//!
//! [`HeaderValidator`] certifies that the main headers of a stream are
//! plausible and monotonic. It has two states, no history and
//! has-last-valid, and only an accepted header advances it; a rejected
//! header never mutates the last-accepted snapshot.
//!
//! A rejection is a typed negative result, not an error: the stream goes on
//! and the caller decides policy. Warnings about rejections are rate-limited
//! per cause, but the counting contract is exact: a suppressed warning is
//! counted immediately and reported when suppression ends.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::warn;

use crate::schema::MainHeader;
use crate::types::Timestamp;

/// Why a header was rejected. Checked in this order, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Pulse-id zero is never a valid acquisition.
    ZeroPulseId,
    /// Global timestamp too far from wall clock.
    TimestampOutOfRange,
    /// Pulse-id disagrees with the timestamp's nanosecond digits or runs
    /// ahead of the simulated pulse-id (analyzer profile only).
    PulseIdTimeMismatch,
    /// Pulse-id equals the last accepted one.
    DuplicatePulseId,
    /// Pulse-id at or below the last accepted one.
    PulseIdRegression,
    /// Global timestamp equals the last accepted one (millisecond view).
    DuplicateTimestamp,
    /// Global timestamp at or below the last accepted one.
    TimestampRegression,
}

impl RejectReason {
    pub fn name(&self) -> &'static str {
        match self {
            RejectReason::ZeroPulseId => "zero_pulse_id",
            RejectReason::TimestampOutOfRange => "timestamp_out_of_range",
            RejectReason::PulseIdTimeMismatch => "pulse_id_time_mismatch",
            RejectReason::DuplicatePulseId => "duplicate_pulse_id",
            RejectReason::PulseIdRegression => "pulse_id_regression",
            RejectReason::DuplicateTimestamp => "duplicate_timestamp",
            RejectReason::TimestampRegression => "timestamp_regression",
        }
    }
}

/// Accept/reject outcome of one header check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Pulse-id/time consistency check (analyzer profile add-on).
#[derive(Debug, Clone)]
pub struct PulseTimeCheck {
    /// Epoch anchor (milliseconds) the pulse grid is counted from.
    pub anchor_ms: i64,
    /// Nominal pulse rate of the facility.
    pub pulses_per_second: u64,
    /// How far the pulse-id may run ahead of the simulated pulse-id.
    pub max_pulses_ahead: u64,
}

impl Default for PulseTimeCheck {
    fn default() -> Self {
        Self { anchor_ms: 0, pulses_per_second: 100, max_pulses_ahead: 1000 }
    }
}

impl PulseTimeCheck {
    /// Pulse-id the grid would have reached at `now`.
    fn simulated_pulse_id(&self, now: Timestamp) -> u64 {
        let elapsed_ms = (now.millis() - self.anchor_ms).max(0) as u64;
        elapsed_ms * self.pulses_per_second / 1000
    }
}

/// Named policy profile of the validator.
///
/// The analyzer profile tolerates past skew (logged, not rejected) with a
/// wide wall-clock window; the strict profile rejects skew in both
/// directions with a narrow window. Both are the same component with
/// different data.
#[derive(Debug, Clone)]
pub struct ValidatorPolicy {
    pub name: &'static str,
    /// How far ahead of wall clock a header may claim to be.
    pub max_future_skew: Duration,
    /// Whether past skew beyond the window rejects (strict) or only logs.
    pub reject_past_skew: bool,
    /// Optional pulse-id/time consistency check.
    pub pulse_time_check: Option<PulseTimeCheck>,
}

impl ValidatorPolicy {
    /// Analyzer profile: 10-minute window, past skew logged but accepted.
    pub fn analyzer() -> Self {
        Self {
            name: "analyzer",
            max_future_skew: Duration::from_secs(600),
            reject_past_skew: false,
            pulse_time_check: None,
        }
    }

    /// Strict profile: 10-second window, both skew directions reject.
    pub fn strict() -> Self {
        Self {
            name: "strict",
            max_future_skew: Duration::from_secs(10),
            reject_past_skew: true,
            pulse_time_check: None,
        }
    }

    /// Enable the pulse-id/time consistency check.
    pub fn with_pulse_time_check(mut self, check: PulseTimeCheck) -> Self {
        self.pulse_time_check = Some(check);
        self
    }
}

/// Aggregate counters over every header submitted to one validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorStats {
    /// Headers submitted.
    pub messages: u64,
    /// Headers accepted.
    pub accepted: u64,
    pub zero_pulse_id: u64,
    /// Duplicate pulse-ids and duplicate timestamps.
    pub duplicates: u64,
    /// Wall-clock window and pulse-id/time violations.
    pub out_of_range: u64,
    /// Pulse-id and timestamp regressions.
    pub out_of_order: u64,
}

/// Optional distributions kept alongside the counters.
#[derive(Debug, Clone, Default)]
pub struct Histograms {
    /// Pulse-id increment between consecutive accepted headers.
    pub pulse_increments: BTreeMap<u64, u64>,
    /// Arrival delay (now − header time, ms) bucketed by powers of two.
    pub arrival_delay_ms: BTreeMap<i64, u64>,
}

impl Histograms {
    fn record_increment(&mut self, increment: u64) {
        *self.pulse_increments.entry(increment).or_insert(0) += 1;
    }

    fn record_delay(&mut self, delay_ms: i64) {
        let bucket = if delay_ms <= 0 { 0 } else { (delay_ms as u64).next_power_of_two() as i64 };
        *self.arrival_delay_ms.entry(bucket).or_insert(0) += 1;
    }
}

/// Per-cause warning rate limiter.
///
/// A suppressed warning is still counted the moment it happens; only the log
/// line is deferred. When the interval elapses, the next warning for the
/// same cause reports how many were suppressed since the last line.
#[derive(Debug)]
struct WarnLimiter {
    min_interval: Duration,
    causes: HashMap<&'static str, CauseState>,
}

#[derive(Debug, Default)]
struct CauseState {
    last_emitted_ms: Option<i64>,
    suppressed: u64,
}

impl WarnLimiter {
    fn new(min_interval: Duration) -> Self {
        Self { min_interval, causes: HashMap::new() }
    }

    /// Returns `Some(previously_suppressed)` when a line should be emitted.
    fn should_emit(&mut self, cause: &'static str, now: Timestamp) -> Option<u64> {
        let state = self.causes.entry(cause).or_default();
        let now_ms = now.millis();
        match state.last_emitted_ms {
            Some(last) if now_ms - last < self.min_interval.as_millis() as i64 => {
                state.suppressed += 1;
                None
            }
            _ => {
                state.last_emitted_ms = Some(now_ms);
                Some(std::mem::take(&mut state.suppressed))
            }
        }
    }

    fn suppressed(&self, cause: &'static str) -> u64 {
        self.causes.get(cause).map(|s| s.suppressed).unwrap_or(0)
    }

    fn clear(&mut self) {
        self.causes.clear();
    }
}

/// Stateful per-stream checker of pulse-id/timestamp sequences.
pub struct HeaderValidator {
    policy: ValidatorPolicy,
    last: Option<MainHeader>,
    stats: ValidatorStats,
    histograms: Option<Histograms>,
    limiter: WarnLimiter,
}

impl HeaderValidator {
    /// Create a validator with the given policy profile; warnings for one
    /// cause are emitted at most once per ten seconds by default.
    pub fn new(policy: ValidatorPolicy) -> Self {
        Self::with_warn_interval(policy, Duration::from_secs(10))
    }

    /// Create a validator with a custom warning rate-limit interval.
    pub fn with_warn_interval(policy: ValidatorPolicy, warn_interval: Duration) -> Self {
        Self {
            policy,
            last: None,
            stats: ValidatorStats::default(),
            histograms: None,
            limiter: WarnLimiter::new(warn_interval),
        }
    }

    /// Turn on increment/delay histograms.
    pub fn with_histograms(mut self) -> Self {
        self.histograms = Some(Histograms::default());
        self
    }

    /// Check one header against wall-clock now.
    pub fn check(&mut self, header: &MainHeader) -> Verdict {
        self.check_at(header, Timestamp::now())
    }

    /// Check one header against an explicit "now" (test seam; `check` is the
    /// production entry point).
    pub fn check_at(&mut self, header: &MainHeader, now: Timestamp) -> Verdict {
        self.stats.messages += 1;
        match self.evaluate(header, now) {
            None => {
                self.accept(header, now);
                Verdict::Accepted
            }
            Some(reason) => {
                self.count_rejection(reason);
                self.warn_rejection(header, reason, now);
                Verdict::Rejected(reason)
            }
        }
    }

    /// Run the fixed-order rejection checks; `None` means accept.
    fn evaluate(&mut self, header: &MainHeader, now: Timestamp) -> Option<RejectReason> {
        if header.pulse_id == 0 {
            return Some(RejectReason::ZeroPulseId);
        }

        let skew_ms = header.global_timestamp.millis_since(now);
        let window_ms = self.policy.max_future_skew.as_millis() as i64;
        if skew_ms > window_ms {
            return Some(RejectReason::TimestampOutOfRange);
        }
        if -skew_ms > window_ms {
            if self.policy.reject_past_skew {
                return Some(RejectReason::TimestampOutOfRange);
            }
            // Analyzer profile: past skew is suspicious but tolerated.
            if let Some(suppressed) = self.limiter.should_emit("past_skew", now) {
                warn!(
                    pulse_id = header.pulse_id,
                    skew_ms = -skew_ms,
                    suppressed,
                    "header timestamp far in the past, accepting anyway"
                );
            }
        }

        if let Some(check) = &self.policy.pulse_time_check {
            if header.pulse_id % 1_000_000 != header.global_timestamp.subms_nanos() as u64 {
                return Some(RejectReason::PulseIdTimeMismatch);
            }
            let simulated = check.simulated_pulse_id(now);
            if header.pulse_id > simulated + check.max_pulses_ahead {
                return Some(RejectReason::PulseIdTimeMismatch);
            }
        }

        let Some(last) = &self.last else {
            return None;
        };

        if header.pulse_id == last.pulse_id {
            return Some(RejectReason::DuplicatePulseId);
        }
        if header.pulse_id <= last.pulse_id {
            return Some(RejectReason::PulseIdRegression);
        }
        if header.global_timestamp.millis() == last.global_timestamp.millis() {
            return Some(RejectReason::DuplicateTimestamp);
        }
        if header.global_timestamp.millis() <= last.global_timestamp.millis() {
            return Some(RejectReason::TimestampRegression);
        }
        None
    }

    fn accept(&mut self, header: &MainHeader, now: Timestamp) {
        if let Some(histograms) = &mut self.histograms {
            if let Some(last) = &self.last {
                histograms.record_increment(header.pulse_id - last.pulse_id);
            }
            histograms.record_delay(now.millis_since(header.global_timestamp));
        }
        self.stats.accepted += 1;
        self.last = Some(header.clone());
    }

    fn count_rejection(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::ZeroPulseId => self.stats.zero_pulse_id += 1,
            RejectReason::TimestampOutOfRange | RejectReason::PulseIdTimeMismatch => {
                self.stats.out_of_range += 1
            }
            RejectReason::DuplicatePulseId | RejectReason::DuplicateTimestamp => {
                self.stats.duplicates += 1
            }
            RejectReason::PulseIdRegression | RejectReason::TimestampRegression => {
                self.stats.out_of_order += 1
            }
        }
    }

    fn warn_rejection(&mut self, header: &MainHeader, reason: RejectReason, now: Timestamp) {
        if let Some(suppressed) = self.limiter.should_emit(reason.name(), now) {
            warn!(
                policy = self.policy.name,
                pulse_id = header.pulse_id,
                reason = reason.name(),
                suppressed,
                "header rejected"
            );
        }
    }

    /// Last accepted header, if any.
    pub fn last_accepted(&self) -> Option<&MainHeader> {
        self.last.as_ref()
    }

    /// Snapshot of the aggregate counters.
    pub fn stats(&self) -> ValidatorStats {
        self.stats
    }

    /// The histograms, if enabled.
    pub fn histograms(&self) -> Option<&Histograms> {
        self.histograms.as_ref()
    }

    /// Warnings currently deferred for one cause (exact, never lossy).
    pub fn suppressed_warnings(&self, cause: &'static str) -> u64 {
        self.limiter.suppressed(cause)
    }

    /// Clear last-accepted state and all counters.
    ///
    /// Returns whether a last-accepted header actually existed to clear;
    /// `false` means the reset was a no-op on the state machine.
    pub fn reset(&mut self) -> bool {
        let had_state = self.last.take().is_some();
        self.stats = ValidatorStats::default();
        if let Some(histograms) = &mut self.histograms {
            *histograms = Histograms::default();
        }
        self.limiter.clear();
        had_state
    }
}
