//! Dual-resolution timestamp value type.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const NANOS_PER_SEC: i64 = 1_000_000_000;
pub(crate) const NANOS_PER_MILLI: i64 = 1_000_000;

/// A point in time with sub-millisecond precision.
///
/// Stored as epoch seconds plus a nanosecond offset in `0..1_000_000_000`.
/// On the wire the main header carries the millisecond view split into a
/// millisecond epoch and the nanosecond remainder within that millisecond;
/// [`Timestamp`]'s serde impl performs that split losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    sec: i64,
    ns: i64,
}

impl Timestamp {
    /// Create a timestamp from epoch seconds and a nanosecond offset.
    ///
    /// The offset is normalized into `0..1_000_000_000`, carrying whole
    /// seconds over into `sec`.
    pub fn new(sec: i64, ns: i64) -> Self {
        let (mut sec, mut ns) = (sec, ns);
        sec += ns.div_euclid(NANOS_PER_SEC);
        ns = ns.rem_euclid(NANOS_PER_SEC);
        Self { sec, ns }
    }

    /// Create a timestamp from a millisecond epoch.
    pub fn from_millis(ms: i64) -> Self {
        Self::new(ms.div_euclid(1000), ms.rem_euclid(1000) * NANOS_PER_MILLI)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, d.subsec_nanos() as i64),
            // Pre-epoch clocks only occur on badly configured hosts; represent
            // them as negative seconds rather than panicking.
            Err(e) => {
                let d = e.duration();
                Self::new(-(d.as_secs() as i64), -(d.subsec_nanos() as i64))
            }
        }
    }

    /// Epoch seconds.
    pub fn sec(&self) -> i64 {
        self.sec
    }

    /// Nanosecond offset within the second, `0..1_000_000_000`.
    pub fn nanos(&self) -> i64 {
        self.ns
    }

    /// Millisecond view: `sec * 1000 + ns / 1e6`.
    pub fn millis(&self) -> i64 {
        self.sec * 1000 + self.ns / NANOS_PER_MILLI
    }

    /// Nanosecond remainder within the current millisecond, `0..1_000_000`.
    ///
    /// This is the `ns` field of the wire representation, and the field whose
    /// low digits the validator compares against the pulse-id.
    pub fn subms_nanos(&self) -> i64 {
        self.ns % NANOS_PER_MILLI
    }

    /// Signed distance `self - other` in milliseconds.
    pub fn millis_since(&self, other: Timestamp) -> i64 {
        self.millis() - other.millis()
    }
}

/// Wire shape of a timestamp: millisecond epoch + nanosecond remainder.
#[derive(Serialize, Deserialize)]
struct WireTimestamp {
    ms: i64,
    ns: i64,
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireTimestamp { ms: self.millis(), ns: self.subms_nanos() }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireTimestamp::deserialize(deserializer)?;
        Ok(Timestamp::new(
            wire.ms.div_euclid(1000),
            wire.ms.rem_euclid(1000) * NANOS_PER_MILLI + wire.ns,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalization_keeps_nanos_in_range(sec in -1_000_000i64..4_000_000_000, ns in -10 * NANOS_PER_SEC..10 * NANOS_PER_SEC) {
            let ts = Timestamp::new(sec, ns);
            prop_assert!((0..NANOS_PER_SEC).contains(&ts.nanos()));
            prop_assert_eq!(ts.sec() * NANOS_PER_SEC + ts.nanos(), sec * NANOS_PER_SEC + ns);
        }

        #[test]
        fn wire_roundtrip_is_lossless(sec in 0i64..4_000_000_000, ns in 0i64..NANOS_PER_SEC) {
            let ts = Timestamp::new(sec, ns);
            let json = serde_json::to_string(&ts).unwrap();
            let back: Timestamp = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, ts);
        }

        #[test]
        fn ordering_follows_total_nanoseconds(
            a_sec in 0i64..10_000, a_ns in 0i64..NANOS_PER_SEC,
            b_sec in 0i64..10_000, b_ns in 0i64..NANOS_PER_SEC,
        ) {
            let a = Timestamp::new(a_sec, a_ns);
            let b = Timestamp::new(b_sec, b_ns);
            let a_total = a_sec * NANOS_PER_SEC + a_ns;
            let b_total = b_sec * NANOS_PER_SEC + b_ns;
            prop_assert_eq!(a.cmp(&b), a_total.cmp(&b_total));
        }
    }

    #[test]
    fn millisecond_view() {
        let ts = Timestamp::new(12, 345_678_901);
        assert_eq!(ts.millis(), 12_345);
        assert_eq!(ts.subms_nanos(), 678_901);
    }

    #[test]
    fn from_millis_preserves_millisecond_view() {
        let ts = Timestamp::from_millis(1_700_000_000_123);
        assert_eq!(ts.millis(), 1_700_000_000_123);
        assert_eq!(ts.subms_nanos(), 0);
    }

    #[test]
    fn wire_shape_splits_milliseconds_and_remainder() {
        let ts = Timestamp::new(1, 500_123_456);
        let json: serde_json::Value = serde_json::to_value(ts).unwrap();
        assert_eq!(json["ms"], 1500);
        assert_eq!(json["ns"], 123_456);
    }
}
