//! Server timestamp conversion.
//!
//! The storage service speaks decimal seconds since the epoch (e.g.
//! `1329735600.42`); clients keep milliseconds internally so timestamp
//! arithmetic stays integral.

/// Converts milliseconds to wire decimal seconds.
#[must_use]
pub fn millis_to_decimal_seconds(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

/// Converts wire decimal seconds to milliseconds, rounding to the nearest
/// millisecond.
#[must_use]
pub fn decimal_seconds_to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Serde adapter for `modified`-style fields: `i64` milliseconds in memory,
/// decimal seconds on the wire.
pub mod decimal_seconds {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes milliseconds as decimal seconds.
    pub fn serialize<S: Serializer>(millis: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(super::millis_to_decimal_seconds(*millis))
    }

    /// Deserializes decimal seconds into milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Ok(super::decimal_seconds_to_millis(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_roundtrip() {
        assert_eq!(decimal_seconds_to_millis(1329735600.42), 1329735600420);
        assert_eq!(millis_to_decimal_seconds(1329735600420), 1329735600.42);
        assert_eq!(decimal_seconds_to_millis(0.0), 0);
    }

    #[test]
    fn rounding_is_nearest() {
        // 0.0015 s is 1.5 ms; rounds up.
        assert_eq!(decimal_seconds_to_millis(0.0015), 2);
        assert_eq!(decimal_seconds_to_millis(0.0014), 1);
    }
}
