use std::time::Duration;

/// Convert a `logMessageInterval` value (a signed power-of-two exponent, in
/// seconds) to the `Duration` it encodes. `interval = 2^log_interval`
/// seconds.
pub fn log_interval_to_duration(log_interval: i8) -> Duration {
    if log_interval >= 0 {
        Duration::from_secs(1u64 << log_interval.min(32) as u32)
    } else {
        let shift = (-log_interval) as u32;
        let nanos = 1_000_000_000u64 >> shift.min(30);
        Duration::from_nanos(nanos.max(1))
    }
}

/// Convert a `Duration` to the nearest representable `logMessageInterval`.
/// Inverse of [`log_interval_to_duration`] on the powers-of-two it
/// produces; for arbitrary durations this rounds to the nearest power of
/// two, which is the bijection's supported range (IEEE 1588-2019 allows
/// only log-interval cadences on unicast grants).
pub fn duration_to_log_interval(d: Duration) -> i8 {
    let nanos = d.as_nanos().max(1) as f64;
    let log2 = (nanos / 1_000_000_000.0).log2();
    log2.round().clamp(-30.0, 30.0) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bijection_on_powers_of_two() {
        for exp in -10i8..=10 {
            let d = log_interval_to_duration(exp);
            assert_eq!(duration_to_log_interval(d), exp, "exp={exp} d={d:?}");
        }
    }

    #[test]
    fn one_second_is_zero() {
        assert_eq!(duration_to_log_interval(Duration::from_secs(1)), 0);
        assert_eq!(log_interval_to_duration(0), Duration::from_secs(1));
    }

    #[test]
    fn sub_second_negative_exponents() {
        assert_eq!(duration_to_log_interval(Duration::from_millis(125)), -3);
        assert_eq!(log_interval_to_duration(-3), Duration::from_millis(125));
    }
}
