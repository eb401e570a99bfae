//! GPS timestamp simulation.
//!
//! The station electronics only timestamps an event once a two-fold
//! coincidence is seen, so the stored trigger time is the second-smallest
//! valid per-detector arrival time — deliberately not the minimum, for any
//! number of valid signals. The resulting nanosecond count folds in the
//! station's fixed GPS offset and a per-event receiver uncertainty, and is
//! split into whole-second and sub-second fields.

use crate::response::DetectorObservables;

/// A quantized external timestamp for one station event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsTimestamp {
    /// Full nanosecond timestamp.
    pub ext_timestamp: u64,
    /// Whole seconds.
    pub timestamp: u64,
    /// Sub-second remainder in ns.
    pub nanoseconds: u32,
}

impl GpsTimestamp {
    fn from_ext(ext_timestamp: u64) -> Self {
        Self {
            ext_timestamp,
            timestamp: ext_timestamp / 1_000_000_000,
            nanoseconds: (ext_timestamp % 1_000_000_000) as u32,
        }
    }
}

/// The station trigger time: second-smallest arrival time over detectors
/// that saw signal. `None` with fewer than two valid times — such a
/// station cannot be timestamped and counts as non-firing, whatever the
/// pulse-height trigger said.
pub fn trigger_time(detectors: &[DetectorObservables]) -> Option<f64> {
    let mut times: Vec<f64> = detectors
        .iter()
        .filter(|d| d.has_signal())
        .map(|d| d.t)
        .collect();
    if times.len() < 2 {
        return None;
    }
    times.sort_by(f64::total_cmp);
    Some(times[1])
}

/// Produce the quantized external timestamp for a firing station.
///
/// # Arguments
/// * `detectors` - per-detector observables of the station
/// * `nominal_ns` - the shower's nominal nanosecond timestamp
/// * `gps_offset` - the station's fixed per-run GPS offset (ns)
/// * `uncertainty` - freshly drawn per-event receiver uncertainty (ns)
pub fn simulate_gps(
    detectors: &[DetectorObservables],
    nominal_ns: u64,
    gps_offset: f64,
    uncertainty: f64,
) -> Option<(GpsTimestamp, f64)> {
    let trigger = trigger_time(detectors)?;
    // integer truncation of the summed correction, as the electronics does
    let correction = (trigger + gps_offset + uncertainty) as i64;
    let ext = nominal_ns as i64 + correction;
    Some((GpsTimestamp::from_ext(ext.max(0) as u64), trigger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::NO_SIGNAL_TIME;

    fn detector(n: f64, t: f64) -> DetectorObservables {
        let mut observables = DetectorObservables::no_signal();
        observables.n = n;
        observables.t = t;
        observables
    }

    #[test]
    fn test_second_smallest_not_minimum() {
        // last detector has no signal, so its time is not valid
        let detectors = vec![
            detector(1.0, 5.0),
            detector(1.0, 3.0),
            detector(2.0, 9.0),
            detector(0.0, NO_SIGNAL_TIME),
        ];
        assert_eq!(trigger_time(&detectors), Some(5.0));
    }

    #[test]
    fn test_fewer_than_two_valid() {
        let detectors = vec![detector(1.0, 5.0), detector(0.0, NO_SIGNAL_TIME)];
        assert_eq!(trigger_time(&detectors), None);
        assert!(simulate_gps(&detectors, 0, 0.0, 0.0).is_none());
    }

    #[test]
    fn test_two_detectors_use_later_time() {
        let detectors = vec![detector(1.0, 10.0), detector(1.0, 12.0)];
        assert_eq!(trigger_time(&detectors), Some(12.0));
    }

    #[test]
    fn test_timestamp_split() {
        let detectors = vec![detector(1.0, 10.0), detector(1.0, 12.0)];
        let nominal = 1_600_000_000 * 1_000_000_000u64;
        let (stamp, trigger) = simulate_gps(&detectors, nominal, 3.6, 0.0).unwrap();
        assert_eq!(trigger, 12.0);
        // 12 + 3.6 truncates to 15 ns past the nominal second
        assert_eq!(stamp.ext_timestamp, nominal + 15);
        assert_eq!(stamp.timestamp, 1_600_000_000);
        assert_eq!(stamp.nanoseconds, 15);
    }

    #[test]
    fn test_offsets_shift_timestamp() {
        let detectors = vec![detector(1.0, 0.0), detector(1.0, 2.0)];
        let (base, _) = simulate_gps(&detectors, 1_000_000_000, 0.0, 0.0).unwrap();
        let (shifted, _) = simulate_gps(&detectors, 1_000_000_000, 100.0, 0.0).unwrap();
        assert_eq!(shifted.ext_timestamp - base.ext_timestamp, 100);
    }
}
