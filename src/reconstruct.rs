//! Shower direction reconstruction from detector arrival times.
//!
//! A plane shower front crossing three non-collinear detectors determines
//! the arrival direction: the two pairwise time differences fix the front
//! orientation. This is the timing-only fit; statistical weighting over
//! many events belongs to downstream analysis.

use thiserror::Error;

use crate::algo::SPEED_OF_LIGHT;

#[derive(Debug, Error, PartialEq)]
pub enum ReconstructError {
    #[error("detectors are collinear or coincident")]
    DegenerateGeometry,
    #[error("time differences exceed the light travel time between detectors")]
    Unphysical,
}

/// Bearing of detector `b` as seen from detector `a`, in radians.
pub fn detector_bearing(a: (f64, f64), b: (f64, f64)) -> f64 {
    (b.1 - a.1).atan2(b.0 - a.0)
}

/// Reconstruct `(zenith, azimuth)` from three detector positions (m) and
/// their signal arrival times (ns). The first detector is the reference;
/// time differences are reference minus detector.
pub fn reconstruct_direction(
    positions: [(f64, f64); 3],
    times: [f64; 3],
) -> Result<(f64, f64), ReconstructError> {
    let dt1 = times[0] - times[1];
    let dt2 = times[0] - times[2];

    let r1 = ((positions[1].0 - positions[0].0).powi(2)
        + (positions[1].1 - positions[0].1).powi(2))
    .sqrt();
    let r2 = ((positions[2].0 - positions[0].0).powi(2)
        + (positions[2].1 - positions[0].1).powi(2))
    .sqrt();
    let phi1 = detector_bearing(positions[0], positions[1]);
    let phi2 = detector_bearing(positions[0], positions[2]);

    reconstruct_angle_dt(dt1, dt2, phi1, phi2, r1, r2)
}

/// Reconstruct `(zenith, azimuth)` from two arrival-time differences
/// against a reference detector at bearings `phi1`, `phi2` and baselines
/// `r1`, `r2`.
pub fn reconstruct_angle_dt(
    dt1: f64,
    dt2: f64,
    phi1: f64,
    phi2: f64,
    r1: f64,
    r2: f64,
) -> Result<(f64, f64), ReconstructError> {
    if r1 <= 0.0 || r2 <= 0.0 || (phi2 - phi1).sin().abs() < 1e-12 {
        return Err(ReconstructError::DegenerateGeometry);
    }

    let phi = (dt2 * r1 * phi1.cos() - dt1 * r2 * phi2.cos())
        .atan2(-(dt2 * r1 * phi1.sin() - dt1 * r2 * phi2.sin()));

    let theta1 = (SPEED_OF_LIGHT * dt1 / (r1 * (phi - phi1).cos())).asin();
    let theta2 = (SPEED_OF_LIGHT * dt2 / (r2 * (phi - phi2).cos())).asin();

    // both baselines carry the same front; average their estimates
    let theta = match (theta1.is_nan(), theta2.is_nan()) {
        (false, false) => (theta1 + theta2) / 2.0,
        (false, true) => theta1,
        (true, false) => theta2,
        (true, true) => return Err(ReconstructError::Unphysical),
    };
    Ok((theta, phi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const POSITIONS: [(f64, f64); 3] = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];

    /// Time differences a plane front from `(theta, phi)` produces over
    /// the test baselines.
    fn front_times(theta: f64, phi: f64) -> [f64; 3] {
        let dt = |r: f64, bearing: f64| theta.sin() * r * (phi - bearing).cos() / SPEED_OF_LIGHT;
        [0.0, -dt(10.0, 0.0), -dt(10.0, std::f64::consts::FRAC_PI_2)]
    }

    #[test]
    fn test_vertical_shower() {
        let (theta, _phi) = reconstruct_direction(POSITIONS, [20.0, 20.0, 20.0]).unwrap();
        assert_relative_eq!(theta, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_inclined_front() {
        let (theta, phi) = reconstruct_direction(POSITIONS, front_times(0.3, 0.5)).unwrap();
        assert_relative_eq!(theta, 0.3, epsilon = 1e-9);
        assert_relative_eq!(phi, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_geometry() {
        let collinear = [(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)];
        assert_eq!(
            reconstruct_direction(collinear, [0.0, 1.0, 2.0]),
            Err(ReconstructError::DegenerateGeometry)
        );
    }

    #[test]
    fn test_unphysical_times() {
        // 1 us over a 10 m baseline is far beyond the light travel time
        assert_eq!(
            reconstruct_direction(POSITIONS, [0.0, 1000.0, 1000.0]),
            Err(ReconstructError::Unphysical)
        );
    }

    #[test]
    fn test_detector_bearing() {
        assert_relative_eq!(detector_bearing((0.0, 0.0), (1.0, 0.0)), 0.0);
        assert_relative_eq!(
            detector_bearing((0.0, 0.0), (0.0, 2.0)),
            std::f64::consts::FRAC_PI_2
        );
    }
}
