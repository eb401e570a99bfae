//! Detector, station and cluster geometry.
//!
//! A cluster describes the relative placement of its stations once; per
//! shower the orchestrator computes a [`ClusterTransform`] (translation plus
//! rotation) and resolves detector coordinates through it. The shared
//! geometry is never mutated between trials, so trials stay independent of
//! each other.
//!
//! The per-run timing offsets living on detectors and stations are the one
//! piece of mutable state here; they are drawn exactly once when a
//! simulation is constructed.

use std::f64::consts::FRAC_PI_2;

/// Sensitive area of one scintillator: 0.5 m (short axis) by 1.0 m (long
/// axis), for 0.5 m² of effective surface.
pub const DETECTOR_SIZE: (f64, f64) = (0.5, 1.0);

/// One scintillator plate, placed relative to its station center.
#[derive(Debug, Clone)]
pub struct Detector {
    /// Position relative to the station center (m).
    pub position: (f64, f64, f64),
    /// Rotation of the long axis w.r.t. the station frame (radians);
    /// 0 puts the long axis along y, `FRAC_PI_2` along x.
    pub orientation: f64,
    /// Per-run signal timing offset (ns), drawn once at run start.
    offset: f64,
}

impl Detector {
    pub fn new(position: (f64, f64, f64), orientation: f64) -> Self {
        Self {
            position,
            orientation,
            offset: 0.0,
        }
    }

    /// Long axis along y ("up-down" orientation).
    pub fn upright(position: (f64, f64, f64)) -> Self {
        Self::new(position, 0.0)
    }

    /// Long axis along x ("left-right" orientation).
    pub fn sideways(position: (f64, f64, f64)) -> Self {
        Self::new(position, FRAC_PI_2)
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }
}

/// A station: 2 or 4 detectors sharing electronics and one GPS clock.
#[derive(Debug, Clone)]
pub struct Station {
    pub number: u32,
    /// Position of the station center relative to the cluster origin (m).
    pub position: (f64, f64, f64),
    /// Rotation of the station frame w.r.t. the cluster frame (radians).
    pub angle: f64,
    pub detectors: Vec<Detector>,
    /// Per-run GPS timing offset (ns), drawn once at run start.
    gps_offset: f64,
}

impl Station {
    pub fn new(number: u32, position: (f64, f64, f64), angle: f64, detectors: Vec<Detector>) -> Self {
        Self {
            number,
            position,
            angle,
            detectors,
            gps_offset: 0.0,
        }
    }

    /// Standard two-detector station: plates 10 m apart on the x axis,
    /// long axes parallel.
    pub fn two_detector(number: u32, position: (f64, f64, f64), angle: f64) -> Self {
        Self::new(
            number,
            position,
            angle,
            vec![
                Detector::upright((-5.0, 0.0, 0.0)),
                Detector::upright((5.0, 0.0, 0.0)),
            ],
        )
    }

    /// Standard four-detector station: triangle layout with a central plate,
    /// outer plates 10 m from each other.
    pub fn four_detector(number: u32, position: (f64, f64, f64), angle: f64) -> Self {
        Self::new(
            number,
            position,
            angle,
            vec![
                Detector::upright((0.0, 5.77, 0.0)),
                Detector::upright((0.0, 0.0, 0.0)),
                Detector::sideways((-5.0, -2.89, 0.0)),
                Detector::sideways((5.0, -2.89, 0.0)),
            ],
        )
    }

    pub fn gps_offset(&self) -> f64 {
        self.gps_offset
    }

    pub fn set_gps_offset(&mut self, offset: f64) {
        self.gps_offset = offset;
    }

    /// Resolve this station and its detectors through a cluster transform.
    pub fn resolve(&self, transform: &ClusterTransform) -> ResolvedStation {
        let (sin_a, cos_a) = transform.alpha.sin_cos();
        let center = (
            transform.x + self.position.0 * cos_a - self.position.1 * sin_a,
            transform.y + self.position.0 * sin_a + self.position.1 * cos_a,
            self.position.2,
        );
        let angle = self.angle + transform.alpha;

        let detectors = self
            .detectors
            .iter()
            .map(|detector| {
                let (sin_s, cos_s) = angle.sin_cos();
                let x = center.0 + detector.position.0 * cos_s - detector.position.1 * sin_s;
                let y = center.1 + detector.position.0 * sin_s + detector.position.1 * cos_s;
                let z = center.2 + detector.position.2;
                let rotation = angle + detector.orientation;
                ResolvedDetector {
                    x,
                    y,
                    z,
                    rotation,
                    corners: detector_corners(x, y, rotation),
                    offset: detector.offset,
                }
            })
            .collect();

        ResolvedStation {
            number: self.number,
            center,
            gps_offset: self.gps_offset,
            detectors,
        }
    }
}

/// Corner positions of a detector footprint on the ground plane, ordered
/// lower-left, lower-right, upper-right, upper-left in the detector frame.
fn detector_corners(x: f64, y: f64, rotation: f64) -> [(f64, f64); 4] {
    let half_w = DETECTOR_SIZE.0 / 2.0;
    let half_l = DETECTOR_SIZE.1 / 2.0;
    let (sin_r, cos_r) = rotation.sin_cos();
    let corner = |dx: f64, dy: f64| {
        (
            x + dx * cos_r - dy * sin_r,
            y + dx * sin_r + dy * cos_r,
        )
    };
    [
        corner(-half_w, -half_l),
        corner(half_w, -half_l),
        corner(half_w, half_l),
        corner(-half_w, half_l),
    ]
}

/// All stations of the array with their relative placement.
#[derive(Debug, Clone)]
pub struct Cluster {
    stations: Vec<Station>,
}

impl Cluster {
    pub fn from_stations(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    /// A single two-detector station at the cluster origin.
    pub fn single_two_detector() -> Self {
        Self::from_stations(vec![Station::two_detector(1, (0.0, 0.0, 0.0), 0.0)])
    }

    /// A single four-detector station at the cluster origin.
    pub fn single_four_detector() -> Self {
        Self::from_stations(vec![Station::four_detector(1, (0.0, 0.0, 0.0), 0.0)])
    }

    /// `count` four-detector stations evenly spaced on a ring of radius
    /// `spacing` (a compact demo array; real deployments are irregular).
    pub fn ring(count: u32, spacing: f64) -> Self {
        let stations = (0..count)
            .map(|i| {
                let phi = std::f64::consts::TAU * f64::from(i) / f64::from(count);
                Station::four_detector(
                    i + 1,
                    (spacing * phi.cos(), spacing * phi.sin(), 0.0),
                    phi,
                )
            })
            .collect();
        Self::from_stations(stations)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn stations_mut(&mut self) -> &mut [Station] {
        &mut self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// Per-trial placement of the cluster relative to the shower frame.
///
/// This is a pure value: resolving geometry through it never touches the
/// cluster itself, which keeps trials order-independent and makes a future
/// parallel port a matter of per-worker RNG streams only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterTransform {
    pub x: f64,
    pub y: f64,
    pub alpha: f64,
}

impl ClusterTransform {
    /// The identity placement (cluster frame equals shower frame).
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            alpha: 0.0,
        }
    }

    /// Placement for one shower: translate so the core lands at the array
    /// origin and rotate so the dataset's intrinsic azimuth appears as the
    /// desired shower azimuth.
    ///
    /// # Arguments
    /// * `core` - shower core position relative to the cluster origin (m)
    /// * `alpha` - rotation between desired and intrinsic azimuth (radians)
    pub fn for_shower(core: (f64, f64), alpha: f64) -> Self {
        // Rotate the core position around the original cluster center, then
        // move the cluster to put the core at the origin.
        let (sin_a, cos_a) = (-alpha).sin_cos();
        let xp = core.0 * cos_a - core.1 * sin_a;
        let yp = core.0 * sin_a + core.1 * cos_a;
        Self {
            x: -xp,
            y: -yp,
            alpha: -alpha,
        }
    }
}

/// A station with its detector coordinates resolved for one trial.
#[derive(Debug, Clone)]
pub struct ResolvedStation {
    pub number: u32,
    pub center: (f64, f64, f64),
    pub gps_offset: f64,
    pub detectors: Vec<ResolvedDetector>,
}

/// A detector with ground-plane coordinates resolved for one trial.
#[derive(Debug, Clone)]
pub struct ResolvedDetector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Total rotation of the long axis in the shower frame (radians).
    pub rotation: f64,
    /// Footprint corners, lower-left first, counter-clockwise.
    pub corners: [(f64, f64); 4],
    /// Per-run timing offset (ns).
    pub offset: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_identity_resolution() {
        let station = Station::two_detector(501, (0.0, 0.0, 0.0), 0.0);
        let resolved = station.resolve(&ClusterTransform::identity());
        assert_eq!(resolved.number, 501);
        assert_relative_eq!(resolved.detectors[0].x, -5.0);
        assert_relative_eq!(resolved.detectors[1].x, 5.0);
        assert_relative_eq!(resolved.detectors[0].y, 0.0);
    }

    #[test]
    fn test_translation_and_rotation() {
        let station = Station::new(
            1,
            (10.0, 0.0, 0.0),
            0.0,
            vec![Detector::upright((0.0, 0.0, 0.0))],
        );
        let transform = ClusterTransform {
            x: 0.0,
            y: 0.0,
            alpha: FRAC_PI_2,
        };
        let resolved = station.resolve(&transform);
        assert_relative_eq!(resolved.center.0, 0.0, epsilon = 1e-12);
        assert_relative_eq!(resolved.center.1, 10.0, epsilon = 1e-12);
        // detector frame picks up the cluster rotation
        assert_relative_eq!(resolved.detectors[0].rotation, FRAC_PI_2);
    }

    #[test]
    fn test_corners_span_detector_size() {
        let station = Station::new(
            1,
            (0.0, 0.0, 0.0),
            0.0,
            vec![Detector::upright((0.0, 0.0, 0.0))],
        );
        let detector = &station.resolve(&ClusterTransform::identity()).detectors[0];
        let corners = detector.corners;
        assert_relative_eq!(corners[1].0 - corners[0].0, DETECTOR_SIZE.0);
        assert_relative_eq!(corners[3].1 - corners[0].1, DETECTOR_SIZE.1);

        // a sideways detector swaps the spans
        let sideways = Station::new(
            1,
            (0.0, 0.0, 0.0),
            0.0,
            vec![Detector::sideways((0.0, 0.0, 0.0))],
        );
        let detector = &sideways.resolve(&ClusterTransform::identity()).detectors[0];
        let xs: Vec<f64> = detector.corners.iter().map(|c| c.0).collect();
        let ys: Vec<f64> = detector.corners.iter().map(|c| c.1).collect();
        let span = |v: &[f64]| v.iter().cloned().fold(f64::MIN, f64::max)
            - v.iter().cloned().fold(f64::MAX, f64::min);
        assert_relative_eq!(span(&xs), DETECTOR_SIZE.1, epsilon = 1e-12);
        assert_relative_eq!(span(&ys), DETECTOR_SIZE.0, epsilon = 1e-12);
    }

    #[test]
    fn test_for_shower_puts_core_at_origin() {
        // A station placed exactly on the shower core must resolve to the
        // origin after the shower transform, whatever the rotation.
        let core = (30.0, -40.0);
        let alpha = 0.7;
        let station = Station::new(
            1,
            (core.0, core.1, 0.0),
            0.0,
            vec![Detector::upright((0.0, 0.0, 0.0))],
        );
        let transform = ClusterTransform::for_shower(core, alpha);
        let resolved = station.resolve(&transform);
        assert_relative_eq!(resolved.center.0, 0.0, epsilon = 1e-9);
        assert_relative_eq!(resolved.center.1, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ring_cluster() {
        let cluster = Cluster::ring(4, 100.0);
        assert_eq!(cluster.len(), 4);
        let numbers: Vec<u32> = cluster.stations().iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        let first = cluster.stations()[0].resolve(&ClusterTransform::identity());
        assert_relative_eq!(first.center.0, 100.0);

        let half = cluster.stations()[2].resolve(&ClusterTransform::identity());
        assert_relative_eq!(half.center.0, -100.0, epsilon = 1e-9);
        assert_relative_eq!(half.center.1, 0.0, epsilon = 1e-9);
        assert_relative_eq!(cluster.stations()[2].angle, PI);
    }
}
