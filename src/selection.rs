//! Particle selection strategies: which ground particles strike a detector.
//!
//! Selection runs against the shifted footprint: a shower arriving at
//! non-zero zenith displaces the intersection of a particle track with the
//! detector plane by `z * tan(zenith)` along the shower azimuth, so corners
//! are projected into that frame before querying.
//!
//! Two strategies are provided. [`SquareSelector`] ignores detector
//! rotation and tests a square of equal area around the projected center,
//! which keeps the query a plain box scan. [`FootprintSelector`] does the
//! exact test: an enlarged, rotated quadrilateral expressed as two pairs of
//! parallel boundary lines, with the bounding box of the projected corners
//! as the cheap pre-filter.

use crate::algo::{line_boundary_eqs, Bounds2d};
use crate::cluster::ResolvedDetector;
use crate::particles::{GroundParticle, ParticleTable, Species};

/// Shower incidence parameters a selection query needs.
///
/// `azimuth` is the intrinsic azimuth of the particle dataset, not the
/// per-trial desired azimuth: the cluster transform already rotated the
/// array so the dataset's direction appears as the desired one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowerGeometry {
    pub zenith: f64,
    pub azimuth: f64,
}

/// Horizontal displacement of a detector footprint at height `z` for a
/// shower arriving along `geometry`.
pub fn projection_shift(z: f64, geometry: &ShowerGeometry) -> (f64, f64) {
    let shift = z * geometry.zenith.tan();
    (shift * geometry.azimuth.cos(), shift * geometry.azimuth.sin())
}

/// Which species a selection passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesFilter {
    LeptonsOnly,
    LeptonsAndGammas,
}

impl SpeciesFilter {
    pub fn accepts(&self, species: Species) -> bool {
        match self {
            SpeciesFilter::LeptonsOnly => species.is_lepton(),
            SpeciesFilter::LeptonsAndGammas => species.is_detectable(),
        }
    }
}

/// Strategy seam for footprint queries.
pub trait ParticleSelector {
    /// All particles whose ground position falls inside the detector
    /// footprint for the given shower geometry. An empty result is a
    /// normal outcome (non-firing detector), not an error.
    fn particles_in(
        &self,
        table: &ParticleTable,
        detector: &ResolvedDetector,
        geometry: &ShowerGeometry,
    ) -> Vec<GroundParticle>;
}

/// Fast path: an unrotated square of the detector's area around the
/// projected center, leptons only.
#[derive(Debug, Clone, Copy)]
pub struct SquareSelector {
    half_width: f64,
}

impl Default for SquareSelector {
    fn default() -> Self {
        // square with the detector's 0.5 m^2 surface
        Self {
            half_width: 0.5f64.sqrt() / 2.0,
        }
    }
}

impl ParticleSelector for SquareSelector {
    fn particles_in(
        &self,
        table: &ParticleTable,
        detector: &ResolvedDetector,
        geometry: &ShowerGeometry,
    ) -> Vec<GroundParticle> {
        let (shift_x, shift_y) = projection_shift(detector.z, geometry);
        let bounds = Bounds2d::centered(detector.x - shift_x, detector.y - shift_y, self.half_width);
        table.query(&bounds, |p| p.species.is_lepton())
    }
}

/// Exact footprint query against the rotated, enlarged quadrilateral.
#[derive(Debug, Clone, Copy)]
pub struct FootprintSelector {
    /// Enlargement of every side (m), catching near-misses against the
    /// structure around the scintillator.
    pub margin: f64,
    /// Extra extension of the far long side (m); the detector housing lid
    /// sits higher than the plate and still intercepts particles.
    pub lid_extension: f64,
    pub species: SpeciesFilter,
}

impl Default for FootprintSelector {
    fn default() -> Self {
        Self {
            margin: 0.0,
            lid_extension: 0.0,
            species: SpeciesFilter::LeptonsOnly,
        }
    }
}

impl FootprintSelector {
    /// Configuration matching the photon-transport variant: enlarged
    /// footprint including the housing, gammas included.
    pub fn with_housing() -> Self {
        Self {
            margin: 0.1,
            lid_extension: 0.675,
            species: SpeciesFilter::LeptonsAndGammas,
        }
    }

    /// The enlarged footprint corners for one detector, shifted into the
    /// shower projection frame.
    pub fn shifted_corners(
        &self,
        detector: &ResolvedDetector,
        geometry: &ShowerGeometry,
    ) -> [(f64, f64); 4] {
        let corners = enlarge_corners(
            &detector.corners,
            detector.rotation,
            self.margin,
            self.lid_extension,
        );
        let (shift_x, shift_y) = projection_shift(detector.z, geometry);
        corners.map(|(x, y)| (x - shift_x, y - shift_y))
    }
}

impl ParticleSelector for FootprintSelector {
    fn particles_in(
        &self,
        table: &ParticleTable,
        detector: &ResolvedDetector,
        geometry: &ShowerGeometry,
    ) -> Vec<GroundParticle> {
        let corners = self.shifted_corners(detector, geometry);

        let boundary_a = line_boundary_eqs(corners[0], corners[1], corners[2]);
        let boundary_b = line_boundary_eqs(corners[1], corners[2], corners[3]);
        let bounds =
            Bounds2d::from_points(&corners).expect("footprint always has four corners");

        table.query(&bounds, |p| {
            self.species.accepts(p.species)
                && boundary_a.contains(p.x, p.y)
                && boundary_b.contains(p.x, p.y)
        })
    }
}

/// Grow a footprint in its own aligned frame.
///
/// The corners are rotated into the frame where the detector axes align
/// with x and y, padded by `margin` on every side and by `lid` on the far
/// long side, then rotated back. Corner order is lower-left, lower-right,
/// upper-right, upper-left.
pub fn enlarge_corners(
    corners: &[(f64, f64); 4],
    rotation: f64,
    margin: f64,
    lid: f64,
) -> [(f64, f64); 4] {
    if margin == 0.0 && lid == 0.0 {
        return *corners;
    }

    let origin = corners[0];
    let (sin_r, cos_r) = rotation.sin_cos();
    let to_local = |(x, y): (f64, f64)| {
        let dx = x - origin.0;
        let dy = y - origin.1;
        (dx * cos_r + dy * sin_r, -dx * sin_r + dy * cos_r)
    };
    let to_plane = |(x, y): (f64, f64)| {
        (
            origin.0 + x * cos_r - y * sin_r,
            origin.1 + x * sin_r + y * cos_r,
        )
    };

    let local = corners.map(to_local);
    let padded = [
        (local[0].0 - margin, local[0].1 - margin),
        (local[1].0 + margin, local[1].1 - margin),
        (local[2].0 + margin, local[2].1 + lid + margin),
        (local[3].0 - margin, local[3].1 + lid + margin),
    ];
    padded.map(to_plane)
}
