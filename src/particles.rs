//! Ground-particle records and the queryable particle table.
//!
//! A shower dataset is a read-only table of secondary particles sampled at
//! the observation level, plus the shower-level metadata (arrival direction,
//! energy, size) the simulation needs to throw the shower onto the array.

use log::debug;

use crate::algo::Bounds2d;

/// Particle species, following the numeric codes of the source dataset.
///
/// Code 4 (neutrino-like) and codes above 6 (hadrons and others) are carried
/// as [`Species::Other`] and never produce detector signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Gamma,
    Positron,
    Electron,
    MuonPlus,
    MuonMinus,
    Other(u8),
}

impl Species {
    /// Map a numeric species code onto the enumeration.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Species::Gamma,
            2 => Species::Positron,
            3 => Species::Electron,
            5 => Species::MuonPlus,
            6 => Species::MuonMinus,
            other => Species::Other(other),
        }
    }

    /// The numeric code of this species.
    pub fn code(&self) -> u8 {
        match *self {
            Species::Gamma => 1,
            Species::Positron => 2,
            Species::Electron => 3,
            Species::MuonPlus => 5,
            Species::MuonMinus => 6,
            Species::Other(code) => code,
        }
    }

    pub fn is_gamma(&self) -> bool {
        matches!(self, Species::Gamma)
    }

    pub fn is_electron(&self) -> bool {
        matches!(self, Species::Positron | Species::Electron)
    }

    pub fn is_muon(&self) -> bool {
        matches!(self, Species::MuonPlus | Species::MuonMinus)
    }

    /// Electrons and muons, the species the scintillators count directly.
    pub fn is_lepton(&self) -> bool {
        self.is_electron() || self.is_muon()
    }

    /// Species that can deposit signal at all (leptons and gammas).
    pub fn is_detectable(&self) -> bool {
        self.is_lepton() || self.is_gamma()
    }
}

/// One secondary particle at the observation level.
///
/// Units: positions in m, time since first interaction in ns, momentum
/// components in eV/c.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundParticle {
    pub species: Species,
    pub x: f64,
    pub y: f64,
    pub t: f64,
    pub p_x: f64,
    pub p_y: f64,
    pub p_z: f64,
    pub observation_level: f64,
}

impl GroundParticle {
    /// Magnitude of the particle momentum in eV/c.
    pub fn momentum(&self) -> f64 {
        crate::algo::vector_length(self.p_x, self.p_y, self.p_z)
    }

    /// Incidence angle w.r.t. the vertical, in radians.
    pub fn incidence_angle(&self) -> f64 {
        (self.p_z.abs() / self.momentum()).acos()
    }
}

/// Shower-level metadata of a particle dataset.
///
/// `azimuth` is the intrinsic azimuth the particles were generated with; the
/// cluster is rotated per trial so that this fixed direction appears as the
/// desired shower azimuth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowerInfo {
    pub zenith: f64,
    pub azimuth: f64,
    pub energy: f64,
    pub size: f64,
    pub particle: Species,
}

/// Read-only table of ground particles supporting indexed range queries.
///
/// Rows are kept sorted by `x` so the axis-aligned pre-filter of a footprint
/// query reduces to a binary-search range scan over the x interval, with the
/// y interval and species predicate applied to the survivors.
#[derive(Debug, Clone)]
pub struct ParticleTable {
    rows: Vec<GroundParticle>,
}

impl ParticleTable {
    /// Build a table, sorting the rows by x position.
    pub fn from_rows(mut rows: Vec<GroundParticle>) -> Self {
        rows.sort_by(|a, b| a.x.total_cmp(&b.x));
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[GroundParticle] {
        &self.rows
    }

    /// All particles inside `bounds` that satisfy `filter`.
    ///
    /// An empty result is a normal outcome: the footprint simply saw no
    /// particles.
    pub fn query<F>(&self, bounds: &Bounds2d, filter: F) -> Vec<GroundParticle>
    where
        F: Fn(&GroundParticle) -> bool,
    {
        let start = self.rows.partition_point(|p| p.x < bounds.min_x);
        let end = self.rows.partition_point(|p| p.x <= bounds.max_x);
        self.rows[start..end]
            .iter()
            .filter(|p| p.y >= bounds.min_y && p.y <= bounds.max_y && filter(p))
            .copied()
            .collect()
    }
}

/// An open particle dataset: the table plus its shower metadata.
///
/// This is the one externally-sourced resource of a simulation run. It is
/// acquired at construction and dropped exactly once when the run finishes.
#[derive(Debug)]
pub struct ParticleDataset {
    table: ParticleTable,
    info: ShowerInfo,
}

impl ParticleDataset {
    pub fn new(table: ParticleTable, info: ShowerInfo) -> Self {
        Self { table, info }
    }

    pub fn table(&self) -> &ParticleTable {
        &self.table
    }

    pub fn info(&self) -> &ShowerInfo {
        &self.info
    }
}

impl Drop for ParticleDataset {
    fn drop(&mut self) {
        debug!("releasing particle dataset ({} rows)", self.table.len());
    }
}
