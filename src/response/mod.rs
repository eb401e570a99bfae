//! Detector response models: from selected particles to observables.
//!
//! Two models are provided. [`mips::MipsResponse`] draws the deposited
//! signal from a fitted energy-loss distribution and is cheap enough for
//! large trial counts. [`trace::PmtTraceResponse`] synthesizes the full
//! analog PMT trace from per-particle photon arrival times and derives
//! pulse height and charge integral from it.

pub mod mips;
pub mod trace;

use ndarray::Array1;
use rand::rngs::StdRng;

use crate::cluster::ResolvedDetector;
use crate::particles::GroundParticle;
use crate::selection::ShowerGeometry;

/// Canonical "no signal" sentinel for arrival times, used throughout the
/// pipeline instead of NaN.
pub const NO_SIGNAL_TIME: f64 = -999.0;

/// Per-species diagnostic channel values (muon / electron / gamma).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpeciesChannels {
    pub muon: f64,
    pub electron: f64,
    pub gamma: f64,
}

/// Observables of a single detector for one shower.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorObservables {
    /// Signal strength in mips equivalents (particle count for errorless
    /// and counting models).
    pub n: f64,
    pub n_muons: u32,
    pub n_electrons: u32,
    pub n_gammas: u32,
    /// Arrival time of the detector signal (ns), ADC-quantized;
    /// [`NO_SIGNAL_TIME`] when nothing was detected.
    pub t: f64,
    /// Pulse height in mV (trace model only).
    pub pulse_height: f64,
    /// Pulse charge integral in mV ns (trace model only).
    pub pulse_integral: f64,
    pub species_pulse_heights: SpeciesChannels,
    pub species_pulse_integrals: SpeciesChannels,
    /// Full analog trace in V, 80 bins of 2.5 ns (trace model only).
    pub trace: Option<Array1<f64>>,
    /// Photon arrival times at the PMT (trace model only).
    pub photon_times: Option<Vec<f64>>,
    /// Local impact position of the earliest lepton, in cm on the plate.
    pub impact: Option<(f64, f64)>,
}

impl DetectorObservables {
    /// The bundle for a detector that saw nothing.
    pub fn no_signal() -> Self {
        Self {
            n: 0.0,
            n_muons: 0,
            n_electrons: 0,
            n_gammas: 0,
            t: NO_SIGNAL_TIME,
            pulse_height: 0.0,
            pulse_integral: 0.0,
            species_pulse_heights: SpeciesChannels::default(),
            species_pulse_integrals: SpeciesChannels::default(),
            trace: None,
            photon_times: None,
            impact: None,
        }
    }

    /// Whether any signal was registered; only detectors with signal
    /// contribute a valid arrival time downstream.
    pub fn has_signal(&self) -> bool {
        self.n > 0.0
    }
}

/// Strategy seam for converting selected particles into observables.
pub trait ResponseModel {
    fn detector_response(
        &self,
        particles: &[GroundParticle],
        detector: &ResolvedDetector,
        geometry: &ShowerGeometry,
        rng: &mut StdRng,
    ) -> DetectorObservables;
}
