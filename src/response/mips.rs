//! Statistical scintillator response: energy loss in mips equivalents.
//!
//! The deposited signal per particle follows the convolution of the
//! Landau-distributed electron and muon energy losses with the scintillator
//! response. The resulting cumulative distribution is inverted piecewise:
//! a uniform draw `y` maps onto a signal in mips through one of four
//! closed-form regimes, divided by `cos(theta)` for the longer path of an
//! inclined track. The regime breakpoints are part of the fit; changing
//! them breaks the continuity of the inverse.
//!
//! Timing and signal uncertainties are grouped behind
//! [`UncertaintyModel`] so that an error-free variant (perfect timing,
//! plain particle counting) plugs into the same response pipeline.

use ndarray::{Array1, ArrayView1, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::algo::{ceil_in_base, SPEED_OF_LIGHT};
use crate::cluster::ResolvedDetector;
use crate::particles::GroundParticle;
use crate::response::{DetectorObservables, ResponseModel};
use crate::selection::ShowerGeometry;

/// ADC sampling interval in ns.
pub const ADC_SAMPLE_NS: f64 = 2.5;

/// Floor on cos(theta): tracks steeper than the detector diagonal saturate
/// at the maximum path length (2 cm thickness over 112 cm diagonal).
const MIN_COSTHETA: f64 = 2.0 / 112.0;

/// Invert the mips cumulative distribution for one uniform draw.
///
/// `costheta` is floored at the maximum-path-length limit before dividing,
/// so near-horizontal tracks stay finite.
pub fn mips_from_uniform(y: f64, costheta: f64) -> f64 {
    let costheta = costheta.max(MIN_COSTHETA);
    let mips = if y < 0.3394 {
        0.48 + 0.8583 * y.sqrt()
    } else if y < 0.4344 {
        0.73 + 0.7366 * y
    } else if y < 0.9041 {
        1.7752 - 1.0336 * (0.9267 - y).sqrt()
    } else {
        2.28 - 2.1316 * (1.0 - y).sqrt()
    };
    mips / costheta
}

/// Vectorized inverse: one pass over matching arrays of uniform draws and
/// incidence angles.
pub fn mips_for_draws(draws: ArrayView1<f64>, thetas: ArrayView1<f64>) -> Array1<f64> {
    Zip::from(draws)
        .and(thetas)
        .map_collect(|&y, &theta| mips_from_uniform(y, theta.cos()))
}

/// Timing and signal uncertainties of the station hardware.
///
/// Every quantity here is either drawn per run (offsets), per particle
/// (transport time), or per event (GPS receiver), mirroring where the
/// corresponding hardware effect lives.
pub trait UncertaintyModel {
    /// Timing offset between detectors of one station (ns); fixed per run.
    fn detector_offset(&self, rng: &mut StdRng) -> f64;
    /// Timing offset between station GPS clocks (ns); fixed per run.
    fn station_offset(&self, rng: &mut StdRng) -> f64;
    /// Per-event GPS receiver uncertainty (ns).
    fn gps_uncertainty(&self, rng: &mut StdRng) -> f64;
    /// Per-particle scintillation light transport time to the PMT (ns).
    fn transport_time(&self, rng: &mut StdRng) -> f64;
    /// Quantization of a signal time by the ADC sampling.
    fn adc_sample(&self, t: f64) -> f64;
    /// Total deposited signal in mips for particles at the given
    /// incidence angles.
    fn detector_mips(&self, thetas: &[f64], rng: &mut StdRng) -> f64;
}

/// The measured uncertainty set of deployed stations.
#[derive(Debug, Clone, Copy)]
pub struct FieldUncertainties {
    detector_offset: Normal<f64>,
    station_offset: Normal<f64>,
    gps: Normal<f64>,
}

impl Default for FieldUncertainties {
    fn default() -> Self {
        Self {
            detector_offset: Normal::new(0.0, 2.77)
                .expect("detector offset spread must be positive"),
            station_offset: Normal::new(0.0, 16.0)
                .expect("station offset spread must be positive"),
            gps: Normal::new(0.0, 4.5).expect("gps spread must be positive"),
        }
    }
}

impl UncertaintyModel for FieldUncertainties {
    fn detector_offset(&self, rng: &mut StdRng) -> f64 {
        self.detector_offset.sample(rng)
    }

    fn station_offset(&self, rng: &mut StdRng) -> f64 {
        self.station_offset.sample(rng)
    }

    fn gps_uncertainty(&self, rng: &mut StdRng) -> f64 {
        self.gps.sample(rng)
    }

    fn transport_time(&self, rng: &mut StdRng) -> f64 {
        // Two-piece fit of the measured transport time distribution.
        let u: f64 = rng.gen();
        if u < 0.39377 {
            2.5507 + 2.39885 * u
        } else {
            1.56764 + 4.89536 * u
        }
    }

    fn adc_sample(&self, t: f64) -> f64 {
        ceil_in_base(t, ADC_SAMPLE_NS)
    }

    fn detector_mips(&self, thetas: &[f64], rng: &mut StdRng) -> f64 {
        let draws = Array1::from_shape_fn(thetas.len(), |_| rng.gen::<f64>());
        let angles = ArrayView1::from(thetas);
        mips_for_draws(draws.view(), angles).sum()
    }
}

/// Error-free variant: perfect timing and plain particle counting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUncertainties;

impl UncertaintyModel for NoUncertainties {
    fn detector_offset(&self, _rng: &mut StdRng) -> f64 {
        0.0
    }

    fn station_offset(&self, _rng: &mut StdRng) -> f64 {
        0.0
    }

    fn gps_uncertainty(&self, _rng: &mut StdRng) -> f64 {
        0.0
    }

    fn transport_time(&self, _rng: &mut StdRng) -> f64 {
        0.0
    }

    fn adc_sample(&self, t: f64) -> f64 {
        t
    }

    fn detector_mips(&self, thetas: &[f64], _rng: &mut StdRng) -> f64 {
        thetas.len() as f64
    }
}

/// Fast statistical response model.
#[derive(Debug, Clone, Copy, Default)]
pub struct MipsResponse<U: UncertaintyModel> {
    pub uncertainties: U,
}

impl<U: UncertaintyModel> MipsResponse<U> {
    pub fn new(uncertainties: U) -> Self {
        Self { uncertainties }
    }
}

impl<U: UncertaintyModel> ResponseModel for MipsResponse<U> {
    fn detector_response(
        &self,
        particles: &[GroundParticle],
        detector: &ResolvedDetector,
        geometry: &ShowerGeometry,
        rng: &mut StdRng,
    ) -> DetectorObservables {
        if particles.is_empty() {
            return DetectorObservables::no_signal();
        }

        let thetas: Vec<f64> = particles.iter().map(|p| p.incidence_angle()).collect();
        let mips = self.uncertainties.detector_mips(&thetas, rng);

        let first = particles
            .iter()
            .map(|p| p.t + self.uncertainties.transport_time(rng))
            .fold(f64::INFINITY, f64::min);
        let projection = detector.z / (SPEED_OF_LIGHT * geometry.zenith.cos());
        let first_signal = first + detector.offset - projection;

        let mut observables = DetectorObservables::no_signal();
        observables.n = (mips * 1000.0).round() / 1000.0;
        observables.t = self.uncertainties.adc_sample(first_signal);
        for particle in particles {
            if particle.species.is_muon() {
                observables.n_muons += 1;
            } else if particle.species.is_electron() {
                observables.n_electrons += 1;
            } else if particle.species.is_gamma() {
                observables.n_gammas += 1;
            }
        }
        observables
    }
}
