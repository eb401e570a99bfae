//! Analog PMT trace synthesis from per-particle photon arrival times.
//!
//! Each selected particle is handed to a [`PhotonYieldModel`], which
//! answers with the arrival times of scintillation photons at the
//! photocathode. Photons convert to photoelectrons independently; every
//! 2.5 ns bin of photoelectrons contributes a bi-exponential pulse to the
//! trace (Leo, *Techniques for Nuclear and Particle Physics Experiments*,
//! p. 190). Pulse height and charge integral are read off the summed,
//! clipped trace. Separate muon/electron/gamma traces feed the diagnostic
//! channels.

use std::path::PathBuf;
use std::process::Command;

use log::warn;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Binomial, Distribution, Normal};
use thiserror::Error;

use crate::algo::SPEED_OF_LIGHT;
use crate::cluster::{ResolvedDetector, DETECTOR_SIZE};
use crate::particles::{GroundParticle, Species};
use crate::response::mips::UncertaintyModel;
use crate::response::{DetectorObservables, ResponseModel, SpeciesChannels, NO_SIGNAL_TIME};
use crate::selection::{FootprintSelector, ShowerGeometry};

/// Number of 2.5 ns bins in a trace (200 ns window).
pub const TRACE_LENGTH: usize = 80;
/// Trace bin width in ns, equal to the ADC sampling interval.
pub const TRACE_BIN_NS: f64 = 2.5;
/// Clipping voltage of the digitizer input, in V.
pub const MAX_VOLTAGE: f64 = 4096.0 * 0.57 / 1e3;

/// Pulse height (in mV) a trace must cross to delay the arrival time.
const TRIGGER_LEVEL_MV: f64 = 30.0;

const ELECTRON_CHARGE: f64 = 1.6e-19;

/// PMT pulse shaping parameters.
#[derive(Debug, Clone, Copy)]
pub struct PmtConfig {
    /// Pulse rise time in ns.
    pub rise_ns: f64,
    /// Pulse fall time in ns.
    pub fall_ns: f64,
    /// Mean gain; per-bin gains spread 10% relative, narrowing with the
    /// photoelectron count.
    pub gain: f64,
    /// Anode load in Ohm.
    pub load_ohm: f64,
    /// Photocathode conversion probability per photon.
    pub cathode_efficiency: f64,
}

impl Default for PmtConfig {
    fn default() -> Self {
        Self {
            rise_ns: 7.0,
            fall_ns: 25.0,
            gain: 17.0e6,
            load_ohm: 50.0,
            cathode_efficiency: 0.25,
        }
    }
}

/// The photon transport stage could not produce a yield for a particle.
///
/// Callers treat this as "zero photons": one failed particle never
/// invalidates a whole shower.
#[derive(Debug, Error)]
#[error("photon transport unavailable: {0}")]
pub struct SimulationUnavailable(pub String);

/// Capability seam for the photon transport stage: particle, impact
/// position and momentum in, photon arrival times at the PMT out.
pub trait PhotonYieldModel {
    fn photon_arrival_times(
        &self,
        particle: &GroundParticle,
        impact_cm: (f64, f64),
        rng: &mut StdRng,
    ) -> Result<Vec<f64>, SimulationUnavailable>;
}

/// Photon yields from an external transport simulation binary.
///
/// The binary is invoked once per particle with the species label, energy,
/// impact position and momentum, and is expected to leave a CSV file whose
/// first column holds photon arrival times (one header line). Any failure
/// — crash, missing output, unparsable line — maps to
/// [`SimulationUnavailable`].
#[derive(Debug, Clone)]
pub struct ExternalTransportSim {
    pub program: PathBuf,
    pub output_file: PathBuf,
    /// Depth coordinate handed to the transport geometry, in cm.
    pub depth_cm: f64,
}

impl ExternalTransportSim {
    fn species_label(species: Species) -> &'static str {
        match species {
            Species::Gamma => "gamma",
            Species::Positron => "e+",
            Species::Electron => "e-",
            Species::MuonPlus => "mu+",
            Species::MuonMinus => "mu-",
            Species::Other(_) => "other",
        }
    }
}

impl PhotonYieldModel for ExternalTransportSim {
    fn photon_arrival_times(
        &self,
        particle: &GroundParticle,
        impact_cm: (f64, f64),
        _rng: &mut StdRng,
    ) -> Result<Vec<f64>, SimulationUnavailable> {
        let energy = particle.momentum();
        let output = Command::new(&self.program)
            .arg("1")
            .arg(Self::species_label(particle.species))
            .arg(energy.to_string())
            .arg(impact_cm.0.to_string())
            .arg(impact_cm.1.to_string())
            .arg(self.depth_cm.to_string())
            .arg(particle.p_x.to_string())
            .arg(particle.p_y.to_string())
            .arg(particle.p_z.to_string())
            .output()
            .map_err(|e| SimulationUnavailable(format!("failed to spawn: {e}")))?;
        if !output.status.success() {
            return Err(SimulationUnavailable(format!(
                "transport exited with {}",
                output.status
            )));
        }

        let contents = std::fs::read_to_string(&self.output_file)
            .map_err(|e| SimulationUnavailable(format!("no output file: {e}")))?;
        if let Some(dir) = self.output_file.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }

        let mut times = Vec::new();
        for line in contents.lines().skip(1) {
            let first = line.split(',').next().unwrap_or("");
            let t: f64 = first
                .trim()
                .parse()
                .map_err(|e| SimulationUnavailable(format!("bad output line: {e}")))?;
            times.push(t);
        }
        Ok(times)
    }
}

/// Parameterized scintillation yield, standing in for the external
/// transport simulation in tests and demo runs.
///
/// Leptons produce a Poisson-like number of collected photons around
/// `mean_photons`, scaled with the track length through the plate; gammas
/// first have to convert, with probability `gamma_conversion`. Arrival
/// times decay exponentially with the scintillator time constant.
#[derive(Debug, Clone, Copy)]
pub struct ScintillationYield {
    pub mean_photons: f64,
    pub gamma_conversion: f64,
    pub decay_ns: f64,
}

impl Default for ScintillationYield {
    fn default() -> Self {
        Self {
            mean_photons: 120.0,
            gamma_conversion: 0.03,
            decay_ns: 5.0,
        }
    }
}

impl PhotonYieldModel for ScintillationYield {
    fn photon_arrival_times(
        &self,
        particle: &GroundParticle,
        _impact_cm: (f64, f64),
        rng: &mut StdRng,
    ) -> Result<Vec<f64>, SimulationUnavailable> {
        if particle.species.is_gamma() && rng.gen::<f64>() >= self.gamma_conversion {
            return Ok(Vec::new());
        }
        if !particle.species.is_detectable() {
            return Ok(Vec::new());
        }

        let costheta = particle.incidence_angle().cos().max(2.0 / 112.0);
        let mean = self.mean_photons / costheta;
        let count = rand_distr::Poisson::new(mean)
            .map_err(|e| SimulationUnavailable(format!("bad photon mean: {e}")))?
            .sample(rng) as usize;

        let times = (0..count)
            .map(|_| -self.decay_ns * (1.0 - rng.gen::<f64>()).ln())
            .collect();
        Ok(times)
    }
}

/// Photocathode stage: each photon converts independently.
fn cathode_electrons(n_photons: u64, efficiency: f64, rng: &mut StdRng) -> u64 {
    if n_photons == 0 {
        return 0;
    }
    Binomial::new(n_photons, efficiency)
        .expect("cathode efficiency must be a probability")
        .sample(rng)
}

/// Synthesize the PMT anode trace for a set of photon arrival times.
///
/// Photons are binned per 2.5 ns; each bin's photoelectrons contribute one
/// bi-exponential pulse starting at the bin edge. The trace is negative
/// (anode pulses are) and unclipped; clipping happens once on the summed
/// all-species trace.
pub fn simulate_pmt(photon_times: &[f64], pmt: &PmtConfig, rng: &mut StdRng) -> Array1<f64> {
    let mut trace = Array1::zeros(TRACE_LENGTH);
    if photon_times.is_empty() {
        return trace;
    }

    let mut per_bin = [0u64; TRACE_LENGTH];
    for &t in photon_times {
        if t >= 0.0 {
            let bin = (t / TRACE_BIN_NS) as usize;
            if bin < TRACE_LENGTH {
                per_bin[bin] += 1;
            }
        }
    }

    for (bin, &n_photons) in per_bin.iter().enumerate() {
        let n_electrons = cathode_electrons(n_photons, pmt.cathode_efficiency, rng);
        if n_electrons == 0 {
            continue;
        }

        let sigma = pmt.gain / 10.0 / (n_electrons as f64).sqrt();
        let gain = Normal::new(pmt.gain, sigma)
            .expect("gain spread must be positive")
            .sample(rng);
        // time converted to seconds in the denominator
        let amplitude = -(gain * pmt.load_ohm * n_electrons as f64 * ELECTRON_CHARGE)
            / ((pmt.fall_ns - pmt.rise_ns) * 1e-9);
        for later in bin..TRACE_LENGTH {
            let dt = (later - bin) as f64 * TRACE_BIN_NS;
            trace[later] +=
                amplitude * ((-dt / pmt.fall_ns).exp() - (-dt / pmt.rise_ns).exp());
        }
    }

    trace
}

/// Pulse height in mV: magnitude of the deepest trace sample.
pub fn pulse_height_mv(trace: &Array1<f64>) -> f64 {
    1e3 * trace.iter().cloned().fold(0.0f64, f64::min).abs()
}

/// Pulse charge integral in mV ns.
pub fn pulse_integral_mvns(trace: &Array1<f64>) -> f64 {
    1e3 * (TRACE_BIN_NS * trace.sum()).abs()
}

/// Delay until the trace first crosses the trigger level, in ns.
fn trigger_delay_ns(trace: &Array1<f64>) -> f64 {
    for (i, &value) in trace.iter().enumerate() {
        if value * 1e3 < -TRIGGER_LEVEL_MV {
            return i as f64 * TRACE_BIN_NS;
        }
    }
    0.0
}

/// Impact position of a ground point on the plate, in the transport
/// geometry frame: cm along the long and short axes, origin at the plate
/// center shifted by the footprint margin.
fn local_impact_cm(corners: &[(f64, f64); 4], x: f64, y: f64, margin: f64) -> (f64, f64) {
    let distance_to_edge = |a: (f64, f64), b: (f64, f64)| {
        let (ex, ey) = (b.0 - a.0, b.1 - a.1);
        let (px, py) = (a.0 - x, a.1 - y);
        (ex * py - ey * px).abs() / (ex * ex + ey * ey).sqrt()
    };
    let along_length = distance_to_edge(corners[0], corners[1]);
    let along_width = distance_to_edge(corners[0], corners[3]);
    let margin_cm = margin * 100.0;
    (
        100.0 * along_length - 100.0 * DETECTOR_SIZE.1 / 2.0 - margin_cm,
        100.0 * along_width - 100.0 * DETECTOR_SIZE.0 / 2.0 - margin_cm,
    )
}

/// High-fidelity response model built around a photon transport stage.
#[derive(Debug, Clone)]
pub struct PmtTraceResponse<Y: PhotonYieldModel, U: UncertaintyModel> {
    pub yield_model: Y,
    pub uncertainties: U,
    pub pmt: PmtConfig,
    /// Footprint used to express impact positions in the transport frame;
    /// matches the selector geometry.
    pub housing: FootprintSelector,
    /// Cap on the number of particles simulated per detector, keeping all
    /// leptons first.
    pub cutoff_number_of_particles: Option<usize>,
}

impl<Y: PhotonYieldModel, U: UncertaintyModel> PmtTraceResponse<Y, U> {
    pub fn new(yield_model: Y, uncertainties: U) -> Self {
        Self {
            yield_model,
            uncertainties,
            pmt: PmtConfig::default(),
            housing: FootprintSelector::with_housing(),
            cutoff_number_of_particles: Some(10),
        }
    }

    /// Apply the particle cap: leptons are kept preferentially, the
    /// remainder tops up with other species, and the combined set is
    /// shuffled before truncation.
    fn capped<'a>(
        &self,
        particles: &'a [GroundParticle],
        rng: &mut StdRng,
    ) -> Vec<&'a GroundParticle> {
        let Some(cutoff) = self.cutoff_number_of_particles else {
            return particles.iter().collect();
        };

        let mut keep: Vec<&GroundParticle> =
            particles.iter().filter(|p| p.species.is_lepton()).collect();
        if keep.len() < cutoff {
            keep.extend(
                particles
                    .iter()
                    .filter(|p| !p.species.is_lepton())
                    .take(cutoff - keep.len()),
            );
        }
        keep.shuffle(rng);
        keep.truncate(cutoff);
        keep
    }
}

impl<Y: PhotonYieldModel, U: UncertaintyModel> ResponseModel for PmtTraceResponse<Y, U> {
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

        let t_first = particles.iter().map(|p| p.t).fold(f64::INFINITY, f64::min);
        let corners = self.housing.shifted_corners(detector, geometry);
        let subset = self.capped(particles, rng);

        let mut all_photons: Vec<f64> = Vec::new();
        let mut muon_photons: Vec<f64> = Vec::new();
        let mut electron_photons: Vec<f64> = Vec::new();
        let mut gamma_photons: Vec<f64> = Vec::new();
        let mut arrivals: Vec<f64> = Vec::new();
        let (mut n_muons, mut n_electrons, mut n_gammas) = (0u32, 0u32, 0u32);
        let mut earliest_lepton = f64::INFINITY;
        let mut impact = None;

        for particle in subset {
            let impact_cm =
                local_impact_cm(&corners, particle.x, particle.y, self.housing.margin);
            let photons = match self
                .yield_model
                .photon_arrival_times(particle, impact_cm, rng)
            {
                Ok(photons) => photons,
                Err(e) => {
                    warn!("treating particle as dark: {e}");
                    Vec::new()
                }
            };

            if photons.is_empty() {
                // no interaction (or transport failure): keeps a sentinel
                // slot in the arrival list
                arrivals.push(NO_SIGNAL_TIME);
                continue;
            }

            let arrival = photons.iter().cloned().fold(f64::INFINITY, f64::min);
            arrivals.push(arrival);

            // widen the trace by the particle's latency w.r.t. the first
            let latency = particle.t - t_first;
            let shifted: Vec<f64> = photons.iter().map(|t| t + latency).collect();

            if particle.species.is_gamma() {
                n_gammas += 1;
                gamma_photons.extend_from_slice(&shifted);
            } else {
                if particle.species.is_muon() {
                    n_muons += 1;
                    muon_photons.extend_from_slice(&shifted);
                } else {
                    n_electrons += 1;
                    electron_photons.extend_from_slice(&shifted);
                }
                if latency < earliest_lepton {
                    earliest_lepton = latency;
                    impact = Some(impact_cm);
                }
            }
            all_photons.extend_from_slice(&shifted);
        }

        if n_muons + n_electrons + n_gammas == 0 {
            return DetectorObservables::no_signal();
        }

        let mut trace = simulate_pmt(&all_photons, &self.pmt, rng);
        trace.mapv_inplace(|v| v.max(-MAX_VOLTAGE));
        let muon_trace = simulate_pmt(&muon_photons, &self.pmt, rng);
        let electron_trace = simulate_pmt(&electron_photons, &self.pmt, rng);
        let gamma_trace = simulate_pmt(&gamma_photons, &self.pmt, rng);

        let pulse_height = pulse_height_mv(&trace);

        // A pulse was seen: non-interacting particles must not pull the
        // arrival time down to the sentinel.
        if pulse_height > 0.0 {
            arrivals.retain(|&t| t > NO_SIGNAL_TIME);
        }
        let first_arrival = arrivals.iter().cloned().fold(f64::INFINITY, f64::min)
            + trigger_delay_ns(&trace);

        let projection = detector.z / (SPEED_OF_LIGHT * geometry.zenith.cos());
        let first_signal = t_first + first_arrival + detector.offset - projection;

        DetectorObservables {
            n: f64::from(n_muons + n_electrons + n_gammas),
            n_muons,
            n_electrons,
            n_gammas,
            t: self.uncertainties.adc_sample(first_signal),
            pulse_height,
            pulse_integral: pulse_integral_mvns(&trace),
            species_pulse_heights: SpeciesChannels {
                muon: pulse_height_mv(&muon_trace),
                electron: pulse_height_mv(&electron_trace),
                gamma: pulse_height_mv(&gamma_trace),
            },
            species_pulse_integrals: SpeciesChannels {
                muon: pulse_integral_mvns(&muon_trace),
                electron: pulse_integral_mvns(&electron_trace),
                gamma: pulse_integral_mvns(&gamma_trace),
            },
            trace: Some(trace),
            photon_times: Some(all_photons),
            impact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterTransform, Station};
    use crate::response::mips::NoUncertainties;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn test_empty_photon_list_gives_flat_trace() {
        let mut rng = StdRng::seed_from_u64(0);
        let trace = simulate_pmt(&[], &PmtConfig::default(), &mut rng);
        assert_eq!(trace.len(), TRACE_LENGTH);
        assert_relative_eq!(trace.sum(), 0.0);
        assert_relative_eq!(pulse_height_mv(&trace), 0.0);
    }

    #[test]
    fn test_trace_is_negative_pulse() {
        let mut rng = StdRng::seed_from_u64(11);
        let photons: Vec<f64> = (0..400).map(|i| 10.0 + 0.05 * i as f64).collect();
        let trace = simulate_pmt(&photons, &PmtConfig::default(), &mut rng);
        assert!(trace.iter().all(|&v| v <= 0.0));
        assert!(pulse_height_mv(&trace) > 0.0);
        assert!(pulse_integral_mvns(&trace) > 0.0);
        // nothing before the photons arrive
        assert_relative_eq!(trace[0], 0.0);
        assert_relative_eq!(trace[3], 0.0);
    }

    #[test]
    fn test_out_of_window_photons_dropped() {
        let mut rng = StdRng::seed_from_u64(2);
        let trace = simulate_pmt(&[-5.0, 250.0, 1e6], &PmtConfig::default(), &mut rng);
        assert_relative_eq!(trace.sum(), 0.0);
    }

    #[test]
    fn test_trigger_delay() {
        let mut trace = Array1::zeros(TRACE_LENGTH);
        trace[4] = -0.05; // 50 mV, over the 30 mV level
        assert_relative_eq!(trigger_delay_ns(&trace), 10.0);
        let quiet = Array1::zeros(TRACE_LENGTH);
        assert_relative_eq!(trigger_delay_ns(&quiet), 0.0);
    }

    #[test]
    fn test_local_impact_centered() {
        let station = Station::two_detector(1, (0.0, 0.0, 0.0), 0.0);
        let detector = station.resolve(&ClusterTransform::identity()).detectors[0].clone();
        let housing = FootprintSelector::with_housing();
        let geometry = ShowerGeometry {
            zenith: 0.0,
            azimuth: 0.0,
        };
        let corners = housing.shifted_corners(&detector, &geometry);
        // the plate center maps to the frame origin
        let (lx, ly) = local_impact_cm(&corners, detector.x, detector.y, housing.margin);
        assert_relative_eq!(lx, 0.0, epsilon = 1e-9);
        assert_relative_eq!(ly, 0.0, epsilon = 1e-9);
        // half a meter along the long axis is 50 cm in the frame
        let (lx, _) = local_impact_cm(&corners, detector.x, detector.y + 0.5, housing.margin);
        assert_relative_eq!(lx, 50.0, epsilon = 1e-9);
    }

    fn vertical_particle(code: u8, t: f64) -> GroundParticle {
        GroundParticle {
            species: Species::from_code(code),
            x: -5.0,
            y: 0.0,
            t,
            p_x: 0.0,
            p_y: 0.0,
            p_z: -1e9,
            observation_level: 0.0,
        }
    }

    fn test_detector() -> ResolvedDetector {
        Station::two_detector(1, (0.0, 0.0, 0.0), 0.0)
            .resolve(&ClusterTransform::identity())
            .detectors[0]
            .clone()
    }

    #[test]
    fn test_trace_response_produces_signal() {
        let response =
            PmtTraceResponse::new(ScintillationYield::default(), NoUncertainties);
        let mut rng = StdRng::seed_from_u64(99);
        let particles = [
            vertical_particle(5, 10.0),
            vertical_particle(3, 12.0),
        ];
        let observables = response.detector_response(
            &particles,
            &test_detector(),
            &ShowerGeometry {
                zenith: 0.0,
                azimuth: 0.0,
            },
            &mut rng,
        );
        assert_eq!(observables.n_muons, 1);
        assert_eq!(observables.n_electrons, 1);
        assert!(observables.pulse_height > 0.0);
        assert!(observables.trace.is_some());
        assert!(observables.impact.is_some());
        // trace is clipped to the digitizer range
        let trace = observables.trace.unwrap();
        assert!(trace.iter().all(|&v| v >= -MAX_VOLTAGE));
    }

    #[test]
    fn test_unavailable_transport_is_zero_photons() {
        struct AlwaysDown;
        impl PhotonYieldModel for AlwaysDown {
            fn photon_arrival_times(
                &self,
                _particle: &GroundParticle,
                _impact_cm: (f64, f64),
                _rng: &mut StdRng,
            ) -> Result<Vec<f64>, SimulationUnavailable> {
                Err(SimulationUnavailable("test".into()))
            }
        }

        let response = PmtTraceResponse::new(AlwaysDown, NoUncertainties);
        let mut rng = StdRng::seed_from_u64(5);
        let particles = [vertical_particle(5, 0.0)];
        let observables = response.detector_response(
            &particles,
            &test_detector(),
            &ShowerGeometry {
                zenith: 0.0,
                azimuth: 0.0,
            },
            &mut rng,
        );
        // the shower survives; this detector just saw nothing
        assert_eq!(observables.n, 0.0);
        assert_eq!(observables.t, NO_SIGNAL_TIME);
    }

    #[test]
    fn test_cutoff_keeps_leptons_first() {
        let response = PmtTraceResponse {
            cutoff_number_of_particles: Some(3),
            ..PmtTraceResponse::new(ScintillationYield::default(), NoUncertainties)
        };
        let mut rng = StdRng::seed_from_u64(4);
        let particles: Vec<GroundParticle> = (0..3)
            .map(|i| vertical_particle(1, i as f64))
            .chain((0..3).map(|i| vertical_particle(5, i as f64)))
            .collect();
        let capped = response.capped(&particles, &mut rng);
        assert_eq!(capped.len(), 3);
        assert!(capped.iter().all(|p| p.species.is_muon()));
    }
}
