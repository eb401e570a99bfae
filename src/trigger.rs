//! Station trigger policies.
//!
//! A trigger policy is a pure function of the per-detector observable
//! bundles; it never touches the particle table or the RNG, so alternative
//! policies (and the cheap density pre-trigger) substitute freely at the
//! same seam.

use crate::response::DetectorObservables;

/// Which observable a threshold trigger compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerChannel {
    /// The mips-equivalent signal `n` (fast statistical model).
    Signal,
    /// The pulse height in mV (trace model).
    PulseHeight,
}

/// The deployed station trigger: low/high thresholds on one channel.
///
/// * 4-detector station: at least two detectors above high, or at least
///   three above low.
/// * 2-detector station: both detectors above low.
///
/// No other station sizes are supported; cluster topology is validated
/// when a simulation is constructed.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdTrigger {
    pub channel: TriggerChannel,
    pub low: f64,
    pub high: f64,
}

impl ThresholdTrigger {
    /// Thresholds in mips for the statistical response model.
    pub fn signal() -> Self {
        Self {
            channel: TriggerChannel::Signal,
            low: 0.3,
            high: 0.5,
        }
    }

    /// Thresholds in mV for the trace response model.
    pub fn pulse_height() -> Self {
        Self {
            channel: TriggerChannel::PulseHeight,
            low: 30.0,
            high: 70.0,
        }
    }

    fn value(&self, observables: &DetectorObservables) -> f64 {
        match self.channel {
            TriggerChannel::Signal => observables.n,
            TriggerChannel::PulseHeight => observables.pulse_height,
        }
    }
}

/// Strategy seam for the station firing decision.
pub trait TriggerPolicy {
    /// Whether the station fires on these per-detector observables.
    fn station_fires(&self, detectors: &[DetectorObservables]) -> bool;
}

impl TriggerPolicy for ThresholdTrigger {
    fn station_fires(&self, detectors: &[DetectorObservables]) -> bool {
        let above_low = detectors.iter().filter(|d| self.value(d) > self.low).count();
        let above_high = detectors
            .iter()
            .filter(|d| self.value(d) > self.high)
            .count();

        match detectors.len() {
            4 => above_high >= 2 || above_low >= 3,
            2 => above_low >= 2,
            _ => false,
        }
    }
}

/// Cheap pre-trigger over raw per-detector particle counts, evaluated for
/// every station of the cluster before any response simulation runs.
///
/// The predicate may only veto a shower; it can never make more stations
/// fire than the full pipeline would.
pub type DensityPreTrigger = Box<dyn Fn(&[Vec<usize>]) -> bool>;

/// A pre-trigger requiring at least `min_particles` raw particles in at
/// least `min_detectors` detectors of some station.
pub fn min_density_pretrigger(min_detectors: usize, min_particles: usize) -> DensityPreTrigger {
    Box::new(move |stations: &[Vec<usize>]| {
        stations.iter().any(|counts| {
            counts.iter().filter(|&&n| n >= min_particles).count() >= min_detectors
        })
    })
}
