//! The shower/cluster orchestrator.
//!
//! Drives repeated trials against one ground-particle dataset: generate
//! shower parameters, place the cluster relative to the core, run
//! selection and response per detector, evaluate the station trigger,
//! timestamp firing stations and persist events plus the per-trial
//! coincidence. The selection, response and trigger stages are injected
//! strategies, so each simulation variant is a composition rather than a
//! subclass.

use indicatif::ProgressBar;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use thiserror::Error;

use crate::algo::norm_angle;
use crate::cluster::{Cluster, ClusterTransform, ResolvedStation};
use crate::gps::{simulate_gps, GpsTimestamp};
use crate::particles::ParticleDataset;
use crate::response::mips::{FieldUncertainties, MipsResponse, NoUncertainties, UncertaintyModel};
use crate::response::trace::{PmtTraceResponse, ScintillationYield};
use crate::response::{DetectorObservables, ResponseModel};
use crate::selection::{FootprintSelector, ParticleSelector, ShowerGeometry, SquareSelector};
use crate::shower::{generate_azimuth, CorePosition, ShowerParameters};
use crate::storage::{CoincidenceRow, EventSink, StationEvent};
use crate::trigger::{DensityPreTrigger, ThresholdTrigger, TriggerPolicy};

/// Fatal configuration problems, raised at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("station {number} has {n_detectors} detectors; the trigger supports only 2 or 4")]
    UnsupportedTopology { number: u32, n_detectors: usize },
    #[error("cluster has no stations")]
    EmptyCluster,
    #[error("particle dataset is empty")]
    EmptyDataset,
    #[error("trial count must be at least 1")]
    InvalidTrialCount,
    #[error("max core distance must be positive, got {0}")]
    InvalidCoreDistance(f64),
}

/// Run-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of showers to simulate.
    pub n: usize,
    /// Seed of the process-wide generator; identical seeds reproduce runs
    /// bit for bit.
    pub seed: u64,
    /// Maximum core distance to the cluster origin (m).
    pub max_core_distance: f64,
    /// Cap on particles simulated per detector in the trace model.
    pub cutoff_number_of_particles: Option<usize>,
    /// Persist per-detector photon arrival times.
    pub save_detailed_traces: bool,
    /// Show a progress bar over the trial loop.
    pub progress: bool,
    /// Run epoch in seconds; trials are stamped one second apart from it.
    pub epoch: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n: 1,
            seed: 0,
            max_core_distance: 400.0,
            cutoff_number_of_particles: Some(10),
            save_detailed_traces: false,
            progress: false,
            epoch: 1_600_000_000,
        }
    }
}

/// Counters of one completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub trials: usize,
    pub events: usize,
    pub coincidences: usize,
}

/// The simulation of one dataset thrown repeatedly onto a cluster.
pub struct GroundParticleSimulation<S, R, T, U>
where
    S: ParticleSelector,
    R: ResponseModel,
    T: TriggerPolicy,
    U: UncertaintyModel,
{
    dataset: ParticleDataset,
    cluster: Cluster,
    selector: S,
    response: R,
    trigger: T,
    uncertainties: U,
    core: CorePosition,
    pretrigger: Option<DensityPreTrigger>,
    config: RunConfig,
    rng: StdRng,
}

/// The standard composition: square selection, statistical mips response,
/// deployed trigger thresholds, measured uncertainties.
pub type StandardSimulation =
    GroundParticleSimulation<SquareSelector, MipsResponse<FieldUncertainties>, ThresholdTrigger, FieldUncertainties>;

/// The error-free composition: perfect timing and plain particle counting.
pub type ErrorlessSimulation =
    GroundParticleSimulation<SquareSelector, MipsResponse<NoUncertainties>, ThresholdTrigger, NoUncertainties>;

impl StandardSimulation {
    pub fn standard(
        dataset: ParticleDataset,
        cluster: Cluster,
        config: RunConfig,
    ) -> Result<Self, ConfigError> {
        let core = CorePosition::UniformDisc {
            r_max: config.max_core_distance,
        };
        Self::new(
            dataset,
            cluster,
            SquareSelector::default(),
            MipsResponse::new(FieldUncertainties::default()),
            ThresholdTrigger::signal(),
            FieldUncertainties::default(),
            core,
            config,
        )
    }
}

impl ErrorlessSimulation {
    pub fn errorless(
        dataset: ParticleDataset,
        cluster: Cluster,
        config: RunConfig,
    ) -> Result<Self, ConfigError> {
        let core = CorePosition::UniformDisc {
            r_max: config.max_core_distance,
        };
        Self::new(
            dataset,
            cluster,
            SquareSelector::default(),
            MipsResponse::new(NoUncertainties),
            ThresholdTrigger::signal(),
            NoUncertainties,
            core,
            config,
        )
    }
}

/// The photon-transport composition: exact rotated-footprint selection
/// including gammas and the housing enlargement, full PMT trace
/// synthesis, pulse-height trigger thresholds.
pub type PhotonTransportSimulation = GroundParticleSimulation<
    FootprintSelector,
    PmtTraceResponse<ScintillationYield, FieldUncertainties>,
    ThresholdTrigger,
    FieldUncertainties,
>;

impl PhotonTransportSimulation {
    pub fn with_photon_transport(
        dataset: ParticleDataset,
        cluster: Cluster,
        config: RunConfig,
    ) -> Result<Self, ConfigError> {
        let mut response =
            PmtTraceResponse::new(ScintillationYield::default(), FieldUncertainties::default());
        response.cutoff_number_of_particles = config.cutoff_number_of_particles;
        let core = CorePosition::UniformDisc {
            r_max: config.max_core_distance,
        };
        Self::new(
            dataset,
            cluster,
            FootprintSelector::with_housing(),
            response,
            ThresholdTrigger::pulse_height(),
            FieldUncertainties::default(),
            core,
            config,
        )
    }
}

impl<S, R, T, U> GroundParticleSimulation<S, R, T, U>
where
    S: ParticleSelector,
    R: ResponseModel,
    T: TriggerPolicy,
    U: UncertaintyModel,
{
    /// Build a simulation, validating topology and configuration and
    /// drawing the per-run station and detector timing offsets.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dataset: ParticleDataset,
        mut cluster: Cluster,
        selector: S,
        response: R,
        trigger: T,
        uncertainties: U,
        core: CorePosition,
        config: RunConfig,
    ) -> Result<Self, ConfigError> {
        if cluster.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }
        for station in cluster.stations() {
            let n_detectors = station.detectors.len();
            if n_detectors != 2 && n_detectors != 4 {
                return Err(ConfigError::UnsupportedTopology {
                    number: station.number,
                    n_detectors,
                });
            }
        }
        if dataset.table().is_empty() {
            return Err(ConfigError::EmptyDataset);
        }
        if config.n == 0 {
            return Err(ConfigError::InvalidTrialCount);
        }
        if config.max_core_distance <= 0.0 {
            return Err(ConfigError::InvalidCoreDistance(config.max_core_distance));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);

        // Per-run timing offsets: drawn once here, constant for the whole
        // run.
        for station in cluster.stations_mut() {
            station.set_gps_offset(uncertainties.station_offset(&mut rng));
            for detector in &mut station.detectors {
                detector.set_offset(uncertainties.detector_offset(&mut rng));
            }
            debug!(
                "station {}: gps offset {:.2} ns",
                station.number,
                station.gps_offset()
            );
        }

        Ok(Self {
            dataset,
            cluster,
            selector,
            response,
            trigger,
            uncertainties,
            core,
            pretrigger: None,
            config,
            rng,
        })
    }

    /// Install a density pre-trigger: showers it rejects skip the full
    /// response simulation entirely.
    pub fn with_pretrigger(mut self, pretrigger: DensityPreTrigger) -> Self {
        self.pretrigger = Some(pretrigger);
        self
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Simulate all configured trials, persisting into `sink`.
    pub fn run(&mut self, sink: &mut dyn EventSink) -> RunSummary {
        let info = *self.dataset.info();
        let geometry = ShowerGeometry {
            zenith: info.zenith,
            azimuth: info.azimuth,
        };

        let bar = if self.config.progress {
            ProgressBar::new(self.config.n as u64)
        } else {
            ProgressBar::hidden()
        };

        let mut summary = RunSummary {
            trials: self.config.n,
            ..RunSummary::default()
        };

        for shower_id in 0..self.config.n {
            let parameters = ShowerParameters {
                ext_timestamp: (self.config.epoch + shower_id as u64) * 1_000_000_000,
                core_pos: self.core.sample(&mut self.rng),
                azimuth: generate_azimuth(&mut self.rng),
                zenith: info.zenith,
                size: info.size,
                energy: info.energy,
                particle: info.particle,
            };

            // Align the dataset's intrinsic azimuth with the desired one
            // and put the core at the array origin.
            let alpha = norm_angle(parameters.azimuth - info.azimuth);
            let transform = ClusterTransform::for_shower(parameters.core_pos, alpha);
            let resolved: Vec<ResolvedStation> = self
                .cluster
                .stations()
                .iter()
                .map(|station| station.resolve(&transform))
                .collect();

            if !self.passes_pretrigger(&resolved, &geometry) {
                bar.inc(1);
                continue;
            }

            let station_events = self.simulate_stations(
                &resolved,
                &geometry,
                &parameters,
                sink,
            );
            summary.events += station_events.len();

            if !station_events.is_empty() && self.cluster.len() > 1 {
                self.store_coincidence(shower_id as u64, &parameters, &station_events, sink);
                summary.coincidences += 1;
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        info!(
            "run complete: {} trials, {} station events, {} coincidences",
            summary.trials, summary.events, summary.coincidences
        );
        summary
    }

    /// Release the dataset handle. Dropping the simulation has the same
    /// effect; this makes the hand-back explicit at the call site.
    pub fn finish(self) {}

    fn passes_pretrigger(
        &self,
        resolved: &[ResolvedStation],
        geometry: &ShowerGeometry,
    ) -> bool {
        let Some(pretrigger) = &self.pretrigger else {
            return true;
        };
        let counts: Vec<Vec<usize>> = resolved
            .iter()
            .map(|station| {
                station
                    .detectors
                    .iter()
                    .map(|detector| {
                        self.selector
                            .particles_in(self.dataset.table(), detector, geometry)
                            .len()
                    })
                    .collect()
            })
            .collect();
        pretrigger(&counts)
    }

    fn simulate_stations(
        &mut self,
        resolved: &[ResolvedStation],
        geometry: &ShowerGeometry,
        parameters: &ShowerParameters,
        sink: &mut dyn EventSink,
    ) -> Vec<(usize, usize, GpsTimestamp, u32)> {
        let mut station_events = Vec::new();
        for (station_id, station) in resolved.iter().enumerate() {
            let observables: Vec<DetectorObservables> = station
                .detectors
                .iter()
                .map(|detector| {
                    let particles =
                        self.selector
                            .particles_in(self.dataset.table(), detector, geometry);
                    self.response
                        .detector_response(&particles, detector, geometry, &mut self.rng)
                })
                .collect();

            if !self.trigger.station_fires(&observables) {
                continue;
            }

            // The trigger and timestamp stages must agree: without a
            // timestamp the station does not fire.
            let uncertainty = self.uncertainties.gps_uncertainty(&mut self.rng);
            if let Some((stamp, trigger_time)) = simulate_gps(
                &observables,
                parameters.ext_timestamp,
                station.gps_offset,
                uncertainty,
            ) {
                let event = StationEvent::assemble(
                    &observables,
                    stamp,
                    trigger_time,
                    parameters,
                    self.config.save_detailed_traces,
                );
                let row = sink.append_event(station_id, &event);
                station_events.push((station_id, row, stamp, station.number));
            }
        }
        station_events
    }

    fn store_coincidence(
        &self,
        shower_id: u64,
        parameters: &ShowerParameters,
        station_events: &[(usize, usize, GpsTimestamp, u32)],
        sink: &mut dyn EventSink,
    ) {
        let Some(earliest) = station_events
            .iter()
            .map(|&(_, _, stamp, _)| stamp)
            .min_by_key(|stamp| stamp.ext_timestamp)
        else {
            return;
        };

        let station_flags = self
            .cluster
            .stations()
            .iter()
            .map(|station| {
                let fired = station_events
                    .iter()
                    .any(|&(_, _, _, number)| number == station.number);
                (station.number, fired)
            })
            .collect();

        let coincidence = CoincidenceRow {
            id: shower_id,
            n_stations: station_events.len() as u32,
            station_flags,
            ext_timestamp: earliest.ext_timestamp,
            timestamp: earliest.timestamp,
            nanoseconds: earliest.nanoseconds,
            x: parameters.core_pos.0,
            y: parameters.core_pos.1,
            zenith: parameters.zenith,
            azimuth: parameters.azimuth,
            size: parameters.size,
            energy: parameters.energy,
        };
        let index: Vec<(usize, usize)> = station_events
            .iter()
            .map(|&(station_id, row, _, _)| (station_id, row))
            .collect();
        sink.append_coincidence(&coincidence, &index);
    }
}
