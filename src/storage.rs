//! Event and coincidence persistence.
//!
//! The simulation core only needs an append-only sink: per-station event
//! rows (returning the row index), coincidence rows, and the cross-index
//! linking a coincidence to its `(station, event_row)` pairs. A Vec-backed
//! [`MemorySink`] serves tests and in-process analysis; [`CsvSink`] writes
//! one events file per station plus coincidence and index files.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::cluster::Cluster;
use crate::gps::GpsTimestamp;
use crate::response::{DetectorObservables, NO_SIGNAL_TIME};
use crate::shower::ShowerParameters;

/// One persisted station event. Detector slots beyond the station's size
/// keep their defaults (`-1` counts, no-signal times).
#[derive(Debug, Clone, PartialEq)]
pub struct StationEvent {
    pub n: [f64; 4],
    pub t: [f64; 4],
    pub n_muons: [i32; 4],
    pub n_electrons: [i32; 4],
    pub n_gammas: [i32; 4],
    pub pulse_heights: [f64; 4],
    pub pulse_integrals: [f64; 4],
    pub ext_timestamp: u64,
    pub timestamp: u64,
    pub nanoseconds: u32,
    pub t_trigger: f64,
    pub zenith: f64,
    pub azimuth: f64,
    pub energy: f64,
    pub size: f64,
    pub core_distance: f64,
    /// Photon arrival times per detector, kept only when detailed traces
    /// are being saved.
    pub photon_times: Option<Vec<Vec<f64>>>,
}

impl StationEvent {
    /// Assemble an event row from per-detector observables and the
    /// station's GPS timestamp.
    pub fn assemble(
        detectors: &[DetectorObservables],
        gps: GpsTimestamp,
        t_trigger: f64,
        shower: &ShowerParameters,
        save_photon_times: bool,
    ) -> Self {
        let mut event = Self {
            n: [-1.0; 4],
            t: [NO_SIGNAL_TIME; 4],
            n_muons: [-1; 4],
            n_electrons: [-1; 4],
            n_gammas: [-1; 4],
            pulse_heights: [-1.0; 4],
            pulse_integrals: [-1.0; 4],
            ext_timestamp: gps.ext_timestamp,
            timestamp: gps.timestamp,
            nanoseconds: gps.nanoseconds,
            t_trigger,
            zenith: shower.zenith,
            azimuth: shower.azimuth,
            energy: shower.energy,
            size: shower.size,
            core_distance: shower.core_distance(),
            photon_times: None,
        };
        for (i, observables) in detectors.iter().enumerate().take(4) {
            event.n[i] = observables.n;
            event.t[i] = observables.t;
            event.n_muons[i] = observables.n_muons as i32;
            event.n_electrons[i] = observables.n_electrons as i32;
            event.n_gammas[i] = observables.n_gammas as i32;
            event.pulse_heights[i] = observables.pulse_height;
            event.pulse_integrals[i] = observables.pulse_integral;
        }
        if save_photon_times {
            event.photon_times = Some(
                detectors
                    .iter()
                    .map(|d| d.photon_times.clone().unwrap_or_default())
                    .collect(),
            );
        }
        event
    }
}

/// One persisted coincidence row.
#[derive(Debug, Clone, PartialEq)]
pub struct CoincidenceRow {
    /// Trial (shower) id.
    pub id: u64,
    /// Number of stations that fired.
    pub n_stations: u32,
    /// Fired flag per station, keyed by station number.
    pub station_flags: Vec<(u32, bool)>,
    pub ext_timestamp: u64,
    pub timestamp: u64,
    pub nanoseconds: u32,
    pub x: f64,
    pub y: f64,
    pub zenith: f64,
    pub azimuth: f64,
    pub size: f64,
    pub energy: f64,
}

/// Append-only persistence seam of the simulation.
pub trait EventSink {
    /// Append one station event; returns the row index within that
    /// station's event table.
    fn append_event(&mut self, station_id: usize, event: &StationEvent) -> usize;

    /// Append one coincidence with its `(station_id, event_row)`
    /// cross-references.
    fn append_coincidence(&mut self, coincidence: &CoincidenceRow, index: &[(usize, usize)]);
}

/// Vec-backed sink for tests and in-process analysis.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub events: Vec<Vec<StationEvent>>,
    pub coincidences: Vec<CoincidenceRow>,
    pub c_index: Vec<Vec<(usize, usize)>>,
}

impl MemorySink {
    pub fn new(n_stations: usize) -> Self {
        Self {
            events: vec![Vec::new(); n_stations],
            coincidences: Vec::new(),
            c_index: Vec::new(),
        }
    }
}

impl EventSink for MemorySink {
    fn append_event(&mut self, station_id: usize, event: &StationEvent) -> usize {
        let table = &mut self.events[station_id];
        table.push(event.clone());
        table.len() - 1
    }

    fn append_coincidence(&mut self, coincidence: &CoincidenceRow, index: &[(usize, usize)]) {
        self.coincidences.push(coincidence.clone());
        self.c_index.push(index.to_vec());
    }
}

/// CSV sink: `events_s<number>.csv` per station, `coincidences.csv` and
/// `coincidence_index.csv`, plus `photontimes_s<number>.csv` when detailed
/// traces are kept.
#[derive(Debug)]
pub struct CsvSink {
    stations: Vec<CsvStation>,
    coincidences: BufWriter<File>,
    index: BufWriter<File>,
}

#[derive(Debug)]
struct CsvStation {
    events: BufWriter<File>,
    photon_times: Option<BufWriter<File>>,
    rows: usize,
}

impl CsvSink {
    pub fn create(dir: &Path, cluster: &Cluster, save_photon_times: bool) -> io::Result<Self> {
        let mut stations = Vec::with_capacity(cluster.len());
        for station in cluster.stations() {
            let path = dir.join(format!("events_s{}.csv", station.number));
            let mut events = BufWriter::new(File::create(&path)?);
            writeln!(
                events,
                "event_id,n1,n2,n3,n4,t1,t2,t3,t4,\
                 pulseheight1,pulseheight2,pulseheight3,pulseheight4,\
                 integral1,integral2,integral3,integral4,\
                 timestamp,nanoseconds,ext_timestamp,t_trigger,\
                 zenith,azimuth,energy,size,core_distance"
            )?;
            let photon_times = if save_photon_times {
                let path = dir.join(format!("photontimes_s{}.csv", station.number));
                let mut writer = BufWriter::new(File::create(&path)?);
                writeln!(writer, "event_id,detector,arrival_times_ns")?;
                Some(writer)
            } else {
                None
            };
            stations.push(CsvStation {
                events,
                photon_times,
                rows: 0,
            });
            debug!("created event table {}", path.display());
        }

        let mut coincidences = BufWriter::new(File::create(dir.join("coincidences.csv"))?);
        let flags: Vec<String> = cluster
            .stations()
            .iter()
            .map(|s| format!("s{}", s.number))
            .collect();
        writeln!(
            coincidences,
            "id,N,timestamp,nanoseconds,ext_timestamp,x,y,zenith,azimuth,size,energy,{}",
            flags.join(",")
        )?;

        let mut index = BufWriter::new(File::create(dir.join("coincidence_index.csv"))?);
        writeln!(index, "coincidence_id,station_id,event_row")?;

        Ok(Self {
            stations,
            coincidences,
            index,
        })
    }

    /// Flush all buffered output.
    pub fn flush(&mut self) -> io::Result<()> {
        for station in &mut self.stations {
            station.events.flush()?;
            if let Some(writer) = &mut station.photon_times {
                writer.flush()?;
            }
        }
        self.coincidences.flush()?;
        self.index.flush()
    }

    fn write_event(station: &mut CsvStation, event: &StationEvent) -> io::Result<usize> {
        let row = station.rows;
        let join = |values: &[f64]| {
            values
                .iter()
                .map(|v| format!("{v:.6}"))
                .collect::<Vec<_>>()
                .join(",")
        };
        writeln!(
            station.events,
            "{},{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            row,
            join(&event.n),
            join(&event.t),
            join(&event.pulse_heights),
            join(&event.pulse_integrals),
            event.timestamp,
            event.nanoseconds,
            event.ext_timestamp,
            event.t_trigger,
            event.zenith,
            event.azimuth,
            event.energy,
            event.size,
            event.core_distance,
        )?;
        if let (Some(writer), Some(photon_times)) =
            (&mut station.photon_times, &event.photon_times)
        {
            for (detector, times) in photon_times.iter().enumerate() {
                let formatted: Vec<String> =
                    times.iter().map(|t| format!("{t:.3}")).collect();
                writeln!(writer, "{},{},{}", row, detector + 1, formatted.join(" "))?;
            }
        }
        station.rows += 1;
        Ok(row)
    }
}

impl EventSink for CsvSink {
    fn append_event(&mut self, station_id: usize, event: &StationEvent) -> usize {
        Self::write_event(&mut self.stations[station_id], event)
            .expect("failed to append station event")
    }

    fn append_coincidence(&mut self, coincidence: &CoincidenceRow, index: &[(usize, usize)]) {
        let flags: Vec<&str> = coincidence
            .station_flags
            .iter()
            .map(|&(_, fired)| if fired { "true" } else { "false" })
            .collect();
        writeln!(
            self.coincidences,
            "{},{},{},{},{},{:.3},{:.3},{:.6},{:.6},{:.6},{:.6},{}",
            coincidence.id,
            coincidence.n_stations,
            coincidence.timestamp,
            coincidence.nanoseconds,
            coincidence.ext_timestamp,
            coincidence.x,
            coincidence.y,
            coincidence.zenith,
            coincidence.azimuth,
            coincidence.size,
            coincidence.energy,
            flags.join(","),
        )
        .expect("failed to append coincidence");
        for &(station_id, event_row) in index {
            writeln!(self.index, "{},{},{}", coincidence.id, station_id, event_row)
                .expect("failed to append coincidence index");
        }
    }
}
