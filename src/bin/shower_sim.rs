//! Simulate air showers from a ground-particle table on a demo array.
//!
//! # Usage
//!
//! ```bash
//! # 100 showers of a vertical 1 PeV dataset on two ring stations
//! cargo run --release --bin shower_sim -- \
//!     --particles groundparticles.csv --output-dir out -n 100
//!
//! # inclined shower, errorless timing, fixed seed
//! cargo run --release --bin shower_sim -- \
//!     --particles groundparticles.csv --output-dir out \
//!     --zenith-deg 22.5 --errorless --seed 7
//!
//! # run parameters from a JSON file instead of flags
//! cargo run --release --bin shower_sim -- \
//!     --particles groundparticles.csv --output-dir out --config run.json
//! ```
//!
//! The particle file is CSV with one header line and the columns
//! `particle_id,x,y,t,p_x,p_y,p_z,observation_level` (m, ns, eV/c).
//! Outputs land in `--output-dir`: one `events_s<number>.csv` per
//! station, `coincidences.csv` and `coincidence_index.csv`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use scintarray::{
    Cluster, CsvSink, ErrorlessSimulation, GroundParticle, ParticleDataset, ParticleTable,
    RunConfig, RunSummary, ShowerInfo, Species, StandardSimulation,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ground-particle CSV file
    #[arg(long)]
    particles: PathBuf,

    /// Directory for the output tables (created if missing)
    #[arg(long)]
    output_dir: PathBuf,

    /// JSON run configuration; overrides -n / --seed / --max-core-distance
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of showers to simulate
    #[arg(short, long, default_value_t = 10)]
    n: usize,

    /// RNG seed for a reproducible run
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Maximum core distance to the array center (m)
    #[arg(long, default_value_t = 400.0)]
    max_core_distance: f64,

    /// Shower zenith of the dataset (degrees)
    #[arg(long, default_value_t = 0.0)]
    zenith_deg: f64,

    /// Intrinsic shower azimuth of the dataset (degrees)
    #[arg(long, default_value_t = 0.0)]
    azimuth_deg: f64,

    /// Primary energy of the dataset (eV)
    #[arg(long, default_value_t = 1e15)]
    energy: f64,

    /// Shower size (electron count at the observation level)
    #[arg(long, default_value_t = 1e4)]
    size: f64,

    /// Number of four-detector stations on the demo ring
    #[arg(long, default_value_t = 2)]
    stations: u32,

    /// Ring radius of the demo array (m)
    #[arg(long, default_value_t = 100.0)]
    spacing: f64,

    /// Disable all timing and signal uncertainties
    #[arg(long)]
    errorless: bool,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,
}

fn load_particles(path: &PathBuf) -> Result<ParticleTable> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("cannot read particle file {}", path.display()))?;

    let mut rows = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if lineno == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 8 {
            anyhow::bail!(
                "{}:{}: expected 8 columns, found {}",
                path.display(),
                lineno + 1,
                fields.len()
            );
        }
        let parse = |i: usize| -> Result<f64> {
            fields[i]
                .parse()
                .with_context(|| format!("{}:{}: bad number {:?}", path.display(), lineno + 1, fields[i]))
        };
        rows.push(GroundParticle {
            species: Species::from_code(parse(0)? as u8),
            x: parse(1)?,
            y: parse(2)?,
            t: parse(3)?,
            p_x: parse(4)?,
            p_y: parse(5)?,
            p_z: parse(6)?,
            observation_level: parse(7)?,
        });
    }
    Ok(ParticleTable::from_rows(rows))
}

fn run_config(cli: &Cli) -> Result<RunConfig> {
    if let Some(path) = &cli.config {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("cannot read run config {}", path.display()))?;
        let mut config: RunConfig = serde_json::from_str(&contents)
            .with_context(|| format!("invalid run config {}", path.display()))?;
        config.progress |= cli.progress;
        Ok(config)
    } else {
        Ok(RunConfig {
            n: cli.n,
            seed: cli.seed,
            max_core_distance: cli.max_core_distance,
            progress: cli.progress,
            ..RunConfig::default()
        })
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let table = load_particles(&cli.particles)?;
    info!("loaded {} ground particles", table.len());

    let dataset = ParticleDataset::new(
        table,
        ShowerInfo {
            zenith: cli.zenith_deg.to_radians(),
            azimuth: cli.azimuth_deg.to_radians(),
            energy: cli.energy,
            size: cli.size,
            particle: Species::Other(14),
        },
    );

    let cluster = if cli.stations == 1 {
        Cluster::single_four_detector()
    } else {
        Cluster::ring(cli.stations, cli.spacing)
    };
    let config = run_config(&cli)?;

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("cannot create {}", cli.output_dir.display()))?;
    let mut sink = CsvSink::create(&cli.output_dir, &cluster, config.save_detailed_traces)
        .with_context(|| format!("cannot create output tables in {}", cli.output_dir.display()))?;

    let summary: RunSummary = if cli.errorless {
        let mut simulation = ErrorlessSimulation::errorless(dataset, cluster, config)?;
        let summary = simulation.run(&mut sink);
        simulation.finish();
        summary
    } else {
        let mut simulation = StandardSimulation::standard(dataset, cluster, config)?;
        let summary = simulation.run(&mut sink);
        simulation.finish();
        summary
    };
    sink.flush()?;

    println!(
        "{} trials: {} station events, {} coincidences",
        summary.trials, summary.events, summary.coincidences
    );
    Ok(())
}
