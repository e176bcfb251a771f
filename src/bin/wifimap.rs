use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, error, info, warn};
use serde::Deserialize;

use wifimap::{ClusterStore, Coordinate, Error, NetworkObservation, Result, WifiMapConfig};

#[derive(Parser, Debug)]
#[command(name = "wifimap", about = "Cluster Wi-Fi scans by location and export the result")]
struct Cli {
    /// INI configuration file
    #[arg(short, long, default_value = "wifimap.ini")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed recorded samples (one JSON object per line) into the store
    Ingest {
        samples: PathBuf,
    },
    /// Print how many networks and clusters have been captured
    Count,
    /// Write the cluster set to a file
    Export {
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Defaults to <export_dir>/wifi_map_data.json (or .csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the effective configuration and store statistics
    Info,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExportFormat {
    Json,
    Csv,
}

/// One line of a samples file
#[derive(Debug, Deserialize)]
struct Sample {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    observations: Vec<NetworkObservation>,
}

fn load_config(path: &Path) -> Result<WifiMapConfig> {
    if path.exists() {
        WifiMapConfig::from_ini(path)
    } else {
        let config = WifiMapConfig::default();
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(config: &WifiMapConfig) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, config.logging.get_log_level());

    if let Some(log_path) = &config.files.log_file {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let log_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn ingest_file(store: &ClusterStore, path: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    let (mut ingested, mut empty, mut skipped) = (0usize, 0usize, 0usize);

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let sample: Sample = match serde_json::from_str(&line) {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Line {}: skipping unparseable sample: {}", line_num + 1, e);
                skipped += 1;
                continue;
            }
        };

        let location = Coordinate::new(sample.latitude, sample.longitude);
        match store.ingest(location, &sample.observations) {
            Ok(Some(cluster_id)) => {
                debug!("Line {}: {} networks -> cluster {}", line_num + 1, sample.observations.len(), cluster_id);
                ingested += 1;
            }
            Ok(None) => empty += 1,
            Err(Error::InvalidLocation(reason)) => {
                warn!("Line {}: skipping sample: {}", line_num + 1, reason);
                skipped += 1;
            }
            Err(Error::PersistenceWriteFailed(reason)) => {
                // Kept in memory; the flush on close tries again
                error!("Line {}: write-through failed: {}", line_num + 1, reason);
                ingested += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!("Ingested {} samples ({} empty, {} skipped) from {:?}", ingested, empty, skipped, path);
    println!(
        "Ingested {} samples ({} empty, {} skipped); {} networks in {} clusters",
        ingested, empty, skipped, store.network_count(), store.cluster_count()
    );
    Ok(())
}

fn export(store: &ClusterStore, config: &WifiMapConfig, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| {
        let default = config.files.default_export_path();
        match format {
            ExportFormat::Json => default,
            ExportFormat::Csv => default.with_extension("csv"),
        }
    });

    let text = match format {
        ExportFormat::Json => store.export_snapshot()?,
        ExportFormat::Csv => store.export_csv()?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&path, text)?;

    info!("Exported {} clusters to {:?}", store.cluster_count(), path);
    println!("Data exported to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config)?;

    info!("Starting wifimap with log level: {:?}", config.logging.get_log_level());
    debug!("{}", config.describe());

    let store = ClusterStore::open(&config)?;

    match cli.command {
        Command::Ingest { samples } => ingest_file(&store, &samples)?,
        Command::Count => {
            println!("[Networks Captured]: {}", store.network_count());
            println!("[Clusters]: {}", store.cluster_count());
        }
        Command::Export { format, output } => export(&store, &config, format, output)?,
        Command::Info => {
            let stats = store.stats();
            println!("{}", config.describe());
            println!("Clusters: {}", stats.clusters);
            println!("Networks: {} ({} distinct BSSIDs)", stats.networks, stats.distinct_bssids);
            println!("Pending writes: {}", stats.pending_writes);
        }
    }

    store.close()
}
