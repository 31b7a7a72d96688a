//! LookOut Control - CLI client for the lookoutd incident pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lookout_shared::{parse_point, GeoPoint, VERSION};
use lookoutctl::client::{FrameUpload, LookoutClient, DEFAULT_URL};
use lookoutctl::{display, seed};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lookoutctl")]
#[command(about = "LookOut - traffic incident pipeline client", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Daemon base URL
    #[arg(long, global = true, default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon health
    Health,

    /// Upload one frame through the full pipeline
    Process {
        /// Image file
        image: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Trip destination latitude for rerouting
        #[arg(long, allow_hyphen_values = true, requires = "dest_lon")]
        dest_lat: Option<f64>,

        /// Trip destination longitude for rerouting
        #[arg(long, allow_hyphen_values = true, requires = "dest_lat")]
        dest_lon: Option<f64>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List recent incidents
    Incidents {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one incident
    Incident { id: i64 },

    /// Find past incidents by description
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Save an incident's archived frame to a file
    Frame {
        id: i64,

        /// Output file (defaults to incident_<id>.jpg)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Plan a route around points to avoid
    Route {
        /// Origin as "lat,lon"
        #[arg(long, allow_hyphen_values = true)]
        from: String,

        /// Destination as "lat,lon"
        #[arg(long, allow_hyphen_values = true)]
        to: String,

        /// Points to avoid as "lat,lon;lat,lon"
        #[arg(long, allow_hyphen_values = true)]
        avoid: Option<String>,
    },

    /// Process every feed image in a directory (named lat_lon_type.jpg)
    Seed { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = LookoutClient::new(&cli.url)?;

    match cli.command {
        Commands::Health => display::print_health(&client.health().await?),
        Commands::Process {
            image,
            lat,
            lon,
            dest_lat,
            dest_lon,
            json,
        } => {
            let upload = FrameUpload {
                image: std::fs::read(&image)
                    .with_context(|| format!("Cannot read {}", image.display()))?,
                location: GeoPoint::new(lat, lon),
                filename: image
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned()),
                destination: dest_lat.zip(dest_lon).map(|(lat, lon)| GeoPoint::new(lat, lon)),
            };
            if json {
                let raw = client.process_raw(&upload).await?;
                println!("{}", serde_json::to_string_pretty(&raw)?);
            } else {
                display::print_report(&client.process(&upload).await?);
            }
        }
        Commands::Incidents { limit } => display::print_incidents(&client.incidents(limit).await?),
        Commands::Incident { id } => display::print_incident(&client.incident(id).await?),
        Commands::Search { query, limit } => {
            display::print_search(&client.search(&query, limit).await?)
        }
        Commands::Frame { id, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(format!("incident_{}.jpg", id)));
            let bytes = client.frame(id).await?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Cannot write {}", output.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), output.display());
        }
        Commands::Route { from, to, avoid } => {
            let from = parse_point(&from)?;
            let to = parse_point(&to)?;
            display::print_route(&client.route(from, to, avoid.as_deref()).await?);
        }
        Commands::Seed { dir } => seed_dir(&client, &dir).await?,
    }
    Ok(())
}

async fn seed_dir(client: &LookoutClient, dir: &Path) -> Result<()> {
    let (images, skipped) = seed::scan_feed_dir(dir)?;
    for path in &skipped {
        eprintln!(
            "{} {} (cannot parse lat_lon from filename)",
            "skip".yellow(),
            path.display()
        );
    }
    if images.is_empty() {
        println!("No feed images found in {}", dir.display());
        return Ok(());
    }

    let mut processed = 0;
    for feed in &images {
        let name = feed
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let upload = FrameUpload {
            image: std::fs::read(&feed.path)
                .with_context(|| format!("Cannot read {}", feed.path.display()))?,
            location: feed.location,
            filename: Some(feed.hint.clone()),
            destination: None,
        };
        match client.process(&upload).await {
            Ok(report) => {
                processed += 1;
                println!(
                    "{}  #{} {} {}/10 -> {}",
                    name,
                    report.incident.id,
                    report.incident.event_type,
                    report.incident.rating,
                    report.decision.action
                );
            }
            Err(e) => eprintln!("{} {}: {:#}", "fail".red(), name, e),
        }
    }
    println!("Processed {} feed images", processed);
    Ok(())
}
