mod io;

use anyhow::{Context, Result};
use centerline::diagnostics::{Diagnostics, LayerStack};
use centerline::pipeline::{PipelineInputs, realign};
use clap::Parser;
use log::info;
use std::path::PathBuf;

/// Realigns one road centerline against a laser-scan point cloud.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Point cloud as CSV: x,y,z,intensity,classification,scan_angle,pass_id
    #[arg(long)]
    points: PathBuf,

    /// Reference centerline as GeoJSON
    #[arg(long)]
    centerline: PathBuf,

    /// Ground elevation grid (JSON)
    #[arg(long)]
    ground: Option<PathBuf>,

    /// Precomputed conductivity grid (JSON); skips feature extraction
    #[arg(long)]
    conductivity: Option<PathBuf>,

    /// Water body polygons as GeoJSON
    #[arg(long)]
    water: Option<PathBuf>,

    #[arg(long, env = "REALIGN_CONFIG")]
    config: Option<PathBuf>,

    /// Output GeoJSON file; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write every intermediate grid into this directory
    #[arg(long, env = "REALIGN_DUMP_LAYERS")]
    dump_layers: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let cfg = io::read_config(args.config.as_deref())?;
    let cloud = io::read_points(&args.points)?;
    let line = io::read_centerline(&args.centerline)?;
    let ground = args.ground.as_deref().map(io::read_grid).transpose()?;
    let conductivity = args.conductivity.as_deref().map(io::read_grid).transpose()?;
    let water = args.water.as_deref().map(io::read_water).transpose()?;
    info!(
        "Loaded {} points and a {}-vertex centerline",
        cloud.len(),
        line.0.len()
    );

    let inputs = PipelineInputs {
        cloud: &cloud,
        ground: ground.as_ref(),
        conductivity: conductivity.as_ref(),
        water: water.as_ref(),
        centerline: &line,
    };

    let mut layers = LayerStack::new();
    let diagnostics: Option<&mut dyn Diagnostics> = match args.dump_layers {
        Some(_) => Some(&mut layers),
        None => None,
    };
    let result = realign(&inputs, &cfg, diagnostics).context("realigning centerline")?;

    if result.fallback {
        info!("No path between anchors, wrote the reference line unchanged");
    }
    io::write_feature(io::result_feature(&result), args.output.as_deref())?;

    if let Some(dir) = &args.dump_layers {
        info!("Writing {} diagnostic layers to {}", layers.len(), dir.display());
        io::dump_layers(dir, layers.into_layers())?;
    }
    Ok(())
}
