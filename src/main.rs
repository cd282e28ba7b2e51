use std::path::{Path, PathBuf};
use std::time::Instant;
use std::fs;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use image::{DynamicImage, Primitive};

use region_features_lib::config::{Config, Selection};
use region_features_lib::image_io::{
    load_channel, load_image, load_partition, save_float_image, save_image, GrayInput,
};
use region_features_lib::{
    central, enumerate, DirectionalFilter, GrayImageOf, MeasurementAggregator, NdImage,
    NearestCentroidLocator, ObjectMeasurementTable,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Directional morphology and per-object measurements")]
struct Args {
    /// Path to configuration file (defaults are used when absent)
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the directional filter bank on a grayscale image
    Filter {
        /// Input image
        #[clap(short, long)]
        input: PathBuf,

        /// Directory for the per-direction layers
        #[clap(short, long)]
        output_dir: PathBuf,
    },

    /// Measure every object of a label image and print the table as JSON
    Measure {
        /// Label image (0 = background)
        #[clap(short, long)]
        labels: PathBuf,

        /// Intensity channel as NAME=PATH; may be repeated
        #[clap(long = "channel", value_parser = parse_channel)]
        channels: Vec<(String, PathBuf)>,
    },
}

fn parse_channel(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", s)),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;

    let start_time = Instant::now();

    match args.command {
        Command::Filter { input, output_dir } => run_filter(&config, input, output_dir)?,
        Command::Measure { labels, channels } => run_measure(&config, labels, channels)?,
    }

    tracing::info!("Completed in {:.2} seconds", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn run_filter(config: &Config, input: PathBuf, output_dir: PathBuf) -> anyhow::Result<()> {
    let input_image = load_image(&input)
        .with_context(|| format!("loading {}", input.display()))?;
    fs::create_dir_all(&output_dir)?;

    let filter = config.directional_filter();
    let (width, height) = input_image.image.dimensions();
    tracing::info!(
        "Filtering {} ({}x{}, {}-bit) with {} over {} directions",
        input_image.filename,
        width,
        height,
        input_image.image.bit_depth(),
        filter.operation,
        filter.directions
    );

    // Layers keep the bit depth of the input
    let written = match &input_image.image {
        GrayInput::Luma8(image) => {
            write_layers(config, &filter, image, &input_image.filename, &output_dir)?
        }
        GrayInput::Luma16(image) => {
            write_layers(config, &filter, image, &input_image.filename, &output_dir)?
        }
    };

    tracing::info!("Wrote {} layers to {}", written, output_dir.display());
    Ok(())
}

fn write_layers<P>(
    config: &Config,
    filter: &DirectionalFilter,
    image: &GrayImageOf<P>,
    filename: &str,
    output_dir: &Path,
) -> anyhow::Result<usize>
where
    P: Primitive + Send + Sync,
    GrayImageOf<P>: Into<DynamicImage>,
{
    let stack = filter.apply_with_progress(image, |done, total| {
        tracing::debug!("{}/{} directions", done, total);
    })?;

    if let Some(projection) = config.filter.projection {
        let projected = stack.project(projection)?;
        let suffix = format!("{:?}", projection).to_lowercase();
        let path = output_dir.join(format!("{}_{}.png", filename, suffix));
        save_float_image(&projected, &path)?;
        tracing::info!("Wrote projection to {}", path.display());
    }

    let angles = stack.angles().to_vec();
    let layers = stack.into_layers();
    let count = layers.len();
    for (i, (angle, layer)) in angles.into_iter().zip(layers).enumerate() {
        let path = output_dir.join(format!("{}_dir{:03}.png", filename, i));
        save_image(layer, &path)?;
        tracing::debug!("Wrote layer {} ({:.2} degrees) to {}", i, angle, path.display());
    }

    Ok(count)
}

fn run_measure(
    config: &Config,
    labels: PathBuf,
    channels: Vec<(String, PathBuf)>,
) -> anyhow::Result<()> {
    let partition = load_partition(&labels)
        .with_context(|| format!("loading labels {}", labels.display()))?;
    let calibration = config.calibration_for(partition.ndim())?;

    let all = enumerate(&partition);
    let regions = match config.measure.selection {
        Selection::All => all,
        Selection::Largest => {
            let label = all.largest()?.label();
            all.select_labels(&[label])
        }
        Selection::Central => {
            let region = central(&partition, config.measure.central_radius, &NearestCentroidLocator)?;
            all.select_labels(&[region.label()])
        }
    };

    // Load every channel before measuring so a bad path leaves no partial table
    let mut loaded: Vec<(String, NdImage<u16>)> = Vec::with_capacity(channels.len());
    for (name, path) in channels {
        if loaded.iter().any(|(n, _)| *n == name) {
            bail!("channel name '{}' given more than once", name);
        }
        let channel = load_channel(&path)
            .with_context(|| format!("loading channel {} from {}", name, path.display()))?;
        loaded.push((name, channel));
    }

    let aggregator = MeasurementAggregator::from_regions(regions).parallel(config.use_parallel);
    let mut table = ObjectMeasurementTable::new();

    aggregator.position(&mut table, &calibration)?;
    aggregator.pixel_size(&mut table);
    aggregator.calibrated_size(&mut table, &calibration)?;
    aggregator.bounding_box(&mut table, &calibration)?;
    for (name, channel) in &loaded {
        aggregator.summed_intensity(&mut table, name, channel)?;
        aggregator.mean_intensity(&mut table, name, channel)?;
    }
    if let Some(offset) = config.measure.background_offset {
        aggregator.background_offset(&mut table, offset);
    }

    tracing::info!("Measured {} objects", table.len());
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}
