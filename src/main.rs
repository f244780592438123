//! geokit CLI - KML/KMZ, shapefile, UTM and IDW utilities

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, warn};

use geokit::distance::add_distance_columns;
use geokit::elevation::{ElevationCache, ElevationProvider, OpenElevationClient};
use geokit::interpolation::{AsciiGrid, GridSpec, IdwParams, cross_validate, idw, read_samples};
use geokit::kml::points::{PointsOptions, default_output as points_output, run_points};
use geokit::kml::merge_files;
use geokit::logging::{LogFormat, init_logging};
use geokit::shapefile::{WGS84_PRJ, convert_to_shapefile, default_output as shapefile_output};
use geokit::{DistanceMode, GeoKitConfig, GeoKitError, GeometryKind, utm};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geokit")]
#[command(author, version, about = "Geospatial conversions for KML/KMZ, shapefiles, UTM and IDW", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/geokit/config.toml)
    #[arg(long, global = true, env = "GEOKIT_CONFIG", value_parser = parse_path)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format (overrides the configuration)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every vertex of a KML/KMZ file as a CSV of points
    Points {
        /// Input .kml or .kmz file
        #[arg(value_parser = parse_path)]
        input: PathBuf,
        /// Output CSV (default: <input>_coordinates.csv)
        #[arg(short, long, value_parser = parse_path)]
        output: Option<PathBuf>,
        /// Keep the KML altitudes instead of querying the elevation service
        #[arg(long)]
        no_elevation: bool,
        /// Locations per elevation request
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=500))]
        batch_size: Option<u16>,
        /// Also write the points as a point shapefile
        #[arg(long, value_parser = parse_path)]
        shapefile: Option<PathBuf>,
    },
    /// Convert the polygons (or lines, or points) of a KML/KMZ file to a shapefile
    Shapefile {
        /// Input .kml or .kmz file
        #[arg(value_parser = parse_path)]
        input: PathBuf,
        /// Output .shp (default: <input>_converted.shp)
        #[arg(short, long, value_parser = parse_path)]
        output: Option<PathBuf>,
        /// Geometries to export
        #[arg(short, long, value_enum, default_value_t = GeometryKind::Polygon)]
        geometry: GeometryKind,
    },
    /// Merge several KML/KMZ files into one KML document
    Merge {
        /// Input .kml or .kmz files, in order
        #[arg(required = true, value_parser = parse_path)]
        inputs: Vec<PathBuf>,
        /// Output .kml file
        #[arg(short, long, value_parser = parse_path)]
        output: PathBuf,
    },
    /// Append UTM columns to a CSV with latitude/longitude columns
    Utm {
        /// Input CSV
        #[arg(value_parser = parse_path)]
        input: PathBuf,
        /// Output CSV (default: <input>_utm.csv)
        #[arg(short, long, value_parser = parse_path)]
        output: Option<PathBuf>,
    },
    /// Append consecutive and cumulative distances to a CSV of positions
    Distance {
        /// Input CSV
        #[arg(value_parser = parse_path)]
        input: PathBuf,
        /// Output CSV (default: <input>_distances.csv)
        #[arg(short, long, value_parser = parse_path)]
        output: Option<PathBuf>,
        /// geographic: Latitude/Longitude columns, utm: Easting/Northing columns
        #[arg(short, long, value_enum, default_value_t = DistanceMode::Geographic)]
        mode: DistanceMode,
    },
    /// Interpolate CSV samples onto an ESRI ASCII grid with IDW
    Idw {
        /// Input CSV with x, y and value columns
        #[arg(value_parser = parse_path)]
        input: PathBuf,
        /// Output .asc grid
        #[arg(short, long, value_parser = parse_path)]
        output: PathBuf,
        /// Cell size in map units
        #[arg(long)]
        cell_size: f64,
        /// Power parameter (default from configuration, 2.0)
        #[arg(long)]
        power: Option<f64>,
        /// Search radius; samples further away are ignored
        #[arg(long)]
        radius: Option<f64>,
        /// Use only the nearest N samples per cell
        #[arg(long)]
        max_points: Option<usize>,
        /// Margin around the samples, in map units
        #[arg(long)]
        padding: Option<f64>,
        #[arg(long, default_value = "x")]
        x_column: String,
        #[arg(long, default_value = "y")]
        y_column: String,
        #[arg(long, default_value = "z")]
        value_column: String,
        /// Projection for the grid: a .prj file to copy, or `wgs84`
        #[arg(long, value_parser = parse_path)]
        prj: Option<PathBuf>,
        /// Report leave-one-out RMSE and MAE before writing the grid
        #[arg(long)]
        cross_validate: bool,
    },
}

/// Paths pasted with surrounding quotes are accepted as-is
fn parse_path(value: &str) -> std::result::Result<PathBuf, String> {
    let trimmed = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    if unquoted.is_empty() {
        return Err("path must not be empty".to_string());
    }
    Ok(PathBuf::from(unquoted))
}

fn sibling_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_{suffix}.csv"))
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

async fn run_points_command(
    config: &GeoKitConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    no_elevation: bool,
    batch_size: Option<u16>,
    shapefile: Option<PathBuf>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| points_output(&input));
    let fetch = config.elevation.enabled && !no_elevation;

    let client = if fetch {
        Some(OpenElevationClient::new(&config.elevation)?)
    } else {
        None
    };

    let cache = if fetch && config.cache.enabled {
        let ttl = Duration::from_secs(u64::from(config.cache.ttl_hours) * 3600);
        match ElevationCache::open(config.cache.directory(), ttl) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Elevation cache unavailable, continuing without it: {}", e);
                None
            }
        }
    } else {
        None
    };

    let options = PointsOptions {
        provider: client.as_ref().map(|c| c as &dyn ElevationProvider),
        cache: cache.as_ref(),
        batch_size: batch_size.map_or(config.elevation.batch_size, usize::from),
        shapefile,
    };

    let start = Instant::now();
    let summary = run_points(&input, &output, &options).await?;

    println!("Extracted {} points", summary.points);
    if let Some(elevation) = summary.elevation {
        println!(
            "  Elevations: {} fetched, {} cached, {} failed batches",
            elevation.fetched, elevation.cached, elevation.failed_batches
        );
    }
    if let Some(files) = &summary.shapefile {
        if let Some(shp) = files.first() {
            println!("Point shapefile saved to: {}", shp.display());
        }
    }
    done("Points", &output, start.elapsed());
    Ok(())
}

fn run_idw_command(config: &GeoKitConfig, args: IdwArgs) -> Result<()> {
    let start = Instant::now();
    let samples = read_samples(&args.input, &args.x_column, &args.y_column, &args.value_column)?;

    let padding = args.padding.unwrap_or(config.interpolation.padding);
    let grid = GridSpec::covering(
        &samples,
        args.cell_size,
        padding,
        config.interpolation.max_cells,
    )?;
    let params = IdwParams {
        power: args.power.unwrap_or(config.interpolation.power),
        max_radius: args.radius,
        max_points: args.max_points,
        nodata: config.interpolation.nodata,
        ..IdwParams::new(grid)
    };

    if args.cross_validate {
        let cv = cross_validate(&samples, &params)?;
        println!("Cross validation ({} samples):", cv.n);
        println!("  RMSE: {:.4}", cv.rmse);
        println!("  MAE:  {:.4}", cv.mae);
    }

    let raster = idw(&samples, &params)?;
    raster.write(&args.output)?;

    if let Some(prj) = &args.prj {
        let wkt = if prj.as_os_str().eq_ignore_ascii_case("wgs84") {
            WGS84_PRJ.to_string()
        } else {
            fs::read_to_string(prj)
                .with_context(|| format!("Failed to read projection file {}", prj.display()))?
        };
        AsciiGrid::write_prj(&args.output, &wkt)?;
    }

    println!(
        "Grid: {} x {} cells, {} with values",
        raster.spec.cols,
        raster.spec.rows,
        raster.valid_cells()
    );
    done("IDW grid", &args.output, start.elapsed());
    Ok(())
}

struct IdwArgs {
    input: PathBuf,
    output: PathBuf,
    cell_size: f64,
    power: Option<f64>,
    radius: Option<f64>,
    max_points: Option<usize>,
    padding: Option<f64>,
    x_column: String,
    y_column: String,
    value_column: String,
    prj: Option<PathBuf>,
    cross_validate: bool,
}

async fn run(command: Commands, config: &GeoKitConfig) -> Result<()> {
    match command {
        Commands::Points {
            input,
            output,
            no_elevation,
            batch_size,
            shapefile,
        } => run_points_command(config, input, output, no_elevation, batch_size, shapefile).await?,
        Commands::Shapefile {
            input,
            output,
            geometry,
        } => {
            let output = output.unwrap_or_else(|| shapefile_output(&input));
            let start = Instant::now();
            let summary = convert_to_shapefile(&input, &output, geometry)?;
            println!("Converted {} features", summary.features);
            for file in &summary.files {
                println!("  {}", file.display());
            }
            done("Shapefile", &output.with_extension("shp"), start.elapsed());
        }
        Commands::Merge { inputs, output } => {
            let start = Instant::now();
            let merged = merge_files(&inputs, &output)?;
            println!(
                "Merged {} files ({} elements)",
                inputs.len(),
                merged.elements
            );
            done("Merged KML", &output, start.elapsed());
        }
        Commands::Utm { input, output } => {
            let output = output.unwrap_or_else(|| sibling_output(&input, "utm"));
            let start = Instant::now();
            let rows = utm::convert_csv(&input, &output)?;
            println!("Converted {rows} rows to UTM");
            done("UTM table", &output, start.elapsed());
        }
        Commands::Distance {
            input,
            output,
            mode,
        } => {
            let output = output.unwrap_or_else(|| sibling_output(&input, "distances"));
            let start = Instant::now();
            let total = add_distance_columns(&input, &output, mode)?;
            println!("Total distance: {total:.3} m ({:.3} km)", total / 1000.0);
            done("Distance table", &output, start.elapsed());
        }
        Commands::Idw {
            input,
            output,
            cell_size,
            power,
            radius,
            max_points,
            padding,
            x_column,
            y_column,
            value_column,
            prj,
            cross_validate,
        } => run_idw_command(
            config,
            IdwArgs {
                input,
                output,
                cell_size,
                power,
                radius,
                max_points,
                padding,
                x_column,
                y_column,
                value_column,
                prj,
                cross_validate,
            },
        )?,
    }
    Ok(())
}

fn user_message(err: &anyhow::Error) -> String {
    err.downcast_ref::<GeoKitError>()
        .map_or_else(|| format!("{err:#}"), GeoKitError::user_message)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match GeoKitConfig::load_from_path(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", user_message(&e));
            return ExitCode::FAILURE;
        }
    };

    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.logging.format));
    init_logging(format, &config.logging.level, cli.verbose);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {}", user_message(&e));
            ExitCode::FAILURE
        }
    }
}
