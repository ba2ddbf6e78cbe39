use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tile_stitcher::config::load_config_or_default;
use tile_stitcher::data::{parse_grid, verify_tiles, TiffLoader};
use tile_stitcher::logging::{init_logging, new_correlation_id};
use tile_stitcher::{RegistrationDatabase, StitchConfig, Stitcher, TileType};

#[derive(Parser)]
#[command(name = "stitch")]
#[command(about = "Register overlapping 3D microscopy tiles into a global coordinate frame")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Register every tile of a mosaic and write the registration database
    Register {
        /// Directory holding the tiles
        #[arg(short, long)]
        path: PathBuf,

        /// Lateral tile size in pixels
        #[arg(long)]
        frame_size: Option<usize>,

        /// Overlap between adjacent tiles in pixels
        #[arg(long)]
        overlap: Option<usize>,

        /// Tile format (auto-detected when omitted)
        #[arg(long = "type", value_enum)]
        tile_type: Option<TileType>,

        /// Sub-pixel upsampling factor for phase correlation
        #[arg(long)]
        upsample: Option<usize>,

        /// Worker threads for pairwise registration
        #[arg(long)]
        threads: Option<usize>,

        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output CSV file
        #[arg(short, long, default_value = "registration_results.csv")]
        output: PathBuf,

        /// Optional JSON quality report
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Check that every tile of a mosaic can be read
    Verify {
        /// Directory holding the tiles
        #[arg(short, long)]
        path: PathBuf,

        /// Tile format (auto-detected when omitted)
        #[arg(long = "type", value_enum)]
        tile_type: Option<TileType>,
    },

    /// Print the absolute [z, y, x] position of one tile
    Lookup {
        /// Registration database written by `register`
        #[arg(short, long)]
        database: PathBuf,

        #[arg(long)]
        row: usize,

        #[arg(long)]
        col: usize,
    },
}

struct RegisterArgs {
    path: PathBuf,
    frame_size: Option<usize>,
    overlap: Option<usize>,
    tile_type: Option<TileType>,
    upsample: Option<usize>,
    threads: Option<usize>,
    config: Option<PathBuf>,
    output: PathBuf,
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Register {
            path,
            frame_size,
            overlap,
            tile_type,
            upsample,
            threads,
            config,
            output,
            report,
        } => handle_register(
            RegisterArgs {
                path,
                frame_size,
                overlap,
                tile_type,
                upsample,
                threads,
                config,
                output,
                report,
            },
            cli.verbose,
        ),
        Commands::Verify { path, tile_type } => handle_verify(&path, tile_type, cli.verbose),
        Commands::Lookup { database, row, col } => handle_lookup(&database, row, col),
    }
}

/// Apply command line overrides on top of the file configuration
fn resolve_config(args: &RegisterArgs, verbose: u8) -> anyhow::Result<StitchConfig> {
    let mut config = load_config_or_default(args.config.as_deref());

    if let Some(frame_size) = args.frame_size {
        config.registration.frame_size = frame_size;
    }
    if let Some(overlap) = args.overlap {
        config.registration.overlap = overlap;
    }
    if let Some(upsample) = args.upsample {
        config.registration.upsample_factor = upsample;
    }
    if args.threads.is_some() {
        config.registration.threads = args.threads;
    }
    if args.tile_type.is_some() {
        config.discovery.file_type = args.tile_type;
    }
    config.logging = config.logging.with_verbosity(verbose);

    config.ensure_valid()?;
    Ok(config)
}

fn handle_register(args: RegisterArgs, verbose: u8) -> anyhow::Result<()> {
    let config = resolve_config(&args, verbose)?;
    let _guard = init_logging(&config.logging)?;
    let correlation_id = new_correlation_id();

    let grid = parse_grid(&args.path, config.discovery.file_type)
        .with_context(|| format!("Failed to parse tiles in {}", args.path.display()))?;
    println!(
        "Found {} tiles on a {}x{} grid ({} edges), run {}",
        grid.n_tiles(),
        grid.nrow(),
        grid.ncol(),
        grid.n_edges(),
        correlation_id
    );

    let mut stitcher = Stitcher::new(grid, config.registration.clone());
    let database = stitcher
        .run(&TiffLoader)
        .context("Registration failed")?;
    database
        .save_csv(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!(
        "Wrote {} tile positions to {}",
        database.len(),
        args.output.display()
    );

    if let Some(report_path) = args.report {
        let report = stitcher.report()?;
        report
            .save_json(&report_path)
            .with_context(|| format!("Failed to write {}", report_path.display()))?;
        for axis in &report.axes {
            println!(
                "  {}: {} edges, {} kept, tree error {:.4}",
                axis.axis,
                axis.edges.len(),
                axis.tree_edges,
                axis.tree_weight
            );
        }
        println!("Quality report saved to: {}", report_path.display());
    }

    for timing in stitcher.timings() {
        println!("  {:<10} {:>10.1} ms", timing.stage_name, timing.duration_ms);
    }

    Ok(())
}

fn handle_verify(path: &Path, tile_type: Option<TileType>, verbose: u8) -> anyhow::Result<()> {
    let config = StitchConfig::default();
    let _guard = init_logging(&config.logging.with_verbosity(verbose))?;

    let grid = parse_grid(path, tile_type)
        .with_context(|| format!("Failed to parse tiles in {}", path.display()))?;
    let failures = verify_tiles(&grid, &TiffLoader);

    if failures.is_empty() {
        println!("All {} tiles are readable", grid.n_tiles());
        return Ok(());
    }

    for (tile, error) in &failures {
        println!("  ({}, {}) {}: {}", tile.row, tile.col, tile.path.display(), error);
    }
    anyhow::bail!(
        "{} of {} tiles could not be read",
        failures.len(),
        grid.n_tiles()
    )
}

fn handle_lookup(database: &Path, row: usize, col: usize) -> anyhow::Result<()> {
    let database = RegistrationDatabase::load_csv(database)
        .with_context(|| format!("Failed to read {}", database.display()))?;
    let [z, y, x] = database
        .position(row, col)
        .with_context(|| format!("No tile at row {}, col {}", row, col))?;
    println!("[{:.3}, {:.3}, {:.3}]", z, y, x);
    Ok(())
}
