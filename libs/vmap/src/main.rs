use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vmap::{Config, VMap, Vector3, codec};

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Query tiled collision maps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(long, global = true, help = "Path to the configuration file")]
    config: Option<PathBuf>,
    #[clap(long, global = true, help = "Root directory of the tile store")]
    base_path: Option<PathBuf>,
    #[clap(long, global = true, help = "Cache budget in bytes")]
    cache_bytes: Option<u64>,
    #[clap(long, global = true, help = "Disable tile caching")]
    no_cache: bool,
    #[clap(long, global = true, help = "Number of decode workers (0 decodes inline)")]
    workers: Option<usize>,
    #[clap(long, global = true, help = "Print results as JSON")]
    json: bool,
    #[clap(
        long,
        global = true,
        value_enum,
        default_value = "warn",
        help = "Log level (error, warn, info, debug, trace)"
    )]
    log_level: LogLevel,
}

#[derive(Subcommand, Clone, Debug)]
enum Commands {
    #[command(about = "Check line of sight between two points")]
    Los(SegmentArgs),
    #[command(about = "Find the ground height below a point")]
    Height(HeightArgs),
    #[command(about = "Load one tile and summarize it")]
    Load(LoadArgs),
    #[command(about = "List the tiles a segment passes through")]
    Tiles(SegmentArgs),
    #[command(about = "Decode a tile file directly and summarize it")]
    Inspect(InspectArgs),
    #[command(about = "Load the tiles around a point, then print cache statistics")]
    Prefetch(PrefetchArgs),
    #[command(about = "Print the resolved configuration and cache statistics")]
    Stats,
}

#[derive(clap::Args, Clone, Debug)]
struct SegmentArgs {
    #[clap(help = "Map id")]
    map: u32,
    #[clap(value_parser = parse_point, allow_hyphen_values = true, help = "Segment start as x,y,z")]
    start: Vector3,
    #[clap(value_parser = parse_point, allow_hyphen_values = true, help = "Segment end as x,y,z")]
    end: Vector3,
}

#[derive(clap::Args, Clone, Debug)]
struct HeightArgs {
    #[clap(help = "Map id")]
    map: u32,
    #[clap(allow_negative_numbers = true)]
    x: f64,
    #[clap(allow_negative_numbers = true)]
    z: f64,
}

#[derive(clap::Args, Clone, Debug)]
struct LoadArgs {
    #[clap(help = "Map id")]
    map: u32,
    #[clap(allow_negative_numbers = true)]
    tile_x: i32,
    #[clap(allow_negative_numbers = true)]
    tile_y: i32,
}

#[derive(clap::Args, Clone, Debug)]
struct InspectArgs {
    #[clap(help = "Path to a .vmtile file")]
    path: PathBuf,
}

#[derive(clap::Args, Clone, Debug)]
struct PrefetchArgs {
    #[clap(help = "Map id")]
    map: u32,
    #[clap(allow_negative_numbers = true)]
    x: f64,
    #[clap(allow_negative_numbers = true)]
    z: f64,
    #[clap(long, default_value_t = 1, help = "Radius in tiles")]
    radius: u32,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_point(s: &str) -> Result<Vector3, String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|err| format!("{c:?}: {err}")))
        .collect::<Result<Vec<_>, _>>()?;
    match coords[..] {
        [x, y, z] => Ok(Vector3::new(x, y, z)),
        _ => Err(format!("expected x,y,z, got {} values", coords.len())),
    }
}

fn emit<T: Serialize + std::fmt::Debug>(json: bool, value: &T) -> miette::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    } else {
        println!("{value:#?}");
    }
    Ok(())
}

fn main() -> miette::Result<()> {
    let args = Cli::parse();
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        EnvFilter::builder().parse_lossy(format!("vmap={}", args.log_level.as_str()))
    };
    let _ = tracing_subscriber::fmt::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        ))
        .try_init();

    if let Commands::Inspect(InspectArgs { path }) = &args.command {
        let bytes = std::fs::read(path).map_err(|err| vmap::Error::io(path, err))?;
        let tile = codec::decode(&bytes).map_err(vmap::Error::from)?;
        return emit(args.json, &tile.summary());
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(base_path) = args.base_path {
        config.base_path = base_path;
    }
    if let Some(cache_bytes) = args.cache_bytes {
        config.max_cache_bytes = cache_bytes;
    }
    if args.no_cache {
        config.cache_enabled = false;
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }

    let vmap = VMap::initialize(config);
    let res = match &args.command {
        Commands::Los(SegmentArgs { map, start, end }) => {
            let res = vmap.check_los(*map, *start, *end)?;
            emit(args.json, &res)
        }
        Commands::Height(HeightArgs { map, x, z }) => {
            let res = vmap.get_height(*map, *x, *z)?;
            emit(args.json, &res)
        }
        Commands::Load(LoadArgs {
            map,
            tile_x,
            tile_y,
        }) => {
            let tile = vmap.load_tile(*map, *tile_x, *tile_y)?;
            emit(args.json, &tile.summary())
        }
        Commands::Tiles(SegmentArgs { map, start, end }) => {
            let tiles = vmap.tiles_along_segment(*map, *start, *end)?;
            emit(args.json, &tiles)
        }
        Commands::Prefetch(PrefetchArgs { map, x, z, radius }) => {
            let center = Vector3::new(*x, 0.0, *z);
            let loaded = vmap.prefetch(*map, center, *radius)?;
            tracing::info!(loaded, "prefetched tiles");
            emit(args.json, &vmap.cache_stats())
        }
        Commands::Stats => {
            #[derive(Serialize, Debug)]
            struct Stats<'a> {
                config: &'a Config,
                cache: vmap::CacheStats,
            }
            emit(
                args.json,
                &Stats {
                    config: vmap.config(),
                    cache: vmap.cache_stats(),
                },
            )
        }
        Commands::Inspect(_) => Ok(()),
    };
    vmap.shutdown();
    res
}
