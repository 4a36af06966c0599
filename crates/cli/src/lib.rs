use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pageflow_core::{group_spreads, PageObject, Point, Rotation, ScrollAxis, Size, SpreadMode, ViewerConfig};
use pageflow_scheduler::InlineEngine;
use pageflow_scroll::{ScrollController, ScrollMetrics, ViewportMetrics};
use pageflow_tiling::{TileStatus, TilingController, TilingState};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pageflow")]
#[command(about = "Inspect virtualized document layout, scroll metrics and tile grids")]
pub struct Cli {
    /// Configuration file (defaults to the platform config location)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the virtual item layout as JSON.
    Layout {
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Print the scroll metrics for a viewport as JSON.
    Metrics {
        #[command(flatten)]
        document: DocumentArgs,
        #[command(flatten)]
        viewport: ViewportArgs,
    },
    /// Print the tile grids of the visible pages as JSON.
    Tiles {
        #[command(flatten)]
        document: DocumentArgs,
        #[command(flatten)]
        viewport: ViewportArgs,
        #[command(flatten)]
        tiling: TilingArgs,
        /// Render every queued tile before printing
        #[arg(long)]
        render: bool,
    },
    /// Scroll through the document step by step, rendering tiles as it goes.
    Simulate {
        #[command(flatten)]
        document: DocumentArgs,
        #[command(flatten)]
        viewport: ViewportArgs,
        #[command(flatten)]
        tiling: TilingArgs,
        #[arg(long, default_value_t = 10)]
        steps: u32,
        /// Scroll distance per step in pixels
        #[arg(long, default_value_t = 400.0)]
        step_px: f64,
        /// Zoom level to switch to at `--zoom-step`
        #[arg(long)]
        zoom: Option<f64>,
        #[arg(long, default_value_t = 0)]
        zoom_step: u32,
        #[arg(long, default_value_t = 1.0)]
        dpr: f64,
    },
    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to this file
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct DocumentArgs {
    /// Number of uniformly sized pages
    #[arg(long, default_value_t = 10)]
    pages: u32,
    /// Page size in points, as WIDTHxHEIGHT
    #[arg(long, default_value = "612x792", value_parser = parse_size)]
    page_size: Size,
    /// JSON file with a list of pages; overrides --pages and --page-size
    #[arg(long, value_name = "FILE")]
    document: Option<PathBuf>,
    /// Spread grouping: none, odd or even
    #[arg(long, default_value = "none", value_parser = parse_spread)]
    spread: SpreadMode,
    /// Scroll axis: vertical or horizontal
    #[arg(long)]
    axis: Option<ScrollAxis>,
    /// Document rotation in degrees
    #[arg(long, default_value = "0", value_parser = parse_rotation)]
    rotation: Rotation,
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
}

#[derive(Debug, Args)]
struct ViewportArgs {
    /// Viewport size in pixels, as WIDTHxHEIGHT
    #[arg(long, default_value = "800x1000", value_parser = parse_size)]
    viewport: Size,
    #[arg(long, default_value_t = 0.0)]
    scroll_left: f64,
    #[arg(long, default_value_t = 0.0)]
    scroll_top: f64,
}

#[derive(Debug, Args)]
struct TilingArgs {
    #[arg(long)]
    tile_size: Option<f64>,
    #[arg(long)]
    overlap: Option<f64>,
    #[arg(long)]
    extra_rings: Option<u32>,
}

#[derive(Debug, Serialize)]
struct TilesOutput<'a> {
    current_page: u32,
    visible_pages: &'a [u32],
    tile_count: usize,
    ready: usize,
    pages: &'a TilingState,
}

#[derive(Debug, Serialize)]
struct SimulationStep {
    step: u32,
    scale: f64,
    scroll_offset: Point,
    current_page: u32,
    visible_pages: Vec<u32>,
    tiles: usize,
    fallback: usize,
    rendered: usize,
}

#[derive(Debug, Serialize)]
struct RenderSummary {
    started: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    timed_out: u64,
}

#[derive(Debug, Serialize)]
struct SimulationOutput {
    steps: Vec<SimulationStep>,
    renders: RenderSummary,
}

/// Install the stderr subscriber; `PAGEFLOW_LOG` takes `RUST_LOG` syntax
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("PAGEFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Parse `args` and run the selected subcommand
pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Layout { document } => {
            let config = load_config(cli.config.as_deref())?;
            run_layout(config, &document)
        }
        Commands::Metrics { document, viewport } => {
            let config = load_config(cli.config.as_deref())?;
            run_metrics(config, &document, &viewport)
        }
        Commands::Tiles { document, viewport, tiling, render } => {
            let config = load_config(cli.config.as_deref())?;
            run_tiles(config, &document, &viewport, &tiling, render)
        }
        Commands::Simulate { document, viewport, tiling, steps, step_px, zoom, zoom_step, dpr } => {
            let config = load_config(cli.config.as_deref())?;
            let plan = SimulationPlan { steps, step_px, zoom, zoom_step, dpr };
            run_simulate(config, &document, &viewport, &tiling, &plan)
        }
        Commands::Config { output } => {
            let config = load_config(cli.config.as_deref())?;
            run_config(&config, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    let config = match path {
        Some(path) => ViewerConfig::from_file(path)
            .and_then(ViewerConfig::apply_env)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ViewerConfig::load().context("failed to load configuration")?,
    };
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn run_layout(mut config: ViewerConfig, document: &DocumentArgs) -> Result<()> {
    let pages = load_pages(document)?;
    let scroll = scroll_controller(&mut config, document, &pages, Instant::now())?;
    print_json(&scroll.scroller_layout())
}

fn run_metrics(mut config: ViewerConfig, document: &DocumentArgs, viewport: &ViewportArgs) -> Result<()> {
    let pages = load_pages(document)?;
    let now = Instant::now();
    let mut scroll = scroll_controller(&mut config, document, &pages, now)?;
    scroll.on_viewport_change(viewport_metrics(viewport), now);
    print_json(scroll.metrics())
}

fn run_tiles(
    mut config: ViewerConfig,
    document: &DocumentArgs,
    viewport: &ViewportArgs,
    tiling_args: &TilingArgs,
    render: bool,
) -> Result<()> {
    apply_tiling_args(&mut config, tiling_args)?;
    let pages = load_pages(document)?;
    let now = Instant::now();
    let mut scroll = scroll_controller(&mut config, document, &pages, now)?;
    scroll.on_viewport_change(viewport_metrics(viewport), now);

    let mut tiling = tiling_controller(&config, document, pages)?;
    tiling.calculate_visible_tiles(scroll.metrics());

    if render {
        tiling.render_queued_tiles(1.0, now);
        let rendered = tiling.poll_tasks(now);
        tracing::debug!(rendered = rendered.len(), "rendered queued tiles");
    }

    let metrics = scroll.metrics();
    let state = tiling.state();
    print_json(&TilesOutput {
        current_page: metrics.current_page,
        visible_pages: &metrics.visible_pages,
        tile_count: state.tile_count(),
        ready: count_tiles(state, |tile| tile.status == TileStatus::Ready),
        pages: state,
    })
}

struct SimulationPlan {
    steps: u32,
    step_px: f64,
    zoom: Option<f64>,
    zoom_step: u32,
    dpr: f64,
}

fn run_simulate(
    mut config: ViewerConfig,
    document: &DocumentArgs,
    viewport_args: &ViewportArgs,
    tiling_args: &TilingArgs,
    plan: &SimulationPlan,
) -> Result<()> {
    if !(plan.step_px.is_finite() && plan.step_px >= 0.0) {
        anyhow::bail!("--step-px must be a non-negative number");
    }
    if let Some(zoom) = plan.zoom {
        ensure_scale(zoom, "--zoom")?;
    }

    apply_tiling_args(&mut config, tiling_args)?;
    let pages = load_pages(document)?;
    let start = Instant::now();
    let mut scroll = scroll_controller(&mut config, document, &pages, start)?;
    let mut tiling = tiling_controller(&config, document, pages)?;

    // far enough apart that every throttle window has closed between steps
    let interval = config.scroll.throttle().max(config.tiling.throttle()) * 2 + Duration::from_millis(1);
    let base = viewport_metrics(viewport_args);
    let axis = config.scroll.axis;
    let cross = axis.cross(Point::new(base.scroll_left, base.scroll_top));
    let initial = axis.main(Point::new(base.scroll_left, base.scroll_top));

    let mut steps = Vec::with_capacity(plan.steps as usize);
    for step in 0..plan.steps {
        let now = start + interval * step;

        if let Some(zoom) = plan.zoom.filter(|_| step == plan.zoom_step) {
            scroll.set_scale(zoom, now);
            tiling.set_scale(zoom, scroll.metrics());
        }

        let offset = axis.point(initial + plan.step_px * f64::from(step), cross);
        scroll.on_viewport_change(base.with_scroll(offset.x, offset.y), now);
        scroll.poll(now + config.scroll.throttle());

        tiling.on_scroll(scroll.metrics().clone(), now);
        tiling.poll(now + config.tiling.throttle());

        let state = tiling.state();
        let tiles = count_tiles(state, |tile| !tile.is_fallback);
        let fallback = count_tiles(state, |tile| tile.is_fallback);

        tiling.render_queued_tiles(plan.dpr, now);
        let rendered = tiling.poll_tasks(now).len();

        let metrics: &ScrollMetrics = scroll.metrics();
        steps.push(SimulationStep {
            step,
            scale: scroll.scale(),
            scroll_offset: offset,
            current_page: metrics.current_page,
            visible_pages: metrics.visible_pages.clone(),
            tiles,
            fallback,
            rendered,
        });
    }

    let stats = tiling.stats();
    print_json(&SimulationOutput {
        steps,
        renders: RenderSummary {
            started: stats.started,
            completed: stats.completed,
            failed: stats.failed,
            cancelled: stats.cancelled,
            timed_out: stats.timed_out,
        },
    })
}

fn run_config(config: &ViewerConfig, output: Option<&Path>) -> Result<()> {
    if let Some(output) = output {
        config
            .save_to_file(output)
            .with_context(|| format!("failed to write configuration to {}", output.display()))?;
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

fn load_pages(args: &DocumentArgs) -> Result<Vec<PageObject>> {
    let pages = match &args.document {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read document {}", path.display()))?;
            let pages: Vec<PageObject> = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse document {}", path.display()))?;
            pages
        }
        None => (0..args.pages)
            .map(|index| PageObject::new(index, args.page_size.width, args.page_size.height))
            .collect(),
    };

    for (position, page) in pages.iter().enumerate() {
        if page.index as usize != position {
            anyhow::bail!("page at position {position} has index {}", page.index);
        }
        if !(page.size.width > 0.0 && page.size.height > 0.0) {
            anyhow::bail!("page {} has a non-positive size", page.number());
        }
    }

    Ok(pages)
}

fn scroll_controller(
    config: &mut ViewerConfig,
    document: &DocumentArgs,
    pages: &[PageObject],
    now: Instant,
) -> Result<ScrollController> {
    ensure_scale(document.scale, "--scale")?;
    if let Some(axis) = document.axis {
        config.scroll.axis = axis;
    }

    let mut scroll = ScrollController::new(config.scroll.clone());
    scroll.set_rotation(document.rotation, now);
    scroll.set_document(group_spreads(pages, document.spread), now);
    scroll.set_scale(document.scale, now);
    Ok(scroll)
}

fn tiling_controller(
    config: &ViewerConfig,
    document: &DocumentArgs,
    pages: Vec<PageObject>,
) -> Result<TilingController<InlineEngine>> {
    let mut tiling = TilingController::new(config.tiling.clone(), InlineEngine::solid([255, 255, 255, 255]))
        .context("invalid tiling options")?;
    tiling.set_document(pages);
    tiling.set_rotation(document.rotation, &ScrollMetrics::default());
    tiling.set_scale(document.scale, &ScrollMetrics::default());
    Ok(tiling)
}

fn apply_tiling_args(config: &mut ViewerConfig, args: &TilingArgs) -> Result<()> {
    if let Some(tile_size) = args.tile_size {
        config.tiling.tile_size = tile_size;
    }
    if let Some(overlap) = args.overlap {
        config.tiling.overlap_px = overlap;
    }
    if let Some(extra_rings) = args.extra_rings {
        config.tiling.extra_rings = extra_rings;
    }
    config.tiling.validate().context("invalid tiling options")?;
    Ok(())
}

fn viewport_metrics(args: &ViewportArgs) -> ViewportMetrics {
    ViewportMetrics::new(args.viewport.width, args.viewport.height).with_scroll(args.scroll_left, args.scroll_top)
}

fn count_tiles(state: &TilingState, predicate: impl Fn(&pageflow_tiling::Tile) -> bool) -> usize {
    state.pages().flat_map(|(_, tiles)| tiles.iter()).filter(|tile| predicate(tile)).count()
}

fn ensure_scale(scale: f64, flag: &str) -> Result<()> {
    if !(scale.is_finite() && scale > 0.0) {
        anyhow::bail!("{flag} must be a positive number");
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn parse_size(value: &str) -> Result<Size, String> {
    let (width, height) = value.split_once('x').ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width: f64 = width.trim().parse().map_err(|_| format!("invalid width `{width}`"))?;
    let height: f64 = height.trim().parse().map_err(|_| format!("invalid height `{height}`"))?;
    if !(width.is_finite() && height.is_finite() && width >= 0.0 && height >= 0.0) {
        return Err(format!("size must be non-negative, got `{value}`"));
    }
    Ok(Size::new(width, height))
}

fn parse_spread(value: &str) -> Result<SpreadMode, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(SpreadMode::None),
        "odd" => Ok(SpreadMode::Odd),
        "even" => Ok(SpreadMode::Even),
        other => Err(format!("unknown spread mode `{other}` (expected none, odd or even)")),
    }
}

fn parse_rotation(value: &str) -> Result<Rotation, String> {
    let degrees: i32 = value.trim().parse().map_err(|_| format!("invalid rotation `{value}`"))?;
    Rotation::from_degrees(degrees).ok_or_else(|| format!("rotation must be a multiple of 90, got {degrees}"))
}
