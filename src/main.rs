//! Offline checks for the declarative data (location graphs, routes, maps,
//! device capability dumps) and live navigation and node resolution on a
//! connected device.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use wayfarer::application::navigation::LocationRepository;
use wayfarer::domain::model::MapNode;
use wayfarer::domain::repository::MapSource;
use wayfarer::infrastructure::config;
use wayfarer::infrastructure::device::descriptor;
use wayfarer::infrastructure::logging;
use wayfarer::infrastructure::sources::{YamlLocationSource, YamlMapSource};
use wayfarer::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "wayfarer")]
#[command(version, about = "Location graph and device tooling", long_about = None)]
struct Args {
    /// Also write daily rotating log files
    #[arg(long)]
    production: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every location and report broken links
    Check,
    /// Print the shortest click path between two locations
    Route { from: String, to: String },
    /// List the nodes of a map definition
    Map { name: String },
    /// Parse a `getevent -p` style capability dump
    Describe { dump: PathBuf },
    /// Walk the connected device to a location
    Navigate { dest: String },
    /// Locate map nodes on the connected device's screen
    Resolve {
        map: String,
        #[arg(required = true)]
        nodes: Vec<String>,
        /// Tap each node once it is resolved
        #[arg(long)]
        tap: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup(args.production);
    config::init();

    match args.command {
        Command::Check => check(),
        Command::Route { from, to } => route(&from, &to),
        Command::Map { name } => map(&name),
        Command::Describe { dump } => describe(&dump),
        Command::Navigate { dest } => navigate(&dest).await,
        Command::Resolve { map, nodes, tap } => resolve(&map, &nodes, tap).await,
    }
}

/// Token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

async fn navigate(dest: &str) -> Result<()> {
    let runtime = Runtime::connect(config::app(), config::gesture()).await?;
    let mut navigator = runtime.navigator(&config::app().resources, config::navigation())?;
    let navigated = navigator.navigate_to(dest, &interrupt_token()).await;
    runtime.shutdown().await;
    navigated?;
    println!("arrived at {}", dest);
    Ok(())
}

async fn resolve(name: &str, nodes: &[String], tap: bool) -> Result<()> {
    let maps_dir = &config::app().resources.maps_dir;
    let map = YamlMapSource::new(maps_dir).load_map(name)?;
    let targets = nodes
        .iter()
        .map(|n| {
            map.node(n)
                .cloned()
                .with_context(|| format!("map {} has no node {}", map.name, n))
        })
        .collect::<Result<Vec<MapNode>>>()?;

    let runtime = Runtime::connect(config::app(), config::gesture()).await?;
    let mut resolver = runtime.resolver(&map, maps_dir, config::resolver())?;
    let cancel = interrupt_token();
    let mut outcome = Ok(());
    for node in &targets {
        let rect = match resolver.resolve(node, &cancel).await {
            Ok(rect) => rect,
            Err(e) => {
                outcome = Err(e.into());
                break;
            }
        };
        let center = rect.center();
        println!("{:<16} {},{} {}x{}", node.name, center.x, center.y, rect.width, rect.height);
        if tap {
            if let Err(e) = runtime.touch().tap_rect(rect).await {
                outcome = Err(e.into());
                break;
            }
        }
    }
    runtime.shutdown().await;
    outcome
}

fn repository() -> Result<LocationRepository> {
    let dir = &config::app().resources.locations_dir;
    LocationRepository::load(Box::new(YamlLocationSource::new(dir)))
        .with_context(|| format!("loading locations from {:?}", dir))
}

fn check() -> Result<()> {
    let graph = repository()?.graph();
    println!("{} locations", graph.len());

    let dangling = graph.dangling_links();
    for (from, to) in &dangling {
        println!("  {} -> {} (unknown)", from, to);
    }
    if !dangling.is_empty() {
        anyhow::bail!("{} dangling links", dangling.len());
    }
    Ok(())
}

fn route(from: &str, to: &str) -> Result<()> {
    let graph = repository()?.graph();
    let path = graph.shortest_path(from, to)?;
    if path.is_empty() {
        println!("already at {}", to);
    }
    for step in path {
        println!("{} -> {}", step.source, step.dest);
    }
    Ok(())
}

fn map(name: &str) -> Result<()> {
    let source = YamlMapSource::new(&config::app().resources.maps_dir);
    let map = source.load_map(name)?;
    println!("{} ({} nodes)", map.name, map.nodes.len());
    for node in &map.nodes {
        println!(
            "  {:<16} {:?} {:?} at {},{} {}x{}",
            node.name, node.node_type, node.coordinates, node.x, node.y, node.width, node.height
        );
    }
    Ok(())
}

fn describe(dump: &Path) -> Result<()> {
    let text = std::fs::read_to_string(dump).with_context(|| format!("reading {:?}", dump))?;
    let device = descriptor::parse(&text)?;
    println!("{} ({})", device.name, device.device_file);
    println!("  slots: {}", device.max_slots());
    println!("  pressure: {}", device.supports_pressure());
    let mut codes: Vec<_> = device.specs.iter().collect();
    codes.sort_by_key(|(code, _)| **code);
    for (code, axis) in codes {
        println!("  abs 0x{:04x}: {}..{}", code, axis.min_value, axis.max_value);
    }
    Ok(())
}
