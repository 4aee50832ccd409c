//! Binary entry point for the contentcache operator CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use contentcache::{
    cli::{
        churn::{run_churn, ChurnConfig},
        dump::{KitDump, SyntheticTree},
        tree_view, write_tree_text,
    },
    content::{ContentStore, ItemKind, LoadReport, StoreStats, TypeRebuild},
    storage::StoreOptions,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "contentcache",
    version,
    about = "Operator CLI for the contentcache published-content store",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "TOML file with store options"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ShapeArgs {
    #[arg(long, default_value_t = 3, help = "Top-level nodes")]
    roots: u32,

    #[arg(long, default_value_t = 4, help = "Children per inner node")]
    fanout: u32,

    #[arg(long, default_value_t = 3, help = "Levels, including the top level")]
    depth: u32,
}

impl From<&ShapeArgs> for SyntheticTree {
    fn from(args: &ShapeArgs) -> Self {
        SyntheticTree {
            roots: args.roots,
            fanout: args.fanout,
            depth: args.depth,
        }
    }
}

#[derive(Args, Debug)]
struct ChurnCmd {
    #[arg(long, value_name = "FILE", help = "Kit dump to churn (default: synthetic tree)")]
    dump: Option<PathBuf>,

    #[command(flatten)]
    shape: ShapeArgs,

    #[arg(long, default_value_t = 1000, help = "Writes performed by the writer")]
    rounds: u32,

    #[arg(long, default_value_t = 4, help = "Reader threads")]
    readers: usize,

    #[arg(long, default_value_t = 42, help = "Seed for the writer's choices")]
    seed: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Load a kit dump and report what was applied")]
    Load {
        #[arg(value_name = "DUMP")]
        dump: PathBuf,
    },

    #[command(about = "Print the tree of a kit dump")]
    Tree {
        #[arg(value_name = "DUMP")]
        dump: PathBuf,

        #[arg(long, help = "Show drafts")]
        preview: bool,

        #[arg(long, value_name = "LEVELS", help = "Stop after this many levels")]
        max_depth: Option<u32>,
    },

    #[command(about = "Load a kit dump, collect, and print engine statistics")]
    Stats {
        #[arg(value_name = "DUMP")]
        dump: PathBuf,
    },

    #[command(about = "Write a synthetic kit dump")]
    Generate {
        #[arg(long = "out", value_name = "FILE", required = true)]
        out: PathBuf,

        #[command(flatten)]
        shape: ShapeArgs,
    },

    #[command(about = "Run a writer against concurrent snapshot readers")]
    Churn(ChurnCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct LoadOutput {
    content_types: TypeRebuild,
    kits: LoadReport,
    stats: StoreStats,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("contentcache=info")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = match &cli.config {
        Some(path) => StoreOptions::from_toml_file(path)?,
        None => StoreOptions::default(),
    };

    match cli.command {
        Command::Load { dump } => {
            let (_store, output) = load(&dump, options)?;
            emit(&cli.format, &output, || print_load_text(&output))?;
        }
        Command::Tree {
            dump,
            preview,
            max_depth,
        } => {
            let (store, _) = load(&dump, options)?;
            let snapshot = store.create_snapshot();
            let entries = tree_view(&snapshot, preview, max_depth);
            emit(&cli.format, &entries, || {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                write_tree_text(&mut out, &entries)
            })?;
        }
        Command::Stats { dump } => {
            let (store, _) = load(&dump, options)?;
            // Release the loaded generation so the pass can move the floor.
            drop(store.create_snapshot());
            store.wait_for_pending_collection();
            store.collect_now();
            let stats = store.stats();
            emit(&cli.format, &stats, || print_stats_text(&stats))?;
        }
        Command::Generate { out, shape } => {
            let dump = KitDump::synthetic(SyntheticTree::from(&shape))?;
            dump.save(&out)?;
            if cli.format == OutputFormat::Json {
                let summary = serde_json::json!({
                    "path": out.display().to_string(),
                    "content_types": dump.content_types.len(),
                    "kits": dump.kits.len(),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Wrote {} kits and {} content types to {}",
                    dump.kits.len(),
                    dump.content_types.len(),
                    out.display()
                );
            }
        }
        Command::Churn(cmd) => {
            let dump = match &cmd.dump {
                Some(path) => KitDump::load(path)?,
                None => KitDump::synthetic(SyntheticTree::from(&cmd.shape))?,
            };
            let store = ContentStore::with_options(ItemKind::Content, options)?;
            let config = ChurnConfig {
                rounds: cmd.rounds,
                readers: cmd.readers,
                seed: cmd.seed,
            };
            let report = run_churn(&store, &dump, config)?;
            emit(&cli.format, &report, || {
                println!(
                    "Churn: writes={} snapshots_checked={} inconsistent={} passes={} elapsed_ms={}",
                    report.writes,
                    report.snapshots_checked,
                    report.inconsistent_snapshots,
                    report.collection_passes,
                    report.elapsed_ms
                );
                println!(
                    "Final collection: floor={} pruned={} keys_removed={} node_keys={}",
                    report.final_collection.floor,
                    report.final_collection.entries_pruned,
                    report.final_collection.keys_removed,
                    report.node_keys
                );
                Ok(())
            })?;
            if report.inconsistent_snapshots > 0 {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

fn load(path: &Path, options: StoreOptions) -> Result<(ContentStore, LoadOutput), Box<dyn Error>> {
    let dump = KitDump::load(path)?;
    let store = ContentStore::with_options(ItemKind::Content, options)?;
    let (content_types, kits) = dump.apply_to(&store);
    let stats = store.stats();
    Ok((
        store,
        LoadOutput {
            content_types,
            kits,
            stats,
        },
    ))
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce() -> io::Result<()>,
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => {
            printer()?;
            io::stdout().flush()?;
        }
    }
    Ok(())
}

fn print_load_text(output: &LoadOutput) -> io::Result<()> {
    println!(
        "Content types: refreshed={} removed={}",
        output.content_types.refreshed_types, output.content_types.removed_types
    );
    println!(
        "Kits: applied={} skipped={} (missing_parent={} missing_content_type={})",
        output.kits.applied,
        output.kits.skipped,
        output.kits.missing_parent,
        output.kits.missing_content_type
    );
    print_stats_text(&output.stats)
}

fn print_stats_text(stats: &StoreStats) -> io::Result<()> {
    println!(
        "Store ({}): live={} floor={} dirty={} queued_snapshots={}",
        stats.kind,
        stats.generations.live,
        stats.generations.floor,
        stats.generations.dirty,
        stats.generations.queued_snapshots
    );
    println!(
        "Keys: nodes={} roots={} content_types={}",
        stats.node_keys, stats.root_keys, stats.content_type_keys
    );
    match &stats.last_collection {
        Some(last) => println!(
            "Collector: passes={} last_floor={} examined={} pruned={} keys_removed={} micros={}",
            stats.collection_passes,
            last.floor,
            last.entries_examined,
            last.entries_pruned,
            last.keys_removed,
            last.elapsed.as_micros()
        ),
        None => println!("Collector: passes={}", stats.collection_passes),
    }
    Ok(())
}
