use chapter_sync::config::{self, SeriesConfig, SyncConfig};
use chapter_sync::output;
use chapter_sync::provider::Source;
use chapter_sync::sync::Synchronizer;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "chapter-sync")]
#[command(about = "Mirror serialized comics into a local library of CBZ archives")]
#[command(long_about = "\
Mirror serialized comics into a local library of CBZ archives

Each configured series is listed at its source, compared with what is
already in the library, and only new or changed chapters are fetched.
Every chapter becomes one archive with its metadata in ComicInfo.xml.

Library structure:

  library/
  └── Dungeon Diary/
      ├── cover.jpg                            # Series preview, written once
      ├── Ch.001 - Arrival [3f9a0c21be].cbz    # [..] = chapter id digest
      └── Vol.2 Ch.012.5 - Omake [a01b77e9c4].cbz

Renaming or renumbering a chapter upstream relabels its archive without
downloading it again. Interrupted runs leave no partial archives; run
again to pick up where it stopped.

Run 'chapter-sync gen-config' to generate a documented chapter-sync.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Library directory (overrides `library` in the config)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Chapters fetched in parallel (overrides `processing.max_workers`)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log debug details to stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

/// Shared flags for commands that work on configured series.
#[derive(clap::Args, Clone)]
struct SeriesArgs {
    /// Only series whose location or directory contains this text
    #[arg(long)]
    series: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and publish every new or changed chapter
    Sync(SeriesArgs),
    /// Show what a sync would do, without fetching pages or writing
    Plan(SeriesArgs),
    /// Print a stock chapter-sync.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Plan(args) => {
            let config = load(&cli)?;
            for series in selected(&config, args) {
                let source = Source::new(series.provider, &config.http.settings())?;
                let synchronizer = Synchronizer::new(
                    &source,
                    &config.library,
                    config::effective_workers(&config.processing),
                )?;
                let plan = synchronizer.plan(&series.target())?;
                output::print_plan(&plan);
            }
        }
        Command::Sync(args) => {
            let config = load(&cli)?;
            let targets = selected(&config, args);
            let mut failed = 0;
            for series in &targets {
                if let Err(e) = sync_series(&config, series) {
                    tracing::error!(series = %series.location, error = %e, "series failed");
                    println!("==> {}: FAILED: {}", series.location, e);
                    failed += 1;
                }
            }
            if failed > 0 {
                return Err(format!("{} of {} series failed", failed, targets.len()).into());
            }
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `-v` and `-q` move the level.
fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the config file and apply command-line overrides.
fn load(cli: &Cli) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(library) = &cli.library {
        config.library = library.clone();
    }
    if let Some(workers) = cli.workers {
        config.processing.max_workers = Some(workers);
        config.validate()?;
    }
    if config.series.is_empty() {
        println!(
            "No series configured in {} (run 'chapter-sync gen-config' for an example)",
            cli.config.display()
        );
    }
    Ok(config)
}

fn selected<'a>(config: &'a SyncConfig, args: &SeriesArgs) -> Vec<&'a SeriesConfig> {
    config
        .series
        .iter()
        .filter(|s| match &args.series {
            Some(pattern) => {
                s.location.contains(pattern.as_str())
                    || s.directory.as_deref().is_some_and(|d| d.contains(pattern.as_str()))
            }
            None => true,
        })
        .collect()
}

/// Sync one series, printing progress from a dedicated thread.
fn sync_series(
    config: &SyncConfig,
    series: &SeriesConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = Source::new(series.provider, &config.http.settings())?;

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_sync_event(&event) {
                println!("{}", line);
            }
        }
    });

    let result = Synchronizer::new(
        &source,
        &config.library,
        config::effective_workers(&config.processing),
    )
    .map(|s| s.with_retry(config.retry.policy()).with_events(tx))
    .and_then(|s| s.sync(&series.target()));

    // The synchronizer (and with it the sender) is gone; drain the printer.
    printer.join().map_err(|_| "output thread panicked")?;
    output::print_report(&result?);
    Ok(())
}
