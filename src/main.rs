use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use intave_boot::config::{Config, ConfigProvider, DEFAULT_CHANNEL};
use intave_boot::storage::CacheRoot;
use intave_boot::update::{
    bootstrap, Orchestrator, RuntimeCopyActivation, Status, UpdateOutcome,
};
use intave_boot::{logging, HttpTransport};

#[derive(Parser, Debug)]
#[command(name = "intave-boot")]
#[command(about = "Keeps the Intave artifact cached, current and ready to load", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the config file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Cache directory (defaults to the per-user bootstrap directory)
    #[arg(long, value_name = "PATH", global = true)]
    cache_dir: Option<PathBuf>,

    /// Version channel: stable or latest
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Directory the activated artifact is copied into
    #[arg(long, value_name = "PATH", global = true)]
    runtime_dir: Option<PathBuf>,

    /// Hide the download progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Update if needed, then activate the artifact (default)
    Boot,

    /// Update the cached artifact without activating it
    Update {
        /// Only report whether an update is available
        #[arg(long)]
        check: bool,
    },

    /// List published versions, newest first
    Versions,

    /// Show what is installed and how old the caches are
    Status,
}

struct Setup {
    config: Config,
    root: CacheRoot,
    channel: String,
    runtime_dir: PathBuf,
    progress: bool,
}

impl Setup {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
        .context("Failed to load config")?;

        let root = match cli.cache_dir.as_ref().or(config.cache_dir.as_ref()) {
            Some(dir) => CacheRoot::at(dir.clone()),
            None => CacheRoot::resolve(),
        }
        .context("Failed to prepare cache directory")?;

        let channel = cli
            .channel
            .clone()
            .unwrap_or_else(|| config.get_string("version", DEFAULT_CHANNEL));
        let runtime_dir = cli
            .runtime_dir
            .clone()
            .or_else(|| config.runtime_dir.clone())
            .unwrap_or_else(|| root.path().join(".runtime"));
        let progress = config.progress && !cli.no_progress;

        Ok(Self {
            config,
            root,
            channel,
            runtime_dir,
            progress,
        })
    }

    fn orchestrator(&self) -> Orchestrator<HttpTransport> {
        Orchestrator::new(HttpTransport, &self.root, self.config.endpoints.clone())
            .with_marker_policy(self.config.marker_policy)
            .with_unreadable_policy(self.config.unreadable_cache)
            .with_progress(self.progress)
    }

    fn authkey(&self) -> String {
        self.config.get_string("authkey", "")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let setup = Setup::from_cli(&cli)?;

    match cli.command {
        None | Some(Command::Boot) => run_boot_command(&setup),
        Some(Command::Update { check }) => run_update_command(&setup, check),
        Some(Command::Versions) => run_versions_command(&setup),
        Some(Command::Status) => run_status_command(&setup),
    }
}

fn run_boot_command(setup: &Setup) -> Result<()> {
    let mut orchestrator = setup.orchestrator();
    let mut target = RuntimeCopyActivation::new(&setup.runtime_dir);
    let report = bootstrap(&mut orchestrator, &mut target, &setup.channel, &setup.authkey());

    match &report.update {
        Ok(outcome) => print_outcome(outcome),
        Err(e) => eprintln!("{} Update failed: {}", "✗".red(), e),
    }

    match report.activation {
        Some(Ok(())) => {
            println!(
                "{} Booted {}",
                "✓".green(),
                target.target_path().display().to_string().dimmed()
            );
            Ok(())
        }
        Some(Err(e)) => Err(anyhow!(e).context("Boot failed")),
        None => Err(anyhow!("Boot failed: no usable artifact on disk")),
    }
}

fn run_update_command(setup: &Setup, check_only: bool) -> Result<()> {
    let mut orchestrator = setup.orchestrator();

    if check_only {
        let plan = orchestrator.check(&setup.channel)?;
        let installed = plan.installed.as_deref().unwrap_or("none");
        if plan.update_needed {
            println!(
                "{} Update available: {} → {}",
                "↑".yellow(),
                installed.dimmed(),
                plan.target.name().green()
            );
            println!("  Run `intave-boot update` to install");
        } else {
            println!(
                "{} Installed version is current ({})",
                "✓".green(),
                plan.target.name()
            );
        }
        return Ok(());
    }

    let outcome = orchestrator.run(&setup.channel, &setup.authkey())?;
    print_outcome(&outcome);
    Ok(())
}

fn run_versions_command(setup: &Setup) -> Result<()> {
    let orchestrator = setup.orchestrator();
    let catalog = orchestrator.catalog()?;
    let installed = orchestrator.installed_version()?;

    if catalog.is_empty() {
        println!("{}", "No versions published (or catalog unavailable)".dimmed());
        return Ok(());
    }

    println!("{} ({})", "VERSIONS".bold(), catalog.len());
    for record in catalog.records() {
        let status = match record.status() {
            Status::Latest => record.status().name().yellow(),
            Status::Stable => record.status().name().green(),
            Status::Outdated => record.status().name().dimmed(),
        };
        let released = record
            .released_at()
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let is_installed = installed
            .as_deref()
            .map(|name| name.eq_ignore_ascii_case(record.name()))
            .unwrap_or(false);
        let mark = if is_installed { "●".green() } else { " ".normal() };

        println!("  {} {:<9} {:<20} {}", mark, status, record.name(), released.dimmed());
    }

    Ok(())
}

fn run_status_command(setup: &Setup) -> Result<()> {
    let orchestrator = setup.orchestrator();
    let artifact = orchestrator.artifact();
    let catalog = orchestrator.catalog_cache();

    println!("{}", "STATUS".bold());
    println!("  cache     {}", setup.root.path().display());
    println!("  channel   {}", setup.channel.to_uppercase());
    println!(
        "  installed {}",
        orchestrator
            .installed_version()?
            .unwrap_or_else(|| "none".to_string())
    );
    match artifact.len() {
        Some(len) if len > 0 => println!("  artifact  {} bytes", len),
        _ => println!("  artifact  {}", "missing".red()),
    }
    match catalog.age() {
        Some(age) => println!(
            "  catalog   refreshed {} ago{}",
            format_age(age),
            if catalog.is_fresh() { "" } else { " (stale)" }
        ),
        None => println!("  catalog   {}", "not cached".dimmed()),
    }

    Ok(())
}

fn print_outcome(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::UpToDate { version } => {
            println!("{} Installed version is current ({})", "✓".green(), version);
        }
        UpdateOutcome::Updated { from, to, bytes } => {
            println!(
                "{} Updated {} → {} ({} bytes)",
                "✓".green(),
                from.as_deref().unwrap_or("none").dimmed(),
                to.green(),
                bytes
            );
        }
    }
}

fn format_age(age: Duration) -> String {
    let minutes = age.as_secs() / 60;
    if minutes < 1 {
        "<1m".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 24 * 60 {
        format!("{}h", minutes / 60)
    } else {
        format!("{}d", minutes / (24 * 60))
    }
}
