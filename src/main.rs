use anyhow::Result;
use clap::Parser;
use chart_tracker::commands::{self, Config};
use chart_tracker::tracker::LogoPolicy;
use log::warn;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// chart-tracker - Helm chart repository tracker
///
/// Keeps a local catalog in sync with the charts published by Helm chart
/// repositories. Each `track` run registers new or changed chart versions
/// and unregisters the ones that disappeared from the repository index.
///
/// Examples:
///   chart-tracker repo add stable https://charts.example.com
///   chart-tracker track
///   chart-tracker errors stable
#[derive(Parser, Debug)]
#[command(author, version = env!("CHART_TRACKER_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (overrides defaults; also via CHART_TRACKER_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "CHART_TRACKER_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Sync the catalog with the tracked repositories
    Track(TrackArgs),

    /// Manage tracked repositories
    #[command(subcommand)]
    Repo(RepoCommands),

    /// List the packages registered for a repository
    Packages(RepoArg),

    /// Show the errors reported by the last tracking run of a repository
    Errors(RepoArg),
}

#[derive(clap::Subcommand, Debug)]
enum RepoCommands {
    /// Start tracking a chart repository
    Add {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "URL")]
        url: String,
    },

    /// List tracked repositories
    List,

    /// Stop tracking a repository and drop its packages
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(clap::Args, Debug)]
pub struct RepoArg {
    #[arg(value_name = "REPO")]
    pub repo: String,
}

#[derive(clap::Args, Debug)]
pub struct TrackArgs {
    /// Only track the named repository (can be repeated)
    #[arg(long = "repo", value_name = "NAME")]
    pub repos: Vec<String>,

    /// Number of concurrent workers (defaults to the number of CPUs)
    #[arg(long, env = "CHART_TRACKER_WORKERS", value_name = "N")]
    pub workers: Option<usize>,

    /// Capacity of the job queue
    #[arg(long, value_name = "N", default_value_t = chart_tracker::tracker::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// When chart logos are fetched
    #[arg(long, value_enum, default_value_t = LogoPolicy::Latest)]
    pub logo_policy: LogoPolicy,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = commands::config::DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Attempts per HTTP request
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub retries: usize,
}

impl TrackArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.tracker.workers = workers.max(1);
        }
        config.tracker.queue_capacity = self.queue_capacity.max(1);
        config.tracker.logo_policy = self.logo_policy;
        config.timeout = Duration::from_secs(self.timeout);
        config.retries = self.retries.max(1);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    chart_tracker::logging::init(cli.verbose);
    chart_tracker::logging::install_panic_hook();

    let runtime = chart_tracker::runtime::RealRuntime;
    let mut config = Config::new(&runtime, cli.root)?;

    match cli.command {
        Commands::Track(args) => {
            args.apply(&mut config);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping workers");
                    on_signal.cancel();
                }
            });

            commands::track(runtime, &config, &args.repos, cancel).await?;
        }
        Commands::Repo(RepoCommands::Add { name, url }) => {
            commands::repo_add(runtime, &config, &name, &url).await?
        }
        Commands::Repo(RepoCommands::List) => commands::repo_list(runtime, &config).await?,
        Commands::Repo(RepoCommands::Remove { name }) => {
            commands::repo_remove(runtime, &config, &name).await?
        }
        Commands::Packages(args) => commands::packages(runtime, &config, &args.repo).await?,
        Commands::Errors(args) => commands::errors(runtime, &config, &args.repo).await?,
    }
    Ok(())
}
