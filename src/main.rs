use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;

use version_watch::app::{
    ApiResponse, CheckRequest, CompareRequest, CreateServiceInput, UpdateServiceInput,
    UpdateVersionRequest, VersionWatch,
};
use version_watch::config::{self, AppConfig};
use version_watch::logging::init_logging;
use version_watch::orchestrator::CheckOptions;
use version_watch::service::platform::Platform;
use version_watch::store::filter::ServiceFilter;
use version_watch::version::status::DriftStatus;

#[derive(Parser)]
#[command(name = "version-watch")]
#[command(version, about = "Track SDK versions across platforms and report drift")]
struct Cli {
    /// Configuration file (defaults to <data dir>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSON logs to a file (`--log-file` alone uses
    /// <data dir>/version-watch.log, `--log-file=PATH` picks the file)
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, value_name = "PATH")]
    log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn log_file(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(config::log_path))
    }
}

#[derive(Subcommand)]
enum Command {
    /// List services, optionally filtered
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long)]
        status: Option<DriftStatus>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one service
    Show { id: String },
    /// Check latest versions; all services when no id is given
    Check {
        ids: Vec<String>,
        #[arg(long)]
        concurrency: Option<usize>,
        /// Comma-separated platforms to check
        #[arg(long, value_delimiter = ',')]
        platforms: Vec<Platform>,
        /// Ignore cached scraper results
        #[arg(long)]
        force_refresh: bool,
    },
    /// Compare 2 to 4 services side by side
    Compare {
        ids: Vec<String>,
        /// Comma-separated platforms to compare
        #[arg(long, value_delimiter = ',')]
        platforms: Vec<Platform>,
    },
    /// Record a new current version for one platform
    SetVersion {
        id: String,
        platform: String,
        version: String,
    },
    /// Create a service from a JSON input file
    Create { input: PathBuf },
    /// Update a service from a JSON input file
    Update { id: String, input: PathBuf },
    /// Delete a service
    Delete { id: String },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file().as_deref())?;

    let config_path = cli.config.unwrap_or_else(config::config_path);
    let config = AppConfig::load(&config_path)?;

    let success = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command, &config))?;

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(command: Command, config: &AppConfig) -> anyhow::Result<bool> {
    let app = VersionWatch::from_config(config)?;

    match command {
        Command::List {
            category,
            platform,
            status,
            search,
        } => {
            let filter = ServiceFilter {
                category,
                platform,
                status,
                search,
            };
            print(app.get_all_services(&filter).await)
        }
        Command::Show { id } => print(app.get_service_by_id(&id).await),
        Command::Check {
            ids,
            concurrency,
            platforms,
            force_refresh,
        } => {
            let request = CheckRequest {
                service_ids: non_empty(ids),
                options: CheckOptions {
                    concurrency,
                    platforms: non_empty(platforms),
                    force_refresh,
                },
            };
            print(app.check_version_updates(request).await)
        }
        Command::Compare { ids, platforms } => {
            let request = CompareRequest {
                service_ids: ids,
                platforms: non_empty(platforms),
            };
            print(app.compare_services(request).await)
        }
        Command::SetVersion {
            id,
            platform,
            version,
        } => {
            let request = UpdateVersionRequest {
                service_id: id,
                platform,
                new_version: version,
            };
            print(app.update_service_version(request).await)
        }
        Command::Create { input } => {
            let input: CreateServiceInput = read_input(&input)?;
            print(app.create_service(input).await)
        }
        Command::Update { id, input } => {
            let input: UpdateServiceInput = read_input(&input)?;
            print(app.update_service(&id, input).await)
        }
        Command::Delete { id } => print(app.delete_service(&id).await),
    }
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() { None } else { Some(values) }
}

fn read_input<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid input file {:?}", path))
}

fn print<T: Serialize>(response: ApiResponse<T>) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.success)
}
