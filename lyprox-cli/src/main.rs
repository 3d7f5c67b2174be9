//! `lyprox` command line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use lyprox_core::{DatasetIdentity, LoaderConfig};
use lyprox_loader::{read_specs, register_all, CohortStore, DatasetLoader, DatasetSpec};
use lyprox_remote::GithubClient;
use lyprox_storage::InMemoryRecordStore;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_COLLECTION: &str = "rmnldwg/lydata";

#[derive(Parser, Debug)]
#[command(name = "lyprox", version, about = "LyProX dataset pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load datasets from a JSON file or from a single specification.
    AddDatasets(AddDatasetsArgs),
    /// Print the durable cache key of a dataset identity.
    CacheKey(IdentityArgs),
    /// Print the active modality and level catalog as JSON.
    Catalog,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["from_file", "year"])))]
struct AddDatasetsArgs {
    /// JSON file with a list of dataset specifications.
    #[arg(long, value_name = "FILE")]
    from_file: Option<PathBuf>,
    #[arg(long, requires_all = ["institution", "subsite", "repo_name", "git_ref"])]
    year: Option<i32>,
    #[arg(long)]
    institution: Option<String>,
    #[arg(long)]
    subsite: Option<String>,
    /// Repository holding the dataset, e.g. `rmnldwg/lydata`.
    #[arg(long)]
    repo_name: Option<String>,
    /// Git reference (tag, branch or commit) of the dataset version.
    #[arg(long = "ref")]
    git_ref: Option<String>,
    /// Reload datasets that are already registered.
    #[arg(long)]
    replace_existing: bool,
}

impl AddDatasetsArgs {
    fn specs(&self) -> Result<Vec<DatasetSpec>> {
        if let Some(path) = &self.from_file {
            return read_specs(path).with_context(|| {
                format!("reading dataset specifications from {}", path.display())
            });
        }

        match (&self.year, &self.institution, &self.subsite, &self.repo_name, &self.git_ref) {
            (Some(year), Some(institution), Some(subsite), Some(repo_name), Some(git_ref)) => {
                Ok(vec![DatasetSpec {
                    year: *year,
                    institution: institution.clone(),
                    subsite: subsite.clone(),
                    repo_name: repo_name.clone(),
                    git_ref: git_ref.clone(),
                }])
            }
            _ => bail!("--year, --institution, --subsite, --repo-name and --ref are all required"),
        }
    }
}

#[derive(Args, Debug)]
struct IdentityArgs {
    #[arg(long)]
    year: i32,
    #[arg(long)]
    institution: String,
    #[arg(long)]
    subsite: String,
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    repo_name: String,
    #[arg(long = "ref", default_value = "main")]
    git_ref: String,
}

impl IdentityArgs {
    fn identity(&self) -> Result<DatasetIdentity> {
        Ok(DatasetIdentity::new(
            self.year,
            &self.institution,
            &self.subsite,
            &self.repo_name,
            &self.git_ref,
        )?)
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `lyprox=info`), as JSON
/// when `LYPROX_LOG_JSON` is set.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lyprox=info"));
    let json = std::env::var("LYPROX_LOG_JSON")
        .map(|value| !matches!(value.trim(), "" | "0" | "false"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).try_init()
    };
    if let Err(e) = result {
        eprintln!("failed to initialize logging: {}", e);
    }
}

async fn add_datasets(args: &AddDatasetsArgs) -> Result<()> {
    let specs = args.specs()?;
    let config = LoaderConfig::from_env();
    tracing::info!(
        datasets = specs.len(),
        cache_dir = %config.cache_dir.display(),
        replace_existing = args.replace_existing,
        "Registering datasets"
    );
    let github = Arc::new(GithubClient::from_config(&config)?);
    let loader = DatasetLoader::from_config(
        &config,
        github.clone(),
        github,
        Arc::new(InMemoryRecordStore::new()),
    )
    .context("setting up the dataset loader")?;
    let cohort = CohortStore::new();

    let report = register_all(&loader, &cohort, &specs, args.replace_existing).await;

    for name in &report.registered {
        println!("added    {}", name);
    }
    for name in &report.skipped {
        println!("skipped  {}", name);
    }
    for failure in &report.failures {
        println!("failed   {}: {}", failure.name, failure.error);
    }

    if !report.is_success() {
        bail!(
            "{} of {} dataset(s) could not be added",
            report.failures.len(),
            report.total()
        );
    }
    Ok(())
}

fn print_catalog() -> Result<()> {
    let catalog = LoaderConfig::from_env().load_catalog()?;
    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::AddDatasets(args) => add_datasets(args).await,
        Commands::CacheKey(args) => {
            let identity = args.identity()?;
            tracing::debug!(dataset = %identity, "Computing cache key");
            println!("{}  {}", identity.cache_key(), identity);
            Ok(())
        }
        Commands::Catalog => print_catalog(),
    }
}
