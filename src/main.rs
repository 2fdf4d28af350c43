use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use wheelhouse::config::Settings;
use wheelhouse::generate::generate;
use wheelhouse::github::{DEFAULT_API_URL, GitHub};
use wheelhouse::http::{Credentials, HttpClient};
use wheelhouse::import::Importer;
use wheelhouse::store::Store;

/// wheelhouse - static package index builder
///
/// Pulls release artifacts from GitHub repositories into a local store and
/// renders a pip-compatible package index from it.
///
/// Examples:
///   wheelhouse import acme/widgets      # Record releases of acme/widgets
///   wheelhouse generate                 # Re-render the index pages
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(
        long = "config",
        short = 'c',
        value_name = "FILE",
        default_value = "config.json",
        global = true
    )]
    pub config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long = "verbose", short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Import release artifacts from one or more repositories
    Import(ImportArgs),

    /// Render the index pages from the store
    Generate(GenerateArgs),
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Repositories in the format "owner/repo"
    #[arg(value_name = "OWNER/REPO", required = true)]
    pub repositories: Vec<String>,

    /// Username for authenticating against the API
    #[arg(long = "username", short = 'u', env = "WHEELHOUSE_USERNAME")]
    pub username: Option<String>,

    /// Password or token for authenticating against the API
    #[arg(
        long = "password",
        short = 'p',
        env = "WHEELHOUSE_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// API URL (defaults to https://api.github.com)
    #[arg(long = "api-url", value_name = "URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Record into the store without re-rendering the index pages
    #[arg(long = "no-generate")]
    pub no_generate: bool,
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Import(args) => import(&cli.config, args).await?,
        Commands::Generate(_args) => regenerate(&cli.config)?,
    }
    Ok(())
}

async fn import(config: &PathBuf, args: ImportArgs) -> Result<()> {
    let settings = Settings::load(config)?;
    let mut store = Store::open(settings.store_path())
        .with_context(|| format!("Failed to open store {}", settings.store_path().display()))?;

    let credentials = args.username.map(|username| Credentials {
        username,
        password: args.password,
    });
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let http = HttpClient::new(client, credentials);
    let api = GitHub::new(http.clone(), args.api_url);

    let report = Importer::new(&api, &http, &mut store, settings.files_dir())
        .run(&args.repositories)
        .await?;
    println!("{}", report);

    if args.no_generate {
        return Ok(());
    }
    if report.is_noop() {
        info!("Nothing new recorded; regenerating anyway to keep pages current");
    }
    let report = generate(&store, &settings)?;
    println!("{}", report);
    Ok(())
}

fn regenerate(config: &PathBuf) -> Result<()> {
    let settings = Settings::load(config)?;
    let store = Store::open_read_only(settings.store_path())
        .with_context(|| format!("Failed to read store {}", settings.store_path().display()))?;
    let report = generate(&store, &settings)?;
    println!("{}", report);
    Ok(())
}
