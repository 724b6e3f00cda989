use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_geo::app::{App, TracingSink};
use kira_geo::config::{ConfigLoader, ResolvedConfig};
use kira_geo::domain::{AccessionRequest, parse_accession_list};
use kira_geo::error::KiraError;
use kira_geo::geo::GeoHttpClient;
use kira_geo::output::JsonOutput;
use kira_geo::store::Store;
use kira_geo::transfer::VerifyMode;

#[derive(Parser)]
#[command(name = "kira-geo")]
#[command(about = "Reconcile and download GEO supplementary files")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Path to kira-geo.json")]
    config: Option<String>,

    #[arg(long, global = true, help = "Directory for metadata, report and file tree")]
    workspace: Option<Utf8PathBuf>,

    #[arg(long, global = true, help = "Directory receiving downloaded files and logs")]
    cache_root: Option<Utf8PathBuf>,

    #[arg(long, global = true, help = "Parallel metadata fetches")]
    parallel: Option<usize>,

    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    #[arg(long, global = true, help = "Read timeout per transfer attempt, in seconds")]
    timeout: Option<u64>,

    #[arg(long, global = true, help = "Pause between transfer attempts, in milliseconds")]
    backoff_ms: Option<u64>,

    #[arg(long, global = true, help = "How to treat files that already exist")]
    verify: Option<VerifyMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch metadata records into the workspace")]
    Metadata(IdsArgs),
    #[command(about = "Build the file tree and placement statistics from stored metadata")]
    Analyze,
    #[command(about = "Download every file referenced by stored metadata")]
    Download,
    #[command(about = "Fetch metadata, analyze and download in one go")]
    Run(IdsArgs),
}

#[derive(Args, Clone)]
struct IdsArgs {
    #[arg(help = "GEO accessions separated by commas or spaces")]
    ids: Vec<String>,

    #[arg(long, help = "Do not fetch the samples of each series")]
    no_children: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidAccession(_)
        | KiraError::MalformedRecord { .. }
        | KiraError::EmptyTree
        | KiraError::MissingConfig
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InvalidParallelism(_) => 2,
        KiraError::GeoHttp(_)
        | KiraError::GeoStatus { .. }
        | KiraError::Transfer { .. }
        | KiraError::Fetch { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = apply_overrides(
        ConfigLoader::resolve_or_default(cli.config.as_deref()).into_diagnostic()?,
        &cli,
    )
    .into_diagnostic()?;

    let store = match &cli.workspace {
        Some(workspace) => Store::new_with_paths(workspace.clone(), config.cache_root.clone()),
        None => {
            let default = Store::new().into_diagnostic()?;
            Store::new_with_paths(default.workspace().to_path_buf(), config.cache_root.clone())
        }
    };

    let client = GeoHttpClient::new()
        .and_then(|client| client.with_read_timeout(config.transfer.read_timeout))
        .into_diagnostic()?
        .with_soft_cache(store.soft_cache_dir());
    let app = App::new(store, client.clone(), client, config.transfer.clone());

    match cli.command {
        Commands::Metadata(args) => {
            let requests = requests_for(&args, &config).into_diagnostic()?;
            let (result, _) = app
                .fetch_metadata(&requests, config.parallelism, &TracingSink)
                .into_diagnostic()?;
            JsonOutput::print_metadata(&result).into_diagnostic()
        }
        Commands::Analyze => {
            let result = app.analyze(&TracingSink).into_diagnostic()?;
            JsonOutput::print_analyze(&result).into_diagnostic()
        }
        Commands::Download => {
            let result = app.download(&TracingSink).into_diagnostic()?;
            JsonOutput::print_download(&result).into_diagnostic()
        }
        Commands::Run(args) => {
            let requests = requests_for(&args, &config).into_diagnostic()?;
            let result = app
                .run(&requests, config.parallelism, &TracingSink)
                .into_diagnostic()?;
            JsonOutput::print_run(&result).into_diagnostic()
        }
    }
}

fn apply_overrides(mut config: ResolvedConfig, cli: &Cli) -> Result<ResolvedConfig, KiraError> {
    if let Some(root) = &cli.cache_root {
        config.cache_root = root.clone();
    }
    if let Some(parallel) = cli.parallel {
        if parallel == 0 {
            return Err(KiraError::InvalidParallelism(parallel));
        }
        config.parallelism = parallel;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.transfer.max_attempts = max_attempts.max(1);
    }
    if let Some(timeout) = cli.timeout {
        config.transfer.read_timeout = Duration::from_secs(timeout);
    }
    if let Some(backoff) = cli.backoff_ms {
        config.transfer.backoff = Duration::from_millis(backoff);
    }
    if let Some(verify) = cli.verify {
        config.transfer.verify = verify;
    }
    Ok(config)
}

fn requests_for(
    args: &IdsArgs,
    config: &ResolvedConfig,
) -> Result<Vec<AccessionRequest>, KiraError> {
    if args.ids.is_empty() {
        return Ok(config.accessions.clone());
    }
    let ids = parse_accession_list(&args.ids.join(" "))?;
    Ok(ids
        .into_iter()
        .map(|id| AccessionRequest {
            id,
            include_children: !args.no_children,
        })
        .collect())
}
