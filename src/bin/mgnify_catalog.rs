use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mgnify_catalog::app::App;
use mgnify_catalog::config::{ConfigLoader, ResolvedConfig};
use mgnify_catalog::domain::EntityKind;
use mgnify_catalog::ena::EnaHttpClient;
use mgnify_catalog::error::CatalogError;
use mgnify_catalog::mgx::{MetagenomicsExchange, MgxHttpTransport};
use mgnify_catalog::output::JsonOutput;
use mgnify_catalog::populate::PopulateOptions;
use mgnify_catalog::store::Store;
use mgnify_catalog::sync::SyncOptions;
use mgnify_catalog::visibility::Caller;

#[derive(Parser)]
#[command(name = "mgnify-catalog")]
#[command(about = "Keeps a metagenomics catalog in step with ENA and the Metagenomics Exchange")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Sync study status and release dates with ENA")]
    SyncStudies(SyncArgs),
    #[command(about = "Sync sample status with ENA")]
    SyncSamples(SyncArgs),
    #[command(about = "Sync run status with ENA")]
    SyncRuns(SyncArgs),
    #[command(about = "Sync assembly status with ENA")]
    SyncAssemblies(SyncArgs),
    #[command(about = "Register, update and withdraw analyses in the Metagenomics Exchange")]
    PopulateMgx(PopulateArgs),
    #[command(about = "Lift suppression from a single record")]
    Unsuppress(UnsuppressArgs),
    #[command(about = "List records visible to a caller")]
    List(ListArgs),
}

#[derive(Args)]
struct SyncArgs {
    #[arg(long = "accession")]
    accessions: Vec<String>,

    #[arg(long)]
    study: Option<String>,
}

#[derive(Args)]
struct PopulateArgs {
    #[arg(long = "study")]
    studies: Vec<String>,

    #[arg(long)]
    pipeline: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct UnsuppressArgs {
    kind: EntityKind,
    accession: String,
}

#[derive(Args)]
struct ListArgs {
    kind: EntityKind,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    superuser: bool,

    #[arg(long)]
    audit: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::MissingConfigValue(_)
        | CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_)
        | CatalogError::MissingCatalog(_) => 2,
        CatalogError::EnaHttp(_)
        | CatalogError::EnaStatus { .. }
        | CatalogError::MgxHttp(_)
        | CatalogError::MgxStatus { .. } => 3,
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
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::SyncStudies(args) => run_sync(EntityKind::Study, args, &config),
        Commands::SyncSamples(args) => run_sync(EntityKind::Sample, args, &config),
        Commands::SyncRuns(args) => run_sync(EntityKind::Run, args, &config),
        Commands::SyncAssemblies(args) => run_sync(EntityKind::Assembly, args, &config),
        Commands::PopulateMgx(args) => run_populate(args, &config),
        Commands::Unsuppress(args) => run_unsuppress(args, &config),
        Commands::List(args) => run_list(args, &config),
    }
}

fn open_app(config: &ResolvedConfig) -> Result<App<Store>, CatalogError> {
    App::open(Store::new(config.catalog_path.clone()))
}

fn run_sync(kind: EntityKind, args: SyncArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let ena = EnaHttpClient::new(&config.ena_base_url)?;
    let mut app = open_app(config)?;

    let mut options = SyncOptions::new(Utc::now());
    options.page_size = config.page_size;
    options.accessions = args.accessions;
    options.study = args
        .study
        .map(|study| EntityKind::Study.parse_accession(&study))
        .transpose()?;

    let report = app.sync(kind, &ena, &options)?;
    JsonOutput::print_sync(&report).into_diagnostic()?;
    Ok(())
}

fn run_populate(args: PopulateArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let settings = config.mgx()?;
    let transport = MgxHttpTransport::new(&settings.base_url, settings.token.as_deref())?;
    let mgx = MetagenomicsExchange::new(transport, &settings.broker, &settings.endpoint_base);
    let mut app = open_app(config)?;

    let mut options = PopulateOptions::new(Utc::now());
    options.page_size = config.page_size;
    options.study_accessions = args.studies;
    options.pipeline_version = args.pipeline;
    options.dry_run = args.dry_run;

    let report = app.populate(&mgx, &options)?;
    JsonOutput::print_populate(&report).into_diagnostic()?;
    Ok(())
}

fn run_unsuppress(args: UnsuppressArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let accession = args.kind.parse_accession(&args.accession)?;
    let mut app = open_app(config)?;
    let result = app.unsuppress(args.kind, &accession, Utc::now())?;
    JsonOutput::print_unsuppress(&result).into_diagnostic()?;
    Ok(())
}

fn run_list(args: ListArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let caller = match (args.user.as_deref(), args.superuser) {
        (Some(user), true) => Caller::superuser(user),
        (None, true) => Caller::superuser("admin"),
        (Some(user), false) => Caller::user(user),
        (None, false) => Caller::Anonymous,
    };
    let app = open_app(config)?;
    let result = app.list(args.kind, &caller, args.audit);
    JsonOutput::print_list(&result).into_diagnostic()?;
    Ok(())
}
