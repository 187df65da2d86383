//! mlvault CLI
//!
//! Entry point for the `mlvault` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use mlvault::config::{set_path, EffectiveConfig};
use mlvault::driver::{download_object_or_prefix, DriverSettings};
use mlvault::rest_client::RestClient;
use mlvault::{
    logging, AssetError, AssetSpec, AssetsConfig, AssumeYes, Confirm, RemoteUrl, StorageProvider,
    TerminalPrompt,
};
use serde_json::Value;
use tempfile::TempDir;

#[derive(Parser)]
#[command(name = "mlvault")]
#[command(about = "Versioned asset store for ML models", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Environment prefix (dev, preprod, prod)
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Answer yes to every confirmation prompt
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new asset at its initial version
    ///
    /// Fails if the version already exists (use `update` instead).
    New {
        /// Local file or directory, or a remote locator (gs://, http://, file://)
        asset_path: String,

        /// Asset name; any version information is ignored
        asset_spec: String,

        /// Validate and report without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Push a new version of an existing asset
    ///
    /// Bumps the minor version of the latest (or of the given major) by default.
    Update {
        /// Local file or directory, or a remote locator (gs://, http://, file://)
        asset_path: String,

        /// `name[:version]`
        asset_spec: String,

        /// Push a new major version (1.0, 2.0, ...)
        #[arg(long)]
        bump_major: bool,

        /// Validate and report without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// List all assets and their versions
    List,

    /// Fetch an asset into the local cache, downloading if necessary
    Fetch {
        /// `name[:version]`
        asset: String,

        /// Download even when the version is cached
        #[arg(long)]
        download: bool,
    },

    /// Create or update an asset from a local path
    Push(PushArgs),

    /// Pull an asset version into a local directory
    Clone {
        #[arg(long)]
        name: String,

        #[arg(long)]
        version: String,

        /// Directory to write into (default: current directory)
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Blob service URL; clones over HTTP instead of through the store
        #[arg(long)]
        rest_url: Option<String>,
    },

    /// Upload a packed asset to a deployment target on the blob service
    Deploy {
        #[arg(long)]
        name: String,

        #[arg(long)]
        version: String,

        /// File or directory to deploy
        #[arg(long)]
        path: PathBuf,

        /// Deployment directory on the server
        #[arg(long)]
        target: String,

        /// Blob service URL (default: storage.rest_url)
        #[arg(long)]
        rest_url: Option<String>,
    },

    /// Print the effective configuration (secrets redacted)
    Config,
}

#[derive(Args)]
struct PushArgs {
    /// Asset name
    #[arg(long)]
    name: String,

    /// File or directory to push
    #[arg(long)]
    filename: String,

    /// Push a new version of an existing asset instead of creating it
    #[arg(long)]
    update: bool,

    /// With --update, push a new major version
    #[arg(long)]
    bump_major: bool,

    /// Validate and report without writing
    #[arg(long)]
    dry_run: bool,
}

/// What the command resolved from config and flags.
struct Context {
    effective: EffectiveConfig,
    prefix: Option<String>,
    confirm: Arc<dyn Confirm>,
}

impl Context {
    fn settings(&self) -> &AssetsConfig {
        &self.effective.settings
    }

    fn provider(&self) -> Result<StorageProvider, AssetError> {
        self.settings()
            .build_provider(self.prefix.as_deref(), self.confirm.clone())
    }

    fn rest_client(&self, rest_url: Option<String>) -> Result<RestClient, AssetError> {
        let url = rest_url
            .or_else(|| self.settings().storage.rest_url.clone())
            .ok_or_else(|| {
                AssetError::Config("a blob service URL is required (--rest-url)".to_string())
            })?;
        RestClient::new(&url, self.settings().http_timeout, self.settings().retry)
    }

    fn ask(&self, question: &str) -> bool {
        self.confirm.confirm(question, "[y/N]")
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let context = match load_context(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::New {
            asset_path,
            asset_spec,
            dry_run,
        } => run_new(&context, &asset_path, &asset_spec, dry_run),
        Commands::Update {
            asset_path,
            asset_spec,
            bump_major,
            dry_run,
        } => run_update(&context, &asset_path, &asset_spec, bump_major, dry_run),
        Commands::List => run_list(&context),
        Commands::Fetch { asset, download } => run_fetch(&context, &asset, download),
        Commands::Push(args) => {
            if args.update {
                run_update(&context, &args.filename, &args.name, args.bump_major, args.dry_run)
            } else {
                run_new(&context, &args.filename, &args.name, args.dry_run)
            }
        }
        Commands::Clone {
            name,
            version,
            dest,
            rest_url,
        } => run_clone(&context, &name, &version, dest, rest_url),
        Commands::Deploy {
            name,
            version,
            path,
            target,
            rest_url,
        } => run_deploy(&context, &name, &version, &path, &target, rest_url),
        Commands::Config => run_config(&context),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_context(cli: &Cli) -> Result<Context, AssetError> {
    let mut overrides = Value::Null;
    if let Some(prefix) = &cli.prefix {
        set_path(&mut overrides, "storage.prefix", Value::String(prefix.clone()));
    }
    let overrides = (!overrides.is_null()).then_some(overrides);
    let effective = EffectiveConfig::from_process_env(cli.config.as_deref(), overrides)?;

    let confirm: Arc<dyn Confirm> = if cli.yes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(TerminalPrompt)
    };

    Ok(Context {
        effective,
        prefix: cli.prefix.clone(),
        confirm,
    })
}

/// Local path for `source`, downloading remote locators into `scratch`.
fn materialize_source(
    context: &Context,
    source: &str,
    scratch: &TempDir,
) -> Result<PathBuf, AssetError> {
    let local = Path::new(source);
    if local.exists() || !RemoteUrl::looks_remote(source) {
        return Ok(local.to_path_buf());
    }

    let remote = RemoteUrl::parse(source)?;
    let bucket = match remote.kind {
        mlvault::DriverKind::Rest => format!("{}://{}", remote.scheme, remote.bucket),
        mlvault::DriverKind::Local => format!("/{}", remote.bucket),
        mlvault::DriverKind::Gcs => remote.bucket.clone(),
    };
    let settings = context.settings();
    let driver = DriverSettings::new(remote.kind, bucket)
        .with_token(settings.storage.gcs_token.clone())
        .with_timeout(settings.http_timeout)
        .with_retry(settings.retry)
        .build()?;
    tracing::info!(source = %remote, "downloading remote asset source");
    download_object_or_prefix(driver.as_ref(), &remote.object_name, scratch.path())
}

fn print_destination(provider: &StorageProvider, asset_spec: &str) {
    println!("Destination assets provider:");
    println!("{}", provider.describe());
    println!("Current asset: `{}`", asset_spec);
}

fn run_new(
    context: &Context,
    asset_path: &str,
    asset_spec: &str,
    dry_run: bool,
) -> Result<(), AssetError> {
    let provider = context.provider()?;
    print_destination(&provider, asset_spec);

    let spec = AssetSpec::parse_with(asset_spec, provider.policy())?;
    let version = provider.policy().initial_version();
    println!(" - name = `{}`", spec.name);

    if !context.ask(&format!(
        "Push a new asset `{}` with version `{}`?",
        spec.name, version
    )) {
        println!("Aborting.");
        return Ok(());
    }

    let scratch = TempDir::new()?;
    let source = materialize_source(context, asset_path, &scratch)?;
    let report = provider.new_asset(&source, &spec.name, &version, dry_run)?;
    print_report(&report);
    Ok(())
}

fn run_update(
    context: &Context,
    asset_path: &str,
    asset_spec: &str,
    bump_major: bool,
    dry_run: bool,
) -> Result<(), AssetError> {
    match update(context, asset_path, asset_spec, bump_major, dry_run) {
        Err(e) if e.is_not_found() => {
            println!("Remote asset not found. Create it first using `new`");
            process::exit(1);
        }
        other => other,
    }
}

fn update(
    context: &Context,
    asset_path: &str,
    asset_spec: &str,
    bump_major: bool,
    dry_run: bool,
) -> Result<(), AssetError> {
    let provider = context.provider()?;
    print_destination(&provider, asset_spec);

    let spec = AssetSpec::parse_with(asset_spec, provider.policy())?;
    println!(" - name = `{}`", spec.name);
    if let Some(version) = &spec.version {
        println!(" - version = `{}`", version);
    }

    let versions = provider.get_versions_info(&spec.name)?;
    if versions.is_empty() {
        return Err(AssetError::not_found(
            provider.driver().bucket(),
            format!("{}/{}", provider.prefix(), spec.name),
        ));
    }
    let plan = provider
        .policy()
        .plan_update(spec.version.as_deref(), &versions, bump_major)?;
    println!("{}", plan.description);

    if !context.ask(&format!(
        "Push a new asset version `{}` for `{}`?",
        plan.new_version, spec.name
    )) {
        println!("Aborting.");
        return Ok(());
    }

    let scratch = TempDir::new()?;
    let source = materialize_source(context, asset_path, &scratch)?;
    let report = provider.update(&source, &spec.name, &plan.new_version, dry_run)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &mlvault::PushReport) {
    let verb = if report.dry_run { "Would push" } else { "Pushed" };
    println!(
        "{} `{}` version `{}` ({} files)",
        verb,
        report.name,
        report.version,
        report.manifest.contents.len()
    );
    for removed in &report.removed {
        println!("  removed stale object `{}`", removed);
    }
}

fn run_list(context: &Context) -> Result<(), AssetError> {
    let provider = context.provider()?;
    println!("Assets store");
    println!("{}", provider.describe());
    println!();

    let policy = provider.policy();
    let mut n_assets = 0;
    let mut n_versions = 0;
    for entry in provider.iterate_assets() {
        let (name, versions) = entry?;
        let versions = policy.sort(&versions).unwrap_or(versions);
        println!("{:<40} {}", name, versions.join(" "));
        n_assets += 1;
        n_versions += versions.len();
    }
    println!();
    println!(
        "Found {} assets ({} different versions)",
        n_assets, n_versions
    );
    Ok(())
}

fn run_fetch(context: &Context, asset: &str, download: bool) -> Result<(), AssetError> {
    let manager = context
        .settings()
        .build_manager(context.prefix.as_deref(), context.confirm.clone())?;
    let fetched = manager.fetch_asset(asset, true, download)?;

    println!("{}", fetched.path.display());
    if let Some(info) = &fetched.info {
        println!("{}", serde_json::to_string_pretty(info)?);
    }
    Ok(())
}

fn run_clone(
    context: &Context,
    name: &str,
    version: &str,
    dest: Option<PathBuf>,
    rest_url: Option<String>,
) -> Result<(), AssetError> {
    let dest = match dest {
        Some(d) => d,
        None => std::env::current_dir()?,
    };

    if rest_url.is_none() && context.settings().storage.provider != mlvault::DriverKind::Rest {
        let provider = context.provider()?;
        let manager = mlvault::AssetsManager::new(provider, dest);
        let fetched = manager.fetch_asset(&format!("{}:{}", name, version), false, false)?;
        println!("Cloned `{}:{}` into {}", name, fetched.version, fetched.path.display());
        return Ok(());
    }

    let client = context.rest_client(rest_url)?;
    let env = context
        .prefix
        .clone()
        .unwrap_or_else(|| context.settings().storage.prefix.clone());
    println!("Destination assets provider:");
    println!(" - storage driver = `rest`");
    println!(" - remote host = `{}`", client.base_url());
    println!(" - remote model = `{}:{}` ({})", name, version, env);
    if !context.ask(&format!("Clone into `{}`?", dest.display())) {
        println!("Aborting.");
        return Ok(());
    }

    let files = client.clone_version(name, version, &env, &dest)?;
    println!("Cloned {} files into {}", files.len(), dest.display());
    Ok(())
}

fn run_deploy(
    context: &Context,
    name: &str,
    version: &str,
    path: &Path,
    target: &str,
    rest_url: Option<String>,
) -> Result<(), AssetError> {
    let client = context.rest_client(rest_url)?;
    println!("Destination assets provider:");
    println!(" - storage driver = `rest`");
    println!(" - remote host = `{}`", client.base_url());
    println!(" - remote model = `{}:{}`", name, version);
    println!(" - deploy target = `{}`", target);
    println!("Current asset: `{}`", path.display());

    if !context.ask(&format!("Deploy `{}` to `{}`?", path.display(), target)) {
        println!("Aborting.");
        return Ok(());
    }

    let response = client.deploy(path, name, version, target)?;
    println!("{}: {}", response.status, response.details);
    Ok(())
}

fn run_config(context: &Context) -> Result<(), AssetError> {
    println!("{}", context.effective.to_json()?);
    Ok(())
}
