use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use faultline::config::Config;
use faultline::localizer::{discover_classes, FaultLocalizer, LocalizationTarget};
use faultline::report::LocalizationReport;
use faultline::runner::ProcessRunner;

#[derive(Parser)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Rank suspicious source locations from an instrumented test run")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of configuration
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test suite once under instrumentation and report
    Localize(LocalizeArgs),
    /// Write a configuration file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args)]
struct LocalizeArgs {
    /// Directory the test runtime is started in
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Compiled classes of the program under repair
    #[arg(long)]
    src_classes: PathBuf,

    /// Compiled test classes
    #[arg(long)]
    test_classes: PathBuf,

    /// Extra classpath entry (repeatable)
    #[arg(long = "dependency")]
    dependencies: Vec<PathBuf>,

    /// Class to instrument (repeatable; discovered from --src-classes when absent)
    #[arg(long = "class")]
    classes: Vec<String>,

    /// Test class to execute (repeatable; discovered from --test-classes when absent)
    #[arg(long = "test")]
    tests: Vec<String>,

    /// Glob a discovered class must match, e.g. `org.example.*` (repeatable)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Glob excluding discovered classes (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Glob a discovered test class must match, e.g. `*Test` (repeatable)
    #[arg(long = "include-test")]
    include_tests: Vec<String>,

    /// Glob excluding discovered test classes (repeatable)
    #[arg(long = "exclude-test")]
    exclude_tests: Vec<String>,

    /// Only report locations scoring at least this much
    #[arg(long)]
    threshold: Option<f64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A broken config file must not stop `init-config --force` from replacing it
    let config = match (&cli.command, Config::load(cli.config.as_deref())) {
        (Commands::InitConfig { .. }, Err(_)) => Config::default(),
        (_, loaded) => loaded?,
    };

    // Initialize logging; stdout is reserved for the report
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().or_else(Config::default_config_path);
    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    match cli.command {
        Commands::Localize(args) => localize(config, args).await,
        Commands::InitConfig { force } => init_config(config_path.as_deref(), force),
    }
}

async fn localize(config: Config, args: LocalizeArgs) -> anyhow::Result<()> {
    let working_dir = match args.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    let classes = classes_or_discovered(
        args.classes,
        &working_dir.join(&args.src_classes),
        &args.include,
        &args.exclude,
    )?;
    let tests = classes_or_discovered(
        args.tests,
        &working_dir.join(&args.test_classes),
        &args.include_tests,
        &args.exclude_tests,
    )?;
    tracing::info!(
        "Localizing over {} classes with {} test classes",
        classes.len(),
        tests.len()
    );

    let target = LocalizationTarget::new(classes, tests, args.src_classes, args.test_classes)
        .with_working_dir(working_dir)
        .with_dependencies(args.dependencies);

    let runner = ProcessRunner::new(config.runtime.clone());
    let localizer = FaultLocalizer::run(&target, &runner, &config.localization).await;

    let threshold = args.threshold.unwrap_or(config.localization.threshold);
    let report = LocalizationReport::new(&localizer, threshold);

    if args.json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print!("{}", report.to_text());
    }

    Ok(())
}

fn classes_or_discovered(
    explicit: Vec<String>,
    dir: &Path,
    include: &[String],
    exclude: &[String],
) -> anyhow::Result<Vec<String>> {
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    let discovered = discover_classes(dir, include, exclude)?;
    if discovered.is_empty() {
        tracing::warn!("No classes found under {}", dir.display());
    }
    Ok(discovered)
}

fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path.context("No config path available")?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(Some(path))?;
    tracing::info!("Wrote default config to {}", path.display());
    println!("{}", path.display());
    Ok(())
}
