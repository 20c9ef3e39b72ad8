//! k3s-deploy CLI
//!
//! Entry point for the `k3s-deploy` command-line tool.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use k3s_deploy::bootstrap::{Bootstrap, BootstrapSettings, StepOutcome};
use k3s_deploy::config::{self, Configuration, ProcessEnvironment, DEFAULT_CONFIG_FILE};
use k3s_deploy::host::{SshConfig, SshShell};
use k3s_deploy::kubeconfig::default_kubeconfig_path;
use k3s_deploy::logging::{initialize_logging, LOG_ENV};
use k3s_deploy::manifest::{self, ChartInput, CHART_DIR};
use k3s_deploy::tool::SystemRunner;
use k3s_deploy::{image, release, Result};

#[derive(Parser)]
#[command(name = "k3s-deploy")]
#[command(about = "Automate deployments to single-node k3s servers", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log at debug level (K3S_DEPLOY_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init,

    /// Install k3s and cert-manager on the server and fetch its kubeconfig
    Setup {
        /// Local kubeconfig to update (default: ~/.kube/config)
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Do not generate the Helm chart afterwards
        #[arg(long)]
        skip_charts: bool,
    },

    /// Generate or update the Helm chart
    Generate {
        /// Chart directory
        #[arg(long, short = 'o', default_value = CHART_DIR)]
        output: PathBuf,
    },

    /// Build and push the image, then install or upgrade the release
    Deploy {
        /// Use the image already in the registry
        #[arg(long)]
        skip_build: bool,

        /// Chart directory
        #[arg(long, default_value = CHART_DIR)]
        chart: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    initialize_logging(LOG_ENV, cli.verbose);

    let result = match cli.command {
        Commands::Init => run_init(&cli.config),
        Commands::Setup {
            kubeconfig,
            skip_charts,
        } => run_setup(&cli.config, kubeconfig, skip_charts),
        Commands::Generate { output } => run_generate(&cli.config, &output),
        Commands::Deploy { skip_build, chart } => run_deploy(&cli.config, skip_build, &chart),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run_init(config_path: &Path) -> Result<()> {
    config::write_starter(config_path)?;
    println!("Created {}", config_path.display());
    Ok(())
}

fn run_setup(config_path: &Path, kubeconfig: Option<PathBuf>, skip_charts: bool) -> Result<()> {
    let config = Configuration::from_file(config_path)?;
    let env = ProcessEnvironment;

    let kubeconfig_path = match kubeconfig {
        Some(path) => path,
        None => default_kubeconfig_path(&env)?,
    };
    let settings = BootstrapSettings::new(kubeconfig_path);

    let shell = SshShell::new(SshConfig::from_config(&config, &env)?);
    let report = Bootstrap::new(&shell, &config, &settings).run()?;

    println!("Setup of {} complete:", config.server.ip);
    for (step, outcome) in &report.steps {
        let marker = match outcome {
            StepOutcome::Applied => "installed",
            StepOutcome::Skipped => "already present",
            StepOutcome::Performed => "done",
        };
        println!("  {:<24} {}", step.to_string(), marker);
    }
    if let Some(kube) = &report.kubeconfig {
        println!(
            "  kubeconfig: {} (context {})",
            kube.path.display(),
            kube.current_context.as_deref().unwrap_or("-")
        );
        if let Some(backup) = &kube.backup {
            println!("  previous kubeconfig saved to {}", backup.display());
        }
    }

    if !skip_charts {
        generate_chart(&config, &env, Path::new(CHART_DIR))?;
    }
    Ok(())
}

fn run_generate(config_path: &Path, output: &Path) -> Result<()> {
    let config = Configuration::from_file(config_path)?;
    generate_chart(&config, &ProcessEnvironment, output)
}

fn generate_chart(config: &Configuration, env: &ProcessEnvironment, output: &Path) -> Result<()> {
    let input = ChartInput::resolve(config, env)?;
    let report = manifest::generate_all(&input, output)?;

    println!("Helm chart in {}:", output.display());
    for (path, outcome) in &report.artifacts {
        println!("  {:<36} {:?}", path.display(), outcome);
    }
    Ok(())
}

fn run_deploy(config_path: &Path, skip_build: bool, chart: &Path) -> Result<()> {
    let config = Configuration::from_file(config_path)?;
    let env = ProcessEnvironment;
    let runner = SystemRunner;

    if skip_build {
        tracing::info!("skipping image build");
    } else {
        let reference = image::build_and_push(&config, &env, &runner)?;
        println!("Pushed {}", reference);
    }

    release::deploy(&config, &env, chart, &runner)?;
    println!("Deployed {} to namespace {}", config.service, config.service);
    Ok(())
}
