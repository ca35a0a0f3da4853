//! Lumia Deployer - console front-end
//!
//! Usage:
//!   lumia_deployer_cli deploy --wim install.wim --index 1 --reserved-gb 18
//!   lumia_deployer_cli enable-dual-boot
//!   lumia_deployer_cli disable-dual-boot
//!   lumia_deployer_cli install-gpu

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use lumia_deployer::console::ConsoleWriter;
use lumia_deployer::{
    dispatch, AutoDeployer, CompositionRoot, DeployArgs, DialogLevel, Invocation, InvocationError,
    LogBridge, LogLevel, SettingsManager,
};

#[derive(Parser)]
#[command(name = "lumia_deployer_cli")]
#[command(about = "Deploy Windows on ARM to a Lumia phone", long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory for the daily log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print verbose events too
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the phone and apply a Windows image
    Deploy {
        /// Path to the WIM image
        #[arg(long)]
        wim: Option<PathBuf>,

        /// Index of the image inside the WIM
        #[arg(long, allow_negative_numbers = true)]
        index: Option<i64>,

        /// Space to reserve for Windows, in GB
        #[arg(long = "reserved-gb", allow_negative_numbers = true)]
        reserved_gb: Option<f64>,
    },

    /// Show the boot menu on startup
    EnableDualBoot,

    /// Hide the boot menu on startup
    DisableDualBoot,

    /// Install the GPU driver package into the deployed image
    InstallGpu,
}

impl From<Commands> for Invocation {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Deploy {
                wim,
                index,
                reserved_gb,
            } => Invocation::Deploy(DeployArgs {
                wim,
                index,
                reserved_gb,
            }),
            Commands::EnableDualBoot => Invocation::EnableDualBoot,
            Commands::DisableDualBoot => Invocation::DisableDualBoot,
            Commands::InstallGpu => Invocation::InstallGpu,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[Main] FATAL: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // =========================================================================
    // COMPOSITION - any failure here is fatal
    // =========================================================================
    let mut root = CompositionRoot::new();
    if let Some(path) = cli.settings {
        root = root.with_settings_manager(SettingsManager::new(path));
    }
    if let Some(dir) = cli.log_dir {
        root = root.with_log_dir(dir);
    }
    let deployer = root.compose().context("Failed to start the deployer")?;

    if let Err(e) = LogBridge::install(Arc::clone(deployer.bus())) {
        eprintln!("[Main] WARNING: Failed to register the log bridge: {}", e);
    }

    let min_level = if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Information
    };
    let writer = ConsoleWriter::spawn(deployer.bus(), min_level);

    // Ctrl+C asks for cancellation at the next safe checkpoint
    let orchestrator = deployer.orchestrator();
    let cancel_target = Arc::clone(&orchestrator);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_target.cancel();
        }
    });

    // =========================================================================
    // ONE INVOCATION, ONE ORCHESTRATOR CALL
    // =========================================================================
    let invocation = Invocation::from(cli.command);
    let verb = invocation.verb();
    let outcome = dispatch(orchestrator.as_ref(), &deployer.services().options, invocation).await;

    ctrl_c.abort();
    writer.stop().await;
    deployer.shutdown().await;

    let dialogs = &deployer.services().dialogs;
    let code = match outcome {
        Err(InvocationError::Invalid(messages)) => {
            eprintln!("Invalid arguments for '{}':", verb);
            for message in messages {
                eprintln!("  - {}", message);
            }
            ExitCode::from(64)
        }
        Ok(Ok(report)) => {
            let summary = match report.dual_boot {
                Some(change) if !change.changed() => "dual boot was already in the requested state".to_string(),
                _ => report.completed_steps.join(" -> "),
            };
            dialogs.show(DialogLevel::Info, &format!("{} completed", verb), &summary);
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            dialogs.show(DialogLevel::Error, &format!("{} failed", verb), &err.user_message());
            ExitCode::FAILURE
        }
    };
    Ok(code)
}
