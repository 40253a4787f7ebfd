use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use networkd::cmdline::Cmdline;
use networkd::config::{load_config, NetworkdConfig};
use networkd::files::FsFiles;
use networkd::lease_dir::LeaseDirClient;
use networkd::link::NixLinkSource;
use networkd::Networkd;

/// Boot-time network interface configuration
#[derive(Parser)]
#[command(author, version, about = "Resolve and apply network interface configuration", long_about = None)]
struct Cli {
    /// Settings file, defaults to /etc/networkd.{toml,yaml,json}
    #[arg(long)]
    config: Option<PathBuf>,

    /// Machine config document, overrides the settings file
    #[arg(long)]
    machine_config: Option<PathBuf>,

    /// Kernel command line file, overrides the settings file
    #[arg(long)]
    cmdline: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the interface descriptors built from the current inputs
    Resolve {
        /// Output format: json or pretty
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },

    /// Decide the hostname from statically known addresses
    Hostname,

    /// Print resolv.conf and hosts as they would be written
    Render,

    /// Bring up every interface and write the system files
    Run {
        /// Resolve and decide, but do not write anything
        #[arg(short, long)]
        dry_run: bool,
    },
}

fn print<T: Serialize>(value: &T, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string(value).into_diagnostic()?),
        _ => println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?),
    }
    Ok(())
}

async fn build(settings: &NetworkdConfig) -> Result<Networkd> {
    let machine_config = match &settings.machine_config {
        Some(path) if path.exists() => {
            info!("loading machine config from {}", path.display());
            Some(machineconfig::load_file(path)?)
        }
        Some(path) => {
            warn!("machine config {} not found", path.display());
            None
        }
        None => None,
    };

    let cmdline = match Cmdline::read(&settings.cmdline).await {
        Ok(cmdline) => cmdline,
        Err(e) => {
            warn!("cannot read {}: {}", settings.cmdline.display(), e);
            Cmdline::default()
        }
    };

    Ok(Networkd::new(machine_config.as_ref(), &cmdline, &NixLinkSource::new()).await?)
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("shutdown signal received");
    tx.send_replace(true);
}

async fn cmd_run(settings: &NetworkdConfig, dry_run: bool) -> Result<()> {
    let mut networkd = build(settings).await?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(tx));

    let dhcp = Arc::new(LeaseDirClient::new(
        &settings.lease_dir,
        Duration::from_secs(settings.lease_timeout_secs),
    ));

    let identity = networkd.configure(dhcp, rx).await?;
    info!("host identity {} ({})", identity.fqdn(), identity.address);

    let rendered = networkd.render()?;
    if dry_run {
        print(&rendered, "pretty")?;
        return Ok(());
    }

    rendered
        .persist(&FsFiles, &settings.resolv_conf, &settings.hosts)
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "networkd=debug,info"
    } else {
        "networkd=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let mut settings = load_config(cli.config.as_deref())?;
    if cli.machine_config.is_some() {
        settings.machine_config = cli.machine_config;
    }
    if let Some(cmdline) = cli.cmdline {
        settings.cmdline = cmdline;
    }

    match cli.command {
        Commands::Resolve { format } => {
            let networkd = build(&settings).await?;
            print(networkd.interfaces(), &format)
        }
        Commands::Hostname => {
            let networkd = build(&settings).await?;
            let identity = networkd.decide_hostname()?;
            println!("{}", identity.fqdn());
            Ok(())
        }
        Commands::Render => {
            let networkd = build(&settings).await?;
            let rendered = networkd.render()?;
            print!("{}", rendered.resolv_conf);
            println!("---");
            print!("{}", rendered.hosts);
            Ok(())
        }
        Commands::Run { dry_run } => cmd_run(&settings, dry_run).await,
    }
}
