use anyhow::Result;
use clap::Parser;

use client_application::SessionPhase;
use client_bootstrap::{run_scan, ScanArgs, TransportMode};
use client_domain::Priority;

#[derive(Parser, Debug)]
#[command(name = "argus-scan")]
#[command(about = "Argus capability scan client", long_about = None)]
struct Args {
    /// Capability to scan with (dark_web, exposure, infrastructure, investigation)
    capability: String,

    /// Scan target (domain, URL, keyword list, IP range)
    target: String,

    /// Transport mode: stream (push) or poll (pull)
    #[arg(long, default_value = "stream")]
    mode: String,

    /// Job priority (critical, high, normal, low, background)
    #[arg(long)]
    priority: Option<String>,

    /// Inline scan config as JSON
    #[arg(long)]
    scan_config: Option<String>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Some(config) = args.config {
        std::env::set_var("ARGUS_CONFIG", config);
    }

    let scan_config = args
        .scan_config
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    let snapshot = run_scan(ScanArgs {
        capability: args.capability,
        target: args.target,
        mode: TransportMode::parse(&args.mode)?,
        priority: args.priority.as_deref().map(Priority::from),
        config: scan_config,
    })
    .await?;

    if snapshot.phase != SessionPhase::Completed {
        std::process::exit(1);
    }
    Ok(())
}
