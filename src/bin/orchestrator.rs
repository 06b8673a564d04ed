use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use orchestrator::platform::{Platform, PlatformConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path; overrides configs/orchestrator.toml.
    #[arg(short, long)]
    config: Option<String>,

    /// Seed tenant id to register at boot, for a single-tenant deployment.
    #[arg(long, default_value = "default")]
    tenant: String,

    /// Active-session quota for the seed tenant.
    #[arg(long, default_value_t = 100)]
    tenant_quota: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();
    let config = PlatformConfig::load_from_path(args.config)?;

    let mut platform = Platform::new(config);
    platform.register_tenant(orchestrator::supervisor::Tenant {
        id: args.tenant.clone(),
        display_name: args.tenant,
        active_session_quota: args.tenant_quota,
    });

    let runtime = platform.start().await?;

    info!("orchestrator running, press ctrl-c to shut down");
    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received");
    runtime.shutdown().await?;

    Ok(())
}
