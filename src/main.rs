use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate::cli::{check_env, Cli, Command};
use paygate::wallet::WalletService;
use paygate::{build_gate, build_state, create_router, load_classifier, wallet_client, Config};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paygate=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    match cli.command() {
        Command::Serve => serve().await.map(|_| ExitCode::SUCCESS),
        Command::CheckEnv => Ok(run_check_env()),
        Command::GenerateSeller => generate_seller().await.map(|_| ExitCode::SUCCESS),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    if config.payment.x402_enabled {
        info!(network = %config.payment.network, "x402 payments enabled");
    } else {
        warn!("X402_ENABLED is false, every payment validation succeeds");
    }

    let classifier = load_classifier(&config)?;
    info!(signatures = classifier.signature_count(), "Bot classifier ready");

    let gate = build_gate(&config, classifier)?;
    let state = build_state(config.clone(), wallet_client(&config))?;
    let app = create_router(state, gate);

    let ip = config
        .server
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid HOST '{}': {}", config.server.host, e))?;
    let addr = SocketAddr::new(ip, config.server.port);
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

fn run_check_env() -> ExitCode {
    let report = check_env(|name| std::env::var(name).ok());

    println!("Environment:");
    for (name, value) in &report.present {
        println!("  ok       {} = {}", name, value);
    }
    for name in &report.missing {
        println!("  MISSING  {}", name);
    }
    for (name, default) in &report.defaulted {
        println!("  default  {} ({})", name, default);
    }

    if report.is_ok() {
        println!("Environment looks good.");
        ExitCode::SUCCESS
    } else {
        println!("{} required variable(s) missing.", report.missing.len());
        ExitCode::FAILURE
    }
}

async fn generate_seller() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let wallet = wallet_client(&config);
    let name = &config.payment.seller_account_name;

    let account = wallet
        .get_or_create_account(name)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get or create account '{}': {}", name, e))?;
    info!(account = %name, address = %account.address, "Seller account ready");

    println!("SELLER_ADDRESS={}", account.address);
    Ok(())
}
