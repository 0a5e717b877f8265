use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use connectivity::{
    ConnectivityService, ModemManager, NetworkManagerSource, OfonoBus, ServiceConfig,
    UnlockRequest,
};

#[derive(Parser, Debug)]
#[command(name = "connectivity-service")]
#[command(version)]
#[command(about = "Publishes networking status as com.ubuntu.connectivity1")]
struct Args {
    /// Use the session bus instead of the system bus.
    #[arg(long)]
    session: bool,

    /// Do not track oFono modems.
    #[arg(long)]
    no_modems: bool,

    /// Well-known bus name to request.
    #[arg(long, default_value = "com.ubuntu.connectivity1")]
    bus_name: String,

    /// Upper bound for a single remote call, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Log level filter, overriding RUST_LOG.
    #[arg(long)]
    log_level: Option<log::LevelFilter>,
}

fn init_logging(level: Option<log::LevelFilter>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.init();
}

pub fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(serve(args))
}

async fn serve(args: Args) -> anyhow::Result<()> {
    let config = ServiceConfig::default()
        .with_bus_name(args.bus_name)
        .with_call_timeout(Duration::from_millis(args.timeout_ms));

    let conn = if args.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;

    let modems = if args.no_modems {
        None
    } else {
        let bus = Arc::new(OfonoBus::new(&conn, config.call_timeout));
        let modems = ModemManager::new(bus)
            .await
            .context("failed to enumerate modems")?;
        Some(Arc::new(modems))
    };

    let source = NetworkManagerSource::connect(&conn, config.call_timeout)
        .await
        .context("failed to connect to NetworkManager")?;
    let source = Arc::new(source);
    let service = ConnectivityService::start(&conn, source, modems, config)
        .await
        .context("failed to start the connectivity service")?;
    info!("Connectivity service running, status {}", service.state().status);

    let mut unlock_requests = service.unlock_requests();
    tokio::spawn(async move {
        while let Ok(request) = unlock_requests.recv().await {
            // Unlocking is handled by the indicator's unlock dialog.
            match request {
                UnlockRequest::Modem(modem) => info!("Unlock requested for modem {modem}"),
                UnlockRequest::AllModems => info!("Unlock requested for all modems"),
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("Shutting down");

    if let Err(e) = service.shutdown().await {
        warn!("Failed to release bus name: {e}");
    }
    Ok(())
}
