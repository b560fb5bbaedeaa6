use enclosure_control::api::ControlServer;
use enclosure_control::config::{self, Config};
use enclosure_control::instance_lock::InstanceLock;
use enclosure_control::store::FileStore;
use enclosure_control::{ControlContext, SafetySweeper};
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env before the runtime spawns any threads
    config::load_dotenv();
    init_logger();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run());
}

async fn run() {
    info!("Starting enclosure control service");

    let config = Config::from_env();
    info!("Configuration loaded:");
    info!("  Store: {:?}", config.store.path);
    info!("  Cache TTL: {}s", config.control.cache_ttl_secs);
    info!("  Sweep interval: {}s", config.control.sweep_interval_secs);
    info!(
        "  Washer timer: default {}s, max {}s",
        config.control.washer_default_secs, config.control.washer_max_secs
    );

    let _lock = match InstanceLock::acquire(&config.store.path) {
        Ok(lock) => lock,
        Err(e) => {
            error!("Cannot start: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(FileStore::new(config.store.path.clone()));
    let ctx = Arc::new(ControlContext::from_config(&config, store));

    let listener = match TcpListener::bind(&config.server.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.server.bind_addr, e);
            std::process::exit(1);
        }
    };

    let sweeper = SafetySweeper::new(ctx.clone(), config.control.sweep_interval()).start();

    let shutdown = CancellationToken::new();
    let server = Arc::new(ControlServer::new(ctx.clone()));
    let server_task = tokio::spawn(server.serve(listener, shutdown.clone()));

    info!("Enclosure control is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    shutdown.cancel();
    if let Err(e) = server_task.await {
        error!("Control server task ended abnormally: {}", e);
    }
    sweeper.stop().await;

    info!("Enclosure control stopped");
}
