use std::sync::Arc;

use sensor_bus::{
    BroadcastHub,
    persist::PersistenceGateway,
    playback::{DemoPlayback, FileRecording, PlaybackTiming},
    supervisor::{self, IngestionSupervisor},
};
use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod db;
mod handler;

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("sensor_bus", log::LevelFilter::Info)
        .filter_module("sensor_db", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = config::config();

    let db = db::init_app_db(config.db_url())
        .await
        .unwrap_or_else(|e| {
            log::error!("Error opening database {}: {:#}", config.db_url(), e);
            std::process::exit(1);
        });
    let gateway = PersistenceGateway::new(Arc::new(db::DbSampleStore::new(db)));
    let hub = BroadcastHub::new();

    let cancel = CancellationToken::new();

    let state = api::AppState {
        hub: Arc::clone(&hub),
        gateway: gateway.clone(),
    };
    api::start_api_server(
        config.http_addr().to_string(),
        api::app_router(state),
        cancel.clone(),
    );

    let serial = config.serial().clone();
    let demo = config.demo_mode().then(|| {
        DemoPlayback::new(
            FileRecording::new(config.demo_file()),
            PlaybackTiming::default(),
        )
    });
    // Listing and opening ports blocks.
    let source = tokio::task::spawn_blocking(move || supervisor::choose_source(&serial, demo))
        .await
        .unwrap_or_else(|e| {
            log::error!("Error choosing source: {}", e);
            std::process::exit(1);
        });

    let supervisor = IngestionSupervisor::new(
        hub,
        config.layout(),
        config.persist().then_some(gateway),
    );
    tokio::spawn(supervisor.run(source, cancel.clone()));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    std::process::exit(0);
}
