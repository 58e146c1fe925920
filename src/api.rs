use std::sync::Arc;

use axum::{Router, routing::get};
use sensor_bus::{
    BroadcastHub,
    persist::{PersistenceGateway, SampleStore},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::handler;

pub struct AppState<S> {
    pub hub: Arc<BroadcastHub>,
    pub gateway: PersistenceGateway<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            gateway: self.gateway.clone(),
        }
    }
}

pub(crate) fn app_router<S: SampleStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/ws", get(handler::ws::ws_handler::<S>))
        .merge(handler::data::data_router::<S>())
        .merge(sensor_dashboard::app_router())
        .with_state(state)
}

pub(crate) fn start_api_server(addr: String, app: Router, cancel: CancellationToken) {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("API server bind {} failed: {}", addr, e);
                cancel.cancel();
                return;
            }
        };
        log::info!("API server started on {}", addr);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("Error running API server: {}", e);
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
