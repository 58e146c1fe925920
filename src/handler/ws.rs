use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use sensor_bus::{BroadcastHub, persist::SampleStore};

use crate::api::AppState;

pub async fn ws_handler<S: SampleStore>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| serve_subscriber(socket, hub))
}

/// Pushes every published sample to one client until either side closes.
/// Client messages other than close are ignored.
async fn serve_subscriber(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let mut subscription = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            payload = subscription.recv() => match payload {
                Some(payload) => {
                    if let Err(e) = sender.send(Message::Text(payload.to_string().into())).await {
                        log::debug!("ws: subscriber {} send failed: {}", subscription.id(), e);
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    subscription.close();
}
