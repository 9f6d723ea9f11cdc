use std::net::SocketAddr;
use std::thread;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tally_telegram::{TelegramGateway, Update};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiving end of the webhook delivery channel, plus a sender clone
/// the update source holds so the stream never closes underneath it.
pub struct WebhookChannel {
    pub updates: UnboundedReceiver<Update>,
    pub keepalive: UnboundedSender<Update>,
}

/// Registers the webhook with the platform (fatal on any error) and
/// hosts the listener on a background thread. Listener failures after a
/// successful registration are logged, not fatal.
pub fn start(
    gateway: &TelegramGateway,
    base_url: &str,
    listen_addr: &str,
) -> Result<WebhookChannel> {
    let path = gateway.register_webhook(base_url)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let keepalive = tx.clone();

    let addr = listen_addr.to_string();
    thread::Builder::new()
        .name("webhook-listener".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::error!("cannot build webhook listener runtime: {err}");
                    return;
                }
            };
            if let Err(err) = runtime.block_on(serve(&addr, &path, tx)) {
                tracing::error!("webhook listener stopped: {err:#}");
            }
        })
        .with_context(|| "failed to spawn webhook listener thread")?;

    Ok(WebhookChannel {
        updates: rx,
        keepalive,
    })
}

pub async fn serve(listen_addr: &str, path: &str, tx: UnboundedSender<Update>) -> Result<()> {
    let app = router(path, tx);
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen address: {listen_addr}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "webhook listener started");
    axum::serve(listener, app).await?;
    Ok(())
}

/// One POST route at the token path; everything else is not found.
pub fn router(path: &str, tx: UnboundedSender<Update>) -> Router {
    Router::new().route(path, post(receive_update)).with_state(tx)
}

async fn receive_update(
    State(tx): State<UnboundedSender<Update>>,
    Json(update): Json<Update>,
) -> StatusCode {
    if tx.send(update).is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
