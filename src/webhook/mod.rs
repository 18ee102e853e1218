//! # Webhook Module
//!
//! The inbound side of the hub protocol: a single callback route answering
//! verification handshakes (GET) and pushed Atom notifications (POST), plus
//! a small `/events` inspection route.
//!
//! - **`handlers`**: request handlers for both routes.
//! - **`delivery`**: `AlertDispatcher`, which forwards parsed alerts to the
//!   alert consumer inline or through a bounded queue.

pub mod delivery;
pub mod handlers;

pub use delivery::{AlertDispatcher, AlertDrain, DispatchOutcome};

use crate::config::ChannelPolicy;
use crate::directory::DirectoryHandle;
use crate::events::EventLog;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: AlertDispatcher,
    pub directory: Option<DirectoryHandle>,
    pub policy: ChannelPolicy,
    pub events: EventLog,
}

/// Builds the webhook router.
///
/// Bodies above `max_body_bytes` are rejected with 413 before reaching the
/// notification handler.
pub fn router(state: WebhookState, webhook_path: &str, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            webhook_path,
            get(handlers::verify)
                .post(handlers::notify)
                .fallback(handlers::unsupported_method),
        )
        .route("/events", get(handlers::recent_events))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serves the webhook router until shutdown.
pub struct WebhookServer {
    listener: TcpListener,
    router: Router,
    shutdown_rx: watch::Receiver<bool>,
}

impl WebhookServer {
    pub fn new(listener: TcpListener, router: Router, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            router,
            shutdown_rx,
        }
    }

    /// Returns a future that runs the server until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        let mut shutdown_rx = self.shutdown_rx;
        async move {
            let result = axum::serve(self.listener, self.router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.changed().await.ok();
                    info!("Webhook server received shutdown signal.");
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Webhook server error");
            }
            info!("Webhook server finished.");
        }
    }
}
