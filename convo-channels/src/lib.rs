//! Convo Channels - Messaging-channel adapters and webhook server.
//!
//! Receives participant messages by webhook, feeds them through the session
//! engine and routes replies back to the originating channel:
//! - WhatsApp (Business Cloud API)
//! - Generic webhook (replies are logged; for local testing)
//!
//! ## Architecture
//!
//! ```text
//! Participant → webhook → processor → DispatchQueues → StateRouter
//!                                                          ↓
//! Participant ←── send ←── OutboundRouter ←──── reply / deferred notice
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod message;
pub mod outbound;
pub mod processor;
pub mod providers;
pub mod routes;
pub mod traits;
pub mod whatsapp;

pub use message::{ChannelMessage, ChannelType, MessageContent, OutgoingMessage};
pub use outbound::{OutboundRouter, SendResult};
pub use processor::{spawn_processor, TEXT_ONLY_NOTICE};
pub use providers::HttpProviders;
pub use routes::{build_router, create_state, ChannelsState};
pub use traits::{Channel, ChannelError, ChannelResult, LogChannel};
pub use whatsapp::WhatsAppChannel;

use convo_common::config::Config;
use convo_core::store::build_store;
use convo_core::{Engine, Providers, SessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the webhook router and the outbound router from configuration.
pub fn build_channels_router(
    config: &Config,
    store: Option<SessionStore>,
) -> (
    axum::Router,
    tokio::sync::mpsc::Receiver<ChannelMessage>,
    Arc<OutboundRouter>,
) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let whatsapp_config = config.channels.whatsapp.as_ref().filter(|w| w.enabled);
    let whatsapp = whatsapp_config.map(|w| Arc::new(WhatsAppChannel::from_config(w)));
    let app_secret = whatsapp_config.and_then(|w| w.app_secret.clone());

    let mut outbound = OutboundRouter::new();
    if let Some(ref w) = whatsapp {
        outbound = outbound.with_whatsapp(w.clone());
    }
    let outbound = Arc::new(outbound);

    let (state, rx) = create_state(whatsapp, app_secret, store);
    let router = build_router(state).layer(cors);

    (router, rx, outbound)
}

/// Start the webhook server and the session engine behind it.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let kv = Arc::new(build_store(&config.store).await);
    let store = SessionStore::new(kv, &config.session);

    let (router, rx, outbound) = build_channels_router(config, Some(store.clone()));
    let providers = Providers::from_backend(Arc::new(HttpProviders::from_config(&config.providers)));
    let engine = Engine::with_store(
        store,
        &config.session,
        &config.deferred,
        outbound.clone(),
        providers,
    );
    let processor = spawn_processor(engine.queues.clone(), outbound, rx);

    tracing::info!(%addr, "Starting Convo Channels");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    processor.abort();
    engine.shutdown().await;
    tracing::info!("Convo Channels stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
