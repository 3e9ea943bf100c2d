use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use tessera::{
    notify::{Notifier, TracingNotifier, WebhookNotifier},
    store::FileRecordStore,
    CredentialCodec, TokenAuthority,
};
use tessera_axum::config::ServerConfig;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    let config = ServerConfig::parse();
    config.init_tracing();

    let notifier: Box<dyn Notifier> = match &config.notify_url {
        Some(url) => {
            tracing::info!(%url, "posting theft alerts to webhook");
            Box::new(WebhookNotifier::new(reqwest::Client::new(), url.clone()))
        }
        None => {
            tracing::info!("no webhook configured, theft alerts will only be logged");
            Box::new(TracingNotifier)
        }
    };

    let store = FileRecordStore::new(&config.store_file);
    tracing::info!(path = %store.path().display(), "using file record store");
    for principal in &config.principals {
        store
            .register_principal(principal.identity, principal.contact.clone())
            .await?;
        tracing::info!(identity = %principal.identity, "registered principal");
    }

    let codec = CredentialCodec::new(config.signing_key.clone());
    let authority = TokenAuthority::new(codec, Arc::new(store), Arc::new(notifier))
        .with_notify_timeout(config.notify_budget());

    let app = tessera_axum::router(Arc::new(authority))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.address).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
        Err(err) => tracing::error!(
            error = (&err as &dyn std::error::Error),
            "unable to listen for Ctrl+C, shutting down"
        ),
    }
}
