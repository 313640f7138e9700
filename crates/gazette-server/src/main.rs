//! Gazette server binary.

use std::sync::Arc;

use clap::Parser;
use gazette_relay::{BrokerConfig, ChangeListener, EventBroker};
use gazette_server::{
    create_router, supervisor, AppState, Args, ListenerStatus, MemoryStore, NewsletterStore,
    PgStore, ServerConfig, StorageBackend,
};
use tokio::sync::{broadcast, watch};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "gazette_server={level},gazette_relay={level},tower_http=info",
                level = args.log_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from(args);

    info!(
        listen = %config.listen_addr,
        storage = config.storage.as_str(),
        "Starting Gazette server"
    );

    let store = match config.storage {
        StorageBackend::Postgres => {
            let store = PgStore::connect(&config).await?;
            store.ensure_schema().await?;
            NewsletterStore::from(store)
        }
        StorageBackend::Memory => NewsletterStore::from(MemoryStore::new()),
    };
    let store = Arc::new(store);

    let broker_config = BrokerConfig::default().with_queue_capacity(config.queue_capacity);
    let broker = EventBroker::with_config(broker_config);

    // Shutdown signal shared by the supervisor, stream sessions and the HTTP server
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (status_tx, status_rx) = watch::channel(ListenerStatus::Starting);

    let change_listener = ChangeListener::new(broker.clone());
    let listener_metrics = change_listener.metrics();
    let mut supervisor = tokio::spawn(supervisor::run(
        change_listener,
        {
            let store = store.clone();
            move || store.change_source()
        },
        config.supervisor.clone(),
        status_tx,
        shutdown_tx.subscribe(),
    ));

    let shutdown_trigger = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_trigger.send(());
    });

    let state = AppState::new(
        store,
        broker,
        config.clone(),
        status_rx,
        shutdown_tx.clone(),
    )
    .with_listener_metrics(listener_metrics);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Gazette listening on {}", config.listen_addr);

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_shutdown.recv().await;
    });

    tokio::select! {
        result = server => {
            result?;
            supervisor.await??;
        }
        result = &mut supervisor => {
            // Only reachable when the listener gave up.
            let _ = shutdown_tx.send(());
            result??;
        }
    }

    info!("Gazette server stopped");
    Ok(())
}
