//! FolioFox server: loads configuration, wires the acquisition
//! pipeline's [`Container`](foliofox_core::container::Container), and
//! serves it behind Axum: load config → init tracing → build
//! dependencies → bind → serve → graceful shutdown.

mod error;
mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use foliofox_config::ConfigLoader;
use foliofox_core::container::Container;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("foliofox_server={0},foliofox_core={0}", config.logging.level).into());
    let fmt_layer: Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync> = if config.logging.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();

    info!("starting FolioFox");

    let container = Container::build(&config).await?;
    let state = AppState::from_container(&container);
    let app = routes::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    container.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
