mod archive;
mod builder;
mod config;
mod db;
mod errors;
mod models;
mod routes;
mod state;
mod store;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::archive::{Archiver, S3Archiver};
use crate::builder::{LatexBuilder, LatexCompiler};
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::routes::{build_router, with_artifacts};
use crate::state::AppState;
use crate::store::{JobStore, PgJobStore};
use crate::worker::{Worker, WorkerContext, WorkerSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume worker v{}", env!("CARGO_PKG_VERSION"));

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("Failed to create output dir {}", config.output_dir.display()))?;

    let pool = create_pool(&config.database_url).await?;
    if config.run_migrations {
        run_migrations(&pool).await?;
    }
    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));

    let compiler = LatexCompiler::new(config.latex_bin.clone(), config.compile_timeout);
    info!("LaTeX toolchain: {}", config.latex_bin);

    let archiver: Option<Arc<dyn Archiver>> = match &config.archive {
        Some(archive) => {
            info!("Archiving to s3://{}/{}", archive.bucket, archive.root_prefix);
            Some(Arc::new(S3Archiver::from_config(archive).await))
        }
        None => None,
    };

    let ctx = Arc::new(WorkerContext {
        store: Arc::clone(&store),
        builder: Arc::new(LatexBuilder::new(compiler)),
        archiver,
        settings: WorkerSettings::from_config(&config),
    });

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let server = match config.port {
        Some(port) => {
            let app = with_artifacts(
                build_router(AppState { store }),
                &config.artifact_url_prefix,
                &config.output_dir,
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

            let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Listening on {addr}");

            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(token.cancelled_owned())
                    .await
            }))
        }
        None => None,
    };

    let outcome = Worker::new(ctx).run(shutdown.clone()).await;
    shutdown.cancel();

    if let Some(server) = server {
        match server.await {
            Ok(Err(e)) => warn!("HTTP server stopped with error: {e}"),
            Err(e) => warn!("HTTP server task failed: {e}"),
            Ok(Ok(())) => {}
        }
    }
    pool.close().await;

    if let Err(e) = outcome {
        error!("Worker stopped on store error: {e}");
        return Err(e.into());
    }
    info!("Worker shut down gracefully");
    Ok(())
}

/// Cancels `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received; finishing current job");
    shutdown.cancel();
}
