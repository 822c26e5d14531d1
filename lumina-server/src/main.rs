//! Lumina server: HTTP façade over the collection index engine and the
//! background processing pipeline.
//!
//! Startup wires Postgres (primary store), Redis (index keyspace and message
//! bus), the index engine, and the job workers, then serves the API with
//! graceful shutdown. An initial incremental rebuild is kicked off in the
//! background when the index has no rebuild marker.

mod errors;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lumina_core::auth::TokenService;
use lumina_core::bus::{MessageBus, RedisBus};
use lumina_core::config::AppConfig;
use lumina_core::index::{CollectionIndexEngine, RebuildMode, RebuildOptions};
use lumina_core::jobs::{
    HandlerRegistry, JobContext, JobExecutor, JobOrchestrator, JobSupervisor,
    QueueConsumer,
};
use lumina_core::kvs::RedisKvs;
use lumina_core::store::postgres::{
    self, PostgresCacheFolderRepository, PostgresCollectionRepository,
    PostgresJobRepository, PostgresLibraryRepository,
    PostgresRefreshTokenRepository, PostgresSettingsRepository,
    PostgresUserRepository,
};
use lumina_core::store::RefreshTokenRepository;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(AppConfig::load(None).context("loading configuration")?);
    info!("Starting lumina-server on {}:{}", config.http.host, config.http.port);

    // Primary store
    let pool = postgres::connect(&config.database)
        .await
        .context("connecting to Postgres")?;
    postgres::ensure_schema(&pool)
        .await
        .context("bootstrapping schema")?;

    let collections = Arc::new(PostgresCollectionRepository::new(pool.clone()));
    let jobs = Arc::new(PostgresJobRepository::new(pool.clone()));
    let cache_folders = Arc::new(PostgresCacheFolderRepository::new(pool.clone()));
    let settings = Arc::new(PostgresSettingsRepository::new(pool.clone()));
    let libraries = Arc::new(PostgresLibraryRepository::new(pool.clone()));
    let users = Arc::new(PostgresUserRepository::new(pool.clone()));
    let refresh_tokens =
        Arc::new(PostgresRefreshTokenRepository::new(pool.clone()));

    match refresh_tokens.purge_expired().await {
        Ok(purged) if purged > 0 => {
            info!("Purged {} expired refresh tokens", purged)
        }
        Ok(_) => {}
        Err(e) => warn!("Refresh token purge failed: {}", e),
    }

    // Derived stores
    let kvs = Arc::new(
        RedisKvs::connect(&config.redis.url)
            .await
            .context("connecting to Redis")?,
    );
    let bus: Arc<dyn MessageBus> = Arc::new(
        RedisBus::new(&config.redis.url, config.bus.clone())
            .context("creating broker client")?,
    );
    bus.declare_topology().await.context("declaring queues")?;

    let engine = Arc::new(CollectionIndexEngine::new(
        kvs,
        collections.clone(),
        cache_folders.clone(),
        jobs.clone(),
        settings,
        config.thumbnails.clone(),
    ));

    // Background pipeline
    let shutdown = CancellationToken::new();
    let context = JobContext {
        collections: collections.clone(),
        jobs: jobs.clone(),
        cache_folders,
        index: engine.clone(),
        config: config.clone(),
    };
    let executor = Arc::new(JobExecutor::new(
        context,
        HandlerRegistry::standard(),
        config.workers.max_concurrent,
    ));
    let supervisor = JobSupervisor::new(
        jobs.clone(),
        executor.clone(),
        config.workers.clone(),
        shutdown.clone(),
    );
    let supervisor_handle = supervisor.spawn();
    let consumer = Arc::new(QueueConsumer::new(
        bus.clone(),
        jobs.clone(),
        executor,
        config.bus.clone(),
        shutdown.clone(),
    ));
    let consumer_handles = consumer.spawn_all();

    // Staleness detection: no rebuild marker means the keyspace is cold or
    // was flushed; refresh it without blocking startup.
    match engine.last_rebuild().await {
        Ok(Some(at)) => info!("Index last rebuilt at {}", at),
        Ok(None) => {
            info!("No rebuild marker found, scheduling incremental rebuild");
            let engine = engine.clone();
            let cancel = shutdown.child_token();
            tokio::spawn(async move {
                if let Err(e) = engine
                    .rebuild_index(
                        RebuildMode::ChangedOnly,
                        RebuildOptions::default(),
                        &cancel,
                    )
                    .await
                {
                    warn!("Initial index rebuild failed: {}", e);
                }
            });
        }
        Err(e) => warn!("Could not read rebuild marker: {}", e),
    }

    let orchestrator = Arc::new(JobOrchestrator::new(jobs, bus.clone()));
    let tokens = match TokenService::new(&config.auth) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            warn!("JWT secret unusable ({}), issuing restart-scoped tokens", e);
            Arc::new(
                TokenService::ephemeral()
                    .context("generating ephemeral token key")?,
            )
        }
    };

    let app_state = AppState {
        engine,
        orchestrator,
        libraries,
        users,
        refresh_tokens,
        tokens,
        config: config.clone(),
        shutdown: shutdown.clone(),
    };
    let router = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind((
        config.http.host.as_str(),
        config.http.port,
    ))
    .await
    .context("binding listener")?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .await
        .context("serving")?;

    shutdown.cancel();
    let _ = supervisor_handle.await;
    for handle in consumer_handles {
        let _ = handle.await;
    }
    bus.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
