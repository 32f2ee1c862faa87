//! Process entrypoint: wires the leaf primitives (bus, queue, store)
//! together with the orchestrator and hook pipeline, then serves the
//! HTTP surface. Typed config from the environment, a tracing
//! subscriber initialized first, a plain startup banner, then
//! `axum::serve`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use gantry::{Orchestrator, ServerConfig};
use gantry_bus::Bus;
use gantry_config::TrustPolicy;
use gantry_driver::{Driver, GenericDriver};
use gantry_queue::Queue;
use gantry_runner::Work;
use gantry_store::Store;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    println!("gantry-server starting on {}", config.bind_addr);

    let store: Arc<dyn Store> = build_store(&config).await?;
    store.migrate().await.context("running store migrations")?;

    let bus = Bus::new();
    let queue = Arc::new(Queue::<Work>::with_capacity(config.queue_capacity, config.ack_deadline));
    let docker = bollard::Docker::connect_with_local_defaults().context("connecting to the docker daemon")?;

    let orchestrator = Arc::new(Orchestrator::new(store.clone(), bus.clone(), queue.clone(), docker));
    orchestrator.boot(config.worker_count).await.context("recovering orchestrator state at boot")?;

    let _logmux = gantry::LogMultiplexer::spawn(bus.clone());

    let trust = TrustPolicy::new(config.trusted_image_globs.clone()).context("parsing trusted image globs")?;

    let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
    drivers.insert(
        "generic".to_string(),
        Arc::new(GenericDriver::new(
            std::env::var("GANTRY_SCRIPT_BASE_URL").unwrap_or_default(),
            std::env::var("GANTRY_STATUS_BASE_URL").unwrap_or_default(),
        )) as Arc<dyn Driver>,
    );

    let hooks = Arc::new(gantry::HookPipeline::new(drivers, store.clone(), orchestrator.clone(), trust));

    let state = gantry_web::AppState {
        bus,
        store,
        hooks,
        cancel: orchestrator,
    };
    let app = gantry_web::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info_startup(&config);
    axum::serve(listener, app).await.context("serving http")?;
    Ok(())
}

fn info_startup(config: &ServerConfig) {
    tracing::info!(
        bind_addr = %config.bind_addr,
        workers = config.worker_count,
        queue_capacity = config.queue_capacity,
        "gantry-server ready"
    );
}

#[cfg(not(feature = "postgres"))]
async fn build_store(_config: &ServerConfig) -> anyhow::Result<Arc<dyn Store>> {
    Ok(Arc::new(gantry_store::MemoryStore::new()))
}

#[cfg(feature = "postgres")]
async fn build_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn Store>> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when the postgres feature is enabled")?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect(url)
        .await
        .context("connecting to postgres")?;
    Ok(Arc::new(gantry_store::PostgresStore::new(pool)))
}
