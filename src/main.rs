use std::sync::Arc;

use profiled::config::ServerConfig;
use profiled::files::FileStore;
use profiled::http::{task_routes, AppState};
use profiled::profiler::ProfilerSelector;
use profiled::scheduler::{JobScheduler, WorkerContext};
use profiled::store::{JobStore, LibSqlBackend, TaskRepository};
use profiled::submit::TaskSubmission;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env();

    eprintln!("profiled v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/tasks", config.bind_addr);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Uploads: {}", config.upload_dir.display());
    eprintln!("   Ollama: {} ({})", config.ollama.host, config.ollama.model);

    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let backend = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    let repository: Arc<dyn TaskRepository> = backend.clone();
    let jobs: Arc<dyn JobStore> = backend;

    let selector = Arc::new(ProfilerSelector::new(
        config.default_mode,
        config.ollama.clone(),
    ));

    // Workers share nothing with the submission path beyond configuration.
    let ctx = Arc::new(WorkerContext::from_config(&config).await?);
    let scheduler = Arc::new(JobScheduler::new(
        jobs,
        ctx,
        config.max_concurrent_jobs,
        config.poll_interval,
    ));
    let _dispatch_handle = scheduler.spawn_dispatch_loop();

    let submission = Arc::new(TaskSubmission::new(
        repository,
        Arc::clone(&scheduler),
        selector,
        config.schedule_delay,
    ));

    let app = task_routes(AppState {
        submission,
        files: Arc::new(FileStore::new(&config.upload_dir)),
    })
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "REST server started");
    axum::serve(listener, app).await?;

    Ok(())
}
