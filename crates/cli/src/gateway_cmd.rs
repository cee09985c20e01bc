use std::sync::Arc;

use {
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use {
    huddle_agents::{ChatClient, load_persona},
    huddle_config::HuddleConfig,
    huddle_gateway::AppState,
    huddle_memory::MemoryStore,
    huddle_pipeline::{ContextStore, ModelBackend, Outbound, TurnPipeline},
    huddle_scheduler::{
        BatchProcessor, BatchScheduler, SchedulerOptions,
        supervisor::{RestartPolicy, spawn_supervised},
    },
    huddle_sessions::{ArchiveSink, SessionPolicy, SessionRegistry},
};

/// Construct every component once and wire them together explicitly, then
/// serve until ctrl-c.
pub async fn run(config: HuddleConfig) -> anyhow::Result<()> {
    for name in config.missing_credentials() {
        warn!("{name} is not configured; related functionality is disabled");
    }

    // Durable store.
    let memory = Arc::new(MemoryStore::new(
        open_pool(&config).await?,
        config.memory.max_items_per_user,
    ));
    memory.init().await?;
    let archive: Arc<dyn ArchiveSink> = Arc::clone(&memory) as Arc<dyn ArchiveSink>;

    // Session core.
    let registry = Arc::new(SessionRegistry::new(SessionPolicy {
        batch_timeout: config.session.batch_timeout(),
        conversation_timeout: config.session.conversation_timeout(),
        max_sessions: config.session.max_sessions,
    }));

    // Collaborators: model backend and outbound delivery.
    let persona = load_persona(config.llm.persona_path.as_deref());
    let model: Arc<dyn ModelBackend> = Arc::new(ChatClient::from_config(&config.llm, persona)?);
    let wecom = Arc::new(huddle_wecom::WecomClient::from_config(&config.wecom)?);
    let outbound: Arc<dyn Outbound> = Arc::clone(&wecom) as Arc<dyn Outbound>;

    let pipeline = TurnPipeline::new(model, outbound)
        .with_context_store(Arc::clone(&memory) as Arc<dyn ContextStore>)
        .with_segment_delay(config.delivery.segment_delay());

    // Scheduler, supervised: a panicked loop restarts instead of silently
    // stopping all batching.
    let scheduler = Arc::new(BatchScheduler::new(
        Arc::clone(&registry),
        Arc::new(pipeline) as Arc<dyn BatchProcessor>,
        Some(Arc::clone(&archive)),
        SchedulerOptions {
            poll_interval: config.scheduler.poll_interval(),
            error_backoff: config.scheduler.error_backoff(),
        },
    ));
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }
    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        let shutdown = shutdown.clone();
        spawn_supervised("batch-scheduler", RestartPolicy::default(), shutdown.clone(), move || {
            Arc::clone(&scheduler).run(shutdown.clone())
        })
    };

    // HTTP listener.
    let state = AppState::new(Arc::clone(&registry))
        .with_archive(Arc::clone(&archive))
        .with_scheduler(Arc::clone(&scheduler) as Arc<dyn huddle_gateway::SchedulerHealth>);
    // IPv6 bind addresses need brackets in socket-address form.
    let addr = if config.server.bind.contains(':') && !config.server.bind.starts_with('[') {
        format!("[{}]:{}", config.server.bind, config.server.port)
    } else {
        format!("{}:{}", config.server.bind, config.server.port)
    };
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "huddle gateway starting");

    let serve_shutdown = shutdown.clone();
    huddle_gateway::server::serve(listener, state, async move {
        serve_shutdown.cancelled().await;
    })
    .await?;

    // Drain sessions into the archive before exit, best effort.
    shutdown.cancel();
    let _ = scheduler_handle.await;
    let drained = registry.drain_all();
    if !drained.is_empty() {
        info!(conversations = drained.len(), "archiving sessions on shutdown");
        for conversation in drained {
            if let Err(e) = archive.archive(conversation).await {
                warn!(error = %format!("{e:#}"), "failed to archive conversation on shutdown");
            }
        }
    }
    info!("huddle gateway stopped");
    Ok(())
}

async fn open_pool(config: &HuddleConfig) -> anyhow::Result<sqlx::SqlitePool> {
    if let Some(parent) = config.memory.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let options = SqliteConnectOptions::new()
        .filename(&config.memory.db_path)
        .create_if_missing(true);
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?)
}
