use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use media_worker::app;
use media_worker::common::logging;
use media_worker::common::retry::RetryPolicy;
use media_worker::config::settings::AppConfig;
use media_worker::infrastructure::db::pool::connect_to_db;
use media_worker::infrastructure::media::MediaProcessor;
use media_worker::infrastructure::media::ffmpeg::FfmpegProcessor;
use media_worker::infrastructure::queue::rabbitmq::RabbitMqService;
use media_worker::infrastructure::queue::replay::DlqReplayer;
use media_worker::infrastructure::queue::topology::QueueTopology;
use media_worker::infrastructure::storage::BlobStore;
use media_worker::infrastructure::storage::s3::StorageService;
use media_worker::modules::job::orchestrator::JobOrchestrator;
use media_worker::modules::job::repository::{JobRepository, PgJobRepository};
use media_worker::modules::recording::service::RecordingMergeService;
use media_worker::modules::transcode::service::TranscodeService;
use media_worker::state::{AppState, ConsumerHandle};
use media_worker::workers::recording_merge::recording_merge_consumer;
use media_worker::workers::transcoder::transcode_consumer;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let config = match AppConfig::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(config.environment);

    match run(config).await {
        Ok(()) => {
            info!("👋 Media worker stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "media worker exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    info!(environment = %config.environment, workers = config.workers, "🚀 Starting media worker");

    let db = connect_to_db(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    let storage: Arc<dyn BlobStore> = Arc::new(StorageService::new(&config.storage));
    let media: Arc<dyn MediaProcessor> = Arc::new(FfmpegProcessor::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
    ));

    let amqp_url = config.rabbitmq.url()?;
    let rabbitmq = RabbitMqService::connect(&amqp_url, &RetryPolicy::default()).await?;

    let repo: Arc<dyn JobRepository> = Arc::new(PgJobRepository::new(db));
    let orchestrator = JobOrchestrator::new(repo, config.temp_dir.clone());
    let transcode = Arc::new(TranscodeService::new(
        orchestrator.clone(),
        Arc::clone(&storage),
        Arc::clone(&media),
    ));
    let recording_merge = Arc::new(RecordingMergeService::new(orchestrator, storage, media));

    let transcode_consumer = transcode_consumer(rabbitmq.clone(), config.workers);
    let merge_consumer = recording_merge_consumer(rabbitmq.clone(), config.workers);

    let state = AppState::new(
        config.environment,
        vec![
            ConsumerHandle {
                queue: transcode_consumer.queue(),
                state: transcode_consumer.state(),
            },
            ConsumerHandle {
                queue: merge_consumer.queue(),
                state: merge_consumer.state(),
            },
        ],
    );

    // `shutdown` stops intake; `closing` fires once every consumer drained.
    let shutdown = CancellationToken::new();
    let closing = CancellationToken::new();
    let close_task = rabbitmq.spawn_close_on(closing.clone());

    let mut consumers = JoinSet::new();
    {
        let cancel = shutdown.clone();
        consumers.spawn(async move {
            let result = transcode_consumer.consume(transcode, cancel.clone()).await;
            if result.is_err() {
                cancel.cancel();
            }
            result
        });
    }
    {
        let cancel = shutdown.clone();
        consumers.spawn(async move {
            let result = merge_consumer.consume(recording_merge, cancel.clone()).await;
            if result.is_err() {
                cancel.cancel();
            }
            result
        });
    }

    let mut replayers = JoinSet::new();
    if let Some(replay) = &config.dlq_replay {
        for topology in [QueueTopology::TRANSCODE, QueueTopology::RECORDING_MERGE] {
            let replayer = DlqReplayer::new(rabbitmq.clone(), topology, replay.clone());
            let cancel = shutdown.clone();
            replayers.spawn(async move { replayer.run(cancel).await });
        }
    }

    let http = {
        let closing = closing.clone();
        let shutdown = shutdown.clone();
        let port = config.http_port;
        tokio::spawn(async move {
            if let Err(e) = app::serve(port, state, closing).await {
                error!(error = %format!("{:#}", e), "health server failed");
                shutdown.cancel();
            }
        })
    };

    tokio::select! {
        _ = shutdown_signal() => info!("🛑 Shutdown signal received, draining consumers"),
        _ = shutdown.cancelled() => warn!("a component stopped unexpectedly, shutting down"),
    }
    shutdown.cancel();

    let mut failed = 0;
    while let Some(joined) = consumers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "consumer failed");
                failed += 1;
            }
            Err(e) => {
                error!(error = %e, "consumer task panicked");
                failed += 1;
            }
        }
    }
    while replayers.join_next().await.is_some() {}
    info!("✅ All consumers drained");

    closing.cancel();
    if let Err(e) = close_task.await {
        warn!(error = %e, "connection close task aborted");
    }
    if let Err(e) = http.await {
        warn!(error = %e, "health server task aborted");
    }

    if failed > 0 {
        bail!("{} consumer(s) stopped with an error", failed);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
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
}
