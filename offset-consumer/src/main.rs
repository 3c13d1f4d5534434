use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use envconfig::Envconfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use offset_consumer::error::SetupError;
use offset_consumer::kafka::RdKafkaClient;
use offset_consumer::runner::{run_until_cancelled, CommitBack};
use offset_consumer::{Config, Meta, OffsetConsumer};

fn setup_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offset_consumer=info,rdkafka=warn,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
    Ok(())
}

fn log_message(key: u64, value: &[u8], meta: &Meta) {
    debug!(
        topic = %meta.topic,
        offset = meta.id,
        timestamp = meta.timestamp,
        key,
        bytes = value.len(),
        "Message delivered"
    );
}

/// Owns the consumer for its whole life. Fatal faults end the process here and
/// nowhere else.
fn run(config: Config, cancel: CancellationToken) -> Result<()> {
    let client = RdKafkaClient::new(&config.client_config()).map_err(SetupError::ClientCreation)?;
    let mut consumer = OffsetConsumer::new(client, &config.consumer_settings(), log_message)?;

    let commit_back = config
        .commit_back_interval()
        .map(|interval| CommitBack::new(interval, config.commit_back_gap(), Instant::now()));

    if let Err(fault) = run_until_cancelled(&mut consumer, &cancel, commit_back) {
        error!(error = ?fault, "Fatal consumer error, exiting");
        std::process::exit(1);
    }

    let diagnostics = consumer.close();
    if !diagnostics.is_empty() {
        for failure in diagnostics.recent() {
            warn!(kind = %failure.kind, message = %failure.message, "Swallowed consumer failure");
        }
        warn!(total = diagnostics.total(), "Consumer closed with swallowed failures");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    info!("Offset consumer starting...");

    let config = Config::init_from_env()
        .context("Failed to load configuration from environment variables")?;
    info!("Configuration loaded: {:?}", config);

    let metrics_addr: SocketAddr = format!("0.0.0.0:{}", config.metrics_port).parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Metrics server listening on {}", metrics_addr);

    let shutdown_timeout = config.shutdown_timeout();
    let cancel = CancellationToken::new();
    let consumer_cancel = cancel.clone();
    let mut consumer_task = tokio::task::spawn_blocking(move || run(config, consumer_cancel));

    tokio::select! {
        result = &mut consumer_task => {
            return result.context("consumer task panicked")?;
        }
        signal = wait_for_shutdown_signal() => signal?,
    }
    info!("Shutting down, waiting for the consumer to close");
    cancel.cancel();

    match tokio::time::timeout(shutdown_timeout, consumer_task).await {
        Ok(Ok(Ok(()))) => info!("Offset consumer stopped"),
        Ok(Ok(Err(e))) => error!("Consumer stopped with error: {e:#}"),
        Ok(Err(e)) => error!("Consumer task panicked: {e:#}"),
        Err(_) => error!("Consumer shutdown timed out after {:?}", shutdown_timeout),
    }
    Ok(())
}
