mod config;
mod demo;
mod opt;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use clap::Parser;
use connector_scheduler::{Orchestrator, OrchestratorConfig};
use connector_types::SourceFactory;
use demo::directory_source::DirectoryDataSourceFactory;
use opt::Opt;
use search_client::IndexGateway;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let opt = Opt::parse();
    setup_logging(&opt);

    if let Err(error) = run(opt).await {
        tracing::error!(%error, "fatal error");
        std::process::exit(1);
    }
}

/// `tracing` + `EnvFilter`, matching the teacher's bin-crate setup minus
/// the reload-handle machinery it uses only for HTTP-triggered
/// log-level routes this service does not expose.
fn setup_logging(opt: &Opt) {
    let default_level = if opt.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(opt: Opt) -> anyhow::Result<()> {
    let config = config::Config::load(&opt.config_file)?;

    let base_url = reqwest::Url::parse(&config.elasticsearch.host)?;
    let mut builder = reqwest::Client::builder();
    if let (Some(username), Some(password)) = (&config.elasticsearch.username, &config.elasticsearch.password) {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Basic {}", basic_auth(username, password));
        headers.insert(reqwest::header::AUTHORIZATION, auth.parse()?);
        builder = builder.default_headers(headers);
    }
    let http = builder.build()?;
    let client = search_client::SearchClient::new(base_url, http);

    let connectors = IndexGateway::new(client.clone(), config::CONNECTORS_INDEX);
    let jobs = IndexGateway::new(client, config::JOBS_INDEX);

    let mut factories: HashMap<String, Arc<dyn SourceFactory>> = HashMap::new();
    factories.insert(DirectoryDataSourceFactory.service_type().to_string(), Arc::new(DirectoryDataSourceFactory));

    let orchestrator_config = OrchestratorConfig {
        service_types: config.service_types.iter().cloned().collect::<HashSet<_>>(),
        fallback_service_type: opt.service_type.clone(),
        heartbeat_interval: std::time::Duration::from_secs(config.heartbeat_interval_secs),
        stuck_threshold: time::Duration::seconds(60),
        retry_on_conflict: 3,
    };
    let orchestrator = Orchestrator::new(connectors, jobs, factories, orchestrator_config);

    let mut poll = tokio::time::interval(std::time::Duration::from_secs(config.poll_interval_secs));
    loop {
        tokio::select! {
            _ = poll.tick() => {
                match orchestrator.tick().await {
                    Ok(report) => tracing::info!(
                        synced = report.synced,
                        skipped = report.skipped,
                        failed = report.failed,
                        orphaned = report.orphaned,
                        stuck = report.stuck,
                        resumed = report.resumed,
                        "tick complete"
                    ),
                    Err(error) => tracing::error!(%error, "tick failed"),
                }
            }
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received, exiting");
                break;
            }
        }
    }

    Ok(())
}

fn basic_auth(username: &str, password: &str) -> String {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    BASE64.encode(format!("{username}:{password}"))
}

/// SIGINT or SIGTERM: the orchestrator stops accepting new ticks and
/// lets in-flight syncs reach their next suspension point (§5
/// cancellation) rather than forcing termination.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
