use anyhow::{Context, Result};
use clap::Parser;
use nc_controller::cli::{Cli, Commands};
use nc_controller::config::{self, load_config};
use nc_controller::http;
use nc_core::Controller;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_cmd) => {
            let config = load_config(&run_cmd.config)?;
            init_logging(&config.logging);

            let db = build_db()?;
            let evidence = build_evidence_manager()?;

            let controller = Arc::new(
                Controller::new(db.clone(), &config.local_instance)
                    .await
                    .context("failed to construct controller from DB snapshot")?,
            );

            let worker = Arc::new(
                nc_core::EvidenceWorker::new(db, evidence).with_tick_interval(
                    std::time::Duration::from_secs(config.evidence.tick_interval_secs),
                ),
            );
            worker
                .send_cached()
                .await
                .context("failed to seed evidence queue")?;
            let worker_handle = {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.run().await })
            };

            let app = http::router(controller);
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            tracing::info!("[NC] listening on {addr}");

            let serve = axum::serve(listener, app);
            tokio::select! {
                result = serve => {
                    if let Err(err) = result {
                        tracing::error!("[NC] server error: {err}");
                    }
                }
                _ = signal::ctrl_c() => {
                    tracing::info!("[NC] received Ctrl+C, shutting down");
                }
            }

            worker
                .stop(std::time::Duration::from_secs(
                    config.evidence.shutdown_timeout_secs,
                ))
                .await;
            worker_handle.abort();
            tracing::info!("[NC] shutdown complete");
        }
    }

    Ok(())
}

fn init_logging(cfg: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cfg.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// The persistent metadata store is out of scope for this crate (§1);
/// wiring a concrete `Db` implementation (e.g. a SQL client) is left to
/// deployment. A placeholder that always reports itself disconnected
/// keeps `main` linkable without fabricating a fake production backend.
fn build_db() -> Result<Arc<dyn nc_core::ports::Db>> {
    Ok(Arc::new(UnconfiguredDb::default()))
}

fn build_evidence_manager() -> Result<Arc<dyn nc_core::ports::EvidenceManager>> {
    Ok(Arc::new(UnconfiguredEvidenceManager::default()))
}

#[derive(Default)]
struct UnconfiguredDb;

#[async_trait::async_trait]
impl nc_core::ports::Db for UnconfiguredDb {
    async fn list_elements(&self) -> anyhow::Result<(Vec<nc_core::model::Element>, Vec<nc_core::model::Element>)> {
        Ok((Vec::new(), Vec::new()))
    }

    async fn is_connected(&self) -> bool {
        false
    }

    async fn update_status(
        &self,
        _name: &str,
        _address: &str,
        _status: &str,
        _msg: &str,
        _stats: serde_json::Value,
        _kind_tag: &str,
        _version: &str,
    ) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }

    async fn update_collector_version(&self, _id: &str, _version: &str) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }

    async fn update_injector_version(&self, _id: &str, _version: &str) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }

    async fn collector_add_log(&self, _id: &str, _time: i64, _log_type: &str, _desc: &str) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }

    async fn injector_add_log(&self, _id: &str, _time: i64, _log_type: &str, _desc: &str) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }

    async fn injector_config(&self, _id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn injector_upgrade(&self, _id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn agent_status(
        &self,
        _ident: &str,
        _instance: &nc_core::model::InstanceId,
        _subtype: &str,
    ) -> anyhow::Result<(String, u64)> {
        anyhow::bail!("no Db backend configured")
    }

    async fn sync_start(
        &self,
        _session: &nc_core::ports::TransferSession,
        _version: &str,
        _user: &str,
        _device: &str,
        _source: &str,
        _sync_time: i64,
    ) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }

    async fn send_evidence(&self, _instance: &nc_core::model::InstanceId, _blob: &[u8]) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }

    async fn sync_end(&self, _session: &nc_core::ports::TransferSession) -> anyhow::Result<()> {
        anyhow::bail!("no Db backend configured")
    }
}

#[derive(Default)]
struct UnconfiguredEvidenceManager;

#[async_trait::async_trait]
impl nc_core::ports::EvidenceManager for UnconfiguredEvidenceManager {
    async fn cached_entries(&self) -> anyhow::Result<Vec<(nc_core::model::InstanceId, String)>> {
        Ok(Vec::new())
    }

    async fn instance_metadata(
        &self,
        instance: &nc_core::model::InstanceId,
    ) -> anyhow::Result<nc_core::ports::InstanceMetadata> {
        anyhow::bail!("no EvidenceManager backend configured for {}", instance.0)
    }

    async fn read_evidence(
        &self,
        instance: &nc_core::model::InstanceId,
        _evidence_id: &str,
    ) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("no EvidenceManager backend configured for {}", instance.0)
    }

    async fn delete_evidence(&self, instance: &nc_core::model::InstanceId, _evidence_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("no EvidenceManager backend configured for {}", instance.0)
    }
}
