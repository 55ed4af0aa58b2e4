//! Port traits for the two external collaborators named in the
//! specification's scope section: the persistent metadata store (`Db`)
//! and the local evidence queue (`EvidenceManager`). Both are out of
//! scope for this crate — only the interface the controller and worker
//! consume is specified here, per spec §1.
//!
//! Grounded on `w3b2-connector/src/storage.rs::Storage`: an
//! `async_trait` object-safe trait, implementations behind `Arc<dyn _>`.

use crate::model::{Element, InstanceId};
use async_trait::async_trait;
use serde_json::Value;

/// One DB-resolved element record, prior to `Kind` classification.
#[derive(Debug, Clone)]
pub struct ElementRecord {
    pub element: Element,
}

/// Session fields resolved from `EvidenceManager` + `Db::agent_status`,
/// per spec §3 "Transfer session".
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub bid: u64,
    pub ident: String,
    pub subtype: String,
    pub instance: InstanceId,
    pub version: String,
    pub user: String,
    pub device: String,
    pub source: String,
    pub sync_time: i64,
}

/// The persistent metadata store. Exposes element registries,
/// status/version updates, log append, config/upgrade blob retrieval,
/// agent id resolution, and evidence upload.
#[async_trait]
pub trait Db: Send + Sync {
    /// Full anonymizer + injector snapshot, fetched once at controller
    /// construction (§4.2).
    async fn list_elements(&self) -> anyhow::Result<(Vec<Element>, Vec<Element>)>;

    /// Whether the upstream DB connection is currently usable; the
    /// evidence worker skips a tick entirely when this is false (§4.7).
    async fn is_connected(&self) -> bool;

    #[allow(clippy::too_many_arguments)]
    async fn update_status(
        &self,
        name: &str,
        address: &str,
        status: &str,
        msg: &str,
        stats: Value,
        kind_tag: &str,
        version: &str,
    ) -> anyhow::Result<()>;

    async fn update_collector_version(&self, id: &str, version: &str) -> anyhow::Result<()>;
    async fn update_injector_version(&self, id: &str, version: &str) -> anyhow::Result<()>;

    async fn collector_add_log(
        &self,
        id: &str,
        time: i64,
        log_type: &str,
        desc: &str,
    ) -> anyhow::Result<()>;
    async fn injector_add_log(
        &self,
        id: &str,
        time: i64,
        log_type: &str,
        desc: &str,
    ) -> anyhow::Result<()>;

    async fn injector_config(&self, id: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn injector_upgrade(&self, id: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Resolves `(status, bid)` for an agent; `bid == 0` means still
    /// unresolved (§3, §4.7 step 3).
    async fn agent_status(
        &self,
        ident: &str,
        instance: &InstanceId,
        subtype: &str,
    ) -> anyhow::Result<(String, u64)>;

    async fn sync_start(
        &self,
        session: &TransferSession,
        version: &str,
        user: &str,
        device: &str,
        source: &str,
        sync_time: i64,
    ) -> anyhow::Result<()>;
    async fn send_evidence(&self, instance: &InstanceId, blob: &[u8]) -> anyhow::Result<()>;
    async fn sync_end(&self, session: &TransferSession) -> anyhow::Result<()>;
}

/// The local, per-instance evidence queue maintained outside this
/// process. `cached_entries` seeds the in-process queue at startup;
/// `instance_metadata`/`read_evidence`/`delete_evidence` back the
/// per-instance dispatch task.
#[async_trait]
pub trait EvidenceManager: Send + Sync {
    /// Every `(instance, evidence id)` pair known at startup, used by
    /// `send_cached()` (§4.7).
    async fn cached_entries(&self) -> anyhow::Result<Vec<(InstanceId, String)>>;

    async fn instance_metadata(&self, instance: &InstanceId) -> anyhow::Result<InstanceMetadata>;

    async fn read_evidence(
        &self,
        instance: &InstanceId,
        evidence_id: &str,
    ) -> anyhow::Result<Vec<u8>>;

    async fn delete_evidence(&self, instance: &InstanceId, evidence_id: &str) -> anyhow::Result<()>;
}

/// Instance metadata projected into [`TransferSession`] fields by the
/// dispatch task.
#[derive(Debug, Clone)]
pub struct InstanceMetadata {
    pub bid: u64,
    pub ident: String,
    pub subtype: String,
    pub version: String,
    pub user: String,
    pub device: String,
    pub source: String,
}
