//! In-memory `Db` / `EvidenceManager` test doubles.
//!
//! Exposed behind the `test-support` feature (and always under
//! `#[cfg(test)]`) so both this crate's unit tests and `nc-controller`'s
//! integration tests can exercise the controller and the evidence
//! transfer worker without a real upstream.

use crate::model::{Element, InstanceId};
use crate::ports::{Db, EvidenceManager, InstanceMetadata, TransferSession};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// One recorded call, for assertions in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DbCall {
    UpdateStatus {
        name: String,
        address: String,
        status: String,
        msg: String,
        stats: serde_json::Value,
        kind_tag: String,
        version: String,
    },
    UpdateCollectorVersion { id: String, version: String },
    UpdateInjectorVersion { id: String, version: String },
    CollectorAddLog { id: String, time: i64, log_type: String, desc: String },
    InjectorAddLog { id: String, time: i64, log_type: String, desc: String },
    AgentStatus { ident: String, instance: InstanceId, subtype: String },
    SyncStart { instance: InstanceId },
    SendEvidence { instance: InstanceId, blob: Vec<u8> },
    SyncEnd { instance: InstanceId },
}

pub struct MockDb {
    pub anonymizers: Vec<Element>,
    pub injectors: Vec<Element>,
    pub connected: bool,
    pub injector_config_blob: Mutex<Option<Vec<u8>>>,
    pub injector_upgrade_blob: Mutex<Option<Vec<u8>>>,
    pub agent_bid: Mutex<u64>,
    pub send_evidence_fails_for: Mutex<Vec<String>>,
    pub update_status_fails: Mutex<bool>,
    pub calls: Mutex<Vec<DbCall>>,
}

impl MockDb {
    pub fn new(anonymizers: Vec<Element>, injectors: Vec<Element>) -> Self {
        Self {
            anonymizers,
            injectors,
            connected: true,
            injector_config_blob: Mutex::new(None),
            injector_upgrade_blob: Mutex::new(None),
            agent_bid: Mutex::new(0),
            send_evidence_fails_for: Mutex::new(Vec::new()),
            update_status_fails: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<DbCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Db for MockDb {
    async fn list_elements(&self) -> anyhow::Result<(Vec<Element>, Vec<Element>)> {
        Ok((self.anonymizers.clone(), self.injectors.clone()))
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }

    async fn update_status(
        &self,
        name: &str,
        address: &str,
        status: &str,
        msg: &str,
        stats: serde_json::Value,
        kind_tag: &str,
        version: &str,
    ) -> anyhow::Result<()> {
        if *self.update_status_fails.lock().unwrap() {
            anyhow::bail!("simulated update_status failure");
        }
        self.calls.lock().unwrap().push(DbCall::UpdateStatus {
            name: name.into(),
            address: address.into(),
            status: status.into(),
            msg: msg.into(),
            stats,
            kind_tag: kind_tag.into(),
            version: version.into(),
        });
        Ok(())
    }

    async fn update_collector_version(&self, id: &str, version: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(DbCall::UpdateCollectorVersion {
            id: id.into(),
            version: version.into(),
        });
        Ok(())
    }

    async fn update_injector_version(&self, id: &str, version: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(DbCall::UpdateInjectorVersion {
            id: id.into(),
            version: version.into(),
        });
        Ok(())
    }

    async fn collector_add_log(
        &self,
        id: &str,
        time: i64,
        log_type: &str,
        desc: &str,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(DbCall::CollectorAddLog {
            id: id.into(),
            time,
            log_type: log_type.into(),
            desc: desc.into(),
        });
        Ok(())
    }

    async fn injector_add_log(
        &self,
        id: &str,
        time: i64,
        log_type: &str,
        desc: &str,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(DbCall::InjectorAddLog {
            id: id.into(),
            time,
            log_type: log_type.into(),
            desc: desc.into(),
        });
        Ok(())
    }

    async fn injector_config(&self, _id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.injector_config_blob.lock().unwrap().clone())
    }

    async fn injector_upgrade(&self, _id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.injector_upgrade_blob.lock().unwrap().clone())
    }

    async fn agent_status(
        &self,
        ident: &str,
        instance: &InstanceId,
        subtype: &str,
    ) -> anyhow::Result<(String, u64)> {
        self.calls.lock().unwrap().push(DbCall::AgentStatus {
            ident: ident.into(),
            instance: instance.clone(),
            subtype: subtype.into(),
        });
        Ok(("OK".into(), *self.agent_bid.lock().unwrap()))
    }

    async fn sync_start(
        &self,
        session: &TransferSession,
        _version: &str,
        _user: &str,
        _device: &str,
        _source: &str,
        _sync_time: i64,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(DbCall::SyncStart {
            instance: session.instance.clone(),
        });
        Ok(())
    }

    async fn send_evidence(&self, instance: &InstanceId, blob: &[u8]) -> anyhow::Result<()> {
        if self
            .send_evidence_fails_for
            .lock()
            .unwrap()
            .contains(&instance.0)
        {
            anyhow::bail!("simulated upload failure for {}", instance.0);
        }
        self.calls.lock().unwrap().push(DbCall::SendEvidence {
            instance: instance.clone(),
            blob: blob.to_vec(),
        });
        Ok(())
    }

    async fn sync_end(&self, session: &TransferSession) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(DbCall::SyncEnd {
            instance: session.instance.clone(),
        });
        Ok(())
    }
}

pub struct MockEvidenceManager {
    pub cached: Vec<(InstanceId, String)>,
    pub metadata: HashMap<String, InstanceMetadata>,
    pub blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
    pub deleted: Mutex<Vec<(InstanceId, String)>>,
}

impl MockEvidenceManager {
    pub fn new() -> Self {
        Self {
            cached: Vec::new(),
            metadata: HashMap::new(),
            blobs: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cached(mut self, instance: &str, evidence_id: &str, blob: Vec<u8>) -> Self {
        self.cached
            .push((InstanceId(instance.into()), evidence_id.into()));
        self.blobs
            .get_mut()
            .unwrap()
            .insert((instance.into(), evidence_id.into()), blob);
        self
    }

    pub fn with_metadata(mut self, instance: &str, meta: InstanceMetadata) -> Self {
        self.metadata.insert(instance.into(), meta);
        self
    }
}

impl Default for MockEvidenceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceManager for MockEvidenceManager {
    async fn cached_entries(&self) -> anyhow::Result<Vec<(InstanceId, String)>> {
        Ok(self.cached.clone())
    }

    async fn instance_metadata(&self, instance: &InstanceId) -> anyhow::Result<InstanceMetadata> {
        self.metadata
            .get(&instance.0)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no metadata for instance {}", instance.0))
    }

    async fn read_evidence(
        &self,
        instance: &InstanceId,
        evidence_id: &str,
    ) -> anyhow::Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(instance.0.clone(), evidence_id.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no blob for {}/{}", instance.0, evidence_id))
    }

    async fn delete_evidence(&self, instance: &InstanceId, evidence_id: &str) -> anyhow::Result<()> {
        self.blobs
            .lock()
            .unwrap()
            .remove(&(instance.0.clone(), evidence_id.to_string()));
        self.deleted
            .lock()
            .unwrap()
            .push((instance.clone(), evidence_id.to_string()));
        Ok(())
    }
}
