//! Data model: elements, the local forwarding chain, and command envelopes.
//!
//! See spec §3. `Kind` replaces the source's truthiness-of-`type` check
//! with an explicit discriminant set once, at registry load.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub String);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anonymizer vs injector. Derived once at registry load time from the
/// `Db` snapshot, never inferred from field truthiness downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Anonymizer,
    Injector,
}

impl Kind {
    /// `RCS::ANON::<name>` / `RCS::NI::<name>` display tags (§6).
    pub fn display_tag(self, name: &str) -> String {
        match self {
            Kind::Anonymizer => format!("RCS::ANON::{name}"),
            Kind::Injector => format!("RCS::NI::{name}"),
        }
    }
}

/// Immutable snapshot of one network element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub name: String,
    pub kind: Kind,
    pub cookie: String,
    /// AES-256-GCM key, 32 bytes.
    pub key: [u8; 32],
    /// Anonymizers only; injectors observe their address from
    /// `X-Forwarded-For` on inbound requests instead.
    pub address: Option<String>,
    pub port: Option<u16>,
    /// Matches the process's configured `local_instance` for exactly one
    /// anonymizer: that element is "self".
    pub instance: String,
    /// Ordered list of successor anonymizer ids; only the first is used.
    pub next: Vec<ElementId>,
}

impl Element {
    pub fn endpoint(&self) -> Option<String> {
        match (&self.address, self.port) {
            (Some(addr), Some(port)) => Some(format!("{addr}:{port}")),
            _ => None,
        }
    }
}

/// `{command: STRING, params: OBJECT?, body: STRING?}` — the decrypted
/// (or, for PUSH, plaintext) command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: None,
            body: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

/// One response entry produced by the command executor, one per input
/// command that was recognized (§4.5: unknown commands produce none).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub result: serde_json::Value,
}
