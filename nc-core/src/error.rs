//! Error taxonomy for the controller and evidence transfer worker.
//!
//! Every variant maps directly onto one of the error kinds named in the
//! component design: a peer-facing failure always degrades to an HTTP 500
//! with the message rendered as plain text (see [`NcError::status_code`]).

use thiserror::Error;

/// Domain error type shared by the registry, crypto envelope, command
/// executor, outbound forwarder and evidence transfer worker.
#[derive(Debug, Error)]
pub enum NcError {
    #[error("Invalid cookie")]
    InvalidCookie,

    #[error("decrypt failed: {0}")]
    Decrypt(String),

    #[error("unknown anonymizer: {0}")]
    UnknownAnon(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("peer did not return a Set-Cookie header")]
    InvalidResponseCookie,

    #[error("command execution failed: {0}")]
    Exec(String),

    #[error("agent bid could not be resolved for instance {0}")]
    ZeroBid(String),

    #[error("evidence upload failed for {instance}/{evidence_id}: {source}")]
    EvidenceSendFailed {
        instance: String,
        evidence_id: String,
        source: String,
    },

    #[error("no element self-identifies with local instance {0}")]
    NoSelf(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NcError {
    /// Every controller-request-path error is reported as plain-text 500,
    /// per §7 of the specification; this is the one place that mapping
    /// is centralized so the HTTP layer never has to guess.
    pub fn status_code(&self) -> u16 {
        match self {
            NcError::InvalidCookie
            | NcError::Decrypt(_)
            | NcError::UnknownAnon(_)
            | NcError::Transport(_)
            | NcError::InvalidResponseCookie
            | NcError::Exec(_)
            | NcError::ZeroBid(_)
            | NcError::EvidenceSendFailed { .. }
            | NcError::NoSelf(_)
            | NcError::Other(_) => 500,
        }
    }

    /// Rendered body for the plain-text error responses of §4.4/§6.
    /// The `[NC]` prefix matches the log-line prefix used for
    /// controller-originated operational output.
    pub fn to_body(&self) -> String {
        format!("[NC] {self}")
    }
}

pub type Result<T> = std::result::Result<T, NcError>;
