//! Request handler (C4): the controller entry point, `act()`, dispatches
//! inbound `POST` (peer) and `PUSH` (DB-originated) requests.

use crate::chain::Chain;
use crate::crypto;
use crate::error::NcError;
use crate::executor;
use crate::forwarder::{Forwarder, PushRequest};
use crate::model::CommandEnvelope;
use crate::ports::Db;
use crate::registry::Registry;
use std::sync::Arc;
use tracing::warn;

/// Built once from a `Db` snapshot (§4.2/§4.3); cheap to clone, safe to
/// share across concurrently-running requests since both the registry
/// and chain are immutable after construction.
pub struct Controller {
    db: Arc<dyn Db>,
    registry: Registry,
    chain: Chain,
}

impl Controller {
    pub async fn new(db: Arc<dyn Db>, local_instance: &str) -> crate::error::Result<Self> {
        let (anonymizers, injectors) = db.list_elements().await.map_err(NcError::Other)?;
        let chain = Chain::build(&anonymizers, local_instance)?;
        let registry = Registry::new(anonymizers, injectors);
        Ok(Self { db, registry, chain })
    }

    /// `act(method, uri, body, httpMeta) -> (status, body)` — the single
    /// entry point the HTTP layer calls for every request.
    pub async fn act(
        &self,
        method: &str,
        body: &str,
        cookie_header: Option<&str>,
        forwarded_for: Option<&str>,
    ) -> (u16, String) {
        match method {
            "POST" => self.act_post(body, cookie_header, forwarded_for).await,
            "PUSH" => self.act_push(body).await,
            _ => (404, String::new()),
        }
    }

    async fn act_post(
        &self,
        body: &str,
        cookie_header: Option<&str>,
        forwarded_for: Option<&str>,
    ) -> (u16, String) {
        let cookie_header = match cookie_header.ok_or(NcError::InvalidCookie) {
            Ok(h) => h,
            Err(err) => return plain_error(err),
        };
        let element = match self.registry.bind_by_cookie(cookie_header) {
            Ok(e) => e,
            Err(err) => return plain_error(err),
        };
        let commands = match decode_commands(&element.key, body) {
            Ok(c) => c,
            Err(err) => return plain_error(err),
        };

        match executor::execute(self.db.as_ref(), element, forwarded_for, &commands).await {
            Ok(results) => match crypto::encrypt(&element.key, &results) {
                Ok(encoded) => (200, encoded),
                Err(err) => plain_error(err),
            },
            // §4.5/§7: an execution failure still degrades to the normal
            // encrypted envelope, with the whole response list replaced
            // by a single STATUS/ERROR entry, not a plain-text body.
            Err(err @ NcError::Exec(_)) => {
                warn!("[NC] {err}");
                let fallback = executor::error_fallback(&err);
                match crypto::encrypt(&element.key, &fallback) {
                    Ok(encoded) => (200, encoded),
                    Err(err) => plain_error(err),
                }
            }
            Err(err) => plain_error(err),
        }
    }

    async fn act_push(&self, body: &str) -> (u16, String) {
        let req: PushRequest = match serde_json::from_str(body) {
            Ok(req) => req,
            Err(err) => return (500, format!("[NC] malformed PUSH body: {err}")),
        };

        let forwarder = match Forwarder::new(&self.registry, &self.chain) {
            Ok(f) => f,
            Err(err) => return plain_error(err),
        };

        match forwarder.forward(self.db.as_ref(), &req).await {
            Ok((status, body)) => (status, body),
            Err(err) => {
                warn!("[NC] {err}");
                plain_error(err)
            }
        }
    }
}

/// Plain-text `(status, body)` pair for every controller-request-path
/// error that isn't the encrypted `ExecError` fallback (§4.4/§6/§7).
fn plain_error(err: NcError) -> (u16, String) {
    (err.status_code(), err.to_body())
}

/// Decodes a request body that may be a single command object or a JSON
/// array of them into a normalized `Vec<CommandEnvelope>` (§4.4).
fn decode_commands(key: &[u8; 32], body: &str) -> crate::error::Result<Vec<CommandEnvelope>> {
    let value: serde_json::Value = crypto::decrypt(key, body)?;
    match value {
        serde_json::Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| NcError::Decrypt(e.to_string()))
        }
        other => {
            let single: CommandEnvelope =
                serde_json::from_value(other).map_err(|e| NcError::Decrypt(e.to_string()))?;
            Ok(vec![single])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDb;
    use crate::model::{Element, ElementId, Kind};
    use serde_json::json;

    fn anonymizer(id: &str, instance: &str, addr: &str, port: u16, cookie: &str, key: u8) -> Element {
        Element {
            id: ElementId(id.into()),
            name: id.into(),
            kind: Kind::Anonymizer,
            cookie: cookie.into(),
            key: [key; 32],
            address: Some(addr.into()),
            port: Some(port),
            instance: instance.into(),
            next: vec![],
        }
    }

    #[tokio::test]
    async fn status_round_trip_returns_200_and_ok_result() {
        let alpha = anonymizer("a1", "local", "10.0.0.1", 9000, "abc", 9);
        let db = Arc::new(MockDb::new(vec![alpha.clone()], vec![]));
        let controller = Controller::new(db.clone(), "local").await.unwrap();

        let cmd = CommandEnvelope::new("STATUS").with_params(json!({
            "status": "OK", "stats": {"x": 1}, "msg": "up", "version": "2.1"
        }));
        let encrypted = crypto::encrypt(&alpha.key, &vec![cmd]).unwrap();

        let (status, body) = controller
            .act("POST", &encrypted, Some("ID=abc"), None)
            .await;
        assert_eq!(status, 200);

        let decoded: Vec<CommandEnvelope> = crypto::decrypt(&alpha.key, &body).unwrap();
        assert_eq!(decoded[0].command, "STATUS");
        assert_eq!(decoded[0].param("status").unwrap(), "OK");

        assert!(db
            .calls()
            .iter()
            .any(|c| matches!(c, crate::mock::DbCall::UpdateStatus { .. })));
    }

    #[tokio::test]
    async fn exec_failure_degrades_to_encrypted_status_error_fallback() {
        let alpha = anonymizer("a1", "local", "10.0.0.1", 9000, "abc", 9);
        let db = Arc::new(MockDb::new(vec![alpha.clone()], vec![]));
        *db.update_status_fails.lock().unwrap() = true;
        let controller = Controller::new(db.clone(), "local").await.unwrap();

        let cmd = CommandEnvelope::new("STATUS").with_params(json!({
            "status": "OK", "msg": "up", "version": "2.1"
        }));
        let encrypted = crypto::encrypt(&alpha.key, &vec![cmd]).unwrap();

        let (status, body) = controller
            .act("POST", &encrypted, Some("ID=abc"), None)
            .await;
        // Still the normal encrypted envelope, not a plain-text 500.
        assert_eq!(status, 200);

        let decoded: Vec<crate::model::CommandResult> = crypto::decrypt(&alpha.key, &body).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].command, "STATUS");
        assert_eq!(decoded[0].result["status"], "ERROR");
        assert!(decoded[0].result["msg"]
            .as_str()
            .unwrap()
            .contains("command execution failed"));
    }

    #[tokio::test]
    async fn unknown_cookie_returns_500_with_no_db_calls() {
        let db = Arc::new(MockDb::new(vec![], vec![]));
        let controller = Controller::new(db.clone(), "local").await.unwrap();

        let (status, body) = controller
            .act("POST", "irrelevant", Some("ID=unknown"), None)
            .await;
        assert_eq!(status, 500);
        assert!(body.contains("Invalid cookie"));
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn push_to_self_only_chain_sends_directly() {
        // No address reachable in tests; expect a transport-level 500,
        // not a resolution failure, proving the PUSH path was taken.
        let self_elem = anonymizer("self", "local", "127.0.0.1", 1, "selfcookie", 1);
        let db = Arc::new(MockDb::new(vec![self_elem.clone()], vec![]));
        let controller = Controller::new(db, "local").await.unwrap();

        let push = json!({"anon": "self", "command": "check"}).to_string();
        let (status, body) = controller.act("PUSH", &push, None, None).await;
        assert_eq!(status, 500);
        assert!(body.contains("Cannot communicate"));
    }

    #[tokio::test]
    async fn push_unknown_receiver_is_500() {
        let self_elem = anonymizer("self", "local", "127.0.0.1", 1, "selfcookie", 1);
        let db = Arc::new(MockDb::new(vec![self_elem], vec![]));
        let controller = Controller::new(db, "local").await.unwrap();
        let push = json!({"anon": "ghost", "command": "check"}).to_string();
        let (status, _) = controller.act("PUSH", &push, None, None).await;
        assert_eq!(status, 500);
    }
}
