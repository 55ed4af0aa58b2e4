//! Command executor (C5): interprets decrypted inbound commands and
//! produces response envelopes. Unknown commands are silently ignored.

use crate::error::{NcError, Result};
use crate::model::{CommandEnvelope, CommandResult, Element, Kind};
use crate::ports::Db;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

/// Normalizes stats keys from their wire (string) form to the canonical
/// form `Db::update_status` expects. Values pass through unchanged.
///
/// The source keeps stats keys as interned symbols; since Rust has no
/// direct analogue, canonical form here is lower-snake-case with spaces
/// and hyphens folded to underscores — the one normalization rule that
/// recovers a stable, symbol-like key from arbitrary wire input.
pub fn normalize_stats(stats: &serde_json::Value) -> serde_json::Value {
    let Some(map) = stats.as_object() else {
        return stats.clone();
    };
    let normalized: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .map(|(k, v)| {
            let canonical = k.trim().to_lowercase().replace([' ', '-'], "_");
            (canonical, v.clone())
        })
        .collect();
    serde_json::Value::Object(normalized)
}

/// Executes a normalized batch of decrypted commands against `element`,
/// producing one response entry per recognized command, in input order.
pub async fn execute(
    db: &dyn Db,
    element: &Element,
    forwarded_for: Option<&str>,
    commands: &[CommandEnvelope],
) -> Result<Vec<CommandResult>> {
    let mut results = Vec::with_capacity(commands.len());
    for cmd in commands {
        if let Some(result) = execute_one(db, element, forwarded_for, cmd).await? {
            results.push(result);
        }
    }
    Ok(results)
}

async fn execute_one(
    db: &dyn Db,
    element: &Element,
    forwarded_for: Option<&str>,
    cmd: &CommandEnvelope,
) -> Result<Option<CommandResult>> {
    match cmd.command.as_str() {
        "STATUS" => Ok(Some(status(db, element, forwarded_for, cmd).await?)),
        "LOG" => Ok(Some(log(db, element, cmd).await?)),
        "CONFIG_REQUEST" => Ok(Some(config_request(db, element).await?)),
        "UPGRADE_REQUEST" => Ok(Some(upgrade_request(db, element).await?)),
        _ => Ok(None),
    }
}

async fn status(
    db: &dyn Db,
    element: &Element,
    forwarded_for: Option<&str>,
    cmd: &CommandEnvelope,
) -> Result<CommandResult> {
    let status = str_param(cmd, "status").unwrap_or_default();
    let msg = str_param(cmd, "msg").unwrap_or_default();
    let version = str_param(cmd, "version").unwrap_or_default();
    let stats = cmd
        .param("stats")
        .cloned()
        .map(|s| normalize_stats(&s))
        .unwrap_or_else(|| json!({}));

    let name_tag = element.kind.display_tag(&element.name);
    let address = match element.kind {
        Kind::Anonymizer => element.address.clone().unwrap_or_default(),
        Kind::Injector => forwarded_for.unwrap_or_default().to_string(),
    };
    let kind_tag = match element.kind {
        Kind::Anonymizer => "anonymizer",
        Kind::Injector => "injector",
    };

    db.update_status(&name_tag, &address, &status, &msg, stats, kind_tag, &version)
        .await
        .map_err(|e| NcError::Exec(e.to_string()))?;

    match element.kind {
        Kind::Anonymizer => db.update_collector_version(&element.id.0, &version).await,
        Kind::Injector => db.update_injector_version(&element.id.0, &version).await,
    }
    .map_err(|e| NcError::Exec(e.to_string()))?;

    Ok(CommandResult {
        command: "STATUS".into(),
        result: json!({ "status": "OK" }),
    })
}

async fn log(db: &dyn Db, element: &Element, cmd: &CommandEnvelope) -> Result<CommandResult> {
    let time = cmd
        .param("time")
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    let log_type = str_param(cmd, "type").unwrap_or_default();
    let desc = str_param(cmd, "desc").unwrap_or_default();

    let call = match element.kind {
        Kind::Anonymizer => db.collector_add_log(&element.id.0, time, &log_type, &desc),
        Kind::Injector => db.injector_add_log(&element.id.0, time, &log_type, &desc),
    };
    call.await.map_err(|e| NcError::Exec(e.to_string()))?;

    Ok(CommandResult {
        command: "LOG".into(),
        result: json!({ "status": "OK" }),
    })
}

async fn config_request(db: &dyn Db, element: &Element) -> Result<CommandResult> {
    let content = db
        .injector_config(&element.id.0)
        .await
        .map_err(|e| NcError::Exec(e.to_string()))?;

    let result = match content {
        Some(bytes) => json!({
            "status": "OK",
            "msg": { "type": "rules", "body": STANDARD.encode(bytes) }
        }),
        None => json!({ "status": "ERROR", "msg": "No new config" }),
    };

    Ok(CommandResult {
        command: "CONFIG_REQUEST".into(),
        result,
    })
}

async fn upgrade_request(db: &dyn Db, element: &Element) -> Result<CommandResult> {
    let content = db
        .injector_upgrade(&element.id.0)
        .await
        .map_err(|e| NcError::Exec(e.to_string()))?;

    let result = match content {
        Some(bytes) => json!({
            "status": "OK",
            "msg": { "body": STANDARD.encode(bytes) }
        }),
        None => json!({ "status": "ERROR", "msg": "No new config" }),
    };

    Ok(CommandResult {
        command: "UPGRADE_REQUEST".into(),
        result,
    })
}

fn str_param(cmd: &CommandEnvelope, key: &str) -> Option<String> {
    cmd.param(key).and_then(|v| v.as_str()).map(String::from)
}

/// Builds the `{command: STATUS, result: {status: ERROR, msg}}` fallback
/// entry the HTTP layer substitutes for the whole response list on an
/// uncaught failure (§4.5).
pub fn error_fallback(err: &NcError) -> Vec<CommandResult> {
    vec![CommandResult {
        command: "STATUS".into(),
        result: json!({ "status": "ERROR", "msg": err.to_string() }),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{DbCall, MockDb};
    use crate::model::ElementId;

    fn anonymizer() -> Element {
        Element {
            id: ElementId("a1".into()),
            name: "alpha".into(),
            kind: Kind::Anonymizer,
            cookie: "abc".into(),
            key: [1u8; 32],
            address: Some("10.0.0.1".into()),
            port: Some(9000),
            instance: "local".into(),
            next: vec![],
        }
    }

    fn injector() -> Element {
        Element {
            id: ElementId("i1".into()),
            name: "inj".into(),
            kind: Kind::Injector,
            cookie: "xyz".into(),
            key: [2u8; 32],
            address: None,
            port: None,
            instance: "n/a".into(),
            next: vec![],
        }
    }

    #[tokio::test]
    async fn status_for_anonymizer_updates_db_and_replies_ok() {
        let db = MockDb::new(vec![anonymizer()], vec![]);
        let elem = anonymizer();
        let cmd = CommandEnvelope::new("STATUS").with_params(json!({
            "status": "OK", "stats": {"x": 1}, "msg": "up", "version": "2.1"
        }));

        let results = execute(&db, &elem, None, &[cmd]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].command, "STATUS");
        assert_eq!(results[0].result, json!({ "status": "OK" }));

        let calls = db.calls();
        assert!(calls.contains(&DbCall::UpdateStatus {
            name: "RCS::ANON::alpha".into(),
            address: "10.0.0.1".into(),
            status: "OK".into(),
            msg: "up".into(),
            stats: json!({"x": 1}),
            kind_tag: "anonymizer".into(),
            version: "2.1".into(),
        }));
        assert!(calls.contains(&DbCall::UpdateCollectorVersion {
            id: "a1".into(),
            version: "2.1".into(),
        }));
    }

    #[tokio::test]
    async fn status_for_injector_uses_forwarded_for_as_address() {
        let db = MockDb::new(vec![], vec![injector()]);
        let elem = injector();
        let cmd = CommandEnvelope::new("STATUS").with_params(json!({
            "status": "OK", "msg": "", "version": "1.0"
        }));

        execute(&db, &elem, Some("203.0.113.5"), &[cmd]).await.unwrap();
        let calls = db.calls();
        assert!(calls.iter().any(|c| matches!(c,
            DbCall::UpdateStatus { name, address, kind_tag, .. }
                if name == "RCS::NI::inj" && address == "203.0.113.5" && kind_tag == "injector"
        )));
    }

    #[tokio::test]
    async fn config_request_with_no_config_returns_error_result() {
        let db = MockDb::new(vec![], vec![injector()]);
        let elem = injector();
        let cmd = CommandEnvelope::new("CONFIG_REQUEST");

        let results = execute(&db, &elem, None, &[cmd]).await.unwrap();
        assert_eq!(
            results[0].result,
            json!({ "status": "ERROR", "msg": "No new config" })
        );
    }

    #[tokio::test]
    async fn config_request_with_config_base64_encodes_body() {
        let db = MockDb::new(vec![], vec![injector()]);
        *db.injector_config_blob.lock().unwrap() = Some(b"rules-bytes".to_vec());
        let elem = injector();
        let cmd = CommandEnvelope::new("CONFIG_REQUEST");

        let results = execute(&db, &elem, None, &[cmd]).await.unwrap();
        let msg = &results[0].result["msg"];
        assert_eq!(msg["type"], "rules");
        assert_eq!(msg["body"], STANDARD.encode(b"rules-bytes"));
    }

    #[tokio::test]
    async fn unknown_command_produces_no_response_entry() {
        let db = MockDb::new(vec![], vec![injector()]);
        let elem = injector();
        let cmd = CommandEnvelope::new("FROBNICATE");

        let results = execute(&db, &elem, None, &[cmd]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn batch_order_is_preserved_for_recognized_commands() {
        let db = MockDb::new(vec![], vec![injector()]);
        let elem = injector();
        let commands = vec![
            CommandEnvelope::new("LOG").with_params(json!({"time": 1, "type": "t", "desc": "d"})),
            CommandEnvelope::new("UNKNOWN"),
            CommandEnvelope::new("CONFIG_REQUEST"),
        ];

        let results = execute(&db, &elem, None, &commands).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].command, "LOG");
        assert_eq!(results[1].command, "CONFIG_REQUEST");
    }

    #[test]
    fn normalize_stats_folds_keys_to_canonical_form() {
        let input = json!({"Request Count": 5, "cpu-load": 0.5, "already_ok": 1});
        let normalized = normalize_stats(&input);
        assert_eq!(normalized["request_count"], 5);
        assert_eq!(normalized["cpu_load"], 0.5);
        assert_eq!(normalized["already_ok"], 1);
    }
}
