//! Outbound forwarder (C6): onion-encapsulates a command through the
//! forwarding chain and performs the HTTP round-trip to the first hop.

use crate::chain::Chain;
use crate::crypto;
use crate::error::{NcError, Result};
use crate::executor;
use crate::model::{CommandEnvelope, CommandResult, Element, ElementId};
use crate::ports::Db;
use crate::registry::Registry;
use serde_json::json;
use std::time::Duration;

/// `{anon: receiverId, command, body?}` — the plaintext PUSH payload
/// from the DB (§4.6).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PushRequest {
    pub anon: String,
    pub command: String,
    #[serde(default)]
    pub body: Option<String>,
}

const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

pub struct Forwarder<'a> {
    registry: &'a Registry,
    chain: &'a Chain,
    http: reqwest::Client,
}

/// Raw result of the HTTP round-trip: the `Set-Cookie` header (still
/// `ID=<token>` shaped, unparsed) and the response body bytes.
struct RawReply {
    cookie_header: String,
    body: String,
}

impl<'a> Forwarder<'a> {
    pub fn new(registry: &'a Registry, chain: &'a Chain) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NcError::Transport(e.to_string()))?;
        Ok(Self {
            registry,
            chain,
            http,
        })
    }

    /// Resolves the receiver, builds the inner command, onion-wraps it
    /// through the forwarding chain, sends it to the first hop, and
    /// decrypts the reply. On an uncaught `STATUS` piggyback, also
    /// drives the command executor before returning.
    pub async fn forward(&self, db: &dyn Db, req: &PushRequest) -> Result<(u16, String)> {
        let receiver_id = ElementId(req.anon.clone());
        let receiver = self.registry.find_by_id(&receiver_id)?;

        let inner = build_inner(req);
        let mut msg = crypto::encrypt(&receiver.key, &inner)?;

        let mut hops: Vec<Element> = self.chain.forwarding_chain(&receiver_id);
        let mut target = receiver.clone();

        // "stop when either the chain has been fully consumed or only
        // self remains" — a single-element chain means the only hop is
        // self-as-collector, sent directly with no FORWARD layer.
        while hops.len() > 1 {
            let hop = hops.pop().expect("len > 1 implies non-empty");
            let forward = CommandEnvelope::new("FORWARD")
                .with_params(json!({
                    "address": target.endpoint().unwrap_or_default(),
                    "cookie": format!("ID={}", target.cookie),
                }))
                .with_body(msg);
            msg = crypto::encrypt(&hop.key, &forward)?;
            target = hop;
        }

        let raw = match self.send(&target, &msg).await {
            Ok(raw) => raw,
            Err(NcError::Transport(msg)) => return Ok((500, msg)),
            Err(e) => return Err(e),
        };

        // The element we physically connected to echoes our cookie back;
        // for a single-hop chain that element is self, matching §4.6 step
        // 9's "original bound element of this controller instance".
        let bound = self.registry.bind_by_cookie(&raw.cookie_header)?;
        let status = self.finish_reply(db, bound, &raw.body).await?;
        Ok((200, status))
    }

    async fn send(&self, target: &Element, msg: &str) -> Result<RawReply> {
        let endpoint = target
            .endpoint()
            .ok_or_else(|| NcError::Transport(format!("{} has no address/port", target.id)))?;
        let url = format!("http://{endpoint}/");

        let response = self
            .http
            .post(&url)
            .header("Cookie", format!("ID={}", target.cookie))
            .body(msg.to_string())
            .send()
            .await
            .map_err(|e| NcError::Transport(format!("Cannot communicate with {}: {e}", target.name)))?;

        let cookie_header = response
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(NcError::InvalidResponseCookie)?;

        let body = response
            .text()
            .await
            .map_err(|e| NcError::Transport(e.to_string()))?;

        Ok(RawReply { cookie_header, body })
    }

    /// Decrypts the peer reply under `bound_element`'s key, runs the
    /// STATUS piggyback if applicable, and returns the uniform
    /// `(200, status_string)` result the PUSH caller sees.
    ///
    /// Kept separate from [`Forwarder::forward`] so it can be
    /// unit-tested against a hand-built ciphertext without a live HTTP
    /// round-trip.
    pub async fn finish_reply(
        &self,
        db: &dyn Db,
        bound_element: &Element,
        ciphertext: &str,
    ) -> Result<String> {
        let reply: CommandEnvelope = crypto::decrypt(&bound_element.key, ciphertext)?;

        if reply.command == "STATUS" {
            let _: Vec<CommandResult> =
                executor::execute(db, bound_element, None, std::slice::from_ref(&reply)).await?;
        }

        Ok(reply
            .param("status")
            .and_then(|v| v.as_str())
            .unwrap_or("OK")
            .to_string())
    }
}

fn build_inner(req: &PushRequest) -> CommandEnvelope {
    match req.command.as_str() {
        "config" => CommandEnvelope::new("CONFIG")
            .with_params(json!({}))
            .with_body(req.body.clone().unwrap_or_default()),
        "upgrade" => CommandEnvelope::new("UPGRADE")
            .with_params(json!({}))
            .with_body(req.body.clone().unwrap_or_default()),
        _ => CommandEnvelope::new("CHECK").with_params(json!({})),
    }
}
