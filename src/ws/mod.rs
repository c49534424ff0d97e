// Chat channel core: wire envelopes and the message router that dispatches
// them. The router owns no connection state; the session loop lives in
// api::ws.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ai::{AiError, CompletionProvider};
use crate::db::Database;
use crate::metrics;
use crate::npc::NpcDirectory;
use crate::prompt::{self, PromptError, PromptMessage, Role, Turn, PLAYER_SENDER};

/// Sender tag recorded for game-driven `system` turns.
pub const SYSTEM_SENDER: &str = "system";

/// Instruction used to condense raw event details before they are stored.
const EVENT_SUMMARY_INSTRUCTION: &str =
    "You summarize game events. Rewrite the event you are given as one short \
     past-tense sentence from the player's perspective.";

// ── Wire envelopes ───────────────────────────────────────────────────

/// The tagged wire message exchanged over the chat connection. The content
/// is decoded a second time once the kind is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    pub fn new(kind: &str, content: Value) -> Self {
        Self {
            kind: kind.to_string(),
            content,
        }
    }

    pub fn error(message: &str) -> Self {
        Self::new("error", json!({ "error": message }))
    }

    /// Render the envelope as a text frame.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","content":{"error":"serialization failure"}}"#.to_string()
        })
    }
}

/// Content of a `chat` or `system` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub unity_id: String,
    pub text: String,
    #[serde(rename = "npcId")]
    pub npc_id: String,
}

/// Content of an `event` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub unity_id: String,
    pub event_type: String,
    pub event_details: String,
}

// ── Errors ───────────────────────────────────────────────────────────

/// Everything that can go wrong while handling one envelope. All variants
/// are converted to an error envelope at the router boundary; none of them
/// terminate the connection.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid {kind} message: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("NPC with ID {0} not found")]
    NpcNotFound(String),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Completion(#[from] AiError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    content: Value,
) -> Result<T, ChatError> {
    serde_json::from_value(content).map_err(|source| ChatError::Decode { kind, source })
}

// ── Router ───────────────────────────────────────────────────────────

/// Dispatches inbound envelopes to handlers. Stateless between calls; every
/// outcome, success or failure, becomes an envelope on the wire.
pub struct MessageRouter {
    db: Arc<Database>,
    npcs: Arc<NpcDirectory>,
    provider: Arc<dyn CompletionProvider>,
    history_window: i64,
    event_window: i64,
}

impl MessageRouter {
    pub fn new(
        db: Arc<Database>,
        npcs: Arc<NpcDirectory>,
        provider: Arc<dyn CompletionProvider>,
        history_window: i64,
        event_window: i64,
    ) -> Self {
        Self {
            db,
            npcs,
            provider,
            history_window,
            event_window,
        }
    }

    /// Decode one raw text frame and dispatch it. Always produces a
    /// response envelope; a frame that is not a valid envelope gets an
    /// error envelope and the connection stays open.
    pub async fn route_text(&self, raw: &str) -> Envelope {
        match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) => self.route(envelope).await,
            Err(e) => {
                metrics::ERROR_ENVELOPES_TOTAL.inc();
                Envelope::error(&format!("invalid message envelope: {e}"))
            }
        }
    }

    /// Dispatch a decoded envelope by kind.
    pub async fn route(&self, envelope: Envelope) -> Envelope {
        let result = match envelope.kind.as_str() {
            "chat" => {
                metrics::ENVELOPES_ROUTED_TOTAL.with_label_values(&["chat"]).inc();
                self.handle_conversation(envelope.content, "chat").await
            }
            "system" => {
                metrics::ENVELOPES_ROUTED_TOTAL.with_label_values(&["system"]).inc();
                self.handle_conversation(envelope.content, "system").await
            }
            "event" => {
                metrics::ENVELOPES_ROUTED_TOTAL.with_label_values(&["event"]).inc();
                self.handle_event(envelope.content).await
            }
            other => {
                metrics::ENVELOPES_ROUTED_TOTAL.with_label_values(&["unknown"]).inc();
                metrics::ERROR_ENVELOPES_TOTAL.inc();
                tracing::warn!("unknown envelope kind: {other}");
                return Envelope::error("unknown message type");
            }
        };

        result.unwrap_or_else(|err| {
            metrics::ERROR_ENVELOPES_TOTAL.inc();
            tracing::warn!("envelope handling failed: {err}");
            Envelope::error(&err.to_string())
        })
    }

    /// `chat` and `system` envelopes share the completion flow; they differ
    /// only in the sender tag recorded for the inbound turn.
    async fn handle_conversation(
        &self,
        content: Value,
        kind: &'static str,
    ) -> Result<Envelope, ChatError> {
        let payload: ChatPayload = decode(kind, content)?;

        let npc = self
            .npcs
            .get(&payload.npc_id)
            .ok_or_else(|| ChatError::NpcNotFound(payload.npc_id.clone()))?;

        // The store returns newest-first; prompts read oldest-first.
        let mut recent = self
            .db
            .last_messages(&payload.unity_id, self.history_window)
            .await?;
        recent.reverse();
        let history: Vec<Turn> = recent
            .into_iter()
            .map(|m| Turn {
                sender: m.sender,
                text: m.message,
            })
            .collect();

        let mut recent_events = self
            .db
            .last_events(&payload.unity_id, self.event_window)
            .await?;
        recent_events.reverse();
        let events: Vec<String> = recent_events.into_iter().map(|e| e.event_details).collect();

        let messages = prompt::assemble(npc, &history, &events, &payload.text)?;

        let sender = if kind == "system" {
            SYSTEM_SENDER
        } else {
            PLAYER_SENDER
        };
        self.db
            .append_message(&payload.unity_id, &payload.text, sender, &payload.npc_id)
            .await?;

        let completion = self.complete_timed(&messages).await?;

        self.db
            .append_message(&payload.unity_id, &completion, &payload.npc_id, PLAYER_SENDER)
            .await?;

        Ok(Envelope::new(
            kind,
            json!({ "completion": completion, "npcId": payload.npc_id }),
        ))
    }

    /// `event` envelopes run the summarization pipeline: details are
    /// condensed by the completion provider, then the summary is stored.
    /// A failed summarization leaves nothing persisted.
    async fn handle_event(&self, content: Value) -> Result<Envelope, ChatError> {
        let payload: EventPayload = decode("event", content)?;

        if payload.event_details.trim().is_empty() {
            return Err(PromptError::EmptyMessage.into());
        }

        let messages = vec![
            PromptMessage::new(Role::System, EVENT_SUMMARY_INSTRUCTION),
            PromptMessage::new(Role::User, payload.event_details.clone()),
        ];
        let summary = self.complete_timed(&messages).await?;

        self.db
            .append_event(&payload.unity_id, &payload.event_type, &summary)
            .await?;

        Ok(Envelope::new(
            "event",
            json!({ "event_type": payload.event_type }),
        ))
    }

    async fn complete_timed(&self, messages: &[PromptMessage]) -> Result<String, AiError> {
        let timer = metrics::COMPLETION_DURATION_SECONDS.start_timer();
        let result = self.provider.complete(messages).await;
        timer.observe_duration();
        if result.is_err() {
            metrics::COMPLETION_FAILURES_TOTAL.inc();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_envelope_decodes_tag_first() {
        let raw = r#"{"type":"chat","content":{"unity_id":"p1","text":"hello","npcId":"npc_bob"}}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, "chat");

        let payload: ChatPayload = serde_json::from_value(envelope.content).unwrap();
        assert_eq!(payload.unity_id, "p1");
        assert_eq!(payload.npc_id, "npc_bob");
    }

    #[test]
    fn test_envelope_without_content_still_parses() {
        let envelope: Envelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(envelope.kind, "ping");
        assert!(envelope.content.is_null());
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = Envelope::error("unknown message type");
        let text = envelope.to_text();
        assert_eq!(
            text,
            r#"{"type":"error","content":{"error":"unknown message type"}}"#
        );
    }

    #[test]
    fn test_decode_error_names_the_kind() {
        let err = decode::<ChatPayload>("chat", json!({"unity_id": "p1"})).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("invalid chat message:"), "{msg}");
    }

    #[test]
    fn test_npc_not_found_message() {
        let err = ChatError::NpcNotFound("npc_zed".to_string());
        assert_eq!(err.to_string(), "NPC with ID npc_zed not found");
    }

    #[test]
    fn test_event_payload_shape() {
        let raw = r#"{"unity_id":"p1","event_type":"quest","event_details":"took the job"}"#;
        let payload: EventPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.event_type, "quest");
    }
}
