// Inbound SMS webhook: players text NPC phone numbers, the messaging
// provider posts the message here, and the reply rides back in the TwiML
// response body.

use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::api::AppState;
use crate::metrics;
use crate::prompt::{self, Turn, PLAYER_SENDER};

/// Form fields the messaging provider posts for an inbound message.
#[derive(Debug, Deserialize)]
pub struct SmsWebhook {
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
}

/// POST /sms/receive
pub async fn receive_sms(
    State(state): State<AppState>,
    Form(webhook): Form<SmsWebhook>,
) -> impl IntoResponse {
    metrics::SMS_RECEIVED_TOTAL.inc();

    let reply = process_text(&state, &webhook.from, &webhook.to, &webhook.body).await;
    tracing::info!("processed text from {}: {}", webhook.from, reply);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        twiml_reply(&reply),
    )
}

/// Run one inbound text through the conversation flow. Every failure maps
/// to a human-readable reply body; the webhook never errors at the HTTP
/// level.
async fn process_text(state: &AppState, from: &str, to: &str, body: &str) -> String {
    // From is the player's number, To is the NPC's number. Providers are
    // inconsistent about the leading "+".
    let player_number = normalize_number(from);
    let npc_number = normalize_number(to);

    let player = match state.db.get_player_by_phone(&player_number).await {
        Ok(Some(player)) => player,
        Ok(None) => {
            tracing::warn!("text from unregistered number {player_number}");
            return "Sorry, your number isn't registered in our system.".to_string();
        }
        Err(e) => {
            tracing::error!("Database error in SMS lookup: {e}");
            return "Sorry, something went wrong on our end.".to_string();
        }
    };

    let Some(npc) = state.npcs.by_phone(&npc_number) else {
        tracing::warn!("text to unassigned number {npc_number}");
        return "This number is no longer in service.".to_string();
    };

    let mut recent = match state
        .db
        .last_texts(&player.unity_id, &npc_number, state.history_window)
        .await
    {
        Ok(texts) => texts,
        Err(e) => {
            tracing::error!("Database error reading texts: {e}");
            return "Sorry, something went wrong on our end.".to_string();
        }
    };
    recent.reverse();
    let history: Vec<Turn> = recent
        .into_iter()
        .map(|t| Turn {
            sender: if t.sender_number == player_number {
                PLAYER_SENDER.to_string()
            } else {
                npc.id.clone()
            },
            text: t.message,
        })
        .collect();

    let messages = match prompt::assemble(npc, &history, &[], body) {
        Ok(messages) => messages,
        Err(e) => return e.to_string(),
    };

    if let Err(e) = state
        .db
        .append_text(&player.unity_id, body, &player_number, &npc_number)
        .await
    {
        tracing::error!("Database error storing inbound text: {e}");
        return "Sorry, something went wrong on our end.".to_string();
    }

    let completion = match state.provider.complete(&messages).await {
        Ok(completion) => completion,
        Err(e) => {
            metrics::COMPLETION_FAILURES_TOTAL.inc();
            tracing::error!("completion failed for inbound text: {e}");
            return "Couldn't process completion.".to_string();
        }
    };

    if let Err(e) = state
        .db
        .append_text(&player.unity_id, &completion, &npc_number, &player_number)
        .await
    {
        tracing::error!("Database error storing NPC text: {e}");
    }

    completion
}

/// Normalize a phone number to `+`-prefixed form.
pub fn normalize_number(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('+') {
        trimmed.to_string()
    } else {
        format!("+{trimmed}")
    }
}

/// Render a TwiML response carrying one message body.
pub fn twiml_reply(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n    <Message>{}</Message>\n</Response>",
        xml_escape(body)
    )
}

// Element text only needs the three markup characters escaped.
fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_number() {
        assert_eq!(normalize_number("+15551112222"), "+15551112222");
        assert_eq!(normalize_number("15551112222"), "+15551112222");
        assert_eq!(normalize_number("  15551112222 "), "+15551112222");
    }

    #[test]
    fn test_twiml_reply_wraps_body() {
        let xml = twiml_reply("Aye, the fish are biting.");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Message>Aye, the fish are biting.</Message>"));
        assert!(xml.trim_end().ends_with("</Response>"));
    }

    #[test]
    fn test_twiml_reply_escapes_markup() {
        let xml = twiml_reply("fish & chips <cheap>");
        assert!(xml.contains("<Message>fish &amp; chips &lt;cheap&gt;</Message>"));
    }

    #[test]
    fn test_webhook_form_field_names() {
        let webhook: SmsWebhook = serde_urlencoded_like();
        assert_eq!(webhook.to, "+15550000001");
        assert_eq!(webhook.from, "+15551112222");
        assert_eq!(webhook.body, "hello bob");
    }

    fn serde_urlencoded_like() -> SmsWebhook {
        serde_json::from_value(serde_json::json!({
            "To": "+15550000001",
            "From": "+15551112222",
            "Body": "hello bob"
        }))
        .unwrap()
    }
}
