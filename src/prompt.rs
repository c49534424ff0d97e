// Prompt assembly: projects an NPC profile plus conversation history into
// the role-tagged message list sent to the completion provider.

use serde::{Deserialize, Serialize};

use crate::npc::NpcProfile;

/// Canonical sender tag for turns the player authored. History turns with
/// any other sender (an NPC id, "system") map to the assistant role.
pub const PLAYER_SENDER: &str = "player";

/// Role of one prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged text unit sent to the completion provider.
/// Built fresh per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One stored conversation turn, reduced to what assembly needs.
#[derive(Debug, Clone)]
pub struct Turn {
    pub sender: String,
    pub text: String,
}

/// Errors producing a prompt.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("empty message")]
    EmptyMessage,
}

/// Render the persona instruction for one NPC.
pub fn system_prompt(npc: &NpcProfile) -> String {
    format!(
        "You are {}, a {} in {}. {}. Your personality is {}, and you're known for {}. \
         Your ultimate goal is to {}. When speaking, you {}.",
        npc.name,
        npc.occupation,
        npc.location,
        npc.backstory,
        npc.traits.join(", "),
        npc.quirks.join(" and "),
        npc.goals,
        npc.speech_style,
    )
}

/// Build the ordered message list for one completion request.
///
/// `history` must be oldest-first; callers reading from the store (which
/// returns newest-first) reverse the slice before passing it in. The output
/// is always: one system message (with `events` folded in when non-empty),
/// one entry per history turn in input order, then one user message holding
/// `input`. Output length is `history.len() + 2`.
///
/// Pure function: identical inputs produce identical output.
pub fn assemble(
    npc: &NpcProfile,
    history: &[Turn],
    events: &[String],
    input: &str,
) -> Result<Vec<PromptMessage>, PromptError> {
    if input.trim().is_empty() {
        return Err(PromptError::EmptyMessage);
    }

    let mut system = system_prompt(npc);
    if !events.is_empty() {
        system.push_str(" Recent events in the player's life: ");
        system.push_str(&events.join("; "));
        system.push('.');
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::new(Role::System, system));

    for turn in history {
        let role = if turn.sender == PLAYER_SENDER {
            Role::User
        } else {
            Role::Assistant
        };
        messages.push(PromptMessage::new(role, turn.text.clone()));
    }

    messages.push(PromptMessage::new(Role::User, input));
    Ok(messages)
}
