// Static NPC profile configuration, loaded once at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Personality and contact record for one non-player character.
/// Immutable for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcProfile {
    #[serde(rename = "npc_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone_number: String,
    pub location: String,
    pub occupation: String,
    pub traits: Vec<String>,
    pub quirks: Vec<String>,
    pub goals: String,
    pub backstory: String,
    pub speech_style: String,
}

/// All configured NPCs, indexed by id with a secondary phone-number index.
#[derive(Debug, Clone)]
pub struct NpcDirectory {
    by_id: HashMap<String, NpcProfile>,
    by_phone: HashMap<String, String>,
}

impl NpcDirectory {
    /// Load the directory from a JSON file mapping npc id -> profile.
    pub fn load(path: &Path) -> Result<Self, NpcConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| NpcConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    /// Parse the directory from a JSON string (`{"npc_bob": {...}, ...}`).
    pub fn from_json(data: &str) -> Result<Self, NpcConfigError> {
        let by_id: HashMap<String, NpcProfile> = serde_json::from_str(data)?;

        let by_phone = by_id
            .iter()
            .filter(|(_, npc)| !npc.phone_number.is_empty())
            .map(|(id, npc)| (npc.phone_number.clone(), id.clone()))
            .collect();

        Ok(Self { by_id, by_phone })
    }

    /// Look up a profile by NPC id.
    pub fn get(&self, id: &str) -> Option<&NpcProfile> {
        self.by_id.get(id)
    }

    /// Look up a profile by its assigned phone number.
    pub fn by_phone(&self, phone_number: &str) -> Option<&NpcProfile> {
        self.by_phone
            .get(phone_number)
            .and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Errors loading the NPC configuration.
#[derive(Debug, thiserror::Error)]
pub enum NpcConfigError {
    #[error("cannot read NPC config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse NPC config: {0}")]
    Parse(#[from] serde_json::Error),
}
