use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::messages::Message;

/// Actor id reserved for engine-authored lines.
pub const SYSTEM_ACTOR_ID: &str = "system";

/// Prefix marking an environment pseudo-actor; the remainder is a location id.
pub const ENV_ACTOR_PREFIX: &str = "env_";

/// An image attached to a log entry or a request. Owned by game state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub id: String,
    pub base64: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    #[serde(default)]
    pub is_hidden_round: bool,
    #[serde(default)]
    pub current_order: Vec<String>,
}

/// One line of simulation history. Never mutated after being appended.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub round: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_char_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present_char_ids: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<RoundSnapshot>,
}

impl LogEntry {
    pub fn new(round: u32, content: impl Into<String>) -> Self {
        Self {
            round,
            content: content.into(),
            acting_char_id: None,
            present_char_ids: None,
            location_id: None,
            images: Vec::new(),
            snapshot: None,
        }
    }

    pub fn at(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    pub fn by(mut self, actor_id: impl Into<String>) -> Self {
        self.acting_char_id = Some(actor_id.into());
        self
    }

    pub fn with_present<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.present_char_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.snapshot.get_or_insert_with(RoundSnapshot::default).is_hidden_round = true;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    pub fn is_hidden_round(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.is_hidden_round)
    }

    pub fn is_present(&self, actor_id: &str) -> bool {
        self.present_char_ids
            .as_ref()
            .is_some_and(|ids| ids.contains(actor_id))
    }

    pub fn is_acting(&self, actor_id: &str) -> bool {
        self.acting_char_id.as_deref() == Some(actor_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Character-specific context messages placed after model context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_config: Vec<Message>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub id: String,
    pub name: String,
}

/// Read-only snapshot of the simulation handed to each request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub history: Vec<LogEntry>,
    #[serde(default)]
    pub characters: HashMap<String, Character>,
    #[serde(default)]
    pub locations: HashMap<String, Location>,
}

impl GameState {
    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn actor_location<'a>(&'a self, actor_id: &'a str) -> Option<&'a str> {
        if let Some(loc) = env_actor_location(actor_id) {
            return Some(loc);
        }
        self.characters.get(actor_id)?.location_id.as_deref()
    }

    pub fn actor_name<'a>(&'a self, actor_id: &'a str) -> &'a str {
        self.characters
            .get(actor_id)
            .map_or(actor_id, |c| c.name.as_str())
    }
}

/// Location id an environment pseudo-actor stands for, if it is one.
pub fn env_actor_location(actor_id: &str) -> Option<&str> {
    actor_id
        .strip_prefix(ENV_ACTOR_PREFIX)
        .filter(|loc| !loc.is_empty())
}
