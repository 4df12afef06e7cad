//! The running narrative state and its additive mutators.
//!
//! A [`NarrativeState`] is threaded through the session by value: every
//! mutator consumes the state and returns the next one, so a caller can never
//! observe a half-applied turn. Clues, inventory and met characters only ever
//! grow, and the message log is append-only.

use crate::story::StoryGraph;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    Narrative,
    Player,
    Character,
}

/// Flags a message with what it announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageTag {
    Hint,
    ClueDiscovery,
    ItemAcquired,
    Analysis,
}

/// One entry of the message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    /// Display name of the speaking character.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<MessageTag>,
}

impl Message {
    fn of_kind(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            character: None,
            emotion: None,
            action: None,
            target: None,
            tag: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::of_kind(MessageKind::System, content)
    }

    pub fn narrative(content: impl Into<String>) -> Self {
        Self::of_kind(MessageKind::Narrative, content)
    }

    /// A player action, rendered as `"<action> <target>"`.
    pub fn player(action: impl Into<String>, target: impl Into<String>) -> Self {
        let action = action.into();
        let target = target.into();
        let content = if target.is_empty() {
            action.clone()
        } else {
            format!("{action} {target}")
        };
        Self {
            action: Some(action),
            target: Some(target),
            ..Self::of_kind(MessageKind::Player, content)
        }
    }

    /// A line spoken by a character.
    pub fn character(
        name: impl Into<String>,
        content: impl Into<String>,
        emotion: impl Into<String>,
    ) -> Self {
        Self {
            character: Some(name.into()),
            emotion: Some(emotion.into()),
            ..Self::of_kind(MessageKind::Character, content)
        }
    }

    pub fn with_tag(mut self, tag: MessageTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn is_tagged(&self, tag: MessageTag) -> bool {
        self.tag == Some(tag)
    }
}

/// An action offered to the player.
///
/// Generators return either plain labels or `{action, target, description}`
/// objects, sometimes mixed in one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AvailableAction {
    Label(String),
    Structured {
        action: String,
        #[serde(default)]
        target: String,
        #[serde(default)]
        description: String,
    },
}

impl AvailableAction {
    pub fn label(text: impl Into<String>) -> Self {
        Self::Label(text.into())
    }

    pub fn structured(
        action: impl Into<String>,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::Structured {
            action: action.into(),
            target: target.into(),
            description: description.into(),
        }
    }

    /// The verb of this action.
    pub fn action(&self) -> &str {
        match self {
            Self::Label(label) => label,
            Self::Structured { action, .. } => action,
        }
    }
}

/// Story progress markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Canonical ids of characters the player has encountered.
    #[serde(default)]
    pub met_characters: Vec<String>,
    /// Free-form markers kept alongside, round-tripped untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything that changes while a mystery is played.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeState {
    pub player_name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub current_scene: String,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub discovered_clues: Vec<String>,
    #[serde(default, rename = "game_progress")]
    pub progress: Progress,
    #[serde(default)]
    pub available_actions: Vec<AvailableAction>,
}

impl NarrativeState {
    /// Start a fresh adventure with a welcome message.
    pub fn new(
        story: &StoryGraph,
        player_name: impl Into<String>,
        opening_scene: impl Into<String>,
    ) -> Self {
        let player_name = player_name.into();
        let welcome = format!(
            "Welcome to \"{}\", {}! Your adventure begins now...",
            story.title, player_name
        );
        Self {
            player_name,
            messages: vec![Message::system(welcome)],
            current_scene: opening_scene.into(),
            ..Default::default()
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Check if a clue has been discovered, by id or display name.
    pub fn has_clue(&self, story: &StoryGraph, reference: &str) -> bool {
        let wanted = story.resolve_clue(reference).unwrap_or(reference);
        self.discovered_clues
            .iter()
            .any(|d| d == wanted || story.resolve_clue(d) == Some(wanted))
    }

    pub fn has_item(&self, item: &str) -> bool {
        self.inventory.iter().any(|i| i == item)
    }

    /// Check if a character has been met, by id or display name.
    pub fn has_met(&self, story: &StoryGraph, reference: &str) -> bool {
        let wanted = story.resolve_character(reference).unwrap_or(reference);
        self.progress.met_characters.iter().any(|m| m == wanted)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    // =========================================================================
    // Additive mutators
    // =========================================================================

    #[must_use]
    pub fn add_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Record a discovered clue.
    ///
    /// The canonical id is stored when the reference resolves; otherwise the
    /// raw reference is kept and left for the validator to flag.
    #[must_use]
    pub fn add_clue(mut self, story: &StoryGraph, reference: &str) -> Self {
        if self.has_clue(story, reference) {
            return self;
        }

        let (id, name) = match story.find_clue(reference) {
            Some(clue) => (clue.id.clone(), clue.name.clone()),
            None => {
                warn!(reference, "Keeping clue that does not resolve against the story");
                (reference.to_string(), reference.to_string())
            }
        };
        self.discovered_clues.push(id);
        self.add_message(
            Message::system(format!("New clue discovered: {name}"))
                .with_tag(MessageTag::ClueDiscovery),
        )
    }

    #[must_use]
    pub fn add_item(mut self, item: &str) -> Self {
        if self.has_item(item) {
            return self;
        }

        self.inventory.push(item.to_string());
        self.add_message(
            Message::system(format!("Item acquired: {item}")).with_tag(MessageTag::ItemAcquired),
        )
    }

    /// Mark every character whose display name appears verbatim in `text` as met.
    ///
    /// This is a substring heuristic: a character named "Ann" is also met by
    /// any text mentioning "Anna".
    #[must_use]
    pub fn record_encounters(mut self, story: &StoryGraph, text: &str) -> Self {
        for character in &story.characters {
            if character.name.is_empty() || !text.contains(character.name.as_str()) {
                continue;
            }
            if !self.progress.met_characters.contains(&character.id) {
                self.progress.met_characters.push(character.id.clone());
            }
        }
        self
    }

    /// Mark one character as met. Unknown references are dropped.
    #[must_use]
    pub fn meet_character(mut self, story: &StoryGraph, reference: &str) -> Self {
        let Some(id) = story.resolve_character(reference) else {
            warn!(reference, "Ignoring encounter with unknown character");
            return self;
        };
        if !self.progress.met_characters.iter().any(|m| m == id) {
            self.progress.met_characters.push(id.to_string());
        }
        self
    }

    #[must_use]
    pub fn move_to(mut self, scene: impl Into<String>) -> Self {
        self.current_scene = scene.into();
        self
    }

    /// Replace the actions offered to the player.
    #[must_use]
    pub fn offer_actions(mut self, actions: Vec<AvailableAction>) -> Self {
        self.available_actions = actions;
        self
    }
}
