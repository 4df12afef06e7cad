//! The story graph a session must stay faithful to.
//!
//! A [`StoryGraph`] is produced once per session by the story generator and
//! is read-only afterwards. Cross references between its collections (a
//! location's characters, a clue's related clues, a scene's next scenes) are
//! plain string ids and are *not* checked on construction; the
//! [`validate`](crate::validate) module is what holds a narrative to them.
//!
//! Every "id or display name" lookup in the crate goes through the
//! `resolve_*` methods here so that mutators, validators and turn merging
//! agree on what a reference means.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Relationship level a character needs before sharing one of their secrets.
const SECRET_RELATIONSHIP_LEVEL: u8 = 4;

/// The static reference data of one adventure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryGraph {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub clues: Vec<Clue>,
    /// Scenes in story order.
    #[serde(default, rename = "story_arc")]
    pub scenes: Vec<Scene>,
}

/// A character in the story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub description: String,
    /// Other character id -> description of the relationship.
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
    #[serde(default)]
    pub knowledge: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
}

impl Character {
    /// Create a character with only an id and a display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check if a reference names this character, by id or by display name.
    pub fn matches(&self, reference: &str) -> bool {
        self.id == reference || self.name.eq_ignore_ascii_case(reference)
    }

    /// Whether this character would share a piece of knowledge at the given
    /// relationship level. Secrets need a level of at least 4.
    pub fn would_reveal(&self, knowledge: &str, relationship_level: u8) -> bool {
        if !self.knowledge.iter().any(|k| k == knowledge) {
            return false;
        }
        let is_secret = self.secrets.iter().any(|s| s == knowledge);
        !is_secret || relationship_level >= SECRET_RELATIONSHIP_LEVEL
    }
}

/// A place the player can be in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub connected_locations: Vec<String>,
    /// Item names that can be picked up here.
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub clues: Vec<String>,
    #[serde(default)]
    pub characters: Vec<String>,
}

impl Location {
    /// Create an empty location.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a connection to another location or scene id.
    pub fn with_connection(mut self, id: impl Into<String>) -> Self {
        self.connected_locations.push(id.into());
        self
    }

    /// Place an item here.
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.items.push(item.into());
        self
    }

    /// Place a clue here.
    pub fn with_clue(mut self, clue_id: impl Into<String>) -> Self {
        self.clues.push(clue_id.into());
        self
    }

    /// Place a character here.
    pub fn with_character(mut self, character_id: impl Into<String>) -> Self {
        self.characters.push(character_id.into());
        self
    }
}

/// A clue the player can discover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clue {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Importance from 1 (flavour) to 5 (case-breaking).
    #[serde(default = "default_importance", deserialize_with = "clamped_importance")]
    pub importance: u8,
    #[serde(default)]
    pub related_clues: Vec<String>,
    #[serde(default)]
    pub related_characters: Vec<String>,
}

fn default_importance() -> u8 {
    1
}

fn clamped_importance<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(u8::deserialize(deserializer)?.clamp(1, 5))
}

impl Clue {
    /// Create a clue with the given importance (clamped to 1..=5).
    pub fn new(id: impl Into<String>, name: impl Into<String>, importance: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            importance: importance.clamp(1, 5),
            related_clues: Vec::new(),
            related_characters: Vec::new(),
        }
    }

    /// Check if a reference names this clue, by id or by display name.
    pub fn matches(&self, reference: &str) -> bool {
        self.id == reference || self.name.eq_ignore_ascii_case(reference)
    }

    /// Importance clamped into the 1..=5 range, whatever the generator wrote.
    pub fn importance(&self) -> u8 {
        self.importance.clamp(1, 5)
    }
}

/// One step of the story arc.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "scene_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Clue ids that must be discovered before this scene unlocks.
    #[serde(default)]
    pub required_clues: Vec<String>,
    #[serde(default)]
    pub available_actions: Vec<String>,
    #[serde(default)]
    pub next_scenes: Vec<String>,
}

impl Scene {
    /// Create a scene with no requirements and no successors.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Require a clue before this scene unlocks.
    pub fn requiring(mut self, clue_id: impl Into<String>) -> Self {
        self.required_clues.push(clue_id.into());
        self
    }

    /// Add a successor scene.
    pub fn leading_to(mut self, scene_id: impl Into<String>) -> Self {
        self.next_scenes.push(scene_id.into());
        self
    }
}

impl StoryGraph {
    /// Create an empty story with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    // =========================================================================
    // Reference resolution
    // =========================================================================

    /// Find a clue by id, falling back to its display name.
    pub fn find_clue(&self, reference: &str) -> Option<&Clue> {
        self.clues
            .iter()
            .find(|c| c.id == reference)
            .or_else(|| self.clues.iter().find(|c| c.matches(reference)))
    }

    /// Resolve a clue id or display name to the canonical clue id.
    pub fn resolve_clue(&self, reference: &str) -> Option<&str> {
        self.find_clue(reference).map(|c| c.id.as_str())
    }

    /// Find a character by id, falling back to their display name.
    pub fn find_character(&self, reference: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.id == reference)
            .or_else(|| self.characters.iter().find(|c| c.matches(reference)))
    }

    /// Resolve a character id or display name to the canonical character id.
    pub fn resolve_character(&self, reference: &str) -> Option<&str> {
        self.find_character(reference).map(|c| c.id.as_str())
    }

    /// Check if an item name is placed, verbatim, in some location.
    pub fn has_item(&self, item: &str) -> bool {
        self.locations
            .iter()
            .any(|loc| loc.items.iter().any(|i| i == item))
    }

    /// Map an item name onto the spelling used by the story's locations.
    ///
    /// Exact matches win; otherwise a case-insensitive match is accepted.
    pub fn canonical_item(&self, item: &str) -> Option<&str> {
        let all_items = || self.locations.iter().flat_map(|loc| loc.items.iter());
        all_items()
            .find(|i| *i == item)
            .or_else(|| all_items().find(|i| i.eq_ignore_ascii_case(item.trim())))
            .map(String::as_str)
    }

    // =========================================================================
    // Scenes and locations
    // =========================================================================

    /// Get a scene by id.
    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    /// Check if a scene id exists in the story arc.
    pub fn has_scene(&self, id: &str) -> bool {
        self.scene(id).is_some()
    }

    /// Get a location by id.
    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    /// Find the location a scene takes place in or is reachable from.
    pub fn location_for_scene(&self, scene_id: &str) -> Option<&Location> {
        self.location(scene_id).or_else(|| {
            self.locations
                .iter()
                .find(|l| l.connected_locations.iter().any(|c| c == scene_id))
        })
    }

    /// Pick the first successor of `current` whose required clues have all
    /// been discovered. Stays on `current` when nothing is unlocked.
    pub fn next_unlocked_scene<'a>(&'a self, current: &'a str, discovered: &[String]) -> &'a str {
        let Some(scene) = self.scene(current) else {
            return current;
        };

        scene
            .next_scenes
            .iter()
            .filter_map(|id| self.scene(id))
            .find(|next| {
                next.required_clues
                    .iter()
                    .all(|clue| discovered.iter().any(|d| d == clue))
            })
            .map(|next| next.id.as_str())
            .unwrap_or(current)
    }
}
