//! Save and load of mystery sessions.
//!
//! A save is one JSON blob holding the story graph alongside the narrative
//! state, so a loaded save can be re-validated before play resumes. Blobs are
//! read with the lenient parser since they often pass through hands (and
//! editors) on the way back in.

use crate::clock::Clock;
use crate::parser::{self, ParseFailure};
use crate::state::NarrativeState;
use crate::story::StoryGraph;
use crate::validate::{self, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unreadable save: {0}")]
    Parse(#[from] ParseFailure),

    #[error("Invalid save format")]
    InvalidFormat,

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Save is inconsistent with its story: {0}")]
    Inconsistent(ValidationReport),
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// A saved session with everything needed to resume play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedGame {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub session_id: Uuid,

    pub story: StoryGraph,

    pub state: NarrativeState,
}

/// The headline facts of a save, for listing saves without resuming them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    pub title: String,
    pub player_name: String,
    pub current_scene: String,
    pub clues_found: usize,
    pub saved_at: DateTime<Utc>,
}

impl SavedGame {
    pub fn new(
        session_id: Uuid,
        story: StoryGraph,
        state: NarrativeState,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: clock.now(),
            session_id,
            story,
            state,
        }
    }

    /// Serialize to the opaque blob handed to a string store.
    pub fn to_blob(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode a blob, checking the version but not the contents.
    pub fn decode(blob: &str) -> Result<Self, PersistError> {
        let value = parser::parse(blob, None)?;

        let found = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or(PersistError::InvalidFormat)?;
        if found != u64::from(SAVE_VERSION) {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: u32::try_from(found).unwrap_or(u32::MAX),
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Decode a blob and reject it unless its state fits its story.
    pub fn from_blob(blob: &str) -> Result<Self, PersistError> {
        let saved = Self::decode(blob)?;
        let report = saved.verify();
        if !report.is_consistent() {
            return Err(PersistError::Inconsistent(report));
        }
        Ok(saved)
    }

    /// Validate the saved state against the saved story.
    pub fn verify(&self) -> ValidationReport {
        validate::validate(&self.state, &self.story)
    }

    pub fn summary(&self) -> SaveSummary {
        SaveSummary {
            title: self.story.title.clone(),
            player_name: self.state.player_name.clone(),
            current_scene: self.state.current_scene.clone(),
            clues_found: self.state.discovered_clues.len(),
            saved_at: self.saved_at,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        fs::write(path, self.to_blob()?).await?;
        Ok(())
    }

    /// Load from a JSON file, rejecting inconsistent saves.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        Self::from_blob(&content)
    }
}

/// A save file found on disk.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub summary: SaveSummary,
}

/// List the readable saves in a directory, most recent first.
///
/// Files that fail to decode are skipped.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let mut saves = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.extension().is_some_and(|e| e == "json") {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path).await else {
            continue;
        };
        if let Ok(saved) = SavedGame::decode(&content) {
            saves.push(SaveInfo {
                path,
                summary: saved.summary(),
            });
        }
    }

    saves.sort_by(|a, b| b.summary.saved_at.cmp(&a.summary.saved_at));
    Ok(saves)
}

/// File name for a session's save.
pub fn save_path(base_dir: impl AsRef<Path>, session_id: Uuid) -> PathBuf {
    base_dir.as_ref().join(format!("{session_id}.json"))
}
