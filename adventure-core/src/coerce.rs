//! Coercion of recovered JSON into typed turn results.
//!
//! Generators are asked for a fixed set of fields per result kind, but tend
//! to leave out the optional ones. Missing optional fields get defaults; a
//! missing required field, or any field of the wrong JSON type, is reported
//! as a [`CoercionFailure`] naming the kind and the field. `null` is treated
//! the same as an absent field.

use crate::state::AvailableAction;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Which shape a generator response is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    SceneTransition,
    Dialogue,
    Hint,
    Analysis,
}

impl ResultKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResultKind::SceneTransition => "scene-transition",
            ResultKind::Dialogue => "dialogue",
            ResultKind::Hint => "hint",
            ResultKind::Analysis => "analysis",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The outcome of a player action: where the story goes next.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneTransition {
    /// Scene to move to; `None` keeps the current scene.
    pub next_scene: Option<String>,
    pub description: String,
    /// Clue ids or display names.
    pub new_clues: Vec<String>,
    pub new_items: Vec<String>,
    pub available_actions: Vec<AvailableAction>,
}

/// A character's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Dialogue {
    pub text: String,
    pub emotion: String,
    /// Clue references the character lets slip.
    pub hints: Vec<String>,
    pub next_topics: Vec<String>,
}

/// A nudge for a stuck player.
#[derive(Debug, Clone, PartialEq)]
pub struct Hint {
    pub text: String,
    pub relevance: String,
    pub next_action: Option<String>,
    pub difficulty: String,
}

/// A review of the clues found so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub connections: Vec<String>,
    pub theories: Vec<String>,
    pub next_steps: Vec<String>,
}

/// A typed generator response, not yet merged into any state.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateResult {
    SceneTransition(SceneTransition),
    Dialogue(Dialogue),
    Hint(Hint),
    Analysis(Analysis),
}

impl CandidateResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            CandidateResult::SceneTransition(_) => ResultKind::SceneTransition,
            CandidateResult::Dialogue(_) => ResultKind::Dialogue,
            CandidateResult::Hint(_) => ResultKind::Hint,
            CandidateResult::Analysis(_) => ResultKind::Analysis,
        }
    }
}

/// A recovered value does not have the shape of the requested result kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionFailure {
    #[error("{kind} result must be a JSON object, found {found}")]
    NotAnObject { kind: ResultKind, found: &'static str },

    #[error("{kind} result is missing required field `{field}`")]
    MissingField {
        kind: ResultKind,
        field: &'static str,
    },

    #[error("{kind} result field `{field}` should be {expected}, found {found}")]
    WrongType {
        kind: ResultKind,
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Coerce a recovered JSON value into the result shape for `kind`.
pub fn coerce(value: &Value, kind: ResultKind) -> Result<CandidateResult, CoercionFailure> {
    let map = value.as_object().ok_or(CoercionFailure::NotAnObject {
        kind,
        found: type_name(value),
    })?;
    let fields = Fields { kind, map };

    let result = match kind {
        ResultKind::SceneTransition => CandidateResult::SceneTransition(SceneTransition {
            next_scene: fields
                .optional_str("next_scene")?
                .filter(|scene| !scene.trim().is_empty()),
            description: fields.required_str("description")?,
            new_clues: fields.str_list("new_clues")?,
            new_items: fields.str_list("new_items")?,
            available_actions: fields.actions("available_actions")?,
        }),
        ResultKind::Dialogue => CandidateResult::Dialogue(Dialogue {
            text: fields.required_str("dialogue")?,
            emotion: fields.str_or("emotion", "neutral")?,
            hints: fields.str_list("hints")?,
            next_topics: fields.str_list("next_topics")?,
        }),
        ResultKind::Hint => CandidateResult::Hint(Hint {
            text: fields.required_str("hint")?,
            relevance: fields.str_or("relevance", "")?,
            next_action: fields.optional_str("next_action")?,
            difficulty: fields.str_or("difficulty_level", "normal")?,
        }),
        ResultKind::Analysis => CandidateResult::Analysis(Analysis {
            summary: fields.required_str("analysis")?,
            connections: fields.str_list("connections")?,
            theories: fields.str_list("theories")?,
            next_steps: fields.str_list("next_investigations")?,
        }),
    };

    Ok(result)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Typed field access over one result object.
struct Fields<'a> {
    kind: ResultKind,
    map: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn wrong_type(
        &self,
        field: impl Into<String>,
        expected: &'static str,
        found: &Value,
    ) -> CoercionFailure {
        CoercionFailure::WrongType {
            kind: self.kind,
            field: field.into(),
            expected,
            found: type_name(found),
        }
    }

    fn required_str(&self, field: &'static str) -> Result<String, CoercionFailure> {
        self.optional_str(field)?.ok_or(CoercionFailure::MissingField {
            kind: self.kind,
            field,
        })
    }

    fn optional_str(&self, field: &str) -> Result<Option<String>, CoercionFailure> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.wrong_type(field, "a string", other)),
        }
    }

    fn str_or(&self, field: &str, default: &str) -> Result<String, CoercionFailure> {
        Ok(self
            .optional_str(field)?
            .unwrap_or_else(|| default.to_string()))
    }

    fn list(&self, field: &str) -> Result<&[Value], CoercionFailure> {
        match self.get(field) {
            None => Ok(&[] as &[Value]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(other) => Err(self.wrong_type(field, "an array", other)),
        }
    }

    fn str_list(&self, field: &str) -> Result<Vec<String>, CoercionFailure> {
        self.list(field)?
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(self.wrong_type(format!("{field}[{i}]"), "a string", other)),
            })
            .collect()
    }

    fn actions(&self, field: &str) -> Result<Vec<AvailableAction>, CoercionFailure> {
        self.list(field)?
            .iter()
            .enumerate()
            .map(|(i, item)| self.action(&format!("{field}[{i}]"), item))
            .collect()
    }

    fn action(&self, path: &str, item: &Value) -> Result<AvailableAction, CoercionFailure> {
        let entry = match item {
            Value::String(label) => return Ok(AvailableAction::Label(label.clone())),
            Value::Object(entry) => entry,
            other => return Err(self.wrong_type(path, "a string or an object", other)),
        };

        let text = |key: &str| -> Result<Option<String>, CoercionFailure> {
            match entry.get(key).filter(|v| !v.is_null()) {
                None => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(self.wrong_type(format!("{path}.{key}"), "a string", other)),
            }
        };

        let action = text("action")?.ok_or_else(|| {
            self.wrong_type(format!("{path}.action"), "a string", &Value::Null)
        })?;
        Ok(AvailableAction::Structured {
            action,
            target: text("target")?.unwrap_or_default(),
            description: text("description")?.unwrap_or_default(),
        })
    }
}
