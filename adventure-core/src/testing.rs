//! Testing utilities.
//!
//! - `MockGenerator` for deterministic turns without a model behind them
//! - `sample_story` as a small, fully consistent story graph
//! - `FixedClock` and assertion helpers

use crate::clock::Clock;
use crate::session::{GenerateError, PlayerInput, TextGenerator, TurnRequest};
use crate::state::NarrativeState;
use crate::story::{Character, Clue, Location, Scene, StoryGraph};
use crate::validate::ValidationReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A generator that replays scripted raw responses in order.
///
/// Clones share one script, so a test can keep a handle after giving the
/// generator to a session and inspect what was asked of it.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator {
    inner: Arc<Mutex<MockScript>>,
}

#[derive(Debug, Default)]
struct MockScript {
    responses: VecDeque<Result<String, GenerateError>>,
    inputs: Vec<PlayerInput>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw text to return, exactly as a model would.
    pub fn with_response(self, raw: impl Into<String>) -> Self {
        self.script().responses.push_back(Ok(raw.into()));
        self
    }

    /// Queue a generator failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.script()
            .responses
            .push_back(Err(GenerateError::new(message)));
        self
    }

    /// Inputs of every request received so far.
    pub fn inputs(&self) -> Vec<PlayerInput> {
        self.script().inputs.clone()
    }

    pub fn remaining(&self) -> usize {
        self.script().responses.len()
    }

    fn script(&self) -> MutexGuard<'_, MockScript> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &TurnRequest<'_>) -> Result<String, GenerateError> {
        let mut script = self.script();
        script.inputs.push(request.input.clone());
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(GenerateError::new("no more scripted responses")))
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A two-scene mystery: the foyer leads to the library once the ink stain
/// has been found.
pub fn sample_story() -> StoryGraph {
    let mut eleanor = Character::new("eleanor", "Eleanor Voss");
    eleanor.occupation = "Librarian".to_string();
    eleanor.knowledge = vec!["the will".to_string(), "the missing page".to_string()];
    eleanor.secrets = vec!["the missing page".to_string()];
    eleanor
        .relationships
        .insert("thomas".to_string(), "distrusts him".to_string());

    let mut thomas = Character::new("thomas", "Thomas Reed");
    thomas.occupation = "Butler".to_string();

    let mut ink_stain = Clue::new("ink_stain", "Ink Stain", 3);
    ink_stain.description = "Fresh ink on the foyer rug.".to_string();
    ink_stain.related_clues = vec!["torn_letter".to_string()];
    let mut torn_letter = Clue::new("torn_letter", "Torn Letter", 4);
    torn_letter.related_characters = vec!["eleanor".to_string()];

    let mut opening = Scene::new("opening").leading_to("library");
    opening.description = "Rain lashes the manor windows.".to_string();
    let library = Scene::new("library").requiring("ink_stain");

    StoryGraph {
        title: "The Inkwell Affair".to_string(),
        overview: "A will goes missing the night of the storm.".to_string(),
        characters: vec![eleanor, thomas],
        locations: vec![
            Location::new("opening", "Manor Foyer")
                .with_connection("library")
                .with_item("lantern")
                .with_clue("ink_stain")
                .with_character("thomas"),
            Location::new("library", "Library")
                .with_connection("opening")
                .with_connection("study")
                .with_item("brass key")
                .with_item("torn letter")
                .with_clue("torn_letter")
                .with_character("eleanor"),
        ],
        clues: vec![ink_stain, torn_letter],
        scenes: vec![opening, library],
    }
}

// =============================================================================
// Assertion helpers
// =============================================================================

/// Assert that a report has no violations.
#[track_caller]
pub fn assert_consistent(report: &ValidationReport) {
    assert!(
        report.is_consistent(),
        "Expected a consistent state, got: {report}"
    );
}

/// Assert that a report has at least one violation from `check`.
#[track_caller]
pub fn assert_violation(report: &ValidationReport, check: &str) {
    assert!(
        report.for_check(check).next().is_some(),
        "Expected a '{check}' violation, got: {report}"
    );
}

/// Assert that a clue has been discovered, by id or display name.
#[track_caller]
pub fn assert_has_clue(state: &NarrativeState, story: &StoryGraph, clue: &str) {
    assert!(
        state.has_clue(story, clue),
        "Expected clue '{clue}' to be discovered, have {:?}",
        state.discovered_clues
    );
}
