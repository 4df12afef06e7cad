//! Consistency checks of a narrative state against its story graph.
//!
//! Each check is independent and reports every problem it finds as a plain
//! description; [`Validator`] runs all registered checks unconditionally and
//! collects the results into a [`ValidationReport`]. Validation never fails.

use crate::state::NarrativeState;
use crate::story::StoryGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SCENE_CHECK: &str = "scene-check";
pub const CLUE_CHECK: &str = "clue-check";
pub const CHARACTER_CHECK: &str = "character-check";
pub const ITEM_CHECK: &str = "item-check";
pub const LOCATION_CHECK: &str = "location-check";

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the check that found it.
    pub check: String,
    pub description: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.check, self.description)
    }
}

/// A named, independent consistency rule.
pub trait ConsistencyCheck: Send + Sync {
    /// Stable name used to group violations.
    fn name(&self) -> &'static str;

    /// Describe every way `state` breaks this rule. Empty means it holds.
    fn check(&self, state: &NarrativeState, story: &StoryGraph) -> Vec<String>;
}

/// The current scene exists in the story arc.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneCheck;

impl ConsistencyCheck for SceneCheck {
    fn name(&self) -> &'static str {
        SCENE_CHECK
    }

    fn check(&self, state: &NarrativeState, story: &StoryGraph) -> Vec<String> {
        if story.has_scene(&state.current_scene) {
            Vec::new()
        } else {
            vec![format!("Scene '{}' does not exist", state.current_scene)]
        }
    }
}

/// Every discovered clue resolves by id or display name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClueCheck;

impl ConsistencyCheck for ClueCheck {
    fn name(&self) -> &'static str {
        CLUE_CHECK
    }

    fn check(&self, state: &NarrativeState, story: &StoryGraph) -> Vec<String> {
        state
            .discovered_clues
            .iter()
            .filter(|clue| story.find_clue(clue).is_none())
            .map(|clue| format!("Clue '{clue}' does not exist"))
            .collect()
    }
}

/// Every met character resolves by id or display name.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterCheck;

impl ConsistencyCheck for CharacterCheck {
    fn name(&self) -> &'static str {
        CHARACTER_CHECK
    }

    fn check(&self, state: &NarrativeState, story: &StoryGraph) -> Vec<String> {
        state
            .progress
            .met_characters
            .iter()
            .filter(|character| story.find_character(character).is_none())
            .map(|character| format!("Character '{character}' does not exist"))
            .collect()
    }
}

/// Every inventory item is placed in some location.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemCheck;

impl ConsistencyCheck for ItemCheck {
    fn name(&self) -> &'static str {
        ITEM_CHECK
    }

    fn check(&self, state: &NarrativeState, story: &StoryGraph) -> Vec<String> {
        state
            .inventory
            .iter()
            .filter(|item| !story.has_item(item))
            .map(|item| format!("Item '{item}' does not exist in any location"))
            .collect()
    }
}

/// The current scene is a location or reachable from one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationCheck;

impl ConsistencyCheck for LocationCheck {
    fn name(&self) -> &'static str {
        LOCATION_CHECK
    }

    fn check(&self, state: &NarrativeState, story: &StoryGraph) -> Vec<String> {
        if story.location_for_scene(&state.current_scene).is_some() {
            Vec::new()
        } else {
            vec![format!(
                "No location found for scene '{}'",
                state.current_scene
            )]
        }
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Record a violation found outside the registered checks.
    pub fn push(&mut self, check: impl Into<String>, description: impl Into<String>) {
        self.violations.push(Violation {
            check: check.into(),
            description: description.into(),
        });
    }

    /// Violations found by a single check.
    pub fn for_check<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.check == check)
    }

    /// Violation descriptions grouped by check name.
    pub fn by_check(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for violation in &self.violations {
            grouped
                .entry(violation.check.as_str())
                .or_default()
                .push(violation.description.as_str());
        }
        grouped
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return f.write_str("consistent");
        }
        let descriptions: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        f.write_str(&descriptions.join("; "))
    }
}

/// A registry of consistency checks.
pub struct Validator {
    checks: Vec<Box<dyn ConsistencyCheck>>,
}

impl Default for Validator {
    /// The five standard checks.
    fn default() -> Self {
        Self::empty()
            .with_check(SceneCheck)
            .with_check(ClueCheck)
            .with_check(CharacterCheck)
            .with_check(ItemCheck)
            .with_check(LocationCheck)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("checks", &self.check_names())
            .finish()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator with no checks registered.
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Register an additional check.
    pub fn with_check(mut self, check: impl ConsistencyCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Run every registered check.
    pub fn validate(&self, state: &NarrativeState, story: &StoryGraph) -> ValidationReport {
        let violations = self
            .checks
            .iter()
            .flat_map(|check| {
                check
                    .check(state, story)
                    .into_iter()
                    .map(move |description| Violation {
                        check: check.name().to_string(),
                        description,
                    })
            })
            .collect();
        ValidationReport { violations }
    }
}

/// Validate with the standard checks.
pub fn validate(state: &NarrativeState, story: &StoryGraph) -> ValidationReport {
    Validator::default().validate(state, story)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_consistent, assert_violation, sample_story};

    fn fresh() -> (StoryGraph, NarrativeState) {
        let story = sample_story();
        let state = NarrativeState::new(&story, "Ada", "opening");
        (story, state)
    }

    #[test]
    fn test_fresh_state_is_consistent() {
        let (story, state) = fresh();
        assert_consistent(&validate(&state, &story));
    }

    #[test]
    fn test_unknown_scene() {
        let (story, state) = fresh();
        let state = state.move_to("secret_passage");

        let report = validate(&state, &story);
        assert_violation(&report, SCENE_CHECK);
        assert_violation(&report, LOCATION_CHECK);
    }

    #[test]
    fn test_one_bad_item_among_good() {
        let (story, state) = fresh();
        let state = state.add_item("lantern").add_item("phantom_key");

        let report = validate(&state, &story);
        assert_eq!(report.len(), 1);
        let items: Vec<_> = report.for_check(ITEM_CHECK).collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].description.contains("phantom_key"));
    }

    #[test]
    fn test_unresolved_clue_and_character() {
        let (story, mut state) = fresh();
        state.discovered_clues.push("Bloody Glove".to_string());
        state.discovered_clues.push("Ink Stain".to_string());
        state.progress.met_characters.push("The Gardener".to_string());
        state.progress.met_characters.push("Eleanor Voss".to_string());

        let report = validate(&state, &story);
        let grouped = report.by_check();
        assert_eq!(grouped[CLUE_CHECK], vec!["Clue 'Bloody Glove' does not exist"]);
        assert_eq!(
            grouped[CHARACTER_CHECK],
            vec!["Character 'The Gardener' does not exist"]
        );
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn test_scene_reachable_from_location() {
        let mut story = sample_story();
        story.scenes.push(crate::story::Scene::new("study"));
        let state = NarrativeState::new(&story, "Ada", "study");

        assert_consistent(&validate(&state, &story));
    }

    #[test]
    fn test_all_checks_run() {
        let (story, state) = fresh();
        let mut state = state.move_to("attic").add_item("phantom_key");
        state.discovered_clues.push("nope".to_string());
        state.progress.met_characters.push("nobody".to_string());

        let report = validate(&state, &story);
        assert_eq!(report.by_check().len(), 5);
    }

    struct PlayerNamed;

    impl ConsistencyCheck for PlayerNamed {
        fn name(&self) -> &'static str {
            "player-check"
        }

        fn check(&self, state: &NarrativeState, _story: &StoryGraph) -> Vec<String> {
            if state.player_name.is_empty() {
                vec!["Player has no name".to_string()]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_custom_check() {
        let story = sample_story();
        let state = NarrativeState::new(&story, "", "opening");
        let validator = Validator::new().with_check(PlayerNamed);

        assert_eq!(validator.check_names().len(), 6);
        let report = validator.validate(&state, &story);
        assert_violation(&report, "player-check");
        assert!(report.to_string().contains("[player-check] Player has no name"));
    }

    #[test]
    fn test_empty_validator_accepts_anything() {
        let (story, state) = fresh();
        let state = state.move_to("nowhere");

        assert!(Validator::empty().validate(&state, &story).is_consistent());
    }
}
