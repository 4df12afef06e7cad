//! Full turns through GameSession with scripted generator output.
//!
//! Run with: `cargo test -p adventure-core --test turn_flow`

use adventure_core::recovery::{Outcome, RecoveryError, RecoveryManager};
use adventure_core::state::{AvailableAction, MessageKind, MessageTag, NarrativeState};
use adventure_core::testing::{
    assert_consistent, assert_has_clue, assert_violation, sample_story, MockGenerator,
};
use adventure_core::validate::{validate, ITEM_CHECK, SCENE_CHECK};
use adventure_core::{CandidateResult, GameSession, SessionConfig, SessionError};
use std::sync::Arc;

fn setup() {
    let _ = dotenvy::dotenv();
}

fn new_session(generator: &MockGenerator) -> GameSession {
    setup();
    GameSession::new(
        Arc::new(sample_story()),
        generator.clone(),
        SessionConfig::new("Ada"),
    )
    .expect("sample story opening should be consistent")
}

const OPENING: &str = r#"{
    "description": "Rain drums on the windows. Thomas Reed takes your coat.",
    "available_actions": ["examine rug", {"action": "talk", "target": "Thomas Reed"}]
}"#;

const EXAMINE_RUG: &str = "Here's what happens:\n```json\n{\"next_scene\": \"library\", \
    \"description\": \"Under the lantern light the rug shows a dark stain.\", \
    \"new_clues\": [\"Ink Stain\"], \"new_items\": [\"lantern\"],}\n```";

// =============================================================================
// Committed turns
// =============================================================================

#[tokio::test]
async fn test_turns_commit_and_accumulate() {
    let generator = MockGenerator::new()
        .with_response(OPENING)
        .with_response(EXAMINE_RUG);
    let mut session = new_session(&generator);

    let opening = session.describe_scene().await.unwrap();
    assert!(opening.is_committed());
    assert!(session.state().has_met(session.story(), "thomas"));
    assert_eq!(session.state().available_actions.len(), 2);
    assert_eq!(
        session.state().available_actions[1],
        AvailableAction::structured("talk", "Thomas Reed", "")
    );

    let turn = session.player_action("examine", "rug").await.unwrap();
    assert!(turn.is_committed());

    let state = session.state();
    assert_eq!(state.current_scene, "library");
    assert_has_clue(state, session.story(), "ink_stain");
    assert_eq!(state.inventory, vec!["lantern"]);
    // The previous offer stays when a result offers nothing new.
    assert_eq!(state.available_actions.len(), 2);
    assert_eq!(
        state.last_message().map(|m| m.kind),
        Some(MessageKind::Narrative)
    );
    assert_consistent(&validate(state, session.story()));
    assert_eq!(session.recovery().snapshot(), Some(state));
    assert_eq!(generator.remaining(), 0);
}

#[tokio::test]
async fn test_messy_dialogue_is_recovered() {
    let generator = MockGenerator::new().with_response(
        "{'dialogue': 'The ink? I spilled it myself.', 'emotion': 'nervous', hints: ['Ink Stain'],}",
    );
    let mut session = new_session(&generator);

    let turn = session
        .talk_to("Eleanor Voss", Some("the stain"))
        .await
        .unwrap();

    assert!(turn.is_committed());
    let state = session.state();
    assert!(state.has_met(session.story(), "eleanor"));
    assert_has_clue(state, session.story(), "ink_stain");
    let spoken = state
        .messages
        .iter()
        .find(|m| m.kind == MessageKind::Character)
        .unwrap();
    assert_eq!(spoken.character.as_deref(), Some("Eleanor Voss"));
    assert_eq!(spoken.content, "The ink? I spilled it myself.");
}

#[tokio::test]
async fn test_analysis_after_discovery() {
    let generator = MockGenerator::new()
        .with_response(EXAMINE_RUG)
        .with_response(r#"{"analysis": "Someone wrote in a hurry.", "theories": ["forgery"]}"#);
    let mut session = new_session(&generator);

    session.player_action("examine", "rug").await.unwrap();
    let turn = session.analyze_clues().await.unwrap();

    let CandidateResult::Analysis(analysis) = turn.result else {
        panic!("expected an analysis");
    };
    assert_eq!(analysis.theories, vec!["forgery"]);
    let last = session.state().last_message().unwrap();
    assert_eq!(last.content, "CLUE ANALYSIS: Someone wrote in a hurry.");
    assert!(last.is_tagged(MessageTag::Analysis));
}

#[tokio::test]
async fn test_unknown_references_are_dropped() {
    let generator = MockGenerator::new().with_response(
        r#"{"description": "You pocket a strange key.", "new_items": ["phantom_key"], "new_clues": ["Bloody Glove"]}"#,
    );
    let mut session = new_session(&generator);

    let turn = session.player_action("search", "coat").await.unwrap();

    assert!(turn.is_committed());
    assert!(session.state().inventory.is_empty());
    assert!(session.state().discovered_clues.is_empty());
}

// =============================================================================
// Rollback and failures
// =============================================================================

#[tokio::test]
async fn test_invented_scene_rolls_back() {
    let generator = MockGenerator::new().with_response(OPENING).with_response(
        r#"{"next_scene": "secret_passage", "description": "A panel slides open.", "new_items": ["lantern"]}"#,
    );
    let mut session = new_session(&generator);
    session.describe_scene().await.unwrap();
    let before = session.state().clone();

    let turn = session.player_action("push", "panel").await.unwrap();

    assert!(!turn.is_committed());
    let Outcome::RolledBack(report) = &turn.outcome else {
        panic!("expected a rollback");
    };
    assert_violation(report, SCENE_CHECK);
    assert_eq!(session.state(), &before);
    assert!(session.state().inventory.is_empty());
    // The coerced result is still handed back for inspection.
    let CandidateResult::SceneTransition(scene) = &turn.result else {
        panic!("expected a scene transition");
    };
    assert_eq!(scene.next_scene.as_deref(), Some("secret_passage"));
}

#[tokio::test]
async fn test_parse_failure_leaves_state_untouched() {
    let generator = MockGenerator::new().with_response("I'm sorry, I can't continue the story.");
    let mut session = new_session(&generator);
    let before = session.state().clone();

    let err = session.player_action("look", "around").await.unwrap_err();

    match err {
        SessionError::Parse(failure) => {
            assert_eq!(failure.excerpt, "I'm sorry, I can't continue the story.");
        }
        other => panic!("expected a parse failure, got {other:?}"),
    }
    assert_eq!(session.state(), &before);
}

#[tokio::test]
async fn test_coercion_failure_leaves_state_untouched() {
    let generator = MockGenerator::new().with_response(r#"{"emotion": "angry"}"#);
    let mut session = new_session(&generator);
    let before = session.state().clone();

    let err = session.talk_to("thomas", None).await.unwrap_err();

    assert!(matches!(err, SessionError::Coerce(_)));
    assert_eq!(session.state(), &before);
}

#[tokio::test]
async fn test_session_continues_after_failures() {
    let generator = MockGenerator::new()
        .with_failure("upstream timeout")
        .with_response("not json")
        .with_response(OPENING);
    let mut session = new_session(&generator);

    assert!(session.describe_scene().await.is_err());
    assert!(session.describe_scene().await.is_err());
    assert!(session.describe_scene().await.unwrap().is_committed());
    assert_eq!(generator.inputs().len(), 3);
}

// =============================================================================
// Recovery without a session
// =============================================================================

#[test]
fn test_no_prior_snapshot() {
    let story = sample_story();
    let mut manager = RecoveryManager::new();
    let candidate = NarrativeState::new(&story, "Ada", "attic");

    let err = manager.ensure_consistency(candidate, &story).unwrap_err();

    let RecoveryError::NoPriorSnapshot { report } = err;
    assert_violation(&report, SCENE_CHECK);
    assert!(manager.snapshot().is_none());
}

#[test]
fn test_rollback_between_opening_and_library() {
    let story = sample_story();
    let mut manager = RecoveryManager::new();
    let opening = NarrativeState::new(&story, "Ada", "opening");

    manager.ensure_consistency(opening.clone(), &story).unwrap();
    let library = opening.move_to("library");
    assert!(manager
        .ensure_consistency(library.clone(), &story)
        .unwrap()
        .is_committed());

    let lost = library.clone().move_to("nowhere");
    let reconciled = manager.ensure_consistency(lost, &story).unwrap();
    assert_eq!(reconciled.state, library);
}

#[test]
fn test_exactly_one_item_violation() {
    let story = sample_story();
    let state = NarrativeState::new(&story, "Ada", "opening")
        .add_item("lantern")
        .add_item("phantom_key");

    let report = validate(&state, &story);

    assert_eq!(report.len(), 1);
    assert_eq!(report.violations()[0].check, ITEM_CHECK);
}
