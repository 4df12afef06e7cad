//! Merging a coerced turn result into the narrative state.
//!
//! References coming from the generator are normalized against the story
//! first: clue references that do not resolve and item names no location
//! holds are dropped with a warning rather than merged. Scene moves are not
//! normalized here; an invented scene is left for the recovery manager to
//! reject.

use crate::coerce::{Analysis, CandidateResult, Dialogue, Hint, SceneTransition};
use crate::session::PlayerInput;
use crate::state::{Message, MessageTag, NarrativeState};
use crate::story::StoryGraph;
use tracing::warn;

/// Verbs whose target names the character being addressed.
const CONVERSATION_VERBS: &[&str] = &["talk", "ask", "question", "speak"];

/// Compose `state` with one turn's result, producing the candidate next state.
pub fn apply(
    state: NarrativeState,
    story: &StoryGraph,
    input: &PlayerInput,
    result: &CandidateResult,
) -> NarrativeState {
    match result {
        CandidateResult::SceneTransition(scene) => apply_scene(state, story, input, scene),
        CandidateResult::Dialogue(dialogue) => apply_dialogue(state, story, input, dialogue),
        CandidateResult::Hint(hint) => apply_hint(state, hint),
        CandidateResult::Analysis(analysis) => apply_analysis(state, analysis),
    }
}

fn apply_scene(
    state: NarrativeState,
    story: &StoryGraph,
    input: &PlayerInput,
    scene: &SceneTransition,
) -> NarrativeState {
    let mut state = state;

    if let PlayerInput::Action { action, target } = input {
        state = state.add_message(Message::player(action, target));
        if let Some(who) = addressed_character(action, target) {
            state = state.meet_character(story, who);
        }
    }

    for clue in &scene.new_clues {
        match story.resolve_clue(clue) {
            Some(id) => state = state.add_clue(story, id),
            None => warn!(clue = %clue, "Dropping unknown clue from result"),
        }
    }

    for item in &scene.new_items {
        match story.canonical_item(item) {
            Some(name) => state = state.add_item(name),
            None => warn!(item = %item, "Dropping item not placed in any location"),
        }
    }

    state = state.record_encounters(story, &scene.description);

    if !scene.available_actions.is_empty() {
        state = state.offer_actions(scene.available_actions.clone());
    }
    if let Some(next) = &scene.next_scene {
        state = state.move_to(next.clone());
    }

    state.add_message(Message::narrative(&scene.description))
}

/// The character a conversational action is aimed at.
///
/// `ask Eleanor about the will` addresses `Eleanor`.
fn addressed_character<'a>(action: &str, target: &'a str) -> Option<&'a str> {
    let verb = action.split_whitespace().next()?.to_ascii_lowercase();
    if !CONVERSATION_VERBS.contains(&verb.as_str()) {
        return None;
    }

    let who = match target.find(" about ") {
        Some(at) => &target[..at],
        None => target,
    };
    let who = who.trim();
    (!who.is_empty()).then_some(who)
}

fn apply_dialogue(
    state: NarrativeState,
    story: &StoryGraph,
    input: &PlayerInput,
    dialogue: &Dialogue,
) -> NarrativeState {
    let speaker = match input {
        PlayerInput::Talk { character, .. } => story.find_character(character),
        _ => None,
    };

    let mut state = match speaker {
        Some(character) => state.meet_character(story, &character.id).add_message(
            Message::character(&character.name, &dialogue.text, &dialogue.emotion),
        ),
        None => state.add_message(Message::narrative(&dialogue.text)),
    };

    // Hints that name a clue count as discovering it.
    for hint in &dialogue.hints {
        match story.resolve_clue(hint) {
            Some(id) => state = state.add_clue(story, id),
            None => warn!(hint = %hint, "Dropping dialogue hint that names no clue"),
        }
    }

    state
}

fn apply_hint(state: NarrativeState, hint: &Hint) -> NarrativeState {
    state.add_message(Message::system(format!("HINT: {}", hint.text)).with_tag(MessageTag::Hint))
}

fn apply_analysis(state: NarrativeState, analysis: &Analysis) -> NarrativeState {
    state.add_message(
        Message::system(format!("CLUE ANALYSIS: {}", analysis.summary))
            .with_tag(MessageTag::Analysis),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AvailableAction, MessageKind};
    use crate::testing::sample_story;

    fn fresh() -> (StoryGraph, NarrativeState) {
        let story = sample_story();
        let state = NarrativeState::new(&story, "Ada", "opening");
        (story, state)
    }

    fn scene(description: &str) -> SceneTransition {
        SceneTransition {
            next_scene: None,
            description: description.to_string(),
            new_clues: vec![],
            new_items: vec![],
            available_actions: vec![],
        }
    }

    #[test]
    fn test_scene_transition_merge() {
        let (story, state) = fresh();
        let result = CandidateResult::SceneTransition(SceneTransition {
            next_scene: Some("library".to_string()),
            new_clues: vec!["Ink Stain".to_string(), "Bloody Glove".to_string()],
            new_items: vec!["Lantern".to_string(), "phantom_key".to_string()],
            available_actions: vec![AvailableAction::label("read the letter")],
            ..scene("Eleanor Voss waves you into the library.")
        });

        let state = apply(
            state,
            &story,
            &PlayerInput::action("open", "library door"),
            &result,
        );

        assert_eq!(state.current_scene, "library");
        assert_eq!(state.discovered_clues, vec!["ink_stain"]);
        assert_eq!(state.inventory, vec!["lantern"]);
        assert_eq!(state.progress.met_characters, vec!["eleanor"]);
        assert_eq!(state.available_actions, vec![AvailableAction::label("read the letter")]);

        let kinds: Vec<_> = state.messages.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::System,
                MessageKind::Player,
                MessageKind::System,
                MessageKind::System,
                MessageKind::Narrative,
            ]
        );
        assert_eq!(state.messages[1].content, "open library door");
    }

    #[test]
    fn test_empty_action_list_keeps_previous() {
        let (story, state) = fresh();
        let state = state.offer_actions(vec![AvailableAction::label("look around")]);

        let state = apply(
            state,
            &story,
            &PlayerInput::DescribeScene,
            &CandidateResult::SceneTransition(scene("Dust everywhere.")),
        );

        assert_eq!(state.available_actions.len(), 1);
        assert_eq!(state.current_scene, "opening");
        assert_eq!(state.last_message().unwrap().kind, MessageKind::Narrative);
    }

    #[test]
    fn test_ask_about_meets_character() {
        let (story, state) = fresh();

        let state = apply(
            state,
            &story,
            &PlayerInput::action("ask", "Thomas Reed about the will"),
            &CandidateResult::SceneTransition(scene("He shrugs.")),
        );

        assert_eq!(state.progress.met_characters, vec!["thomas"]);
    }

    #[test]
    fn test_addressed_character() {
        assert_eq!(addressed_character("talk", "Eleanor"), Some("Eleanor"));
        assert_eq!(
            addressed_character("Ask", "Eleanor about the will"),
            Some("Eleanor")
        );
        assert_eq!(addressed_character("examine", "Eleanor"), None);
        assert_eq!(addressed_character("talk", "  "), None);
    }

    #[test]
    fn test_dialogue_merge() {
        let (story, state) = fresh();
        let result = CandidateResult::Dialogue(Dialogue {
            text: "I spilled the ink, nothing more.".to_string(),
            emotion: "nervous".to_string(),
            hints: vec!["ink_stain".to_string(), "the weather".to_string()],
            next_topics: vec![],
        });

        let state = apply(
            state,
            &story,
            &PlayerInput::talk("eleanor", Some("the stain")),
            &result,
        );

        assert!(state.has_met(&story, "eleanor"));
        assert_eq!(state.discovered_clues, vec!["ink_stain"]);
        let spoken = &state.messages[1];
        assert_eq!(spoken.kind, MessageKind::Character);
        assert_eq!(spoken.character.as_deref(), Some("Eleanor Voss"));
        assert_eq!(spoken.emotion.as_deref(), Some("nervous"));
    }

    #[test]
    fn test_analysis_message() {
        let (story, state) = fresh();
        let result = CandidateResult::Analysis(Analysis {
            summary: "The ink matches.".to_string(),
            connections: vec![],
            theories: vec![],
            next_steps: vec![],
        });

        let state = apply(state, &story, &PlayerInput::Analyze, &result);

        let last = state.last_message().unwrap();
        assert_eq!(last.content, "CLUE ANALYSIS: The ink matches.");
        assert!(last.is_tagged(MessageTag::Analysis));
    }
}
