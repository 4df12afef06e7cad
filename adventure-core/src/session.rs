//! GameSession - the turn pipeline for one player's mystery.
//!
//! A session owns the current [`NarrativeState`], its [`RecoveryManager`]
//! and a shared [`StoryGraph`]. Each turn asks the [`TextGenerator`] for raw
//! text, recovers and coerces it, merges it into the state and lets the
//! recovery manager commit or roll back the result.

use crate::clock::Clock;
use crate::coerce::{coerce, CandidateResult, CoercionFailure, ResultKind};
use crate::merge;
use crate::parser::{LenientParser, ParseFailure, EXCERPT_CHARS};
use crate::persist::{PersistError, SavedGame};
use crate::recovery::{Outcome, RecoveryError, RecoveryManager};
use crate::state::NarrativeState;
use crate::story::StoryGraph;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// The generator collaborator failed to produce text.
#[derive(Debug, Clone, Error)]
#[error("text generation failed: {0}")]
pub struct GenerateError(pub String);

impl GenerateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Produces raw model text for a turn.
///
/// Implementors build the prompt from the [`TurnRequest`] and return the
/// model's reply untouched; recovering structure from it is the session's job.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &TurnRequest<'_>) -> Result<String, GenerateError>;
}

/// What the player asked for this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInput {
    /// Do something, e.g. `examine` the `desk` or `talk` to `Eleanor about the will`.
    Action { action: String, target: String },
    /// Converse with a character.
    Talk {
        character: String,
        topic: Option<String>,
    },
    Hint { difficulty: String },
    /// Review the clues found so far.
    Analyze,
    /// Describe the current scene without a player action.
    DescribeScene,
}

impl PlayerInput {
    pub fn action(action: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Action {
            action: action.into(),
            target: target.into(),
        }
    }

    pub fn talk(character: impl Into<String>, topic: Option<&str>) -> Self {
        Self::Talk {
            character: character.into(),
            topic: topic.map(str::to_string),
        }
    }

    /// The result shape a generator must answer this input with.
    pub fn expected_kind(&self) -> ResultKind {
        match self {
            PlayerInput::Action { .. } | PlayerInput::DescribeScene => ResultKind::SceneTransition,
            PlayerInput::Talk { .. } => ResultKind::Dialogue,
            PlayerInput::Hint { .. } => ResultKind::Hint,
            PlayerInput::Analyze => ResultKind::Analysis,
        }
    }
}

/// Everything a generator needs to produce one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub kind: ResultKind,
    pub input: &'a PlayerInput,
    pub state: &'a NarrativeState,
    pub story: &'a StoryGraph,
}

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Generator error: {0}")]
    Generate(#[from] GenerateError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseFailure),

    #[error("Malformed result: {0}")]
    Coerce(#[from] CoercionFailure),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    #[error("No clues have been discovered yet")]
    NothingToAnalyze,
}

/// Configuration for creating a new game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub player_name: String,

    /// Scene id the story starts in.
    pub opening_scene: String,

    /// Difficulty used when a hint request names none.
    pub hint_difficulty: String,

    /// Characters of raw model output kept when parsing fails.
    pub excerpt_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            player_name: "Detective".to_string(),
            opening_scene: "opening".to_string(),
            hint_difficulty: "normal".to_string(),
            excerpt_chars: EXCERPT_CHARS,
        }
    }
}

impl SessionConfig {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            ..Default::default()
        }
    }

    /// Build a config from `ADVENTURE_PLAYER_NAME`, `ADVENTURE_OPENING_SCENE`
    /// and `ADVENTURE_HINT_DIFFICULTY`, keeping defaults for unset variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("ADVENTURE_PLAYER_NAME") {
            config.player_name = name;
        }
        if let Ok(scene) = std::env::var("ADVENTURE_OPENING_SCENE") {
            config.opening_scene = scene;
        }
        if let Ok(difficulty) = std::env::var("ADVENTURE_HINT_DIFFICULTY") {
            config.hint_difficulty = difficulty;
        }
        config
    }

    pub fn with_player_name(mut self, name: impl Into<String>) -> Self {
        self.player_name = name.into();
        self
    }

    pub fn with_opening_scene(mut self, scene: impl Into<String>) -> Self {
        self.opening_scene = scene.into();
        self
    }

    pub fn with_hint_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.hint_difficulty = difficulty.into();
        self
    }

    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }
}

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The generator's result as coerced, before normalization.
    pub result: CandidateResult,
    pub outcome: Outcome,
}

impl TurnOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, Outcome::Committed)
    }
}

/// A mystery session.
pub struct GameSession {
    id: Uuid,
    story: Arc<StoryGraph>,
    state: NarrativeState,
    recovery: RecoveryManager,
    parser: LenientParser,
    config: SessionConfig,
    generator: Box<dyn TextGenerator>,
}

impl GameSession {
    /// Start a new session. The opening state must already be consistent.
    pub fn new(
        story: Arc<StoryGraph>,
        generator: impl TextGenerator + 'static,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let initial = NarrativeState::new(&story, &config.player_name, &config.opening_scene);
        let mut recovery = RecoveryManager::new();
        let state = recovery.ensure_consistency(initial, &story)?.state;

        Ok(Self {
            id: Uuid::new_v4(),
            story,
            state,
            recovery,
            parser: LenientParser::new().with_excerpt_chars(config.excerpt_chars),
            config,
            generator: Box::new(generator),
        })
    }

    /// Resume a saved session, re-validating its state.
    pub fn from_saved(
        saved: SavedGame,
        generator: impl TextGenerator + 'static,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let recovery = RecoveryManager::resume(saved.state.clone(), &saved.story)?;

        Ok(Self {
            id: saved.session_id,
            story: Arc::new(saved.story),
            state: saved.state,
            recovery,
            parser: LenientParser::new().with_excerpt_chars(config.excerpt_chars),
            config,
            generator: Box::new(generator),
        })
    }

    /// Load a session from a save file.
    pub async fn load(
        path: impl AsRef<Path>,
        generator: impl TextGenerator + 'static,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let saved = SavedGame::load_json(path).await?;
        Self::from_saved(saved, generator, config)
    }

    /// Save the session to a file.
    pub async fn save(&self, path: impl AsRef<Path>, clock: &dyn Clock) -> Result<(), SessionError> {
        self.to_saved(clock).save_json(path).await?;
        Ok(())
    }

    /// Snapshot the session for persistence.
    pub fn to_saved(&self, clock: &dyn Clock) -> SavedGame {
        SavedGame::new(self.id, (*self.story).clone(), self.state.clone(), clock)
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// Describe the current scene, e.g. right after the story is generated.
    pub async fn describe_scene(&mut self) -> Result<TurnOutcome, SessionError> {
        self.run_turn(PlayerInput::DescribeScene).await
    }

    /// Perform an action such as `examine desk` or `talk Eleanor about the will`.
    pub async fn player_action(
        &mut self,
        action: &str,
        target: &str,
    ) -> Result<TurnOutcome, SessionError> {
        self.run_turn(PlayerInput::action(action, target)).await
    }

    /// Talk to a character, by id or display name.
    pub async fn talk_to(
        &mut self,
        character: &str,
        topic: Option<&str>,
    ) -> Result<TurnOutcome, SessionError> {
        let id = self
            .story
            .resolve_character(character)
            .ok_or_else(|| SessionError::UnknownCharacter(character.to_string()))?
            .to_string();
        self.run_turn(PlayerInput::talk(id, topic)).await
    }

    /// Ask for a hint, at the configured difficulty unless one is given.
    pub async fn request_hint(
        &mut self,
        difficulty: Option<&str>,
    ) -> Result<TurnOutcome, SessionError> {
        let difficulty = difficulty
            .unwrap_or(self.config.hint_difficulty.as_str())
            .to_string();
        self.run_turn(PlayerInput::Hint { difficulty }).await
    }

    /// Ask for an analysis of the clues discovered so far.
    pub async fn analyze_clues(&mut self) -> Result<TurnOutcome, SessionError> {
        if self.state.discovered_clues.is_empty() {
            return Err(SessionError::NothingToAnalyze);
        }
        self.run_turn(PlayerInput::Analyze).await
    }

    async fn run_turn(&mut self, input: PlayerInput) -> Result<TurnOutcome, SessionError> {
        let kind = input.expected_kind();
        let request = TurnRequest {
            kind,
            input: &input,
            state: &self.state,
            story: &self.story,
        };
        let raw = self.generator.generate(&request).await?;

        let value = self.parser.parse(&raw, None)?;
        let result = coerce(&value, kind)?;

        // `self.state` is only replaced once reconciliation has succeeded.
        let candidate = merge::apply(self.state.clone(), &self.story, &input, &result);
        let reconciled = self.recovery.ensure_consistency(candidate, &self.story)?;

        match &reconciled.outcome {
            Outcome::Committed => info!(
                session = %self.id,
                kind = %kind,
                scene = %reconciled.state.current_scene,
                "Turn committed"
            ),
            Outcome::RolledBack(report) => warn!(
                session = %self.id,
                kind = %kind,
                violations = report.len(),
                "Turn rolled back"
            ),
        }

        self.state = reconciled.state;
        Ok(TurnOutcome {
            result,
            outcome: reconciled.outcome,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &NarrativeState {
        &self.state
    }

    pub fn story(&self) -> &StoryGraph {
        &self.story
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    /// The first successor scene whose required clues are all discovered,
    /// or the current scene if none is unlocked.
    pub fn unlocked_scene(&self) -> &str {
        self.story
            .next_unlocked_scene(&self.state.current_scene, &self.state.discovered_clues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Hint;
    use crate::state::MessageTag;
    use crate::testing::{sample_story, MockGenerator};

    fn session(generator: &MockGenerator) -> GameSession {
        GameSession::new(
            Arc::new(sample_story()),
            generator.clone(),
            SessionConfig::new("Ada"),
        )
        .unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new("Ada")
            .with_opening_scene("library")
            .with_hint_difficulty("hard")
            .with_excerpt_chars(50);

        assert_eq!(config.player_name, "Ada");
        assert_eq!(config.opening_scene, "library");
        assert_eq!(config.hint_difficulty, "hard");
        assert_eq!(config.excerpt_chars, 50);
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("ADVENTURE_PLAYER_NAME", "Marple");
        std::env::set_var("ADVENTURE_OPENING_SCENE", "library");
        std::env::set_var("ADVENTURE_HINT_DIFFICULTY", "easy");
        let config = SessionConfig::from_env();

        std::env::remove_var("ADVENTURE_PLAYER_NAME");
        std::env::remove_var("ADVENTURE_OPENING_SCENE");
        std::env::remove_var("ADVENTURE_HINT_DIFFICULTY");
        let defaults = SessionConfig::from_env();

        assert_eq!(config.player_name, "Marple");
        assert_eq!(config.opening_scene, "library");
        assert_eq!(config.hint_difficulty, "easy");
        assert_eq!(config.excerpt_chars, EXCERPT_CHARS);
        assert_eq!(defaults.player_name, "Detective");
        assert_eq!(defaults.opening_scene, "opening");
        assert_eq!(defaults.hint_difficulty, "normal");
    }

    #[test]
    fn test_invalid_opening_scene_is_rejected() {
        let result = GameSession::new(
            Arc::new(sample_story()),
            MockGenerator::new(),
            SessionConfig::new("Ada").with_opening_scene("vault"),
        );

        assert!(matches!(result, Err(SessionError::Recovery(_))));
    }

    #[test]
    fn test_expected_kinds() {
        assert_eq!(
            PlayerInput::action("look", "").expected_kind(),
            ResultKind::SceneTransition
        );
        assert_eq!(
            PlayerInput::talk("eleanor", None).expected_kind(),
            ResultKind::Dialogue
        );
        assert_eq!(PlayerInput::Analyze.expected_kind(), ResultKind::Analysis);
    }

    #[tokio::test]
    async fn test_hint_uses_configured_difficulty() {
        let generator = MockGenerator::new().with_response(r#"{"hint": "Look at the desk."}"#);
        let mut session = session(&generator);

        let outcome = session.request_hint(None).await.unwrap();

        assert!(outcome.is_committed());
        assert_eq!(
            generator.inputs(),
            vec![PlayerInput::Hint {
                difficulty: "normal".to_string()
            }]
        );
        let CandidateResult::Hint(Hint { text, .. }) = outcome.result else {
            panic!("expected a hint");
        };
        assert_eq!(text, "Look at the desk.");
        let last = session.state().last_message().unwrap();
        assert_eq!(last.content, "HINT: Look at the desk.");
        assert!(last.is_tagged(MessageTag::Hint));
    }

    #[tokio::test]
    async fn test_talk_to_unknown_character() {
        let generator = MockGenerator::new();
        let mut session = session(&generator);

        let err = session.talk_to("The Gardener", None).await.unwrap_err();

        assert!(matches!(err, SessionError::UnknownCharacter(ref name) if name == "The Gardener"));
        assert!(generator.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_needs_clues() {
        let generator = MockGenerator::new();
        let mut session = session(&generator);

        let err = session.analyze_clues().await.unwrap_err();
        assert!(matches!(err, SessionError::NothingToAnalyze));
    }

    #[tokio::test]
    async fn test_generator_failure_leaves_state() {
        let generator = MockGenerator::new();
        let mut session = session(&generator);
        let before = session.state().clone();

        let err = session.player_action("look", "around").await.unwrap_err();

        assert!(matches!(err, SessionError::Generate(_)));
        assert_eq!(session.state(), &before);
    }

    #[tokio::test]
    async fn test_recovery_error_keeps_current_state() {
        let generator = MockGenerator::new()
            .with_response(r#"{"next_scene": "vault", "description": "A door you never saw."}"#);
        let mut session = session(&generator);
        session.recovery = RecoveryManager::new();
        let before = session.state().clone();

        let err = session.player_action("open", "door").await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Recovery(RecoveryError::NoPriorSnapshot { .. })
        ));
        assert_eq!(session.state(), &before);
    }

    #[tokio::test]
    async fn test_unlocked_scene_follows_clues() {
        let generator = MockGenerator::new().with_response(
            r#"{"description": "A dark stain mars the rug.", "new_clues": ["Ink Stain"]}"#,
        );
        let mut session = session(&generator);
        assert_eq!(session.unlocked_scene(), "opening");

        session.player_action("examine", "rug").await.unwrap();

        assert_eq!(session.unlocked_scene(), "library");
    }
}
