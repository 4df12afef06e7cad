//! Structure recovery and consistency core for model-driven mystery adventures.
//!
//! This crate provides:
//! - Lenient recovery of JSON from noisy model output
//! - Coercion into typed turn results
//! - Validation of the narrative state against the story graph
//! - Per-session rollback to the last consistent state
//! - Save/load of sessions
//!
//! # Quick Start
//!
//! ```ignore
//! use adventure_core::{GameSession, SessionConfig, StoryGraph};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let story: StoryGraph = adventure_core::parser::parse_as(&generated_story_text)?;
//!     let config = SessionConfig::new("Ada");
//!
//!     let mut session = GameSession::new(Arc::new(story), my_generator, config)?;
//!
//!     let turn = session.player_action("examine", "the desk").await?;
//!     if !turn.is_committed() {
//!         println!("The story refused to go there.");
//!     }
//!
//!     session.save("inkwell.json", &adventure_core::clock::SystemClock).await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod coerce;
pub mod merge;
pub mod parser;
pub mod persist;
pub mod recovery;
pub mod session;
pub mod state;
pub mod story;
pub mod testing;
pub mod validate;

// Primary public API
pub use coerce::{coerce, CandidateResult, CoercionFailure, ResultKind};
pub use parser::{LenientParser, ParseFailure, ParseStage};
pub use persist::{PersistError, SavedGame};
pub use recovery::{Outcome, Reconciled, RecoveryError, RecoveryManager};
pub use session::{
    GameSession, GenerateError, PlayerInput, SessionConfig, SessionError, TextGenerator,
    TurnOutcome, TurnRequest,
};
pub use state::{AvailableAction, Message, MessageKind, MessageTag, NarrativeState};
pub use story::StoryGraph;
pub use testing::MockGenerator;
pub use validate::{validate, ConsistencyCheck, ValidationReport, Validator, Violation};
