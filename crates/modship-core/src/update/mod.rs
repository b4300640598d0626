//! Single-module update orchestration.

mod context;
mod machine;
mod message;
mod state;

pub use context::{AttemptId, StateTransition, UpdateContext, UpdateRequest};
pub use machine::{OutcomeKind, UpdateOutcome, UpdateSettings, UpdateStateMachine, UpdateStatus};
pub use message::commit_message;
pub use state::UpdateState;
