//! The orchestrator runtime: per-turn state, the bounded agent loop, and
//! the per-session concurrency primitives.

pub mod cancel;
pub mod hydrate;
pub mod session_lock;
pub mod state;
pub mod turn;

pub use state::{TurnEvent, TurnState};
pub use turn::{run_turn, TurnInput};
