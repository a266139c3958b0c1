//! Snapdraw Replay
//!
//! Loads a recorded scenario, replays its input steps against an in-memory
//! map host and reports the emitted notifications.

mod error;
mod player;
mod scenario;

pub use error::{ReplayError, ReplayResult};
pub use player::Player;
pub use scenario::{PointerStep, Scenario, Step};
