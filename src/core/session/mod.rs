//! Per-call session: the single-writer state machine at the center of the
//! relay.
//!
//! Each call runs as one [`Session`] task fed by exactly one event channel.
//! The two link reader tasks (telephony and AI) and the tool dispatcher are
//! the only producers; all session state is mutated inside the session task,
//! so there is no locking and no shared mutable state across sessions.

mod interrupt;
mod relay;
#[allow(clippy::module_inception)]
mod session;
mod state;
mod supervisor;

pub use interrupt::InterruptionController;
pub use relay::AudioRelay;
pub use session::{
    Session, SessionEvent, SessionOptions, SessionSummary, TranscriptRole, TranscriptTurn,
};
pub use state::SessionState;
pub use supervisor::SessionSupervisor;
