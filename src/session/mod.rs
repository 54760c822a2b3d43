//! Viewer session bookkeeping

pub mod context;
pub mod state;

pub use context::SessionContext;
pub use state::{SessionPhase, SessionState};
