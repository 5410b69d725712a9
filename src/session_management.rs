//! Session collaborator contract.
//!
//! Sessions, participants and tokens are owned by a separate subsystem. This
//! module only describes what the recording orchestrator reads from a session
//! and what it may ask that subsystem to do.

/// Submodule for the session traits and the in-memory session.
pub mod session;

pub use session::{
    Participant, Session, SessionHandle, SessionLifecycle, RECORDER_PARTICIPANT_PUBLIC_ID,
};
