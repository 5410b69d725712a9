use async_trait::async_trait;
use std::sync::RwLock;

/// Public id of the internal participant that joins a session to record it.
pub const RECORDER_PARTICIPANT_PUBLIC_ID: &str = "RECORDER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub public_id: String,
    /// Id of the stream this participant publishes, if it publishes one.
    pub stream_id: Option<String>,
}

impl Participant {
    pub fn subscriber(public_id: &str) -> Self {
        Participant {
            public_id: public_id.to_string(),
            stream_id: None,
        }
    }

    pub fn publisher(public_id: &str, stream_id: &str) -> Self {
        Participant {
            public_id: public_id.to_string(),
            stream_id: Some(stream_id.to_string()),
        }
    }

    pub fn is_publishing(&self) -> bool {
        self.stream_id.is_some()
    }

    pub fn is_recorder(&self) -> bool {
        self.public_id == RECORDER_PARTICIPANT_PUBLIC_ID
    }
}

/// Read access to a live session, owned by the session-management subsystem.
pub trait SessionHandle: Send + Sync {
    fn session_id(&self) -> &str;

    /// Human readable short id used as the preferred recording id.
    fn short_session_id(&self) -> &str;

    fn participants(&self) -> Vec<Participant>;

    fn active_publishers(&self) -> usize {
        self.participants()
            .iter()
            .filter(|p| p.is_publishing())
            .count()
    }

    /// `true` when nobody but the recorder participant is connected.
    fn is_abandoned(&self) -> bool {
        let participants = self.participants();
        match participants.as_slice() {
            [] => true,
            [only] => only.is_recorder(),
            _ => false,
        }
    }
}

/// Session-management operations the recording orchestrator may trigger.
#[async_trait]
pub trait SessionLifecycle: Send + Sync {
    /// Closes the session and releases the session subsystem's bookkeeping for it.
    async fn close_session(&self, session_id: &str, reason: &str);
}

/// Simple in-memory session, enough for callers that track participants themselves.
pub struct Session {
    id: String,
    short_id: String,
    participants: RwLock<Vec<Participant>>,
}

impl Session {
    pub fn new(id: &str, short_id: &str) -> Self {
        Session {
            id: id.to_string(),
            short_id: short_id.to_string(),
            participants: RwLock::new(Vec::new()),
        }
    }

    pub fn join(&self, participant: Participant) {
        if let Ok(mut participants) = self.participants.write() {
            participants.retain(|p| p.public_id != participant.public_id);
            participants.push(participant);
        }
    }

    pub fn leave(&self, public_id: &str) {
        if let Ok(mut participants) = self.participants.write() {
            participants.retain(|p| p.public_id != public_id);
        }
    }
}

impl SessionHandle for Session {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn short_session_id(&self) -> &str {
        &self.short_id
    }

    fn participants(&self) -> Vec<Participant> {
        self.participants
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishers_are_counted() {
        let session = Session::new("ses_abc", "abc");
        assert_eq!(session.active_publishers(), 0);
        session.join(Participant::subscriber("viewer"));
        session.join(Participant::publisher("alice", "str_alice"));
        assert_eq!(session.active_publishers(), 1);
        session.leave("alice");
        assert_eq!(session.active_publishers(), 0);
    }

    #[test]
    fn rejoin_replaces_participant() {
        let session = Session::new("ses_abc", "abc");
        session.join(Participant::subscriber("alice"));
        session.join(Participant::publisher("alice", "str_alice"));
        assert_eq!(session.participants().len(), 1);
        assert_eq!(session.active_publishers(), 1);
    }

    #[test]
    fn session_with_only_recorder_is_abandoned() {
        let session = Session::new("ses_abc", "abc");
        assert!(session.is_abandoned());
        session.join(Participant::subscriber(RECORDER_PARTICIPANT_PUBLIC_ID));
        assert!(session.is_abandoned());
        session.join(Participant::subscriber("viewer"));
        assert!(!session.is_abandoned());
        session.leave(RECORDER_PARTICIPANT_PUBLIC_ID);
        assert!(!session.is_abandoned());
    }
}
