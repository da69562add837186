use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::CallConfig;
use crate::signaling::{ParticipantId, RoomToken};

/// Call role, decided once at call start and immutable thereafter.
/// The initiator originates the offer; the responder answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Owns room-join semantics and the single remote participant.
#[derive(Debug)]
pub struct RoomCoordinator {
    token: RoomToken,
    role: Role,
    remote: Option<ParticipantId>,
}

impl RoomCoordinator {
    /// Generate a fresh room token and take the initiator role.
    pub fn create(config: &CallConfig) -> Self {
        Self {
            token: generate_token(config.token_len),
            role: Role::Initiator,
            remote: None,
        }
    }

    /// Join an existing room as responder. An absent or empty token
    /// resolves to the well-known default room.
    pub fn join(config: &CallConfig, token: Option<&str>) -> Self {
        let token = match token {
            Some(t) if !t.trim().is_empty() => RoomToken::new(t.trim()),
            _ => RoomToken::new(config.default_room.clone()),
        };
        Self {
            token,
            role: Role::Responder,
            remote: None,
        }
    }

    pub fn token(&self) -> &RoomToken {
        &self.token
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn remote(&self) -> Option<&ParticipantId> {
        self.remote.as_ref()
    }

    /// Record a remote arrival. Returns false for a duplicate or extra
    /// join; the protocol supports exactly one remote peer per room, so
    /// excess participants are not negotiated with.
    pub fn observe_peer_joined(&mut self, id: ParticipantId) -> bool {
        match &self.remote {
            Some(existing) => {
                tracing::info!("ignoring extra peer join: {id} (already paired with {existing})");
                false
            }
            None => {
                tracing::info!("peer joined: {id}");
                self.remote = Some(id);
                true
            }
        }
    }

    /// Record the remote's departure, returning who left.
    pub fn observe_peer_left(&mut self) -> Option<ParticipantId> {
        self.remote.take()
    }
}

fn generate_token(len: usize) -> RoomToken {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    RoomToken::new(token)
}
