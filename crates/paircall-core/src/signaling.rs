use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::CallError;

/// Relay-assigned session identifier for a room participant.
///
/// Ephemeral: assigned on connect, invalid after disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque rendezvous key for a room on the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomToken(String);

impl RoomToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// SDP-equivalent description produced by the negotiation primitive.
/// The core passes the body through uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Wire payload exchanged between the two peers through the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    Offer { description: SessionDescription },
    Answer { description: SessionDescription },
    IceCandidate { candidate: IceCandidate },
}

/// Inbound events delivered by the relay client.
#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    UserJoined(ParticipantId),
    UserLeft,
    Signal {
        sender: ParticipantId,
        message: SignalingMessage,
    },
}

/// Connected relay client consumed by the core.
///
/// Implementations deliver inbound [`TransportEvent`]s on the sender
/// passed to [`TransportConnector::connect`] and must close that
/// channel when dropped or disconnected; the call event loop ends when
/// the stream does.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn join_room(&mut self, room: &RoomToken) -> Result<(), CallError>;

    async fn send(
        &mut self,
        target: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), CallError>;

    /// Tear down the relay connection. Must tolerate repeat calls.
    async fn disconnect(&mut self);
}

/// Dials the relay and hands back a connected transport.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn SignalingTransport>, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_message_wire_shape() {
        let msg = SignalingMessage::Offer {
            description: SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0...".to_string(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["description"]["kind"], "offer");
    }

    #[test]
    fn candidate_round_trips_optional_fields() {
        let msg = SignalingMessage::IceCandidate {
            candidate: IceCandidate {
                candidate: "candidate:0 1 UDP 2122252543 192.0.2.1 54321 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: None,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: SignalingMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn participant_id_is_transparent_in_json() {
        let id = ParticipantId::new("peer-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"peer-1\"");
    }
}
