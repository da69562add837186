use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("microphone access denied: {0}")]
    MediaPermissionDenied(String),
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("signaling relay unreachable: {0}")]
    TransportUnavailable(String),
    #[error("peer left the call")]
    PeerDeparted,
    #[error("connection lost")]
    ConnectivityLost,
    #[error("local media must be attached before negotiation starts")]
    PrecursorMissing,
    #[error("no remote peer to address")]
    NoPeerAddressed,
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("a call is already in progress")]
    CallInProgress,
    #[error("call attempt cancelled")]
    Cancelled,
}
