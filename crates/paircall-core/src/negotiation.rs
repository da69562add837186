use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::CallError;
use crate::media::{LocalMediaHandle, RemoteMediaHandle};
use crate::room::Role;
use crate::signaling::{IceCandidate, SdpKind, SessionDescription, SignalingMessage};

/// Connectivity of the negotiated media path as reported by the
/// underlying primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectivityState {
    /// Terminal states end the session; there is no automatic
    /// reconnection, the user must restart the call.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// Events produced by the negotiation primitive.
#[derive(Debug)]
pub enum PeerEvent {
    /// A locally discovered ICE candidate, ready to publish.
    LocalCandidate(IceCandidate),
    /// First (or subsequent) inbound media from the remote peer.
    RemoteTrack(RemoteMediaHandle),
    ConnectivityChanged(ConnectivityState),
}

/// Negotiation primitive driving one peer-to-peer media path
/// (the platform's RTCPeerConnection equivalent).
///
/// `create_offer` and `create_answer` also set the produced
/// description as the local one. Implementations deliver
/// [`PeerEvent`]s on the sender passed to
/// [`PeerConnectorFactory::create`] and must close that channel when
/// dropped or closed.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn attach_local_audio(&mut self, media: &LocalMediaHandle) -> Result<(), CallError>;

    async fn create_offer(&mut self) -> Result<SessionDescription, CallError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, CallError>;

    async fn set_remote_description(&mut self, desc: &SessionDescription)
        -> Result<(), CallError>;

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), CallError>;

    /// Release the underlying negotiation resources. Must tolerate
    /// repeat calls.
    async fn close(&mut self);
}

/// Builds one connector per call attempt.
#[async_trait]
pub trait PeerConnectorFactory: Send + Sync {
    async fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerConnector>, CallError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationState {
    Idle,
    OfferSent,
    AnswerSent,
    AnswerReceived,
    Connected,
    Terminated,
}

impl NegotiationState {
    fn exchange_complete(&self) -> bool {
        matches!(self, Self::AnswerSent | Self::AnswerReceived | Self::Connected)
    }
}

/// Drives exactly one offer/answer exchange with one remote peer.
///
/// Handlers return the outbound [`SignalingMessage`] to publish, if
/// any; the session never holds the transport itself. Out-of-order or
/// duplicate messages are logged and dropped, never fatal, to tolerate
/// relay-level duplicate delivery. `Terminated` is absorbing.
pub struct NegotiationSession {
    connector: Box<dyn PeerConnector>,
    role: Role,
    state: NegotiationState,
    media_attached: bool,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    remote_track_seen: bool,
}

impl NegotiationSession {
    pub fn new(connector: Box<dyn PeerConnector>, role: Role) -> Self {
        Self {
            connector,
            role,
            state: NegotiationState::Idle,
            media_attached: false,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            remote_track_seen: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == NegotiationState::Connected
    }

    pub fn is_terminated(&self) -> bool {
        self.state == NegotiationState::Terminated
    }

    /// Bind outgoing audio. Must precede any description generation.
    pub async fn attach_local_media(&mut self, media: &LocalMediaHandle) -> Result<(), CallError> {
        if self.state != NegotiationState::Idle {
            return Err(CallError::PrecursorMissing);
        }
        self.connector.attach_local_audio(media).await?;
        self.media_attached = true;
        Ok(())
    }

    /// Produce and publish the local offer. Initiator only, at most
    /// once per session; duplicate triggers are dropped.
    pub async fn create_offer(&mut self) -> Result<Option<SignalingMessage>, CallError> {
        if self.state == NegotiationState::Terminated {
            return Ok(None);
        }
        if self.role != Role::Initiator {
            tracing::warn!("responder asked to create an offer, dropping");
            return Ok(None);
        }
        if self.state != NegotiationState::Idle {
            tracing::warn!("duplicate offer trigger in {:?}, dropping", self.state);
            return Ok(None);
        }
        if !self.media_attached {
            return Err(CallError::PrecursorMissing);
        }
        let description = self.connector.create_offer().await?;
        self.state = NegotiationState::OfferSent;
        Ok(Some(SignalingMessage::Offer { description }))
    }

    /// Apply a remote offer and produce the answer to publish.
    pub async fn handle_remote_offer(
        &mut self,
        description: SessionDescription,
    ) -> Result<Option<SignalingMessage>, CallError> {
        if self.state == NegotiationState::Terminated {
            return Ok(None);
        }
        if description.kind != SdpKind::Offer {
            tracing::warn!("offer message carried {:?} description, dropping", description.kind);
            return Ok(None);
        }
        if self.state != NegotiationState::Idle {
            // Second offer after our answer: relay duplicate, not fatal.
            tracing::warn!("protocol violation: offer in {:?}, dropping", self.state);
            return Ok(None);
        }
        if !self.media_attached {
            return Err(CallError::PrecursorMissing);
        }
        self.connector.set_remote_description(&description).await?;
        self.remote_description_set = true;
        self.flush_pending_candidates().await;
        let answer = self.connector.create_answer().await?;
        self.state = NegotiationState::AnswerSent;
        Ok(Some(SignalingMessage::Answer { description: answer }))
    }

    /// Apply the remote answer to our pending offer. Returns true when
    /// the session just reached `Connected` (a remote track had
    /// already arrived).
    pub async fn handle_remote_answer(
        &mut self,
        description: SessionDescription,
    ) -> Result<bool, CallError> {
        if self.state == NegotiationState::Terminated {
            return Ok(false);
        }
        if self.state != NegotiationState::OfferSent {
            tracing::warn!("protocol violation: answer in {:?}, dropping", self.state);
            return Ok(false);
        }
        self.connector.set_remote_description(&description).await?;
        self.remote_description_set = true;
        self.flush_pending_candidates().await;
        self.state = NegotiationState::AnswerReceived;
        Ok(self.try_connect())
    }

    /// Queue or apply a remote ICE candidate. Candidates arriving
    /// before the remote description are held and applied after it is
    /// set; a candidate that fails to apply is logged and skipped.
    pub async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.state == NegotiationState::Terminated {
            return;
        }
        if !self.remote_description_set {
            tracing::debug!("queueing early remote candidate");
            self.pending_candidates.push(candidate);
            return;
        }
        if let Err(e) = self.connector.add_ice_candidate(&candidate).await {
            tracing::warn!("remote candidate failed to apply: {e}");
        }
    }

    /// Note first inbound remote media. Returns true when this
    /// completes the handshake and the session is now `Connected`.
    pub fn observe_remote_track(&mut self) -> bool {
        if self.state == NegotiationState::Terminated {
            return false;
        }
        if self.remote_track_seen {
            tracing::debug!("additional remote track ignored");
            return false;
        }
        self.remote_track_seen = true;
        self.try_connect()
    }

    /// Returns true when the reported state is terminal for the
    /// session. Monitoring only; the caller tears the call down.
    pub fn observe_connectivity(&mut self, state: ConnectivityState) -> bool {
        if self.state == NegotiationState::Terminated {
            return false;
        }
        tracing::debug!("connectivity changed: {state:?}");
        state.is_terminal()
    }

    /// Enter the absorbing terminated state and release the
    /// negotiation primitive. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Terminated {
            return;
        }
        self.state = NegotiationState::Terminated;
        self.pending_candidates.clear();
        self.connector.close().await;
    }

    fn try_connect(&mut self) -> bool {
        if self.remote_track_seen && self.state.exchange_complete() {
            self.state = NegotiationState::Connected;
            true
        } else {
            false
        }
    }

    async fn flush_pending_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = self.connector.add_ice_candidate(&candidate).await {
                tracing::warn!("buffered candidate failed to apply: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::media::AudioTrack;

    #[derive(Default)]
    struct StubTrack;

    impl AudioTrack for StubTrack {
        fn stop(&self) {}
        fn set_enabled(&self, _enabled: bool) {}
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Attach,
        Offer,
        Answer,
        SetRemote(SdpKind),
        Candidate(String),
        Close,
    }

    #[derive(Default)]
    struct ScriptedConnector {
        ops: Arc<Mutex<Vec<Op>>>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PeerConnector for ScriptedConnector {
        async fn attach_local_audio(&mut self, _media: &LocalMediaHandle) -> Result<(), CallError> {
            self.ops.lock().unwrap().push(Op::Attach);
            Ok(())
        }

        async fn create_offer(&mut self) -> Result<SessionDescription, CallError> {
            self.ops.lock().unwrap().push(Op::Offer);
            Ok(SessionDescription { kind: SdpKind::Offer, sdp: "local-offer".into() })
        }

        async fn create_answer(&mut self) -> Result<SessionDescription, CallError> {
            self.ops.lock().unwrap().push(Op::Answer);
            Ok(SessionDescription { kind: SdpKind::Answer, sdp: "local-answer".into() })
        }

        async fn set_remote_description(
            &mut self,
            desc: &SessionDescription,
        ) -> Result<(), CallError> {
            self.ops.lock().unwrap().push(Op::SetRemote(desc.kind));
            Ok(())
        }

        async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), CallError> {
            self.ops.lock().unwrap().push(Op::Candidate(candidate.candidate.clone()));
            Ok(())
        }

        async fn close(&mut self) {
            self.ops.lock().unwrap().push(Op::Close);
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn media() -> LocalMediaHandle {
        LocalMediaHandle::new(Arc::new(StubTrack))
    }

    fn offer() -> SessionDescription {
        SessionDescription { kind: SdpKind::Offer, sdp: "remote-offer".into() }
    }

    fn answer() -> SessionDescription {
        SessionDescription { kind: SdpKind::Answer, sdp: "remote-answer".into() }
    }

    fn candidate(s: &str) -> IceCandidate {
        IceCandidate { candidate: s.into(), sdp_mid: None, sdp_mline_index: None }
    }

    fn session(role: Role) -> (NegotiationSession, Arc<Mutex<Vec<Op>>>, Arc<AtomicUsize>) {
        let connector = ScriptedConnector::default();
        let ops = connector.ops.clone();
        let closes = connector.closes.clone();
        (NegotiationSession::new(Box::new(connector), role), ops, closes)
    }

    #[tokio::test]
    async fn initiator_emits_exactly_one_offer() {
        let (mut s, ops, _) = session(Role::Initiator);
        s.attach_local_media(&media()).await.unwrap();

        let first = s.create_offer().await.unwrap();
        assert!(matches!(first, Some(SignalingMessage::Offer { .. })));
        let second = s.create_offer().await.unwrap();
        assert!(second.is_none());

        let offers = ops.lock().unwrap().iter().filter(|o| **o == Op::Offer).count();
        assert_eq!(offers, 1);
    }

    #[tokio::test]
    async fn offer_without_media_is_rejected() {
        let (mut s, _, _) = session(Role::Initiator);
        assert!(matches!(s.create_offer().await, Err(CallError::PrecursorMissing)));
    }

    #[tokio::test]
    async fn attach_after_negotiation_started_is_rejected() {
        let (mut s, _, _) = session(Role::Initiator);
        s.attach_local_media(&media()).await.unwrap();
        s.create_offer().await.unwrap();
        assert!(matches!(
            s.attach_local_media(&media()).await,
            Err(CallError::PrecursorMissing)
        ));
    }

    #[tokio::test]
    async fn responder_answers_a_remote_offer_once() {
        let (mut s, _, _) = session(Role::Responder);
        s.attach_local_media(&media()).await.unwrap();

        let reply = s.handle_remote_offer(offer()).await.unwrap();
        assert!(matches!(reply, Some(SignalingMessage::Answer { .. })));

        // duplicate delivery of the same offer is dropped
        let reply = s.handle_remote_offer(offer()).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn answer_without_pending_offer_is_ignored() {
        let (mut s, ops, _) = session(Role::Initiator);
        s.attach_local_media(&media()).await.unwrap();
        let connected = s.handle_remote_answer(answer()).await.unwrap();
        assert!(!connected);
        assert!(!ops.lock().unwrap().contains(&Op::SetRemote(SdpKind::Answer)));
    }

    #[tokio::test]
    async fn early_candidates_are_buffered_then_applied() {
        let (mut s, ops, _) = session(Role::Responder);
        s.attach_local_media(&media()).await.unwrap();

        s.handle_remote_candidate(candidate("c1")).await;
        s.handle_remote_candidate(candidate("c2")).await;
        assert!(!ops.lock().unwrap().iter().any(|o| matches!(o, Op::Candidate(_))));

        s.handle_remote_offer(offer()).await.unwrap();

        let ops = ops.lock().unwrap();
        let remote_at = ops.iter().position(|o| *o == Op::SetRemote(SdpKind::Offer)).unwrap();
        let c1_at = ops.iter().position(|o| *o == Op::Candidate("c1".into())).unwrap();
        let c2_at = ops.iter().position(|o| *o == Op::Candidate("c2".into())).unwrap();
        assert!(remote_at < c1_at && c1_at < c2_at);
    }

    #[tokio::test]
    async fn connected_needs_exchange_and_remote_track() {
        let (mut s, _, _) = session(Role::Initiator);
        s.attach_local_media(&media()).await.unwrap();
        s.create_offer().await.unwrap();

        // track before answer does not connect yet
        assert!(!s.observe_remote_track());
        // answer completes the exchange and finishes the handshake
        assert!(s.handle_remote_answer(answer()).await.unwrap());
        assert!(s.is_connected());
    }

    #[tokio::test]
    async fn track_after_exchange_connects() {
        let (mut s, _, _) = session(Role::Responder);
        s.attach_local_media(&media()).await.unwrap();
        s.handle_remote_offer(offer()).await.unwrap();
        assert!(s.observe_remote_track());
        assert!(!s.observe_remote_track());
        assert!(s.is_connected());
    }

    #[tokio::test]
    async fn terminated_absorbs_everything() {
        let (mut s, _, closes) = session(Role::Initiator);
        s.attach_local_media(&media()).await.unwrap();
        s.close().await;
        s.close().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        assert!(s.create_offer().await.unwrap().is_none());
        assert!(s.handle_remote_offer(offer()).await.unwrap().is_none());
        assert!(!s.handle_remote_answer(answer()).await.unwrap());
        s.handle_remote_candidate(candidate("late")).await;
        assert!(!s.observe_remote_track());
        assert!(s.is_terminated());
    }

    #[test]
    fn terminal_connectivity_states() {
        assert!(ConnectivityState::Failed.is_terminal());
        assert!(ConnectivityState::Disconnected.is_terminal());
        assert!(ConnectivityState::Closed.is_terminal());
        assert!(!ConnectivityState::Checking.is_terminal());
        assert!(!ConnectivityState::Connected.is_terminal());
    }
}
