use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::config::CallConfig;
use crate::errors::CallError;
use crate::events::{CallEvent, CallEventListener, CallPhase, EventEmitter};
use crate::media::{LocalMediaHandle, MediaSource, RemoteMediaHandle};
use crate::negotiation::{NegotiationSession, PeerConnectorFactory, PeerEvent};
use crate::room::{Role, RoomCoordinator};
use crate::signaling::{
    ParticipantId, RoomToken, SignalingMessage, SignalingTransport, TransportConnector,
    TransportEvent,
};

/// Inputs to the call phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    RequestCreate,
    RequestJoin,
    MediaOk,
    MediaDenied,
    RoomReady,
    PeerJoined,
    RemoteTrackReceived,
    PeerLeft,
    ConnectivityLost,
    UserHangUp,
    /// Transport or negotiation failure outside the listed edges.
    Fault,
}

/// Single source of truth for the user-visible call phase.
///
/// Transitions not in the table are rejected no-ops; they indicate a
/// stale or misordered event and are logged, never crashed on.
#[derive(Debug)]
pub struct CallStateMachine {
    phase: CallPhase,
    path: Option<Role>,
}

impl CallStateMachine {
    pub fn new() -> Self {
        Self {
            phase: CallPhase::Idle,
            path: None,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    /// Apply a trigger. Returns the resulting phase, or `None` when
    /// the transition is not in the table.
    pub fn apply(&mut self, trigger: Trigger) -> Option<CallPhase> {
        use CallPhase::*;
        use Trigger::*;

        let next = match (self.phase, trigger) {
            (Idle, RequestCreate) => {
                self.path = Some(Role::Initiator);
                AcquiringMedia
            }
            (Idle, RequestJoin) => {
                self.path = Some(Role::Responder);
                AcquiringMedia
            }
            (AcquiringMedia, MediaOk) => match self.path {
                Some(Role::Initiator) => CreatingRoom,
                Some(Role::Responder) => Joining,
                None => return None,
            },
            (AcquiringMedia, MediaDenied) => Error,
            (CreatingRoom, RoomReady) => WaitingForPeer,
            (Joining, RoomReady) => Negotiating,
            (WaitingForPeer, PeerJoined) => Negotiating,
            (Negotiating, RemoteTrackReceived) => Connected,
            (_, PeerLeft | ConnectivityLost | UserHangUp) => Idle,
            (phase, Fault) if phase != Idle => Error,
            (phase, trigger) => {
                tracing::debug!("rejected call transition {trigger:?} in {phase:?}");
                return None;
            }
        };
        if next == Idle || next == Error {
            self.path = None;
        }
        tracing::debug!("call phase {:?} -> {next:?} on {trigger:?}", self.phase);
        self.phase = next;
        Some(next)
    }
}

impl Default for CallStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything owned by one call attempt. Exactly one exists at a time;
/// teardown takes it out of the manager and releases each resource.
struct ActiveCall {
    attempt: u64,
    transport: Box<dyn SignalingTransport>,
    coordinator: RoomCoordinator,
    local_media: Option<LocalMediaHandle>,
    remote_media: Option<RemoteMediaHandle>,
    session: Option<NegotiationSession>,
    peer_events: mpsc::UnboundedSender<PeerEvent>,
}

struct Inner {
    machine: CallStateMachine,
    active: Option<ActiveCall>,
    attempt: u64,
    last_message: Option<String>,
}

enum StartMode<'a> {
    Create,
    Join(Option<&'a str>),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Manages the lifecycle of a two-party call: room coordination, the
/// offer/answer/ICE exchange over the relay, and teardown.
pub struct CallManager {
    config: CallConfig,
    media: Arc<dyn MediaSource>,
    transports: Arc<dyn TransportConnector>,
    connectors: Arc<dyn PeerConnectorFactory>,
    emitter: EventEmitter,
    inner: Arc<Mutex<Inner>>,
}

impl CallManager {
    pub fn new(
        config: CallConfig,
        media: Arc<dyn MediaSource>,
        transports: Arc<dyn TransportConnector>,
        connectors: Arc<dyn PeerConnectorFactory>,
    ) -> Self {
        Self {
            config,
            media,
            transports,
            connectors,
            emitter: EventEmitter::new(),
            inner: Arc::new(Mutex::new(Inner {
                machine: CallStateMachine::new(),
                active: None,
                attempt: 0,
                last_message: None,
            })),
        }
    }

    /// Register a listener for call events.
    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.emitter.add_listener(listener);
    }

    /// Start a call as initiator in a freshly generated room.
    /// Returns the room token to share with the other party.
    pub async fn create_room(&self) -> Result<RoomToken, CallError> {
        self.start(StartMode::Create).await
    }

    /// Start a call as responder. An absent or empty token resolves
    /// to the well-known default room.
    pub async fn join_room(&self, token: Option<&str>) -> Result<RoomToken, CallError> {
        self.start(StartMode::Join(token)).await
    }

    /// Hard cancellation: tear the call down immediately from any
    /// phase, discarding whatever signaling is in flight. Safe to call
    /// when idle.
    pub async fn hang_up(&self) {
        let mut inner = self.inner.lock().await;
        tracing::info!("hang up requested in {:?}", inner.machine.phase());
        Self::teardown_locked(&mut inner).await;
        Self::apply_and_emit(&mut inner, &self.emitter, Trigger::UserHangUp);
    }

    /// Mute or unmute the local microphone. No-op when no local media
    /// is held.
    pub async fn set_microphone_enabled(&self, enabled: bool) {
        let inner = self.inner.lock().await;
        let Some(call) = inner.active.as_ref() else {
            return;
        };
        let Some(media) = call.local_media.as_ref() else {
            return;
        };
        media.set_enabled(enabled);
        self.emitter.emit(CallEvent::MicrophoneMuted(!enabled));
    }

    /// Current user-visible call phase.
    pub async fn phase(&self) -> CallPhase {
        self.inner.lock().await.machine.phase()
    }

    /// Token of the room this call lives in (for sharing).
    pub async fn room_token(&self) -> Option<RoomToken> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|c| c.coordinator.token().clone())
    }

    /// Identifier of the paired remote participant, if one has joined.
    pub async fn remote_participant(&self) -> Option<ParticipantId> {
        let inner = self.inner.lock().await;
        inner
            .active
            .as_ref()
            .and_then(|c| c.coordinator.remote().cloned())
    }

    /// Last user-facing status or error message.
    pub async fn last_message(&self) -> Option<String> {
        self.inner.lock().await.last_message.clone()
    }

    async fn start(&self, mode: StartMode<'_>) -> Result<RoomToken, CallError> {
        let attempt;
        {
            let mut inner = self.inner.lock().await;
            if inner.machine.phase() != CallPhase::Idle || inner.active.is_some() {
                return Err(CallError::CallInProgress);
            }
            let trigger = match mode {
                StartMode::Create => Trigger::RequestCreate,
                StartMode::Join(_) => Trigger::RequestJoin,
            };
            inner.attempt += 1;
            attempt = inner.attempt;
            inner.last_message = None;
            Self::apply_and_emit(&mut inner, &self.emitter, trigger);
        }

        // async boundary: media acquisition happens before any
        // transport contact, so a denial never opens a connection
        let local_media = match self.media.request_audio_input().await {
            Ok(media) => media,
            Err(e) => {
                self.fail_start(attempt, Trigger::MediaDenied, &e).await;
                return Err(e);
            }
        };

        {
            let mut inner = self.inner.lock().await;
            if inner.attempt != attempt || inner.machine.phase() != CallPhase::AcquiringMedia {
                // hang-up raced the media grant; the handle drop
                // releases the track
                return Err(CallError::Cancelled);
            }
            Self::apply_and_emit(&mut inner, &self.emitter, Trigger::MediaOk);
        }

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let mut transport = match self
            .transports
            .connect(&self.config.endpoint, transport_tx)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                self.fail_start(attempt, Trigger::Fault, &e).await;
                return Err(e);
            }
        };

        let coordinator = match mode {
            StartMode::Create => RoomCoordinator::create(&self.config),
            StartMode::Join(token) => RoomCoordinator::join(&self.config, token),
        };
        let token = coordinator.token().clone();
        tracing::info!("joining room {token} as {:?}", coordinator.role());

        if let Err(e) = transport.join_room(&token).await {
            transport.disconnect().await;
            self.fail_start(attempt, Trigger::Fault, &e).await;
            return Err(e);
        }

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.inner.lock().await;
            let expected = matches!(
                inner.machine.phase(),
                CallPhase::CreatingRoom | CallPhase::Joining
            );
            if inner.attempt != attempt || inner.active.is_some() || !expected {
                transport.disconnect().await;
                return Err(CallError::Cancelled);
            }
            inner.active = Some(ActiveCall {
                attempt,
                transport,
                coordinator,
                local_media: Some(local_media),
                remote_media: None,
                session: None,
                peer_events: peer_tx,
            });
            Self::apply_and_emit(&mut inner, &self.emitter, Trigger::RoomReady);
            self.emitter.emit(CallEvent::RoomReady(token.clone()));
        }

        let inner = self.inner.clone();
        let emitter = self.emitter.clone();
        let connectors = self.connectors.clone();
        tokio::spawn(async move {
            Self::event_loop(inner, emitter, connectors, attempt, transport_rx, peer_rx).await;
        });

        Ok(token)
    }

    /// Fail a start still in flight: cleanup, record the message, and
    /// enter the error phase. No-op when a newer attempt exists.
    async fn fail_start(&self, attempt: u64, trigger: Trigger, error: &CallError) {
        let mut inner = self.inner.lock().await;
        if inner.attempt != attempt {
            return;
        }
        tracing::warn!("call setup failed: {error}");
        Self::teardown_locked(&mut inner).await;
        inner.last_message = Some(error.to_string());
        self.emitter.emit(CallEvent::StatusMessage(error.to_string()));
        Self::apply_and_emit(&mut inner, &self.emitter, trigger);
    }

    fn apply_and_emit(inner: &mut Inner, emitter: &EventEmitter, trigger: Trigger) -> bool {
        let before = inner.machine.phase();
        match inner.machine.apply(trigger) {
            Some(next) => {
                if next != before {
                    emitter.emit(CallEvent::PhaseChanged(next));
                }
                true
            }
            None => false,
        }
    }

    /// Release every resource of the current call attempt. Idempotent:
    /// a second invocation finds nothing to release.
    async fn teardown_locked(inner: &mut Inner) {
        let Some(mut call) = inner.active.take() else {
            return;
        };
        tracing::info!("tearing down call attempt {}", call.attempt);
        if let Some(mut session) = call.session.take() {
            session.close().await;
        }
        if let Some(mut media) = call.local_media.take() {
            media.release();
        }
        if let Some(mut remote) = call.remote_media.take() {
            remote.release();
        }
        call.transport.disconnect().await;
        // dropping the call drops the transport and the peer event
        // sender, which closes both streams and ends the event loop
    }

    async fn end_call(
        inner: &mut Inner,
        emitter: &EventEmitter,
        trigger: Trigger,
        message: Option<&str>,
    ) {
        Self::teardown_locked(inner).await;
        if let Some(msg) = message {
            inner.last_message = Some(msg.to_string());
            emitter.emit(CallEvent::StatusMessage(msg.to_string()));
        }
        Self::apply_and_emit(inner, emitter, trigger);
    }

    async fn fault(inner: &mut Inner, emitter: &EventEmitter, error: &CallError) {
        tracing::warn!("call failed: {error}");
        Self::end_call(inner, emitter, Trigger::Fault, Some(&error.to_string())).await;
    }

    /// Per-attempt event loop merging relay and negotiation events.
    /// Each event runs to completion under the manager lock before the
    /// next is taken.
    async fn event_loop(
        inner: Arc<Mutex<Inner>>,
        emitter: EventEmitter,
        connectors: Arc<dyn PeerConnectorFactory>,
        attempt: u64,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        mut peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        loop {
            let flow = tokio::select! {
                ev = transport_rx.recv() => match ev {
                    Some(ev) => {
                        Self::on_transport_event(&inner, &emitter, &connectors, attempt, ev).await
                    }
                    None => Self::on_transport_closed(&inner, &emitter, attempt).await,
                },
                ev = peer_rx.recv() => match ev {
                    Some(ev) => Self::on_peer_event(&inner, &emitter, attempt, ev).await,
                    None => Flow::Stop,
                },
            };
            if flow == Flow::Stop {
                break;
            }
        }
        tracing::debug!("call event loop ended (attempt {attempt})");
    }

    async fn on_transport_closed(
        inner: &Arc<Mutex<Inner>>,
        emitter: &EventEmitter,
        attempt: u64,
    ) -> Flow {
        let mut inner = inner.lock().await;
        if inner.attempt == attempt && inner.active.is_some() {
            tracing::warn!("signaling stream closed unexpectedly");
            Self::end_call(
                &mut inner,
                emitter,
                Trigger::Fault,
                Some("signaling relay unreachable"),
            )
            .await;
        }
        Flow::Stop
    }

    async fn on_transport_event(
        inner: &Arc<Mutex<Inner>>,
        emitter: &EventEmitter,
        connectors: &Arc<dyn PeerConnectorFactory>,
        attempt: u64,
        event: TransportEvent,
    ) -> Flow {
        let mut inner = inner.lock().await;
        if inner.attempt != attempt || inner.active.is_none() {
            // the call this loop served is gone
            return Flow::Stop;
        }
        match event {
            TransportEvent::Connected => {
                tracing::debug!("signaling transport confirmed connected");
                Flow::Continue
            }
            TransportEvent::UserJoined(id) => {
                match Self::on_user_joined(&mut inner, emitter, connectors, id).await {
                    Ok(()) => Flow::Continue,
                    Err(e) => {
                        Self::fault(&mut inner, emitter, &e).await;
                        Flow::Stop
                    }
                }
            }
            TransportEvent::UserLeft => Self::on_user_left(&mut inner, emitter).await,
            TransportEvent::Signal { sender, message } => {
                match Self::on_signal(&mut inner, emitter, connectors, sender, message).await {
                    Ok(()) => Flow::Continue,
                    Err(e) => {
                        Self::fault(&mut inner, emitter, &e).await;
                        Flow::Stop
                    }
                }
            }
        }
    }

    async fn on_user_joined(
        inner: &mut Inner,
        emitter: &EventEmitter,
        connectors: &Arc<dyn PeerConnectorFactory>,
        id: ParticipantId,
    ) -> Result<(), CallError> {
        let role;
        {
            let Some(call) = inner.active.as_mut() else {
                return Ok(());
            };
            if call.session.is_some() {
                // third party or stale duplicate join
                tracing::info!("peer join while a session is active, ignoring: {id}");
                return Ok(());
            }
            if !call.coordinator.observe_peer_joined(id.clone()) {
                return Ok(());
            }
            role = call.coordinator.role();
        }
        emitter.emit(CallEvent::PeerJoined(id));

        if role == Role::Initiator {
            Self::apply_and_emit(inner, emitter, Trigger::PeerJoined);
        }
        Self::ensure_session(inner, connectors).await?;
        if role == Role::Initiator {
            // sole trigger for an initiator-side offer
            Self::send_offer(inner).await?;
        }
        Ok(())
    }

    async fn on_user_left(inner: &mut Inner, emitter: &EventEmitter) -> Flow {
        let left = match inner.active.as_mut() {
            Some(call) => call.coordinator.observe_peer_left(),
            None => return Flow::Stop,
        };
        let Some(left) = left else {
            tracing::debug!("departure event with no paired peer, ignoring");
            return Flow::Continue;
        };
        tracing::info!("peer left: {left}");
        emitter.emit(CallEvent::PeerLeft);
        let reason = CallError::PeerDeparted.to_string();
        Self::end_call(inner, emitter, Trigger::PeerLeft, Some(&reason)).await;
        Flow::Stop
    }

    async fn on_signal(
        inner: &mut Inner,
        emitter: &EventEmitter,
        connectors: &Arc<dyn PeerConnectorFactory>,
        sender: ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), CallError> {
        {
            let Some(call) = inner.active.as_mut() else {
                return Ok(());
            };
            match call.coordinator.remote() {
                Some(remote) if *remote != sender => {
                    tracing::warn!("signal from unpaired participant {sender}, dropping");
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    // a joining responder can see the initiator's offer
                    // before the membership event, depending on the relay
                    let adoptable = call.coordinator.role() == Role::Responder
                        && !matches!(message, SignalingMessage::Answer { .. });
                    if !adoptable {
                        tracing::warn!("signal with no known peer, dropping");
                        return Ok(());
                    }
                    call.coordinator.observe_peer_joined(sender.clone());
                    emitter.emit(CallEvent::PeerJoined(sender.clone()));
                }
            }
        }
        Self::ensure_session(inner, connectors).await?;

        let mut just_connected = false;
        let outbound = {
            let Some(call) = inner.active.as_mut() else {
                return Ok(());
            };
            let Some(session) = call.session.as_mut() else {
                return Ok(());
            };
            match message {
                SignalingMessage::Offer { description } => {
                    session.handle_remote_offer(description).await?
                }
                SignalingMessage::Answer { description } => {
                    just_connected = session.handle_remote_answer(description).await?;
                    None
                }
                SignalingMessage::IceCandidate { candidate } => {
                    session.handle_remote_candidate(candidate).await;
                    None
                }
            }
        };
        if let Some(reply) = outbound {
            let Some(call) = inner.active.as_mut() else {
                return Ok(());
            };
            tracing::info!("sending answer to {sender}");
            call.transport.send(&sender, reply).await?;
        }
        if just_connected {
            Self::apply_and_emit(inner, emitter, Trigger::RemoteTrackReceived);
        }
        Ok(())
    }

    async fn on_peer_event(
        inner: &Arc<Mutex<Inner>>,
        emitter: &EventEmitter,
        attempt: u64,
        event: PeerEvent,
    ) -> Flow {
        let mut inner = inner.lock().await;
        if inner.attempt != attempt || inner.active.is_none() {
            return Flow::Stop;
        }
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                let Some(call) = inner.active.as_mut() else {
                    return Flow::Stop;
                };
                if call.session.is_none() {
                    tracing::debug!("dropping local candidate, no active session");
                    return Flow::Continue;
                }
                let Some(target) = call.coordinator.remote().cloned() else {
                    // never queued across membership changes
                    tracing::debug!("dropping local candidate, no peer addressed yet");
                    return Flow::Continue;
                };
                let message = SignalingMessage::IceCandidate { candidate };
                let sent = call.transport.send(&target, message).await;
                if let Err(e) = sent {
                    Self::fault(&mut inner, emitter, &e).await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            PeerEvent::RemoteTrack(handle) => {
                let Some(call) = inner.active.as_mut() else {
                    return Flow::Stop;
                };
                let Some(session) = call.session.as_mut() else {
                    tracing::warn!("remote track with no active session, dropping");
                    return Flow::Continue;
                };
                let just_connected = session.observe_remote_track();
                if call.remote_media.is_none() {
                    call.remote_media = Some(handle);
                } else {
                    tracing::debug!("extra remote track dropped");
                }
                if just_connected {
                    Self::apply_and_emit(&mut inner, emitter, Trigger::RemoteTrackReceived);
                }
                Flow::Continue
            }
            PeerEvent::ConnectivityChanged(state) => {
                let Some(call) = inner.active.as_mut() else {
                    return Flow::Stop;
                };
                let terminal = match call.session.as_mut() {
                    Some(session) => session.observe_connectivity(state),
                    None => false,
                };
                if terminal {
                    let reason = CallError::ConnectivityLost.to_string();
                    Self::end_call(&mut inner, emitter, Trigger::ConnectivityLost, Some(&reason))
                        .await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
        }
    }

    /// Create the negotiation session for the paired peer if none
    /// exists yet, binding local media before any description work.
    async fn ensure_session(
        inner: &mut Inner,
        connectors: &Arc<dyn PeerConnectorFactory>,
    ) -> Result<(), CallError> {
        let Some(call) = inner.active.as_mut() else {
            return Ok(());
        };
        if call.session.is_some() {
            return Ok(());
        }
        if call.coordinator.remote().is_none() {
            return Err(CallError::NoPeerAddressed);
        }
        let connector = connectors.create(call.peer_events.clone()).await?;
        let mut session = NegotiationSession::new(connector, call.coordinator.role());
        let media = call.local_media.as_ref().ok_or(CallError::PrecursorMissing)?;
        session.attach_local_media(media).await?;
        call.session = Some(session);
        Ok(())
    }

    async fn send_offer(inner: &mut Inner) -> Result<(), CallError> {
        let Some(call) = inner.active.as_mut() else {
            return Ok(());
        };
        let Some(target) = call.coordinator.remote().cloned() else {
            return Err(CallError::NoPeerAddressed);
        };
        let outbound = match call.session.as_mut() {
            Some(session) => session.create_offer().await?,
            None => None,
        };
        if let Some(message) = outbound {
            tracing::info!("sending offer to {target}");
            call.transport.send(&target, message).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(triggers: &[Trigger]) -> CallStateMachine {
        let mut machine = CallStateMachine::new();
        for &t in triggers {
            assert!(machine.apply(t).is_some(), "trigger {t:?} rejected");
        }
        machine
    }

    #[test]
    fn initiator_happy_path() {
        use Trigger::*;
        let machine = machine_in(&[RequestCreate, MediaOk, RoomReady, PeerJoined, RemoteTrackReceived]);
        assert_eq!(machine.phase(), CallPhase::Connected);
    }

    #[test]
    fn responder_happy_path() {
        use Trigger::*;
        let machine = machine_in(&[RequestJoin, MediaOk, RoomReady, RemoteTrackReceived]);
        assert_eq!(machine.phase(), CallPhase::Connected);
    }

    #[test]
    fn initiator_passes_waiting_for_peer() {
        use Trigger::*;
        let machine = machine_in(&[RequestCreate, MediaOk, RoomReady]);
        assert_eq!(machine.phase(), CallPhase::WaitingForPeer);
    }

    #[test]
    fn responder_joins_straight_to_negotiating() {
        use Trigger::*;
        let machine = machine_in(&[RequestJoin, MediaOk, RoomReady]);
        assert_eq!(machine.phase(), CallPhase::Negotiating);
    }

    #[test]
    fn media_denied_enters_error() {
        use Trigger::*;
        let machine = machine_in(&[RequestCreate, MediaDenied]);
        assert_eq!(machine.phase(), CallPhase::Error);
    }

    #[test]
    fn invalid_triggers_are_rejected_noops() {
        use Trigger::*;
        let mut machine = machine_in(&[RequestCreate, MediaOk, RoomReady, PeerJoined]);
        assert_eq!(machine.phase(), CallPhase::Negotiating);

        // negotiating cannot go back to waiting-for-peer or re-ready
        assert!(machine.apply(RoomReady).is_none());
        assert!(machine.apply(MediaOk).is_none());
        assert!(machine.apply(RequestCreate).is_none());
        assert_eq!(machine.phase(), CallPhase::Negotiating);
    }

    #[test]
    fn hang_up_returns_to_idle_from_every_phase() {
        use Trigger::*;
        let paths: &[&[Trigger]] = &[
            &[],
            &[RequestCreate],
            &[RequestCreate, MediaOk],
            &[RequestCreate, MediaOk, RoomReady],
            &[RequestJoin, MediaOk],
            &[RequestJoin, MediaOk, RoomReady],
            &[RequestCreate, MediaOk, RoomReady, PeerJoined],
            &[RequestCreate, MediaOk, RoomReady, PeerJoined, RemoteTrackReceived],
            &[RequestCreate, MediaDenied],
        ];
        for path in paths {
            let mut machine = machine_in(path);
            assert!(machine.apply(UserHangUp).is_some());
            assert_eq!(machine.phase(), CallPhase::Idle);
        }
    }

    #[test]
    fn peer_left_and_connectivity_lost_return_to_idle() {
        use Trigger::*;
        for t in [PeerLeft, ConnectivityLost] {
            let mut machine =
                machine_in(&[RequestCreate, MediaOk, RoomReady, PeerJoined, RemoteTrackReceived]);
            assert!(machine.apply(t).is_some());
            assert_eq!(machine.phase(), CallPhase::Idle);
        }
    }

    #[test]
    fn fault_is_rejected_when_idle() {
        let mut machine = CallStateMachine::new();
        assert!(machine.apply(Trigger::Fault).is_none());
        assert_eq!(machine.phase(), CallPhase::Idle);
    }

    #[test]
    fn fresh_call_after_returning_to_idle() {
        use Trigger::*;
        let mut machine = machine_in(&[RequestCreate, MediaOk, RoomReady, PeerJoined]);
        machine.apply(PeerLeft).unwrap();
        // a new attempt walks the responder path this time
        assert!(machine.apply(RequestJoin).is_some());
        assert!(machine.apply(MediaOk).is_some());
        assert_eq!(machine.phase(), CallPhase::Joining);
    }
}
