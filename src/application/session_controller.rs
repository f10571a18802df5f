//! Top-level session orchestration
//!
//! One cooperative event loop per session: inbound signaling, peer events,
//! local commands, and sampling ticks are processed one at a time, so
//! session-local state needs no locking. Ordering is preserved per remote
//! participant; participants progress independently of each other.

use crate::config::Config;
use crate::domain::connection::ConnectionState;
use crate::domain::media::TrackKind;
use crate::domain::participant::{ParticipantId, ParticipantRegistry, ParticipantUpdate};
use crate::domain::quality::QualityReport;
use crate::domain::session::{ConnectionPhase, Session};
use crate::domain::shared::error::{NegotiationError, SessionError, TransportError};
use crate::domain::shared::events::{EventBroadcaster, SessionEvent, Severity};
use crate::domain::shared::result::Result;
use crate::infrastructure::media::{LocalMediaController, MediaBackend};
use crate::infrastructure::peer::manager::{PeerConnectionManager, PeerEvent};
use crate::infrastructure::peer::negotiation::{NegotiationController, NegotiationOutcome};
use crate::infrastructure::peer::transport::MediaTransport;
use crate::infrastructure::signaling::channel::{ChannelEvent, SignalingChannel};
use crate::infrastructure::signaling::message::SignalingMessage;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Commands accepted by a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleTrack(TrackKind),
    Hangup,
}

/// Cheap cloneable handle for controlling a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    pub fn toggle_video(&self) {
        let _ = self.commands.send(Command::ToggleTrack(TrackKind::Video));
    }

    pub fn toggle_audio(&self) {
        let _ = self.commands.send(Command::ToggleTrack(TrackKind::Audio));
    }

    pub fn hang_up(&self) {
        let _ = self.commands.send(Command::Hangup);
    }
}

/// Orchestrates one call session end to end
pub struct SessionController {
    config: Config,
    session: Session,
    registry: ParticipantRegistry,
    media: LocalMediaController,
    manager: PeerConnectionManager,
    negotiation: NegotiationController,
    events: EventBroadcaster,
    channel: Option<SignalingChannel>,
    inbound: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    peer_events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    commands: Option<mpsc::UnboundedReceiver<Command>>,
    negotiation_retries: HashMap<ParticipantId, u32>,
}

impl SessionController {
    /// Enter a call: acquire local media, open the signaling channel, and
    /// announce presence. Media failure is session-fatal and reported
    /// before any connection attempt.
    pub async fn join(
        config: Config,
        backend: Arc<dyn MediaBackend>,
        transport: Arc<dyn MediaTransport>,
        room_id: impl Into<String>,
        local_participant_id: ParticipantId,
    ) -> Result<(Self, SessionHandle)> {
        let (manager, peer_events) = PeerConnectionManager::new(transport);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let mut controller = Self {
            registry: ParticipantRegistry::new(local_participant_id.clone()),
            media: LocalMediaController::new(backend),
            manager,
            negotiation: NegotiationController::new(local_participant_id.clone()),
            events: EventBroadcaster::new(),
            session: Session::new(room_id, local_participant_id),
            channel: None,
            inbound: None,
            peer_events: Some(peer_events),
            commands: Some(commands_rx),
            negotiation_retries: HashMap::new(),
            config,
        };

        controller.set_phase(ConnectionPhase::Joining);

        let constraints = controller.config.media.constraints;
        if let Err(err) = controller.media.acquire_with_fallback(constraints).await {
            controller.set_phase(ConnectionPhase::Closed);
            controller.events.notify(Severity::Error, err.to_string());
            return Err(SessionError::Media(err));
        }

        match SignalingChannel::connect(&controller.config.signaling, &controller.session.room_id)
            .await
        {
            Ok((channel, inbound)) => {
                controller.channel = Some(channel);
                controller.inbound = Some(inbound);
            }
            Err(err) => {
                controller.media.release();
                controller.set_phase(ConnectionPhase::Closed);
                controller.events.notify(Severity::Error, err.to_string());
                return Err(SessionError::Transport(err));
            }
        }

        controller.set_phase(ConnectionPhase::Active);
        controller.announce_media_state().await;

        info!(
            session_id = %controller.session.id,
            room_id = %controller.session.room_id,
            "joined call"
        );
        Ok((
            controller,
            SessionHandle {
                commands: commands_tx,
            },
        ))
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.session.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn roster(&self) -> Vec<crate::domain::participant::RemoteParticipant> {
        self.registry.list()
    }

    /// Drive the session until hangup, normal server close, or fatal error
    pub async fn run(mut self) -> Result<()> {
        let mut inbound = self
            .inbound
            .take()
            .ok_or_else(|| SessionError::InvalidState("session was not joined".to_string()))?;
        let mut peer_events = self
            .peer_events
            .take()
            .ok_or_else(|| SessionError::InvalidState("peer events already taken".to_string()))?;
        let mut commands = self
            .commands
            .take()
            .ok_or_else(|| SessionError::InvalidState("command receiver already taken".to_string()))?;

        let quality_period = self.config.quality.sample_interval();
        let mut quality = interval_at(Instant::now() + quality_period, quality_period);
        quality.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ping_period = self.config.signaling.ping_interval();
        let mut ping = interval_at(Instant::now() + ping_period, ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = inbound.recv() => {
                    match event {
                        Some(ChannelEvent::Message(message)) => {
                            self.handle_message(message).await;
                        }
                        Some(ChannelEvent::Closed { normal }) => {
                            match self.handle_channel_closed(normal).await? {
                                Some(next_inbound) => inbound = next_inbound,
                                None => return Ok(()),
                            }
                        }
                        None => {
                            // Reader task gone without a close event
                            match self.handle_channel_closed(false).await? {
                                Some(next_inbound) => inbound = next_inbound,
                                None => return Ok(()),
                            }
                        }
                    }
                }
                Some(event) = peer_events.recv() => {
                    self.handle_peer_event(event);
                }
                Some(command) = commands.recv() => {
                    if self.handle_command(command).await {
                        return Ok(());
                    }
                }
                _ = quality.tick() => {
                    self.sample_quality().await;
                }
                _ = ping.tick() => {
                    self.send_heartbeat().await;
                }
            }
        }
    }

    fn set_phase(&mut self, next: ConnectionPhase) {
        let old = self.session.phase;
        if old == next {
            return;
        }
        if !old.can_transition_to(next) {
            warn!(from = old.as_str(), to = next.as_str(), "illegal phase transition ignored");
            return;
        }
        self.session.phase = next;
        info!(from = old.as_str(), to = next.as_str(), "session phase changed");
        self.events.publish(SessionEvent::PhaseChanged {
            old_phase: old,
            new_phase: next,
        });
    }

    async fn send(&mut self, message: &SignalingMessage) -> std::result::Result<(), TransportError> {
        match self.channel.as_mut() {
            Some(channel) => channel.send(message).await,
            None => Err(TransportError::NotConnected),
        }
    }

    async fn announce_media_state(&mut self) {
        let state = self.media.media_state();
        if let Err(err) = self.send(&SignalingMessage::MediaState { state }).await {
            warn!(%err, "failed to announce media state");
        }
    }

    async fn send_heartbeat(&mut self) {
        if let Err(err) = self.send(&SignalingMessage::Ping).await {
            debug!(%err, "heartbeat skipped");
        }
    }

    async fn handle_message(&mut self, message: SignalingMessage) {
        match message {
            SignalingMessage::UserJoined {
                participant_id,
                timestamp,
            } => self.on_user_joined(participant_id, timestamp).await,
            SignalingMessage::UserLeft { participant_id } => {
                self.on_user_left(participant_id).await;
            }
            SignalingMessage::WebrtcOffer { offer, sender, .. } => match sender {
                Some(sender) => self.on_offer(sender, offer).await,
                None => warn!("offer without sender ignored"),
            },
            SignalingMessage::WebrtcAnswer { answer, sender, .. } => match sender {
                Some(sender) => self.on_answer(sender, answer).await,
                None => warn!("answer without sender ignored"),
            },
            SignalingMessage::IceCandidate {
                candidate, sender, ..
            } => match sender {
                Some(sender) => self.on_candidate(sender, candidate).await,
                None => warn!("ICE candidate without sender ignored"),
            },
            SignalingMessage::MediaStateUpdate {
                participant_id,
                state,
            } => {
                if self.registry.update_media_state(&participant_id, state) {
                    self.events.publish(SessionEvent::MediaStateChanged {
                        participant_id,
                        state,
                    });
                }
            }
            SignalingMessage::Pong => {
                debug!("heartbeat acknowledged");
            }
            SignalingMessage::Error { message } => {
                self.events.notify(Severity::Error, message);
            }
            SignalingMessage::MediaState { .. } | SignalingMessage::Ping => {
                warn!(kind = message.kind(), "unexpected inbound message ignored");
            }
        }
    }

    async fn on_user_joined(&mut self, participant_id: ParticipantId, timestamp: DateTime<Utc>) {
        if participant_id == self.session.local_participant_id {
            return;
        }
        let inserted = self.registry.upsert(
            participant_id.clone(),
            ParticipantUpdate {
                joined_at: Some(timestamp),
                media_state: None,
            },
        );
        if !inserted {
            debug!(%participant_id, "duplicate join ignored");
            return;
        }
        self.events.publish(SessionEvent::ParticipantJoined {
            participant_id: participant_id.clone(),
        });
        self.events.notify(Severity::Info, "Someone joined the call");

        // Offer only when we have live local media to attach
        if self.media.is_live() {
            self.initiate_offer(&participant_id).await;
        }
    }

    async fn on_user_left(&mut self, participant_id: ParticipantId) {
        if self.registry.remove(&participant_id).is_none() {
            return;
        }
        self.negotiation.reset(&participant_id);
        self.negotiation_retries.remove(&participant_id);
        self.manager.close(&participant_id).await;
        self.events.publish(SessionEvent::ParticipantLeft {
            participant_id: participant_id.clone(),
        });
        self.events.notify(Severity::Info, "Someone left the call");
    }

    async fn on_offer(
        &mut self,
        sender: ParticipantId,
        offer: crate::infrastructure::signaling::message::SessionDescription,
    ) {
        if sender == self.session.local_participant_id {
            return;
        }
        // A relayed offer may precede the join notification
        self.registry.upsert(sender.clone(), ParticipantUpdate::default());
        self.prepare_handle(&sender);

        let outcome = self
            .negotiation
            .handle_offer(&sender, offer, &mut self.manager)
            .await;
        match outcome {
            Ok(NegotiationOutcome::Handled) => {}
            Ok(NegotiationOutcome::Send(message))
            | Ok(NegotiationOutcome::BecameStable(Some(message))) => {
                if let Err(err) = self.send(&message).await {
                    warn!(%err, "failed to send negotiation reply");
                }
                self.start_connectivity(&sender).await;
            }
            Ok(NegotiationOutcome::BecameStable(None)) => {
                self.start_connectivity(&sender).await;
            }
            Err(err) => {
                warn!(%sender, %err, "offer handling failed");
                self.on_negotiation_failure(&sender).await;
            }
        }
    }

    async fn on_answer(
        &mut self,
        sender: ParticipantId,
        answer: crate::infrastructure::signaling::message::SessionDescription,
    ) {
        match self
            .negotiation
            .handle_answer(&sender, answer, &mut self.manager)
            .await
        {
            Ok(_) => {
                self.start_connectivity(&sender).await;
            }
            Err(NegotiationError::StaleAnswer) => {
                debug!(%sender, "stale answer dropped");
            }
            Err(err) => {
                warn!(%sender, %err, "answer handling failed");
                self.on_negotiation_failure(&sender).await;
            }
        }
    }

    async fn on_candidate(
        &mut self,
        sender: ParticipantId,
        candidate: crate::infrastructure::signaling::message::IceCandidateInit,
    ) {
        if let Err(err) = self
            .negotiation
            .handle_candidate(&sender, candidate, &mut self.manager)
            .await
        {
            warn!(%sender, %err, "ICE candidate handling failed");
            self.on_negotiation_failure(&sender).await;
        }
    }

    fn prepare_handle(&mut self, participant_id: &ParticipantId) {
        self.manager.create(participant_id);
        if let Some(source) = self.media.source() {
            if let Err(err) = self.manager.add_local_tracks(participant_id, source) {
                warn!(%participant_id, %err, "could not attach local tracks");
            }
        }
    }

    async fn initiate_offer(&mut self, participant_id: &ParticipantId) {
        if let Err(err) = self.try_offer(participant_id).await {
            warn!(%participant_id, %err, "offer creation failed");
            self.on_negotiation_failure(participant_id).await;
        }
    }

    /// One offer attempt with no recovery
    async fn try_offer(
        &mut self,
        participant_id: &ParticipantId,
    ) -> std::result::Result<(), NegotiationError> {
        self.prepare_handle(participant_id);
        let kinds: Vec<TrackKind> = self
            .manager
            .get(participant_id)
            .map(|handle| handle.local_tracks.clone())
            .unwrap_or_default();

        let message = self
            .negotiation
            .start_offer(participant_id, &kinds, &mut self.manager)
            .await?;
        if self.send(&message).await.is_ok() {
            self.negotiation.offer_emitted(participant_id);
        } else {
            // Channel loss is recovered by the reconnect path, which
            // restarts negotiation from scratch
            warn!(%participant_id, "offer could not be sent");
        }
        Ok(())
    }

    /// Start connectivity once for a freshly stable pair
    async fn start_connectivity(&mut self, participant_id: &ParticipantId) {
        if self.manager.state(participant_id) != Some(ConnectionState::New) {
            return;
        }
        if let Err(err) = self.manager.establish(participant_id).await {
            warn!(%participant_id, %err, "connectivity failed");
            self.on_negotiation_failure(participant_id).await;
        }
    }

    /// Participant-scoped recovery: retry negotiation once from scratch,
    /// then tear the participant down. Never session-fatal.
    async fn on_negotiation_failure(&mut self, participant_id: &ParticipantId) {
        self.manager.fail(participant_id);
        let attempts = self
            .negotiation_retries
            .entry(participant_id.clone())
            .or_insert(0);
        if *attempts < 1 {
            *attempts += 1;
            info!(%participant_id, "retrying negotiation from idle");
            self.negotiation.reset(participant_id);
            self.manager.reset(participant_id).await;
            if self.media.is_live() {
                if let Err(err) = self.try_offer(participant_id).await {
                    warn!(%participant_id, %err, "negotiation retry failed");
                    self.teardown_participant(participant_id).await;
                }
            }
        } else {
            self.teardown_participant(participant_id).await;
        }
    }

    async fn teardown_participant(&mut self, participant_id: &ParticipantId) {
        error!(%participant_id, "negotiation failed after retry, removing participant");
        self.negotiation.reset(participant_id);
        self.negotiation_retries.remove(participant_id);
        self.manager.close(participant_id).await;
        if self.registry.remove(participant_id).is_some() {
            self.events.publish(SessionEvent::ParticipantLeft {
                participant_id: participant_id.clone(),
            });
        }
        self.events
            .notify(Severity::Error, "Call connection failed");
    }

    fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::StateChanged {
                participant_id,
                state,
            } => {
                match state {
                    ConnectionState::Connected => {
                        self.events.notify(Severity::Success, "Video call connected");
                    }
                    ConnectionState::Failed => {
                        self.events.notify(Severity::Error, "Call connection failed");
                    }
                    _ => {}
                }
                self.events.publish(SessionEvent::ConnectionStateChanged {
                    participant_id,
                    state,
                });
            }
            PeerEvent::RemoteTrack {
                participant_id,
                track,
            } => {
                self.events.publish(SessionEvent::RemoteTrack {
                    participant_id,
                    track,
                });
            }
        }
    }

    /// Returns true when the session is finished
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::ToggleTrack(kind) => {
                match self.media.toggle_track(kind) {
                    Ok(state) => {
                        self.announce_media_state().await;
                        self.events.publish(SessionEvent::MediaStateChanged {
                            participant_id: self.session.local_participant_id.clone(),
                            state,
                        });
                        let message = match (kind, state.video, state.audio) {
                            (TrackKind::Video, true, _) => "Camera turned on",
                            (TrackKind::Video, false, _) => "Camera turned off",
                            (TrackKind::Audio, _, true) => "Microphone turned on",
                            (TrackKind::Audio, _, false) => "Microphone turned off",
                        };
                        self.events.notify(Severity::Info, message);
                    }
                    Err(err) => {
                        self.events.notify(Severity::Error, err.to_string());
                    }
                }
                false
            }
            Command::Hangup => {
                self.hang_up().await;
                true
            }
        }
    }

    /// Explicit hangup: close every peer connection, release local media,
    /// close the channel normally, and clear the roster.
    async fn hang_up(&mut self) {
        self.set_phase(ConnectionPhase::Leaving);
        self.manager.close_all().await;
        self.media.release();
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.registry.clear();
        self.negotiation_retries.clear();
        self.set_phase(ConnectionPhase::Closed);
        info!("call ended");
    }

    /// Transport loss handling. `Ok(Some(rx))` resumes with a fresh inbound
    /// sequence; `Ok(None)` means the session ended cleanly.
    async fn handle_channel_closed(
        &mut self,
        normal: bool,
    ) -> Result<Option<mpsc::UnboundedReceiver<ChannelEvent>>> {
        if matches!(
            self.session.phase,
            ConnectionPhase::Leaving | ConnectionPhase::Closed
        ) {
            return Ok(None);
        }

        if normal {
            // Server ended the room; tear down without reconnecting
            self.events.notify(Severity::Info, "Call ended by server");
            self.hang_up().await;
            return Ok(None);
        }

        self.channel = None;
        self.set_phase(ConnectionPhase::Reconnecting);
        let cause = TransportError::Dropped;
        warn!(%cause, "signaling transport lost");
        self.events.notify(Severity::Error, cause.to_string());

        let policy = self.config.reconnect.clone();
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            info!(attempt, max = policy.max_attempts, "reconnecting signaling channel");
            match SignalingChannel::connect(&self.config.signaling, &self.session.room_id).await {
                Ok((channel, inbound)) => {
                    self.channel = Some(channel);
                    self.set_phase(ConnectionPhase::Active);
                    self.announce_media_state().await;
                    self.reoffer_unconnected_participants().await;
                    return Ok(Some(inbound));
                }
                Err(err) => {
                    warn!(attempt, %err, "reconnect attempt failed");
                }
            }
        }

        self.events
            .notify(Severity::Error, "Connection lost and could not be restored");
        self.manager.close_all().await;
        self.media.release();
        self.registry.clear();
        self.set_phase(ConnectionPhase::Closed);
        Err(SessionError::ReconnectExhausted)
    }

    /// After a reconnect, restart negotiation for participants whose
    /// transport never came up or failed while we were away.
    async fn reoffer_unconnected_participants(&mut self) {
        if !self.media.is_live() {
            return;
        }
        for participant_id in self.registry.ids() {
            let needs_offer = matches!(
                self.manager.state(&participant_id),
                None | Some(ConnectionState::New) | Some(ConnectionState::Failed)
            );
            if needs_offer {
                self.negotiation.reset(&participant_id);
                self.manager.reset(&participant_id).await;
                self.initiate_offer(&participant_id).await;
            }
        }
    }

    async fn sample_quality(&mut self) {
        for participant_id in self.manager.participants_in_state(ConnectionState::Connected) {
            match self.manager.stats(&participant_id).await {
                Ok(stats) => {
                    let report = QualityReport::sample(participant_id, stats);
                    self.events.publish(SessionEvent::QualityReport(report));
                }
                Err(err) => {
                    // Never fatal; skip this interval
                    debug!(%participant_id, %err, "quality sample skipped");
                }
            }
        }
    }
}
