//! Peer connection ownership and lifecycle

use crate::domain::connection::ConnectionState;
use crate::domain::media::MediaTrack;
use crate::domain::participant::ParticipantId;
use crate::domain::quality::TransportStats;
use crate::domain::shared::error::{NegotiationError, PeerConnectionError};
use crate::infrastructure::media::LocalMediaSource;
use crate::infrastructure::peer::connection::PeerConnectionHandle;
use crate::infrastructure::peer::transport::MediaTransport;
use crate::infrastructure::signaling::message::{IceCandidateInit, SessionDescription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lazily consumed peer-level events: connection-state transitions and
/// inbound remote tracks.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    StateChanged {
        participant_id: ParticipantId,
        state: ConnectionState,
    },
    RemoteTrack {
        participant_id: ParticipantId,
        track: MediaTrack,
    },
}

/// Owns one [`PeerConnectionHandle`] per remote participant
pub struct PeerConnectionManager {
    transport: Arc<dyn MediaTransport>,
    connections: HashMap<ParticipantId, PeerConnectionHandle>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerConnectionManager {
    pub fn new(transport: Arc<dyn MediaTransport>) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                transport,
                connections: HashMap::new(),
                events_tx,
            },
            events_rx,
        )
    }

    pub fn transport(&self) -> &Arc<dyn MediaTransport> {
        &self.transport
    }

    fn emit(&self, event: PeerEvent) {
        // Receiver lives in the session loop; a drop there ends the session
        let _ = self.events_tx.send(event);
    }

    fn emit_state(&self, participant_id: &ParticipantId, state: ConnectionState) {
        self.emit(PeerEvent::StateChanged {
            participant_id: participant_id.clone(),
            state,
        });
    }

    /// Create (or return the existing) handle for a participant
    pub fn create(&mut self, participant_id: &ParticipantId) -> &mut PeerConnectionHandle {
        self.connections
            .entry(participant_id.clone())
            .or_insert_with(|| {
                info!(%participant_id, "peer connection created");
                PeerConnectionHandle::new(participant_id.clone())
            })
    }

    pub fn get(&self, participant_id: &ParticipantId) -> Option<&PeerConnectionHandle> {
        self.connections.get(participant_id)
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.connections.contains_key(participant_id)
    }

    fn handle_mut(
        &mut self,
        participant_id: &ParticipantId,
    ) -> Result<&mut PeerConnectionHandle, PeerConnectionError> {
        self.connections
            .get_mut(participant_id)
            .ok_or_else(|| PeerConnectionError::NotFound(participant_id.to_string()))
    }

    /// Attach local tracks from the capture source
    pub fn add_local_tracks(
        &mut self,
        participant_id: &ParticipantId,
        source: &LocalMediaSource,
    ) -> Result<(), PeerConnectionError> {
        let kinds = local_track_kinds(source);
        self.handle_mut(participant_id)?.add_local_tracks(&kinds)
    }

    pub fn set_local_description(
        &mut self,
        participant_id: &ParticipantId,
        description: SessionDescription,
    ) -> Result<(), PeerConnectionError> {
        self.handle_mut(participant_id)?
            .set_local_description(description)
    }

    /// Apply a remote descriptor: validates through the transport, flushes
    /// queued candidates in arrival order, and surfaces remote tracks.
    pub async fn set_remote_description(
        &mut self,
        participant_id: &ParticipantId,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.transport
            .apply_remote_description(participant_id, &description)
            .await?;

        let handle = self
            .handle_mut(participant_id)
            .map_err(|err| NegotiationError::Rejected(err.to_string()))?;
        let queued = handle
            .set_remote_description(description)
            .map_err(|err| NegotiationError::Rejected(err.to_string()))?;
        let tracks = handle.remote_tracks();

        if !queued.is_empty() {
            debug!(%participant_id, count = queued.len(), "flushing queued ICE candidates");
        }
        for candidate in queued {
            self.transport
                .apply_candidate(participant_id, &candidate)
                .await?;
        }

        for track in tracks {
            self.emit(PeerEvent::RemoteTrack {
                participant_id: participant_id.clone(),
                track,
            });
        }
        Ok(())
    }

    /// Apply a remote candidate now, or queue it until the remote
    /// descriptor is set.
    pub async fn add_ice_candidate(
        &mut self,
        participant_id: &ParticipantId,
        candidate: IceCandidateInit,
    ) -> Result<(), NegotiationError> {
        let handle = self
            .handle_mut(participant_id)
            .map_err(|err| NegotiationError::Rejected(err.to_string()))?;
        if handle.has_remote_description() {
            self.transport
                .apply_candidate(participant_id, &candidate)
                .await
        } else {
            debug!(%participant_id, "queueing ICE candidate before remote description");
            handle
                .queue_candidate(candidate)
                .map_err(|err| NegotiationError::Rejected(err.to_string()))
        }
    }

    /// Validated state transition, reported to the session loop
    pub fn set_state(
        &mut self,
        participant_id: &ParticipantId,
        state: ConnectionState,
    ) -> Result<(), PeerConnectionError> {
        self.handle_mut(participant_id)?.transition(state)?;
        self.emit_state(participant_id, state);
        Ok(())
    }

    /// Start connectivity once negotiation reached a stable pair of
    /// descriptors: `New -> Connecting -> Connected` on success, `Failed`
    /// when the transport rejects.
    pub async fn establish(
        &mut self,
        participant_id: &ParticipantId,
    ) -> Result<(), NegotiationError> {
        self.set_state(participant_id, ConnectionState::Connecting)
            .map_err(|err| NegotiationError::Rejected(err.to_string()))?;

        match self.transport.establish(participant_id).await {
            Ok(()) => {
                self.set_state(participant_id, ConnectionState::Connected)
                    .map_err(|err| NegotiationError::Rejected(err.to_string()))?;
                info!(%participant_id, "peer connection established");
                Ok(())
            }
            Err(err) => {
                warn!(%participant_id, %err, "transport failed to establish");
                let _ = self.set_state(participant_id, ConnectionState::Failed);
                Err(err)
            }
        }
    }

    /// Mark a participant's connection failed (participant-scoped, never
    /// session-fatal).
    pub fn fail(&mut self, participant_id: &ParticipantId) {
        if let Ok(handle) = self.handle_mut(participant_id) {
            if handle.state != ConnectionState::Failed && handle.transition(ConnectionState::Failed).is_ok() {
                self.emit_state(participant_id, ConnectionState::Failed);
            }
        }
    }

    /// Reset a handle back to `New` for a negotiation retry
    pub async fn reset(&mut self, participant_id: &ParticipantId) {
        self.transport.close(participant_id).await;
        if let Some(handle) = self.connections.get_mut(participant_id) {
            *handle = PeerConnectionHandle::new(participant_id.clone());
        }
    }

    /// Close and release the handle; idempotent
    pub async fn close(&mut self, participant_id: &ParticipantId) {
        if let Some(mut handle) = self.connections.remove(participant_id) {
            self.transport.close(participant_id).await;
            handle.close();
            self.emit_state(participant_id, ConnectionState::Closed);
            info!(%participant_id, "peer connection closed");
        }
    }

    /// Close every handle (session teardown)
    pub async fn close_all(&mut self) {
        let ids: Vec<ParticipantId> = self.connections.keys().cloned().collect();
        for id in ids {
            self.close(&id).await;
        }
    }

    pub fn state(&self, participant_id: &ParticipantId) -> Option<ConnectionState> {
        self.connections.get(participant_id).map(|h| h.state)
    }

    /// Participants currently in the given state
    pub fn participants_in_state(&self, state: ConnectionState) -> Vec<ParticipantId> {
        self.connections
            .values()
            .filter(|h| h.state == state)
            .map(|h| h.participant_id.clone())
            .collect()
    }

    /// Sample transport statistics for one participant
    pub async fn stats(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<TransportStats, PeerConnectionError> {
        if !self.contains(participant_id) {
            return Err(PeerConnectionError::NotFound(participant_id.to_string()));
        }
        self.transport.stats(participant_id).await
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn local_track_kinds(source: &LocalMediaSource) -> Vec<crate::domain::media::TrackKind> {
    let mut kinds = Vec::new();
    if source.has_audio {
        kinds.push(crate::domain::media::TrackKind::Audio);
    }
    if source.has_video {
        kinds.push(crate::domain::media::TrackKind::Video);
    }
    kinds
}
