//! Media-transport seam
//!
//! The actual packetization/encryption engine is an external collaborator
//! running its own workers; the session core only drives negotiation through
//! this trait and observes statistics.

use crate::config::IceConfig;
use crate::domain::media::TrackKind;
use crate::domain::participant::ParticipantId;
use crate::domain::quality::TransportStats;
use crate::domain::shared::error::{NegotiationError, PeerConnectionError};
use crate::infrastructure::peer::sdp::{self, IceCredentials};
use crate::infrastructure::signaling::message::{IceCandidateInit, SessionDescription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Driver interface for one media-transport engine shared by all peer
/// connections of a session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Generate a local offer descriptor for a participant
    async fn create_offer(
        &self,
        participant: &ParticipantId,
        kinds: &[TrackKind],
    ) -> Result<SessionDescription, NegotiationError>;

    /// Generate an answer to a remote offer
    async fn create_answer(
        &self,
        participant: &ParticipantId,
        remote: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError>;

    /// Validate and apply a remote descriptor
    async fn apply_remote_description(
        &self,
        participant: &ParticipantId,
        remote: &SessionDescription,
    ) -> Result<(), NegotiationError>;

    /// Apply one remote ICE candidate
    async fn apply_candidate(
        &self,
        participant: &ParticipantId,
        candidate: &IceCandidateInit,
    ) -> Result<(), NegotiationError>;

    /// Start connectivity once negotiation is stable
    async fn establish(&self, participant: &ParticipantId) -> Result<(), NegotiationError>;

    /// Sample transport statistics for an established participant
    async fn stats(&self, participant: &ParticipantId) -> Result<TransportStats, PeerConnectionError>;

    /// Tear down transport state for a participant
    async fn close(&self, participant: &ParticipantId);
}

#[derive(Debug, Default)]
struct EngineEntry {
    credentials: Option<IceCredentials>,
    candidates_applied: u64,
    established: bool,
}

/// In-process descriptor engine backed by [`sdp`].
///
/// Stands in for a platform media stack: it produces structurally valid
/// descriptors and synthesizes statistics for established connections.
pub struct SdpEngine {
    ice: IceConfig,
    entries: Mutex<HashMap<ParticipantId, EngineEntry>>,
}

impl SdpEngine {
    pub fn new(ice: IceConfig) -> Self {
        Self {
            ice,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn with_entry<T>(&self, participant: &ParticipantId, f: impl FnOnce(&mut EngineEntry) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(participant.clone()).or_default();
        f(entry)
    }
}

#[async_trait]
impl MediaTransport for SdpEngine {
    async fn create_offer(
        &self,
        participant: &ParticipantId,
        kinds: &[TrackKind],
    ) -> Result<SessionDescription, NegotiationError> {
        let creds = IceCredentials::generate();
        let sdp = sdp::build_offer(kinds, &creds);
        self.with_entry(participant, |entry| entry.credentials = Some(creds));
        debug!(%participant, servers = self.ice.servers.len(), "offer descriptor created");
        Ok(SessionDescription::offer(sdp))
    }

    async fn create_answer(
        &self,
        participant: &ParticipantId,
        remote: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        let creds = IceCredentials::generate();
        let sdp = sdp::build_answer(&remote.sdp, &creds)?;
        self.with_entry(participant, |entry| entry.credentials = Some(creds));
        Ok(SessionDescription::answer(sdp))
    }

    async fn apply_remote_description(
        &self,
        _participant: &ParticipantId,
        remote: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        sdp::validate(&remote.sdp)
    }

    async fn apply_candidate(
        &self,
        participant: &ParticipantId,
        candidate: &IceCandidateInit,
    ) -> Result<(), NegotiationError> {
        if candidate.candidate.trim().is_empty() {
            return Err(NegotiationError::IceApply("empty candidate".to_string()));
        }
        self.with_entry(participant, |entry| entry.candidates_applied += 1);
        Ok(())
    }

    async fn establish(&self, participant: &ParticipantId) -> Result<(), NegotiationError> {
        self.with_entry(participant, |entry| entry.established = true);
        Ok(())
    }

    async fn stats(&self, participant: &ParticipantId) -> Result<TransportStats, PeerConnectionError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get(participant)
            .ok_or_else(|| PeerConnectionError::NotFound(participant.to_string()))?;
        if !entry.established {
            return Err(PeerConnectionError::Closed);
        }
        Ok(TransportStats {
            packets_received: 1_000,
            packets_lost: 0,
            round_trip_time_ms: 40.0,
            frames_per_second: 30.0,
            bytes_sent: 0,
            bytes_received: 0,
        })
    }

    async fn close(&self, participant: &ParticipantId) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SdpEngine {
        SdpEngine::new(IceConfig::default())
    }

    #[tokio::test]
    async fn offer_answer_cycle_produces_valid_descriptors() {
        let engine = engine();
        let a = ParticipantId::from("a");

        let offer = engine
            .create_offer(&a, &[TrackKind::Audio, TrackKind::Video])
            .await
            .unwrap();
        let answer = engine.create_answer(&a, &offer).await.unwrap();
        assert!(engine.apply_remote_description(&a, &answer).await.is_ok());
    }

    #[tokio::test]
    async fn stats_require_an_established_connection() {
        let engine = engine();
        let a = ParticipantId::from("a");

        assert!(engine.stats(&a).await.is_err());
        engine.create_offer(&a, &[TrackKind::Audio]).await.unwrap();
        assert_eq!(engine.stats(&a).await, Err(PeerConnectionError::Closed));

        engine.establish(&a).await.unwrap();
        let stats = engine.stats(&a).await.unwrap();
        assert!(stats.packets_received > 0);

        engine.close(&a).await;
        assert!(matches!(
            engine.stats(&a).await,
            Err(PeerConnectionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_candidate_is_rejected() {
        let engine = engine();
        let a = ParticipantId::from("a");
        let err = engine
            .apply_candidate(
                &a,
                &IceCandidateInit {
                    candidate: "  ".to_string(),
                    sdp_mid: None,
                    sdp_m_line_index: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::IceApply(_)));
    }
}
