//! Offer/answer/ICE negotiation per remote participant
//!
//! Happy path: `Idle -> OfferSent -> AnswerAwaited -> Stable`, mirrored by
//! `Idle -> OfferReceived -> AnswerSent -> Stable` when the remote initiates.
//! Simultaneous offers (glare) are resolved by the deterministic
//! polite/impolite role: the polite peer discards its own pending offer and
//! answers the incoming one; the impolite peer ignores the incoming offer.

use crate::domain::media::TrackKind;
use crate::domain::participant::{NegotiationRole, ParticipantId};
use crate::domain::shared::error::NegotiationError;
use crate::infrastructure::peer::manager::PeerConnectionManager;
use crate::infrastructure::signaling::message::{
    IceCandidateInit, SessionDescription, SignalingMessage,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Negotiation progress for one remote participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    OfferSent,
    AnswerAwaited,
    OfferReceived,
    AnswerSent,
    Stable,
}

/// Outcome of feeding one negotiation event
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationOutcome {
    /// Nothing to send
    Handled,
    /// A message to emit over the signaling channel
    Send(SignalingMessage),
    /// The descriptor pair is stable; connectivity may start
    BecameStable(Option<SignalingMessage>),
}

/// Drives offer/answer/ICE exchange for every remote participant.
///
/// Pure with respect to I/O: outbound messages are returned to the caller,
/// which owns the signaling channel. Ordering is per participant only.
pub struct NegotiationController {
    local_id: ParticipantId,
    states: HashMap<ParticipantId, NegotiationState>,
}

impl NegotiationController {
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            states: HashMap::new(),
        }
    }

    pub fn state(&self, participant: &ParticipantId) -> NegotiationState {
        self.states.get(participant).copied().unwrap_or_default()
    }

    fn set_state(&mut self, participant: &ParticipantId, state: NegotiationState) {
        debug!(%participant, ?state, "negotiation state");
        self.states.insert(participant.clone(), state);
    }

    fn role_toward(&self, remote: &ParticipantId) -> NegotiationRole {
        NegotiationRole::for_pair(&self.local_id, remote)
    }

    /// Begin a local offer toward a participant: `Idle -> OfferSent`, then
    /// `AnswerAwaited` once the caller has emitted the returned message.
    pub async fn start_offer(
        &mut self,
        remote: &ParticipantId,
        kinds: &[TrackKind],
        manager: &mut PeerConnectionManager,
    ) -> Result<SignalingMessage, NegotiationError> {
        let offer = manager.transport().clone().create_offer(remote, kinds).await?;
        manager
            .set_local_description(remote, offer.clone())
            .map_err(|err| NegotiationError::Rejected(err.to_string()))?;
        self.set_state(remote, NegotiationState::OfferSent);
        info!(%remote, "offer created");
        Ok(SignalingMessage::WebrtcOffer {
            offer,
            sender: Some(self.local_id.clone()),
            target: Some(remote.clone()),
        })
    }

    /// The caller has emitted a pending offer; start awaiting the answer
    pub fn offer_emitted(&mut self, remote: &ParticipantId) {
        if self.state(remote) == NegotiationState::OfferSent {
            self.set_state(remote, NegotiationState::AnswerAwaited);
        }
    }

    /// Feed an inbound offer from `remote`
    pub async fn handle_offer(
        &mut self,
        remote: &ParticipantId,
        offer: SessionDescription,
        manager: &mut PeerConnectionManager,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        match self.state(remote) {
            NegotiationState::OfferSent | NegotiationState::AnswerAwaited => {
                match self.role_toward(remote) {
                    NegotiationRole::Impolite => {
                        // Glare: keep our own offer, drop theirs
                        debug!(%remote, "glare: impolite peer ignoring incoming offer");
                        Ok(NegotiationOutcome::Handled)
                    }
                    NegotiationRole::Polite => {
                        info!(%remote, "glare: polite peer discarding own pending offer");
                        if let Some(handle) = manager.get(remote) {
                            debug!(state = handle.state.as_str(), "rolling back local offer");
                        }
                        manager.create(remote).clear_local_description();
                        let answer = self.accept_and_answer(remote, offer, manager).await?;
                        Ok(NegotiationOutcome::BecameStable(Some(answer)))
                    }
                }
            }
            NegotiationState::AnswerSent => {
                // Remote re-offered before we saw connectivity; answer again
                let answer = self.accept_and_answer(remote, offer, manager).await?;
                Ok(NegotiationOutcome::BecameStable(Some(answer)))
            }
            NegotiationState::Idle | NegotiationState::OfferReceived | NegotiationState::Stable => {
                self.set_state(remote, NegotiationState::OfferReceived);
                let answer = self.accept_and_answer(remote, offer, manager).await?;
                Ok(NegotiationOutcome::BecameStable(Some(answer)))
            }
        }
    }

    async fn accept_and_answer(
        &mut self,
        remote: &ParticipantId,
        offer: SessionDescription,
        manager: &mut PeerConnectionManager,
    ) -> Result<SignalingMessage, NegotiationError> {
        manager.create(remote);
        manager.set_remote_description(remote, offer).await?;

        let answer = {
            let transport = manager.transport().clone();
            let remote_description = manager
                .get(remote)
                .and_then(|handle| handle.remote_description.clone())
                .ok_or_else(|| NegotiationError::Rejected("remote description missing".into()))?;
            transport.create_answer(remote, &remote_description).await?
        };
        manager
            .set_local_description(remote, answer.clone())
            .map_err(|err| NegotiationError::Rejected(err.to_string()))?;

        self.set_state(remote, NegotiationState::AnswerSent);
        self.set_state(remote, NegotiationState::Stable);
        Ok(SignalingMessage::WebrtcAnswer {
            answer,
            sender: Some(self.local_id.clone()),
            target: Some(remote.clone()),
        })
    }

    /// Feed an inbound answer from `remote`. Answers outside
    /// `OfferSent`/`AnswerAwaited` are stale and ignored.
    pub async fn handle_answer(
        &mut self,
        remote: &ParticipantId,
        answer: SessionDescription,
        manager: &mut PeerConnectionManager,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        match self.state(remote) {
            NegotiationState::OfferSent | NegotiationState::AnswerAwaited => {
                manager.set_remote_description(remote, answer).await?;
                self.set_state(remote, NegotiationState::Stable);
                info!(%remote, "negotiation stable");
                Ok(NegotiationOutcome::BecameStable(None))
            }
            state => {
                warn!(%remote, ?state, "ignoring stale answer");
                Err(NegotiationError::StaleAnswer)
            }
        }
    }

    /// Feed an inbound ICE candidate; queued until the remote descriptor
    /// is applied, then flushed in arrival order.
    pub async fn handle_candidate(
        &mut self,
        remote: &ParticipantId,
        candidate: IceCandidateInit,
        manager: &mut PeerConnectionManager,
    ) -> Result<(), NegotiationError> {
        manager.create(remote);
        manager.add_ice_candidate(remote, candidate).await
    }

    pub fn is_stable(&self, participant: &ParticipantId) -> bool {
        self.state(participant) == NegotiationState::Stable
    }

    /// Forget negotiation state (participant left or retry from scratch)
    pub fn reset(&mut self, participant: &ParticipantId) {
        self.states.remove(participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IceConfig;
    use crate::infrastructure::peer::manager::PeerEvent;
    use crate::infrastructure::peer::transport::SdpEngine;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Peer {
        id: ParticipantId,
        negotiation: NegotiationController,
        manager: PeerConnectionManager,
        _events: mpsc::UnboundedReceiver<PeerEvent>,
    }

    fn peer(id: &str) -> Peer {
        let (manager, events) =
            PeerConnectionManager::new(Arc::new(SdpEngine::new(IceConfig::default())));
        Peer {
            id: ParticipantId::from(id),
            negotiation: NegotiationController::new(ParticipantId::from(id)),
            manager,
            _events: events,
        }
    }

    async fn offer_from(peer: &mut Peer, to: &ParticipantId) -> SessionDescription {
        peer.manager.create(to);
        let message = peer
            .negotiation
            .start_offer(to, &[TrackKind::Audio, TrackKind::Video], &mut peer.manager)
            .await
            .unwrap();
        peer.negotiation.offer_emitted(to);
        match message {
            SignalingMessage::WebrtcOffer { offer, .. } => offer,
            other => panic!("expected offer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn happy_path_offer_then_answer_reaches_stable() {
        let mut alice = peer("alice");
        let mut bob = peer("bob");
        let alice_id = alice.id.clone();
        let bob_id = bob.id.clone();

        let offer = offer_from(&mut alice, &bob_id).await;
        assert_eq!(
            alice.negotiation.state(&bob_id),
            NegotiationState::AnswerAwaited
        );

        // Bob answers
        let outcome = bob
            .negotiation
            .handle_offer(&alice_id, offer, &mut bob.manager)
            .await
            .unwrap();
        let answer = match outcome {
            NegotiationOutcome::BecameStable(Some(SignalingMessage::WebrtcAnswer {
                answer, ..
            })) => answer,
            other => panic!("expected answer, got {:?}", other),
        };
        assert!(bob.negotiation.is_stable(&alice_id));

        // Alice applies the answer
        let outcome = alice
            .negotiation
            .handle_answer(&bob_id, answer, &mut alice.manager)
            .await
            .unwrap();
        assert_eq!(outcome, NegotiationOutcome::BecameStable(None));
        assert!(alice.negotiation.is_stable(&bob_id));
    }

    #[tokio::test]
    async fn glare_resolves_without_manual_intervention() {
        // "alice" < "bob": alice is polite toward bob, bob impolite
        let mut alice = peer("alice");
        let mut bob = peer("bob");
        let alice_id = alice.id.clone();
        let bob_id = bob.id.clone();

        let offer_a = offer_from(&mut alice, &bob_id).await;
        let offer_b = offer_from(&mut bob, &alice_id).await;

        // Bob (impolite) ignores alice's colliding offer
        let outcome = bob
            .negotiation
            .handle_offer(&alice_id, offer_a, &mut bob.manager)
            .await
            .unwrap();
        assert_eq!(outcome, NegotiationOutcome::Handled);
        assert_eq!(
            bob.negotiation.state(&alice_id),
            NegotiationState::AnswerAwaited
        );

        // Alice (polite) discards her pending offer and answers bob's
        let outcome = alice
            .negotiation
            .handle_offer(&bob_id, offer_b, &mut alice.manager)
            .await
            .unwrap();
        let answer = match outcome {
            NegotiationOutcome::BecameStable(Some(SignalingMessage::WebrtcAnswer {
                answer, ..
            })) => answer,
            other => panic!("expected answer, got {:?}", other),
        };
        assert!(alice.negotiation.is_stable(&bob_id));

        // Bob accepts the answer to his own offer; both sides are stable
        bob.negotiation
            .handle_answer(&alice_id, answer, &mut bob.manager)
            .await
            .unwrap();
        assert!(bob.negotiation.is_stable(&alice_id));
    }

    #[tokio::test]
    async fn stale_answer_is_ignored() {
        let mut alice = peer("alice");
        let bob_id = ParticipantId::from("bob");
        alice.manager.create(&bob_id);

        let answer = SessionDescription::answer("v=0\r\nm=audio 9 X\r\n");
        let err = alice
            .negotiation
            .handle_answer(&bob_id, answer, &mut alice.manager)
            .await
            .unwrap_err();
        assert_eq!(err, NegotiationError::StaleAnswer);
        assert_eq!(alice.negotiation.state(&bob_id), NegotiationState::Idle);
    }

    #[tokio::test]
    async fn candidates_before_description_survive_in_order() {
        let mut alice = peer("alice");
        let mut bob = peer("bob");
        let alice_id = alice.id.clone();
        let bob_id = bob.id.clone();

        for n in 0..4 {
            alice
                .negotiation
                .handle_candidate(
                    &bob_id,
                    IceCandidateInit {
                        candidate: format!("candidate:{n}"),
                        sdp_mid: Some("0".into()),
                        sdp_m_line_index: Some(0),
                    },
                    &mut alice.manager,
                )
                .await
                .unwrap();
        }
        assert_eq!(
            alice.manager.get(&bob_id).unwrap().pending_candidate_count(),
            4
        );

        let offer = offer_from(&mut bob, &alice_id).await;
        alice
            .negotiation
            .handle_offer(&bob_id, offer, &mut alice.manager)
            .await
            .unwrap();
        // All queued candidates applied, none dropped
        assert_eq!(
            alice.manager.get(&bob_id).unwrap().pending_candidate_count(),
            0
        );
    }

    #[tokio::test]
    async fn malformed_offer_is_a_recoverable_error() {
        let mut alice = peer("alice");
        let bob_id = ParticipantId::from("bob");

        let err = alice
            .negotiation
            .handle_offer(
                &bob_id,
                SessionDescription::offer("not sdp"),
                &mut alice.manager,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::MalformedDescriptor(_)));

        // Retry from Idle still works
        alice.negotiation.reset(&bob_id);
        alice.manager.reset(&bob_id).await;
        assert_eq!(alice.negotiation.state(&bob_id), NegotiationState::Idle);
    }
}
