//! Signaling wire format
//!
//! One JSON object per frame, tagged by `type`. A single closed enum covers
//! both directions so dispatch is exhaustive at compile time.

use crate::domain::media::MediaState;
use crate::domain::participant::ParticipantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session descriptor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// A session descriptor as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE candidate as carried on the wire (browser field casing)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages exchanged over the signaling channel.
///
/// The server relays descriptions to other clients under `webrtc_offer`/
/// `webrtc_answer` tags but only accepts `offer`/`answer` from clients, so
/// those variants serialize with the client-side tags and accept the relayed
/// tags as aliases on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    UserJoined {
        participant_id: ParticipantId,
        timestamp: DateTime<Utc>,
    },
    UserLeft {
        participant_id: ParticipantId,
    },
    #[serde(rename = "offer", alias = "webrtc_offer")]
    WebrtcOffer {
        offer: SessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ParticipantId>,
    },
    #[serde(rename = "answer", alias = "webrtc_answer")]
    WebrtcAnswer {
        answer: SessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ParticipantId>,
    },
    IceCandidate {
        candidate: IceCandidateInit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ParticipantId>,
    },
    /// Outbound announcement of the local media state
    MediaState {
        state: MediaState,
    },
    /// Inbound notification of a remote participant's media state
    MediaStateUpdate {
        participant_id: ParticipantId,
        state: MediaState,
    },
    Ping,
    Pong,
    Error {
        message: String,
    },
}

impl SignalingMessage {
    /// Tag string used on the wire, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::UserJoined { .. } => "user_joined",
            SignalingMessage::UserLeft { .. } => "user_left",
            SignalingMessage::WebrtcOffer { .. } => "offer",
            SignalingMessage::WebrtcAnswer { .. } => "answer",
            SignalingMessage::IceCandidate { .. } => "ice_candidate",
            SignalingMessage::MediaState { .. } => "media_state",
            SignalingMessage::MediaStateUpdate { .. } => "media_state_update",
            SignalingMessage::Ping => "ping",
            SignalingMessage::Pong => "pong",
            SignalingMessage::Error { .. } => "error",
        }
    }
}
