//! Minimal session-descriptor construction and validation
//!
//! The engine does not define the RTP wire format; descriptors only need
//! enough structure for negotiation to agree on media kinds and ICE
//! credentials.

use crate::domain::media::TrackKind;
use crate::domain::shared::error::NegotiationError;
use rand::{distributions::Alphanumeric, Rng};

/// ICE credentials carried in a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

impl IceCredentials {
    pub fn generate() -> Self {
        Self {
            ufrag: random_token(8),
            pwd: random_token(24),
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn media_section(kind: TrackKind, mid: usize, creds: &IceCredentials) -> String {
    let rtpmap = match kind {
        TrackKind::Audio => "a=rtpmap:111 opus/48000/2",
        TrackKind::Video => "a=rtpmap:96 VP8/90000",
    };
    let payload = match kind {
        TrackKind::Audio => 111,
        TrackKind::Video => 96,
    };
    format!(
        "m={} 9 UDP/TLS/RTP/SAVPF {}\r\n\
         c=IN IP4 0.0.0.0\r\n\
         a=mid:{}\r\n\
         a=ice-ufrag:{}\r\n\
         a=ice-pwd:{}\r\n\
         {}\r\n\
         a=sendrecv\r\n",
        kind.as_str(),
        payload,
        mid,
        creds.ufrag,
        creds.pwd,
        rtpmap
    )
}

fn session_header(kinds: &[TrackKind]) -> String {
    let bundle: Vec<String> = (0..kinds.len()).map(|i| i.to_string()).collect();
    format!(
        "v=0\r\n\
         o=- {} 2 IN IP4 127.0.0.1\r\n\
         s=-\r\n\
         t=0 0\r\n\
         a=group:BUNDLE {}\r\n",
        rand::thread_rng().gen::<u32>(),
        bundle.join(" ")
    )
}

/// Build an offer descriptor carrying the given media kinds
pub fn build_offer(kinds: &[TrackKind], creds: &IceCredentials) -> String {
    let mut sdp = session_header(kinds);
    for (mid, kind) in kinds.iter().enumerate() {
        sdp.push_str(&media_section(*kind, mid, creds));
    }
    sdp
}

/// Build an answer mirroring the media kinds of a remote offer
pub fn build_answer(remote_sdp: &str, creds: &IceCredentials) -> Result<String, NegotiationError> {
    validate(remote_sdp)?;
    let kinds = media_kinds(remote_sdp);
    Ok(build_offer(&kinds, creds))
}

/// Structural validation of a descriptor
pub fn validate(sdp: &str) -> Result<(), NegotiationError> {
    if !sdp.starts_with("v=0") {
        return Err(NegotiationError::MalformedDescriptor(
            "missing v=0 line".to_string(),
        ));
    }
    if !sdp.lines().any(|line| line.starts_with("m=")) {
        return Err(NegotiationError::MalformedDescriptor(
            "no media sections".to_string(),
        ));
    }
    Ok(())
}

/// Media kinds advertised by a descriptor, in section order
pub fn media_kinds(sdp: &str) -> Vec<TrackKind> {
    sdp.lines()
        .filter_map(|line| {
            if line.starts_with("m=audio") {
                Some(TrackKind::Audio)
            } else if line.starts_with("m=video") {
                Some(TrackKind::Video)
            } else {
                None
            }
        })
        .collect()
}
