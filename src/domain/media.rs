//! Media model: track kinds, per-participant media state, capture constraints

use serde::{Deserialize, Serialize};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// A remote media track surfaced by the peer connection layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Enabled/disabled flags for a participant's tracks, as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Video capture constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub max_width: u32,
    pub ideal_height: u32,
    pub max_height: u32,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            max_width: 1920,
            ideal_height: 720,
            max_height: 1080,
            ideal_frame_rate: 30,
            max_frame_rate: 60,
        }
    }
}

impl VideoConstraints {
    /// Reduced-resolution constraints used while falling back
    pub fn reduced() -> Self {
        Self {
            ideal_width: 640,
            max_width: 640,
            ideal_height: 480,
            max_height: 480,
            ideal_frame_rate: 30,
            max_frame_rate: 30,
        }
    }

    /// Unconstrained capture ("just give me a camera")
    pub fn basic() -> Self {
        Self {
            ideal_width: 0,
            max_width: 0,
            ideal_height: 0,
            max_height: 0,
            ideal_frame_rate: 0,
            max_frame_rate: 0,
        }
    }
}

/// Audio capture constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Capture constraints for local media acquisition.
///
/// `None` for a kind means that kind is not requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: Option<AudioConstraints>,
}

impl MediaConstraints {
    /// Preferred audio+video constraints
    pub fn preferred() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: Some(AudioConstraints::default()),
        }
    }

    /// Fallback ladder tried in order until one acquisition succeeds:
    /// preferred, basic, reduced resolution, audio-only.
    pub fn fallback_ladder(preferred: MediaConstraints) -> Vec<MediaConstraints> {
        vec![
            preferred,
            Self {
                video: Some(VideoConstraints::basic()),
                audio: Some(AudioConstraints::default()),
            },
            Self {
                video: Some(VideoConstraints::reduced()),
                audio: Some(AudioConstraints::default()),
            },
            Self {
                video: None,
                audio: Some(AudioConstraints::default()),
            },
        ]
    }

    pub fn wants_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn wants_audio(&self) -> bool {
        self.audio.is_some()
    }
}
