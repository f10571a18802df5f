//! Local media acquisition and track toggles

use crate::domain::media::{MediaConstraints, MediaState, TrackKind};
use crate::domain::shared::error::MediaError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The local audio/video capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMediaSource {
    pub has_video: bool,
    pub has_audio: bool,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub constraints: MediaConstraints,
}

impl LocalMediaSource {
    pub fn new(constraints: MediaConstraints) -> Self {
        let has_video = constraints.wants_video();
        let has_audio = constraints.wants_audio();
        Self {
            has_video,
            has_audio,
            video_enabled: has_video,
            audio_enabled: has_audio,
            constraints,
        }
    }

    pub fn media_state(&self) -> MediaState {
        MediaState {
            video: self.has_video && self.video_enabled,
            audio: self.has_audio && self.audio_enabled,
        }
    }
}

/// Platform capture seam.
///
/// The engine never talks to capture devices directly; implementations bridge
/// to the host platform (or to a fixed device profile in tests and demos).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Attempt one acquisition with the given constraints
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMediaSource, MediaError>;

    /// Release a previously acquired source
    fn release(&self, source: &LocalMediaSource);
}

/// Controls the local capture source over a [`MediaBackend`]
pub struct LocalMediaController {
    backend: Arc<dyn MediaBackend>,
    source: Option<LocalMediaSource>,
}

impl LocalMediaController {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            source: None,
        }
    }

    pub fn source(&self) -> Option<&LocalMediaSource> {
        self.source.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.source.is_some()
    }

    pub fn media_state(&self) -> MediaState {
        self.source
            .as_ref()
            .map(LocalMediaSource::media_state)
            .unwrap_or(MediaState {
                video: false,
                audio: false,
            })
    }

    /// Acquire with a single set of constraints
    pub async fn acquire(&mut self, constraints: MediaConstraints) -> Result<MediaState, MediaError> {
        let source = self.backend.acquire(&constraints).await?;
        let state = source.media_state();
        self.source = Some(source);
        Ok(state)
    }

    /// Acquire walking the fallback ladder: preferred constraints, basic,
    /// reduced resolution, audio-only. Surfaces `NoDeviceAvailable` only
    /// after every rung fails.
    pub async fn acquire_with_fallback(
        &mut self,
        preferred: MediaConstraints,
    ) -> Result<MediaState, MediaError> {
        for constraints in MediaConstraints::fallback_ladder(preferred) {
            match self.backend.acquire(&constraints).await {
                Ok(source) => {
                    info!(
                        video = source.has_video,
                        audio = source.has_audio,
                        "local media acquired"
                    );
                    let state = source.media_state();
                    self.source = Some(source);
                    return Ok(state);
                }
                Err(err) => {
                    warn!(%err, ?constraints, "media acquisition attempt failed");
                }
            }
        }
        Err(MediaError::NoDeviceAvailable)
    }

    /// Enable or disable one track kind in place, without re-acquiring.
    ///
    /// Returns the resulting media state for the caller to announce.
    pub fn set_track_enabled(
        &mut self,
        kind: TrackKind,
        enabled: bool,
    ) -> Result<MediaState, MediaError> {
        let source = self.source.as_mut().ok_or(MediaError::NoDeviceAvailable)?;
        match kind {
            TrackKind::Video => source.video_enabled = enabled,
            TrackKind::Audio => source.audio_enabled = enabled,
        }
        debug!(kind = kind.as_str(), enabled, "local track toggled");
        Ok(source.media_state())
    }

    /// Flip one track kind, returning the new state
    pub fn toggle_track(&mut self, kind: TrackKind) -> Result<MediaState, MediaError> {
        let current = match (&self.source, kind) {
            (Some(source), TrackKind::Video) => source.video_enabled,
            (Some(source), TrackKind::Audio) => source.audio_enabled,
            (None, _) => return Err(MediaError::NoDeviceAvailable),
        };
        self.set_track_enabled(kind, !current)
    }

    /// Stop capture and drop the source
    pub fn release(&mut self) {
        if let Some(source) = self.source.take() {
            self.backend.release(&source);
            info!("local media released");
        }
    }
}

/// Backend bound to a fixed device profile.
///
/// Grants any constraint set the profile can satisfy; used by the demo binary
/// and integration tests.
#[derive(Debug, Clone)]
pub struct ProfileBackend {
    pub camera: bool,
    pub microphone: bool,
}

impl ProfileBackend {
    pub fn full() -> Self {
        Self {
            camera: true,
            microphone: true,
        }
    }

    pub fn audio_only() -> Self {
        Self {
            camera: false,
            microphone: true,
        }
    }
}

#[async_trait]
impl MediaBackend for ProfileBackend {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMediaSource, MediaError> {
        if constraints.wants_video() && !self.camera {
            return Err(MediaError::DeviceNotFound);
        }
        if constraints.wants_audio() && !self.microphone {
            return Err(MediaError::DeviceNotFound);
        }
        if !constraints.wants_video() && !constraints.wants_audio() {
            return Err(MediaError::ConstraintsUnsatisfiable);
        }
        Ok(LocalMediaSource::new(*constraints))
    }

    fn release(&self, _source: &LocalMediaSource) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    #[tokio::test]
    async fn fallback_ladder_stops_at_first_success() {
        let mut backend = MockMediaBackend::new();
        let mut attempt = 0;
        backend
            .expect_acquire()
            .with(always())
            .times(3)
            .returning(move |constraints| {
                attempt += 1;
                if attempt < 3 {
                    Err(MediaError::ConstraintsUnsatisfiable)
                } else {
                    Ok(LocalMediaSource::new(*constraints))
                }
            });

        let mut controller = LocalMediaController::new(Arc::new(backend));
        let state = controller
            .acquire_with_fallback(MediaConstraints::preferred())
            .await
            .unwrap();
        // Third rung still carries video (reduced resolution)
        assert!(state.video);
        assert!(state.audio);
    }

    #[tokio::test]
    async fn exhausted_ladder_surfaces_no_device_available() {
        let mut backend = MockMediaBackend::new();
        backend
            .expect_acquire()
            .times(4)
            .returning(|_| Err(MediaError::PermissionDenied));

        let mut controller = LocalMediaController::new(Arc::new(backend));
        let err = controller
            .acquire_with_fallback(MediaConstraints::preferred())
            .await
            .unwrap_err();
        assert_eq!(err, MediaError::NoDeviceAvailable);
        assert!(!controller.is_live());
    }

    #[tokio::test]
    async fn toggling_mutates_in_place_without_reacquiring() {
        let mut backend = MockMediaBackend::new();
        backend
            .expect_acquire()
            .times(1)
            .returning(|constraints| Ok(LocalMediaSource::new(*constraints)));
        backend.expect_release().times(1).return_const(());

        let mut controller = LocalMediaController::new(Arc::new(backend));
        controller
            .acquire(MediaConstraints::preferred())
            .await
            .unwrap();

        let state = controller.toggle_track(TrackKind::Video).unwrap();
        assert!(!state.video);
        assert!(state.audio);

        let state = controller.set_track_enabled(TrackKind::Video, true).unwrap();
        assert!(state.video);

        controller.release();
        assert!(!controller.is_live());
    }

    #[tokio::test]
    async fn profile_backend_without_camera_lands_on_audio_only_rung() {
        let mut controller = LocalMediaController::new(Arc::new(ProfileBackend::audio_only()));
        let state = controller
            .acquire_with_fallback(MediaConstraints::preferred())
            .await
            .unwrap();
        assert!(!state.video);
        assert!(state.audio);
    }

    #[test]
    fn toggle_without_source_fails() {
        let mut controller = LocalMediaController::new(Arc::new(ProfileBackend::full()));
        assert_eq!(
            controller.toggle_track(TrackKind::Audio).unwrap_err(),
            MediaError::NoDeviceAvailable
        );
    }
}
