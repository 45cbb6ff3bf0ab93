//! Outbound video source switching
//!
//! The speaker publishes either the webcam or a display capture, never both.
//! Switching replaces the track on the outbound video sender in place, so
//! the session is not renegotiated and the audio path is untouched. The
//! camera stream stays open across a screen share; the screen stream is
//! released as soon as the speaker switches back.

use crate::error::{MediaError, Result};
use crate::media::{MediaEngine, MediaSession, MediaStream};

/// Active outbound video source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    /// The camera stream acquired at startup
    Webcam,
    /// A display capture stream
    Screen,
}

/// Result of a switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The source changed
    Switched,
    /// The requested source was already active; nothing was done
    Unchanged,
}

/// Owns the capture streams behind the outbound video sender
#[derive(Debug)]
pub struct SourceSwitcher {
    current: VideoSource,
    camera: MediaStream,
    screen: Option<MediaStream>,
}

impl SourceSwitcher {
    /// Start from the camera stream acquired at startup
    pub fn new(camera: MediaStream) -> Self {
        Self {
            current: VideoSource::Webcam,
            camera,
            screen: None,
        }
    }

    /// The currently active source
    pub fn current(&self) -> VideoSource {
        self.current
    }

    /// The camera stream the switcher keeps open
    pub fn camera(&self) -> &MediaStream {
        &self.camera
    }

    /// Switch the outbound video to `target`
    ///
    /// A request for the already-active source is a no-op. A failed display
    /// capture (picker cancelled, permission denied) leaves the current
    /// source untouched.
    pub async fn switch_to<E, S>(
        &mut self,
        engine: &E,
        peer: &mut S,
        target: VideoSource,
    ) -> Result<SwitchOutcome>
    where
        E: MediaEngine,
        S: MediaSession,
    {
        if target == self.current {
            return Ok(SwitchOutcome::Unchanged);
        }

        match target {
            VideoSource::Screen => {
                let stream = engine.open_display().await?;
                let track = match stream.video_track() {
                    Some(track) => track.clone(),
                    None => {
                        stream.stop_all();
                        return Err(MediaError::NoVideoTrack.into());
                    }
                };
                if let Err(e) = peer.replace_video_track(track).await {
                    // Don't leave the fresh capture running with no sender
                    stream.stop_all();
                    return Err(e);
                }
                self.screen = Some(stream);
                self.current = VideoSource::Screen;
                tracing::info!("Outbound video switched to screen");
            }
            VideoSource::Webcam => {
                // The camera track was never stopped, reuse it
                let track = self
                    .camera
                    .video_track()
                    .ok_or(MediaError::NoVideoTrack)?
                    .clone();
                peer.replace_video_track(track).await?;
                if let Some(screen) = self.screen.take() {
                    // A later share should pick a fresh surface, so the old
                    // capture is released entirely
                    let stopped = screen.stop_all();
                    tracing::debug!(tracks = stopped, "Screen capture released");
                }
                self.current = VideoSource::Webcam;
                tracing::info!("Outbound video switched back to webcam");
            }
        }

        Ok(SwitchOutcome::Switched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaEngine;
    use crate::testing::LocalEngine;

    async fn setup() -> (LocalEngine, SourceSwitcher, crate::testing::LocalSession) {
        let engine = LocalEngine::new();
        let camera = engine.open_camera().await.unwrap();
        let switcher = SourceSwitcher::new(camera);
        let peer = engine.create_session();
        (engine, switcher, peer)
    }

    #[tokio::test]
    async fn test_switch_to_screen_and_back() {
        let (engine, mut switcher, mut peer) = setup().await;

        let outcome = switcher
            .switch_to(&engine, &mut peer, VideoSource::Screen)
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched);
        assert_eq!(switcher.current(), VideoSource::Screen);

        let outcome = switcher
            .switch_to(&engine, &mut peer, VideoSource::Webcam)
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched);
        assert_eq!(switcher.current(), VideoSource::Webcam);

        // One replacement per switch
        assert_eq!(peer.replaced_tracks().len(), 2);
    }

    #[tokio::test]
    async fn test_switch_is_idempotent() {
        let (engine, mut switcher, mut peer) = setup().await;

        let outcome = switcher
            .switch_to(&engine, &mut peer, VideoSource::Webcam)
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Unchanged);
        assert_eq!(engine.display_opens(), 0);
        assert!(peer.replaced_tracks().is_empty());

        switcher
            .switch_to(&engine, &mut peer, VideoSource::Screen)
            .await
            .unwrap();
        let outcome = switcher
            .switch_to(&engine, &mut peer, VideoSource::Screen)
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Unchanged);
        assert_eq!(engine.display_opens(), 1);
    }

    #[tokio::test]
    async fn test_screen_tracks_stopped_exactly_once() {
        let (engine, mut switcher, mut peer) = setup().await;

        switcher
            .switch_to(&engine, &mut peer, VideoSource::Screen)
            .await
            .unwrap();
        let screen = engine.last_display_stream().unwrap();

        switcher
            .switch_to(&engine, &mut peer, VideoSource::Webcam)
            .await
            .unwrap();

        // Every screen track stopped, and a second stop would be a no-op
        assert!(screen.tracks().iter().all(|t| !t.is_live()));
        assert_eq!(screen.stop_all(), 0);

        // The camera stream is still capturing
        assert!(switcher.camera().tracks().iter().all(|t| t.is_live()));
    }

    #[tokio::test]
    async fn test_denied_capture_leaves_source_unchanged() {
        let (engine, mut switcher, mut peer) = setup().await;
        engine.deny_display("picker dismissed");

        let err = switcher
            .switch_to(&engine, &mut peer, VideoSource::Screen)
            .await
            .err()
            .expect("capture should fail");

        assert!(matches!(
            err,
            crate::error::Error::Media(MediaError::CaptureDenied(_))
        ));
        assert_eq!(switcher.current(), VideoSource::Webcam);
        assert!(peer.replaced_tracks().is_empty());
    }
}
