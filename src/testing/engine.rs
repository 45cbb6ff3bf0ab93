//! Recording media engine stand-in

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{MediaError, Result};
use crate::media::{
    MediaEngine, MediaProfile, MediaSession, MediaStream, MediaTrack, SessionDescription, TrackKind,
};

const OFFER_SDP: &str = "v=0\r\no=- 3 3 IN IP4 127.0.0.1\r\ns=local\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=fmtp:111 useinbandfec=1\r\n";

const LOCAL_ANSWER_SDP: &str = "v=0\r\no=- 4 4 IN IP4 127.0.0.1\r\ns=local\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\na=fmtp:111 useinbandfec=1\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n";

#[derive(Default)]
struct EngineInner {
    supported: bool,
    deny_display: Option<String>,
    camera_opens: usize,
    display_opens: usize,
    last_display: Option<MediaStream>,
    sessions: Vec<LocalSession>,
    next_stream: u64,
}

/// Media engine stand-in with deniable capture and recorded negotiation
#[derive(Clone)]
pub struct LocalEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl LocalEngine {
    /// Create an engine that supports real-time media
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                supported: true,
                ..EngineInner::default()
            })),
        }
    }

    /// Toggle the capability check
    pub fn set_webrtc_supported(&self, supported: bool) {
        self.lock().supported = supported;
    }

    /// Make display capture fail, as if the user dismissed the picker
    pub fn deny_display(&self, reason: &str) {
        self.lock().deny_display = Some(reason.to_string());
    }

    /// How many camera captures were requested
    pub fn camera_opens(&self) -> usize {
        self.lock().camera_opens
    }

    /// How many display captures were requested
    pub fn display_opens(&self) -> usize {
        self.lock().display_opens
    }

    /// The display stream most recently handed out
    pub fn last_display_stream(&self) -> Option<MediaStream> {
        self.lock().last_display.clone()
    }

    /// Every media session this engine created, in creation order
    pub fn sessions(&self) -> Vec<LocalSession> {
        self.lock().sessions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().expect("engine state poisoned")
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for LocalEngine {
    type Session = LocalSession;

    fn is_webrtc_supported(&self) -> bool {
        self.lock().supported
    }

    async fn open_camera(&self) -> Result<MediaStream> {
        let mut inner = self.lock();
        inner.camera_opens += 1;
        inner.next_stream += 1;
        let n = inner.next_stream;
        Ok(MediaStream::new(
            format!("camera-{}", n),
            vec![
                MediaTrack::new(TrackKind::Audio, format!("camera-audio-{}", n), "mic"),
                MediaTrack::new(TrackKind::Video, format!("camera-video-{}", n), "webcam"),
            ],
        ))
    }

    async fn open_display(&self) -> Result<MediaStream> {
        let mut inner = self.lock();
        if let Some(reason) = inner.deny_display.clone() {
            return Err(MediaError::CaptureDenied(reason).into());
        }
        inner.display_opens += 1;
        inner.next_stream += 1;
        let n = inner.next_stream;
        let stream = MediaStream::new(
            format!("display-{}", n),
            vec![MediaTrack::new(
                TrackKind::Video,
                format!("display-video-{}", n),
                "screen",
            )],
        );
        inner.last_display = Some(stream.clone());
        Ok(stream)
    }

    fn create_session(&self) -> LocalSession {
        let session = LocalSession::new();
        self.lock().sessions.push(session.clone());
        session
    }
}

#[derive(Default)]
struct SessionInner {
    offers: Vec<MediaProfile>,
    answers: Vec<MediaProfile>,
    applied: Vec<SessionDescription>,
    replaced: Vec<String>,
    remote_muted: bool,
    closed: bool,
}

/// Recording media session; clones observe the same state
#[derive(Clone)]
pub struct LocalSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl LocalSession {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner::default())),
        }
    }

    /// How many offers this session produced
    pub fn offer_count(&self) -> usize {
        self.lock().offers.len()
    }

    /// How many answers this session produced
    pub fn answer_count(&self) -> usize {
        self.lock().answers.len()
    }

    /// How many remote descriptions were applied
    pub fn applied_count(&self) -> usize {
        self.lock().applied.len()
    }

    /// Track identifiers passed to `replace_video_track`, in order
    pub fn replaced_tracks(&self) -> Vec<String> {
        self.lock().replaced.clone()
    }

    /// Whether the locally rendered remote audio is muted
    pub fn remote_audio_muted(&self) -> bool {
        self.lock().remote_muted
    }

    /// Whether the session was closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session state poisoned")
    }
}

impl MediaSession for LocalSession {
    async fn create_offer(
        &mut self,
        profile: MediaProfile,
        _local: Option<&MediaStream>,
    ) -> Result<SessionDescription> {
        self.lock().offers.push(profile);
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn create_answer(
        &mut self,
        _offer: &SessionDescription,
        profile: MediaProfile,
    ) -> Result<SessionDescription> {
        self.lock().answers.push(profile);
        Ok(SessionDescription::answer(LOCAL_ANSWER_SDP))
    }

    async fn apply_remote(&mut self, desc: SessionDescription) -> Result<()> {
        self.lock().applied.push(desc);
        Ok(())
    }

    async fn replace_video_track(&mut self, track: MediaTrack) -> Result<()> {
        self.lock().replaced.push(track.id().to_string());
        Ok(())
    }

    fn set_remote_audio_muted(&mut self, muted: bool) {
        self.lock().remote_muted = muted;
    }

    async fn close(&mut self) {
        self.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_capture_and_denial() {
        let engine = LocalEngine::new();

        let camera = assert_ok!(engine.open_camera().await);
        assert!(camera.audio_track().is_some());
        assert!(camera.video_track().is_some());
        assert_eq!(engine.camera_opens(), 1);

        engine.deny_display("denied");
        let err = engine.open_display().await.err().expect("should fail");
        assert!(matches!(
            err,
            crate::error::Error::Media(MediaError::CaptureDenied(_))
        ));
        assert_eq!(engine.display_opens(), 0);
    }

    #[tokio::test]
    async fn test_session_records_negotiation() {
        let engine = LocalEngine::new();
        let mut session = engine.create_session();

        session
            .create_offer(MediaProfile::audio_chat(), None)
            .await
            .unwrap();
        session
            .apply_remote(SessionDescription::answer("v=0"))
            .await
            .unwrap();

        let observer = &engine.sessions()[0];
        assert_eq!(observer.offer_count(), 1);
        assert_eq!(observer.applied_count(), 1);
        assert!(!observer.is_closed());
    }
}
