//! Media engine collaborator traits
//!
//! The engine owns everything this crate treats as opaque: capability
//! detection, capture devices, and the actual WebRTC negotiation. The
//! orchestrators only decide *when* to negotiate and in which direction.

use crate::error::Result;

use super::sdp::SessionDescription;
use super::track::{MediaStream, MediaTrack};

/// Direction of one media kind within a negotiated session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Media kind is absent from the session
    Inactive,
    /// Send only
    SendOnly,
    /// Receive only
    RecvOnly,
    /// Send and receive
    SendRecv,
}

/// What a negotiated media session should carry, per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaProfile {
    /// Audio direction
    pub audio: Direction,
    /// Video direction
    pub video: Direction,
}

impl MediaProfile {
    /// Speaker video session: send-only video, audio travels separately
    pub fn video_publish() -> Self {
        Self {
            audio: Direction::Inactive,
            video: Direction::SendOnly,
        }
    }

    /// Speaker audio session: bidirectional audio with the mixing room
    pub fn audio_chat() -> Self {
        Self {
            audio: Direction::SendRecv,
            video: Direction::Inactive,
        }
    }

    /// Attendee question: contribute audio to the mixing room only
    pub fn question_audio() -> Self {
        Self {
            audio: Direction::SendOnly,
            video: Direction::Inactive,
        }
    }

    /// Attendee broadcast subscription: receive-only audio and video
    pub fn watch_only() -> Self {
        Self {
            audio: Direction::RecvOnly,
            video: Direction::RecvOnly,
        }
    }

    /// Whether the profile sends any media
    pub fn sends(&self) -> bool {
        matches!(self.audio, Direction::SendOnly | Direction::SendRecv)
            || matches!(self.video, Direction::SendOnly | Direction::SendRecv)
    }
}

/// One negotiated media session, bound to a single plugin attachment
///
/// Implementations wrap a peer connection. Closing is idempotent and also
/// happens on drop in well-behaved engines.
pub trait MediaSession: Send {
    /// Create a local offer for the given profile
    ///
    /// `local` carries an already-acquired capture stream to publish from;
    /// when `None`, the engine acquires whatever the profile needs.
    fn create_offer(
        &mut self,
        profile: MediaProfile,
        local: Option<&MediaStream>,
    ) -> impl std::future::Future<Output = Result<SessionDescription>> + Send;

    /// Answer a remote offer with the given profile
    fn create_answer(
        &mut self,
        offer: &SessionDescription,
        profile: MediaProfile,
    ) -> impl std::future::Future<Output = Result<SessionDescription>> + Send;

    /// Apply the remote half of the negotiation
    fn apply_remote(
        &mut self,
        desc: SessionDescription,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace the outbound video track in place, without renegotiating
    fn replace_video_track(
        &mut self,
        track: MediaTrack,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Mute or unmute the locally rendered remote audio of this session
    fn set_remote_audio_muted(&mut self, muted: bool);

    /// Tear the session down
    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

/// Factory and capture surface provided by the platform
pub trait MediaEngine: Send + Sync + 'static {
    /// The session type this engine negotiates
    type Session: MediaSession;

    /// Whether the platform supports real-time media at all
    ///
    /// Gates the entire flow: nothing is created when this is `false`.
    fn is_webrtc_supported(&self) -> bool;

    /// Acquire camera and microphone
    fn open_camera(&self) -> impl std::future::Future<Output = Result<MediaStream>> + Send;

    /// Acquire a display capture stream (video only)
    ///
    /// Fails when the user cancels the picker or denies permission.
    fn open_display(&self) -> impl std::future::Future<Output = Result<MediaStream>> + Send;

    /// Create a fresh, unnegotiated media session
    fn create_session(&self) -> Self::Session;
}
