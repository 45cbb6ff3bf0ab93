//! Capture stream and track handles
//!
//! These are thin, cheap-to-clone handles over capture devices owned by the
//! media engine. Stopping a track is idempotent; `stop()` reports whether the
//! call actually performed the stop, so callers can assert a device was
//! released exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    stopped: AtomicBool,
}

/// Handle to a single capture track
///
/// Clones share the same underlying device state.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a new live track
    pub fn new(kind: TrackKind, id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                kind,
                label: label.into(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Track identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Kind of media this track carries
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Human-readable device label
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the track is still capturing
    pub fn is_live(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stop the track, releasing the capture device
    ///
    /// Returns `true` if this call performed the stop, `false` if the track
    /// was already stopped.
    pub fn stop(&self) -> bool {
        !self.inner.stopped.swap(true, Ordering::AcqRel)
    }
}

/// A set of tracks acquired together (one capture request)
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// Create a stream from its tracks
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Stream identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks in the stream
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// The first video track, if any
    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Video)
    }

    /// The first audio track, if any
    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Audio)
    }

    /// Stop every track in the stream
    ///
    /// Returns how many tracks this call actually stopped.
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let track = MediaTrack::new(TrackKind::Video, "v0", "screen");

        assert!(track.is_live());
        assert!(track.stop());
        assert!(!track.is_live());
        // Second stop is a no-op
        assert!(!track.stop());
    }

    #[test]
    fn test_stop_shared_across_clones() {
        let track = MediaTrack::new(TrackKind::Audio, "a0", "mic");
        let clone = track.clone();

        assert!(track.stop());
        assert!(!clone.is_live());
        assert!(!clone.stop());
    }

    #[test]
    fn test_stream_track_lookup() {
        let stream = MediaStream::new(
            "cam",
            vec![
                MediaTrack::new(TrackKind::Audio, "a0", "mic"),
                MediaTrack::new(TrackKind::Video, "v0", "webcam"),
            ],
        );

        assert_eq!(stream.audio_track().map(|t| t.id()), Some("a0"));
        assert_eq!(stream.video_track().map(|t| t.id()), Some("v0"));
    }

    #[test]
    fn test_stop_all_counts_once() {
        let stream = MediaStream::new(
            "screen",
            vec![MediaTrack::new(TrackKind::Video, "v0", "display")],
        );

        assert_eq!(stream.stop_all(), 1);
        assert_eq!(stream.stop_all(), 0);
    }
}
