//! Media collaborator surface
//!
//! Capture streams, session descriptions, and the traits the platform's
//! media engine implements. The crate never touches transport or codecs:
//! negotiation payloads stay opaque apart from the stereo flag.

pub mod engine;
pub mod sdp;
pub mod track;

pub use engine::{Direction, MediaEngine, MediaProfile, MediaSession};
pub use sdp::{SdpType, SessionDescription};
pub use track::{MediaStream, MediaTrack, TrackKind};
