//! Signaling layer
//!
//! Sessions, plugin attachments, and the typed wire messages exchanged with
//! the media gateway. The transport itself stays behind the
//! [`SignalingTransport`] trait.

pub mod message;
pub mod session;
pub mod transport;

pub use message::{
    MixerEvent, MixerRequest, MountpointStatus, Participant, StreamingEvent, StreamingRequest,
    VideoRoomEvent, VideoRoomRequest,
};
pub use session::{PluginHandle, Session};
pub use transport::{HandleEvent, HandleId, Plugin, SessionEvent, SessionId, SignalingTransport};
