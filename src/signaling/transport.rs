//! Signaling transport collaborator
//!
//! The transport is the crate's boundary with the media gateway: it carries
//! synchronous request/response exchanges and delivers asynchronous plugin
//! events. How the bytes move (WebSocket, long-polled HTTP) is its business.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::media::SessionDescription;

/// Identifier of one gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one plugin attachment within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The gateway plugins this crate talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plugin {
    /// One-way broadcast mountpoints
    Streaming,
    /// Mixed audio rooms
    AudioMixer,
    /// Selective-forwarding video rooms
    VideoRoom,
}

impl Plugin {
    /// Wire name of the plugin
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Streaming => "gateway.plugin.streaming",
            Plugin::AudioMixer => "gateway.plugin.audiomixer",
            Plugin::VideoRoom => "gateway.plugin.videoroom",
        }
    }
}

impl std::fmt::Display for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Asynchronous event delivered on a plugin attachment
#[derive(Debug, Clone)]
pub enum HandleEvent {
    /// A plugin message, possibly carrying a negotiation payload
    Message {
        /// Plugin-specific body
        data: Value,
        /// Offer or answer riding along with the message
        jsep: Option<SessionDescription>,
    },
    /// The platform is showing (or hiding) a capture consent dialog
    ConsentDialog {
        /// Dialog visible
        on: bool,
    },
    /// Connectivity of the attachment's media session changed
    WebrtcState {
        /// Peer connection established
        up: bool,
    },
    /// The attachment's media session was torn down
    Cleanup,
    /// The attachment itself is gone
    Detached,
}

/// Session-wide event
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session was destroyed, locally or by the gateway
    Destroyed,
    /// The transport failed; the session is unusable
    Error(String),
}

/// Connection to the media gateway
///
/// All methods are asynchronous requests resolved by the gateway; there is no
/// cancellation and no client-side timeout. A gateway that never answers
/// leaves the caller waiting, by design.
pub trait SignalingTransport: Send + Sync + 'static {
    /// Create a gateway session
    fn connect(
        &self,
    ) -> impl std::future::Future<Output = Result<(SessionId, mpsc::Receiver<SessionEvent>)>> + Send;

    /// Attach to a plugin, returning the handle and its event stream
    fn attach(
        &self,
        session: SessionId,
        plugin: Plugin,
        opaque_id: &str,
    ) -> impl std::future::Future<Output = Result<(HandleId, mpsc::Receiver<HandleEvent>)>> + Send;

    /// Send a synchronous request and wait for the plugin's reply
    fn request(
        &self,
        session: SessionId,
        handle: HandleId,
        body: Value,
    ) -> impl std::future::Future<Output = Result<Value>> + Send;

    /// Send an asynchronous message; results arrive as [`HandleEvent`]s
    fn message(
        &self,
        session: SessionId,
        handle: HandleId,
        body: Value,
        jsep: Option<SessionDescription>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Detach from a plugin, closing any media session it carries
    fn detach(
        &self,
        session: SessionId,
        handle: HandleId,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Destroy the session and everything attached to it
    fn destroy(&self, session: SessionId) -> impl std::future::Future<Output = Result<()>> + Send;
}
