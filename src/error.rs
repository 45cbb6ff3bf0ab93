//! Crate error types
//!
//! All fallible operations return [`Result`]. Remote "already exists" replies
//! (room codes 486 and 427) are consumed by the provisioner and never surface
//! here.

use std::fmt;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum Error {
    /// The media engine reports no real-time media support. Fatal: nothing
    /// is created before this check passes.
    WebrtcUnsupported,
    /// Signaling transport failure (connect, attach, request, detach)
    Transport(TransportError),
    /// A plugin replied with an error the caller did not expect
    Plugin(RemoteError),
    /// Resource provisioning aborted
    Provision(ProvisionError),
    /// Capture or negotiation failure
    Media(MediaError),
    /// A reply arrived without the fields the exchange requires
    UnexpectedReply(String),
    /// An operation was invoked in a state that does not allow it
    InvalidState(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::WebrtcUnsupported => write!(f, "No WebRTC support"),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Plugin(e) => write!(f, "Plugin error: {}", e),
            Error::Provision(e) => write!(f, "Provisioning error: {}", e),
            Error::Media(e) => write!(f, "Media error: {}", e),
            Error::UnexpectedReply(what) => write!(f, "Unexpected reply: {}", what),
            Error::InvalidState(what) => write!(f, "Invalid state: {}", what),
        }
    }
}

impl std::error::Error for Error {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        Error::Plugin(e)
    }
}

impl From<ProvisionError> for Error {
    fn from(e: ProvisionError) -> Self {
        Error::Provision(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

/// Errors raised by the signaling transport itself
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Could not reach the gateway / create a session
    ConnectFailed(String),
    /// Attaching to a plugin failed
    AttachFailed(String),
    /// A request could not be delivered or produced no reply
    RequestFailed(String),
    /// The session is gone; the embedder should restart from scratch
    SessionDestroyed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectFailed(reason) => write!(f, "connect failed: {}", reason),
            TransportError::AttachFailed(reason) => {
                write!(f, "error attaching plugin: {}", reason)
            }
            TransportError::RequestFailed(reason) => write!(f, "request failed: {}", reason),
            TransportError::SessionDestroyed => write!(f, "session destroyed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// An error reply from a remote plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Numeric error code, when the plugin provided one
    pub code: Option<u64>,
    /// Human-readable reason
    pub reason: String,
}

impl RemoteError {
    /// Create a remote error
    pub fn new(code: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Check the numeric code
    pub fn is_code(&self, code: u64) -> bool {
        self.code == Some(code)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.reason, code),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Stage of the provisioning sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    /// Streaming mountpoint creation / info recovery
    Mountpoint,
    /// Audio room creation and forwarder setup
    AudioRoom,
    /// Video room creation
    VideoRoom,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStage::Mountpoint => write!(f, "mountpoint"),
            ProvisionStage::AudioRoom => write!(f, "audio room"),
            ProvisionStage::VideoRoom => write!(f, "video room"),
        }
    }
}

/// A provisioning stage failed and the sequence was aborted
///
/// Resources created by earlier stages are left in place: there is no
/// compensating rollback, the secret holder is expected to clean up.
#[derive(Debug, Clone)]
pub struct ProvisionError {
    /// The stage that failed
    pub stage: ProvisionStage,
    /// What went wrong
    pub source: Box<Error>,
}

impl ProvisionError {
    /// Wrap an error with the stage it occurred in
    pub fn new(stage: ProvisionStage, source: Error) -> Self {
        Self {
            stage,
            source: Box::new(source),
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.source)
    }
}

impl std::error::Error for ProvisionError {}

/// Capture and negotiation errors
#[derive(Debug, Clone)]
pub enum MediaError {
    /// Display or camera capture was denied or cancelled by the user
    CaptureDenied(String),
    /// Offer/answer negotiation failed
    NegotiationFailed(String),
    /// The operation needs a video track the stream does not have
    NoVideoTrack,
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::CaptureDenied(reason) => write!(f, "capture denied: {}", reason),
            MediaError::NegotiationFailed(reason) => {
                write!(f, "negotiation failed: {}", reason)
            }
            MediaError::NoVideoTrack => write!(f, "stream has no video track"),
        }
    }
}

impl std::error::Error for MediaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_code() {
        let err = RemoteError::new(Some(486), "Room already exists");
        assert!(err.is_code(486));
        assert!(!err.is_code(427));
        assert_eq!(err.to_string(), "Room already exists (code 486)");
    }

    #[test]
    fn test_provision_error_display() {
        let inner = Error::Plugin(RemoteError::new(None, "boom"));
        let err = ProvisionError::new(ProvisionStage::AudioRoom, inner);
        assert_eq!(err.to_string(), "audio room stage failed: Plugin error: boom");
    }
}
