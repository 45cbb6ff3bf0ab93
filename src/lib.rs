//! Client-side orchestration for plugin-based WebRTC live events
//!
//! A live event here is one speaker broadcasting audio/video to an audience
//! that can ask questions over a mixed audio room. The media gateway hosts
//! three server-side resources — a streaming mountpoint, an audio mixing
//! room, and a video room — and this crate sequences their creation, the
//! per-role signaling, and the speaker's camera/screen switching. WebRTC
//! itself (ICE, DTLS, SRTP, mixing, forwarding) lives behind the
//! [`SignalingTransport`] and [`media::MediaEngine`] collaborator traits.
//!
//! # Roles
//!
//! The [`Speaker`] provisions the resources, joins both rooms, publishes
//! send-only video and bidirectional audio, and has the gateway forward the
//! broadcast into the mountpoint. The [`Attendee`] watches the mountpoint
//! and can temporarily join the audio room to ask a question.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use livecast_rs::testing::{LocalEngine, LocalGateway};
//! use livecast_rs::{LiveConfig, Speaker};
//!
//! # async fn example() -> livecast_rs::Result<()> {
//! let gateway = Arc::new(LocalGateway::new());
//! let engine = LocalEngine::new();
//!
//! let mut speaker = Speaker::start(gateway, engine, LiveConfig::default()).await?;
//! speaker.join("Alice").await?;
//!
//! while let Some(event) = speaker.next_event().await? {
//!     println!("event: {:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod provision;
pub mod signaling;
pub mod testing;

pub use config::LiveConfig;
pub use error::{Error, Result};
pub use orchestrator::{
    Attendee, AttendeeEvent, EndReason, QuestionState, SourceSwitcher, Speaker, SpeakerEvent,
    SwitchOutcome, VideoSource,
};
pub use provision::{MountpointInfo, Provisioned, Provisioner};
pub use signaling::{Plugin, PluginHandle, Session, SignalingTransport};
