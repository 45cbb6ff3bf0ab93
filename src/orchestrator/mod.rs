//! Role orchestration
//!
//! The speaker and attendee flows, plus the outbound video source switch.
//! Both roles are driven the same way: construct, issue the role's verbs
//! (`join`, `watch`, `ask_question`, ...), and pump `next_event` to react
//! to what the gateway reports.

pub mod attendee;
pub mod speaker;
pub mod switch;

pub use attendee::{Attendee, AttendeeEvent, QuestionState};
pub use speaker::{Speaker, SpeakerEvent};
pub use switch::{SourceSwitcher, SwitchOutcome, VideoSource};

/// Why an event ended, from the embedder's point of view
///
/// All of these are fatal for the current session; the embedder is expected
/// to tear everything down and start fresh (the browser demos reload the
/// page).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The gateway session was destroyed
    SessionDestroyed,
    /// The audio mixing room was destroyed
    AudioRoomDestroyed,
    /// The video room was destroyed
    VideoRoomDestroyed,
}
