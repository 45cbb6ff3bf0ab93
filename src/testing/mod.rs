//! In-memory collaborators for tests and demos
//!
//! [`LocalGateway`] emulates the media gateway's signaling surface: scripted
//! synchronous replies, automatic plugin events for the asynchronous flows,
//! failure injection, and full recording of everything a client sent.
//! [`LocalEngine`] stands in for the platform's media stack with deniable
//! capture and recorded negotiation.
//!
//! Neither moves real media; they exist so orchestration logic can be
//! exercised end to end on a plain event loop.

pub mod engine;
pub mod gateway;

pub use engine::{LocalEngine, LocalSession};
pub use gateway::{LocalGateway, RecordedMessage, RecordedRequest};
