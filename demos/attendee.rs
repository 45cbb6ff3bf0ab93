//! Attendee demo against the in-memory gateway
//!
//! Run with: cargo run --example attendee
//!
//! Watches the event's mountpoint, raises a hand to ask a question over the
//! audio room (muting the broadcast audio locally while the floor is held),
//! gives the floor back, and tears down.

use std::sync::Arc;

use livecast_rs::signaling::MountpointStatus;
use livecast_rs::testing::{LocalEngine, LocalGateway};
use livecast_rs::{Attendee, AttendeeEvent, LiveConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let gateway = Arc::new(LocalGateway::new());
    let engine = LocalEngine::new();

    // The display name is collected before watching: the audio room will
    // need it as soon as a question starts
    let mut attendee = Attendee::start(
        Arc::clone(&gateway),
        engine,
        LiveConfig::default(),
        "Carol",
    )
    .await?;

    attendee.watch().await?;
    while let Some(event) = attendee.next_event().await? {
        println!("event: {:?}", event);
        if event == AttendeeEvent::Status(MountpointStatus::Started) {
            break;
        }
    }

    // Raise a hand
    attendee.ask_question().await?;
    while let Some(event) = attendee.next_event().await? {
        println!("event: {:?}", event);
        if event == AttendeeEvent::QuestionOpen {
            break;
        }
    }
    println!("question state: {:?}", attendee.question_state());

    // Give the floor back
    attendee.end_question().await?;
    while let Some(event) = attendee.next_event().await? {
        println!("event: {:?}", event);
        if event == AttendeeEvent::QuestionClosed {
            break;
        }
    }

    attendee.stop().await?;
    Ok(())
}
