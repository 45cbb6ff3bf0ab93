//! Speaker demo against the in-memory gateway
//!
//! Run with: cargo run --example speaker
//!
//! Provisions the event's resources, joins both rooms, goes live, switches
//! the outbound video to a screen capture and back, then tears down. The
//! gateway and media engine are the in-memory stand-ins from
//! `livecast_rs::testing`; point the same flow at a real transport
//! implementation to drive an actual gateway.

use std::sync::Arc;

use livecast_rs::testing::{LocalEngine, LocalGateway};
use livecast_rs::{LiveConfig, Speaker, SpeakerEvent, SwitchOutcome, VideoSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let gateway = Arc::new(LocalGateway::new());
    let engine = LocalEngine::new();

    // Capability check, session, camera, and the three provisioning stages
    let mut speaker = Speaker::start(Arc::clone(&gateway), engine, LiveConfig::default()).await?;
    let mountpoint = speaker.mountpoint();
    println!(
        "Provisioned: mountpoint {} (audio {}, video {}, rtcp {})",
        mountpoint.id, mountpoint.audio_port, mountpoint.video_port, mountpoint.rtcp_port
    );

    // In the browser demo this is where the speaker types their name
    speaker.join("Alice").await?;

    // Pump events until the broadcast is live
    while let Some(event) = speaker.next_event().await? {
        println!("event: {:?}", event);
        if event == SpeakerEvent::Live {
            break;
        }
    }

    // Share the screen, then go back to the webcam
    let outcome = speaker.switch_source(VideoSource::Screen).await?;
    println!("switch to screen: {:?}", outcome);
    assert_eq!(outcome, SwitchOutcome::Switched);
    let outcome = speaker.switch_source(VideoSource::Screen).await?;
    println!("switch to screen again: {:?}", outcome);
    let outcome = speaker.switch_source(VideoSource::Webcam).await?;
    println!("switch back to webcam: {:?}", outcome);

    speaker.stop().await?;

    println!("--- requests the gateway saw ---");
    for request in gateway.recorded_requests() {
        println!("{} {}", request.plugin, request.request);
    }
    Ok(())
}
