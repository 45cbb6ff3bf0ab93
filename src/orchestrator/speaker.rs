//! Speaker orchestration
//!
//! The speaker provisions the event's resources, joins the audio and video
//! rooms under one display name, and negotiates two independent media
//! sessions: send-only video into the video room and bidirectional audio
//! with the mixing room. Once the video session's connectivity is up, the
//! publisher's video is RTP-forwarded to the mountpoint exactly once.
//!
//! Forwarding from the client is a deliberate trust boundary of this demo
//! flow: the request makes the gateway emit UDP toward an arbitrary
//! destination, so production deployments must issue it from an authorized
//! server-side component instead.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::LiveConfig;
use crate::error::{Error, Result};
use crate::media::{MediaEngine, MediaProfile, MediaSession};
use crate::provision::{MountpointInfo, Provisioner};
use crate::signaling::message::{self, MixerEvent, MixerRequest, VideoRoomEvent, VideoRoomRequest};
use crate::signaling::{
    HandleEvent, Plugin, PluginHandle, Session, SessionEvent, SignalingTransport,
};

use super::switch::{SourceSwitcher, SwitchOutcome, VideoSource};
use super::EndReason;

/// Events the speaker surfaces to the embedder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakerEvent {
    /// Joined the video room as a publisher
    VideoJoined {
        /// Room identifier
        room: u64,
        /// Our publisher identifier
        id: u64,
    },
    /// Joined the audio mixing room
    AudioJoined {
        /// Room identifier
        room: u64,
        /// Our participant identifier
        id: u64,
    },
    /// Video connectivity is up and the broadcast forward was issued
    Live,
    /// The gateway rejected our published audio; viewers won't hear us
    AudioRejected,
    /// The gateway rejected our published video; viewers won't see us
    VideoRejected,
    /// An attendee's audio went active in the mixing room
    QuestionStarted {
        /// Participant identifier
        id: u64,
        /// Display name
        display: String,
    },
    /// A previously active attendee left the mixing room
    QuestionEnded {
        /// Participant identifier
        id: u64,
        /// Display name
        display: String,
    },
    /// The platform is showing (or hiding) a capture consent dialog
    ConsentDialog {
        /// Plugin whose media session asked for consent
        plugin: Plugin,
        /// Dialog visible
        on: bool,
    },
    /// The event is over; the embedder should tear down and start fresh
    Ended(EndReason),
}

/// Drives the speaker side of a live event
pub struct Speaker<T: SignalingTransport, E: MediaEngine> {
    config: LiveConfig,
    engine: E,
    session: Session<T>,
    mountpoint: MountpointInfo,
    mixer: PluginHandle<T>,
    video_room: PluginHandle<T>,
    video_peer: Option<E::Session>,
    video_profile: MediaProfile,
    audio_peer: Option<E::Session>,
    switcher: SourceSwitcher,
    publisher_id: Option<u64>,
    audio_started: bool,
    forwarded: bool,
    questions: HashMap<u64, String>,
    pending: std::collections::VecDeque<SpeakerEvent>,
    ended: bool,
}

impl<T: SignalingTransport, E: MediaEngine> Speaker<T, E> {
    /// Check capabilities, create the session, and provision the event
    ///
    /// Returns once all three resources exist; the embedder then prompts
    /// for a display name and calls [`Speaker::join`].
    pub async fn start(transport: Arc<T>, engine: E, config: LiveConfig) -> Result<Self> {
        if !engine.is_webrtc_supported() {
            return Err(Error::WebrtcUnsupported);
        }

        let session =
            Session::connect(transport, format!("{}-speaker", config.opaque_prefix)).await?;

        // The camera stays open for the whole event; the switcher hands its
        // video track back to the sender after a screen share ends
        let camera = engine.open_camera().await?;

        let provisioned = Provisioner::new(&session, &config).provision().await?;

        Ok(Self {
            config,
            engine,
            session,
            mountpoint: provisioned.mountpoint,
            mixer: provisioned.mixer,
            video_room: provisioned.video_room,
            video_peer: None,
            video_profile: MediaProfile::video_publish(),
            audio_peer: None,
            switcher: SourceSwitcher::new(camera),
            publisher_id: None,
            audio_started: false,
            forwarded: false,
            questions: HashMap::new(),
            pending: std::collections::VecDeque::new(),
            ended: false,
        })
    }

    /// The mountpoint attendees watch
    pub fn mountpoint(&self) -> &MountpointInfo {
        &self.mountpoint
    }

    /// Our publisher identifier in the video room, once joined
    pub fn publisher_id(&self) -> Option<u64> {
        self.publisher_id
    }

    /// The currently active outbound video source
    pub fn video_source(&self) -> VideoSource {
        self.switcher.current()
    }

    /// Join both rooms under one display name
    pub async fn join(&mut self, display: impl Into<String>) -> Result<()> {
        let display = display.into();
        let display_name = &display;
        tracing::info!(display = %display_name, "Joining rooms");
        self.video_room
            .message(
                &VideoRoomRequest::join_publisher(&self.config, display.clone()),
                None,
            )
            .await?;
        self.mixer
            .message(&MixerRequest::join(&self.config, display), None)
            .await?;
        Ok(())
    }

    /// Wait for the next reportable event
    ///
    /// Internal signaling (negotiation answers, duplicate joins, redundant
    /// connectivity notifications) is consumed silently. Returns `None`
    /// once the session is over.
    pub async fn next_event(&mut self) -> Result<Option<SpeakerEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.ended {
                return Ok(None);
            }

            enum Incoming {
                Video(HandleEvent),
                Mixer(HandleEvent),
                Session(SessionEvent),
                Closed,
            }

            let incoming = tokio::select! {
                ev = self.video_room.recv() => ev.map_or(Incoming::Closed, Incoming::Video),
                ev = self.mixer.recv() => ev.map_or(Incoming::Closed, Incoming::Mixer),
                ev = self.session.recv() => ev.map_or(Incoming::Closed, Incoming::Session),
            };

            match incoming {
                Incoming::Video(ev) => self.on_video_event(ev).await?,
                Incoming::Mixer(ev) => self.on_mixer_event(ev).await?,
                Incoming::Session(SessionEvent::Destroyed) => {
                    self.ended = true;
                    self.pending
                        .push_back(SpeakerEvent::Ended(EndReason::SessionDestroyed));
                }
                Incoming::Session(SessionEvent::Error(reason)) => {
                    self.ended = true;
                    return Err(crate::error::TransportError::RequestFailed(reason).into());
                }
                Incoming::Closed => {
                    // Flush anything already queued before reporting the end
                    self.ended = true;
                }
            }
        }
    }

    /// Switch the outbound video between webcam and screen capture
    ///
    /// Valid once the video session is negotiated. Idempotent: requesting
    /// the active source does nothing.
    pub async fn switch_source(&mut self, target: VideoSource) -> Result<SwitchOutcome> {
        let peer = self
            .video_peer
            .as_mut()
            .ok_or(Error::InvalidState("video session not negotiated yet"))?;
        self.switcher.switch_to(&self.engine, peer, target).await
    }

    /// End the event: close media sessions and destroy the gateway session
    pub async fn stop(mut self) -> Result<()> {
        if let Some(mut peer) = self.video_peer.take() {
            peer.close().await;
        }
        if let Some(mut peer) = self.audio_peer.take() {
            peer.close().await;
        }
        self.session.destroy().await
    }

    async fn on_video_event(&mut self, ev: HandleEvent) -> Result<()> {
        match ev {
            HandleEvent::Message { data, jsep } => {
                for event in message::parse_video_room_events(&data) {
                    match event {
                        VideoRoomEvent::Joined { room, id } => {
                            tracing::info!(room, id, "Joined video room");
                            self.publisher_id = Some(id);
                            self.publish_video().await?;
                            self.pending.push_back(SpeakerEvent::VideoJoined { room, id });
                        }
                        VideoRoomEvent::Destroyed { room } => {
                            tracing::warn!(room, "Video room destroyed");
                            self.ended = true;
                            self.pending
                                .push_back(SpeakerEvent::Ended(EndReason::VideoRoomDestroyed));
                        }
                        VideoRoomEvent::Codecs { audio, video } => {
                            self.check_rejections(audio, video);
                        }
                    }
                }
                if let Some(jsep) = jsep {
                    if let Some(peer) = self.video_peer.as_mut() {
                        peer.apply_remote(jsep).await?;
                    }
                }
            }
            HandleEvent::WebrtcState { up: true } => self.forward_video().await?,
            HandleEvent::WebrtcState { up: false } => {
                tracing::debug!("Video connectivity down");
            }
            HandleEvent::ConsentDialog { on } => {
                self.pending.push_back(SpeakerEvent::ConsentDialog {
                    plugin: Plugin::VideoRoom,
                    on,
                });
            }
            HandleEvent::Cleanup => {
                tracing::info!("Video session cleaned up, we are unpublished");
                self.video_peer = None;
            }
            HandleEvent::Detached => {
                tracing::debug!("Video room handle detached");
            }
        }
        Ok(())
    }

    async fn on_mixer_event(&mut self, ev: HandleEvent) -> Result<()> {
        match ev {
            HandleEvent::Message { data, jsep } => {
                for event in message::parse_mixer_events(&data) {
                    match event {
                        MixerEvent::Joined { room, id } => {
                            tracing::info!(room, id, "Joined audio room");
                            // A repeated join confirmation must not spawn a
                            // second audio session
                            if !self.audio_started {
                                self.audio_started = true;
                                self.publish_audio().await?;
                                self.pending.push_back(SpeakerEvent::AudioJoined { room, id });
                            }
                        }
                        MixerEvent::Destroyed { room } => {
                            tracing::warn!(room, "Audio room destroyed");
                            self.ended = true;
                            self.pending
                                .push_back(SpeakerEvent::Ended(EndReason::AudioRoomDestroyed));
                        }
                        MixerEvent::ParticipantUpdate(participant) => {
                            self.on_participant(participant);
                        }
                        MixerEvent::Leaving { id } => {
                            if let Some(display) = self.questions.remove(&id) {
                                let display_name = &display;
                                tracing::info!(id, display = %display_name, "Question over");
                                self.pending
                                    .push_back(SpeakerEvent::QuestionEnded { id, display });
                            }
                        }
                    }
                }
                if let Some(jsep) = jsep {
                    if let Some(peer) = self.audio_peer.as_mut() {
                        peer.apply_remote(jsep).await?;
                    }
                }
            }
            HandleEvent::WebrtcState { up } => {
                tracing::debug!(up, "Audio connectivity changed");
            }
            HandleEvent::ConsentDialog { on } => {
                self.pending.push_back(SpeakerEvent::ConsentDialog {
                    plugin: Plugin::AudioMixer,
                    on,
                });
            }
            HandleEvent::Cleanup => {
                tracing::info!("Audio session cleaned up");
                self.audio_started = false;
                self.audio_peer = None;
            }
            HandleEvent::Detached => {
                tracing::debug!("Mixer handle detached");
            }
        }
        Ok(())
    }

    /// Negotiate the send-only video session
    async fn publish_video(&mut self) -> Result<()> {
        let mut peer = self.engine.create_session();
        let offer = peer
            .create_offer(self.video_profile, Some(self.switcher.camera()))
            .await?;
        self.video_room
            .message(&VideoRoomRequest::Configure { video: true }, Some(offer))
            .await?;
        self.video_peer = Some(peer);
        Ok(())
    }

    /// Negotiate the bidirectional audio session
    async fn publish_audio(&mut self) -> Result<()> {
        let mut peer = self.engine.create_session();
        let offer = peer.create_offer(MediaProfile::audio_chat(), None).await?;
        self.mixer
            .message(&MixerRequest::Configure { muted: false }, Some(offer))
            .await?;
        self.audio_peer = Some(peer);
        Ok(())
    }

    /// Forward the published video toward the mountpoint, exactly once
    async fn forward_video(&mut self) -> Result<()> {
        if self.forwarded {
            tracing::debug!("Connectivity re-established, forward already active");
            return Ok(());
        }
        let publisher_id = match self.publisher_id {
            Some(id) => id,
            // Connectivity can only come up after the join confirmation,
            // but don't forward blind if the gateway misbehaves
            None => return Err(Error::InvalidState("connectivity up before join")),
        };

        let reply = self
            .video_room
            .request(&VideoRoomRequest::rtp_forward(
                &self.config,
                publisher_id,
                self.mountpoint.video_port,
                self.mountpoint.rtcp_port,
            ))
            .await?;
        if let Some(err) = message::remote_error(&reply) {
            return Err(err.into());
        }

        self.forwarded = true;
        tracing::info!(
            publisher = publisher_id,
            video_port = self.mountpoint.video_port,
            rtcp_port = self.mountpoint.rtcp_port,
            "Publisher video forwarded to mountpoint"
        );
        self.pending.push_back(SpeakerEvent::Live);
        Ok(())
    }

    fn check_rejections(&mut self, audio: Option<String>, video: Option<String>) {
        let sends_audio = matches!(
            self.video_profile.audio,
            crate::media::Direction::SendOnly | crate::media::Direction::SendRecv
        );
        let sends_video = matches!(
            self.video_profile.video,
            crate::media::Direction::SendOnly | crate::media::Direction::SendRecv
        );
        if sends_audio && audio.is_none() {
            self.pending.push_back(SpeakerEvent::AudioRejected);
        }
        if sends_video && video.is_none() {
            self.pending.push_back(SpeakerEvent::VideoRejected);
        }
    }

    fn on_participant(&mut self, participant: crate::signaling::Participant) {
        if !participant.is_talking() {
            return;
        }
        let display = participant
            .display
            .clone()
            .unwrap_or_else(|| format!("participant {}", participant.id));
        // Participant lists repeat on every room event; only announce new askers
        if self
            .questions
            .insert(participant.id, display.clone())
            .is_none()
        {
            let display_name = &display;
            tracing::info!(id = participant.id, display = %display_name, "Question");
            self.pending.push_back(SpeakerEvent::QuestionStarted {
                id: participant.id,
                display,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{LocalEngine, LocalGateway};

    async fn live_speaker() -> (Arc<LocalGateway>, LocalEngine, Speaker<LocalGateway, LocalEngine>) {
        let gateway = Arc::new(LocalGateway::new());
        let engine = LocalEngine::new();
        let mut speaker = Speaker::start(
            Arc::clone(&gateway),
            engine.clone(),
            LiveConfig::default(),
        )
        .await
        .unwrap();
        speaker.join("Alice").await.unwrap();

        // Event interleaving between the two rooms is not deterministic;
        // wait until the whole startup handshake has been seen
        let mut seen = Vec::new();
        let done = |seen: &Vec<SpeakerEvent>| {
            seen.contains(&SpeakerEvent::Live)
                && seen
                    .iter()
                    .any(|e| matches!(e, SpeakerEvent::VideoJoined { room: 5555, .. }))
                && seen
                    .iter()
                    .any(|e| matches!(e, SpeakerEvent::AudioJoined { room: 5555, .. }))
        };
        while !done(&seen) {
            match speaker.next_event().await.unwrap() {
                Some(event) => seen.push(event),
                None => panic!("session ended before going live, saw {:?}", seen),
            }
        }

        (gateway, engine, speaker)
    }

    #[tokio::test]
    async fn test_publish_flow_forwards_video_once() {
        let (gateway, _engine, speaker) = live_speaker().await;

        let forwards: Vec<_> = gateway
            .recorded_requests()
            .into_iter()
            .filter(|r| r.plugin == Plugin::VideoRoom && r.request == "rtp_forward")
            .collect();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].body["video_port"], 20002);
        assert_eq!(forwards[0].body["video_rtcp_port"], 20004);
        assert_eq!(forwards[0].body["publisher_id"], speaker.publisher_id().unwrap());
    }

    #[tokio::test]
    async fn test_reconnect_does_not_forward_again() {
        let (gateway, _engine, mut speaker) = live_speaker().await;

        let video_handle = gateway.handle_for(Plugin::VideoRoom).unwrap();
        gateway.push_event(video_handle, HandleEvent::WebrtcState { up: false });
        gateway.push_event(video_handle, HandleEvent::WebrtcState { up: true });

        // Nothing reportable comes out of the redundant notifications
        let waited =
            tokio::time::timeout(Duration::from_millis(50), speaker.next_event()).await;
        assert!(waited.is_err());

        let forwards = gateway
            .recorded_requests()
            .into_iter()
            .filter(|r| r.plugin == Plugin::VideoRoom && r.request == "rtp_forward")
            .count();
        assert_eq!(forwards, 1);
    }

    #[tokio::test]
    async fn test_duplicate_audio_join_negotiates_once() {
        let (gateway, _engine, mut speaker) = live_speaker().await;

        let mixer_handle = gateway.handle_for(Plugin::AudioMixer).unwrap();
        gateway.push_event(
            mixer_handle,
            HandleEvent::Message {
                data: json!({"audiobridge": "joined", "room": 5555, "id": 42}),
                jsep: None,
            },
        );

        let waited =
            tokio::time::timeout(Duration::from_millis(50), speaker.next_event()).await;
        assert!(waited.is_err());

        let configures = gateway
            .recorded_messages()
            .into_iter()
            .filter(|m| m.plugin == Plugin::AudioMixer && m.request == "configure")
            .count();
        assert_eq!(configures, 1);
    }

    #[tokio::test]
    async fn test_question_roster_notifications() {
        let (gateway, _engine, mut speaker) = live_speaker().await;
        let mixer_handle = gateway.handle_for(Plugin::AudioMixer).unwrap();

        let asking = json!({
            "audiobridge": "event",
            "participants": [{"id": 7, "display": "Bob", "setup": true, "muted": false}]
        });
        gateway.push_event(
            mixer_handle,
            HandleEvent::Message {
                data: asking.clone(),
                jsep: None,
            },
        );
        let event = speaker.next_event().await.unwrap().unwrap();
        assert_eq!(
            event,
            SpeakerEvent::QuestionStarted {
                id: 7,
                display: "Bob".to_string()
            }
        );

        // The same list repeated must not re-announce
        gateway.push_event(
            mixer_handle,
            HandleEvent::Message {
                data: asking,
                jsep: None,
            },
        );
        let waited =
            tokio::time::timeout(Duration::from_millis(50), speaker.next_event()).await;
        assert!(waited.is_err());

        gateway.push_event(
            mixer_handle,
            HandleEvent::Message {
                data: json!({"audiobridge": "event", "leaving": 7}),
                jsep: None,
            },
        );
        let event = speaker.next_event().await.unwrap().unwrap();
        assert_eq!(
            event,
            SpeakerEvent::QuestionEnded {
                id: 7,
                display: "Bob".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_source_switch_through_speaker() {
        let (_gateway, engine, mut speaker) = live_speaker().await;

        assert_eq!(speaker.video_source(), VideoSource::Webcam);
        let outcome = speaker.switch_source(VideoSource::Screen).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched);
        let outcome = speaker.switch_source(VideoSource::Screen).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Unchanged);
        assert_eq!(engine.display_opens(), 1);

        speaker.switch_source(VideoSource::Webcam).await.unwrap();
        let screen = engine.last_display_stream().unwrap();
        assert!(screen.tracks().iter().all(|t| !t.is_live()));
    }

    #[tokio::test]
    async fn test_session_destroyed_surfaces_end() {
        let (gateway, _engine, mut speaker) = live_speaker().await;

        gateway.destroy_from_gateway();
        let event = speaker.next_event().await.unwrap().unwrap();
        assert_eq!(event, SpeakerEvent::Ended(EndReason::SessionDestroyed));
        assert_eq!(speaker.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsupported_platform_never_connects() {
        let gateway = Arc::new(LocalGateway::new());
        let engine = LocalEngine::new();
        engine.set_webrtc_supported(false);

        let err = Speaker::start(Arc::clone(&gateway), engine, LiveConfig::default())
            .await
            .err()
            .expect("start should fail");
        assert!(matches!(err, Error::WebrtcUnsupported));
        assert_eq!(gateway.session_count(), 0);
    }
}
