//! Attendee orchestration
//!
//! An attendee watches the event's mountpoint with a receive-only media
//! session. On demand they can "raise a hand": join the audio mixing room,
//! contribute send-only audio, and have the locally rendered mountpoint
//! audio muted so they don't hear their own voice come back through the
//! broadcast. Ending the question detaches the mixer attachment and puts
//! everything back.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::LiveConfig;
use crate::error::{Error, Result};
use crate::media::{MediaEngine, MediaProfile, MediaSession};
use crate::signaling::message::{
    self, MixerEvent, MixerRequest, MountpointStatus, StreamingEvent, StreamingRequest,
};
use crate::signaling::{
    HandleEvent, Plugin, PluginHandle, Session, SessionEvent, SignalingTransport,
};

use super::EndReason;

/// State of the question feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionState {
    /// Not in the audio room
    Idle,
    /// Attach and join are in flight
    Requesting,
    /// Audio session up, mountpoint audio muted
    Active,
}

/// Events the attendee surfaces to the embedder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendeeEvent {
    /// The watched mountpoint changed status
    ///
    /// Only drives UI state; `Stopped` additionally detaches the streaming
    /// attachment and is reported as [`AttendeeEvent::StreamEnded`] instead.
    Status(MountpointStatus),
    /// The broadcast ended and the streaming attachment was released
    StreamEnded,
    /// The streaming plugin reported an error for this subscriber
    StreamError(String),
    /// The question audio session is up; mountpoint audio is muted
    QuestionOpen,
    /// Back to watch-only; mountpoint audio restored
    QuestionClosed,
    /// The platform is showing (or hiding) a capture consent dialog
    ConsentDialog {
        /// Dialog visible
        on: bool,
    },
    /// The event is over; the embedder should tear down and start fresh
    Ended(EndReason),
}

/// Drives the attendee side of a live event
pub struct Attendee<T: SignalingTransport, E: MediaEngine> {
    config: LiveConfig,
    engine: E,
    session: Session<T>,
    display_name: String,
    streaming: Option<PluginHandle<T>>,
    watch_peer: Option<E::Session>,
    mixer: Option<PluginHandle<T>>,
    question_peer: Option<E::Session>,
    question: QuestionState,
    audio_started: bool,
    pending: VecDeque<AttendeeEvent>,
    ended: bool,
}

impl<T: SignalingTransport, E: MediaEngine> Attendee<T, E> {
    /// Check capabilities and create the session
    ///
    /// The display name is collected up front: watching needs none, but the
    /// mixing room will ask for it as soon as a question starts.
    pub async fn start(
        transport: Arc<T>,
        engine: E,
        config: LiveConfig,
        display_name: impl Into<String>,
    ) -> Result<Self> {
        if !engine.is_webrtc_supported() {
            return Err(Error::WebrtcUnsupported);
        }

        let session =
            Session::connect(transport, format!("{}-attendee", config.opaque_prefix)).await?;

        Ok(Self {
            config,
            engine,
            session,
            display_name: display_name.into(),
            streaming: None,
            watch_peer: None,
            mixer: None,
            question_peer: None,
            question: QuestionState::Idle,
            audio_started: false,
            pending: VecDeque::new(),
            ended: false,
        })
    }

    /// Current state of the question feature
    pub fn question_state(&self) -> QuestionState {
        self.question
    }

    /// Subscribe to the event's mountpoint
    ///
    /// Idempotent: a second call while already watching does nothing.
    pub async fn watch(&mut self) -> Result<()> {
        if self.streaming.is_some() {
            return Ok(());
        }
        let handle = self.session.attach(Plugin::Streaming).await?;
        handle
            .message(&StreamingRequest::watch(&self.config), None)
            .await?;
        self.streaming = Some(handle);
        Ok(())
    }

    /// Ask for the floor: join the mixing room and contribute audio
    ///
    /// Only valid while the question feature is idle; re-entry is blocked
    /// until the current question is over.
    pub async fn ask_question(&mut self) -> Result<()> {
        if self.question != QuestionState::Idle {
            return Err(Error::InvalidState("question already in progress"));
        }
        self.question = QuestionState::Requesting;

        let attached = self.session.attach(Plugin::AudioMixer).await;
        let handle = match attached {
            Ok(handle) => handle,
            Err(e) => {
                self.question = QuestionState::Idle;
                return Err(e);
            }
        };
        if let Err(e) = handle
            .message(
                &MixerRequest::join(&self.config, self.display_name.clone()),
                None,
            )
            .await
        {
            self.question = QuestionState::Idle;
            return Err(e);
        }
        self.mixer = Some(handle);
        Ok(())
    }

    /// Give the floor back: detach from the mixing room
    ///
    /// Only valid while the question audio session is up.
    pub async fn end_question(&mut self) -> Result<()> {
        if self.question != QuestionState::Active {
            return Err(Error::InvalidState("no active question"));
        }
        if let Some(handle) = self.mixer.take() {
            handle.detach().await?;
        }
        self.reset_question().await;
        Ok(())
    }

    /// Wait for the next reportable event
    ///
    /// Returns `None` once the session is over.
    pub async fn next_event(&mut self) -> Result<Option<AttendeeEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.ended {
                return Ok(None);
            }

            enum Incoming {
                Streaming(HandleEvent),
                StreamingClosed,
                Mixer(HandleEvent),
                MixerClosed,
                Session(SessionEvent),
                SessionClosed,
            }

            let incoming = tokio::select! {
                ev = recv_on(&mut self.streaming) => {
                    ev.map_or(Incoming::StreamingClosed, Incoming::Streaming)
                }
                ev = recv_on(&mut self.mixer) => {
                    ev.map_or(Incoming::MixerClosed, Incoming::Mixer)
                }
                ev = self.session.recv() => {
                    ev.map_or(Incoming::SessionClosed, Incoming::Session)
                }
            };

            match incoming {
                Incoming::Streaming(ev) => self.on_streaming_event(ev).await?,
                Incoming::StreamingClosed => {
                    self.streaming = None;
                    self.watch_peer = None;
                }
                Incoming::Mixer(ev) => self.on_mixer_event(ev).await?,
                Incoming::MixerClosed => {
                    self.mixer = None;
                    self.reset_question().await;
                }
                Incoming::Session(SessionEvent::Destroyed) => {
                    self.ended = true;
                    self.pending
                        .push_back(AttendeeEvent::Ended(EndReason::SessionDestroyed));
                }
                Incoming::Session(SessionEvent::Error(reason)) => {
                    self.ended = true;
                    return Err(crate::error::TransportError::RequestFailed(reason).into());
                }
                Incoming::SessionClosed => {
                    // Flush anything already queued before reporting the end
                    self.ended = true;
                }
            }
        }
    }

    /// Leave the event: close media sessions and destroy the gateway session
    pub async fn stop(mut self) -> Result<()> {
        if let Some(mut peer) = self.watch_peer.take() {
            peer.close().await;
        }
        if let Some(mut peer) = self.question_peer.take() {
            peer.close().await;
        }
        self.session.destroy().await
    }

    async fn on_streaming_event(&mut self, ev: HandleEvent) -> Result<()> {
        match ev {
            HandleEvent::Message { data, jsep } => {
                match message::parse_streaming_event(&data) {
                    Some(StreamingEvent::Status(MountpointStatus::Stopped)) => {
                        tracing::info!("Broadcast stopped");
                        if let Some(handle) = self.streaming.take() {
                            handle.detach().await?;
                        }
                        if let Some(mut peer) = self.watch_peer.take() {
                            peer.close().await;
                        }
                        self.pending.push_back(AttendeeEvent::StreamEnded);
                    }
                    Some(StreamingEvent::Status(status)) => {
                        tracing::info!(?status, "Mountpoint status");
                        self.pending.push_back(AttendeeEvent::Status(status));
                    }
                    Some(StreamingEvent::Error(reason)) => {
                        tracing::warn!(reason = %reason, "Streaming error");
                        self.pending.push_back(AttendeeEvent::StreamError(reason));
                    }
                    None => {}
                }
                if let Some(offer) = jsep {
                    self.answer_offer(offer).await?;
                }
            }
            HandleEvent::WebrtcState { up } => {
                tracing::debug!(up, "Broadcast connectivity changed");
            }
            HandleEvent::ConsentDialog { on } => {
                self.pending.push_back(AttendeeEvent::ConsentDialog { on });
            }
            HandleEvent::Cleanup => {
                self.watch_peer = None;
            }
            HandleEvent::Detached => {
                tracing::debug!("Streaming handle detached");
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
                                self.contribute_audio().await?;
                            }
                        }
                        MixerEvent::Destroyed { room } => {
                            tracing::warn!(room, "Audio room destroyed");
                            self.ended = true;
                            self.pending
                                .push_back(AttendeeEvent::Ended(EndReason::AudioRoomDestroyed));
                        }
                        MixerEvent::ParticipantUpdate(participant) => {
                            tracing::debug!(id = participant.id, "Participant update");
                        }
                        MixerEvent::Leaving { id } => {
                            tracing::debug!(id, "Participant left");
                        }
                    }
                }
                if let Some(jsep) = jsep {
                    if let Some(peer) = self.question_peer.as_mut() {
                        peer.apply_remote(jsep).await?;
                    }
                }
            }
            HandleEvent::WebrtcState { up: true } => {
                if self.question == QuestionState::Requesting {
                    self.question = QuestionState::Active;
                    // Our own voice now comes back through the broadcast;
                    // silence the mountpoint while we hold the floor
                    if let Some(peer) = self.watch_peer.as_mut() {
                        peer.set_remote_audio_muted(true);
                    }
                    tracing::info!("Question audio up, mountpoint muted");
                    self.pending.push_back(AttendeeEvent::QuestionOpen);
                }
            }
            HandleEvent::WebrtcState { up: false } => {
                tracing::debug!("Question connectivity down");
            }
            HandleEvent::ConsentDialog { on } => {
                self.pending.push_back(AttendeeEvent::ConsentDialog { on });
            }
            HandleEvent::Cleanup => {
                self.mixer = None;
                self.reset_question().await;
            }
            HandleEvent::Detached => {
                tracing::debug!("Mixer handle detached");
            }
        }
        Ok(())
    }

    /// Answer a mountpoint offer with receive-only media
    async fn answer_offer(&mut self, offer: crate::media::SessionDescription) -> Result<()> {
        let mut peer = match self.watch_peer.take() {
            Some(peer) => peer,
            None => self.engine.create_session(),
        };
        let outcome = async {
            let mut answer = peer
                .create_answer(&offer, MediaProfile::watch_only())
                .await?;
            // A stereo offer must get a stereo answer or the gateway
            // downmixes the broadcast
            answer.echo_stereo(&offer);
            match self.streaming.as_ref() {
                Some(handle) => handle.message(&StreamingRequest::Start, Some(answer)).await,
                None => Err(Error::InvalidState("offer without a streaming attachment")),
            }
        }
        .await;
        self.watch_peer = Some(peer);
        outcome
    }

    /// Negotiate the send-only question audio session
    async fn contribute_audio(&mut self) -> Result<()> {
        let mut peer = self.engine.create_session();
        let offer = peer
            .create_offer(MediaProfile::question_audio(), None)
            .await?;
        match self.mixer.as_ref() {
            Some(handle) => {
                handle
                    .message(&MixerRequest::Configure { muted: false }, Some(offer))
                    .await?
            }
            None => return Err(Error::InvalidState("joined without a mixer attachment")),
        }
        self.question_peer = Some(peer);
        Ok(())
    }

    /// Drop question state and restore the mountpoint audio
    async fn reset_question(&mut self) {
        if self.question == QuestionState::Idle {
            return;
        }
        if let Some(mut peer) = self.question_peer.take() {
            peer.close().await;
        }
        if let Some(peer) = self.watch_peer.as_mut() {
            peer.set_remote_audio_muted(false);
        }
        self.audio_started = false;
        self.question = QuestionState::Idle;
        tracing::info!("Question over, mountpoint unmuted");
        self.pending.push_back(AttendeeEvent::QuestionClosed);
    }
}

async fn recv_on<T: SignalingTransport>(
    handle: &mut Option<PluginHandle<T>>,
) -> Option<HandleEvent> {
    match handle.as_mut() {
        Some(handle) => handle.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{LocalEngine, LocalGateway};

    async fn watching_attendee(
    ) -> (Arc<LocalGateway>, LocalEngine, Attendee<LocalGateway, LocalEngine>) {
        let gateway = Arc::new(LocalGateway::new());
        let engine = LocalEngine::new();
        let mut attendee = Attendee::start(
            Arc::clone(&gateway),
            engine.clone(),
            LiveConfig::default(),
            "Carol",
        )
        .await
        .unwrap();
        attendee.watch().await.unwrap();

        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::Status(MountpointStatus::Starting));
        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::Status(MountpointStatus::Started));

        (gateway, engine, attendee)
    }

    #[tokio::test]
    async fn test_watch_answers_with_stereo_preserved() {
        let (gateway, _engine, _attendee) = watching_attendee().await;

        let start = gateway
            .recorded_messages()
            .into_iter()
            .find(|m| m.plugin == Plugin::Streaming && m.request == "start")
            .expect("start message");
        let answer = start.jsep.expect("answer riding on start");
        assert!(answer.sdp.contains("useinbandfec=1;stereo=1"));
    }

    #[tokio::test]
    async fn test_watch_is_idempotent() {
        let (gateway, _engine, mut attendee) = watching_attendee().await;

        attendee.watch().await.unwrap();
        let watches = gateway
            .recorded_messages()
            .into_iter()
            .filter(|m| m.request == "watch")
            .count();
        assert_eq!(watches, 1);
    }

    #[tokio::test]
    async fn test_question_lifecycle() {
        let (gateway, engine, mut attendee) = watching_attendee().await;
        assert_eq!(attendee.question_state(), QuestionState::Idle);

        attendee.ask_question().await.unwrap();
        assert_eq!(attendee.question_state(), QuestionState::Requesting);

        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::QuestionOpen);
        assert_eq!(attendee.question_state(), QuestionState::Active);

        // The join used the display name collected at startup
        let join = gateway
            .recorded_messages()
            .into_iter()
            .find(|m| m.plugin == Plugin::AudioMixer && m.request == "join")
            .expect("join message");
        assert_eq!(join.body["display"], "Carol");

        // Watch session muted while we hold the floor
        let watch_session = &engine.sessions()[0];
        assert!(watch_session.remote_audio_muted());

        attendee.end_question().await.unwrap();
        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::QuestionClosed);
        assert_eq!(attendee.question_state(), QuestionState::Idle);
        assert!(!watch_session.remote_audio_muted());
    }

    #[tokio::test]
    async fn test_question_reentry_blocked() {
        let (_gateway, _engine, mut attendee) = watching_attendee().await;

        attendee.ask_question().await.unwrap();
        // Still requesting: blocked
        let err = attendee.ask_question().await.err().expect("should be blocked");
        assert!(matches!(err, Error::InvalidState(_)));

        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::QuestionOpen);
        // Active: still blocked
        let err = attendee.ask_question().await.err().expect("should be blocked");
        assert!(matches!(err, Error::InvalidState(_)));

        // After ending, a new question is allowed
        attendee.end_question().await.unwrap();
        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::QuestionClosed);
        attendee.ask_question().await.unwrap();
    }

    #[tokio::test]
    async fn test_end_question_requires_active() {
        let (_gateway, _engine, mut attendee) = watching_attendee().await;

        let err = attendee.end_question().await.err().expect("nothing to end");
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_duplicate_join_negotiates_once() {
        let (gateway, _engine, mut attendee) = watching_attendee().await;

        attendee.ask_question().await.unwrap();
        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::QuestionOpen);

        let mixer_handle = gateway.handle_for(Plugin::AudioMixer).unwrap();
        gateway.push_event(
            mixer_handle,
            HandleEvent::Message {
                data: json!({"audiobridge": "joined", "room": 5555, "id": 77}),
                jsep: None,
            },
        );
        let waited =
            tokio::time::timeout(Duration::from_millis(50), attendee.next_event()).await;
        assert!(waited.is_err());

        let configures = gateway
            .recorded_messages()
            .into_iter()
            .filter(|m| m.plugin == Plugin::AudioMixer && m.request == "configure")
            .count();
        assert_eq!(configures, 1);
    }

    #[tokio::test]
    async fn test_stopped_detaches_streaming_only() {
        let (gateway, _engine, mut attendee) = watching_attendee().await;

        let streaming_handle = gateway.handle_for(Plugin::Streaming).unwrap();
        gateway.push_event(
            streaming_handle,
            HandleEvent::Message {
                data: json!({"result": {"status": "stopped"}}),
                jsep: None,
            },
        );

        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::StreamEnded);

        // The streaming attachment is gone, the session is not
        assert!(gateway
            .lifecycle_log()
            .contains(&"detach gateway.plugin.streaming".to_string()));
        assert!(!gateway.lifecycle_log().contains(&"destroy".to_string()));

        // Watching again is possible on the same session
        attendee.watch().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_error_surfaced() {
        let (gateway, _engine, mut attendee) = watching_attendee().await;

        let streaming_handle = gateway.handle_for(Plugin::Streaming).unwrap();
        gateway.push_event(
            streaming_handle,
            HandleEvent::Message {
                data: json!({"error": "No such mountpoint"}),
                jsep: None,
            },
        );

        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(
            event,
            AttendeeEvent::StreamError("No such mountpoint".to_string())
        );
    }

    #[tokio::test]
    async fn test_room_destroyed_ends_event() {
        let (gateway, _engine, mut attendee) = watching_attendee().await;

        attendee.ask_question().await.unwrap();
        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::QuestionOpen);

        let mixer_handle = gateway.handle_for(Plugin::AudioMixer).unwrap();
        gateway.push_event(
            mixer_handle,
            HandleEvent::Message {
                data: json!({"audiobridge": "destroyed", "room": 5555}),
                jsep: None,
            },
        );

        let event = attendee.next_event().await.unwrap().unwrap();
        assert_eq!(event, AttendeeEvent::Ended(EndReason::AudioRoomDestroyed));
        assert_eq!(attendee.next_event().await.unwrap(), None);
    }
}
