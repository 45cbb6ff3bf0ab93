//! Wire messages
//!
//! Typed request bodies for each plugin and parsers for the replies and
//! events this crate depends on. Everything else in a plugin payload is
//! ignored rather than rejected: the gateway adds fields freely.
//!
//! One wire quirk is preserved on purpose: mountpoint `create` replies carry
//! ports as `audio_port`/`video_port`/`video_rtcp_port` under `"stream"`,
//! while `info` replies carry `audioport`/`videoport`/`videortcpport` under
//! `"info"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LiveConfig;
use crate::error::RemoteError;

/// Requests understood by the streaming plugin
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum StreamingRequest {
    /// Create an RTP mountpoint
    Create {
        /// Mountpoint identifier
        id: u64,
        /// Mountpoint type; always "rtp" here
        #[serde(rename = "type")]
        mp_type: &'static str,
        /// Accept audio
        audio: bool,
        /// Audio payload type
        audiopt: u8,
        /// Audio RTP map
        audiortpmap: String,
        /// Audio port; 0 lets the gateway pick
        audioport: u16,
        /// Accept video
        video: bool,
        /// Video payload type
        videopt: u8,
        /// Video RTP map
        videortpmap: String,
        /// Video port; 0 lets the gateway pick
        videoport: u16,
        /// Video RTCP port; 0 lets the gateway pick
        videortcpport: u16,
        /// Secret required to edit or destroy the mountpoint
        secret: String,
    },
    /// Ask for mountpoint details; ports require the secret
    Info {
        /// Mountpoint identifier
        id: u64,
        /// Mountpoint secret
        secret: String,
    },
    /// Subscribe to a mountpoint
    Watch {
        /// Mountpoint identifier
        id: u64,
    },
    /// Provide the answer and start receiving media
    Start,
}

impl StreamingRequest {
    /// Mountpoint creation request from the event configuration
    pub fn create(config: &LiveConfig) -> Self {
        StreamingRequest::Create {
            id: config.mountpoint,
            mp_type: "rtp",
            audio: true,
            audiopt: config.audio_pt,
            audiortpmap: config.audio_rtpmap.clone(),
            audioport: 0,
            video: true,
            videopt: config.video_pt,
            videortpmap: config.video_rtpmap.clone(),
            videoport: 0,
            videortcpport: 0,
            secret: config.secret.clone(),
        }
    }

    /// Info request for an existing mountpoint
    pub fn info(config: &LiveConfig) -> Self {
        StreamingRequest::Info {
            id: config.mountpoint,
            secret: config.secret.clone(),
        }
    }

    /// Watch request for the event mountpoint
    pub fn watch(config: &LiveConfig) -> Self {
        StreamingRequest::Watch {
            id: config.mountpoint,
        }
    }
}

/// Requests understood by the audio mixer plugin
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum MixerRequest {
    /// Create a mixing room
    Create {
        /// Room identifier
        room: u64,
        /// Secret required to edit or destroy the room
        secret: String,
    },
    /// Forward the room mix as RTP toward a host/port
    RtpForward {
        /// Room identifier
        room: u64,
        /// Room secret; forwarding is a privileged operation
        secret: String,
        /// Destination host
        host: String,
        /// Address family of the destination
        host_family: &'static str,
        /// Destination port
        port: u16,
        /// Keep forwarding while the room is empty
        always_on: bool,
    },
    /// Join a mixing room
    Join {
        /// Room identifier
        room: u64,
        /// Display name shown to other participants
        display: String,
    },
    /// Configure the participant, optionally finalizing negotiation
    Configure {
        /// Whether the participant's audio is muted
        muted: bool,
    },
}

impl MixerRequest {
    /// Room creation request
    pub fn create(config: &LiveConfig) -> Self {
        MixerRequest::Create {
            room: config.audio_room,
            secret: config.secret.clone(),
        }
    }

    /// Forwarder toward the mountpoint's audio port
    ///
    /// `always_on` stays off so nothing is sent while the room is empty.
    pub fn rtp_forward(config: &LiveConfig, audio_port: u16) -> Self {
        MixerRequest::RtpForward {
            room: config.audio_room,
            secret: config.secret.clone(),
            host: config.mountpoint_host.clone(),
            host_family: "ipv4",
            port: audio_port,
            always_on: false,
        }
    }

    /// Join request under a display name
    pub fn join(config: &LiveConfig, display: impl Into<String>) -> Self {
        MixerRequest::Join {
            room: config.audio_room,
            display: display.into(),
        }
    }
}

/// Requests understood by the video room plugin
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum VideoRoomRequest {
    /// Create a video room
    Create {
        /// Room identifier
        room: u64,
        /// Maximum concurrent publishers
        publishers: u32,
        /// Bitrate cap in bits per second
        bitrate: u64,
        /// Forced audio codec
        audiocodec: &'static str,
        /// Forced video codec
        videocodec: &'static str,
        /// Enable sender-side bandwidth estimation
        transport_wide_cc_ext: bool,
        /// Keyframe request interval in seconds
        fir_freq: u64,
        /// Secret required to edit or destroy the room
        secret: String,
    },
    /// Join a video room
    Join {
        /// Room identifier
        room: u64,
        /// Participant type
        ptype: &'static str,
        /// Display name shown to other participants
        display: String,
    },
    /// Configure the publisher, optionally finalizing negotiation
    Configure {
        /// Whether video is published
        video: bool,
    },
    /// Forward the publisher's video as RTP toward a host/port pair
    RtpForward {
        /// Room identifier
        room: u64,
        /// Publisher whose media is forwarded
        publisher_id: u64,
        /// Room secret; forwarding is a privileged operation
        secret: String,
        /// Destination host
        host: String,
        /// Address family of the destination
        host_family: &'static str,
        /// Destination video port
        video_port: u16,
        /// Destination video RTCP port, used for keyframe requests
        video_rtcp_port: u16,
    },
}

impl VideoRoomRequest {
    /// Room creation request
    pub fn create(config: &LiveConfig) -> Self {
        VideoRoomRequest::Create {
            room: config.video_room,
            publishers: config.publishers,
            bitrate: config.bitrate,
            audiocodec: "opus",
            videocodec: "vp8",
            transport_wide_cc_ext: true,
            fir_freq: config.fir_freq.as_secs(),
            secret: config.secret.clone(),
        }
    }

    /// Join request as a publisher
    pub fn join_publisher(config: &LiveConfig, display: impl Into<String>) -> Self {
        VideoRoomRequest::Join {
            room: config.video_room,
            ptype: "publisher",
            display: display.into(),
        }
    }

    /// Forwarder toward the mountpoint's video and RTCP ports
    pub fn rtp_forward(
        config: &LiveConfig,
        publisher_id: u64,
        video_port: u16,
        video_rtcp_port: u16,
    ) -> Self {
        VideoRoomRequest::RtpForward {
            room: config.video_room,
            publisher_id,
            secret: config.secret.clone(),
            host: config.mountpoint_host.clone(),
            host_family: "ipv4",
            video_port,
            video_rtcp_port,
        }
    }
}

/// Extract a remote error from a plugin reply, if it carries one
pub fn remote_error(reply: &Value) -> Option<RemoteError> {
    let reason = reply.get("error").and_then(Value::as_str);
    let code = reply.get("error_code").and_then(Value::as_u64);
    if reason.is_none() && code.is_none() {
        return None;
    }
    Some(RemoteError::new(
        code,
        reason.unwrap_or("unknown plugin error"),
    ))
}

/// A participant in the audio mixing room
///
/// Used only to surface question notifications; the gateway remains the
/// authority on room membership.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Participant {
    /// Participant identifier
    pub id: u64,
    /// Display name, when one was provided at join time
    pub display: Option<String>,
    /// Whether the participant's audio session is up
    #[serde(default)]
    pub setup: bool,
    /// Whether the participant is muted
    #[serde(default)]
    pub muted: bool,
}

impl Participant {
    /// Whether this participant is ready to talk
    pub fn is_talking(&self) -> bool {
        self.setup && !self.muted
    }
}

/// Event from the audio mixer plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerEvent {
    /// We joined the room
    Joined {
        /// Room identifier
        room: u64,
        /// Our participant identifier
        id: u64,
    },
    /// The room was destroyed
    Destroyed {
        /// Room identifier
        room: u64,
    },
    /// A participant's state was announced or changed
    ParticipantUpdate(Participant),
    /// A participant left the room
    Leaving {
        /// Participant identifier
        id: u64,
    },
}

/// Parse the mixer events carried by one plugin message
///
/// A single message can announce several things at once (a join confirmation
/// plus the current participant list, for instance), so this returns them in
/// the order the gateway laid them out.
pub fn parse_mixer_events(data: &Value) -> Vec<MixerEvent> {
    let mut events = Vec::new();
    match data.get("audiobridge").and_then(Value::as_str) {
        Some("joined") => {
            // Joins echoed for other participants carry no "id"
            if let Some(id) = data.get("id").and_then(Value::as_u64) {
                let room = data.get("room").and_then(Value::as_u64).unwrap_or(0);
                events.push(MixerEvent::Joined { room, id });
            }
        }
        Some("destroyed") => {
            let room = data.get("room").and_then(Value::as_u64).unwrap_or(0);
            events.push(MixerEvent::Destroyed { room });
        }
        Some(other) => {
            tracing::debug!(event = other, "Unhandled mixer event tag");
        }
        None => {}
    }
    if let Some(list) = data.get("participants").and_then(Value::as_array) {
        for entry in list {
            match serde_json::from_value::<Participant>(entry.clone()) {
                Ok(participant) => events.push(MixerEvent::ParticipantUpdate(participant)),
                Err(e) => tracing::debug!(error = %e, "Malformed participant entry"),
            }
        }
    }
    if let Some(id) = data.get("leaving").and_then(Value::as_u64) {
        events.push(MixerEvent::Leaving { id });
    }
    events
}

/// Event from the video room plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoRoomEvent {
    /// We joined the room as a publisher
    Joined {
        /// Room identifier
        room: u64,
        /// Our publisher identifier
        id: u64,
    },
    /// The room was destroyed
    Destroyed {
        /// Room identifier
        room: u64,
    },
    /// Codecs the gateway settled on for our published media
    ///
    /// A kind we offered that is missing here was rejected.
    Codecs {
        /// Negotiated audio codec
        audio: Option<String>,
        /// Negotiated video codec
        video: Option<String>,
    },
}

/// Parse the video room events carried by one plugin message
pub fn parse_video_room_events(data: &Value) -> Vec<VideoRoomEvent> {
    let mut events = Vec::new();
    match data.get("videoroom").and_then(Value::as_str) {
        Some("joined") => {
            let room = data.get("room").and_then(Value::as_u64).unwrap_or(0);
            if let Some(id) = data.get("id").and_then(Value::as_u64) {
                events.push(VideoRoomEvent::Joined { room, id });
            }
        }
        Some("destroyed") => {
            let room = data.get("room").and_then(Value::as_u64).unwrap_or(0);
            events.push(VideoRoomEvent::Destroyed { room });
        }
        Some(other) => {
            tracing::debug!(event = other, "Unhandled video room event tag");
        }
        None => {}
    }
    if data.get("audio_codec").is_some() || data.get("video_codec").is_some() {
        events.push(VideoRoomEvent::Codecs {
            audio: data
                .get("audio_codec")
                .and_then(Value::as_str)
                .map(str::to_string),
            video: data
                .get("video_codec")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    events
}

/// Status of a watched mountpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountpointStatus {
    /// The broadcast is being set up
    Starting,
    /// Media is flowing
    Started,
    /// The broadcast ended
    Stopped,
}

impl MountpointStatus {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(MountpointStatus::Starting),
            "started" => Some(MountpointStatus::Started),
            "stopped" => Some(MountpointStatus::Stopped),
            _ => None,
        }
    }
}

/// Event from the streaming plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingEvent {
    /// Mountpoint status transition
    Status(MountpointStatus),
    /// The plugin reported an error for this subscriber
    Error(String),
}

/// Parse the streaming event carried by one plugin message
pub fn parse_streaming_event(data: &Value) -> Option<StreamingEvent> {
    if let Some(status) = data
        .get("result")
        .and_then(|r| r.get("status"))
        .and_then(Value::as_str)
    {
        return match MountpointStatus::from_str(status) {
            Some(status) => Some(StreamingEvent::Status(status)),
            None => {
                tracing::debug!(status, "Unhandled mountpoint status");
                None
            }
        };
    }
    data.get("error")
        .and_then(Value::as_str)
        .map(|e| StreamingEvent::Error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_mountpoint_wire_shape() {
        let config = LiveConfig::default();
        let value = serde_json::to_value(StreamingRequest::create(&config)).unwrap();

        assert_eq!(value["request"], "create");
        assert_eq!(value["type"], "rtp");
        assert_eq!(value["id"], 5555);
        assert_eq!(value["audiopt"], 100);
        assert_eq!(value["audiortpmap"], "opus/48000/2");
        assert_eq!(value["audioport"], 0);
        assert_eq!(value["videopt"], 96);
        assert_eq!(value["videortpmap"], "VP8/90000");
        assert_eq!(value["secret"], "verysecret");
    }

    #[test]
    fn test_rtp_forward_wire_shape() {
        let config = LiveConfig::default();
        let value = serde_json::to_value(MixerRequest::rtp_forward(&config, 20000)).unwrap();

        assert_eq!(value["request"], "rtp_forward");
        assert_eq!(value["port"], 20000);
        assert_eq!(value["host"], "localhost");
        assert_eq!(value["host_family"], "ipv4");
        assert_eq!(value["always_on"], false);
    }

    #[test]
    fn test_video_room_create_wire_shape() {
        let config = LiveConfig::default();
        let value = serde_json::to_value(VideoRoomRequest::create(&config)).unwrap();

        assert_eq!(value["request"], "create");
        assert_eq!(value["publishers"], 1);
        assert_eq!(value["bitrate"], 500_000);
        assert_eq!(value["audiocodec"], "opus");
        assert_eq!(value["videocodec"], "vp8");
        assert_eq!(value["transport_wide_cc_ext"], true);
        assert_eq!(value["fir_freq"], 10);
    }

    #[test]
    fn test_remote_error_extraction() {
        let reply = json!({"audiobridge": "event", "error_code": 486, "error": "Room exists"});
        let err = remote_error(&reply).unwrap();

        assert!(err.is_code(486));
        assert_eq!(err.reason, "Room exists");
        assert!(remote_error(&json!({"audiobridge": "created"})).is_none());
    }

    #[test]
    fn test_parse_joined_with_participants() {
        let data = json!({
            "audiobridge": "joined",
            "room": 5555,
            "id": 42,
            "participants": [
                {"id": 7, "display": "Ann", "setup": true, "muted": false},
                {"id": 8, "display": "Bob", "setup": false, "muted": false}
            ]
        });

        let events = parse_mixer_events(&data);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], MixerEvent::Joined { room: 5555, id: 42 });
        match &events[1] {
            MixerEvent::ParticipantUpdate(p) => {
                assert_eq!(p.id, 7);
                assert!(p.is_talking());
            }
            other => panic!("expected participant update, got {:?}", other),
        }
        match &events[2] {
            MixerEvent::ParticipantUpdate(p) => assert!(!p.is_talking()),
            other => panic!("expected participant update, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_leaving() {
        let data = json!({"audiobridge": "event", "leaving": 7});
        let events = parse_mixer_events(&data);

        assert_eq!(events, vec![MixerEvent::Leaving { id: 7 }]);
    }

    #[test]
    fn test_parse_video_room_joined() {
        let data = json!({"videoroom": "joined", "room": 5555, "id": 99});
        let events = parse_video_room_events(&data);

        assert_eq!(events, vec![VideoRoomEvent::Joined { room: 5555, id: 99 }]);
    }

    #[test]
    fn test_parse_video_room_codecs() {
        let data = json!({"videoroom": "event", "video_codec": "vp8"});
        let events = parse_video_room_events(&data);

        assert_eq!(
            events,
            vec![VideoRoomEvent::Codecs {
                audio: None,
                video: Some("vp8".to_string()),
            }]
        );
    }

    #[test]
    fn test_parse_streaming_status() {
        let data = json!({"result": {"status": "started"}});
        assert_eq!(
            parse_streaming_event(&data),
            Some(StreamingEvent::Status(MountpointStatus::Started))
        );

        let data = json!({"error": "No such mountpoint"});
        assert_eq!(
            parse_streaming_event(&data),
            Some(StreamingEvent::Error("No such mountpoint".to_string()))
        );
    }
}
