//! Scripted in-memory media gateway

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::media::{SdpType, SessionDescription};
use crate::signaling::{
    HandleEvent, HandleId, Plugin, SessionEvent, SessionId, SignalingTransport,
};

/// Audio port the emulated mountpoint listens on
pub const MOUNTPOINT_AUDIO_PORT: u16 = 20000;
/// Video port the emulated mountpoint listens on
pub const MOUNTPOINT_VIDEO_PORT: u16 = 20002;
/// Video RTCP port the emulated mountpoint listens on
pub const MOUNTPOINT_RTCP_PORT: u16 = 20004;

/// The offer the emulated mountpoint sends to watchers; stereo Opus with
/// in-band FEC, like a real broadcast
const MOUNTPOINT_OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=mountpoint\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=sendonly\r\na=fmtp:111 useinbandfec=1;stereo=1\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=sendonly\r\n";

const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=gateway\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=fmtp:111 useinbandfec=1\r\n";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A synchronous request a client sent
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Plugin the request went to
    pub plugin: Plugin,
    /// The request verb
    pub request: String,
    /// Full request body
    pub body: Value,
}

/// An asynchronous message a client sent
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    /// Plugin the message went to
    pub plugin: Plugin,
    /// The request verb
    pub request: String,
    /// Full message body
    pub body: Value,
    /// Negotiation payload riding on the message
    pub jsep: Option<SessionDescription>,
}

struct HandleRec {
    plugin: Plugin,
    session: u64,
    tx: mpsc::Sender<HandleEvent>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    connects: usize,
    sessions: HashMap<u64, mpsc::Sender<SessionEvent>>,
    handles: HashMap<u64, HandleRec>,
    requests: Vec<RecordedRequest>,
    messages: Vec<RecordedMessage>,
    lifecycle: Vec<String>,
    mountpoint_exists: bool,
    audio_room_exists: bool,
    video_room_exists: bool,
    failures: HashMap<(Plugin, String), (u64, String)>,
}

/// In-memory gateway emulation
///
/// Happy-path by default: resource creation succeeds with fixed port
/// assignments, joins are confirmed, offers are answered, and connectivity
/// comes up right after negotiation. Knobs flip individual stages into the
/// "already exists" or failing variants.
pub struct LocalGateway {
    inner: Mutex<Inner>,
}

impl LocalGateway {
    /// Create a gateway with default behavior
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Make mountpoint creation report "already exists"
    pub fn set_mountpoint_exists(&self, exists: bool) {
        self.lock().mountpoint_exists = exists;
    }

    /// Make audio room creation report code 486
    pub fn set_audio_room_exists(&self, exists: bool) {
        self.lock().audio_room_exists = exists;
    }

    /// Make video room creation report code 427
    pub fn set_video_room_exists(&self, exists: bool) {
        self.lock().video_room_exists = exists;
    }

    /// Make every `request` to `plugin` reply with an error
    pub fn fail_request(&self, plugin: Plugin, request: &str, code: u64, reason: &str) {
        self.lock()
            .failures
            .insert((plugin, request.to_string()), (code, reason.to_string()));
    }

    /// Everything sent with [`SignalingTransport::request`], in order
    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Everything sent with [`SignalingTransport::message`], in order
    pub fn recorded_messages(&self) -> Vec<RecordedMessage> {
        self.lock().messages.clone()
    }

    /// Connect/attach/detach/destroy calls, in order
    pub fn lifecycle_log(&self) -> Vec<String> {
        self.lock().lifecycle.clone()
    }

    /// Number of sessions ever created
    pub fn session_count(&self) -> usize {
        self.lock().connects
    }

    /// The latest live attachment for a plugin
    pub fn handle_for(&self, plugin: Plugin) -> Option<HandleId> {
        self.lock()
            .handles
            .iter()
            .filter(|(_, rec)| rec.plugin == plugin)
            .max_by_key(|(id, _)| *id)
            .map(|(id, _)| HandleId(*id))
    }

    /// Deliver an event on an attachment, as the gateway would
    pub fn push_event(&self, handle: HandleId, event: HandleEvent) {
        let tx = self
            .lock()
            .handles
            .get(&handle.0)
            .map(|rec| rec.tx.clone());
        tx.expect("no such handle")
            .try_send(event)
            .expect("handle event channel full");
    }

    /// Destroy every session from the gateway side
    pub fn destroy_from_gateway(&self) {
        let senders: Vec<_> = self.lock().sessions.values().cloned().collect();
        for tx in senders {
            let _ = tx.try_send(SessionEvent::Destroyed);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("gateway state poisoned")
    }

    fn reply_for(inner: &Inner, plugin: Plugin, request: &str, body: &Value) -> Value {
        if let Some((code, reason)) = inner.failures.get(&(plugin, request.to_string())) {
            return json!({ "error_code": code, "error": reason });
        }
        match (plugin, request) {
            (Plugin::Streaming, "create") => {
                if inner.mountpoint_exists {
                    json!({ "error_code": 466, "error": "Mountpoint already exists" })
                } else {
                    json!({
                        "streaming": "created",
                        "stream": {
                            "id": body["id"],
                            "audio_port": MOUNTPOINT_AUDIO_PORT,
                            "video_port": MOUNTPOINT_VIDEO_PORT,
                            "video_rtcp_port": MOUNTPOINT_RTCP_PORT,
                        }
                    })
                }
            }
            (Plugin::Streaming, "info") => json!({
                "streaming": "info",
                "info": {
                    "id": body["id"],
                    "audioport": MOUNTPOINT_AUDIO_PORT,
                    "videoport": MOUNTPOINT_VIDEO_PORT,
                    "videortcpport": MOUNTPOINT_RTCP_PORT,
                }
            }),
            (Plugin::AudioMixer, "create") => {
                if inner.audio_room_exists {
                    json!({ "audiobridge": "event", "error_code": 486, "error": "Room already exists" })
                } else {
                    json!({ "audiobridge": "created", "room": body["room"] })
                }
            }
            (Plugin::AudioMixer, "rtp_forward") => {
                json!({ "audiobridge": "success", "room": body["room"], "stream_id": 1 })
            }
            (Plugin::VideoRoom, "create") => {
                if inner.video_room_exists {
                    json!({ "videoroom": "event", "error_code": 427, "error": "Room already exists" })
                } else {
                    json!({ "videoroom": "created", "room": body["room"] })
                }
            }
            (Plugin::VideoRoom, "rtp_forward") => json!({
                "videoroom": "rtp_forward",
                "room": body["room"],
                "publisher_id": body["publisher_id"],
            }),
            _ => json!({}),
        }
    }

    /// Events the gateway emits in reaction to an asynchronous message
    fn events_for(
        plugin: Plugin,
        request: &str,
        body: &Value,
        jsep: &Option<SessionDescription>,
    ) -> Vec<HandleEvent> {
        match (plugin, request) {
            (Plugin::VideoRoom, "join") => vec![HandleEvent::Message {
                data: json!({
                    "videoroom": "joined",
                    "room": body["room"],
                    "id": 1234,
                    "publishers": [],
                }),
                jsep: None,
            }],
            (Plugin::AudioMixer, "join") => vec![HandleEvent::Message {
                data: json!({
                    "audiobridge": "joined",
                    "room": body["room"],
                    "id": 4321,
                    "participants": [],
                }),
                jsep: None,
            }],
            (Plugin::VideoRoom, "configure") if jsep.is_some() => vec![
                HandleEvent::Message {
                    data: json!({
                        "videoroom": "event",
                        "configured": "ok",
                        "video_codec": "vp8",
                    }),
                    jsep: Some(SessionDescription {
                        kind: SdpType::Answer,
                        sdp: ANSWER_SDP.to_string(),
                    }),
                },
                HandleEvent::WebrtcState { up: true },
            ],
            (Plugin::AudioMixer, "configure") if jsep.is_some() => vec![
                HandleEvent::Message {
                    data: json!({ "audiobridge": "event", "result": "ok" }),
                    jsep: Some(SessionDescription {
                        kind: SdpType::Answer,
                        sdp: ANSWER_SDP.to_string(),
                    }),
                },
                HandleEvent::WebrtcState { up: true },
            ],
            (Plugin::Streaming, "watch") => vec![HandleEvent::Message {
                data: json!({ "result": { "status": "starting" } }),
                jsep: Some(SessionDescription {
                    kind: SdpType::Offer,
                    sdp: MOUNTPOINT_OFFER_SDP.to_string(),
                }),
            }],
            (Plugin::Streaming, "start") => vec![HandleEvent::Message {
                data: json!({ "result": { "status": "started" } }),
                jsep: None,
            }],
            _ => Vec::new(),
        }
    }
}

impl Default for LocalGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingTransport for LocalGateway {
    async fn connect(&self) -> Result<(SessionId, mpsc::Receiver<SessionEvent>)> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut inner = self.lock();
        inner.next_id += 1;
        inner.connects += 1;
        let id = inner.next_id;
        inner.sessions.insert(id, tx);
        inner.lifecycle.push("connect".to_string());
        Ok((SessionId(id), rx))
    }

    async fn attach(
        &self,
        session: SessionId,
        plugin: Plugin,
        _opaque_id: &str,
    ) -> Result<(HandleId, mpsc::Receiver<HandleEvent>)> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut inner = self.lock();
        if !inner.sessions.contains_key(&session.0) {
            return Err(TransportError::AttachFailed("no such session".to_string()).into());
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.handles.insert(
            id,
            HandleRec {
                plugin,
                session: session.0,
                tx,
            },
        );
        inner.lifecycle.push(format!("attach {}", plugin.name()));
        Ok((HandleId(id), rx))
    }

    async fn request(&self, _session: SessionId, handle: HandleId, body: Value) -> Result<Value> {
        let mut inner = self.lock();
        let plugin = match inner.handles.get(&handle.0) {
            Some(rec) => rec.plugin,
            None => {
                return Err(TransportError::RequestFailed("no such handle".to_string()).into())
            }
        };
        let request = body["request"].as_str().unwrap_or_default().to_string();
        inner.requests.push(RecordedRequest {
            plugin,
            request: request.clone(),
            body: body.clone(),
        });
        Ok(Self::reply_for(&inner, plugin, &request, &body))
    }

    async fn message(
        &self,
        _session: SessionId,
        handle: HandleId,
        body: Value,
        jsep: Option<SessionDescription>,
    ) -> Result<()> {
        let (plugin, tx) = {
            let mut inner = self.lock();
            let (plugin, tx) = match inner.handles.get(&handle.0) {
                Some(rec) => (rec.plugin, rec.tx.clone()),
                None => {
                    return Err(TransportError::RequestFailed("no such handle".to_string()).into())
                }
            };
            let request = body["request"].as_str().unwrap_or_default().to_string();
            inner.messages.push(RecordedMessage {
                plugin,
                request,
                body: body.clone(),
                jsep: jsep.clone(),
            });
            (plugin, tx)
        };

        let request = body["request"].as_str().unwrap_or_default();
        for event in Self::events_for(plugin, request, &body, &jsep) {
            let _ = tx.send(event).await;
        }
        Ok(())
    }

    async fn detach(&self, _session: SessionId, handle: HandleId) -> Result<()> {
        let mut inner = self.lock();
        match inner.handles.remove(&handle.0) {
            Some(rec) => {
                inner.lifecycle.push(format!("detach {}", rec.plugin.name()));
                Ok(())
            }
            None => Err(TransportError::RequestFailed("no such handle".to_string()).into()),
        }
    }

    async fn destroy(&self, session: SessionId) -> Result<()> {
        let mut inner = self.lock();
        let tx = inner.sessions.remove(&session.0);
        inner.handles.retain(|_, rec| rec.session != session.0);
        inner.lifecycle.push("destroy".to_string());
        drop(inner);
        if let Some(tx) = tx {
            // The client that asked for the destroy may have dropped its
            // receiver already
            let _ = tx.try_send(SessionEvent::Destroyed);
            Ok(())
        } else {
            Err(TransportError::SessionDestroyed.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::signaling::Session;

    #[tokio::test]
    async fn test_happy_path_replies() {
        let gateway = Arc::new(LocalGateway::new());
        let session = Session::connect(Arc::clone(&gateway), "test").await.unwrap();
        let handle = session.attach(Plugin::Streaming).await.unwrap();

        let reply = handle
            .request(&serde_json::json!({"request": "create", "id": 7}))
            .await
            .unwrap();
        assert_eq!(reply["stream"]["audio_port"], MOUNTPOINT_AUDIO_PORT);

        assert_eq!(gateway.recorded_requests().len(), 1);
        assert_eq!(gateway.lifecycle_log()[0], "connect");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let gateway = Arc::new(LocalGateway::new());
        gateway.fail_request(Plugin::Streaming, "create", 500, "out of ports");

        let session = Session::connect(Arc::clone(&gateway), "test").await.unwrap();
        let handle = session.attach(Plugin::Streaming).await.unwrap();

        let reply = handle
            .request(&serde_json::json!({"request": "create", "id": 7}))
            .await
            .unwrap();
        assert_eq!(reply["error_code"], 500);
    }

    #[tokio::test]
    async fn test_watch_emits_stereo_offer() {
        let gateway = Arc::new(LocalGateway::new());
        let session = Session::connect(Arc::clone(&gateway), "test").await.unwrap();
        let mut handle = session.attach(Plugin::Streaming).await.unwrap();

        handle
            .message(&serde_json::json!({"request": "watch", "id": 7}), None)
            .await
            .unwrap();

        match handle.recv().await {
            Some(HandleEvent::Message { jsep: Some(offer), .. }) => {
                assert_eq!(offer.kind, SdpType::Offer);
                assert!(offer.has_stereo());
            }
            other => panic!("expected offer, got {:?}", other),
        }
    }
}
