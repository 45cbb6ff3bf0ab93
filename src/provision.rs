//! Server-side resource provisioning
//!
//! Before any media flows, the speaker's client creates the three resources
//! the event needs: the streaming mountpoint, the audio mixing room, and the
//! video room. The stages run strictly in sequence because the later ones
//! need the mountpoint's port assignments, and a pre-existing resource is as
//! good as a fresh one.
//!
//! Production deployments normally provision these on the server side; doing
//! it from the client keeps the demo self-contained but hands every client
//! the room secret.

use serde_json::Value;

use crate::config::LiveConfig;
use crate::error::{Error, ProvisionError, ProvisionStage, Result};
use crate::signaling::message::{self, MixerRequest, StreamingRequest, VideoRoomRequest};
use crate::signaling::{Plugin, PluginHandle, Session, SignalingTransport};

/// Error code the mixer plugin uses for "room already exists"
pub const AUDIO_ROOM_EXISTS: u64 = 486;
/// Error code the video room plugin uses for "room already exists"
pub const VIDEO_ROOM_EXISTS: u64 = 427;

/// Where the mountpoint listens for forwarded RTP
///
/// Returned once by the provisioner and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountpointInfo {
    /// Mountpoint identifier
    pub id: u64,
    /// Host RTP must be sent to
    pub host: String,
    /// Audio RTP port
    pub audio_port: u16,
    /// Video RTP port
    pub video_port: u16,
    /// Video RTCP port, used to relay keyframe requests
    pub rtcp_port: u16,
}

impl MountpointInfo {
    /// Build the descriptor from a successful `create` reply
    fn from_create_reply(reply: &Value, host: &str) -> Result<Self> {
        let stream = reply
            .get("stream")
            .ok_or_else(|| Error::UnexpectedReply("mountpoint create reply without stream".into()))?;
        Ok(Self {
            id: field::<u64>(stream, "id")?,
            host: host.to_string(),
            audio_port: field(stream, "audio_port")?,
            video_port: field(stream, "video_port")?,
            rtcp_port: field(stream, "video_rtcp_port")?,
        })
    }

    /// Build the descriptor from an `info` reply
    ///
    /// The `info` reply spells the port fields differently from `create`.
    fn from_info_reply(reply: &Value, host: &str) -> Result<Self> {
        let info = reply
            .get("info")
            .ok_or_else(|| Error::UnexpectedReply("mountpoint info reply without info".into()))?;
        Ok(Self {
            id: field::<u64>(info, "id")?,
            host: host.to_string(),
            audio_port: field(info, "audioport")?,
            video_port: field(info, "videoport")?,
            rtcp_port: field(info, "videortcpport")?,
        })
    }
}

fn field<N: TryFrom<u64>>(value: &Value, name: &str) -> Result<N> {
    value
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|n| N::try_from(n).ok())
        .ok_or_else(|| Error::UnexpectedReply(format!("missing or invalid field '{}'", name)))
}

/// Everything the speaker needs after provisioning
pub struct Provisioned<T: SignalingTransport> {
    /// The mountpoint's forwarding destination
    pub mountpoint: MountpointInfo,
    /// Retained attachment to the audio mixer, ready to join
    pub mixer: PluginHandle<T>,
    /// Retained attachment to the video room, ready to join
    pub video_room: PluginHandle<T>,
}

/// Sequences creation of the event's server-side resources
///
/// A stage that fails with anything other than the plugin's "already exists"
/// code aborts the whole sequence. Resources created by earlier stages are
/// **not** rolled back; the secret holder cleans up out of band.
pub struct Provisioner<'a, T: SignalingTransport> {
    session: &'a Session<T>,
    config: &'a LiveConfig,
}

impl<'a, T: SignalingTransport> Provisioner<'a, T> {
    /// Create a provisioner for one session
    pub fn new(session: &'a Session<T>, config: &'a LiveConfig) -> Self {
        Self { session, config }
    }

    /// Run the three stages in order
    pub async fn provision(self) -> Result<Provisioned<T>> {
        let mountpoint = self
            .create_mountpoint()
            .await
            .map_err(|e| stage(ProvisionStage::Mountpoint, e))?;

        let mixer = self
            .create_audio_room(&mountpoint)
            .await
            .map_err(|e| stage(ProvisionStage::AudioRoom, e))?;

        let video_room = self
            .create_video_room()
            .await
            .map_err(|e| stage(ProvisionStage::VideoRoom, e))?;

        tracing::info!(
            mountpoint = mountpoint.id,
            audio_room = self.config.audio_room,
            video_room = self.config.video_room,
            "Provisioning complete"
        );

        Ok(Provisioned {
            mountpoint,
            mixer,
            video_room,
        })
    }

    /// Stage 1: create the mountpoint, or recover its ports if it exists
    ///
    /// The streaming attachment only serves this one exchange and is
    /// detached as soon as the descriptor is known.
    async fn create_mountpoint(&self) -> Result<MountpointInfo> {
        let handle = self.session.attach(Plugin::Streaming).await?;

        let reply = handle
            .request(&StreamingRequest::create(self.config))
            .await?;

        let outcome = if message::remote_error(&reply).is_some() {
            // The mountpoint exists already (the speaker reloaded, say);
            // an info request with the secret returns the port assignments
            tracing::debug!(id = self.config.mountpoint, "Mountpoint exists, asking for info");
            let info_reply = handle.request(&StreamingRequest::info(self.config)).await?;
            match message::remote_error(&info_reply) {
                Some(err) => Err(err.into()),
                None => MountpointInfo::from_info_reply(&info_reply, &self.config.mountpoint_host),
            }
        } else {
            MountpointInfo::from_create_reply(&reply, &self.config.mountpoint_host)
        };

        // The creation handle has served its purpose either way
        let detached = handle.detach().await;
        let info = outcome?;
        detached?;

        tracing::info!(
            id = info.id,
            audio_port = info.audio_port,
            video_port = info.video_port,
            rtcp_port = info.rtcp_port,
            "Mountpoint ready"
        );
        Ok(info)
    }

    /// Stage 2: create the audio room and preconfigure its forwarder
    async fn create_audio_room(&self, mountpoint: &MountpointInfo) -> Result<PluginHandle<T>> {
        let handle = self.session.attach(Plugin::AudioMixer).await?;

        let reply = handle.request(&MixerRequest::create(self.config)).await?;
        match message::remote_error(&reply) {
            None => {
                // Fresh room: forward its mix toward the mountpoint's audio
                // port right away, disabled while the room is empty
                let fwd = handle
                    .request(&MixerRequest::rtp_forward(
                        self.config,
                        mountpoint.audio_port,
                    ))
                    .await?;
                if let Some(err) = message::remote_error(&fwd) {
                    return Err(err.into());
                }
                tracing::info!(
                    room = self.config.audio_room,
                    port = mountpoint.audio_port,
                    "Audio forwarder configured"
                );
            }
            Some(err) if err.is_code(AUDIO_ROOM_EXISTS) => {
                // The room already has its forwarder; adding a second one
                // would duplicate every packet
                tracing::debug!(room = self.config.audio_room, "Audio room exists");
            }
            Some(err) => return Err(err.into()),
        }

        Ok(handle)
    }

    /// Stage 3: create the video room
    async fn create_video_room(&self) -> Result<PluginHandle<T>> {
        let handle = self.session.attach(Plugin::VideoRoom).await?;

        let reply = handle.request(&VideoRoomRequest::create(self.config)).await?;
        match message::remote_error(&reply) {
            None => {
                tracing::info!(room = self.config.video_room, "Video room created");
            }
            Some(err) if err.is_code(VIDEO_ROOM_EXISTS) => {
                tracing::debug!(room = self.config.video_room, "Video room exists");
            }
            Some(err) => return Err(err.into()),
        }

        Ok(handle)
    }
}

fn stage(at: ProvisionStage, source: Error) -> Error {
    // Keep the stage label out of already-wrapped errors
    match source {
        Error::Provision(e) => Error::Provision(e),
        other => ProvisionError::new(at, other).into(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::LocalGateway;

    async fn provision_with(
        gateway: Arc<LocalGateway>,
        config: &LiveConfig,
    ) -> Result<Provisioned<LocalGateway>> {
        let session = Session::connect(Arc::clone(&gateway), "test").await?;
        Provisioner::new(&session, config).provision().await
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let gateway = Arc::new(LocalGateway::new());
        let config = LiveConfig::default();

        provision_with(Arc::clone(&gateway), &config).await.unwrap();

        let requests = gateway.recorded_requests();
        let order: Vec<&str> = requests.iter().map(|r| r.request.as_str()).collect();
        assert_eq!(order, vec!["create", "create", "rtp_forward", "create"]);
        assert_eq!(requests[0].plugin, Plugin::Streaming);
        assert_eq!(requests[1].plugin, Plugin::AudioMixer);
        assert_eq!(requests[2].plugin, Plugin::AudioMixer);
        assert_eq!(requests[3].plugin, Plugin::VideoRoom);
    }

    #[tokio::test]
    async fn test_forwarder_references_mountpoint_audio_port() {
        let gateway = Arc::new(LocalGateway::new());
        let config = LiveConfig::default();

        let provisioned = provision_with(Arc::clone(&gateway), &config).await.unwrap();
        assert_eq!(provisioned.mountpoint.audio_port, 20000);
        assert_eq!(provisioned.mountpoint.video_port, 20002);
        assert_eq!(provisioned.mountpoint.rtcp_port, 20004);

        let forward = gateway
            .recorded_requests()
            .into_iter()
            .find(|r| r.request == "rtp_forward")
            .expect("forwarder request");
        assert_eq!(forward.body["port"], 20000);
    }

    #[tokio::test]
    async fn test_mountpoint_handle_detached_before_stage_two() {
        let gateway = Arc::new(LocalGateway::new());
        let config = LiveConfig::default();

        provision_with(Arc::clone(&gateway), &config).await.unwrap();

        // The streaming attachment must be gone by the time the mixer
        // attachment appears
        let log = gateway.lifecycle_log();
        let detach_pos = log
            .iter()
            .position(|e| e.starts_with("detach"))
            .expect("detach recorded");
        let mixer_attach_pos = log
            .iter()
            .position(|e| e == "attach gateway.plugin.audiomixer")
            .expect("mixer attach recorded");
        assert!(detach_pos < mixer_attach_pos, "log was {:?}", log);
    }

    #[tokio::test]
    async fn test_existing_mountpoint_recovered_via_info() {
        let gateway = Arc::new(LocalGateway::new());
        gateway.set_mountpoint_exists(true);
        let config = LiveConfig::default();

        let provisioned = provision_with(Arc::clone(&gateway), &config).await.unwrap();

        // Ports come from the info reply, which spells its fields differently
        assert_eq!(provisioned.mountpoint.audio_port, 20000);
        let order: Vec<String> = gateway
            .recorded_requests()
            .into_iter()
            .filter(|r| r.plugin == Plugin::Streaming)
            .map(|r| r.request)
            .collect();
        assert_eq!(order, vec!["create", "info"]);
    }

    #[tokio::test]
    async fn test_existing_audio_room_skips_forwarder() {
        let gateway = Arc::new(LocalGateway::new());
        gateway.set_audio_room_exists(true);
        let config = LiveConfig::default();

        provision_with(Arc::clone(&gateway), &config).await.unwrap();

        let forwards = gateway
            .recorded_requests()
            .into_iter()
            .filter(|r| r.request == "rtp_forward")
            .count();
        assert_eq!(forwards, 0);
    }

    #[tokio::test]
    async fn test_existing_video_room_is_success() {
        let gateway = Arc::new(LocalGateway::new());
        gateway.set_video_room_exists(true);
        let config = LiveConfig::default();

        let provisioned = provision_with(Arc::clone(&gateway), &config).await;
        assert!(provisioned.is_ok());
    }

    #[tokio::test]
    async fn test_unexpected_error_aborts_sequence() {
        let gateway = Arc::new(LocalGateway::new());
        gateway.fail_request(Plugin::AudioMixer, "create", 499, "backend down");
        let config = LiveConfig::default();

        let err = provision_with(Arc::clone(&gateway), &config)
            .await
            .err()
            .expect("provisioning should abort");

        match err {
            Error::Provision(e) => assert_eq!(e.stage, ProvisionStage::AudioRoom),
            other => panic!("expected provision error, got {:?}", other),
        }

        // The video room stage never ran
        assert!(!gateway
            .recorded_requests()
            .iter()
            .any(|r| r.plugin == Plugin::VideoRoom));
    }
}
