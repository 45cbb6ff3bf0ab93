//! Live event configuration

use std::time::Duration;

/// Default audio payload type (Opus)
pub const DEFAULT_AUDIO_PT: u8 = 100;
/// Default audio RTP map
pub const DEFAULT_AUDIO_RTPMAP: &str = "opus/48000/2";
/// Default video payload type (VP8)
pub const DEFAULT_VIDEO_PT: u8 = 96;
/// Default video RTP map
pub const DEFAULT_VIDEO_RTPMAP: &str = "VP8/90000";

/// Configuration for one live event
///
/// The mountpoint, audio room, and video room are three distinct server-side
/// resources with independent identifiers. [`LiveConfig::shared_id`] sets all
/// three to the same value, which is how small deployments usually run.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Streaming mountpoint identifier
    pub mountpoint: u64,

    /// Audio mixing room identifier
    pub audio_room: u64,

    /// Video room identifier
    pub video_room: u64,

    /// Shared secret for privileged requests (create, info, rtp_forward)
    pub secret: String,

    /// Address the gateway should forward RTP to; the mountpoint lives on
    /// the gateway itself, so this is almost always the loopback name
    pub mountpoint_host: String,

    /// Audio payload type for the mountpoint
    pub audio_pt: u8,

    /// Audio RTP map for the mountpoint
    pub audio_rtpmap: String,

    /// Video payload type for the mountpoint
    pub video_pt: u8,

    /// Video RTP map for the mountpoint
    pub video_rtpmap: String,

    /// Maximum concurrent publishers in the video room
    pub publishers: u32,

    /// Video room bitrate cap in bits per second (0 disables the cap)
    pub bitrate: u64,

    /// How often to ask the publisher for a keyframe
    pub fir_freq: Duration,

    /// Prefix for the opaque identifiers attached to plugin handles
    pub opaque_prefix: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::shared_id(5555)
    }
}

impl LiveConfig {
    /// Create a config where one identifier serves all three resources
    pub fn shared_id(id: u64) -> Self {
        Self {
            mountpoint: id,
            audio_room: id,
            video_room: id,
            secret: "verysecret".to_string(),
            mountpoint_host: "localhost".to_string(),
            audio_pt: DEFAULT_AUDIO_PT,
            audio_rtpmap: DEFAULT_AUDIO_RTPMAP.to_string(),
            video_pt: DEFAULT_VIDEO_PT,
            video_rtpmap: DEFAULT_VIDEO_RTPMAP.to_string(),
            publishers: 1,
            bitrate: 500_000,
            fir_freq: Duration::from_secs(10),
            opaque_prefix: "livecast".to_string(),
        }
    }

    /// Set the mountpoint identifier
    pub fn mountpoint(mut self, id: u64) -> Self {
        self.mountpoint = id;
        self
    }

    /// Set the audio room identifier
    pub fn audio_room(mut self, id: u64) -> Self {
        self.audio_room = id;
        self
    }

    /// Set the video room identifier
    pub fn video_room(mut self, id: u64) -> Self {
        self.video_room = id;
        self
    }

    /// Set the shared secret
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Set the host RTP is forwarded to
    pub fn mountpoint_host(mut self, host: impl Into<String>) -> Self {
        self.mountpoint_host = host.into();
        self
    }

    /// Set the video room bitrate cap
    pub fn bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the publisher cap
    pub fn publishers(mut self, publishers: u32) -> Self {
        self.publishers = publishers;
        self
    }

    /// Set the keyframe request frequency
    pub fn fir_freq(mut self, freq: Duration) -> Self {
        self.fir_freq = freq;
        self
    }

    /// Set the opaque identifier prefix
    pub fn opaque_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.opaque_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_id() {
        let config = LiveConfig::shared_id(42);

        assert_eq!(config.mountpoint, 42);
        assert_eq!(config.audio_room, 42);
        assert_eq!(config.video_room, 42);
    }

    #[test]
    fn test_default_config() {
        let config = LiveConfig::default();

        assert_eq!(config.publishers, 1);
        assert_eq!(config.bitrate, 500_000);
        assert_eq!(config.audio_pt, DEFAULT_AUDIO_PT);
        assert_eq!(config.video_pt, DEFAULT_VIDEO_PT);
        assert_eq!(config.fir_freq, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_chaining() {
        let config = LiveConfig::shared_id(1234)
            .video_room(5678)
            .secret("hunter2")
            .bitrate(0)
            .publishers(2);

        assert_eq!(config.mountpoint, 1234);
        assert_eq!(config.audio_room, 1234);
        assert_eq!(config.video_room, 5678);
        assert_eq!(config.secret, "hunter2");
        assert_eq!(config.bitrate, 0);
        assert_eq!(config.publishers, 2);
    }
}
