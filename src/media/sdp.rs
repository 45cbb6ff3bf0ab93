//! Session descriptions
//!
//! Offers and answers are opaque to this crate except for one detail: when a
//! mountpoint offer advertises stereo Opus, the answer must advertise it too,
//! or the gateway downmixes the broadcast.

use serde::{Deserialize, Serialize};

const STEREO_FLAG: &str = "stereo=1";
const FEC_FLAG: &str = "useinbandfec=1";

/// Whether a description is an offer or an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Negotiation offer
    Offer,
    /// Negotiation answer
    Answer,
}

/// An opaque session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpType,
    /// The SDP payload
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Whether the SDP advertises stereo Opus
    pub fn has_stereo(&self) -> bool {
        self.sdp.contains(STEREO_FLAG)
    }

    /// Preserve the stereo flag of `offer` in this answer
    ///
    /// If the offer was stereo and this description is not, the flag is
    /// appended right after the in-band FEC parameter, which every Opus
    /// fmtp line in these exchanges carries.
    pub fn echo_stereo(&mut self, offer: &SessionDescription) {
        if offer.has_stereo() && !self.has_stereo() {
            self.sdp = self
                .sdp
                .replace(FEC_FLAG, &format!("{};{}", FEC_FLAG, STEREO_FLAG));
        }
    }
}
