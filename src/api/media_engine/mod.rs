use sdp::util::Codec;

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodec, RTPCodecType};
use crate::rtp_transceiver::{PayloadType, RTCPFeedback};

/// PCMU is the name of the PCMU codec.
pub const PCMU: &str = "PCMU";
/// PCMA is the name of the PCMA codec.
pub const PCMA: &str = "PCMA";
/// G722 is the name of the G722 codec.
pub const G722: &str = "G722";
/// OPUS is the name of the Opus codec.
pub const OPUS: &str = "opus";
/// VP8 is the name of the VP8 codec.
pub const VP8: &str = "VP8";
/// VP9 is the name of the VP9 codec.
pub const VP9: &str = "VP9";
/// H264 is the name of the H264 codec.
pub const H264: &str = "H264";

pub const DEFAULT_PAYLOAD_TYPE_PCMU: PayloadType = 0;
pub const DEFAULT_PAYLOAD_TYPE_PCMA: PayloadType = 8;
pub const DEFAULT_PAYLOAD_TYPE_G722: PayloadType = 9;
pub const DEFAULT_PAYLOAD_TYPE_OPUS: PayloadType = 111;
pub const DEFAULT_PAYLOAD_TYPE_VP8: PayloadType = 96;
pub const DEFAULT_PAYLOAD_TYPE_VP9: PayloadType = 98;
pub const DEFAULT_PAYLOAD_TYPE_H264: PayloadType = 102;

/// A MediaEngine defines the codecs supported by a PeerConnection.
/// A MediaEngine must not be shared between PeerConnections.
#[derive(Default)]
pub struct MediaEngine {
    codecs: Vec<RTCRtpCodec>,
}

impl MediaEngine {
    /// register_default_codecs registers the default codecs supported by
    /// this package.
    pub fn register_default_codecs(&mut self) -> Result<()> {
        let video_rtcp_feedback = vec![
            RTCPFeedback {
                typ: "goog-remb".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "ccm".to_owned(),
                parameter: "fir".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "pli".to_owned(),
            },
        ];

        for codec in vec![
            RTCRtpCodec::new(
                RTPCodecType::Audio,
                OPUS,
                48000,
                2,
                "minptime=10;useinbandfec=1",
                DEFAULT_PAYLOAD_TYPE_OPUS,
                vec![],
            ),
            RTCRtpCodec::new(
                RTPCodecType::Audio,
                G722,
                8000,
                0,
                "",
                DEFAULT_PAYLOAD_TYPE_G722,
                vec![],
            ),
            RTCRtpCodec::new(
                RTPCodecType::Audio,
                PCMU,
                8000,
                0,
                "",
                DEFAULT_PAYLOAD_TYPE_PCMU,
                vec![],
            ),
            RTCRtpCodec::new(
                RTPCodecType::Audio,
                PCMA,
                8000,
                0,
                "",
                DEFAULT_PAYLOAD_TYPE_PCMA,
                vec![],
            ),
            RTCRtpCodec::new(
                RTPCodecType::Video,
                VP8,
                90000,
                0,
                "",
                DEFAULT_PAYLOAD_TYPE_VP8,
                video_rtcp_feedback.clone(),
            ),
            RTCRtpCodec::new(
                RTPCodecType::Video,
                VP9,
                90000,
                0,
                "",
                DEFAULT_PAYLOAD_TYPE_VP9,
                video_rtcp_feedback.clone(),
            ),
            RTCRtpCodec::new(
                RTPCodecType::Video,
                H264,
                90000,
                0,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f",
                DEFAULT_PAYLOAD_TYPE_H264,
                video_rtcp_feedback,
            ),
        ] {
            self.register_codec(codec);
        }

        Ok(())
    }

    /// register_codec adds codec to the MediaEngine
    /// These are the list of codecs supported by this PeerConnection.
    /// register_codec is not safe for concurrent use.
    pub fn register_codec(&mut self, codec: RTCRtpCodec) {
        self.codecs.push(codec);
    }

    /// get_codec returns the codec registered for the given payload type.
    pub(crate) fn get_codec(&self, payload_type: PayloadType) -> Result<RTCRtpCodec> {
        for codec in &self.codecs {
            if codec.payload_type == payload_type {
                return Ok(codec.clone());
            }
        }
        Err(Error::ErrCodecNotFound)
    }

    /// get_codec_sdp resolves a codec parsed out of an SDP document against
    /// the registry.
    pub(crate) fn get_codec_sdp(&self, sdp_codec: &Codec) -> Result<RTCRtpCodec> {
        for codec in &self.codecs {
            if codec.name.eq_ignore_ascii_case(&sdp_codec.name)
                && codec.clock_rate == sdp_codec.clock_rate
            {
                return Ok(codec.clone());
            }
        }
        Err(Error::ErrCodecNotFound)
    }

    /// get_codecs_by_kind returns the registered codecs of the given kind.
    pub(crate) fn get_codecs_by_kind(&self, kind: RTPCodecType) -> Vec<RTCRtpCodec> {
        self.codecs
            .iter()
            .filter(|codec| codec.kind == kind)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod media_engine_test {
    use super::*;

    #[test]
    fn test_register_default_codecs() -> Result<()> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;

        assert_eq!(m.get_codecs_by_kind(RTPCodecType::Audio).len(), 4);
        assert_eq!(m.get_codecs_by_kind(RTPCodecType::Video).len(), 3);

        let opus = m.get_codec(DEFAULT_PAYLOAD_TYPE_OPUS)?;
        assert_eq!(opus.name, OPUS);
        assert_eq!(opus.clock_rate, 48000);
        assert_eq!(opus.channels, 2);

        Ok(())
    }

    #[test]
    fn test_get_codec_sdp() -> Result<()> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;

        let sdp_codec = Codec {
            payload_type: 96,
            name: "vp8".to_owned(),
            clock_rate: 90000,
            ..Default::default()
        };

        let codec = m.get_codec_sdp(&sdp_codec)?;
        assert_eq!(codec.name, VP8);

        let unknown = Codec {
            payload_type: 19,
            name: "speex".to_owned(),
            clock_rate: 8000,
            ..Default::default()
        };
        assert_eq!(m.get_codec_sdp(&unknown), Err(Error::ErrCodecNotFound));

        Ok(())
    }
}
