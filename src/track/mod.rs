use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use util::sync::Mutex as SyncMutex;

use crate::rtp_transceiver::rtp_codec::{RTCRtpCodec, RTPCodecType};
use crate::rtp_transceiver::{PayloadType, SSRC};

/// Track represents a single media track of a single direction. Outbound
/// tracks are fully described at creation; for inbound tracks the id, label
/// and codec are filled in once the remote description and the first packet
/// have been processed.
#[derive(Default)]
pub struct Track {
    payload_type: AtomicU8,
    ssrc: AtomicU32,
    kind: AtomicU8, // RTPCodecType

    id: SyncMutex<String>,
    label: SyncMutex<String>,
    codec: SyncMutex<RTCRtpCodec>,
}

impl Track {
    pub(crate) fn new(
        payload_type: PayloadType,
        ssrc: SSRC,
        id: String,
        label: String,
        codec: RTCRtpCodec,
    ) -> Self {
        Track {
            payload_type: AtomicU8::new(payload_type),
            ssrc: AtomicU32::new(ssrc),
            kind: AtomicU8::new(codec.kind as u8),
            id: SyncMutex::new(id),
            label: SyncMutex::new(label),
            codec: SyncMutex::new(codec),
        }
    }

    pub(crate) fn new_inbound(ssrc: SSRC, kind: RTPCodecType) -> Self {
        Track {
            ssrc: AtomicU32::new(ssrc),
            kind: AtomicU8::new(kind as u8),
            ..Default::default()
        }
    }

    /// id gets the track id. For inbound tracks this is empty until the
    /// remote description has announced it.
    pub fn id(&self) -> String {
        let id = self.id.lock();
        id.clone()
    }

    /// label gets the track label (the msid stream label for inbound tracks).
    pub fn label(&self) -> String {
        let label = self.label.lock();
        label.clone()
    }

    /// ssrc returns the synchronization source of this track.
    pub fn ssrc(&self) -> SSRC {
        self.ssrc.load(Ordering::SeqCst)
    }

    /// payload_type returns the negotiated RTP payload type.
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type.load(Ordering::SeqCst)
    }

    /// kind returns the kind of track (audio or video).
    pub fn kind(&self) -> RTPCodecType {
        self.kind.load(Ordering::SeqCst).into()
    }

    /// codec returns the codec negotiated for this track.
    pub fn codec(&self) -> RTCRtpCodec {
        let codec = self.codec.lock();
        codec.clone()
    }

    pub(crate) fn set_payload_type(&self, payload_type: PayloadType) {
        self.payload_type.store(payload_type, Ordering::SeqCst);
    }

    pub(crate) fn set_details(&self, id: &str, label: &str, codec: RTCRtpCodec) {
        {
            let mut track_id = self.id.lock();
            *track_id = id.to_owned();
        }
        {
            let mut track_label = self.label.lock();
            *track_label = label.to_owned();
        }
        self.kind.store(codec.kind as u8, Ordering::SeqCst);
        {
            let mut track_codec = self.codec.lock();
            *track_codec = codec;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_track_inbound_details() {
        let track = Track::new_inbound(1234, RTPCodecType::Video);

        assert_eq!(track.ssrc(), 1234);
        assert_eq!(track.kind(), RTPCodecType::Video);
        assert!(track.id().is_empty());

        track.set_payload_type(96);
        track.set_details(
            "track-id",
            "stream-label",
            RTCRtpCodec {
                kind: RTPCodecType::Video,
                name: "VP8".to_owned(),
                payload_type: 96,
                clock_rate: 90000,
                ..Default::default()
            },
        );

        assert_eq!(track.payload_type(), 96);
        assert_eq!(track.id(), "track-id");
        assert_eq!(track.label(), "stream-label");
        assert_eq!(track.codec().name, "VP8");
    }
}
