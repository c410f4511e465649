pub mod rtp_codec;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod rtp_transceiver_direction;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use util::sync::Mutex as SyncMutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::track::Track;

/// SSRC represents a synchronization source
/// A synchronization source is a randomly chosen
/// value meant to be globally unique within a particular
/// RTP session. Used to identify a single stream of media.
/// <https://tools.ietf.org/html/rfc3550#section-3>
#[allow(clippy::upper_case_acronyms)]
pub type SSRC = u32;

/// PayloadType identifies the format of the RTP payload and determines
/// its interpretation by the application. Each codec in a RTP Session
/// will have a different PayloadType
/// <https://tools.ietf.org/html/rfc3550#section-3>
pub type PayloadType = u8;

/// rtcpfeedback signals the connection to use additional RTCP packet types.
/// <https://draft.ortc.org/#dom-rtcrtcpfeedback>
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCPFeedback {
    /// Type is the type of feedback.
    /// see: <https://draft.ortc.org/#dom-rtcrtcpfeedback>
    /// valid: ack, ccm, nack, goog-remb, transport-cc
    pub typ: String,

    /// The parameter value depends on the type.
    /// For example, type="nack" parameter="pli" will send Picture Loss Indicator packets.
    pub parameter: String,
}

/// RTPCodingParameters provides information relating to both encoding and decoding.
/// This is a subset of the RFC since we don't implement encoding/decoding itself
/// <http://draft.ortc.org/#dom-rtcrtpcodingparameters>
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCRtpCodingParameters {
    pub ssrc: SSRC,
    pub payload_type: PayloadType,
}

/// RTPDecodingParameters provides information relating to both encoding and decoding.
/// This is a subset of the RFC since we don't implement decoding itself
/// <http://draft.ortc.org/#dom-rtcrtpdecodingparameters>
pub type RTCRtpDecodingParameters = RTCRtpCodingParameters;

/// RTPEncodingParameters provides information relating to both encoding and decoding.
/// This is a subset of the RFC since we don't implement encoding itself
/// <http://draft.ortc.org/#dom-rtcrtpencodingparameters>
pub type RTCRtpEncodingParameters = RTCRtpCodingParameters;

/// RTPReceiveParameters contains the RTP stack settings used by receivers
#[derive(Debug)]
pub struct RTCRtpReceiveParameters {
    pub encodings: Vec<RTCRtpDecodingParameters>,
}

/// RTPSendParameters contains the RTP stack settings used by senders
#[derive(Debug)]
pub struct RTCRtpSendParameters {
    pub encodings: Vec<RTCRtpEncodingParameters>,
}

/// RTPTransceiverInit dictionary is used when calling the WebRTC function
/// add_transceiver_from_kind() to provide configuration options for the new
/// transceiver.
pub struct RTCRtpTransceiverInit {
    pub direction: RTCRtpTransceiverDirection,
}

/// RTPTransceiver represents a combination of an RTPSender and an RTPReceiver
/// that share a common media section.
pub struct RTCRtpTransceiver {
    sender: SyncMutex<Option<Arc<RTCRtpSender>>>,
    receiver: SyncMutex<Option<Arc<RTCRtpReceiver>>>,

    direction: AtomicU8, // RTCRtpTransceiverDirection

    pub(crate) stopped: AtomicBool,
    pub(crate) kind: RTPCodecType,
}

impl RTCRtpTransceiver {
    pub(crate) fn new(
        receiver: Option<Arc<RTCRtpReceiver>>,
        sender: Option<Arc<RTCRtpSender>>,
        direction: RTCRtpTransceiverDirection,
        kind: RTPCodecType,
    ) -> Arc<Self> {
        Arc::new(RTCRtpTransceiver {
            receiver: SyncMutex::new(receiver),
            sender: SyncMutex::new(sender),
            direction: AtomicU8::new(direction as u8),
            stopped: AtomicBool::new(false),
            kind,
        })
    }

    /// sender returns the RTPTransceiver's RTPSender if it has one
    pub fn sender(&self) -> Option<Arc<RTCRtpSender>> {
        let sender = self.sender.lock();
        sender.clone()
    }

    /// receiver returns the RTPTransceiver's RTPReceiver if it has one
    pub fn receiver(&self) -> Option<Arc<RTCRtpReceiver>> {
        let receiver = self.receiver.lock();
        receiver.clone()
    }

    /// kind returns RTPTransceiver's kind.
    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// direction returns the RTPTransceiver's current direction
    pub fn direction(&self) -> RTCRtpTransceiverDirection {
        self.direction.load(Ordering::SeqCst).into()
    }

    pub(crate) fn set_direction(&self, d: RTCRtpTransceiverDirection) {
        self.direction.store(d as u8, Ordering::SeqCst);
    }

    /// stopped reports whether stop has been called on this transceiver.
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// set_sending_track attaches a track to the transceiver's sender and
    /// widens the direction to cover sending.
    pub(crate) fn set_sending_track(&self, track: Arc<Track>) -> Result<()> {
        {
            let sender = self.sender.lock();
            match &*sender {
                Some(s) => s.replace_track(Some(track)),
                None => return Err(Error::ErrRTPTransceiverSetSendingInvalidState),
            };
        }

        match self.direction() {
            RTCRtpTransceiverDirection::Recvonly => {
                self.set_direction(RTCRtpTransceiverDirection::Sendrecv)
            }
            RTCRtpTransceiverDirection::Sendrecv => {}
            _ => return Err(Error::ErrRTPTransceiverSetSendingInvalidState),
        };

        Ok(())
    }

    /// stop irreversibly stops the RTPTransceiver
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(sender) = self.sender() {
            sender.stop().await?;
        }
        if let Some(receiver) = self.receiver() {
            receiver.stop().await?;
        }

        self.set_direction(RTCRtpTransceiverDirection::Inactive);

        Ok(())
    }
}

impl fmt::Debug for RTCRtpTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCRtpTransceiver")
            .field("direction", &self.direction())
            .field("stopped", &self.stopped())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Given a direction+type pluck a transceiver from the passed list.
/// If no entry satisfies the requested type+direction a fresh inactive
/// transceiver is returned and the list is left untouched.
pub(crate) fn satisfy_type_and_direction(
    remote_kind: RTPCodecType,
    remote_direction: RTCRtpTransceiverDirection,
    local_transceivers: Vec<Arc<RTCRtpTransceiver>>,
) -> (Arc<RTCRtpTransceiver>, Vec<Arc<RTCRtpTransceiver>>) {
    // Get direction order from most preferred to least
    let get_preferred_directions = || -> Vec<RTCRtpTransceiverDirection> {
        match remote_direction {
            RTCRtpTransceiverDirection::Sendrecv => vec![
                RTCRtpTransceiverDirection::Recvonly,
                RTCRtpTransceiverDirection::Sendrecv,
            ],
            RTCRtpTransceiverDirection::Sendonly => vec![
                RTCRtpTransceiverDirection::Recvonly,
                RTCRtpTransceiverDirection::Sendrecv,
            ],
            RTCRtpTransceiverDirection::Recvonly => vec![
                RTCRtpTransceiverDirection::Sendonly,
                RTCRtpTransceiverDirection::Sendrecv,
            ],
            _ => vec![],
        }
    };

    let mut local_transceivers = local_transceivers;
    for possible_direction in get_preferred_directions() {
        for (i, t) in local_transceivers.iter().enumerate() {
            if t.kind == remote_kind && possible_direction == t.direction() {
                let t = local_transceivers.remove(i);
                return (t, local_transceivers);
            }
        }
    }

    (
        RTCRtpTransceiver::new(
            None,
            None,
            RTCRtpTransceiverDirection::Inactive,
            remote_kind,
        ),
        local_transceivers,
    )
}
