use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use util::marshal::Unmarshal;
use util::sync::Mutex as SyncMutex;

use crate::dtls_transport::srtp_session::SrtpStream;
use crate::dtls_transport::RTCDtlsTransport;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::{PayloadType, RTCRtpReceiveParameters};
use crate::track::Track;

/// RTPReceiver allows an application to inspect the receipt of a Track. The
/// receiver owns one SRTP read stream once receive has been called.
pub struct RTCRtpReceiver {
    kind: RTPCodecType,
    transport: Arc<RTCDtlsTransport>,

    pub(crate) track: SyncMutex<Option<Arc<Track>>>,

    received: AtomicBool,
    closed: AtomicBool,

    read_stream: Mutex<Option<Arc<SrtpStream>>>,
}

impl RTCRtpReceiver {
    pub(crate) fn new(kind: RTPCodecType, transport: Arc<RTCDtlsTransport>) -> Self {
        RTCRtpReceiver {
            kind,
            transport,
            track: SyncMutex::new(None),
            received: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            read_stream: Mutex::new(None),
        }
    }

    /// kind reads the media type of the receiver.
    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// transport returns the currently-configured DTLSTransport
    pub fn transport(&self) -> Arc<RTCDtlsTransport> {
        Arc::clone(&self.transport)
    }

    /// track returns the RTCRtpTransceiver TrackRemote
    pub fn track(&self) -> Option<Arc<Track>> {
        let track = self.track.lock();
        track.clone()
    }

    /// receive initialize the track and starts all the transports
    pub async fn receive(&self, parameters: &RTCRtpReceiveParameters) -> Result<()> {
        if self.received.swap(true, Ordering::SeqCst) {
            return Err(Error::ErrRTPReceiverReceiveAlreadyCalled);
        }

        let ssrc = parameters
            .encodings
            .first()
            .map(|encoding| encoding.ssrc)
            .unwrap_or_default();

        let srtp_session = self.transport.get_srtp_session().await?;
        let stream = srtp_session.open_read_stream(ssrc).await?;
        {
            let mut read_stream = self.read_stream.lock().await;
            *read_stream = Some(stream);
        }

        {
            let mut track = self.track.lock();
            *track = Some(Arc::new(Track::new_inbound(ssrc, self.kind)));
        }

        Ok(())
    }

    /// determine_payload_type blocks and reads a single packet off the SRTP
    /// stream to determine the PayloadType for this track, recording it on
    /// the receiver's track.
    pub(crate) async fn determine_payload_type(&self) -> Result<PayloadType> {
        let stream = {
            let read_stream = self.read_stream.lock().await;
            read_stream
                .clone()
                .ok_or(Error::ErrICEConnectionNotStarted)?
        };

        let buf = stream.read().await?;
        let mut raw = &buf[..];
        let packet = rtp::packet::Packet::unmarshal(&mut raw)?;

        let payload_type = packet.header.payload_type;
        if let Some(track) = self.track() {
            track.set_payload_type(payload_type);
        }

        Ok(payload_type)
    }

    /// stop irreversibly stops the RTPReceiver
    pub async fn stop(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
