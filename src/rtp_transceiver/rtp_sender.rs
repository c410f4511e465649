use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use util::sync::Mutex as SyncMutex;

use crate::dtls_transport::RTCDtlsTransport;
use crate::error::{Error, Result};
use crate::rtp_transceiver::RTCRtpSendParameters;
use crate::track::Track;

/// RTPSender allows an application to control how a given Track is encoded
/// and transmitted to a remote peer. The SRTP write stream is acquired from
/// the DTLS transport once send is called.
pub struct RTCRtpSender {
    pub(crate) track: SyncMutex<Option<Arc<Track>>>,

    transport: Arc<RTCDtlsTransport>,

    send_called: AtomicBool,
    stopped: AtomicBool,
}

impl RTCRtpSender {
    pub(crate) fn new(track: Arc<Track>, transport: Arc<RTCDtlsTransport>) -> Self {
        RTCRtpSender {
            track: SyncMutex::new(Some(track)),
            transport,
            send_called: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// transport returns the currently-configured DTLSTransport
    /// if one has not yet been configured
    pub fn transport(&self) -> Arc<RTCDtlsTransport> {
        Arc::clone(&self.transport)
    }

    /// track returns the RTCRtpTransceiver track, or nil
    pub fn track(&self) -> Option<Arc<Track>> {
        let track = self.track.lock();
        track.clone()
    }

    pub(crate) fn replace_track(&self, track: Option<Arc<Track>>) {
        let mut t = self.track.lock();
        *t = track;
    }

    /// send RTP and enables this RTPSender
    pub async fn send(&self, _parameters: &RTCRtpSendParameters) -> Result<()> {
        if self.has_sent() {
            return Err(Error::ErrRTPSenderSendAlreadyCalled);
        }
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ErrRTPSenderStopped);
        }

        let srtp_session = self.transport.get_srtp_session().await?;
        srtp_session.open_write_stream().await?;

        self.send_called.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// stop irreversibly stops the RTPSender
    pub async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// has_sent tells if data has been ever sent for this instance
    pub(crate) fn has_sent(&self) -> bool {
        self.send_called.load(Ordering::SeqCst)
    }
}
