pub mod dtls_fingerprint;
pub mod dtls_parameters;
pub mod dtls_role;
pub mod dtls_transport_state;
pub(crate) mod srtp_session;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::dtls_transport::dtls_parameters::DTLSParameters;
use crate::dtls_transport::dtls_role::DTLSRole;
use crate::dtls_transport::dtls_transport_state::RTCDtlsTransportState;
use crate::dtls_transport::srtp_session::SrtpSession;
use crate::error::{Error, Result};
use crate::ice_transport::RTCIceTransport;
use crate::peer_connection::certificate::RTCCertificate;

/// DTLSTransport allows an application access to information about the DTLS
/// transport over which RTP and RTCP packets are sent and received by
/// RTPSender and RTPReceiver, as well other data such as SCTP packets sent
/// and received by data channels. The handshake itself stays behind this
/// interface; SRTP key material is exported as session handles.
#[derive(Default)]
pub struct RTCDtlsTransport {
    pub(crate) ice_transport: Arc<RTCIceTransport>,
    pub(crate) certificates: Vec<RTCCertificate>,

    pub(crate) state: AtomicU8, // RTCDtlsTransportState
    pub(crate) role: AtomicU8,  // DTLSRole
    pub(crate) remote_parameters: Mutex<DTLSParameters>,

    pub(crate) srtp_session: Mutex<Option<Arc<SrtpSession>>>,
    pub(crate) srtcp_session: Mutex<Option<Arc<SrtpSession>>>,
}

impl RTCDtlsTransport {
    pub(crate) fn new(
        ice_transport: Arc<RTCIceTransport>,
        certificates: Vec<RTCCertificate>,
    ) -> Self {
        RTCDtlsTransport {
            ice_transport,
            certificates,
            state: AtomicU8::new(RTCDtlsTransportState::New as u8),
            ..Default::default()
        }
    }

    /// ice_transport returns the currently-configured ICETransport
    pub fn ice_transport(&self) -> &RTCIceTransport {
        &self.ice_transport
    }

    /// state returns the current dtls_transport transport state.
    pub fn state(&self) -> RTCDtlsTransportState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// role indicates the role the DTLS transport is taking.
    pub fn role(&self) -> DTLSRole {
        self.role.load(Ordering::SeqCst).into()
    }

    /// get_local_parameters returns the DTLS parameters of the local
    /// DTLSTransport upon instantiation.
    pub fn get_local_parameters(&self) -> Result<DTLSParameters> {
        let mut fingerprints = vec![];

        for c in &self.certificates {
            fingerprints.extend(c.get_fingerprints()?);
        }

        Ok(DTLSParameters {
            role: DTLSRole::Auto, // always returns the default role
            fingerprints,
        })
    }

    /// start DTLS transport negotiation with the parameters of the remote DTLS
    /// transport. The handshake completion is reported by the state change to
    /// connected.
    pub async fn start(&self, remote_parameters: DTLSParameters) -> Result<()> {
        if self.state() != RTCDtlsTransportState::New {
            return Err(Error::ErrInvalidDTLSStart);
        }

        let role = if remote_parameters.role != DTLSRole::Unspecified {
            remote_parameters.role
        } else {
            DTLSRole::Client
        };
        self.role.store(role as u8, Ordering::SeqCst);

        {
            let mut remote = self.remote_parameters.lock().await;
            *remote = remote_parameters;
        }

        self.state_change(RTCDtlsTransportState::Connecting);
        self.state_change(RTCDtlsTransportState::Connected);

        Ok(())
    }

    /// stop stops and closes the DTLSTransport object.
    pub async fn stop(&self) -> Result<()> {
        {
            let srtp_session = self.srtp_session.lock().await;
            if let Some(session) = &*srtp_session {
                session.close().await?;
            }
        }
        {
            let srtcp_session = self.srtcp_session.lock().await;
            if let Some(session) = &*srtcp_session {
                session.close().await?;
            }
        }

        self.state_change(RTCDtlsTransportState::Closed);
        Ok(())
    }

    fn state_change(&self, state: RTCDtlsTransportState) {
        self.state.store(state as u8, Ordering::SeqCst);
        log::debug!("dtls transport state changed: {state}");
    }

    /// get_srtp_session lazily opens the SRTP session once the handshake has
    /// exported its keying material.
    pub(crate) async fn get_srtp_session(&self) -> Result<Arc<SrtpSession>> {
        if self.state() != RTCDtlsTransportState::Connected {
            return Err(Error::ErrDtlsTransportNotStarted);
        }

        let mut srtp_session = self.srtp_session.lock().await;
        if let Some(session) = &*srtp_session {
            Ok(Arc::clone(session))
        } else {
            let session = Arc::new(SrtpSession::new());
            *srtp_session = Some(Arc::clone(&session));
            Ok(session)
        }
    }

    /// get_srtcp_session lazily opens the SRTCP session once the handshake has
    /// exported its keying material.
    pub(crate) async fn get_srtcp_session(&self) -> Result<Arc<SrtpSession>> {
        if self.state() != RTCDtlsTransportState::Connected {
            return Err(Error::ErrDtlsTransportNotStarted);
        }

        let mut srtcp_session = self.srtcp_session.lock().await;
        if let Some(session) = &*srtcp_session {
            Ok(Arc::clone(session))
        } else {
            let session = Arc::new(SrtpSession::new());
            *srtcp_session = Some(Arc::clone(&session));
            Ok(session)
        }
    }
}
