pub mod ice_candidate;
pub mod ice_candidate_type;
pub mod ice_connection_state;
pub mod ice_credential_type;
pub mod ice_gatherer;
pub mod ice_gatherer_state;
pub mod ice_gathering_state;
pub mod ice_parameters;
pub mod ice_protocol;
pub mod ice_role;
pub mod ice_server;
pub mod ice_transport_state;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_gatherer::RTCIceGatherer;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_role::RTCIceRole;
use crate::ice_transport::ice_transport_state::RTCIceTransportState;

pub type OnConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(RTCIceTransportState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// ICETransport allows an application access to information about the ICE
/// transport over which packets are sent and received. The connectivity
/// checks themselves are the agent's concern and stay behind this interface.
#[derive(Default)]
pub struct RTCIceTransport {
    pub(crate) gatherer: Arc<RTCIceGatherer>,

    state: Arc<AtomicU8>, // RTCIceTransportState
    role: AtomicU8,       // RTCIceRole

    remote_parameters: Mutex<RTCIceParameters>,
    remote_candidates: Mutex<Vec<RTCIceCandidate>>,

    on_connection_state_change_handler: Arc<ArcSwapOption<Mutex<OnConnectionStateChangeHdlrFn>>>,
}

impl RTCIceTransport {
    pub(crate) fn new(gatherer: Arc<RTCIceGatherer>) -> Self {
        RTCIceTransport {
            gatherer,
            state: Arc::new(AtomicU8::new(RTCIceTransportState::New as u8)),
            ..Default::default()
        }
    }

    /// Start incoming connectivity checks based on its configured role.
    pub async fn start(
        &self,
        params: &RTCIceParameters,
        role: Option<RTCIceRole>,
    ) -> Result<()> {
        if self.state() != RTCIceTransportState::New {
            return Err(Error::ErrICETransportNotInNew);
        }

        {
            let mut remote_parameters = self.remote_parameters.lock().await;
            *remote_parameters = params.clone();
        }

        let role = role.unwrap_or(RTCIceRole::Controlled);
        self.role.store(role as u8, Ordering::SeqCst);

        self.set_state(RTCIceTransportState::Checking).await;

        Ok(())
    }

    /// Stop irreversibly stops the ICETransport.
    pub async fn stop(&self) -> Result<()> {
        self.set_state(RTCIceTransportState::Closed).await;
        self.gatherer.close().await
    }

    /// adds a candidate associated with the remote ICETransport.
    pub async fn add_remote_candidate(&self, remote_candidate: RTCIceCandidate) -> Result<()> {
        let mut remote_candidates = self.remote_candidates.lock().await;
        remote_candidates.push(remote_candidate);
        Ok(())
    }

    /// get_remote_candidates returns the remote candidates delivered so far.
    pub async fn get_remote_candidates(&self) -> Vec<RTCIceCandidate> {
        let remote_candidates = self.remote_candidates.lock().await;
        remote_candidates.clone()
    }

    /// Role indicates the current role of the ICE transport.
    pub fn role(&self) -> RTCIceRole {
        self.role.load(Ordering::SeqCst).into()
    }

    /// State returns the current ice transport state.
    pub fn state(&self) -> RTCIceTransportState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub(crate) async fn set_state(&self, s: RTCIceTransportState) {
        self.state.store(s as u8, Ordering::SeqCst);

        if let Some(handler) = self.on_connection_state_change_handler.load_full() {
            let mut f = handler.lock().await;
            f(s).await;
        }
    }

    /// on_connection_state_change sets a handler that is fired when the ICE
    /// connection state changes.
    pub fn on_connection_state_change(&self, f: OnConnectionStateChangeHdlrFn) {
        self.on_connection_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }
}

#[cfg(test)]
mod ice_transport_test {
    use super::*;

    #[tokio::test]
    async fn test_ice_transport_start_twice() -> Result<()> {
        let gatherer = Arc::new(RTCIceGatherer::new(vec![], Default::default(), false));
        let transport = RTCIceTransport::new(gatherer);

        let params = RTCIceParameters {
            username_fragment: "ufrag".to_owned(),
            password: "pwd".to_owned(),
            ice_lite: false,
        };

        transport
            .start(&params, Some(RTCIceRole::Controlling))
            .await?;
        assert_eq!(transport.state(), RTCIceTransportState::Checking);
        assert_eq!(transport.role(), RTCIceRole::Controlling);

        let result = transport.start(&params, Some(RTCIceRole::Controlling)).await;
        assert_eq!(result, Err(Error::ErrICETransportNotInNew));

        Ok(())
    }
}
