use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_gatherer_state::RTCIceGathererState;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_server::RTCIceServer;
use crate::math_rand_alpha;
use crate::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;

/// ICEGatherOptions provides options relating to the gathering of ICE candidates.
#[derive(Default, Debug, Clone)]
pub struct RTCIceGatherOptions {
    pub ice_servers: Vec<RTCIceServer>,
    pub ice_gather_policy: RTCIceTransportPolicy,
}

pub type OnLocalCandidateHdlrFn = Box<
    dyn (FnMut(Option<RTCIceCandidate>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnICEGathererStateChangeHdlrFn = Box<
    dyn (FnMut(RTCIceGathererState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnGatheringCompleteHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// ICEGatherer gathers local host, server reflexive and relay
/// candidates, as well as enabling the retrieval of local Interactive
/// Connectivity Establishment (ICE) parameters which can be
/// exchanged in signaling. The discovery itself is the agent's concern
/// and stays behind this interface.
#[derive(Default)]
pub struct RTCIceGatherer {
    pub(crate) validated_servers: Vec<RTCIceServer>,
    pub(crate) gather_policy: RTCIceTransportPolicy,

    /// agent_is_trickle reports whether the backing agent signals candidates
    /// while gathering instead of blocking until the process is complete.
    pub(crate) agent_is_trickle: bool,

    state: Arc<AtomicU8>, // RTCIceGathererState
    local_parameters: RTCIceParameters,
    local_candidates: Mutex<Vec<RTCIceCandidate>>,

    on_local_candidate_handler: Arc<ArcSwapOption<Mutex<OnLocalCandidateHdlrFn>>>,
    on_state_change_handler: Arc<ArcSwapOption<Mutex<OnICEGathererStateChangeHdlrFn>>>,
    on_gathering_complete_handler: Arc<ArcSwapOption<Mutex<OnGatheringCompleteHdlrFn>>>,
}

impl RTCIceGatherer {
    pub(crate) fn new(
        validated_servers: Vec<RTCIceServer>,
        gather_policy: RTCIceTransportPolicy,
        agent_is_trickle: bool,
    ) -> Self {
        RTCIceGatherer {
            validated_servers,
            gather_policy,
            agent_is_trickle,
            state: Arc::new(AtomicU8::new(RTCIceGathererState::New as u8)),
            local_parameters: RTCIceParameters {
                username_fragment: math_rand_alpha(16),
                password: math_rand_alpha(32),
                ice_lite: false,
            },
            ..Default::default()
        }
    }

    /// Gather ICE candidates.
    pub async fn gather(&self) -> Result<()> {
        if self.state() == RTCIceGathererState::Closed {
            return Err(Error::ErrICEGathererNotStarted);
        }

        self.set_state(RTCIceGathererState::Gathering).await;

        let candidates = self.get_local_candidates().await?;
        if let Some(handler) = self.on_local_candidate_handler.load_full() {
            for candidate in candidates {
                let mut f = handler.lock().await;
                f(Some(candidate)).await;
            }
        }

        self.set_state(RTCIceGathererState::Complete).await;

        if let Some(handler) = self.on_gathering_complete_handler.load_full() {
            let mut f = handler.lock().await;
            f().await;
        }
        if let Some(handler) = self.on_local_candidate_handler.load_full() {
            let mut f = handler.lock().await;
            f(None).await;
        }

        Ok(())
    }

    /// signal_candidates imitates the trickle callback for all candidates
    /// gathered so far. Used when trickle is disabled and candidates are
    /// handed out only after set_local_description.
    pub(crate) async fn signal_candidates(&self) -> Result<()> {
        let candidates = self.get_local_candidates().await?;

        if let Some(handler) = self.on_local_candidate_handler.load_full() {
            for candidate in candidates {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let mut f = handler.lock().await;
                    f(Some(candidate)).await;
                });
            }
        }

        Ok(())
    }

    /// Close prunes all local candidates.
    pub async fn close(&self) -> Result<()> {
        self.set_state(RTCIceGathererState::Closed).await;

        let mut local_candidates = self.local_candidates.lock().await;
        local_candidates.clear();

        Ok(())
    }

    /// get_local_parameters returns the ICE parameters of the ICEGatherer.
    pub async fn get_local_parameters(&self) -> Result<RTCIceParameters> {
        Ok(self.local_parameters.clone())
    }

    /// get_local_candidates returns the sequence of valid local candidates
    /// associated with the ICEGatherer.
    pub async fn get_local_candidates(&self) -> Result<Vec<RTCIceCandidate>> {
        let local_candidates = self.local_candidates.lock().await;
        Ok(local_candidates.clone())
    }

    /// on_local_candidate sets an event handler which fires when a new local
    /// ICE candidate is available. The handler is called with None when
    /// gathering is finished.
    pub fn on_local_candidate(&self, f: OnLocalCandidateHdlrFn) {
        self.on_local_candidate_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_state_change sets an event handler which fires any time the
    /// ICEGatherer changes
    pub fn on_state_change(&self, f: OnICEGathererStateChangeHdlrFn) {
        self.on_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_gathering_complete sets an event handler which fires once gathering
    /// is done
    pub fn on_gathering_complete(&self, f: OnGatheringCompleteHdlrFn) {
        self.on_gathering_complete_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// State indicates the current state of the ICE gatherer.
    pub fn state(&self) -> RTCIceGathererState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub(crate) async fn set_state(&self, s: RTCIceGathererState) {
        self.state.store(s as u8, Ordering::SeqCst);

        if let Some(handler) = self.on_state_change_handler.load_full() {
            let mut f = handler.lock().await;
            f(s).await;
        }
    }
}
