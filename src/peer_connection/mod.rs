#[cfg(test)]
pub(crate) mod peer_connection_test;

pub mod certificate;
pub mod configuration;
pub mod offer_answer_options;
pub mod peer_connection_state;
pub mod policy;
pub mod sdp;
pub mod signaling_state;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ::sdp::description::session::{SessionDescription, ATTR_KEY_GROUP, ATTR_KEY_SSRC};
use ::sdp::util::ConnectionRole;
use arc_swap::ArcSwapOption;
use bytes::BytesMut;
use rcgen::KeyPair;
use tokio::sync::{oneshot, Mutex};
use util::marshal::Marshal;

use crate::api::media_engine::MediaEngine;
use crate::api::{APIBuilder, API};
use crate::data_channel::data_channel_init::RTCDataChannelInit;
use crate::data_channel::data_channel_parameters::DataChannelParameters;
use crate::data_channel::data_channel_state::RTCDataChannelState;
use crate::data_channel::RTCDataChannel;
use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::dtls_transport::dtls_parameters::DTLSParameters;
use crate::dtls_transport::dtls_role::DTLSRole;
use crate::dtls_transport::RTCDtlsTransport;
use crate::error::{flatten_errs, Error, Result};
use crate::ice_transport::ice_candidate::{unmarshal_candidate, RTCIceCandidateInit};
use crate::ice_transport::ice_connection_state::RTCIceConnectionState;
use crate::ice_transport::ice_gatherer::{
    OnICEGathererStateChangeHdlrFn, OnLocalCandidateHdlrFn, RTCIceGatherOptions, RTCIceGatherer,
};
use crate::ice_transport::ice_gatherer_state::RTCIceGathererState;
use crate::ice_transport::ice_gathering_state::RTCIceGatheringState;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_role::RTCIceRole;
use crate::ice_transport::ice_transport_state::RTCIceTransportState;
use crate::ice_transport::RTCIceTransport;
use crate::peer_connection::certificate::RTCCertificate;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::offer_answer_options::{RTCAnswerOptions, RTCOfferOptions};
use crate::peer_connection::peer_connection_state::RTCPeerConnectionState;
use crate::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use crate::peer_connection::policy::sdp_semantics::RTCSdpSemantics;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::{
    add_data_media_section, add_transceiver_sdp, description_is_plan_b, extract_fingerprint,
    extract_ice_details, get_mid_value, get_peer_direction, populate_local_candidates,
};
use crate::peer_connection::signaling_state::{
    check_next_signaling_state, RTCSignalingState, StateChangeOp,
};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{
    satisfy_type_and_direction, PayloadType, RTCRtpCodingParameters, RTCRtpReceiveParameters,
    RTCRtpSendParameters, RTCRtpTransceiver, RTCRtpTransceiverInit, SSRC,
};
use crate::sctp_transport::sctp_transport_capabilities::SCTPTransportCapabilities;
use crate::sctp_transport::{RTCSctpTransport, SCTP_MAX_CHANNELS};
use crate::stats::stats_collector::StatsCollector;
use crate::stats::{stats_timestamp_now, PeerConnectionStats, RTCStatsType, StatsReport,
    StatsReportType};
use crate::track::Track;
use crate::{math_rand_alpha, MEDIA_SECTION_APPLICATION};

pub type OnSignalingStateChangeHdlrFn = Box<
    dyn (FnMut(RTCSignalingState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnICEConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(RTCIceConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnDataChannelHdlrFn = Box<
    dyn (FnMut(Arc<RTCDataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnTrackHdlrFn = Box<
    dyn (FnMut(
            Arc<Track>,
            Arc<RTCRtpReceiver>,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// PeerConnection represents a WebRTC connection that establishes a
/// peer-to-peer communications with another PeerConnection instance in a
/// browser, or to another endpoint implementing the required protocols.
pub struct RTCPeerConnection {
    stats_id: String,
    idp_login_url: Option<String>,

    configuration: Mutex<RTCConfiguration>,

    is_closed: Arc<AtomicBool>,
    signaling_state: Arc<AtomicU8>,      // RTCSignalingState
    ice_connection_state: Arc<AtomicU8>, // RTCIceConnectionState
    connection_state: Arc<AtomicU8>,     // RTCPeerConnectionState

    current_local_description: Arc<Mutex<Option<RTCSessionDescription>>>,
    pending_local_description: Arc<Mutex<Option<RTCSessionDescription>>>,
    current_remote_description: Arc<Mutex<Option<RTCSessionDescription>>>,
    pending_remote_description: Arc<Mutex<Option<RTCSessionDescription>>>,

    last_offer: Mutex<String>,
    last_answer: Mutex<String>,

    rtp_transceivers: Arc<Mutex<Vec<Arc<RTCRtpTransceiver>>>>,

    data_channels: Arc<Mutex<HashMap<u16, Arc<RTCDataChannel>>>>,
    data_channels_opened: Arc<AtomicU32>,
    data_channels_requested: AtomicU32,
    data_channels_accepted: Arc<AtomicU32>,

    on_signaling_state_change_handler: Arc<ArcSwapOption<Mutex<OnSignalingStateChangeHdlrFn>>>,
    on_ice_connection_state_change_handler:
        Arc<ArcSwapOption<Mutex<OnICEConnectionStateChangeHdlrFn>>>,
    on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
    on_data_channel_handler: Arc<ArcSwapOption<Mutex<OnDataChannelHdlrFn>>>,

    ice_gatherer: Arc<RTCIceGatherer>,
    ice_transport: Arc<RTCIceTransport>,
    dtls_transport: Arc<RTCDtlsTransport>,
    sctp_transport: Mutex<Option<Arc<RTCSctpTransport>>>,

    media_engine: Arc<MediaEngine>,
}

impl std::fmt::Debug for RTCPeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCPeerConnection")
            .field("stats_id", &self.stats_id)
            .field("signaling_state", &self.signaling_state())
            .field("ice_connection_state", &self.ice_connection_state())
            .finish()
    }
}

impl std::fmt::Display for RTCPeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(RTCPeerConnection {})", self.stats_id)
    }
}

#[derive(Clone)]
struct StartTransportsParams {
    ice_transport: Arc<RTCIceTransport>,
    dtls_transport: Arc<RTCDtlsTransport>,
    sctp_transport: Arc<RTCSctpTransport>,

    media_engine: Arc<MediaEngine>,
    rtp_transceivers: Arc<Mutex<Vec<Arc<RTCRtpTransceiver>>>>,
    current_local_description: Arc<Mutex<Option<RTCSessionDescription>>>,
    data_channels: Arc<Mutex<HashMap<u16, Arc<RTCDataChannel>>>>,
    data_channels_opened: Arc<AtomicU32>,
    on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,

    sdp_semantics: RTCSdpSemantics,
    remote_desc: RTCSessionDescription,
    ice_role: RTCIceRole,
    dtls_role: DTLSRole,
    remote_ufrag: String,
    remote_pwd: String,
    fingerprint: String,
    fingerprint_hash: String,
}

impl RTCPeerConnection {
    /// new creates a PeerConnection with the default codecs.
    /// If you wish to customize the set of available codecs, create a
    /// MediaEngine and use APIBuilder/new_peer_connection instead of this
    /// function.
    pub async fn new(configuration: RTCConfiguration) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let api = APIBuilder::new().with_media_engine(m).build();
        api.new_peer_connection(configuration).await
    }

    pub(crate) async fn new_with_api(api: &API, configuration: RTCConfiguration) -> Result<Self> {
        // https://w3c.github.io/webrtc-pc/#constructor (Step #2)
        // Some variables defined explicitly despite their implicit zero values to
        // allow better readability to understand what is happening.
        let configuration = RTCPeerConnection::init_configuration(configuration)?;

        let ice_gatherer = Arc::new(api.new_ice_gatherer(RTCIceGatherOptions {
            ice_servers: configuration.ice_servers.clone(),
            ice_gather_policy: configuration.ice_transport_policy,
        })?);

        if !ice_gatherer.agent_is_trickle {
            ice_gatherer.gather().await?;
        }

        let ice_transport = Arc::new(api.new_ice_transport(Arc::clone(&ice_gatherer)));

        let dtls_transport = Arc::new(
            api.new_dtls_transport(Arc::clone(&ice_transport), configuration.certificates.clone())?,
        );

        let ice_connection_state = Arc::new(AtomicU8::new(RTCIceConnectionState::New as u8));
        let on_ice_connection_state_change_handler: Arc<
            ArcSwapOption<Mutex<OnICEConnectionStateChangeHdlrFn>>,
        > = Arc::new(ArcSwapOption::empty());

        {
            let ice_connection_state = Arc::clone(&ice_connection_state);
            let on_state_change_handler = Arc::clone(&on_ice_connection_state_change_handler);
            ice_transport.on_connection_state_change(Box::new(
                move |state: RTCIceTransportState| {
                    let cs = match state {
                        RTCIceTransportState::New => RTCIceConnectionState::New,
                        RTCIceTransportState::Checking => RTCIceConnectionState::Checking,
                        RTCIceTransportState::Connected => RTCIceConnectionState::Connected,
                        RTCIceTransportState::Completed => RTCIceConnectionState::Completed,
                        RTCIceTransportState::Failed => RTCIceConnectionState::Failed,
                        RTCIceTransportState::Disconnected => RTCIceConnectionState::Disconnected,
                        RTCIceTransportState::Closed => RTCIceConnectionState::Closed,
                        _ => {
                            log::warn!("on_connection_state_change: unhandled ICE state: {state}");
                            return Box::pin(async {});
                        }
                    };

                    let ice_connection_state = Arc::clone(&ice_connection_state);
                    let handler = Arc::clone(&on_state_change_handler);
                    Box::pin(async move {
                        ice_connection_state.store(cs as u8, Ordering::SeqCst);
                        log::info!("ICE connection state changed: {cs}");
                        if let Some(handler) = handler.load_full() {
                            tokio::spawn(async move {
                                let mut f = handler.lock().await;
                                f(cs).await;
                            });
                        }
                    })
                },
            ));
        }

        Ok(RTCPeerConnection {
            stats_id: format!(
                "PeerConnection-{}",
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos())
            ),
            idp_login_url: None,
            configuration: Mutex::new(configuration),
            is_closed: Arc::new(AtomicBool::new(false)),
            signaling_state: Arc::new(AtomicU8::new(RTCSignalingState::Stable as u8)),
            ice_connection_state,
            connection_state: Arc::new(AtomicU8::new(RTCPeerConnectionState::New as u8)),
            current_local_description: Arc::new(Mutex::new(None)),
            pending_local_description: Arc::new(Mutex::new(None)),
            current_remote_description: Arc::new(Mutex::new(None)),
            pending_remote_description: Arc::new(Mutex::new(None)),
            last_offer: Mutex::new(String::new()),
            last_answer: Mutex::new(String::new()),
            rtp_transceivers: Arc::new(Mutex::new(vec![])),
            data_channels: Arc::new(Mutex::new(HashMap::new())),
            data_channels_opened: Arc::new(AtomicU32::new(0)),
            data_channels_requested: AtomicU32::new(0),
            data_channels_accepted: Arc::new(AtomicU32::new(0)),
            on_signaling_state_change_handler: Arc::new(ArcSwapOption::empty()),
            on_ice_connection_state_change_handler,
            on_track_handler: Arc::new(ArcSwapOption::empty()),
            on_data_channel_handler: Arc::new(ArcSwapOption::empty()),
            ice_gatherer,
            ice_transport,
            dtls_transport,
            sctp_transport: Mutex::new(None),
            media_engine: api.media_engine(),
        })
    }

    /// init_configuration defines validation of the specified Configuration and
    /// its assignment to the internal configuration variable. This function differs
    /// from its set_configuration counterpart because most of the checks do not
    /// include verification statements related to the existing state. Thus the
    /// function describes only minor verification of some the struct variables.
    fn init_configuration(configuration: RTCConfiguration) -> Result<RTCConfiguration> {
        let mut config = RTCConfiguration {
            ice_servers: vec![],
            ice_transport_policy: RTCIceTransportPolicy::All,
            bundle_policy: RTCBundlePolicy::Balanced,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            peer_identity: String::new(),
            certificates: vec![],
            ice_candidate_pool_size: 0,
            sdp_semantics: RTCSdpSemantics::UnifiedPlan,
        };

        if !configuration.peer_identity.is_empty() {
            config.peer_identity = configuration.peer_identity;
        }

        // https://www.w3.org/TR/webrtc/#constructor (step #3)
        if !configuration.certificates.is_empty() {
            let now = SystemTime::now();
            for cert in &configuration.certificates {
                cert.expires()
                    .duration_since(now)
                    .map_err(|_| Error::ErrCertificateExpired)?;
            }
            config.certificates = configuration.certificates;
        } else {
            let kp = KeyPair::generate(&rcgen::PKCS_ECDSA_P256_SHA256)?;
            let cert = RTCCertificate::from_key_pair(kp)?;
            config.certificates = vec![cert];
        }

        if configuration.bundle_policy != RTCBundlePolicy::Unspecified {
            config.bundle_policy = configuration.bundle_policy;
        }

        if configuration.rtcp_mux_policy != RTCRtcpMuxPolicy::Unspecified {
            config.rtcp_mux_policy = configuration.rtcp_mux_policy;
        }

        if configuration.ice_candidate_pool_size != 0 {
            config.ice_candidate_pool_size = configuration.ice_candidate_pool_size;
        }

        if configuration.ice_transport_policy != RTCIceTransportPolicy::Unspecified {
            config.ice_transport_policy = configuration.ice_transport_policy;
        }

        if configuration.sdp_semantics != RTCSdpSemantics::Unspecified {
            config.sdp_semantics = configuration.sdp_semantics;
        }

        if !configuration.ice_servers.is_empty() {
            for server in &configuration.ice_servers {
                server.validate()?;
            }
            config.ice_servers = configuration.ice_servers;
        }

        Ok(config)
    }

    /// on_signaling_state_change sets an event handler which is invoked when the
    /// peer connection's signaling state changes
    pub fn on_signaling_state_change(&self, f: OnSignalingStateChangeHdlrFn) {
        self.on_signaling_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    fn do_signaling_state_change(&self, new_state: RTCSignalingState) -> oneshot::Receiver<()> {
        log::info!("signaling state changed to {new_state}");

        let (done_tx, done_rx) = oneshot::channel();
        let handler = Arc::clone(&self.on_signaling_state_change_handler);
        tokio::spawn(async move {
            if let Some(handler) = handler.load_full() {
                let mut f = handler.lock().await;
                f(new_state).await;
            }
            let _ = done_tx.send(());
        });

        done_rx
    }

    /// on_data_channel sets an event handler which is invoked when a data
    /// channel message arrives from a remote peer.
    pub fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        self.on_data_channel_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_ice_candidate sets an event handler which is invoked when a new ICE
    /// candidate is found.
    pub fn on_ice_candidate(&self, f: OnLocalCandidateHdlrFn) {
        self.ice_gatherer.on_local_candidate(f)
    }

    /// on_ice_gathering_state_change sets an event handler which is invoked when
    /// the ICE candidate gathering state has changed.
    pub fn on_ice_gathering_state_change(&self, f: OnICEGathererStateChangeHdlrFn) {
        self.ice_gatherer.on_state_change(f)
    }

    /// on_track sets an event handler which is called when remote track
    /// arrives from a remote peer.
    pub fn on_track(&self, f: OnTrackHdlrFn) {
        self.on_track_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_ice_connection_state_change sets an event handler which is called
    /// when an ICE connection state is changed.
    pub fn on_ice_connection_state_change(&self, f: OnICEConnectionStateChangeHdlrFn) {
        self.on_ice_connection_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// set_configuration updates the configuration of this PeerConnection object.
    pub async fn set_configuration(&self, configuration: RTCConfiguration) -> Result<()> {
        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-setconfiguration (step #2)
        if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        let mut config = self.configuration.lock().await;

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #3)
        if !configuration.peer_identity.is_empty() {
            if configuration.peer_identity != config.peer_identity {
                return Err(Error::ErrModifyingPeerIdentity);
            }
            config.peer_identity = configuration.peer_identity;
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #4)
        if !configuration.certificates.is_empty() {
            if configuration.certificates.len() != config.certificates.len() {
                return Err(Error::ErrModifyingCertificates);
            }

            for (i, certificate) in configuration.certificates.iter().enumerate() {
                if config.certificates[i] != *certificate {
                    return Err(Error::ErrModifyingCertificates);
                }
            }
            config.certificates = configuration.certificates;
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #5)
        if configuration.bundle_policy != RTCBundlePolicy::Unspecified {
            if configuration.bundle_policy != config.bundle_policy {
                return Err(Error::ErrModifyingBundlePolicy);
            }
            config.bundle_policy = configuration.bundle_policy;
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #6)
        if configuration.rtcp_mux_policy != RTCRtcpMuxPolicy::Unspecified {
            if configuration.rtcp_mux_policy != config.rtcp_mux_policy {
                return Err(Error::ErrModifyingRTCPMuxPolicy);
            }
            config.rtcp_mux_policy = configuration.rtcp_mux_policy;
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #7)
        if configuration.ice_candidate_pool_size != 0 {
            if config.ice_candidate_pool_size != configuration.ice_candidate_pool_size
                && self.local_description().await.is_some()
            {
                return Err(Error::ErrModifyingICECandidatePoolSize);
            }
            config.ice_candidate_pool_size = configuration.ice_candidate_pool_size;
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #8)
        if configuration.ice_transport_policy != RTCIceTransportPolicy::Unspecified {
            config.ice_transport_policy = configuration.ice_transport_policy;
        }

        // The multiplexing style is fixed at construction time
        if configuration.sdp_semantics != RTCSdpSemantics::Unspecified {
            if configuration.sdp_semantics != config.sdp_semantics {
                return Err(Error::ErrModifyingSDPSemantics);
            }
            config.sdp_semantics = configuration.sdp_semantics;
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11)
        if !configuration.ice_servers.is_empty() {
            // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11.3)
            for server in &configuration.ice_servers {
                server.validate()?;
            }
            config.ice_servers = configuration.ice_servers;
        }

        Ok(())
    }

    /// get_configuration returns a Configuration object representing the current
    /// configuration of this PeerConnection object. The returned object is a
    /// copy and direct mutation on it will not take affect until set_configuration
    /// has been called with Configuration passed as its only argument.
    /// <https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-getconfiguration>
    pub async fn get_configuration(&self) -> RTCConfiguration {
        let configuration = self.configuration.lock().await;
        configuration.clone()
    }

    pub fn get_stats_id(&self) -> &str {
        self.stats_id.as_str()
    }

    /// create_offer starts the PeerConnection and generates the localDescription
    pub async fn create_offer(
        &self,
        options: Option<RTCOfferOptions>,
    ) -> Result<RTCSessionDescription> {
        let use_identity = self.idp_login_url.is_some();
        if options.is_some() {
            return Err(Error::ErrPeerConnOfferAnswerOptions);
        } else if use_identity {
            return Err(Error::ErrPeerConnOfferAnswerIdentityProvider);
        } else if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        let mut d = SessionDescription::new_jsep_session_description(use_identity);
        d = self.add_fingerprints(d).await?;

        let ice_params = self.ice_gatherer.get_local_parameters().await?;
        let candidates = self.ice_gatherer.get_local_candidates().await?;

        let sdp_semantics = {
            let configuration = self.configuration.lock().await;
            configuration.sdp_semantics
        };

        let mut bundle_value = "BUNDLE".to_owned();
        let mut bundle_count = 0;

        if sdp_semantics == RTCSdpSemantics::PlanB {
            let mut video = vec![];
            let mut audio = vec![];
            for t in self.get_transceivers().await {
                match t.kind {
                    RTPCodecType::Video => video.push(t),
                    RTPCodecType::Audio => audio.push(t),
                    _ => {}
                }
            }

            if !video.is_empty() {
                d = add_transceiver_sdp(
                    d,
                    &self.media_engine,
                    sdp_semantics,
                    "video",
                    &ice_params,
                    &candidates,
                    ConnectionRole::Actpass,
                    &video,
                )?;
                bundle_value += " video";
                bundle_count += 1;
            }
            if !audio.is_empty() {
                d = add_transceiver_sdp(
                    d,
                    &self.media_engine,
                    sdp_semantics,
                    "audio",
                    &ice_params,
                    &candidates,
                    ConnectionRole::Actpass,
                    &audio,
                )?;
                bundle_value += " audio";
                bundle_count += 1;
            }
        } else {
            for t in self.get_transceivers().await {
                let mid_value = bundle_count.to_string();
                d = add_transceiver_sdp(
                    d,
                    &self.media_engine,
                    sdp_semantics,
                    &mid_value,
                    &ice_params,
                    &candidates,
                    ConnectionRole::Actpass,
                    &[t],
                )?;
                bundle_value += &format!(" {mid_value}");
                bundle_count += 1;
            }
        }

        let mid_value = if sdp_semantics == RTCSdpSemantics::PlanB {
            "data".to_owned()
        } else {
            bundle_count.to_string()
        };
        d = add_data_media_section(
            d,
            &mid_value,
            &ice_params,
            &candidates,
            ConnectionRole::Actpass,
        );
        bundle_value += &format!(" {mid_value}");

        let d = d.with_value_attribute(ATTR_KEY_GROUP.to_owned(), bundle_value);

        let sdp = d.marshal();
        let desc = RTCSessionDescription {
            sdp_type: RTCSdpType::Offer,
            sdp,
            parsed: Some(d),
        };
        {
            let mut last_offer = self.last_offer.lock().await;
            *last_offer = desc.sdp.clone();
        }
        Ok(desc)
    }

    async fn add_fingerprints(&self, mut d: SessionDescription) -> Result<SessionDescription> {
        let fingerprints = {
            let configuration = self.configuration.lock().await;
            configuration.certificates[0].get_fingerprints()?
        };

        for fingerprint in fingerprints {
            d = d.with_fingerprint(fingerprint.algorithm, fingerprint.value.to_uppercase());
        }
        Ok(d)
    }

    async fn add_answer_media_transceivers(
        &self,
        mut d: SessionDescription,
    ) -> Result<SessionDescription> {
        let ice_params = self.ice_gatherer.get_local_parameters().await?;
        let candidates = self.ice_gatherer.get_local_candidates().await?;

        let sdp_semantics = {
            let configuration = self.configuration.lock().await;
            configuration.sdp_semantics
        };

        let mut bundle_value = "BUNDLE".to_owned();

        let mut local_transceivers = self.get_transceivers().await;

        let remote_description = self.remote_description().await;
        let detected_plan_b = description_is_plan_b(remote_description.as_ref());

        let parsed = match remote_description.as_ref().and_then(|d| d.parsed.as_ref()) {
            Some(parsed) => parsed,
            None => return Err(Error::ErrNoRemoteDescription),
        };

        for media in &parsed.media_descriptions {
            let mid_value = match get_mid_value(media) {
                Some(mid_value) => mid_value,
                None => return Err(Error::ErrPeerConnRemoteDescriptionWithoutMidValue),
            };

            if media.media_name.media == MEDIA_SECTION_APPLICATION {
                d = add_data_media_section(
                    d,
                    mid_value,
                    &ice_params,
                    &candidates,
                    ConnectionRole::Active,
                );
                bundle_value += &format!(" {mid_value}");
                continue;
            }

            let kind = RTPCodecType::from(media.media_name.media.as_str());
            let direction = get_peer_direction(media);
            if kind == RTPCodecType::Unspecified
                || direction == RTCRtpTransceiverDirection::Unspecified
            {
                continue;
            }

            let (t, remaining) = satisfy_type_and_direction(kind, direction, local_transceivers);
            local_transceivers = remaining;
            let mut media_transceivers = vec![t];

            match sdp_semantics {
                RTCSdpSemantics::UnifiedPlanWithFallback | RTCSdpSemantics::PlanB => {
                    if sdp_semantics == RTCSdpSemantics::UnifiedPlanWithFallback && !detected_plan_b
                    {
                        // If no fallback is needed, process as unified-plan
                    } else if !detected_plan_b {
                        return Err(Error::ErrIncorrectSDPSemantics);
                    } else {
                        // If we're responding to a plan-b offer, then we should try to fill up this
                        // media entry with all matching local transceivers
                        loop {
                            // keep going until we can't get any more
                            let (t, remaining) =
                                satisfy_type_and_direction(kind, direction, local_transceivers);
                            local_transceivers = remaining;
                            if t.direction() == RTCRtpTransceiverDirection::Inactive {
                                break;
                            }
                            media_transceivers.push(t);
                        }
                    }
                }
                _ => {
                    if detected_plan_b {
                        return Err(Error::ErrIncorrectSDPSemantics);
                    }
                }
            }

            d = add_transceiver_sdp(
                d,
                &self.media_engine,
                sdp_semantics,
                mid_value,
                &ice_params,
                &candidates,
                ConnectionRole::Active,
                &media_transceivers,
            )?;
            bundle_value += &format!(" {mid_value}");
        }

        if sdp_semantics == RTCSdpSemantics::UnifiedPlanWithFallback && detected_plan_b {
            log::info!("Plan-B Offer detected; responding with Plan-B Answer");
        }

        Ok(d.with_value_attribute(ATTR_KEY_GROUP.to_owned(), bundle_value))
    }

    /// create_answer starts the PeerConnection and generates the localDescription
    pub async fn create_answer(
        &self,
        options: Option<RTCAnswerOptions>,
    ) -> Result<RTCSessionDescription> {
        let use_identity = self.idp_login_url.is_some();
        if options.is_some() {
            return Err(Error::ErrPeerConnOfferAnswerOptions);
        } else if self.remote_description().await.is_none() {
            return Err(Error::ErrNoRemoteDescription);
        } else if use_identity {
            return Err(Error::ErrPeerConnOfferAnswerIdentityProvider);
        } else if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        let mut d = SessionDescription::new_jsep_session_description(use_identity);
        d = self.add_fingerprints(d).await?;

        let d = self.add_answer_media_transceivers(d).await?;

        let sdp = d.marshal();
        let desc = RTCSessionDescription {
            sdp_type: RTCSdpType::Answer,
            sdp,
            parsed: Some(d),
        };
        {
            let mut last_answer = self.last_answer.lock().await;
            *last_answer = desc.sdp.clone();
        }
        Ok(desc)
    }

    // 4.4.1.6 Set the SessionDescription
    async fn set_description(
        &self,
        sd: &RTCSessionDescription,
        op: StateChangeOp,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        let cur = self.signaling_state();

        let next_state = match op {
            StateChangeOp::SetLocal => {
                match sd.sdp_type {
                    // stable->SetLocal(offer)->have-local-offer
                    RTCSdpType::Offer => {
                        {
                            let last_offer = self.last_offer.lock().await;
                            if sd.sdp != *last_offer {
                                return Err(Error::ErrSDPDoesNotMatchOffer);
                            }
                        }
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::HaveLocalOffer,
                            StateChangeOp::SetLocal,
                            sd.sdp_type,
                        )?;
                        {
                            let mut pending_local_description =
                                self.pending_local_description.lock().await;
                            *pending_local_description = Some(sd.clone());
                        }
                        next_state
                    }
                    // have-remote-offer->SetLocal(answer)->stable
                    // have-local-pranswer->SetLocal(answer)->stable
                    RTCSdpType::Answer => {
                        {
                            let last_answer = self.last_answer.lock().await;
                            if sd.sdp != *last_answer {
                                return Err(Error::ErrSDPDoesNotMatchAnswer);
                            }
                        }
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::Stable,
                            StateChangeOp::SetLocal,
                            sd.sdp_type,
                        )?;
                        {
                            let mut current_local_description =
                                self.current_local_description.lock().await;
                            *current_local_description = Some(sd.clone());
                        }
                        {
                            let mut current_remote_description =
                                self.current_remote_description.lock().await;
                            let mut pending_remote_description =
                                self.pending_remote_description.lock().await;
                            *current_remote_description = pending_remote_description.take();
                        }
                        {
                            let mut pending_local_description =
                                self.pending_local_description.lock().await;
                            *pending_local_description = None;
                        }
                        next_state
                    }
                    RTCSdpType::Rollback => {
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::Stable,
                            StateChangeOp::SetLocal,
                            sd.sdp_type,
                        )?;
                        {
                            let mut pending_local_description =
                                self.pending_local_description.lock().await;
                            *pending_local_description = None;
                        }
                        next_state
                    }
                    // have-remote-offer->SetLocal(pranswer)->have-local-pranswer
                    RTCSdpType::Pranswer => {
                        {
                            let last_answer = self.last_answer.lock().await;
                            if sd.sdp != *last_answer {
                                return Err(Error::ErrSDPDoesNotMatchAnswer);
                            }
                        }
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::HaveLocalPranswer,
                            StateChangeOp::SetLocal,
                            sd.sdp_type,
                        )?;
                        {
                            let mut pending_local_description =
                                self.pending_local_description.lock().await;
                            *pending_local_description = Some(sd.clone());
                        }
                        next_state
                    }
                    _ => return Err(Error::ErrPeerConnStateChangeInvalid),
                }
            }
            StateChangeOp::SetRemote => {
                match sd.sdp_type {
                    // stable->SetRemote(offer)->have-remote-offer
                    RTCSdpType::Offer => {
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::HaveRemoteOffer,
                            StateChangeOp::SetRemote,
                            sd.sdp_type,
                        )?;
                        {
                            let mut pending_remote_description =
                                self.pending_remote_description.lock().await;
                            *pending_remote_description = Some(sd.clone());
                        }
                        next_state
                    }
                    // have-local-offer->SetRemote(answer)->stable
                    // have-remote-pranswer->SetRemote(answer)->stable
                    RTCSdpType::Answer => {
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::Stable,
                            StateChangeOp::SetRemote,
                            sd.sdp_type,
                        )?;
                        {
                            let mut current_remote_description =
                                self.current_remote_description.lock().await;
                            *current_remote_description = Some(sd.clone());
                        }
                        {
                            let mut current_local_description =
                                self.current_local_description.lock().await;
                            let mut pending_local_description =
                                self.pending_local_description.lock().await;
                            *current_local_description = pending_local_description.take();
                        }
                        {
                            let mut pending_remote_description =
                                self.pending_remote_description.lock().await;
                            *pending_remote_description = None;
                        }
                        next_state
                    }
                    RTCSdpType::Rollback => {
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::Stable,
                            StateChangeOp::SetRemote,
                            sd.sdp_type,
                        )?;
                        {
                            let mut pending_remote_description =
                                self.pending_remote_description.lock().await;
                            *pending_remote_description = None;
                        }
                        next_state
                    }
                    // have-local-offer->SetRemote(pranswer)->have-remote-pranswer
                    RTCSdpType::Pranswer => {
                        let next_state = check_next_signaling_state(
                            cur,
                            RTCSignalingState::HaveRemotePranswer,
                            StateChangeOp::SetRemote,
                            sd.sdp_type,
                        )?;
                        {
                            let mut pending_remote_description =
                                self.pending_remote_description.lock().await;
                            *pending_remote_description = Some(sd.clone());
                        }
                        next_state
                    }
                    _ => return Err(Error::ErrPeerConnStateChangeInvalid),
                }
            }
        };

        self.signaling_state.store(next_state as u8, Ordering::SeqCst);
        self.do_signaling_state_change(next_state);
        Ok(())
    }

    /// set_local_description sets the SessionDescription of the local peer
    pub async fn set_local_description(&self, mut desc: RTCSessionDescription) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        // JSEP 5.4
        if desc.sdp.is_empty() {
            match desc.sdp_type {
                RTCSdpType::Answer | RTCSdpType::Pranswer => {
                    let last_answer = self.last_answer.lock().await;
                    desc.sdp = last_answer.clone();
                }
                RTCSdpType::Offer => {
                    let last_offer = self.last_offer.lock().await;
                    desc.sdp = last_offer.clone();
                }
                _ => return Err(Error::ErrPeerConnSDPTypeInvalidValueSetLocalDescription),
            }
        }

        desc.parsed = Some(desc.unmarshal()?);
        self.set_description(&desc, StateChangeOp::SetLocal).await?;

        // To support all unittests which are following the future trickle=true
        // setup while also support the old trickle=false synchronous gathering
        // process this is necessary to avoid calling gather() in multiple
        // places; which causes race conditions. (issue-707)
        if !self.ice_gatherer.agent_is_trickle {
            return self.ice_gatherer.signal_candidates().await;
        }

        if desc.sdp_type == RTCSdpType::Answer {
            return self.ice_gatherer.gather().await;
        }
        Ok(())
    }

    /// local_description returns PendingLocalDescription if it is not null and
    /// otherwise it returns CurrentLocalDescription. This property is used to
    /// determine if set_local_description has already been called.
    /// <https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-localdescription>
    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        if let Some(pending_local_description) = self.pending_local_description().await {
            return Some(pending_local_description);
        }
        let current_local_description = self.current_local_description.lock().await;
        current_local_description.clone()
    }

    /// set_remote_description sets the SessionDescription of the remote peer
    pub async fn set_remote_description(&self, mut desc: RTCSessionDescription) -> Result<()> {
        {
            let current_remote_description = self.current_remote_description.lock().await;
            if current_remote_description.is_some() {
                return Err(Error::ErrRemoteDescriptionAlreadyDefined);
            }
        }
        if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        desc.parsed = Some(desc.unmarshal()?);
        self.set_description(&desc, StateChangeOp::SetRemote).await?;

        let we_offer = desc.sdp_type != RTCSdpType::Offer;

        let (fingerprint, fingerprint_hash, remote_ufrag, remote_pwd, dtls_role) =
            if let Some(parsed) = &desc.parsed {
                let (fingerprint, fingerprint_hash) = extract_fingerprint(parsed)?;
                let (remote_ufrag, remote_pwd, candidates) = extract_ice_details(parsed)?;

                for candidate in candidates {
                    self.ice_transport.add_remote_candidate(candidate).await?;
                }

                (
                    fingerprint,
                    fingerprint_hash,
                    remote_ufrag,
                    remote_pwd,
                    DTLSRole::from(parsed),
                )
            } else {
                return Err(Error::ErrNoRemoteDescription);
            };

        // Create the SCTP transport
        let sctp_transport = Arc::new(RTCSctpTransport::new(Arc::clone(&self.dtls_transport)));
        {
            let mut sctp = self.sctp_transport.lock().await;
            *sctp = Some(Arc::clone(&sctp_transport));
        }

        // Wire up the on datachannel handler
        {
            let data_channels = Arc::clone(&self.data_channels);
            let data_channels_accepted = Arc::clone(&self.data_channels_accepted);
            let on_data_channel_handler = Arc::clone(&self.on_data_channel_handler);
            sctp_transport.on_data_channel(Box::new(move |d: Arc<RTCDataChannel>| {
                let data_channels = Arc::clone(&data_channels);
                let data_channels_accepted = Arc::clone(&data_channels_accepted);
                let on_data_channel_handler = Arc::clone(&on_data_channel_handler);
                Box::pin(async move {
                    {
                        let mut dcs = data_channels.lock().await;
                        dcs.insert(d.id(), Arc::clone(&d));
                    }
                    data_channels_accepted.fetch_add(1, Ordering::SeqCst);

                    if let Some(handler) = on_data_channel_handler.load_full() {
                        let mut f = handler.lock().await;
                        f(d).await;
                    }
                })
            }));
        }

        // Wire up the on datachannel opened handler
        {
            let data_channels_opened = Arc::clone(&self.data_channels_opened);
            sctp_transport.on_data_channel_opened(Box::new(move |_d: Arc<RTCDataChannel>| {
                let data_channels_opened = Arc::clone(&data_channels_opened);
                Box::pin(async move {
                    data_channels_opened.fetch_add(1, Ordering::SeqCst);
                })
            }));
        }

        let sdp_semantics = {
            let configuration = self.configuration.lock().await;
            configuration.sdp_semantics
        };

        let params = StartTransportsParams {
            ice_transport: Arc::clone(&self.ice_transport),
            dtls_transport: Arc::clone(&self.dtls_transport),
            sctp_transport,
            media_engine: Arc::clone(&self.media_engine),
            rtp_transceivers: Arc::clone(&self.rtp_transceivers),
            current_local_description: Arc::clone(&self.current_local_description),
            data_channels: Arc::clone(&self.data_channels),
            data_channels_opened: Arc::clone(&self.data_channels_opened),
            on_track_handler: Arc::clone(&self.on_track_handler),
            sdp_semantics,
            remote_desc: desc.clone(),
            ice_role: if we_offer {
                RTCIceRole::Controlling
            } else {
                RTCIceRole::Controlled
            },
            dtls_role,
            remote_ufrag,
            remote_pwd,
            fingerprint,
            fingerprint_hash,
        };

        tokio::spawn(async move {
            // Start the networking in a new routine since it will block until
            // the connection is actually established.
            start_transports(params).await;
        });

        if (desc.sdp_type == RTCSdpType::Answer || desc.sdp_type == RTCSdpType::Pranswer)
            && self.ice_gatherer.agent_is_trickle
        {
            return self.ice_gatherer.gather().await;
        }
        Ok(())
    }

    /// remote_description returns pending_remote_description if it is not null and
    /// otherwise it returns current_remote_description. This property is used to
    /// determine if setRemoteDescription has already been called.
    /// <https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-remotedescription>
    pub async fn remote_description(&self) -> Option<RTCSessionDescription> {
        {
            let pending_remote_description = self.pending_remote_description.lock().await;
            if pending_remote_description.is_some() {
                return pending_remote_description.clone();
            }
        }
        let current_remote_description = self.current_remote_description.lock().await;
        current_remote_description.clone()
    }

    /// add_ice_candidate accepts an ICE candidate string and adds it
    /// to the existing set of candidates
    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        if self.remote_description().await.is_none() {
            return Err(Error::ErrNoRemoteDescription);
        }

        let candidate_value = match candidate.candidate.strip_prefix("candidate:") {
            Some(s) => s,
            None => candidate.candidate.as_str(),
        };
        let ice_candidate = unmarshal_candidate(candidate_value)?;

        self.ice_transport.add_remote_candidate(ice_candidate).await
    }

    /// ice_connection_state returns the ICE connection state of the
    /// PeerConnection instance.
    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        self.ice_connection_state.load(Ordering::SeqCst).into()
    }

    /// get_senders returns the RTPSender that are currently attached to this PeerConnection
    pub async fn get_senders(&self) -> Vec<Arc<RTCRtpSender>> {
        let mut senders = vec![];
        let rtp_transceivers = self.rtp_transceivers.lock().await;
        for transceiver in &*rtp_transceivers {
            if let Some(sender) = transceiver.sender() {
                senders.push(sender);
            }
        }
        senders
    }

    /// get_receivers returns the RTPReceivers that are currently attached to this PeerConnection
    pub async fn get_receivers(&self) -> Vec<Arc<RTCRtpReceiver>> {
        let mut receivers = vec![];
        let rtp_transceivers = self.rtp_transceivers.lock().await;
        for transceiver in &*rtp_transceivers {
            if let Some(receiver) = transceiver.receiver() {
                receivers.push(receiver);
            }
        }
        receivers
    }

    /// get_transceivers returns the RtpTransceiver that are currently attached to this PeerConnection
    pub async fn get_transceivers(&self) -> Vec<Arc<RTCRtpTransceiver>> {
        let rtp_transceivers = self.rtp_transceivers.lock().await;
        rtp_transceivers.clone()
    }

    /// add_track adds a Track to the PeerConnection
    pub async fn add_track(&self, track: Arc<Track>) -> Result<Arc<RTCRtpSender>> {
        if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        let mut transceiver = None;
        for t in self.get_transceivers().await {
            if t.stopped() {
                continue;
            }
            let sender = match t.sender() {
                Some(sender) => sender,
                None => continue,
            };
            if sender.has_sent() {
                continue;
            }
            let receiver_track = match t.receiver().and_then(|r| r.track()) {
                Some(receiver_track) => receiver_track,
                None => continue,
            };
            if receiver_track.kind() == track.kind() {
                transceiver = Some(t);
                break;
            }
        }

        if let Some(t) = transceiver {
            t.set_sending_track(Arc::clone(&track))?;
            match t.sender() {
                Some(sender) => Ok(sender),
                None => Err(Error::ErrRTPSenderTrackNil),
            }
        } else {
            let receiver = Arc::new(RTCRtpReceiver::new(
                track.kind(),
                Arc::clone(&self.dtls_transport),
            ));
            let sender = Arc::new(RTCRtpSender::new(
                Arc::clone(&track),
                Arc::clone(&self.dtls_transport),
            ));
            self.new_rtp_transceiver(
                Some(receiver),
                Some(Arc::clone(&sender)),
                RTCRtpTransceiverDirection::Sendrecv,
                track.kind(),
            )
            .await;

            Ok(sender)
        }
    }

    /// add_transceiver Create a new RtpTransceiver and adds it to the set of transceivers.
    /// Deprecated: Use add_track, add_transceiver_from_kind or add_transceiver_from_track
    pub async fn add_transceiver(
        &self,
        track_or_kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        self.add_transceiver_from_kind(track_or_kind, init).await
    }

    /// add_transceiver_from_kind Create a new RtpTransceiver(SendRecv or RecvOnly)
    /// and adds it to the set of transceivers.
    pub async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        let direction = match init {
            Some(init) => init.direction,
            None => RTCRtpTransceiverDirection::Sendrecv,
        };

        match direction {
            RTCRtpTransceiverDirection::Sendrecv => {
                let receiver = Arc::new(RTCRtpReceiver::new(
                    kind,
                    Arc::clone(&self.dtls_transport),
                ));

                let codecs = self.media_engine.get_codecs_by_kind(kind);
                if codecs.is_empty() {
                    return Err(Error::ErrNoCodecsAvailable);
                }

                let track = self.new_track(
                    codecs[0].payload_type,
                    rand::random::<u32>(),
                    math_rand_alpha(16),
                    math_rand_alpha(16),
                )?;

                let sender = Arc::new(RTCRtpSender::new(track, Arc::clone(&self.dtls_transport)));

                Ok(self
                    .new_rtp_transceiver(
                        Some(receiver),
                        Some(sender),
                        RTCRtpTransceiverDirection::Sendrecv,
                        kind,
                    )
                    .await)
            }
            RTCRtpTransceiverDirection::Recvonly => {
                let receiver = Arc::new(RTCRtpReceiver::new(
                    kind,
                    Arc::clone(&self.dtls_transport),
                ));

                Ok(self
                    .new_rtp_transceiver(
                        Some(receiver),
                        None,
                        RTCRtpTransceiverDirection::Recvonly,
                        kind,
                    )
                    .await)
            }
            _ => Err(Error::ErrPeerConnAddTransceiverFromKindSupport),
        }
    }

    /// add_transceiver_from_track Creates a new send only transceiver and add it to the set of
    pub async fn add_transceiver_from_track(
        &self,
        track: Arc<Track>,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        let direction = match init {
            Some(init) => init.direction,
            None => RTCRtpTransceiverDirection::Sendrecv,
        };

        match direction {
            RTCRtpTransceiverDirection::Sendrecv => {
                let receiver = Arc::new(RTCRtpReceiver::new(
                    track.kind(),
                    Arc::clone(&self.dtls_transport),
                ));
                let sender = Arc::new(RTCRtpSender::new(
                    Arc::clone(&track),
                    Arc::clone(&self.dtls_transport),
                ));

                Ok(self
                    .new_rtp_transceiver(
                        Some(receiver),
                        Some(sender),
                        RTCRtpTransceiverDirection::Sendrecv,
                        track.kind(),
                    )
                    .await)
            }
            RTCRtpTransceiverDirection::Sendonly => {
                let sender = Arc::new(RTCRtpSender::new(
                    Arc::clone(&track),
                    Arc::clone(&self.dtls_transport),
                ));

                Ok(self
                    .new_rtp_transceiver(
                        None,
                        Some(sender),
                        RTCRtpTransceiverDirection::Sendonly,
                        track.kind(),
                    )
                    .await)
            }
            _ => Err(Error::ErrPeerConnAddTransceiverFromTrackSupport),
        }
    }

    /// create_data_channel creates a new DataChannel object with the given label
    /// and optional DataChannelInit used to configure properties of the
    /// underlying channel such as data reliability.
    pub async fn create_data_channel(
        &self,
        label: &str,
        options: Option<RTCDataChannelInit>,
    ) -> Result<Arc<RTCDataChannel>> {
        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #2)
        if self.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #5)
        if label.len() > 65535 {
            return Err(Error::ErrStringSizeLimit);
        }

        let mut params = DataChannelParameters {
            label: label.to_owned(),
            ordered: true,
            ..Default::default()
        };

        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #19)
        params.id = match options.as_ref().and_then(|o| o.id) {
            Some(id) => id,
            None => self.generate_data_channel_id(true).await?,
        };

        if let Some(options) = options {
            // Ordered indicates if data is allowed to be delivered out of order. The
            // default value of true, guarantees that data will be delivered in order.
            if let Some(ordered) = options.ordered {
                params.ordered = ordered;
            }

            // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #7)
            if let Some(max_packet_life_time) = options.max_packet_life_time {
                params.max_packet_life_time = Some(max_packet_life_time);
            }

            // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #8)
            if let Some(max_retransmits) = options.max_retransmits {
                params.max_retransmits = Some(max_retransmits);
            }

            if let Some(protocol) = options.protocol {
                params.protocol = protocol;
            }
        }

        let d = Arc::new(RTCDataChannel::new(params));

        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #16)
        if d.max_packet_lifetime.is_some() && d.max_retransmits.is_some() {
            return Err(Error::ErrRetransmitsOrPacketLifeTime);
        }

        // Remember datachannel
        {
            let mut data_channels = self.data_channels.lock().await;
            data_channels.insert(d.id(), Arc::clone(&d));
        }
        self.data_channels_requested.fetch_add(1, Ordering::SeqCst);

        // Open if networking already started
        let sctp_ready = {
            let sctp_transport = self.sctp_transport.lock().await;
            match &*sctp_transport {
                Some(sctp_transport) => {
                    if sctp_transport.association().await.is_some() {
                        Some(Arc::clone(sctp_transport))
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(sctp_transport) = sctp_ready {
            d.open(sctp_transport).await?;
        }

        Ok(d)
    }

    async fn generate_data_channel_id(&self, client: bool) -> Result<u16> {
        let mut id = 0u16;
        if !client {
            id += 1;
        }

        let max = {
            let sctp_transport = self.sctp_transport.lock().await;
            match &*sctp_transport {
                Some(sctp_transport) => sctp_transport.max_channels(),
                None => SCTP_MAX_CHANNELS,
            }
        };

        let data_channels = self.data_channels.lock().await;
        while id < max - 1 {
            if data_channels.contains_key(&id) {
                id += 2;
            } else {
                return Ok(id);
            }
        }

        Err(Error::ErrMaxDataChannelID)
    }

    /// set_identity_provider is used to configure an identity provider to generate identity assertions
    pub fn set_identity_provider(&self, _provider: &str) -> Result<()> {
        Err(Error::ErrPeerConnSetIdentityProviderNotImplemented)
    }

    /// write_rtcp sends a user provided RTCP packet to the connected peer
    /// If no peer is connected the packet is discarded
    pub async fn write_rtcp(
        &self,
        pkts: &[Box<dyn rtcp::packet::Packet + Send + Sync>],
    ) -> Result<()> {
        let mut raw = BytesMut::new();
        for pkt in pkts {
            raw.extend_from_slice(&pkt.marshal()?);
        }

        let srtcp_session = match self.dtls_transport.get_srtcp_session().await {
            Ok(srtcp_session) => srtcp_session,
            Err(_) => return Ok(()),
        };

        let write_stream = srtcp_session
            .open_write_stream()
            .await
            .map_err(|_| Error::ErrPeerConnWriteRTCPOpenWriteStream)?;

        write_stream.write(&raw.freeze())?;
        Ok(())
    }

    /// close ends the PeerConnection
    pub async fn close(&self) -> Result<()> {
        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #2)
        if self.is_closed() {
            return Ok(());
        }

        // Try closing everything and collect the errors
        let mut close_errs: Vec<Error> = vec![];

        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #3)
        self.is_closed.store(true, Ordering::SeqCst);

        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #4)
        self.signaling_state
            .store(RTCSignalingState::Closed as u8, Ordering::SeqCst);

        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #11)
        if let Err(err) = self.ice_transport.stop().await {
            close_errs.push(err);
        }

        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #12)
        self.connection_state
            .store(RTCPeerConnectionState::Closed as u8, Ordering::SeqCst);

        if let Err(err) = self.dtls_transport.stop().await {
            close_errs.push(err);
        }

        {
            let sctp_transport = self.sctp_transport.lock().await;
            if let Some(sctp_transport) = &*sctp_transport {
                if let Err(err) = sctp_transport.stop().await {
                    close_errs.push(err);
                }
            }
        }

        for t in self.get_transceivers().await {
            if let Err(err) = t.stop().await {
                close_errs.push(err);
            }
        }

        flatten_errs(close_errs)
    }

    /// new_track creates a new Track, validating the payload type against the
    /// media engine.
    pub fn new_track(
        &self,
        payload_type: PayloadType,
        ssrc: SSRC,
        id: String,
        label: String,
    ) -> Result<Arc<Track>> {
        let codec = self.media_engine.get_codec(payload_type)?;
        Ok(Arc::new(Track::new(payload_type, ssrc, id, label, codec)))
    }

    async fn new_rtp_transceiver(
        &self,
        receiver: Option<Arc<RTCRtpReceiver>>,
        sender: Option<Arc<RTCRtpSender>>,
        direction: RTCRtpTransceiverDirection,
        kind: RTPCodecType,
    ) -> Arc<RTCRtpTransceiver> {
        let t = RTCRtpTransceiver::new(receiver, sender, direction, kind);

        let mut rtp_transceivers = self.rtp_transceivers.lock().await;
        rtp_transceivers.push(Arc::clone(&t));
        t
    }

    /// current_local_description represents the local description that was
    /// successfully negotiated the last time the PeerConnection transitioned
    /// into the stable state plus any local candidates that have been generated
    /// by the ICEAgent since the offer or answer was created.
    pub async fn current_local_description(&self) -> Option<RTCSessionDescription> {
        let current_local_description = {
            let desc = self.current_local_description.lock().await;
            desc.clone()
        };
        populate_local_candidates(current_local_description.as_ref(), &self.ice_gatherer).await
    }

    /// pending_local_description represents a local description that is in the
    /// process of being negotiated plus any local candidates that have been
    /// generated by the ICEAgent since the offer or answer was created. If the
    /// PeerConnection is in the stable state, the value is null.
    pub async fn pending_local_description(&self) -> Option<RTCSessionDescription> {
        let pending_local_description = {
            let desc = self.pending_local_description.lock().await;
            desc.clone()
        };
        populate_local_candidates(pending_local_description.as_ref(), &self.ice_gatherer).await
    }

    /// current_remote_description represents the last remote description that was
    /// successfully negotiated the last time the PeerConnection transitioned
    /// into the stable state plus any remote candidates that have been supplied
    /// via add_ice_candidate() since the offer or answer was created.
    pub async fn current_remote_description(&self) -> Option<RTCSessionDescription> {
        let current_remote_description = self.current_remote_description.lock().await;
        current_remote_description.clone()
    }

    /// pending_remote_description represents a remote description that is in the
    /// process of being negotiated, complete with any remote candidates that
    /// have been supplied via add_ice_candidate() since the offer or answer was
    /// created. If the PeerConnection is in the stable state, the value is
    /// null.
    pub async fn pending_remote_description(&self) -> Option<RTCSessionDescription> {
        let pending_remote_description = self.pending_remote_description.lock().await;
        pending_remote_description.clone()
    }

    /// signaling_state attribute returns the signaling state of the
    /// PeerConnection instance.
    pub fn signaling_state(&self) -> RTCSignalingState {
        self.signaling_state.load(Ordering::SeqCst).into()
    }

    /// ice_gathering_state attribute returns the ICE gathering state of the
    /// PeerConnection instance.
    pub fn ice_gathering_state(&self) -> RTCIceGatheringState {
        match self.ice_gatherer.state() {
            RTCIceGathererState::New => RTCIceGatheringState::New,
            RTCIceGathererState::Gathering => RTCIceGatheringState::Gathering,
            _ => RTCIceGatheringState::Complete,
        }
    }

    /// connection_state attribute returns the connection state of the
    /// PeerConnection instance.
    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.connection_state.load(Ordering::SeqCst).into()
    }

    /// get_stats returns data providing statistics about the overall connection
    pub async fn get_stats(&self) -> StatsReport {
        let collector = StatsCollector::new();

        let mut data_channels_closed = 0;
        {
            let data_channels = self.data_channels.lock().await;
            for d in data_channels.values() {
                let state = d.ready_state();
                if state != RTCDataChannelState::Connecting && state != RTCDataChannelState::Open {
                    data_channels_closed += 1;
                }

                d.collect_stats(&collector);
            }

            self.ice_gatherer.collect_stats(&collector);

            let stats = PeerConnectionStats {
                timestamp: stats_timestamp_now(),
                stats_type: RTCStatsType::PeerConnection,
                id: self.stats_id.clone(),
                data_channels_opened: self.data_channels_opened.load(Ordering::SeqCst),
                data_channels_closed,
                data_channels_requested: self.data_channels_requested.load(Ordering::SeqCst),
                data_channels_accepted: self.data_channels_accepted.load(Ordering::SeqCst),
            };
            collector.insert(stats.id.clone(), StatsReportType::PeerConnection(stats));
        }

        StatsReport::from(collector)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }
}

async fn start_transports(params: StartTransportsParams) {
    // Start the ice transport
    if let Err(err) = params
        .ice_transport
        .start(
            &RTCIceParameters {
                username_fragment: params.remote_ufrag.clone(),
                password: params.remote_pwd.clone(),
                ice_lite: false,
            },
            Some(params.ice_role),
        )
        .await
    {
        log::warn!("Failed to start manager: {err}");
        return;
    }

    // Start the dtls transport
    if let Err(err) = params
        .dtls_transport
        .start(DTLSParameters {
            role: params.dtls_role,
            fingerprints: vec![RTCDtlsFingerprint {
                algorithm: params.fingerprint_hash.clone(),
                value: params.fingerprint.clone(),
            }],
        })
        .await
    {
        log::warn!("Failed to start manager: {err}");
        return;
    }

    open_srtp(&params).await;

    let transceivers = {
        let rtp_transceivers = params.rtp_transceivers.lock().await;
        rtp_transceivers.clone()
    };
    for transceiver in transceivers {
        if let Some(sender) = transceiver.sender() {
            if let Some(track) = sender.track() {
                if let Err(err) = sender
                    .send(&RTCRtpSendParameters {
                        encodings: vec![RTCRtpCodingParameters {
                            ssrc: track.ssrc(),
                            payload_type: track.payload_type(),
                        }],
                    })
                    .await
                {
                    log::warn!("Failed to start Sender: {err}");
                }
            }
        }
    }

    {
        let dtls_transport = Arc::clone(&params.dtls_transport);
        tokio::spawn(async move {
            drain_srtp(dtls_transport).await;
        });
    }

    // Start sctp
    if let Err(err) = params
        .sctp_transport
        .start(SCTPTransportCapabilities {
            max_message_size: 0,
        })
        .await
    {
        log::warn!("Failed to start SCTP: {err}");
        return;
    }

    // Open data channels that where created before signaling
    let data_channels = {
        let dcs = params.data_channels.lock().await;
        dcs.values().cloned().collect::<Vec<_>>()
    };

    let mut opened_dc_count = 0u32;
    for d in data_channels {
        if let Err(err) = d.open(Arc::clone(&params.sctp_transport)).await {
            log::warn!("failed to open data channel: {err}");
            continue;
        }
        opened_dc_count += 1;
    }

    params
        .data_channels_opened
        .fetch_add(opened_dc_count, Ordering::SeqCst);
}

/// open_srtp opens known inbound SRTP streams from the remote description
async fn open_srtp(params: &StartTransportsParams) {
    let mut incoming_tracks: HashMap<SSRC, (RTPCodecType, String, String)> = HashMap::new();

    let remote_is_plan_b = match params.sdp_semantics {
        RTCSdpSemantics::PlanB => true,
        RTCSdpSemantics::UnifiedPlanWithFallback => {
            description_is_plan_b(Some(&params.remote_desc))
        }
        _ => false,
    };

    let parsed = match &params.remote_desc.parsed {
        Some(parsed) => parsed,
        None => return,
    };

    for media in &parsed.media_descriptions {
        let codec_type = RTPCodecType::from(media.media_name.media.as_str());
        if codec_type == RTPCodecType::Unspecified {
            continue;
        }

        for attr in &media.attributes {
            if attr.key == ATTR_KEY_SSRC {
                if let Some(value) = &attr.value {
                    let split: Vec<&str> = value.split(' ').collect();
                    let ssrc = match split[0].parse::<u32>() {
                        Ok(ssrc) => ssrc,
                        Err(err) => {
                            log::warn!("Failed to parse SSRC: {err}");
                            continue;
                        }
                    };

                    let mut track_id = "";
                    let mut track_label = "";
                    if split.len() == 3 && split[1].starts_with("msid:") {
                        track_label = &split[1]["msid:".len()..];
                        track_id = split[2];
                    }

                    incoming_tracks.insert(
                        ssrc,
                        (codec_type, track_label.to_owned(), track_id.to_owned()),
                    );
                    if !track_id.is_empty() && !track_label.is_empty() {
                        // Remote provided Label+ID, we have all the information we need
                        break;
                    }
                }
            }
        }
    }

    let mut local_transceivers = {
        let rtp_transceivers = params.rtp_transceivers.lock().await;
        rtp_transceivers.clone()
    };

    let mut unhandled_tracks = vec![];
    for (ssrc, incoming) in incoming_tracks {
        let mut matched = None;

        for (i, t) in local_transceivers.iter().enumerate() {
            if t.kind != incoming.0 {
                continue;
            }
            let direction = t.direction();
            if direction != RTCRtpTransceiverDirection::Recvonly
                && direction != RTCRtpTransceiverDirection::Sendrecv
            {
                continue;
            }
            if t.stopped() {
                continue;
            }
            if let Some(receiver) = t.receiver() {
                matched = Some((i, receiver));
                break;
            }
        }

        match matched {
            Some((i, receiver)) => {
                local_transceivers.remove(i);
                spawn_receiver(params, ssrc, incoming, receiver);
            }
            None => unhandled_tracks.push((ssrc, incoming)),
        }
    }

    if remote_is_plan_b {
        for (ssrc, incoming) in unhandled_tracks {
            let codecs = params.media_engine.get_codecs_by_kind(incoming.0);
            if codecs.is_empty() {
                log::warn!("Could not add transceiver for remote SSRC {ssrc}: no codecs");
                continue;
            }

            let receiver = Arc::new(RTCRtpReceiver::new(
                incoming.0,
                Arc::clone(&params.dtls_transport),
            ));
            let track = Arc::new(Track::new(
                codecs[0].payload_type,
                rand::random::<u32>(),
                math_rand_alpha(16),
                math_rand_alpha(16),
                codecs[0].clone(),
            ));
            let sender = Arc::new(RTCRtpSender::new(track, Arc::clone(&params.dtls_transport)));
            let t = RTCRtpTransceiver::new(
                Some(Arc::clone(&receiver)),
                Some(sender),
                RTCRtpTransceiverDirection::Sendrecv,
                incoming.0,
            );
            {
                let mut rtp_transceivers = params.rtp_transceivers.lock().await;
                rtp_transceivers.push(t);
            }

            spawn_receiver(params, ssrc, incoming, receiver);
        }
    }
}

fn spawn_receiver(
    params: &StartTransportsParams,
    ssrc: SSRC,
    incoming: (RTPCodecType, String, String),
    receiver: Arc<RTCRtpReceiver>,
) {
    let current_local_description = Arc::clone(&params.current_local_description);
    let media_engine = Arc::clone(&params.media_engine);
    let on_track_handler = Arc::clone(&params.on_track_handler);

    tokio::spawn(async move {
        start_receiver(
            ssrc,
            incoming,
            receiver,
            current_local_description,
            media_engine,
            on_track_handler,
        )
        .await;
    });
}

async fn start_receiver(
    ssrc: SSRC,
    incoming: (RTPCodecType, String, String),
    receiver: Arc<RTCRtpReceiver>,
    current_local_description: Arc<Mutex<Option<RTCSessionDescription>>>,
    media_engine: Arc<MediaEngine>,
    on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
) {
    let (_, track_label, track_id) = incoming;

    if let Err(err) = receiver
        .receive(&RTCRtpReceiveParameters {
            encodings: vec![RTCRtpCodingParameters {
                ssrc,
                ..Default::default()
            }],
        })
        .await
    {
        log::warn!("RTPReceiver Receive failed {err}");
        return;
    }

    let payload_type = match receiver.determine_payload_type().await {
        Ok(payload_type) => payload_type,
        Err(_) => {
            log::warn!("Could not determine PayloadType for SSRC {ssrc}");
            return;
        }
    };

    let local_description = {
        let current_local_description = current_local_description.lock().await;
        current_local_description.clone()
    };
    let parsed = match local_description.and_then(|d| d.parsed) {
        Some(parsed) => parsed,
        None => {
            log::warn!("set_local_description not called, unable to handle incoming media streams");
            return;
        }
    };

    let sdp_codec = match parsed.get_codec_for_payload_type(payload_type) {
        Ok(sdp_codec) => sdp_codec,
        Err(_) => {
            log::warn!("no codec could be found in local description for payloadType {payload_type}");
            return;
        }
    };

    let codec = match media_engine.get_codec_sdp(&sdp_codec) {
        Ok(codec) => codec,
        Err(_) => {
            log::warn!("codec {sdp_codec} is not registered");
            return;
        }
    };

    let track = match receiver.track() {
        Some(track) => track,
        None => return,
    };
    track.set_details(&track_id, &track_label, codec);

    if on_track_handler.load_full().is_some() {
        do_track(on_track_handler, track, receiver);
    } else {
        log::warn!("on_track unset, unable to handle incoming media streams");
    }
}

fn do_track(
    on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
    track: Arc<Track>,
    receiver: Arc<RTCRtpReceiver>,
) -> oneshot::Receiver<()> {
    log::debug!("got new track: {}", track.ssrc());

    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Some(handler) = on_track_handler.load_full() {
            let mut f = handler.lock().await;
            f(track, receiver).await;
        }
        let _ = done_tx.send(());
    });

    done_rx
}

/// drain_srtp pulls and discards RTP/RTCP packets that don't match any SRTP stream.
/// These could be sent to the user, but right now we don't provide an API
/// to distribute orphaned RTCP messages. This is needed to make sure we don't block
/// and provides useful debugging messages
async fn drain_srtp(dtls_transport: Arc<RTCDtlsTransport>) {
    {
        let dtls_transport = Arc::clone(&dtls_transport);
        tokio::spawn(async move {
            loop {
                let srtp_session = match dtls_transport.get_srtp_session().await {
                    Ok(srtp_session) => srtp_session,
                    Err(err) => {
                        log::warn!("drain_srtp failed to open SrtpSession: {err}");
                        return;
                    }
                };

                let (_, ssrc) = match srtp_session.accept_stream().await {
                    Ok(stream) => stream,
                    Err(err) => {
                        log::warn!("Failed to accept RTP {err}");
                        return;
                    }
                };

                log::debug!("Incoming unhandled RTP ssrc({ssrc})");
            }
        });
    }

    loop {
        let srtcp_session = match dtls_transport.get_srtcp_session().await {
            Ok(srtcp_session) => srtcp_session,
            Err(err) => {
                log::warn!("drain_srtp failed to open SrtcpSession: {err}");
                return;
            }
        };

        let (_, ssrc) = match srtcp_session.accept_stream().await {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("Failed to accept RTCP {err}");
                return;
            }
        };

        log::debug!("Incoming unhandled RTCP ssrc({ssrc})");
    }
}
