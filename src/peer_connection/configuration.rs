use crate::ice_transport::ice_server::RTCIceServer;
use crate::peer_connection::certificate::RTCCertificate;
use crate::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use crate::peer_connection::policy::sdp_semantics::RTCSdpSemantics;

/// A Configuration defines how peer-to-peer communication via PeerConnection
/// is established or re-established.
/// Configurations may be set up once and reused across multiple connections.
/// Configurations are treated as readonly. As long as they are unmodified,
/// they are safe for concurrent use.
#[derive(Default, Clone)]
pub struct RTCConfiguration {
    /// ice_servers defines a slice describing servers available to be used by
    /// ICE, such as STUN and TURN servers.
    pub ice_servers: Vec<RTCIceServer>,

    /// ice_transport_policy indicates which candidates the ICEAgent is allowed
    /// to use.
    pub ice_transport_policy: RTCIceTransportPolicy,

    /// bundle_policy indicates which media-bundling policy to use when gathering
    /// ICE candidates.
    pub bundle_policy: RTCBundlePolicy,

    /// rtcp_mux_policy indicates which rtcp-mux policy to use when gathering ICE
    /// candidates.
    pub rtcp_mux_policy: RTCRtcpMuxPolicy,

    /// peer_identity sets the target peer identity for the PeerConnection.
    /// The PeerConnection will not establish a connection to a remote peer
    /// unless it can be successfully authenticated with the provided name.
    pub peer_identity: String,

    /// certificates describes a set of certificates that the PeerConnection
    /// uses to authenticate. Valid values for this parameter are created
    /// through calls to the generate_certificate function. Although any given
    /// DTLS connection will use only one certificate, this attribute allows the
    /// caller to provide multiple certificates that support different
    /// algorithms. If this value is absent, then a default set of certificates
    /// is generated for each PeerConnection instance.
    pub certificates: Vec<RTCCertificate>,

    /// ice_candidate_pool_size describes the size of the prefetched ICE pool.
    pub ice_candidate_pool_size: u8,

    /// sdp_semantics selects the SDP multiplexing style the connection offers
    /// with and accepts from a remote peer.
    pub sdp_semantics: RTCSdpSemantics,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_configuration_defaults() {
        let config = RTCConfiguration::default();

        assert_eq!(
            config.ice_transport_policy,
            RTCIceTransportPolicy::Unspecified
        );
        assert_eq!(config.bundle_policy, RTCBundlePolicy::Unspecified);
        assert_eq!(config.rtcp_mux_policy, RTCRtcpMuxPolicy::Unspecified);
        assert_eq!(config.sdp_semantics, RTCSdpSemantics::UnifiedPlan);
        assert!(config.certificates.is_empty());
        assert_eq!(config.ice_candidate_pool_size, 0);
    }
}
