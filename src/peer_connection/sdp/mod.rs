#[cfg(test)]
mod sdp_test;

pub mod sdp_type;
pub mod session_description;

use std::sync::Arc;

use ::sdp::description::common::{Address, ConnectionInformation};
use ::sdp::description::media::{MediaDescription, MediaName, RangedPort};
use ::sdp::description::session::{
    SessionDescription, ATTR_KEY_CONNECTION_SETUP, ATTR_KEY_MID, ATTR_KEY_RTCPMUX,
    ATTR_KEY_RTCPRSIZE,
};
use ::sdp::util::ConnectionRole;

use crate::api::media_engine::MediaEngine;
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::{unmarshal_candidate, RTCIceCandidate};
use crate::ice_transport::ice_gatherer::RTCIceGatherer;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::peer_connection::policy::sdp_semantics::RTCSdpSemantics;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::RTCRtpTransceiver;
use crate::MEDIA_SECTION_APPLICATION;

pub(crate) trait HasAttribute {
    fn has_attribute(&self, key: &str) -> bool;
}

impl HasAttribute for MediaDescription {
    fn has_attribute(&self, key: &str) -> bool {
        self.attributes.iter().any(|a| a.key == key)
    }
}

impl HasAttribute for SessionDescription {
    fn has_attribute(&self, key: &str) -> bool {
        self.attributes.iter().any(|a| a.key == key)
    }
}

pub(crate) fn get_mid_value(media: &MediaDescription) -> Option<&str> {
    for attr in &media.attributes {
        if attr.key == "mid" {
            return attr.value.as_deref();
        }
    }
    None
}

pub(crate) fn get_peer_direction(media: &MediaDescription) -> RTCRtpTransceiverDirection {
    for a in &media.attributes {
        let direction = RTCRtpTransceiverDirection::from(a.key.as_str());
        if direction != RTCRtpTransceiverDirection::Unspecified {
            return direction;
        }
    }
    RTCRtpTransceiverDirection::Unspecified
}

/// A remote description talks Plan-B when any of its media sections carries
/// one of the per-kind mid values instead of a numbered one.
pub(crate) fn description_is_plan_b(desc: Option<&RTCSessionDescription>) -> bool {
    let parsed = match desc.and_then(|d| d.parsed.as_ref()) {
        Some(parsed) => parsed,
        None => return false,
    };

    for media in &parsed.media_descriptions {
        if let Some(mid) = get_mid_value(media) {
            if mid.eq_ignore_ascii_case("audio")
                || mid.eq_ignore_ascii_case("video")
                || mid.eq_ignore_ascii_case("data")
            {
                return true;
            }
        }
    }
    false
}

pub(crate) fn extract_fingerprint(desc: &SessionDescription) -> Result<(String, String)> {
    let mut fingerprints = vec![];

    if let Some(fingerprint) = desc.attribute("fingerprint") {
        fingerprints.push(fingerprint.clone());
    }

    for m in &desc.media_descriptions {
        if let Some(fingerprint) = m.attribute("fingerprint").and_then(|o| o) {
            fingerprints.push(fingerprint.to_owned());
        }
    }

    if fingerprints.is_empty() {
        return Err(Error::ErrSessionDescriptionNoFingerprint);
    }

    for m in 1..fingerprints.len() {
        if fingerprints[m] != fingerprints[0] {
            return Err(Error::ErrSessionDescriptionConflictingFingerprints);
        }
    }

    let parts: Vec<&str> = fingerprints[0].split(' ').collect();
    if parts.len() != 2 {
        return Err(Error::ErrSessionDescriptionInvalidFingerprint);
    }

    Ok((parts[1].to_owned(), parts[0].to_owned()))
}

pub(crate) fn extract_ice_details(
    desc: &SessionDescription,
) -> Result<(String, String, Vec<RTCIceCandidate>)> {
    let mut candidates = vec![];
    let mut remote_pwds = vec![];
    let mut remote_ufrags = vec![];

    if let Some(ufrag) = desc.attribute("ice-ufrag") {
        remote_ufrags.push(ufrag.clone());
    }
    if let Some(pwd) = desc.attribute("ice-pwd") {
        remote_pwds.push(pwd.clone());
    }

    for m in &desc.media_descriptions {
        if let Some(ufrag) = m.attribute("ice-ufrag").and_then(|o| o) {
            remote_ufrags.push(ufrag.to_owned());
        }
        if let Some(pwd) = m.attribute("ice-pwd").and_then(|o| o) {
            remote_pwds.push(pwd.to_owned());
        }

        for a in &m.attributes {
            if a.is_ice_candidate() {
                if let Some(value) = &a.value {
                    let candidate = unmarshal_candidate(value)?;
                    candidates.push(candidate);
                }
            }
        }
    }

    if remote_ufrags.is_empty() {
        return Err(Error::ErrSessionDescriptionMissingIceUfrag);
    } else if remote_pwds.is_empty() {
        return Err(Error::ErrSessionDescriptionMissingIcePwd);
    }

    for m in 1..remote_ufrags.len() {
        if remote_ufrags[m] != remote_ufrags[0] {
            return Err(Error::ErrSessionDescriptionConflictingIceUfrag);
        }
    }

    for m in 1..remote_pwds.len() {
        if remote_pwds[m] != remote_pwds[0] {
            return Err(Error::ErrSessionDescriptionConflictingIcePwd);
        }
    }

    Ok((remote_ufrags[0].clone(), remote_pwds[0].clone(), candidates))
}

pub(crate) fn add_candidates_to_media_descriptions(
    candidates: &[RTCIceCandidate],
    mut m: MediaDescription,
) -> MediaDescription {
    for c in candidates {
        let mut candidate = c.clone();

        candidate.component = 1;
        m = m.with_value_attribute(
            "candidate".to_owned(),
            format!("{} generation 0", candidate.marshal()),
        );
        candidate.component = 2;
        m = m.with_value_attribute(
            "candidate".to_owned(),
            format!("{} generation 0", candidate.marshal()),
        );
    }

    if !candidates.is_empty() {
        m = m.with_property_attribute("end-of-candidates".to_owned());
    }

    m
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn add_transceiver_sdp(
    d: SessionDescription,
    media_engine: &MediaEngine,
    sdp_semantics: RTCSdpSemantics,
    mid_value: &str,
    ice_params: &RTCIceParameters,
    candidates: &[RTCIceCandidate],
    dtls_role: ConnectionRole,
    transceivers: &[Arc<RTCRtpTransceiver>],
) -> Result<SessionDescription> {
    if transceivers.is_empty() {
        return Err(Error::ErrSDPZeroTransceivers);
    }

    // Use the first transceiver to generate the section attributes
    let t = &transceivers[0];
    let mut media = MediaDescription::new_jsep_media_description(t.kind.to_string(), vec![])
        .with_value_attribute(ATTR_KEY_CONNECTION_SETUP.to_owned(), dtls_role.to_string())
        .with_value_attribute(ATTR_KEY_MID.to_owned(), mid_value.to_owned())
        .with_ice_credentials(
            ice_params.username_fragment.clone(),
            ice_params.password.clone(),
        )
        .with_property_attribute(ATTR_KEY_RTCPMUX.to_owned())
        .with_property_attribute(ATTR_KEY_RTCPRSIZE.to_owned());

    let codecs = media_engine.get_codecs_by_kind(t.kind);
    for codec in &codecs {
        media = media.with_codec(
            codec.payload_type,
            codec.name.clone(),
            codec.clock_rate,
            codec.channels,
            codec.sdp_fmtp_line.clone(),
        );

        for feedback in &codec.rtcp_feedback {
            media = media.with_value_attribute(
                "rtcp-fb".to_owned(),
                format!("{} {} {}", codec.payload_type, feedback.typ, feedback.parameter),
            );
        }
    }
    if codecs.is_empty() {
        // Explicitly reject track if we don't have the codec
        let d = d.with_media(MediaDescription {
            media_name: MediaName {
                media: t.kind.to_string(),
                port: RangedPort {
                    value: 0,
                    range: None,
                },
                protos: vec![
                    "UDP".to_owned(),
                    "TLS".to_owned(),
                    "RTP".to_owned(),
                    "SAVPF".to_owned(),
                ],
                formats: vec!["0".to_owned()],
            },
            ..Default::default()
        });
        return Ok(d);
    }

    for mt in transceivers {
        if let Some(sender) = mt.sender() {
            if let Some(track) = sender.track() {
                media = media.with_media_source(
                    track.ssrc(),
                    track.label(), /* cname */
                    track.label(), /* streamLabel */
                    track.id(),
                );
                if sdp_semantics == RTCSdpSemantics::UnifiedPlan {
                    media = media.with_property_attribute(format!(
                        "msid:{} {}",
                        track.label(),
                        track.id()
                    ));
                    break;
                }
            }
        }
    }

    media = media.with_property_attribute(t.direction().to_string());

    media = add_candidates_to_media_descriptions(candidates, media);

    Ok(d.with_media(media))
}

pub(crate) fn add_data_media_section(
    d: SessionDescription,
    mid_value: &str,
    ice_params: &RTCIceParameters,
    candidates: &[RTCIceCandidate],
    dtls_role: ConnectionRole,
) -> SessionDescription {
    let mut media = MediaDescription {
        media_name: MediaName {
            media: MEDIA_SECTION_APPLICATION.to_owned(),
            port: RangedPort {
                value: 9,
                range: None,
            },
            protos: vec!["DTLS".to_owned(), "SCTP".to_owned()],
            formats: vec!["5000".to_owned()],
        },
        connection_information: Some(ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: Some(Address {
                address: "0.0.0.0".to_owned(),
                ttl: None,
                range: None,
            }),
        }),
        ..Default::default()
    }
    .with_value_attribute(ATTR_KEY_CONNECTION_SETUP.to_owned(), dtls_role.to_string())
    .with_value_attribute(ATTR_KEY_MID.to_owned(), mid_value.to_owned())
    .with_property_attribute(RTCRtpTransceiverDirection::Sendrecv.to_string())
    .with_property_attribute("sctpmap:5000 webrtc-datachannel 1024".to_owned())
    .with_ice_credentials(
        ice_params.username_fragment.clone(),
        ice_params.password.clone(),
    );

    media = add_candidates_to_media_descriptions(candidates, media);

    d.with_media(media)
}

pub(crate) async fn populate_local_candidates(
    orig: Option<&RTCSessionDescription>,
    ice_gatherer: &Arc<RTCIceGatherer>,
) -> Option<RTCSessionDescription> {
    let orig = orig?;
    let mut parsed = orig.parsed.clone()?;

    let candidates = match ice_gatherer.get_local_candidates().await {
        Ok(candidates) => candidates,
        Err(_) => return Some(orig.clone()),
    };

    parsed.media_descriptions = parsed
        .media_descriptions
        .into_iter()
        .map(|m| add_candidates_to_media_descriptions(&candidates, m))
        .collect();

    let sdp = parsed.marshal();

    Some(RTCSessionDescription {
        sdp_type: orig.sdp_type,
        sdp,
        parsed: Some(parsed),
    })
}
