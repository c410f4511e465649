use std::io::Cursor;

use super::*;
use crate::ice_transport::ice_candidate::RTCIceCandidate;

fn parse(sdp: &str) -> Result<SessionDescription> {
    let mut reader = Cursor::new(sdp.as_bytes());
    Ok(SessionDescription::unmarshal(&mut reader)?)
}

const BASE_SDP: &str = "v=0
o=- 4596489990601351948 2 IN IP4 127.0.0.1
s=-
t=0 0
";

#[test]
fn test_extract_fingerprint() -> Result<()> {
    // Session level
    {
        let desc = parse(&format!("{BASE_SDP}a=fingerprint:foo bar\n"))?;
        let (fingerprint, hash) = extract_fingerprint(&desc)?;
        assert_eq!(fingerprint, "bar");
        assert_eq!(hash, "foo");
    }

    // Media level
    {
        let desc = parse(&format!(
            "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na=fingerprint:foo bar\n"
        ))?;
        let (fingerprint, hash) = extract_fingerprint(&desc)?;
        assert_eq!(fingerprint, "bar");
        assert_eq!(hash, "foo");
    }

    // No fingerprint
    {
        let desc = parse(BASE_SDP)?;
        assert_eq!(
            extract_fingerprint(&desc),
            Err(Error::ErrSessionDescriptionNoFingerprint)
        );
    }

    // Invalid fingerprint
    {
        let desc = parse(&format!("{BASE_SDP}a=fingerprint:foo\n"))?;
        assert_eq!(
            extract_fingerprint(&desc),
            Err(Error::ErrSessionDescriptionInvalidFingerprint)
        );
    }

    // Conflicting fingerprint
    {
        let desc = parse(&format!(
            "{BASE_SDP}a=fingerprint:foo bar\nm=video 9 UDP/TLS/RTP/SAVPF 0\na=fingerprint:foo blah\n"
        ))?;
        assert_eq!(
            extract_fingerprint(&desc),
            Err(Error::ErrSessionDescriptionConflictingFingerprints)
        );
    }

    Ok(())
}

#[test]
fn test_extract_ice_details() -> Result<()> {
    const DEFAULT_UFRAG: &str = "DEFAULT_UFRAG";
    const DEFAULT_PWD: &str = "DEFAULT_PWD";

    // Missing ice-pwd
    {
        let desc = parse(&format!(
            "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na=ice-ufrag:{DEFAULT_UFRAG}\n"
        ))?;
        assert_eq!(
            extract_ice_details(&desc).err(),
            Some(Error::ErrSessionDescriptionMissingIcePwd)
        );
    }

    // Missing ice-ufrag
    {
        let desc = parse(&format!(
            "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na=ice-pwd:{DEFAULT_PWD}\n"
        ))?;
        assert_eq!(
            extract_ice_details(&desc).err(),
            Some(Error::ErrSessionDescriptionMissingIceUfrag)
        );
    }

    // ice details at session level
    {
        let desc = parse(&format!(
            "{BASE_SDP}a=ice-ufrag:{DEFAULT_UFRAG}\na=ice-pwd:{DEFAULT_PWD}\nm=video 9 UDP/TLS/RTP/SAVPF 0\n"
        ))?;
        let (ufrag, pwd, candidates) = extract_ice_details(&desc)?;
        assert_eq!(ufrag, DEFAULT_UFRAG);
        assert_eq!(pwd, DEFAULT_PWD);
        assert!(candidates.is_empty());
    }

    // ice details at media level
    {
        let desc = parse(&format!(
            "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na=ice-ufrag:{DEFAULT_UFRAG}\na=ice-pwd:{DEFAULT_PWD}\n"
        ))?;
        let (ufrag, pwd, _) = extract_ice_details(&desc)?;
        assert_eq!(ufrag, DEFAULT_UFRAG);
        assert_eq!(pwd, DEFAULT_PWD);
    }

    // Conflicting ufrags
    {
        let desc = parse(&format!(
            "{BASE_SDP}a=ice-ufrag:invalidUfrag\na=ice-pwd:{DEFAULT_PWD}\nm=video 9 UDP/TLS/RTP/SAVPF 0\na=ice-ufrag:{DEFAULT_UFRAG}\n"
        ))?;
        assert_eq!(
            extract_ice_details(&desc).err(),
            Some(Error::ErrSessionDescriptionConflictingIceUfrag)
        );
    }

    // Conflicting passwords
    {
        let desc = parse(&format!(
            "{BASE_SDP}a=ice-ufrag:{DEFAULT_UFRAG}\na=ice-pwd:invalidPwd\nm=video 9 UDP/TLS/RTP/SAVPF 0\na=ice-pwd:{DEFAULT_PWD}\n"
        ))?;
        assert_eq!(
            extract_ice_details(&desc).err(),
            Some(Error::ErrSessionDescriptionConflictingIcePwd)
        );
    }

    // Candidates are delivered
    {
        let desc = parse(&format!(
            "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na=ice-ufrag:{DEFAULT_UFRAG}\na=ice-pwd:{DEFAULT_PWD}\na=candidate:foundation 1 udp 2130706431 192.168.1.1 53987 typ host generation 0\na=candidate:foundation 2 udp 2130706431 192.168.1.1 53987 typ host generation 0\n"
        ))?;
        let (_, _, candidates) = extract_ice_details(&desc)?;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].address, "192.168.1.1");
        assert_eq!(candidates[0].port, 53987);
    }

    Ok(())
}

#[test]
fn test_description_is_plan_b() -> Result<()> {
    let tests = vec![
        ("audio", true),
        ("video", true),
        ("data", true),
        ("AUDIO", true),
        ("0", false),
        ("1", false),
    ];

    for (mid, expected) in tests {
        let desc = RTCSessionDescription {
            sdp_type: crate::peer_connection::sdp::sdp_type::RTCSdpType::Offer,
            sdp: String::new(),
            parsed: Some(parse(&format!(
                "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na=mid:{mid}\n"
            ))?),
        };

        assert_eq!(
            description_is_plan_b(Some(&desc)),
            expected,
            "mid {mid} detection failed"
        );
    }

    assert!(!description_is_plan_b(None));

    Ok(())
}

#[test]
fn test_get_peer_direction() -> Result<()> {
    let tests = vec![
        ("sendrecv", RTCRtpTransceiverDirection::Sendrecv),
        ("sendonly", RTCRtpTransceiverDirection::Sendonly),
        ("recvonly", RTCRtpTransceiverDirection::Recvonly),
        ("inactive", RTCRtpTransceiverDirection::Inactive),
    ];

    for (direction, expected) in tests {
        let desc = parse(&format!(
            "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na={direction}\n"
        ))?;
        assert_eq!(get_peer_direction(&desc.media_descriptions[0]), expected);
    }

    Ok(())
}

#[test]
fn test_get_mid_value() -> Result<()> {
    let desc = parse(&format!(
        "{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\na=mid:video\n"
    ))?;
    assert_eq!(get_mid_value(&desc.media_descriptions[0]), Some("video"));

    let desc = parse(&format!("{BASE_SDP}m=video 9 UDP/TLS/RTP/SAVPF 0\n"))?;
    assert_eq!(get_mid_value(&desc.media_descriptions[0]), None);

    Ok(())
}

#[test]
fn test_add_candidates_to_media_descriptions() {
    let candidate = RTCIceCandidate {
        foundation: "foundation".to_owned(),
        priority: 2130706431,
        address: "192.168.1.1".to_owned(),
        protocol: crate::ice_transport::ice_protocol::RTCIceProtocol::Udp,
        port: 53987,
        typ: crate::ice_transport::ice_candidate_type::RTCIceCandidateType::Host,
        component: 0,
        related_address: String::new(),
        related_port: 0,
    };

    let m = add_candidates_to_media_descriptions(
        &[candidate],
        MediaDescription::new_jsep_media_description("video".to_owned(), vec![]),
    );

    let candidate_attrs: Vec<&::sdp::description::common::Attribute> = m
        .attributes
        .iter()
        .filter(|a| a.key == "candidate")
        .collect();
    assert_eq!(candidate_attrs.len(), 2, "component 1 and 2 expected");
    assert!(candidate_attrs[0]
        .value
        .as_ref()
        .map_or(false, |v| v.contains("generation 0")));
    assert!(m.has_attribute("end-of-candidates"));

    // No candidates, no end-of-candidates
    let m = add_candidates_to_media_descriptions(
        &[],
        MediaDescription::new_jsep_media_description("video".to_owned(), vec![]),
    );
    assert!(!m.has_attribute("end-of-candidates"));
}
