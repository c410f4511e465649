use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate_type::RTCIceCandidateType;
use crate::ice_transport::ice_protocol::RTCIceProtocol;

/// ICECandidate represents a ice candidate
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RTCIceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub address: String,
    pub protocol: RTCIceProtocol,
    pub port: u16,
    #[serde(rename = "type")]
    pub typ: RTCIceCandidateType,
    pub component: u16,
    pub related_address: String,
    pub related_port: u16,
}

/// ICECandidateInit is used to serialize ice candidates
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCIceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}

/// unmarshal_candidate parses an ICE candidate attribute value as defined in
/// <https://tools.ietf.org/html/rfc5245#section-15.1>. Any `candidate:`
/// prefix must already be stripped.
pub(crate) fn unmarshal_candidate(raw: &str) -> Result<RTCIceCandidate> {
    let split: Vec<&str> = raw.split_whitespace().collect();
    if split.len() < 8 {
        return Err(Error::new(format!(
            "attribute not long enough to be ICE candidate ({})",
            split.len()
        )));
    }

    let protocol = RTCIceProtocol::from(split[2]);
    if protocol == RTCIceProtocol::Unspecified {
        return Err(Error::ErrICEProtocolUnknown);
    }

    if split[6] != "typ" {
        return Err(Error::new(format!("could not find valid typ ({})", split[6])));
    }
    let typ = RTCIceCandidateType::from(split[7]);
    if typ == RTCIceCandidateType::Unspecified {
        return Err(Error::ErrICECandidateTypeUnknown);
    }

    let mut candidate = RTCIceCandidate {
        foundation: split[0].to_owned(),
        component: split[1].parse()?,
        protocol,
        priority: split[3].parse()?,
        address: split[4].to_owned(),
        port: split[5].parse()?,
        typ,
        ..Default::default()
    };

    let mut rest = &split[8..];
    while rest.len() >= 2 {
        match rest[0] {
            "raddr" => candidate.related_address = rest[1].to_owned(),
            "rport" => candidate.related_port = rest[1].parse()?,
            _ => {}
        }
        rest = &rest[2..];
    }

    Ok(candidate)
}

impl RTCIceCandidate {
    /// marshal returns the candidate attribute value for this candidate, the
    /// inverse of unmarshal_candidate.
    pub(crate) fn marshal(&self) -> String {
        let mut val = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.typ
        );

        if !self.related_address.is_empty() {
            val += format!(" raddr {} rport {}", self.related_address, self.related_port).as_str();
        }

        val
    }

    /// to_json returns an ICECandidateInit as indicated by the spec
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-addicecandidate>
    pub fn to_json(&self) -> Result<RTCIceCandidateInit> {
        Ok(RTCIceCandidateInit {
            candidate: format!("candidate:{}", self.marshal()),
            sdp_mid: Some("".to_owned()),
            sdp_mline_index: Some(0u16),
            username_fragment: None,
        })
    }
}

impl fmt::Display for RTCIceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}{}",
            self.protocol, self.typ, self.address, self.port, self.related_address,
        )
    }
}
