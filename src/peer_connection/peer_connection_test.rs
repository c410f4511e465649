use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::data_channel::data_channel_state::RTCDataChannelState;
use crate::peer_connection::sdp::HasAttribute;

pub(crate) async fn new_pair() -> Result<(RTCPeerConnection, RTCPeerConnection)> {
    let pca = RTCPeerConnection::new(RTCConfiguration::default()).await?;
    let pcb = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    Ok((pca, pcb))
}

pub(crate) async fn signal_pair(
    pc_offer: &RTCPeerConnection,
    pc_answer: &RTCPeerConnection,
) -> Result<()> {
    let offer = pc_offer.create_offer(None).await?;
    pc_offer.set_local_description(offer.clone()).await?;

    pc_answer.set_remote_description(offer).await?;

    let answer = pc_answer.create_answer(None).await?;
    pc_answer.set_local_description(answer.clone()).await?;

    pc_offer.set_remote_description(answer).await
}

pub(crate) async fn close_pair_now(pc1: &RTCPeerConnection, pc2: &RTCPeerConnection) {
    let mut fail = false;
    if let Err(err) = pc1.close().await {
        log::error!("Failed to close PeerConnection: {err}");
        fail = true;
    }
    if let Err(err) = pc2.close().await {
        log::error!("Failed to close PeerConnection: {err}");
        fail = true;
    }

    assert!(!fail);
}

async fn until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let timeout = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < timeout,
            "timed out waiting for condition"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_offerer_handshake() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (pc_offer, pc_answer) = new_pair().await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    let (states_tx, mut states_rx) = mpsc::unbounded_channel::<RTCSignalingState>();
    let states_tx2 = states_tx.clone();
    pc_offer.on_signaling_state_change(Box::new(move |state| {
        let _ = states_tx2.send(state);
        Box::pin(async {})
    }));

    let offer = pc_offer.create_offer(None).await?;
    pc_offer.set_local_description(offer.clone()).await?;
    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::HaveLocalOffer);

    pc_answer.set_remote_description(offer).await?;
    assert_eq!(
        pc_answer.signaling_state(),
        RTCSignalingState::HaveRemoteOffer
    );

    let answer = pc_answer.create_answer(None).await?;
    pc_answer.set_local_description(answer.clone()).await?;
    assert_eq!(pc_answer.signaling_state(), RTCSignalingState::Stable);

    pc_offer.set_remote_description(answer).await?;
    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::Stable);

    // Promotion into stable leaves both current descriptions set and the
    // pending slots empty.
    assert!(pc_offer.current_local_description().await.is_some());
    assert!(pc_offer.current_remote_description().await.is_some());
    assert!(pc_offer.pending_local_description().await.is_none());
    assert!(pc_offer.pending_remote_description().await.is_none());

    assert!(pc_answer.current_local_description().await.is_some());
    assert!(pc_answer.current_remote_description().await.is_some());
    assert!(pc_answer.pending_local_description().await.is_none());
    assert!(pc_answer.pending_remote_description().await.is_none());

    assert_eq!(
        states_rx.recv().await,
        Some(RTCSignalingState::HaveLocalOffer)
    );
    assert_eq!(states_rx.recv().await, Some(RTCSignalingState::Stable));

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_set_local_description_matches_create_offer() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    pc_offer.create_data_channel("data", None).await?;
    let offer = pc_offer.create_offer(None).await?;
    pc_offer.set_local_description(offer.clone()).await?;

    // The SDP observed by the remote byte-equals the text create_offer returned.
    let local_description = pc_offer
        .local_description()
        .await
        .ok_or(Error::ErrPeerConnRemoteDescriptionWithoutMidValue)?;
    assert_eq!(local_description.sdp, offer.sdp);

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_sdp_mismatch() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    let offer = pc_offer.create_offer(None).await?;

    let mut munged = offer.clone();
    munged.sdp += "a=application-specific\r\n";

    assert_eq!(
        pc_offer.set_local_description(munged).await,
        Err(Error::ErrSDPDoesNotMatchOffer)
    );

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_set_local_description_empty_sdp_substitutes_last_offer() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    let offer = pc_offer.create_offer(None).await?;

    pc_offer
        .set_local_description(RTCSessionDescription {
            sdp_type: RTCSdpType::Offer,
            sdp: String::new(),
            parsed: None,
        })
        .await?;

    let local_description = pc_offer
        .local_description()
        .await
        .ok_or(Error::ErrPeerConnRemoteDescriptionWithoutMidValue)?;
    assert_eq!(local_description.sdp, offer.sdp);

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_create_answer_without_remote_description() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    assert_eq!(
        pc.create_answer(None).await.err(),
        Some(Error::ErrNoRemoteDescription)
    );

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_set_remote_description_twice() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    pc_offer.create_data_channel("data", None).await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    let offer = pc_offer.create_offer(None).await?;
    assert_eq!(
        pc_answer.set_remote_description(offer).await,
        Err(Error::ErrRemoteDescriptionAlreadyDefined)
    );

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_offer_rejected_media_section() -> Result<()> {
    // A media engine without codecs rejects the track's m-section.
    let api = APIBuilder::new().build();
    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;

    let track = Arc::new(Track::new(
        96,
        1234,
        "video-id".to_owned(),
        "video-label".to_owned(),
        crate::rtp_transceiver::rtp_codec::RTCRtpCodec {
            kind: RTPCodecType::Video,
            name: "VP8".to_owned(),
            payload_type: 96,
            clock_rate: 90000,
            ..Default::default()
        },
    ));
    pc.add_transceiver_from_track(
        track,
        Some(RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Sendonly,
        }),
    )
    .await?;

    let offer = pc.create_offer(None).await?;
    let parsed = offer
        .parsed
        .as_ref()
        .ok_or(Error::ErrPeerConnRemoteDescriptionWithoutMidValue)?;

    assert_eq!(parsed.media_descriptions.len(), 2);
    let rejected = &parsed.media_descriptions[0];
    assert_eq!(rejected.media_name.media, "video");
    assert_eq!(rejected.media_name.port.value, 0);
    assert_eq!(rejected.media_name.formats, vec!["0"]);

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_offer_transceiver_order_matches_media_sections() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    pc.add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    let offer = pc.create_offer(None).await?;
    let parsed = offer
        .parsed
        .as_ref()
        .ok_or(Error::ErrPeerConnRemoteDescriptionWithoutMidValue)?;

    let media: Vec<&str> = parsed
        .media_descriptions
        .iter()
        .map(|m| m.media_name.media.as_str())
        .collect();
    assert_eq!(media, vec!["audio", "video", "application"]);

    let mids: Vec<Option<&str>> = parsed
        .media_descriptions
        .iter()
        .map(crate::peer_connection::sdp::get_mid_value)
        .collect();
    assert_eq!(mids, vec![Some("0"), Some("1"), Some("2")]);

    assert_eq!(
        parsed.attribute("group"),
        Some(&"BUNDLE 0 1 2".to_owned())
    );

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_data_channel_only_offer() -> Result<()> {
    // Unified plan: single application section, bundled under mid 0
    {
        let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;
        pc.create_data_channel("chat", None).await?;

        let offer = pc.create_offer(None).await?;
        let parsed = offer
            .parsed
            .as_ref()
            .ok_or(Error::ErrPeerConnRemoteDescriptionWithoutMidValue)?;

        assert_eq!(parsed.media_descriptions.len(), 1);
        assert_eq!(parsed.media_descriptions[0].media_name.media, "application");
        assert!(parsed.media_descriptions[0].has_attribute("sctpmap:5000 webrtc-datachannel 1024"));
        assert_eq!(parsed.attribute("group"), Some(&"BUNDLE 0".to_owned()));

        pc.close().await?;
    }

    // Plan-B: the data section mid is the literal string "data"
    {
        let pc = RTCPeerConnection::new(RTCConfiguration {
            sdp_semantics: RTCSdpSemantics::PlanB,
            ..Default::default()
        })
        .await?;
        pc.create_data_channel("chat", None).await?;

        let offer = pc.create_offer(None).await?;
        let parsed = offer
            .parsed
            .as_ref()
            .ok_or(Error::ErrPeerConnRemoteDescriptionWithoutMidValue)?;

        assert_eq!(parsed.attribute("group"), Some(&"BUNDLE data".to_owned()));

        pc.close().await?;
    }

    Ok(())
}

#[tokio::test]
async fn test_plan_b_offer_rejected_under_unified_plan() -> Result<()> {
    let pc_offer = RTCPeerConnection::new(RTCConfiguration {
        sdp_semantics: RTCSdpSemantics::PlanB,
        ..Default::default()
    })
    .await?;
    let pc_answer = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let offer = pc_offer.create_offer(None).await?;
    pc_answer.set_remote_description(offer).await?;

    assert_eq!(
        pc_answer.create_answer(None).await.err(),
        Some(Error::ErrIncorrectSDPSemantics)
    );

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_plan_b_answer_multiple_tracks_single_section() -> Result<()> {
    let pc_offer = RTCPeerConnection::new(RTCConfiguration {
        sdp_semantics: RTCSdpSemantics::PlanB,
        ..Default::default()
    })
    .await?;
    let pc_answer = RTCPeerConnection::new(RTCConfiguration {
        sdp_semantics: RTCSdpSemantics::PlanB,
        ..Default::default()
    })
    .await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    pc_answer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;
    pc_answer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    let offer = pc_offer.create_offer(None).await?;
    pc_answer.set_remote_description(offer).await?;

    let answer = pc_answer.create_answer(None).await?;
    let parsed = answer
        .parsed
        .as_ref()
        .ok_or(Error::ErrPeerConnRemoteDescriptionWithoutMidValue)?;

    // Both local video transceivers collapse into the single video section.
    let video_sections: Vec<_> = parsed
        .media_descriptions
        .iter()
        .filter(|m| m.media_name.media == "video")
        .collect();
    assert_eq!(video_sections.len(), 1);

    let ssrc_count = video_sections[0]
        .attributes
        .iter()
        .filter(|a| a.key == "ssrc")
        .count();
    assert!(ssrc_count > 4, "expected ssrc lines for both tracks");

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_close_idempotent() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    pc_offer.create_data_channel("data", None).await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    pc_offer.close().await?;
    pc_offer.close().await?;
    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::Closed);
    assert_eq!(pc_offer.connection_state(), RTCPeerConnectionState::Closed);

    pc_answer.close().await?;
    pc_answer.close().await?;

    // All api calls fail after close
    assert_eq!(
        pc_offer.create_offer(None).await.err(),
        Some(Error::ErrConnectionClosed)
    );
    assert_eq!(
        pc_offer.create_data_channel("late", None).await.err(),
        Some(Error::ErrConnectionClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_certificate_expired() -> Result<()> {
    let kp = KeyPair::generate(&rcgen::PKCS_ECDSA_P256_SHA256)?;
    let cert = RTCCertificate::from_key_pair(kp)?;

    // An expiry anywhere in 1970 is long past
    let expired = RTCCertificate::from_existing(
        cert.certificate.clone(),
        cert.pem(),
        UNIX_EPOCH + Duration::from_secs(60 * 60 * 24),
    );

    let result = RTCPeerConnection::new(RTCConfiguration {
        certificates: vec![expired],
        ..Default::default()
    })
    .await;

    assert_eq!(result.err(), Some(Error::ErrCertificateExpired));

    Ok(())
}

#[tokio::test]
async fn test_get_configuration_set_configuration_round_trip() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    let config = pc.get_configuration().await;
    pc.set_configuration(config.clone()).await?;

    let after = pc.get_configuration().await;
    assert_eq!(after.bundle_policy, config.bundle_policy);
    assert_eq!(after.rtcp_mux_policy, config.rtcp_mux_policy);
    assert_eq!(after.certificates.len(), config.certificates.len());
    assert_eq!(after.certificates[0], config.certificates[0]);

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_set_configuration_immutable_fields() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    assert_eq!(
        pc.set_configuration(RTCConfiguration {
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        })
        .await,
        Err(Error::ErrModifyingBundlePolicy)
    );

    assert_eq!(
        pc.set_configuration(RTCConfiguration {
            rtcp_mux_policy: RTCRtcpMuxPolicy::Negotiate,
            ..Default::default()
        })
        .await,
        Err(Error::ErrModifyingRTCPMuxPolicy)
    );

    assert_eq!(
        pc.set_configuration(RTCConfiguration {
            peer_identity: "unittest".to_owned(),
            ..Default::default()
        })
        .await,
        Err(Error::ErrModifyingPeerIdentity)
    );

    let kp = KeyPair::generate(&rcgen::PKCS_ECDSA_P256_SHA256)?;
    let cert = RTCCertificate::from_key_pair(kp)?;
    assert_eq!(
        pc.set_configuration(RTCConfiguration {
            certificates: vec![cert],
            ..Default::default()
        })
        .await,
        Err(Error::ErrModifyingCertificates)
    );

    assert_eq!(
        pc.set_configuration(RTCConfiguration {
            sdp_semantics: RTCSdpSemantics::PlanB,
            ..Default::default()
        })
        .await,
        Err(Error::ErrModifyingSDPSemantics)
    );

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_data_channel_initiator_ids_are_even() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    let mut ids = vec![];
    for label in ["a", "b", "c"] {
        let dc = pc.create_data_channel(label, None).await?;
        ids.push(dc.id());
    }

    assert_eq!(ids, vec![0, 2, 4]);

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_data_channel_explicit_id() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    let dc = pc
        .create_data_channel(
            "explicit",
            Some(RTCDataChannelInit {
                id: Some(10),
                ..Default::default()
            }),
        )
        .await?;
    assert_eq!(dc.id(), 10);

    // The next generated id skips nothing below
    let dc = pc.create_data_channel("generated", None).await?;
    assert_eq!(dc.id(), 0);

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_data_channel_reliability_bounds_mutually_exclusive() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    let result = pc
        .create_data_channel(
            "invalid",
            Some(RTCDataChannelInit {
                max_packet_life_time: Some(100),
                max_retransmits: Some(5),
                ..Default::default()
            }),
        )
        .await;

    assert_eq!(result.err(), Some(Error::ErrRetransmitsOrPacketLifeTime));

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_data_channel_opens_after_handshake() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    let dc = pc_offer.create_data_channel("chat", None).await?;
    assert_eq!(dc.ready_state(), RTCDataChannelState::Connecting);

    signal_pair(&pc_offer, &pc_answer).await?;

    let dc2 = Arc::clone(&dc);
    until(move || dc2.ready_state() == RTCDataChannelState::Open).await;

    let report = pc_offer.get_stats().await;
    let pc_stats = report
        .reports
        .get(pc_offer.get_stats_id())
        .ok_or(Error::ErrUnknownType)?;
    if let StatsReportType::PeerConnection(stats) = pc_stats {
        assert_eq!(stats.data_channels_requested, 1);
        assert_eq!(stats.data_channels_opened, 1);
    } else {
        panic!("expected peer connection stats");
    }

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_on_data_channel_for_remote_channel() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    let (seen_tx, mut seen_rx) = mpsc::channel::<String>(1);
    let seen_tx = Arc::new(Mutex::new(Some(seen_tx)));
    pc_answer.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let seen_tx = Arc::clone(&seen_tx);
        Box::pin(async move {
            let mut tx = seen_tx.lock().await;
            if let Some(tx) = tx.take() {
                let _ = tx.send(dc.label().to_owned()).await;
            }
        })
    }));

    pc_offer.create_data_channel("init", None).await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    // Wait for the answerer's SCTP transport to associate, then surface a
    // channel announced by the remote side of the association.
    let sctp = {
        let mut sctp = None;
        let timeout = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            {
                let sctp_transport = pc_answer.sctp_transport.lock().await;
                if let Some(s) = &*sctp_transport {
                    if s.association().await.is_some() {
                        sctp = Some(Arc::clone(s));
                        break;
                    }
                }
            }
            assert!(
                tokio::time::Instant::now() < timeout,
                "timed out waiting for sctp association"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sctp.ok_or(Error::ErrSCTPNotEstablished)?
    };

    sctp.handle_data_channel(DataChannelParameters {
        label: "remote".to_owned(),
        ordered: true,
        id: 1,
        ..Default::default()
    })
    .await?;

    assert_eq!(seen_rx.recv().await, Some("remote".to_owned()));

    {
        let data_channels = pc_answer.data_channels.lock().await;
        assert!(data_channels.contains_key(&1));
    }
    assert_eq!(pc_answer.data_channels_accepted.load(Ordering::SeqCst), 1);

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_on_track_for_remote_ssrc() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;
    pc_answer
        .add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
            }),
        )
        .await?;

    let (track_tx, mut track_rx) = mpsc::channel::<(String, String)>(1);
    let track_tx = Arc::new(Mutex::new(Some(track_tx)));
    pc_answer.on_track(Box::new(move |track: Arc<Track>, _receiver| {
        let track_tx = Arc::clone(&track_tx);
        Box::pin(async move {
            let mut tx = track_tx.lock().await;
            if let Some(tx) = tx.take() {
                let _ = tx.send((track.id(), track.label())).await;
            }
        })
    }));

    signal_pair(&pc_offer, &pc_answer).await?;

    let senders = pc_offer.get_senders().await;
    let sending_track = senders[0].track().ok_or(Error::ErrRTPSenderTrackNil)?;

    // Wait for the answerer's DTLS transport to come up, then feed one RTP
    // packet carrying the advertised SSRC into the SRTP session.
    let srtp_session = {
        let mut session = None;
        let timeout = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(s) = pc_answer.dtls_transport.get_srtp_session().await {
                session = Some(s);
                break;
            }
            assert!(
                tokio::time::Instant::now() < timeout,
                "timed out waiting for dtls transport"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        session.ok_or(Error::ErrDtlsTransportNotStarted)?
    };

    let packet = rtp::packet::Packet {
        header: rtp::header::Header {
            version: 2,
            payload_type: sending_track.payload_type(),
            ssrc: sending_track.ssrc(),
            ..Default::default()
        },
        payload: bytes::Bytes::from_static(&[0u8; 16]),
    };
    srtp_session
        .dispatch(sending_track.ssrc(), packet.marshal()?)
        .await?;

    let (track_id, track_label) = track_rx.recv().await.ok_or(Error::ErrUnknownType)?;
    assert_eq!(track_id, sending_track.id());
    assert_eq!(track_label, sending_track.label());

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_add_ice_candidate() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    // Candidates cannot be delivered before a remote description
    assert_eq!(
        pc_offer
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: "candidate:foundation 1 udp 2130706431 192.168.1.1 53987 typ host"
                    .to_owned(),
                ..Default::default()
            })
            .await,
        Err(Error::ErrNoRemoteDescription)
    );

    pc_offer.create_data_channel("data", None).await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    // With or without the candidate: prefix
    pc_offer
        .add_ice_candidate(RTCIceCandidateInit {
            candidate: "candidate:foundation 1 udp 2130706431 192.168.1.1 53987 typ host"
                .to_owned(),
            ..Default::default()
        })
        .await?;
    pc_offer
        .add_ice_candidate(RTCIceCandidateInit {
            candidate: "foundation 1 udp 2130706431 192.168.1.2 53987 typ host".to_owned(),
            ..Default::default()
        })
        .await?;

    let remote_candidates = pc_offer.ice_transport.get_remote_candidates().await;
    assert_eq!(remote_candidates.len(), 2);

    close_pair_now(&pc_offer, &pc_answer).await;

    Ok(())
}

#[tokio::test]
async fn test_add_track() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    let track = pc.new_track(
        crate::api::media_engine::DEFAULT_PAYLOAD_TYPE_VP8,
        rand::random::<u32>(),
        "video".to_owned(),
        "pion".to_owned(),
    )?;

    let sender = pc.add_track(Arc::clone(&track)).await?;
    assert!(sender.track().is_some());
    assert_eq!(pc.get_senders().await.len(), 1);
    assert_eq!(pc.get_transceivers().await.len(), 1);

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_add_transceiver_from_kind_sendonly_rejected() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    assert_eq!(
        pc.add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
            }),
        )
        .await
        .err(),
        Some(Error::ErrPeerConnAddTransceiverFromKindSupport)
    );

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_offer_options_rejected() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    assert_eq!(
        pc.create_offer(Some(RTCOfferOptions::default())).await.err(),
        Some(Error::ErrPeerConnOfferAnswerOptions)
    );
    assert_eq!(
        pc.set_identity_provider("unittest").err(),
        Some(Error::ErrPeerConnSetIdentityProviderNotImplemented)
    );

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_write_rtcp_discarded_before_connect() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    let pkt: Box<dyn rtcp::packet::Packet + Send + Sync> =
        Box::new(rtcp::goodbye::Goodbye::default());

    // No peer connected yet, the packet is silently discarded
    pc.write_rtcp(&[pkt]).await?;

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_ice_gathering_state() -> Result<()> {
    let pc = RTCPeerConnection::new(RTCConfiguration::default()).await?;

    // The default engine gathers synchronously during construction
    assert_eq!(pc.ice_gathering_state(), RTCIceGatheringState::Complete);

    pc.close().await?;

    Ok(())
}
