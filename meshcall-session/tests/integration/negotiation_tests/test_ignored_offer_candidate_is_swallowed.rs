use meshcall_core::{
    IceCandidate, PresenceRecord, SIGNAL_EVENT, SessionDescription, SignalKind, SignalPayload,
};
use meshcall_session::{NegotiationState, PeerRole, PubSub, SignalingState, TrackKind};

use crate::integration::{TestMesh, WAIT_MS, eventually, init_tracing};
use crate::utils::{LinkStats, encode_signal, fake_sdp, next_signal};

const HOST_CANDIDATE: &str = "candidate:1 1 udp 2122260223 10.0.0.9 54400 typ host";

#[tokio::test]
async fn test_ignored_offer_candidate_is_swallowed() {
    init_tracing();

    let mesh = TestMesh::new("r1");
    let (a1, a1_observer) = mesh.join("a1", &[TrackKind::Audio]).await;

    // z9 is driven by hand: it announces itself but never answers.
    let mut z9 = mesh
        .hub
        .subscribe(&mesh.topic(), &"z9".into())
        .await
        .expect("Failed to subscribe z9");
    z9.handle
        .track(PresenceRecord::new("z9".into(), 1))
        .await
        .expect("Failed to track z9");

    next_signal(&mut z9, WAIT_MS, |message| {
        (message.kind() == SignalKind::Offer).then_some(())
    })
    .await
    .expect("a1 never offered");

    // a1 is impolite towards z9 and has its own offer out: z9's offer collides.
    z9.handle
        .send(
            SIGNAL_EVENT,
            encode_signal(
                "z9",
                "a1",
                SignalPayload::Offer {
                    sdp: SessionDescription::offer(fake_sdp(
                        "z9-stream",
                        &[(TrackKind::Audio, "z9-audio")],
                    )),
                },
            ),
        )
        .await
        .expect("Failed to send offer");
    z9.handle
        .send(
            SIGNAL_EVENT,
            encode_signal(
                "z9",
                "a1",
                SignalPayload::Candidate {
                    candidate: IceCandidate::new(HOST_CANDIDATE),
                },
            ),
        )
        .await
        .expect("Failed to send candidate");

    let link = mesh.network.link("a1", "z9").expect("a1 should link to z9");
    let link_ref = &link;
    let failed = eventually(WAIT_MS, move || async move {
        LinkStats::get(&link_ref.stats.candidate_failures) == 1
    })
    .await;
    assert!(failed, "Candidate for the ignored offer should be tried");

    assert!(
        a1_observer.faults().await.is_empty(),
        "Candidate for an ignored offer must not be reported"
    );
    assert_eq!(LinkStats::get(&link.stats.answers_created), 0);
    assert_eq!(LinkStats::get(&link.stats.rollbacks), 0);

    let a1_ref = &a1;
    let still_offering = eventually(WAIT_MS, move || async move {
        let peers = a1_ref.peers().await;
        peers.len() == 1
            && peers[0].role == PeerRole::Impolite
            && peers[0].signaling_state == SignalingState::HaveLocalOffer
            && peers[0].negotiation == NegotiationState::AwaitingAnswer
    })
    .await;
    assert!(still_offering, "a1 should keep its own offer and the entry");

    a1.dispose().await.expect("Failed to leave");
}
