use meshcall_session::{PeerLink, PeerRole, SignalingState, TrackKind};

use crate::integration::{TestMesh, WAIT_MS, eventually, init_tracing, wait_until_settled};
use crate::utils::LinkStats;

#[tokio::test]
async fn test_simultaneous_offers_converge() {
    init_tracing();

    let mesh = TestMesh::new("r1");
    let topic = mesh.topic();
    // Hold signals so both offers are in flight before either is delivered.
    mesh.hub.hold(&topic);

    let (a1, a1_observer) = mesh.join("a1", &[TrackKind::Audio, TrackKind::Video]).await;
    let (z9, z9_observer) = mesh.join("z9", &[TrackKind::Audio, TrackKind::Video]).await;

    let hub = &mesh.hub;
    let held_topic = topic.as_str();
    let both_offered = eventually(WAIT_MS, move || async move {
        hub.held_messages(held_topic) == 2
    })
    .await;
    assert!(both_offered, "Expected one held offer from each side");

    let a1_link = mesh.network.link("a1", "z9").expect("a1 should link to z9");
    let z9_link = mesh.network.link("z9", "a1").expect("z9 should link to a1");
    assert_eq!(a1_link.signaling_state(), SignalingState::HaveLocalOffer);
    assert_eq!(z9_link.signaling_state(), SignalingState::HaveLocalOffer);

    mesh.hub.release(&topic);

    assert!(wait_until_settled(&a1, 1, 2).await, "a1 did not settle");
    assert!(wait_until_settled(&z9, 1, 2).await, "z9 did not settle");

    // z9 is polite: it rolled back its own offer and answered a1's.
    assert_eq!(LinkStats::get(&z9_link.stats.rollbacks), 1);
    assert_eq!(LinkStats::get(&z9_link.stats.answers_created), 1);
    // a1 is impolite: it ignored z9's offer and never answered.
    assert_eq!(LinkStats::get(&a1_link.stats.rollbacks), 0);
    assert_eq!(LinkStats::get(&a1_link.stats.answers_created), 0);
    assert_eq!(LinkStats::get(&a1_link.stats.offers_created), 1);

    assert_eq!(a1.peers().await[0].role, PeerRole::Impolite);
    assert_eq!(z9.peers().await[0].role, PeerRole::Polite);

    assert!(a1_observer.wait_for_remote_stream("z9", WAIT_MS).await);
    assert!(z9_observer.wait_for_remote_stream("a1", WAIT_MS).await);
    assert_eq!(a1_observer.remote_streams_from("z9").await.len(), 1);
    assert_eq!(z9_observer.remote_streams_from("a1").await.len(), 1);

    a1.dispose().await.expect("Failed to leave");
    z9.dispose().await.expect("Failed to leave");
}
