use meshcall_session::{PeerFault, TrackKind};

use crate::integration::{
    TestMesh, WAIT_MS, eventually, init_tracing, wait_until_quiet, wait_until_settled,
};
use crate::utils::LinkStats;

#[tokio::test]
async fn test_ice_restart_on_ice_failure() {
    init_tracing();

    let mesh = TestMesh::new("r1");
    let (a1, a1_observer) = mesh.join("a1", &[TrackKind::Audio]).await;
    let (z9, z9_observer) = mesh.join("z9", &[TrackKind::Audio]).await;

    assert!(wait_until_quiet(&mesh, &[&a1, &z9], 1, 1).await);

    let a1_link = mesh.network.link("a1", "z9").expect("a1 should link to z9");
    let z9_link = mesh.network.link("z9", "a1").expect("z9 should link to a1");
    let answers_before = LinkStats::get(&z9_link.stats.answers_created);

    a1_link.fail_ice();

    let z9_ref = &z9_link;
    let restarted = eventually(WAIT_MS, move || async move {
        LinkStats::get(&z9_ref.stats.answers_created) == answers_before + 1
    })
    .await;
    assert!(restarted, "z9 should answer the ICE restart offer");
    assert_eq!(LinkStats::get(&a1_link.stats.ice_restarts), 1);

    assert!(wait_until_settled(&a1, 1, 1).await);
    assert!(
        a1_observer
            .faults()
            .await
            .contains(&PeerFault::IceTransientFailure {
                participant: "z9".into()
            })
    );

    // ICE failure is not a teardown.
    assert_eq!(a1_observer.disconnect_count("z9").await, 0);
    assert_eq!(z9_observer.disconnect_count("a1").await, 0);
    assert_eq!(mesh.network.links_created("a1", "z9"), 1);

    a1.dispose().await.expect("Failed to leave");
    z9.dispose().await.expect("Failed to leave");
}
