use std::time::Duration;

use meshcall_core::ParticipantId;
use meshcall_session::{PeerFault, TrackKind};

use crate::integration::{TestMesh, WAIT_MS, init_tracing, wait_until_quiet};

#[tokio::test]
async fn test_connection_failure_tears_down_once() {
    init_tracing();

    let mesh = TestMesh::new("r1");
    let (a1, _a1_observer) = mesh.join("a1", &[TrackKind::Audio]).await;
    let (z9, z9_observer) = mesh.join("z9", &[TrackKind::Audio]).await;
    assert!(wait_until_quiet(&mesh, &[&a1, &z9], 1, 1).await);

    let z9_link = mesh.network.link("z9", "a1").expect("z9 should link to a1");

    // A transient disconnect keeps the peer.
    z9_link.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(z9.peer_count().await, 1);
    assert_eq!(z9_observer.disconnect_count("a1").await, 0);

    z9_link.fail_connection();
    assert!(z9_observer.wait_for_disconnect("a1", WAIT_MS).await);
    assert!(z9_observer.faults().await.contains(&PeerFault::ConnectionFailed {
        participant: ParticipantId::from("a1"),
    }));
    assert_eq!(z9.peer_count().await, 0);

    // Late events from the dead link and a1's presence leave change nothing.
    z9_link.fail_connection();
    a1.dispose().await.expect("Failed to leave");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(z9_observer.disconnect_count("a1").await, 1);

    z9.dispose().await.expect("Failed to leave");
    assert_eq!(z9_observer.disconnect_count("a1").await, 1);
}
