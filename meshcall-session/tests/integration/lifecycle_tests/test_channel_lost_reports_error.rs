use meshcall_session::TrackKind;

use crate::integration::{TestMesh, WAIT_MS, init_tracing};
use crate::utils::ObservedEvent;

#[tokio::test]
async fn test_channel_lost_reports_error() {
    init_tracing();

    let mesh = TestMesh::new("r1");
    let (a1, a1_observer) = mesh.join("a1", &[TrackKind::Audio]).await;

    mesh.hub.close_topic(&mesh.topic());

    let reported = a1_observer
        .wait_for(WAIT_MS, |events| {
            events
                .iter()
                .any(|e| matches!(e, ObservedEvent::Error(message) if message.contains("webrtc:r1")))
        })
        .await;
    assert!(reported, "Losing the channel should be reported");
    assert_eq!(a1_observer.errors().await.len(), 1);

    a1.dispose().await.expect("Leave should still succeed");
}
