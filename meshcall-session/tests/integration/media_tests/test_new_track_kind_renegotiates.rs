use meshcall_session::{LocalStream, LocalTrack, TrackKind};

use crate::integration::{
    TestMesh, WAIT_MS, eventually, init_tracing, wait_until_quiet, wait_until_settled,
};
use crate::utils::LinkStats;

#[tokio::test]
async fn test_new_track_kind_renegotiates() {
    init_tracing();

    let mesh = TestMesh::new("r1");
    let a1_stream = LocalStream::capture(&[TrackKind::Audio]);
    let (a1, _a1_observer) = mesh.join_with_stream("a1", a1_stream.clone()).await;
    let (z9, z9_observer) = mesh.join("z9", &[TrackKind::Audio]).await;
    assert!(wait_until_quiet(&mesh, &[&a1, &z9], 1, 1).await);

    let a1_link = mesh.network.link("a1", "z9").expect("a1 should link to z9");
    let offers_before = LinkStats::get(&a1_link.stats.offers_created);

    // Camera turned on: the audio track stays, a video track joins the stream.
    let with_camera = LocalStream::from_tracks(
        a1_stream.id(),
        vec![
            a1_stream.audio_tracks()[0].clone(),
            LocalTrack::new(TrackKind::Video, a1_stream.id()),
        ],
    );
    a1.update_local_stream(with_camera)
        .await
        .expect("Failed to update stream");

    assert_eq!(a1_link.sender_count(), 2);
    assert_eq!(LinkStats::get(&a1_link.stats.replacements), 0);

    let link = &a1_link;
    let renegotiated = eventually(WAIT_MS, move || async move {
        LinkStats::get(&link.stats.offers_created) == offers_before + 1
    })
    .await;
    assert!(renegotiated, "Adding a video track should trigger an offer");

    assert!(wait_until_settled(&z9, 1, 2).await);
    let streams = z9_observer.remote_streams_from("a1").await;
    assert_eq!(streams.len(), 1, "The existing remote stream grows in place");
    assert!(streams[0].has_kind(TrackKind::Video));

    a1.dispose().await.expect("Failed to leave");
    z9.dispose().await.expect("Failed to leave");
}
