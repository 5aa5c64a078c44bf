//! Broadcast snapshot semantics and rate-limit propagation.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{Fleet, service, settings};
use shardsync_core::events::{EventPayload, SyncedRatelimit, tags};
use shardsync_core::{ClusterId, SyncError, SyncFrame};
use shardsync_server::MemoryPeer;

async fn next_frame(peer: &mut MemoryPeer) -> Option<SyncFrame> {
    tokio::time::timeout(Duration::from_millis(300), peer.recv_frame())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn broken_recipient_does_not_stop_the_rest() {
    let (service, _connector, mut peers) = service(&settings(None, &[(1, None), (2, None), (3, None), (4, None)]));
    let _ = service.start().await;
    let manager = &service.context().manager;

    let mut connected = Vec::new();
    for id in 1..=3 {
        manager.connect_cluster(ClusterId::new(id), false, false).await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(next_frame(&mut peer).await.unwrap().event, tags::CLUSTER_START);
        connected.push(peer);
    }

    // Cluster 2 stops reading: its queue is closed but the link stays up.
    let MemoryPeer { to_coordinator: _keep_alive, .. } = connected.remove(1);

    let report = service
        .context()
        .ratelimit
        .set_interval_nanos(30_000_000)
        .unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, vec![ClusterId::new(2)]);

    for peer in &mut connected {
        let frame = next_frame(peer).await.unwrap();
        assert_eq!(frame.event, tags::SYNCED_RATELIMIT);
        assert_eq!(frame.data["intervalTimeNanos"], 30_000_000);
    }

    // A cluster connecting after the broadcast never sees it.
    manager.connect_cluster(ClusterId::new(4), false, false).await.unwrap();
    let mut late = peers.recv().await.unwrap();
    assert_eq!(next_frame(&mut late).await.unwrap().event, tags::CLUSTER_START);
    assert!(next_frame(&mut late).await.is_none());
}

#[tokio::test]
async fn repeated_interval_is_broadcast_each_time() {
    let (service, _connector, peers) = service(&settings(None, &[(1, None), (2, None)]));
    let fleet = Fleet::spawn(peers, None);
    let _ = service.start().await;
    let manager = &service.context().manager;
    manager.connect_cluster(ClusterId::new(1), true, false).await.unwrap();
    manager.connect_cluster(ClusterId::new(2), true, false).await.unwrap();

    let ratelimit = &service.context().ratelimit;
    for _ in 0..2 {
        let report = ratelimit.set_interval_nanos(25_000_000).unwrap();
        assert_eq!(report.delivered, 2);
    }
    assert_eq!(ratelimit.interval_nanos(), 25_000_000);

    for id in [1, 2] {
        let frames = fleet.wait_for(id, tags::SYNCED_RATELIMIT, 2).await;
        assert_eq!(frames.len(), 2);
        for frame in frames {
            assert_eq!(
                frame.payload().unwrap(),
                EventPayload::SyncedRatelimit(SyncedRatelimit {
                    interval_time_nanos: 25_000_000
                })
            );
        }
    }
}

#[tokio::test]
async fn invalid_interval_is_rejected_without_broadcast() {
    let (service, _connector, peers) = service(&settings(None, &[(1, None)]));
    let fleet = Fleet::spawn(peers, None);
    let _ = service.start().await;
    service
        .context()
        .manager
        .connect_cluster(ClusterId::new(1), true, false)
        .await
        .unwrap();

    let ratelimit = &service.context().ratelimit;
    let before = ratelimit.interval_nanos();
    assert_matches!(ratelimit.set_interval_nanos(0), Err(SyncError::InvalidInterval(0)));
    assert_matches!(ratelimit.set_interval_nanos(-1), Err(SyncError::InvalidInterval(-1)));
    assert_eq!(ratelimit.interval_nanos(), before);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fleet.frames(1, tags::SYNCED_RATELIMIT).is_empty());
}
