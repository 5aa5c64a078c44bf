//! Restart resilience.

mod common;

use common::{Fleet, service, settings, wait_status};
use shardsync_core::events::tags;
use shardsync_core::{ClusterId, ConnectionStatus};

#[tokio::test]
async fn restart_continues_past_a_failing_cluster() {
    let (service, connector, peers) = service(&settings(Some(30), &[
        (1, Some((0, 10))),
        (2, Some((10, 20))),
        (3, Some((20, 30))),
    ]));
    let fleet = Fleet::spawn(peers, Some(10));
    let _ = service.start().await;
    let manager = &service.context().manager;
    for id in 1..=3 {
        manager.connect_cluster(ClusterId::new(id), true, false).await.unwrap();
    }

    connector.refuse(ClusterId::new(2));
    let report = manager.restart().await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), vec![ClusterId::new(1), ClusterId::new(3)]);
    assert_eq!(report.failed(), vec![ClusterId::new(2)]);
    assert_eq!(wait_status(manager, 1, ConnectionStatus::Connected).await, ConnectionStatus::Connected);
    assert_eq!(wait_status(manager, 2, ConnectionStatus::Failed).await, ConnectionStatus::Failed);
    assert_eq!(wait_status(manager, 3, ConnectionStatus::Connected).await, ConnectionStatus::Connected);
    assert_eq!(manager.open_channels(), 2);

    for id in [1, 3] {
        let starts = fleet.wait_for(id, tags::CLUSTER_START, 2).await;
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0].data["reconnect"], false);
        assert_eq!(starts[1].data["reconnect"], true);
    }
    assert_eq!(fleet.frames(2, tags::CLUSTER_START).len(), 1);

    // The failed cluster can be brought back once it accepts again.
    connector.allow(ClusterId::new(2));
    manager.connect_cluster(ClusterId::new(2), true, true).await.unwrap();
    assert_eq!(manager.active_clusters().len(), 3);
}

#[tokio::test]
async fn restart_with_no_clusters_is_empty() {
    let (service, _connector, _peers) = service(&settings(None, &[]));
    let report = service.context().manager.restart().await;
    assert!(report.outcomes.is_empty());
}
