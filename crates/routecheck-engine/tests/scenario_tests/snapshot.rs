//! Stories about asserting on router configuration

use std::sync::Arc;
use std::time::Duration;

use routecheck_engine::{ConfigSnapshot, PodRef, Poller, SnapshotInspector, SnapshotSource};

use super::fake::{Backend, FakeRouterPod, Route};

fn route(name: &'static str, balance: &'static str, backends: &[(&'static str, u32)]) -> Route {
    Route {
        namespace: "e2e",
        name,
        balance,
        backends: backends
            .iter()
            .map(|&(name, weight)| Backend { name, weight })
            .collect(),
    }
}

fn router_pod() -> PodRef {
    PodRef::new("openshift-ingress", "router-default-7c9f").with_container("router")
}

/// Story: route-ab's settings never satisfy an assertion about route-a
#[tokio::test]
async fn story_block_isolation_between_overlapping_routes() {
    let router = FakeRouterPod::new(vec![
        route("route-a", "random", &[("web-1", 100), ("web-2", 50)]),
        route("route-ab", "leastconn", &[("web-3", 256)]),
    ]);
    let inspector = SnapshotInspector::new(&router, router_pod(), SnapshotSource::haproxy());
    let snapshot = inspector.fetch().await.unwrap();

    // "weight 256" and "leastconn" exist in the file, but only under route-ab
    assert!(snapshot.text().contains("weight 256"));
    let a = snapshot.block("backend be_http:e2e:route-a").unwrap();
    assert!(a.assert_contains(&["weight 256"]).is_err());
    assert!(a.assert_contains(&["balance leastconn"]).is_err());
    a.assert_not_contains(&["web-3"]).unwrap();
    a.assert_contains(&["balance random", "weight 100", "weight 50"]).unwrap();
    a.assert_matches(&[r"server pod:web-1:route-a \S+ cookie web-1 weight 100"])
        .unwrap();

    let ab = snapshot.block("backend be_http:e2e:route-ab").unwrap();
    ab.assert_contains(&["balance leastconn", "weight 256"]).unwrap();
    ab.assert_not_contains(&["web-1", "web-2"]).unwrap();
}

/// Story: after a weight change the reloaded config is eventually visible
#[tokio::test(start_paused = true)]
async fn story_wait_for_reloaded_weights() {
    let router = Arc::new(FakeRouterPod::new(vec![route(
        "route-a",
        "random",
        &[("web-1", 1), ("web-2", 1)],
    )]));

    let reload = {
        let router = router.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            router.reload(vec![route("route-a", "random", &[("web-1", 200), ("web-2", 100)])]);
        })
    };

    let inspector =
        SnapshotInspector::new(router.as_ref(), router_pod(), SnapshotSource::haproxy());
    let poller = Poller::new(Duration::from_secs(2), Duration::from_secs(30));
    let block = inspector
        .wait_for_block(&poller, "backend be_http:e2e:route-a", &["weight 200", "weight 100"])
        .await
        .unwrap();
    reload.await.unwrap();

    assert_eq!(block.header(), "backend be_http:e2e:route-a");
}

/// Story: a deleted route's backend disappears from the config
#[tokio::test(start_paused = true)]
async fn story_removed_route_leaves_config() {
    let router = Arc::new(FakeRouterPod::new(vec![
        route("route-a", "random", &[("web-1", 1)]),
        route("route-b", "random", &[("web-2", 1)]),
    ]));
    let inspector =
        SnapshotInspector::new(router.as_ref(), router_pod(), SnapshotSource::haproxy());
    assert_eq!(inspector.fetch().await.unwrap().headers("backend").len(), 2);

    router.reload(vec![route("route-a", "random", &[("web-1", 1)])]);

    let poller = Poller::new(Duration::from_secs(1), Duration::from_secs(10));
    inspector
        .wait_for_block_absent(&poller, "backend be_http:e2e:route-b")
        .await
        .unwrap();
    assert_eq!(
        inspector.fetch().await.unwrap().headers("backend"),
        vec!["backend be_http:e2e:route-a"]
    );
}

/// Story: a bad source path is an operation error, never an empty block
#[tokio::test]
async fn story_missing_config_file_is_reported() {
    let router = FakeRouterPod::new(vec![route("route-a", "random", &[("web-1", 1)])]);
    let inspector = SnapshotInspector::new(
        &router,
        router_pod(),
        SnapshotSource::File("/var/lib/haproxy/conf/missing.config".into()),
    );

    let err = inspector.fetch().await.unwrap_err();
    assert!(err.to_string().contains("No such file or directory"));
}

#[test]
fn test_snapshot_parses_generated_config() {
    let router = FakeRouterPod::new(vec![route("route-a", "random", &[("web-1", 1)])]);
    let snapshot = ConfigSnapshot::new(router.config());
    let defaults = snapshot.block("defaults").unwrap();
    defaults.assert_contains(&["timeout server 30s"]).unwrap();
    defaults.assert_not_contains(&["maxconn"]).unwrap();
}
