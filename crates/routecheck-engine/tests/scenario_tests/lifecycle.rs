//! Stories about bringing resources into existence and tearing them down

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use routecheck_common::{EngineConfig, LABEL_RUN_ID};
use routecheck_engine::{
    Deletion, Error, FieldPath, Matcher, Poller, ResourceKind, TemplateEngine, TestContext,
};
use tempfile::TempDir;

use super::fake::FakeCluster;

const INGRESS_CONTROLLER: &str = r#"apiVersion: operator.openshift.io/v1
kind: IngressController
metadata:
  name: ${NAME}
  namespace: ${NAMESPACE}
  annotations:
    ingress.operator.openshift.io/default-enable-http2: "${HTTP2}"
spec:
  domain: ${DOMAIN | yaml_quote}
  replicas: 1
  endpointPublishingStrategy:
    type: Private
  tuningOptions:
    maxConnections: ${MAX_CONNECTIONS}
  namespaceSelector:
    matchLabels:
      shard: ${SHARD | yaml_quote}
"#;

const IP_FAILOVER: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: ${NAME}
  namespace: ${NAMESPACE}
spec:
  replicas: 2
  template:
    spec:
      containers:
        - name: keepalived
          env:
            - name: OPENSHIFT_HA_NETWORK_INTERFACE
              value: ${HA_INTERFACE | yaml_quote}
            - name: OPENSHIFT_HA_VIRTUAL_IPS
              value: ${VIRTUAL_IPS | yaml_quote}
            - name: OPENSHIFT_HA_MONITOR_PORT
              value: ${MONITOR_PORT | yaml_quote}
            - name: ALLOWED_SOURCE
              value: ${ALLOWED_SOURCE | yaml_quote}
            - name: HEALTH_PATH
              value: ${HEALTH_PATH | yaml_quote}
"#;

struct Fixture {
    _dir: TempDir,
    ingress_controller: PathBuf,
    ip_failover: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(body.as_bytes())
            .unwrap();
        path
    };
    let ingress_controller = write("ingresscontroller.yaml", INGRESS_CONTROLLER);
    let ip_failover = write("ipfailover.yaml", IP_FAILOVER);
    Fixture {
        _dir: dir,
        ingress_controller,
        ip_failover,
    }
}

fn context() -> TestContext {
    let mut config = EngineConfig::default();
    config.run_id = Some("e2e-run-17".to_string());
    TestContext::new("openshift-ingress-operator", config)
}

fn max_connections_validator(manifest: &serde_json::Value) -> Option<String> {
    let value = manifest.pointer("/spec/tuningOptions/maxConnections")?.as_i64()?;
    (!(-1..=2_000_000).contains(&value)).then(|| {
        format!(
            "IngressController.operator.openshift.io \"{}\" is invalid: spec.tuningOptions.maxConnections: Invalid value: {value}: spec.tuningOptions.maxConnections in body should be less than or equal to 2000000",
            manifest["metadata"]["name"].as_str().unwrap_or_default()
        )
    })
}

/// Story: a shard is created, converges only through an explicit poll, and
/// goes away cleanly
#[tokio::test(start_paused = true)]
async fn story_ingress_controller_lifecycle() {
    let fx = fixture();
    let ctx = context();
    let cluster = Arc::new(FakeCluster::new());
    let renderer = TemplateEngine::new();

    let shard = ctx
        .descriptor(
            ResourceKind::IngressController,
            ctx.unique_name("shard"),
            &fx.ingress_controller,
        )
        .param("DOMAIN", "shard.apps.example.com")
        .param("HTTP2", "true")
        .param("MAX_CONNECTIONS", "50000")
        .param("SHARD", "blue");

    let target = shard.create(&ctx, &renderer, cluster.as_ref()).await.unwrap();
    assert_eq!(target, shard.object_ref());

    // Created is not ready: the controller reports Available later
    let controller = {
        let cluster = cluster.clone();
        let target = target.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            cluster.set_condition(&target, "Available", "True");
        })
    };

    let poller = Poller::new(Duration::from_secs(5), Duration::from_secs(60));
    poller
        .until_condition(cluster.as_ref(), &target, "Available", "True")
        .await
        .unwrap();
    controller.await.unwrap();

    let stored = cluster.stored(&target).unwrap();
    assert_eq!(stored["metadata"]["labels"][LABEL_RUN_ID], "e2e-run-17");
    assert_eq!(
        poller
            .until_field_matches(
                cluster.as_ref(),
                &target,
                &FieldPath::annotation("ingress.operator.openshift.io/default-enable-http2"),
                &Matcher::exact("true"),
            )
            .await
            .unwrap(),
        "true"
    );

    assert_eq!(shard.delete(cluster.as_ref()).await.unwrap(), Deletion::Removed);
    shard.wait_deleted(&poller, cluster.as_ref()).await.unwrap();
}

/// Story: an out-of-range value is rejected at admission with the server's text
#[tokio::test]
async fn story_admission_rejection_is_asserted_verbatim() {
    let fx = fixture();
    let ctx = context();
    let cluster = FakeCluster::new().with_validator(max_connections_validator);

    let shard = ctx
        .descriptor(ResourceKind::IngressController, "shard-max", &fx.ingress_controller)
        .param("DOMAIN", "max.apps.example.com")
        .param("HTTP2", "false")
        .param("MAX_CONNECTIONS", "2000001")
        .param("SHARD", "max");

    let err = shard
        .create(&ctx, &TemplateEngine::new(), &cluster)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Admission { .. }));
    assert!(err
        .message()
        .contains("spec.tuningOptions.maxConnections in body should be less than or equal to 2000000"));
    assert!(cluster.stored(&shard.object_ref()).is_none());
}

/// Story: a render failure and an admission failure are told apart
#[tokio::test]
async fn story_render_and_admission_failures_are_distinct() {
    let fx = fixture();
    let ctx = context();
    let cluster = FakeCluster::new();
    let renderer = TemplateEngine::new();

    // MAX_CONNECTIONS is missing
    let incomplete = ctx
        .descriptor(ResourceKind::IngressController, "shard-x", &fx.ingress_controller)
        .param("DOMAIN", "x.apps.example.com")
        .param("HTTP2", "true")
        .param("SHARD", "x");
    let err = incomplete.create(&ctx, &renderer, &cluster).await.unwrap_err();
    assert!(matches!(err, Error::Render { .. }), "{err:?}");

    let complete = incomplete.param("MAX_CONNECTIONS", "1000");
    complete.create(&ctx, &renderer, &cluster).await.unwrap();

    // Same name again: naming conflict at admission
    let err = complete.create(&ctx, &renderer, &cluster).await.unwrap_err();
    assert!(matches!(err, Error::Admission { .. }));
    assert!(err.message().contains("already exists"));
}

/// Story: cleanup runs unconditionally, so the second delete sees nothing
#[tokio::test]
async fn story_double_delete_is_not_an_error() {
    let fx = fixture();
    let ctx = context();
    let cluster = FakeCluster::new();

    let shard = ctx
        .descriptor(ResourceKind::IngressController, "shard-del", &fx.ingress_controller)
        .param("DOMAIN", "del.apps.example.com")
        .param("HTTP2", "true")
        .param("MAX_CONNECTIONS", "0")
        .param("SHARD", "del");
    shard.create(&ctx, &TemplateEngine::new(), &cluster).await.unwrap();

    assert_eq!(shard.delete(&cluster).await.unwrap(), Deletion::Removed);
    assert_eq!(shard.delete(&cluster).await.unwrap(), Deletion::AlreadyAbsent);

    // Never created at all: still fine
    let ghost = ctx.descriptor(ResourceKind::Gateway, "never-created", "gateway.yaml");
    assert_eq!(ghost.delete(&cluster).await.unwrap(), Deletion::AlreadyAbsent);
}

/// Story: substitutions survive rendering and parsing byte for byte
#[tokio::test]
async fn story_template_round_trip_preserves_special_characters() {
    let fx = fixture();
    let ctx = context();
    let renderer = TemplateEngine::new();

    let params = [
        ("VIRTUAL_IPS", "192.168.1.100-101"),
        ("MONITOR_PORT", "1985"),
        ("ALLOWED_SOURCE", "0.0.0.0/0"),
        ("HEALTH_PATH", "/healthz/ready.v2"),
    ];
    let ipf = ctx
        .descriptor(
            ResourceKind::IpFailover {
                interface: "br-ex.100".to_string(),
            },
            "ipf-*.apps",
            &fx.ip_failover,
        )
        .params(params);

    let manifest = ipf.render(&renderer).unwrap();
    assert_eq!(manifest["metadata"]["name"], "ipf-*.apps");

    let env = manifest
        .pointer("/spec/template/spec/containers/0/env")
        .and_then(|v| v.as_array())
        .unwrap();
    let value = |name: &str| {
        env.iter()
            .find(|e| e["name"] == name)
            .and_then(|e| e["value"].as_str())
            .unwrap()
            .to_string()
    };

    assert_eq!(value("OPENSHIFT_HA_NETWORK_INTERFACE"), "br-ex.100");
    assert_eq!(value("OPENSHIFT_HA_VIRTUAL_IPS"), "192.168.1.100-101");
    assert_eq!(value("OPENSHIFT_HA_MONITOR_PORT"), "1985");
    assert_eq!(value("ALLOWED_SOURCE"), "0.0.0.0/0");
    assert_eq!(value("HEALTH_PATH"), "/healthz/ready.v2");

    // Wildcard hosts need quoting in YAML; the filter handles it
    let shard = ctx
        .descriptor(ResourceKind::IngressController, "wild", &fx.ingress_controller)
        .param("DOMAIN", "*.apps.example.com")
        .param("HTTP2", "true")
        .param("MAX_CONNECTIONS", "-1")
        .param("SHARD", "a/b.c");
    let manifest = shard.render(&renderer).unwrap();
    assert_eq!(manifest["spec"]["domain"], "*.apps.example.com");
    assert_eq!(manifest["spec"]["namespaceSelector"]["matchLabels"]["shard"], "a/b.c");
}

/// Story: flaky reads during convergence do not fail the poll
#[tokio::test(start_paused = true)]
async fn story_transient_reads_are_absorbed() {
    let fx = fixture();
    let ctx = context();
    let cluster = FakeCluster::new();

    let shard = ctx
        .descriptor(ResourceKind::IngressController, "shard-flaky", &fx.ingress_controller)
        .param("DOMAIN", "flaky.apps.example.com")
        .param("HTTP2", "true")
        .param("MAX_CONNECTIONS", "100")
        .param("SHARD", "flaky");
    let target = shard.create(&ctx, &TemplateEngine::new(), &cluster).await.unwrap();
    cluster.set_condition(&target, "Admitted", "True");
    cluster.fail_next_reads(3);

    ctx.poller()
        .with_timeout(Duration::from_secs(30))
        .until_condition(&cluster, &target, "Admitted", "True")
        .await
        .unwrap();
}
