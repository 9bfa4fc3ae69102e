use k8s_openapi::api::core::v1::{Node, Pod};
use serde_json::json;
use std::sync::Arc;

use crate::collector::kube_api::{node_record, pod_ips, pod_record};
use crate::collector::kubectl::{parse_addresses, parse_nodes, parse_pods};
use crate::collector::{snapshot, KubectlCollector, StateCollector};
use crate::error::Error;
use crate::executor::CommandExecutor;
use crate::types::{NodeStatus, PodStatus};
use crate::unit_tests::fakes::*;

const NODES: &str = "\
ip-172-31-1-10   Ready                      control-plane,etcd,master   12m   v1.27.1+rke2r1
ip-172-31-1-11   NotReady                   <none>                      10m   v1.27.1+rke2r1
ec2amaz-win01    Ready,SchedulingDisabled   <none>                      4m    v1.27.1+rke2r1
";

const PODS: &str = "\
kube-system   helm-install-rke2-canal-8x2lq        0/1   Completed          0             12m
kube-system   rke2-coredns-rke2-coredns-6b9548f79f-bqlm5   1/1   Running   2 (5m ago)   12m
default       windows-app-7f9c5b6c8d-l2k4x         0/1   ContainerCreating  0             1m
";

#[test]
fn test_parse_nodes() {
    let nodes = parse_nodes(NODES).unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].name, "ip-172-31-1-10");
    assert_eq!(nodes[0].status, NodeStatus::Ready);
    assert_eq!(nodes[1].status, NodeStatus::NotReady);
    assert_eq!(nodes[2].status, NodeStatus::Ready);
    assert!(!nodes[2].schedulable);
}

#[test]
fn test_parse_pods() {
    let pods = parse_pods(PODS).unwrap();
    assert_eq!(pods.len(), 3);
    assert_eq!(pods[0].status, PodStatus::Completed);
    assert_eq!((pods[0].ready_containers, pods[0].total_containers), (0, 1));
    assert_eq!(pods[1].restart_count, 2);
    assert_eq!(pods[1].namespace, "kube-system");
    assert_eq!(
        pods[2].status,
        PodStatus::Other("ContainerCreating".to_string())
    );
}

#[test]
fn test_parse_pods_rejects_malformed_ready_field() {
    let out = "kube-system   coredns   1of2   Running   0   1m\n";
    match parse_pods(out) {
        Err(Error::ParseFailed { field, input }) => {
            assert_eq!(field, "ready/total");
            assert_eq!(input, "1of2");
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
    assert!(parse_pods("kube-system coredns 1/x Running 0 1m").is_err());
    assert!(parse_pods("kube-system coredns 1/2/3 Running 0 1m").is_err());
}

#[test]
fn test_no_resources_is_empty() {
    assert!(parse_pods("No resources found\n").unwrap().is_empty());
    assert!(parse_nodes("").unwrap().is_empty());
}

#[test]
fn test_parse_addresses() {
    assert_eq!(
        parse_addresses("'10.42.0.12 10.42.3.4 '"),
        vec!["10.42.0.12".to_string(), "10.42.3.4".to_string()]
    );
    assert!(parse_addresses(" ").is_empty());
}

#[tokio::test]
async fn test_kubectl_collector_queries_with_kubeconfig() {
    let executor = Arc::new(
        FakeExecutor::new()
            .on("get nodes", vec![Ok(NODES)])
            .on("get pods -A", vec![Ok(PODS)])
            .on("get pods -l app=client", vec![Ok("10.42.1.7 ")]),
    );
    let collector = KubectlCollector::new(executor.clone(), "/tmp/kubeconfig.yaml");
    assert_eq!(collector.list_nodes().await.unwrap().len(), 3);
    assert_eq!(collector.list_pods().await.unwrap().len(), 3);
    assert_eq!(
        collector.pod_addresses("app=client").await.unwrap(),
        vec!["10.42.1.7".to_string()]
    );
    let cmds = executor.executed_commands();
    assert_eq!(cmds.len(), 3);
    assert!(cmds
        .iter()
        .all(|c| c.starts_with("kubectl ") && c.ends_with("--kubeconfig=/tmp/kubeconfig.yaml")));
}

#[tokio::test]
async fn test_kubectl_collector_ignores_stderr_noise() {
    let noise = "E1019 10:02:11.523871   4121 memcache.go:287] couldn't get resource list for metrics.k8s.io/v1beta1: the server is currently unable to handle the request\nWarning: short line\n";
    let executor = Arc::new(
        FakeExecutor::new()
            .with_stderr(noise)
            .on("get nodes", vec![Ok(NODES)])
            .on("get pods -A", vec![Ok(PODS)]),
    );
    let collector = KubectlCollector::new(executor.clone(), "/tmp/kubeconfig.yaml");
    let nodes = collector.list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().all(|n| !n.name.starts_with("E1019")));
    assert_eq!(collector.list_pods().await.unwrap().len(), 3);
    // The combined output is what a plain run sees.
    assert!(executor.run("kubectl get pods -A").await.unwrap().contains("memcache.go"));
}

#[tokio::test]
async fn test_kubectl_collector_transport_failure_is_retryable() {
    let executor = Arc::new(FakeExecutor::new().on("get nodes", vec![Err("connection refused")]));
    let collector = KubectlCollector::new(executor, "/tmp/kubeconfig.yaml");
    let err = collector.list_nodes().await.unwrap_err();
    assert!(matches!(err, Error::CollectionFailed { what: "nodes", .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_kubectl_collector_parse_failure_is_not_retryable() {
    let executor = Arc::new(
        FakeExecutor::new().on("get pods", vec![Ok("kube-system coredns ?/1 Running 0 1m")]),
    );
    let collector = KubectlCollector::new(executor, "/tmp/kubeconfig.yaml");
    let err = collector.list_pods().await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_snapshot_keeps_collection_errors() {
    let collector = FakeCollector::new(
        Script::new(vec![Err("apiserver unavailable".to_string())]),
        Script::always(vec![pod("coredns", PodStatus::Running, 1, 1, 0)]),
    );
    let snap = snapshot(&collector).await;
    assert!(snap.nodes.unwrap_err().contains("apiserver unavailable"));
    assert_eq!(snap.pods.as_ref().unwrap().len(), 1);
}

#[test]
fn test_node_record_from_api_object() {
    let node: Node = serde_json::from_value(json!({
        "metadata": { "name": "ec2amaz-win01" },
        "spec": { "unschedulable": true },
        "status": {
            "conditions": [
                { "type": "MemoryPressure", "status": "False" },
                { "type": "Ready", "status": "False" }
            ]
        }
    }))
    .unwrap();
    let record = node_record(&node);
    assert_eq!(record.name, "ec2amaz-win01");
    assert_eq!(record.status, NodeStatus::NotReady);
    assert!(!record.schedulable);

    let bare: Node = serde_json::from_value(json!({ "metadata": { "name": "n" } })).unwrap();
    assert_eq!(node_record(&bare).status, NodeStatus::Unknown);
}

#[test]
fn test_pod_record_from_api_object() {
    let pod: Pod = serde_json::from_value(json!({
        "metadata": { "name": "app-y", "namespace": "default" },
        "spec": { "containers": [ { "name": "web" }, { "name": "sidecar" } ] },
        "status": {
            "phase": "Running",
            "containerStatuses": [
                { "name": "web", "ready": true, "restartCount": 1, "image": "nginx", "imageID": "" },
                { "name": "sidecar", "ready": false, "restartCount": 2, "image": "busybox", "imageID": "" }
            ]
        }
    }))
    .unwrap();
    let record = pod_record(&pod);
    assert_eq!(record.namespace, "default");
    assert_eq!(record.status, PodStatus::Running);
    assert_eq!((record.ready_containers, record.total_containers), (1, 2));
    assert_eq!(record.restart_count, 3);
}

#[test]
fn test_pod_record_prefers_waiting_reason_and_maps_succeeded() {
    let crashing: Pod = serde_json::from_value(json!({
        "metadata": { "name": "crashy" },
        "spec": { "containers": [ { "name": "c" } ] },
        "status": {
            "phase": "Running",
            "containerStatuses": [ {
                "name": "c", "ready": false, "restartCount": 5, "image": "x", "imageID": "",
                "state": { "waiting": { "reason": "CrashLoopBackOff" } }
            } ]
        }
    }))
    .unwrap();
    assert_eq!(
        pod_record(&crashing).status,
        PodStatus::Other("CrashLoopBackOff".to_string())
    );

    let job: Pod = serde_json::from_value(json!({
        "metadata": { "name": "helm-install-traefik" },
        "spec": { "containers": [ { "name": "helm" } ] },
        "status": { "phase": "Succeeded" }
    }))
    .unwrap();
    assert_eq!(pod_record(&job).status, PodStatus::Completed);
}

#[test]
fn test_pod_ips_reads_every_address() {
    let dual_stack: Pod = serde_json::from_value(json!({
        "metadata": { "name": "client-1" },
        "status": {
            "podIP": "10.42.1.7",
            "podIPs": [ { "ip": "10.42.1.7" }, { "ip": "fd00:42::7" } ]
        }
    }))
    .unwrap();
    assert_eq!(pod_ips(&dual_stack), vec!["10.42.1.7", "fd00:42::7"]);

    let legacy: Pod = serde_json::from_value(json!({
        "metadata": { "name": "client-2" },
        "status": { "podIP": "10.42.2.9" }
    }))
    .unwrap();
    assert_eq!(pod_ips(&legacy), vec!["10.42.2.9"]);

    let pending: Pod = serde_json::from_value(json!({ "metadata": { "name": "client-3" } })).unwrap();
    assert!(pod_ips(&pending).is_empty());
}
