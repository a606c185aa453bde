//! Node operations against a scripted gateway.

mod common;

use std::sync::Arc;

use common::{ready_server, FakeGateway, RecordingSink, SUBID};
use provision::gateway::Method;
use provision::{nodes, ProvisionError, Provisioner};

fn provisioner(gateway: &Arc<FakeGateway>, sink: &Arc<RecordingSink>) -> Provisioner {
    Provisioner::new(gateway.clone()).with_events(sink.clone())
}

#[tokio::test]
async fn test_destroy_empty_reply_is_success() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));
    let sink = Arc::new(RecordingSink::default());

    let subid = provisioner(&gateway, &sink).destroy("host1").await.unwrap();

    assert_eq!(subid, SUBID);
    let destroys = gateway.calls_to("server/destroy");
    assert_eq!(destroys.len(), 1);
    assert_eq!(destroys[0].method, Method::POST);
    assert_eq!(destroys[0].form()["SUBID"], SUBID);
    assert_eq!(
        sink.topics(),
        vec!["cloud/host1/destroying", "cloud/host1/destroyed"]
    );
}

#[tokio::test]
async fn test_destroy_by_subid() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));
    let sink = Arc::new(RecordingSink::default());

    let subid = provisioner(&gateway, &sink).destroy(SUBID).await.unwrap();

    assert_eq!(subid, SUBID);
}

#[tokio::test]
async fn test_destroy_unknown_node() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));
    let sink = Arc::new(RecordingSink::default());

    let err = provisioner(&gateway, &sink).destroy("ghost").await.unwrap_err();

    assert!(matches!(err, ProvisionError::NotFound(_)));
    assert!(gateway.calls_to("server/destroy").is_empty());
    assert_eq!(sink.topics(), vec!["cloud/ghost/destroying"]);
}

#[tokio::test]
async fn test_start_and_stop_use_action_endpoints() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));
    let sink = Arc::new(RecordingSink::default());
    let provisioner = provisioner(&gateway, &sink);

    provisioner.stop("host1").await.unwrap();
    provisioner.start("host1").await.unwrap();

    assert_eq!(gateway.calls_to("server/halt")[0].form()["SUBID"], SUBID);
    assert_eq!(gateway.calls_to("server/start")[0].form()["SUBID"], SUBID);
}

#[tokio::test]
async fn test_list_nodes_full_is_keyed_by_label() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));
    let sink = Arc::new(RecordingSink::default());

    let nodes = provisioner(&gateway, &sink).list_nodes_full().await.unwrap();

    let host1 = &nodes["host1"];
    assert_eq!(host1["id"], SUBID);
    assert_eq!(host1["image"], "CentOS 8 x64");
    assert_eq!(host1["size"], "201");
    assert_eq!(host1["state"], "active");
    assert_eq!(host1["private_ips"], "");
    assert_eq!(host1["public_ips"], "203.0.113.10");
}

#[tokio::test]
async fn test_list_nodes_brief() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));
    let sink = Arc::new(RecordingSink::default());

    let nodes = provisioner(&gateway, &sink).list_nodes().await.unwrap();

    assert_eq!(nodes.len(), 1);
    let (label, summary) = &nodes[0];
    assert_eq!(label, "host1");
    assert_eq!(summary.id, SUBID);
    assert_eq!(summary.size.as_deref(), Some("201"));
}

#[tokio::test]
async fn test_show_instance_missing_is_none() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![serde_json::json!([])]));
    let sink = Arc::new(RecordingSink::default());

    let found = provisioner(&gateway, &sink).show_instance("host1").await.unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn test_show_keypair() {
    let gateway = FakeGateway::new();

    let key = nodes::show_keypair(&gateway, "6043ec83f126a").await.unwrap();
    assert_eq!(key["name"], "ed25519 SSH Key");

    let err = nodes::show_keypair(&gateway, "missing").await.unwrap_err();
    assert!(matches!(err, ProvisionError::NotFound(_)));
}

#[tokio::test]
async fn test_list_nodes_select_keeps_selected_fields() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));
    let sink = Arc::new(RecordingSink::default());
    let selection = vec![
        "id".to_string(),
        "public_ips".to_string(),
        "no_such_field".to_string(),
    ];

    let nodes = provisioner(&gateway, &sink)
        .list_nodes_select(&selection)
        .await
        .unwrap();

    let host1 = nodes["host1"].as_object().unwrap();
    assert_eq!(host1.len(), 2);
    assert_eq!(host1["id"], SUBID);
    assert_eq!(host1["public_ips"], "203.0.113.10");
}

#[tokio::test]
async fn test_list_nodes_select_all() {
    let gateway = Arc::new(FakeGateway::new().with_servers(vec![ready_server()]));

    let selected = nodes::list_nodes_select(gateway.as_ref(), &["all".to_string()])
        .await
        .unwrap();
    let full = nodes::list_nodes_full(gateway.as_ref()).await.unwrap();

    assert_eq!(selected, full);
}
