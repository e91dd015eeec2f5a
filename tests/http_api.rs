//! End-to-end tests over real HTTP.
//!
//! Each node serves the axum router on an ephemeral localhost port and talks
//! to the other through the reqwest transport.

use std::sync::Arc;
use std::time::Duration;

use procura::api;
use procura::network::http::HttpTransport;
use procura::node::{Node, NodeIdentity, NodeSettings};
use procura::workflow::EntityType;
use serde_json::{json, Value};

struct Running {
    node: Arc<Node>,
    base: String,
    port: u16,
}

async fn spawn_node(id: &str) -> Running {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let settings = NodeSettings {
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let transport = HttpTransport::new(settings.request_timeout).unwrap();
    let node = Arc::new(Node::new(
        NodeIdentity {
            id: id.to_string(),
            address: "127.0.0.1".to_string(),
            port,
            entity_type: EntityType::Government,
        },
        settings,
        Arc::new(transport),
        None,
    ));

    let app = api::router(node.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Running {
        node,
        base: format!("http://127.0.0.1:{}", port),
        port,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn contract_body() -> Value {
    json!({
        "entity_code": "MUN-05001",
        "entity_name": "Alcaldia de Medellin",
        "contract_type": "obra",
        "description": "Pavimentacion",
        "amount": 1000.0,
        "created_by": "dev-1"
    })
}

#[tokio::test]
async fn test_contract_lifecycle_over_http() {
    let a = spawn_node("a").await;
    let http = client();

    let resp = http
        .post(format!("{}/api/contracts", a.base))
        .json(&contract_body())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let contract: Value = resp.json().await.unwrap();
    let id = contract["id"].as_str().unwrap().to_string();
    assert_eq!(contract["status"], "DRAFT");
    assert_eq!(contract["current_step"], 1);

    let resp = http
        .post(format!("{}/api/contracts/{}/validate-step", a.base, id))
        .json(&json!({
            "step_number": 1,
            "validator_id": "dev-1",
            "role": "PROJECT_DEVELOPER",
            "approved": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let contract: Value = resp.json().await.unwrap();
    assert_eq!(contract["status"], "TECHNICAL_REVIEW");

    // Skipping a step is a 400 with a JSON error body.
    let resp = http
        .post(format!("{}/api/contracts/{}/validate-step", a.base, id))
        .json(&json!({
            "step_number": 3,
            "validator_id": "legal-1",
            "role": "LEGAL_COMMISSION",
            "approved": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("current step is 2"));

    let workflow: Value = http
        .get(format!("{}/api/contracts/{}/workflow", a.base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(workflow["completed_steps"], 1);
    assert_eq!(workflow["next_role"], "TECHNICAL_COMMISSION");

    let listed: Value = http
        .get(format!("{}/api/contracts?status=TECHNICAL_REVIEW", a.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 1);

    let resp = http
        .post(format!("{}/api/contracts/{}/audit", a.base, id))
        .json(&json!({
            "auditor_id": "procuraduria-1",
            "role": "PROSECUTOR",
            "observation": "Revisar pliegos"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let trail: Value = http
        .get(format!(
            "{}/api/contracts/{}/audit-trail?action=AUDIT_OBSERVATION",
            a.base, id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(trail.as_array().unwrap().len(), 1);

    let steps: Value = http
        .get(format!("{}/api/workflow/steps", a.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(steps.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_error_responses() {
    let a = spawn_node("a").await;
    let http = client();

    let resp = http
        .get(format!("{}/api/contracts/missing", a.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    let resp = http
        .post(format!("{}/api/contracts", a.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    let mut zero = contract_body();
    zero["amount"] = json!(0);
    let resp = http
        .post(format!("{}/api/contracts", a.base))
        .json(&zero)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = http
        .delete(format!("{}/api/p2p/peers/nobody", a.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = http
        .post(format!("{}/api/p2p/broadcast/deadbeef", a.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_replication_between_http_nodes() {
    let a = spawn_node("a").await;
    let b = spawn_node("b").await;
    let http = client();

    let resp = http
        .post(format!("{}/api/p2p/add-peer", a.base))
        .json(&json!({
            "id": "b",
            "address": "127.0.0.1",
            "port": b.port,
            "entity_type": "MUNICIPALITY"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = http
        .post(format!("{}/api/p2p/add-peer", a.base))
        .json(&json!({ "id": "b", "address": "127.0.0.1", "port": b.port }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Broadcast after create lands on b.
    http.post(format!("{}/api/contracts", a.base))
        .json(&contract_body())
        .send()
        .await
        .unwrap();
    for _ in 0..200 {
        if b.node.chain().await.height == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(b.node.chain().await.chain, a.node.chain().await.chain);

    // b pulls a's longer chain after a appends while b is not a's peer.
    http.delete(format!("{}/api/p2p/peers/b", a.base))
        .send()
        .await
        .unwrap();
    a.node
        .create_contract(serde_json::from_value(contract_body()).unwrap())
        .await
        .unwrap();
    b.node
        .add_peer("a", "127.0.0.1", a.port, EntityType::Government)
        .await
        .unwrap();

    let report: Value = http
        .post(format!("{}/api/p2p/sync", b.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["reconcile"]["adopted_from"], "a");
    assert_eq!(report["reconcile"]["height_after"], 3);

    let chain: Value = http
        .get(format!("{}/api/p2p/get-chain", b.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chain["height"], 3);

    let health: Value = http
        .get(format!("{}/api/health", b.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["node_id"], "b");
    assert_eq!(health["active_peers"], 1);
    assert_eq!(health["ledger"]["height"], 3);
    assert_eq!(health["ledger"]["chain_valid"], true);
}
