// Integration tests for the classroom hub
// These run the real warp filters in-process against a live hub, with a
// stand-in evaluator so no sandbox interpreter is needed.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use warp::test::WsClient;
use warp::Filter;

use classroom_hub::api::classroom_routes::classroom_routes;
use classroom_hub::classroom::{EvaluationRequest, Evaluator, Hub, Room, Verdict};
use classroom_hub::config::Config;

/// Accepts any submission defining `hello()`
struct HelloEvaluator;

#[async_trait]
impl Evaluator for HelloEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Verdict {
        if request.code.contains("def hello") {
            Verdict {
                output: "OK".to_string(),
                success: true,
                passed: request.tests.len() as u32,
            }
        } else {
            Verdict::failure("[FAIL] Test 1")
        }
    }
}

fn routes() -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
    let hub = Hub::spawn("integration", Room::with_seed_catalog(), Arc::new(HelloEvaluator));
    classroom_routes(hub, Arc::new(Config::default()))
}

fn admin_auth() -> String {
    format!("Basic {}", STANDARD.encode("admin:admin"))
}

async fn recv_json(client: &mut WsClient) -> Value {
    let message = timeout(Duration::from_secs(2), client.recv())
        .await
        .expect("timed out waiting for message")
        .expect("socket closed");
    serde_json::from_str(message.to_str().expect("text frame")).unwrap()
}

async fn recv_type(client: &mut WsClient, kind: &str) -> Value {
    loop {
        let value = recv_json(client).await;
        if value["type"] == kind {
            return value;
        }
    }
}

/// Test HTTP health check endpoint
#[tokio::test]
async fn test_health_endpoint() {
    let resp = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&routes())
        .await;

    assert_eq!(resp.status(), 200);
    let body: Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "Classroom Hub");
}

/// Registration delivers the sanitized catalog and the participant's own record
#[tokio::test]
async fn test_registration_flow() {
    let mut client = warp::test::ws()
        .path("/ws?name=Alex")
        .handshake(routes())
        .await
        .expect("handshake");

    let tasks = recv_json(&mut client).await;
    assert_eq!(tasks["type"], "task_list");
    assert_eq!(tasks["payload"].as_array().unwrap().len(), 1);
    assert_eq!(tasks["payload"][0]["id"], "1");
    assert!(tasks["payload"][0].get("test_cases").is_none());

    let stats = recv_json(&mut client).await;
    assert_eq!(stats["type"], "user_stats");
    assert_eq!(stats["payload"]["id"], "Alex");
    assert_eq!(stats["payload"]["total_score"], 0);
    assert_eq!(stats["payload"]["status"], "Idle");

    let global = recv_json(&mut client).await;
    assert_eq!(global["type"], "global_stats");
}

/// Select, submit, get judged, resubmit: score moves exactly once
#[tokio::test]
async fn test_submission_flow() {
    let routes = routes();
    let mut client = warp::test::ws()
        .path("/ws?name=Alex")
        .handshake(routes.clone())
        .await
        .expect("handshake");

    let submit = json!({
        "type": "submit",
        "payload": "def hello():\n    return 'Hello World'"
    })
    .to_string();

    client.send_text(json!({"type": "select_task", "payload": "1"}).to_string()).await;
    client.send_text(submit.clone()).await;

    let result = recv_type(&mut client, "test_result").await;
    assert_eq!(result["payload"]["task_id"], "1");
    assert_eq!(result["payload"]["success"], true);

    client.send_text(submit).await;
    recv_type(&mut client, "test_result").await;

    let resp = warp::test::request()
        .method("GET")
        .path("/api/stats")
        .header("authorization", admin_auth())
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 200);

    let records: Value = serde_json::from_slice(resp.body()).unwrap();
    let alex = &records.as_array().unwrap()[0];
    assert_eq!(alex["id"], "Alex");
    assert_eq!(alex["status"], "Solved");
    assert_eq!(alex["total_score"], 1);
}

/// A cheat flag is visible to observers and cleared by selecting a task
#[tokio::test]
async fn test_cheat_warning_then_reselect() {
    let mut client = warp::test::ws()
        .path("/ws?name=Mia")
        .handshake(routes())
        .await
        .expect("handshake");
    recv_type(&mut client, "global_stats").await;

    client
        .send_text(json!({"type": "cheat_warning", "payload": "pasted answer"}).to_string())
        .await;
    let flagged = recv_type(&mut client, "global_stats").await;
    assert_eq!(flagged["payload"][0]["status"], "Flagged");
    assert_eq!(flagged["payload"][0]["paste_content"], "pasted answer");

    client.send_text(json!({"type": "select_task", "payload": "1"}).to_string()).await;
    let cleared = recv_type(&mut client, "global_stats").await;
    assert_eq!(cleared["payload"][0]["status"], "Idle");
}

/// A malformed frame tears the connection down
#[tokio::test]
async fn test_malformed_message_closes_connection() {
    let mut client = warp::test::ws()
        .path("/ws?name=Broken")
        .handshake(routes())
        .await
        .expect("handshake");

    client.send_text("{this is not json").await;

    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match client.recv().await {
                Ok(message) if message.is_close() => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection was not closed");
}

/// Admin API requires credentials
#[tokio::test]
async fn test_tasks_api_requires_auth() {
    let resp = warp::test::request()
        .method("GET")
        .path("/api/tasks")
        .reply(&routes())
        .await;

    assert_eq!(resp.status(), 401);
    assert_eq!(
        resp.headers().get("www-authenticate").unwrap(),
        "Basic realm=\"Teacher Area\""
    );

    let resp = warp::test::request()
        .method("GET")
        .path("/api/tasks")
        .header("authorization", format!("Basic {}", STANDARD.encode("admin:wrong")))
        .reply(&routes())
        .await;
    assert_eq!(resp.status(), 401);
}

/// Admin sees test cases; students get the new task without them
#[tokio::test]
async fn test_publish_task() {
    let routes = routes();
    let mut client = warp::test::ws()
        .path("/ws?name=Alex")
        .handshake(routes.clone())
        .await
        .expect("handshake");
    recv_type(&mut client, "global_stats").await;

    let task = json!({
        "id": "2",
        "title": "Sum",
        "description": "Return a + b",
        "starter_code": "def add(a, b):\n    pass",
        "test_cases": [{"code": "assert add(1, 2) == 3"}]
    });

    let resp = warp::test::request()
        .method("POST")
        .path("/api/tasks")
        .header("authorization", admin_auth())
        .json(&task)
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["replaced"], false);

    let broadcast = recv_type(&mut client, "task_list").await;
    assert_eq!(broadcast["payload"].as_array().unwrap().len(), 2);
    assert!(!broadcast.to_string().contains("assert add"));

    let resp = warp::test::request()
        .method("GET")
        .path("/api/tasks")
        .header("authorization", admin_auth())
        .reply(&routes)
        .await;
    let catalog: Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(catalog[1]["test_cases"][0]["code"], "assert add(1, 2) == 3");
}

/// Bad task bodies are rejected
#[tokio::test]
async fn test_publish_task_validation() {
    let routes = routes();

    let resp = warp::test::request()
        .method("POST")
        .path("/api/tasks")
        .header("authorization", admin_auth())
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 400);

    let resp = warp::test::request()
        .method("POST")
        .path("/api/tasks")
        .header("authorization", admin_auth())
        .json(&json!({"id": "  ", "title": "Blank"}))
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unknown_route() {
    let resp = warp::test::request()
        .method("GET")
        .path("/nope")
        .reply(&routes())
        .await;
    assert_eq!(resp.status(), 404);
}
