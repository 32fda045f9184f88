use entity_gateway::config::ApiConfig;
use entity_gateway::logic::ControllerRegistry;
use entity_gateway::{build_app, seed, InMemoryStore};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    async fn delete(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .delete(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    async fn patch_if_match(
        &self,
        path: &str,
        etag: &str,
        json: Value,
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .patch(&format!("{}{}", self.base_url, path))
            .header("If-Match", etag)
            .json(&json)
            .send()
            .await
    }

    async fn batch(&self, requests: Value) -> Vec<Value> {
        let response = self
            .post("/api/$batch", json!({ "requests": requests }))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        body["responses"].as_array().cloned().unwrap_or_default()
    }
}

/// Serve the seeded demo store on an ephemeral port
async fn start_server(verbose_errors: bool) -> TestClient {
    start_server_with_store(verbose_errors).await.0
}

async fn start_server_with_store(verbose_errors: bool) -> (TestClient, Arc<InMemoryStore>) {
    let store = Arc::new(seed::build_store(true).unwrap());
    let config = ApiConfig {
        use_verbose_errors: verbose_errors,
        ..ApiConfig::default()
    };
    let app = build_app(store.clone(), ControllerRegistry::new(), config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (TestClient::new(format!("http://{}", address)), store)
}

fn ids(responses: &[Value]) -> Vec<&str> {
    responses.iter().map(|r| r["id"].as_str().unwrap()).collect()
}

fn statuses(responses: &[Value]) -> Vec<u64> {
    responses.iter().map(|r| r["status"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn test_change_set_responses_follow_request_order() {
    let client = start_server(true).await;

    let responses = client
        .batch(json!([
            {"id": "1", "method": "GET", "url": "People"},
            {"id": "2", "atomicityGroup": "g1", "method": "POST", "url": "People",
             "body": {"Name": "Linus Torvalds"}},
            {"id": "3", "atomicityGroup": "g1", "method": "PATCH", "url": "People(2)",
             "body": {"Age": 42}},
            {"id": "4", "atomicityGroup": "g1", "method": "DELETE", "url": "/api/People(3)"},
            {"id": "5", "method": "GET", "url": "People"}
        ]))
        .await;

    assert_eq!(ids(&responses), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(statuses(&responses), vec![200, 201, 204, 204, 200]);
    assert_eq!(responses[1]["atomicityGroup"], "g1");
    assert_eq!(responses[1]["body"]["Id"], 4);
    assert_eq!(responses[0]["body"]["value"].as_array().unwrap().len(), 3);

    let people = responses[4]["body"]["value"].as_array().unwrap();
    let names: Vec<&str> = people.iter().map(|p| p["Name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Ada Lovelace", "Alan Turing", "Linus Torvalds"]);
    assert_eq!(people[1]["Age"], 42);
}

#[tokio::test]
async fn test_validation_failure_returns_every_result() {
    let client = start_server(true).await;

    let responses = client
        .batch(json!([
            {"id": "a", "method": "GET", "url": "People(1)"},
            {"id": "b", "atomicityGroup": "g", "method": "POST", "url": "People",
             "body": {"Name": ""}},
            {"id": "c", "atomicityGroup": "g", "method": "POST", "url": "People",
             "body": {"Name": "x".repeat(60)}},
            {"id": "d", "atomicityGroup": "g", "method": "POST", "url": "People",
             "body": {"Name": "Valid Name"}},
            {"id": "z", "method": "GET", "url": "Orders"}
        ]))
        .await;

    assert_eq!(ids(&responses), vec!["a", "g", "z"]);
    assert_eq!(statuses(&responses), vec![200, 400, 200]);

    let results = responses[1]["body"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["message"], "The Full name field is required.");
    assert_eq!(results[0]["memberNames"], json!(["Name"]));
    assert_eq!(results[1]["memberNames"], json!(["Name"]));

    // Nothing from the failed change set was applied
    let people: Value = client.get("/api/People").await.unwrap().json().await.unwrap();
    assert_eq!(people["value"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_change_sets_answer_with_classified_status() {
    let client = start_server(true).await;

    let responses = client
        .batch(json!([
            {"id": "1", "atomicityGroup": "missing", "method": "DELETE", "url": "People(99)"},
            {"id": "2", "atomicityGroup": "stale", "method": "PATCH", "url": "Orders(1)",
             "body": {"Amount": 1.0}},
            {"id": "3", "atomicityGroup": "read", "method": "GET", "url": "People"}
        ]))
        .await;

    assert_eq!(ids(&responses), vec!["missing", "stale", "read"]);
    assert_eq!(statuses(&responses), vec![404, 428, 400]);
    assert_eq!(responses[0]["body"][0]["kind"], "ResourceNotFound");
}

#[tokio::test]
async fn test_every_change_set_scope_is_released_once() {
    let (client, store) = start_server_with_store(true).await;

    let responses = client
        .batch(json!([
            {"id": "1", "atomicityGroup": "fails", "method": "DELETE", "url": "People(99)"},
            {"id": "2", "method": "GET", "url": "People"},
            {"id": "3", "atomicityGroup": "commits", "method": "POST", "url": "People",
             "body": {"Name": "Grace Hopper"}},
            {"id": "4", "atomicityGroup": "invalid", "method": "POST", "url": "People",
             "body": {"Name": ""}}
        ]))
        .await;

    assert_eq!(ids(&responses), vec!["fails", "2", "3", "invalid"]);
    assert_eq!(statuses(&responses), vec![404, 200, 201, 400]);
    assert_eq!(store.scope_stats().acquired(), 3);
    assert_eq!(store.scope_stats().released(), 3);
}

#[tokio::test]
async fn test_optimistic_concurrency_on_orders() {
    let client = start_server(true).await;

    let response = client.get("/api/Orders(1)").await.unwrap();
    assert_eq!(response.status(), 200);
    let etag = response.headers()["etag"].to_str().unwrap().to_string();

    let response = client
        .patch_if_match("/api/Orders(1)", "W/\"999\"", json!({"Amount": 2.0}))
        .await
        .unwrap();
    assert_eq!(response.status(), 412);

    let response = client
        .patch_if_match("/api/Orders(1)", &etag, json!({"Amount": 2.0}))
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // The old tag no longer matches
    let response = client
        .patch_if_match("/api/Orders(1)", &etag, json!({"Amount": 3.0}))
        .await
        .unwrap();
    assert_eq!(response.status(), 412);
}

#[tokio::test]
async fn test_non_verbose_errors_are_bare_messages() {
    let client = start_server(false).await;

    let response = client.delete("/api/AuditLog(1)").await.unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(
        response.text().await.unwrap(),
        "Entity set 'AuditLog' is read-only"
    );

    let response = client.get("/api/Nowhere").await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(
        response.text().await.unwrap(),
        "Resource 'Nowhere' does not exist"
    );
}

#[tokio::test]
async fn test_lowercase_patch_is_not_routed() {
    let client = start_server(true).await;

    let responses = client
        .batch(json!([
            {"id": "1", "method": "patch", "url": "People(1)", "body": {"Age": 1}},
            {"id": "2", "method": "PATCH", "url": "People(1)", "body": {"Age": 37}},
            {"id": "3", "method": "get", "url": "People(1)"}
        ]))
        .await;

    assert_eq!(statuses(&responses), vec![404, 204, 200]);
    assert_eq!(responses[2]["body"]["Age"], 37);
}

#[tokio::test]
async fn test_metadata_endpoints() {
    let client = start_server(true).await;

    let response = client.get("/api").await.unwrap();
    assert_eq!(response.status(), 200);
    let document: Value = response.json().await.unwrap();
    let names: Vec<&str> = document["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"People"));
    assert!(names.contains(&"Me"));
    assert!(names.contains(&"ResetData"));

    let metadata: Value = client
        .get("/api/$metadata")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metadata["namespace"], "Demo");
}

#[tokio::test]
async fn test_operations() {
    let client = start_server(true).await;

    let spent: Value = client
        .get("/api/People(1)/Demo.TotalSpent()")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(spent["value"], 135.5);

    let response = client.delete("/api/People(1)").await.unwrap();
    assert_eq!(response.status(), 204);

    let response = client.post("/api/ResetData", json!({})).await.unwrap();
    assert_eq!(response.status(), 204);

    let response = client.get("/api/People(1)").await.unwrap();
    assert_eq!(response.status(), 200);
}
