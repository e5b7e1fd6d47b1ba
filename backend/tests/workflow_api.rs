mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use crm_automation_backend::app;
use crm_automation_backend::jobs::scheduler::fire_schedule;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{test_app, TestApp};

async fn send(test: &TestApp, method: &str, uri: &str, body: Option<Value>) -> Response {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", "6f1c2a40-2b9e-4d4a-9a49-0e4a9d1f7c11");
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    app(test.state.clone())
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn welcome_rule(priority: i32) -> Value {
    json!({
        "name": "Welcome new client",
        "trigger": "client_created",
        "conditions": [
            { "field": "email", "operator": "is_not_empty" }
        ],
        "actions": [
            {
                "type": "send_email",
                "params": {
                    "subject": "Welcome, {{first_name}}!",
                    "body": "Hi {{first_name}}, thanks for choosing us."
                }
            },
            { "type": "add_tag", "params": { "tag": "onboarding" } }
        ],
        "priority": priority
    })
}

#[tokio::test]
async fn test_health_without_database() {
    let test = test_app();
    let response = send(&test, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["database"], "detached");
}

#[tokio::test]
async fn test_rule_crud_round_trip() {
    let test = test_app();

    let response = send(&test, "POST", "/api/v1/workflows", Some(welcome_rule(5))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["enabled"], true);
    assert_eq!(created["created_by"], "6f1c2a40-2b9e-4d4a-9a49-0e4a9d1f7c11");

    let fetched = json_body(send(&test, "GET", &format!("/api/v1/workflows/{}", id), None).await).await;
    assert_eq!(fetched["name"], "Welcome new client");

    let mut replacement = welcome_rule(9);
    replacement["name"] = json!("Welcome v2");
    let response = send(&test, "PUT", &format!("/api/v1/workflows/{}", id), Some(replacement)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response).await;
    assert_eq!(updated["name"], "Welcome v2");
    assert_eq!(updated["priority"], 9);
    assert_eq!(updated["created_at"], created["created_at"]);

    let response = send(
        &test,
        "PATCH",
        &format!("/api/v1/workflows/{}/enabled", id),
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(json_body(response).await["enabled"], false);

    let enabled_only = json_body(send(&test, "GET", "/api/v1/workflows?enabled_only=true", None).await).await;
    assert_eq!(enabled_only.as_array().unwrap().len(), 0);
    let all = json_body(send(&test, "GET", "/api/v1/workflows", None).await).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let response = send(&test, "DELETE", &format!("/api/v1/workflows/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&test, "GET", &format!("/api/v1/workflows/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_rejects_invalid_rule() {
    let test = test_app();
    let response = send(
        &test,
        "POST",
        "/api/v1/workflows",
        Some(json!({
            "name": "",
            "trigger": "booking_completed",
            "actions": [ { "type": "fax_client", "params": {} } ]
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["actions[0]"][0], "Unknown action type: fax_client");
    assert!(body["details"]["name"].is_array());
}

#[tokio::test]
async fn test_bad_actor_header_is_rejected() {
    let test = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/workflows")
        .header("x-actor-id", "not-a-uuid")
        .header("content-type", "application/json")
        .body(Body::from(welcome_rule(0).to_string()))
        .unwrap();

    let response = app(test.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trigger_runs_rules_and_records_history() {
    let test = test_app();
    send(&test, "POST", "/api/v1/workflows", Some(welcome_rule(1))).await;

    let response = send(
        &test,
        "POST",
        "/api/v1/workflows/trigger",
        Some(json!({
            "trigger": "client_created",
            "payload": {
                "client_id": "0b6a3c1e-5f3d-4e0a-9d7c-2f1b8e6a4c90",
                "email": "jane@example.com",
                "first_name": "Jane"
            }
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let executions = json_body(response).await;
    assert_eq!(executions[0]["status"], "completed");
    assert_eq!(executions[0]["conditions_met"], true);
    assert_eq!(executions[0]["actions_executed"].as_array().unwrap().len(), 2);

    {
        let emails = test.collaborators.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].to, "jane@example.com");
        assert_eq!(emails[0].subject, "Welcome, Jane!");
    }
    {
        let crm = test.collaborators.crm_calls.lock().unwrap();
        assert_eq!(crm[0].0, "add_tag");
        assert_eq!(crm[0].1, "0b6a3c1e-5f3d-4e0a-9d7c-2f1b8e6a4c90");
    }

    // Without an email the rule is skipped
    send(
        &test,
        "POST",
        "/api/v1/workflows/trigger",
        Some(json!({ "trigger": "client_created", "payload": { "first_name": "Anon" } })),
    )
    .await;

    let history = json_body(send(&test, "GET", "/api/v1/workflows/executions?limit=1", None).await).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "skipped");
    assert_eq!(history[0]["actions_executed"], json!([]));

    assert_eq!(test.executions.all().await.len(), 2);
}

#[tokio::test]
async fn test_action_failure_is_recorded_not_fatal() {
    let test = test_app();
    send(
        &test,
        "POST",
        "/api/v1/workflows",
        Some(json!({
            "name": "Tag after booking",
            "trigger": "booking_completed",
            "actions": [
                { "type": "add_tag", "params": { "tag": "visited" } },
                { "type": "create_task", "params": { "title": "Call {{first_name}}", "due_in_days": 2 } }
            ]
        })),
    )
    .await;

    let executions = json_body(
        send(
            &test,
            "POST",
            "/api/v1/workflows/trigger",
            Some(json!({
                "trigger": "booking_completed",
                "payload": { "client_id": "missing", "first_name": "Sam" }
            })),
        )
        .await,
    )
    .await;

    let actions = executions[0]["actions_executed"].as_array().unwrap();
    assert_eq!(executions[0]["status"], "completed");
    assert_eq!(actions[0]["status"], "failed");
    assert_eq!(actions[0]["error"], "Client missing not found");
    assert_eq!(actions[1]["status"], "completed");
    assert_eq!(actions[1]["result"]["title"], "Call Sam");
    assert!(actions[1]["result"]["due_date"].is_string());
}

#[tokio::test]
async fn test_execution_filter_by_workflow() {
    let test = test_app();
    let first = json_body(send(&test, "POST", "/api/v1/workflows", Some(welcome_rule(2))).await).await;
    send(&test, "POST", "/api/v1/workflows", Some(welcome_rule(1))).await;

    send(
        &test,
        "POST",
        "/api/v1/workflows/trigger",
        Some(json!({ "trigger": "client_created", "payload": {} })),
    )
    .await;

    let uri = format!("/api/v1/workflows/executions?workflow_id={}", first["id"].as_str().unwrap());
    let history = json_body(send(&test, "GET", &uri, None).await).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["workflow_id"], first["id"]);
}

#[tokio::test]
async fn test_schedule_runs_are_listed_newest_first() {
    let test = test_app();
    fire_schedule(&test.state.engine, "nightly-cleanup", &test.state.schedule_runs).await;
    fire_schedule(&test.state.engine, "weekly-digest", &test.state.schedule_runs).await;

    let runs = json_body(send(&test, "GET", "/api/v1/workflows/schedules/runs?limit=1", None).await).await;
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["schedule"], "weekly-digest");
    assert_eq!(runs[0]["status"], "completed");
    assert_eq!(runs[0]["rules_evaluated"], 0);
}
