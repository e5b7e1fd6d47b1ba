mod common;

use crm_automation_shared::{
    ActionType, ExecutionStatus, TriggerType, WorkflowActionConfig, WorkflowRuleInput,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::test_app;

fn rule(name: &str, actions: Vec<WorkflowActionConfig>) -> WorkflowRuleInput {
    WorkflowRuleInput {
        name: name.to_string(),
        description: None,
        trigger: TriggerType::BookingCreated,
        trigger_config: Default::default(),
        conditions: vec![],
        actions,
        enabled: true,
        priority: 0,
    }
}

fn booking() -> Value {
    json!({
        "client_id": "0b6a3c1e-5f3d-4e0a-9d7c-2f1b8e6a4c90",
        "booking_id": "bk_2291",
        "first_name": "Priya",
        "service": "Consultation"
    })
}

#[tokio::test]
async fn test_webhook_renders_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/bookings"))
        .and(header("content-type", "application/json"))
        .and(header("x-booking", "bk_2291"))
        .and(body_json(json!({ "text": "Priya booked Consultation" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let test = test_app();
    test.state
        .engine
        .rules()
        .create(
            rule(
                "Notify booking channel",
                vec![WorkflowActionConfig::new(
                    ActionType::Webhook,
                    json!({
                        "url": format!("{}/hooks/bookings", server.uri()),
                        "headers": { "x-booking": "{{booking_id}}" },
                        "body": { "text": "{{first_name}} booked {{service}}" }
                    }),
                )],
            ),
            None,
        )
        .await
        .unwrap();

    let executions = test
        .state
        .engine
        .process_workflow_trigger(TriggerType::BookingCreated, booking())
        .await
        .unwrap();

    let action = &executions[0].actions_executed[0];
    assert_eq!(action.status, ExecutionStatus::Completed);
    let result = action.result.as_ref().unwrap();
    assert_eq!(result["status_code"], 200);
    assert_eq!(result["response"]["ok"], true);
}

#[tokio::test]
async fn test_webhook_body_defaults_to_payload() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/sync"))
        .and(body_json(booking()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let test = test_app();
    test.state
        .engine
        .rules()
        .create(
            rule(
                "Mirror bookings",
                vec![WorkflowActionConfig::new(
                    ActionType::Webhook,
                    json!({ "url": format!("{}/sync", server.uri()), "method": "put" }),
                )],
            ),
            None,
        )
        .await
        .unwrap();

    let executions = test
        .state
        .engine
        .process_workflow_trigger(TriggerType::BookingCreated, booking())
        .await
        .unwrap();

    assert_eq!(
        executions[0].actions_executed[0].status,
        ExecutionStatus::Completed
    );
}

#[tokio::test]
async fn test_webhook_error_status_fails_only_that_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let test = test_app();
    test.state
        .engine
        .rules()
        .create(
            rule(
                "Webhook then tag",
                vec![
                    WorkflowActionConfig::new(
                        ActionType::Webhook,
                        json!({ "url": format!("{}/hook", server.uri()) }),
                    ),
                    WorkflowActionConfig::new(ActionType::AddTag, json!({ "tag": "booked" })),
                ],
            ),
            None,
        )
        .await
        .unwrap();

    let executions = test
        .state
        .engine
        .process_workflow_trigger(TriggerType::BookingCreated, booking())
        .await
        .unwrap();

    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.actions_executed[0].status, ExecutionStatus::Failed);
    assert_eq!(
        execution.actions_executed[0].error.as_deref(),
        Some("Webhook returned HTTP 500: upstream down")
    );
    assert_eq!(execution.actions_executed[1].status, ExecutionStatus::Completed);

    let crm = test.collaborators.crm_calls.lock().unwrap();
    assert_eq!(crm.len(), 1);
    assert_eq!(crm[0].2, json!("booked"));
}
