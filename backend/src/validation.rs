//! Save-time validation of workflow rules
//!
//! Every action is parsed into its typed form here so a rule with a bad
//! action never reaches the store.

use crm_automation_shared::{ConditionOperator, WorkflowRuleInput};

use crate::error::{AppError, ValidationBuilder};
use crate::workflows::WorkflowAction;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

pub type ValidationResult<T> = Result<T, AppError>;

/// Validate and normalize a create/update body.
pub fn validate_rule_input(mut input: WorkflowRuleInput) -> ValidationResult<WorkflowRuleInput> {
    let mut errors = ValidationBuilder::new();

    input.name = input.name.trim().to_string();
    if input.name.is_empty() {
        errors.push("name", "name is required");
    } else if input.name.chars().count() > MAX_NAME_LENGTH {
        errors.push(
            "name",
            &format!("name must be {} characters or less", MAX_NAME_LENGTH),
        );
    }

    if let Some(description) = &input.description {
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            errors.push(
                "description",
                &format!("description must be {} characters or less", MAX_DESCRIPTION_LENGTH),
            );
        }
    }

    for (index, condition) in input.conditions.iter().enumerate() {
        let field = format!("conditions[{}]", index);
        if condition.field.trim().is_empty() {
            errors.push(&field, "condition field is required");
        }
        if condition.operator == ConditionOperator::Unknown {
            errors.push(&field, "unsupported condition operator");
        }
        if matches!(condition.operator, ConditionOperator::In | ConditionOperator::NotIn)
            && !condition.value.is_array()
        {
            errors.push(&field, "in/not_in conditions need an array value");
        }
    }

    if input.actions.is_empty() {
        errors.push("actions", "at least one action is required");
    }
    for (index, action) in input.actions.iter().enumerate() {
        if let Err(e) = WorkflowAction::parse(action) {
            errors.push(&format!("actions[{}]", index), &e.to_string());
        }
    }

    match errors.build() {
        Some(err) => Err(err),
        None => Ok(input),
    }
}

/// Clamp an executions page size to `1..=max`, defaulting when absent.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_automation_shared::{ActionType, TriggerType, WorkflowActionConfig, WorkflowCondition};
    use serde_json::json;

    fn input() -> WorkflowRuleInput {
        WorkflowRuleInput {
            name: "  Welcome series ".to_string(),
            description: None,
            trigger: TriggerType::ClientCreated,
            trigger_config: Default::default(),
            conditions: vec![WorkflowCondition::new("email", ConditionOperator::IsNotEmpty, json!(null))],
            actions: vec![WorkflowActionConfig::new(
                ActionType::SendEmail,
                json!({"subject": "Welcome {{first_name}}", "body": "Glad you're here"}),
            )],
            enabled: true,
            priority: 0,
        }
    }

    fn details(err: AppError) -> std::collections::HashMap<String, Vec<String>> {
        match err {
            AppError::ValidationError { details } => details,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_input_is_trimmed() {
        let validated = validate_rule_input(input()).unwrap();
        assert_eq!(validated.name, "Welcome series");
    }

    #[test]
    fn test_rejects_missing_name_and_actions() {
        let mut bad = input();
        bad.name = "   ".to_string();
        bad.actions.clear();

        let details = details(validate_rule_input(bad).unwrap_err());
        assert!(details.contains_key("name"));
        assert!(details.contains_key("actions"));
    }

    #[test]
    fn test_rejects_unparseable_actions() {
        let mut bad = input();
        bad.actions.push(WorkflowActionConfig {
            action_type: "carrier_pigeon".to_string(),
            params: Default::default(),
            delay: None,
        });
        bad.actions.push(WorkflowActionConfig::new(ActionType::Webhook, json!({"method": "POST"})));

        let details = details(validate_rule_input(bad).unwrap_err());
        assert_eq!(details["actions[1]"], vec!["Unknown action type: carrier_pigeon"]);
        assert!(details.contains_key("actions[2]"));
        assert!(!details.contains_key("actions[0]"));
    }

    #[test]
    fn test_rejects_bad_conditions() {
        let mut bad = input();
        bad.conditions = vec![
            WorkflowCondition::new("", ConditionOperator::Equals, json!(1)),
            WorkflowCondition::new("tier", ConditionOperator::In, json!("vip")),
        ];

        let details = details(validate_rule_input(bad).unwrap_err());
        assert!(details.contains_key("conditions[0]"));
        assert!(details.contains_key("conditions[1]"));
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50, 500), 50);
        assert_eq!(clamp_limit(Some(10_000), 50, 500), 500);
        assert_eq!(clamp_limit(Some(0), 50, 500), 1);
    }
}
