use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Returned when a stored string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Event kinds that start rule matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    // Client record triggers
    ClientCreated,
    ClientUpdated,

    // Booking triggers
    BookingCreated,
    BookingCompleted,
    BookingCancelled,

    // CRM activity triggers
    NoteAdded,
    TaskCompleted,
    CommunicationSent,
    TagAdded,
    SegmentAssigned,

    // Scheduler and operator triggers
    ScheduleBased,
    Manual,
}

impl TriggerType {
    pub const ALL: [TriggerType; 12] = [
        Self::ClientCreated,
        Self::ClientUpdated,
        Self::BookingCreated,
        Self::BookingCompleted,
        Self::BookingCancelled,
        Self::NoteAdded,
        Self::TaskCompleted,
        Self::CommunicationSent,
        Self::TagAdded,
        Self::SegmentAssigned,
        Self::ScheduleBased,
        Self::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCreated => "client_created",
            Self::ClientUpdated => "client_updated",
            Self::BookingCreated => "booking_created",
            Self::BookingCompleted => "booking_completed",
            Self::BookingCancelled => "booking_cancelled",
            Self::NoteAdded => "note_added",
            Self::TaskCompleted => "task_completed",
            Self::CommunicationSent => "communication_sent",
            Self::TagAdded => "tag_added",
            Self::SegmentAssigned => "segment_assigned",
            Self::ScheduleBased => "schedule_based",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "trigger",
                value: s.to_string(),
            })
    }
}

/// Comparison applied by a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    IsEmpty,
    IsNotEmpty,
    In,
    NotIn,
    /// Anything not listed above; always evaluates to false.
    #[serde(other)]
    Unknown,
}

/// A predicate over a dot-path field of the trigger payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl WorkflowCondition {
    pub fn new(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }
}

/// Kinds of effect a rule can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    SendSms,
    CreateTask,
    AssignSegment,
    AddTag,
    RemoveTag,
    CreateNote,
    UpdateField,
    AssignUser,
    Webhook,
    Delay,
}

impl ActionType {
    pub const ALL: [ActionType; 11] = [
        Self::SendEmail,
        Self::SendSms,
        Self::CreateTask,
        Self::AssignSegment,
        Self::AddTag,
        Self::RemoveTag,
        Self::CreateNote,
        Self::UpdateField,
        Self::AssignUser,
        Self::Webhook,
        Self::Delay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::CreateTask => "create_task",
            Self::AssignSegment => "assign_segment",
            Self::AddTag => "add_tag",
            Self::RemoveTag => "remove_tag",
            Self::CreateNote => "create_note",
            Self::UpdateField => "update_field",
            Self::AssignUser => "assign_user",
            Self::Webhook => "webhook",
            Self::Delay => "delay",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "action type",
                value: s.to_string(),
            })
    }
}

/// Stored action definition. `action_type` stays a string so rows written
/// before a kind was retired still load and fail at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowActionConfig {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Seconds to wait before this action runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl WorkflowActionConfig {
    pub fn new(action_type: ActionType, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Self {
            action_type: action_type.as_str().to_string(),
            params,
            delay: None,
        }
    }

    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: TriggerType,
    pub trigger_config: Map<String, Value>,
    pub conditions: Vec<WorkflowCondition>,
    pub actions: Vec<WorkflowActionConfig>,
    pub enabled: bool,
    /// Higher runs first
    pub priority: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or replacing a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRuleInput {
    pub name: String,
    pub description: Option<String>,
    pub trigger: TriggerType,
    #[serde(default)]
    pub trigger_config: Map<String, Value>,
    #[serde(default)]
    pub conditions: Vec<WorkflowCondition>,
    pub actions: Vec<WorkflowActionConfig>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

impl WorkflowRule {
    /// Build a fresh rule from operator input, stamping id and timestamps.
    pub fn from_input(input: WorkflowRuleInput, created_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            trigger: input.trigger,
            trigger_config: input.trigger_config,
            conditions: input.conditions,
            actions: input.actions,
            enabled: input.enabled,
            priority: input.priority,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the editable fields, keeping identity and creation metadata.
    pub fn apply(&mut self, input: WorkflowRuleInput) {
        self.name = input.name;
        self.description = input.description;
        self.trigger = input.trigger;
        self.trigger_config = input.trigger_config;
        self.conditions = input.conditions;
        self.actions = input.actions;
        self.enabled = input.enabled;
        self.priority = input.priority;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Executions only move forward; terminal states are final.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Skipped | Self::Failed),
            Self::Running => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed | Self::Skipped => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(ParseEnumError {
                kind: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of one action within a rule execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowActionExecution {
    pub action_type: String,
    pub action_config: WorkflowActionConfig,
    pub status: ExecutionStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    /// Milliseconds, including any configured delay
    pub duration: Option<i64>,
}

impl WorkflowActionExecution {
    pub fn pending(config: &WorkflowActionConfig) -> Self {
        Self {
            action_type: config.action_type.clone(),
            action_config: config.clone(),
            status: ExecutionStatus::Pending,
            result: None,
            error: None,
            executed_at: Utc::now(),
            duration: None,
        }
    }
}

/// Persisted record of one rule's evaluation for one trigger firing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub trigger: TriggerType,
    pub trigger_data: Value,
    pub conditions_met: bool,
    pub actions_executed: Vec<WorkflowActionExecution>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds from `started_at` to `completed_at`
    pub duration: Option<i64>,
}

impl WorkflowExecution {
    fn for_rule(rule: &WorkflowRule, trigger_data: Value, status: ExecutionStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: rule.id,
            workflow_name: rule.name.clone(),
            trigger: rule.trigger,
            trigger_data,
            conditions_met: false,
            actions_executed: Vec::new(),
            status,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
        }
    }

    /// Record for a rule whose conditions did not hold.
    pub fn skipped(rule: &WorkflowRule, trigger_data: Value) -> Self {
        let mut execution = Self::for_rule(rule, trigger_data, ExecutionStatus::Skipped);
        execution.completed_at = Some(execution.started_at);
        execution.duration = Some(0);
        execution
    }

    /// Record for a matched rule about to run its actions.
    pub fn running(rule: &WorkflowRule, trigger_data: Value) -> Self {
        let mut execution = Self::for_rule(rule, trigger_data, ExecutionStatus::Running);
        execution.conditions_met = true;
        execution
    }

    pub fn complete(&mut self, actions: Vec<WorkflowActionExecution>) {
        self.actions_executed = actions;
        self.finish(ExecutionStatus::Completed);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finish(ExecutionStatus::Failed);
    }

    fn finish(&mut self, status: ExecutionStatus) {
        let completed_at = Utc::now();
        self.status = status;
        self.duration = Some((completed_at - self.started_at).num_milliseconds().max(0));
        self.completed_at = Some(completed_at);
    }
}

// ===== CRM records produced by action collaborators =====

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: String, // low, medium, high, urgent
    pub client_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub client_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Communication {
    pub id: Uuid,
    pub channel: String, // email, sms
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub template_id: Option<String>,
    pub client_id: Option<Uuid>,
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientNote {
    pub id: Uuid,
    pub client_id: Uuid,
    pub content: String,
    pub created_by_system: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_round_trips_through_str() {
        for trigger in TriggerType::ALL {
            assert_eq!(trigger.as_str().parse::<TriggerType>().unwrap(), trigger);
        }
        assert!("ticket_created".parse::<TriggerType>().is_err());
    }

    #[test]
    fn test_unknown_operator_deserializes() {
        let condition: WorkflowCondition = serde_json::from_value(serde_json::json!({
            "field": "status",
            "operator": "matches_regex",
            "value": "x"
        }))
        .unwrap();
        assert_eq!(condition.operator, ConditionOperator::Unknown);
    }

    #[test]
    fn test_action_config_wire_shape() {
        let config = WorkflowActionConfig::new(ActionType::AddTag, serde_json::json!({"tag": "vip"}))
            .with_delay(5);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["type"], "add_tag");
        assert_eq!(value["params"]["tag"], "vip");
        assert_eq!(value["delay"], 5);
    }

    #[test]
    fn test_status_transitions_only_move_forward() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Skipped.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn test_rule_input_defaults() {
        let input: WorkflowRuleInput = serde_json::from_value(serde_json::json!({
            "name": "Welcome",
            "trigger": "client_created",
            "actions": [{"type": "add_tag", "params": {"tag": "new"}}]
        }))
        .unwrap();
        assert!(input.enabled);
        assert_eq!(input.priority, 0);
        assert!(input.conditions.is_empty());
    }
}
