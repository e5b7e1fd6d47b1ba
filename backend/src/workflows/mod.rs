// Workflow Automation Engine
//
// Rule-based automation for the CRM: a trigger firing is matched against
// enabled rules, conditions gate each rule, and matched rules run their
// actions in order with every outcome recorded as an execution.

pub mod actions;
pub mod collaborators;
pub mod conditions;
pub mod crm;
pub mod engine;
pub mod executor;
pub mod handlers;
pub mod store;
pub mod triggers;
pub mod variables;

pub use actions::{ActionError, WorkflowAction};
pub use collaborators::{
    CommunicationService, CrmService, EmailMessage, ServiceError, ServiceResult, SmsMessage,
    TaskService,
};
pub use conditions::{evaluate_condition, evaluate_conditions};
pub use crm::{PgCrmService, PgTaskService};
pub use engine::{DispatchMode, EngineError, WorkflowEngine};
pub use executor::WorkflowExecutor;
pub use handlers::ActionHandlers;
pub use store::{
    CachedRuleStore, ExecutionStore, ExecutionUpdate, MemoryExecutionStore, MemoryRuleStore,
    PgExecutionStore, PgRuleStore, RuleStore, StoreError,
};
pub use triggers::{EventPayload, EventSource, TriggerEvent, TriggerType};
pub use variables::replace_variables;
