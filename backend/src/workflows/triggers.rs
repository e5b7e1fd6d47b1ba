// Workflow Triggers - Domain events that start rule matching

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

pub use crm_automation_shared::TriggerType;

/// Payload for trigger events
pub type EventPayload = Value;

/// A domain event raised by the booking, communication, or CRM collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub payload: EventPayload,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
}

/// Source of the trigger event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    System,
    User(Uuid),
    Api,
    Scheduler,
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, payload: EventPayload, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            payload,
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn client_created(
        client_id: Uuid,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        source: EventSource,
    ) -> Self {
        Self::new(
            TriggerType::ClientCreated,
            json!({
                "client_id": client_id,
                "first_name": first_name,
                "last_name": last_name,
                "email": email,
                "phone": phone
            }),
            source,
        )
    }

    /// `changes` holds the updated fields; `client_id` in it is ignored.
    pub fn client_updated(client_id: Uuid, changes: Value, source: EventSource) -> Self {
        let mut payload = json!({ "client_id": client_id });
        if let (Some(target), Value::Object(fields)) = (payload.as_object_mut(), changes) {
            for (key, value) in fields {
                target.entry(key).or_insert(value);
            }
        }
        Self::new(TriggerType::ClientUpdated, payload, source)
    }

    pub fn booking_completed(
        booking_id: Uuid,
        client_id: Uuid,
        service_name: &str,
        amount: f64,
    ) -> Self {
        Self::new(
            TriggerType::BookingCompleted,
            json!({
                "booking_id": booking_id,
                "client_id": client_id,
                "service_name": service_name,
                "amount": amount,
                "status": "completed"
            }),
            EventSource::System,
        )
    }

    pub fn note_added(client_id: Uuid, note_id: Uuid, content: &str, author: Uuid) -> Self {
        Self::new(
            TriggerType::NoteAdded,
            json!({
                "client_id": client_id,
                "note_id": note_id,
                "content": content,
                "author_id": author
            }),
            EventSource::User(author),
        )
    }

    /// Fired by the cron scheduler for a named schedule
    pub fn scheduled(schedule_name: &str) -> Self {
        let fired_at = Utc::now();
        Self {
            payload: json!({
                "schedule": schedule_name,
                "fired_at": fired_at.to_rfc3339()
            }),
            timestamp: fired_at,
            ..Self::new(TriggerType::ScheduleBased, Value::Null, EventSource::Scheduler)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_created_event() {
        let client_id = Uuid::new_v4();
        let event = TriggerEvent::client_created(
            client_id,
            "Jane",
            "Doe",
            Some("jane@example.com"),
            None,
            EventSource::Api,
        );

        assert_eq!(event.trigger_type, TriggerType::ClientCreated);
        assert_eq!(event.payload["first_name"], "Jane");
        assert_eq!(event.payload["client_id"], client_id.to_string());
        assert!(event.payload["phone"].is_null());
    }

    #[test]
    fn test_client_updated_keeps_subject_id() {
        let client_id = Uuid::new_v4();
        let event = TriggerEvent::client_updated(
            client_id,
            json!({ "client_id": "spoofed", "tier": "gold" }),
            EventSource::System,
        );

        assert_eq!(event.trigger_type, TriggerType::ClientUpdated);
        assert_eq!(event.payload["client_id"], client_id.to_string());
        assert_eq!(event.payload["tier"], "gold");
    }

    #[test]
    fn test_scheduled_event() {
        let event = TriggerEvent::scheduled("daily-digest");
        assert_eq!(event.trigger_type, TriggerType::ScheduleBased);
        assert_eq!(event.payload["schedule"], "daily-digest");
        assert!(event.payload["fired_at"].is_string());
    }
}
