pub mod audit;
pub mod communications;
pub mod email;
pub mod error_reporter;
pub mod sms;

pub use audit::{AuditAction, AuditEntryBuilder, AuditLogger, AuditSink, PgAuditSink, TracingAuditSink};
pub use communications::DeliveryService;
pub use email::EmailService;
pub use error_reporter::{ErrorReporter, TracingErrorReporter};
pub use sms::SmsGateway;
