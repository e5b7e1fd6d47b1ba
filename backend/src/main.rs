use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crm_automation_backend::{
    app,
    config::Config,
    database,
    jobs::WorkflowScheduler,
    services::{
        AuditLogger, DeliveryService, EmailService, PgAuditSink, SmsGateway, TracingErrorReporter,
    },
    workflows::{
        ActionHandlers, CachedRuleStore, PgCrmService, PgExecutionStore, PgRuleStore,
        PgTaskService, WorkflowEngine, WorkflowExecutor,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url, &config.pool).await?;
    database::migrate(&db_pool).await?;

    let email = if config.smtp.is_configured() {
        Some(EmailService::new(&config.smtp)?)
    } else {
        tracing::warn!("SMTP is not configured; send_email actions will fail");
        None
    };
    let sms = if config.sms.is_configured() {
        Some(SmsGateway::new(config.sms.clone())?)
    } else {
        tracing::warn!("SMS gateway is not configured; send_sms actions will fail");
        None
    };

    let handlers = ActionHandlers::new(
        Arc::new(DeliveryService::new(db_pool.clone(), email, sms)),
        Arc::new(PgTaskService::new(db_pool.clone())),
        Arc::new(PgCrmService::new(db_pool.clone())),
        ActionHandlers::webhook_client(config.workflow.webhook_timeout)?,
    );
    let executor = WorkflowExecutor::new(handlers).with_action_timeout(config.workflow.action_timeout);

    let rules = Arc::new(CachedRuleStore::new(Arc::new(PgRuleStore::new(db_pool.clone()))));
    let engine = WorkflowEngine::new(
        rules,
        Arc::new(PgExecutionStore::new(db_pool.clone())),
        executor,
        Arc::new(TracingErrorReporter),
    )
    .with_dispatch_mode(config.workflow.dispatch_mode);

    let mut scheduler = WorkflowScheduler::new(engine.clone(), config.workflow.schedules.clone()).await?;
    scheduler.start().await?;

    let state = Arc::new(AppState {
        engine,
        audit: AuditLogger::new(Arc::new(PgAuditSink::new(db_pool.clone()))),
        schedule_runs: scheduler.run_log(),
        db_pool: Some(db_pool),
    });

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!(
        "Workflow automation server running on {} ({:?} dispatch)",
        config.server_addr,
        config.workflow.dispatch_mode
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}
