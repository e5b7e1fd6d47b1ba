use std::error::Error;
use tracing::error;

/// Sink for orchestration failures that are about to be returned to a caller.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &(dyn Error + Send + Sync + 'static));
}

/// Logs the error with its full source chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, context: &str, err: &(dyn Error + Send + Sync + 'static)) {
        let mut chain = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        error!(context = context, "{}", chain);
    }
}
