/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum FormanError {
    /// Worker count must be at least one
    #[error("concurrency must be greater than zero, got {0}")]
    InvalidConcurrency(usize),

    /// Hand-off queue must hold at least one request
    #[error("queue capacity must be greater than zero")]
    InvalidQueueCapacity,

    /// The scheduler is shut down and no longer accepts requests
    #[error("scheduler is shut down")]
    Closed,

    /// In-flight invocations did not finish before the shutdown timeout
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}
