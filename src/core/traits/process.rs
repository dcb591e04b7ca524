use crate::core::{
    domain::{ProcessOutput, ProcessStatus},
    errors::ProcessError,
};

/// Lifecycle of exactly one OS process.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Process: std::fmt::Debug + Send + Sync {
    /// Spawns the process and waits out the start-up grace period.
    async fn start(&mut self) -> Result<(), ProcessError>;

    /// Non-blocking status check. Fails only if the process was never started.
    fn status(&mut self) -> Result<ProcessStatus, ProcessError>;

    /// Interrupts, then kills. A no-op for an already idle process.
    async fn stop(&mut self) -> Result<(), ProcessError>;

    async fn collect_output(&self) -> Result<ProcessOutput, ProcessError>;

    /// The command line, for logs.
    fn command(&self) -> String;
}
