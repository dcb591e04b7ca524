use std::{fmt, path::PathBuf};

use itertools::Itertools;

use crate::core::domain::ProcessOutput;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("process has been started already (pid {pid:?})")]
    AlreadyStarted { pid: Option<u32> },
    #[error("process has not been started yet")]
    NeverStarted,
    #[error("empty argument vector, nothing to start")]
    EmptyCommand,
    #[error("failed to spawn `{command}`: {msg}")]
    SpawnFailed { command: String, msg: String },
    #[error("`{command}` exited during start-up with code {exit_code:?}; {output}")]
    ExitedEarly {
        command: String,
        exit_code: Option<i32>,
        output: ProcessOutput,
    },
    #[error("start of `{command}` was cancelled")]
    Cancelled { command: String },
    #[error("process {pid} is still running after interrupt and kill")]
    NotStopped { pid: u32 },
    #[error("failed to query status of process {pid:?}: {msg}")]
    Status { pid: Option<u32>, msg: String },
}

impl ProcessError {
    /// True for every way a `start()` can fail to leave a live process behind.
    pub fn is_not_started(&self) -> bool {
        matches!(
            self,
            ProcessError::AlreadyStarted { .. }
                | ProcessError::EmptyCommand
                | ProcessError::SpawnFailed { .. }
                | ProcessError::ExitedEarly { .. }
                | ProcessError::Cancelled { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// Connection timed out or the host is unreachable.
    #[error("{destination} is unreachable: {msg}; check the address and that the machine is up")]
    Timeout { destination: String, msg: String },
    #[error("authentication to {destination} failed: {msg}; check that ssh-agent is running")]
    Authentication { destination: String, msg: String },
    #[error("control channel to {destination} failed: {msg}")]
    Channel { destination: String, msg: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunnerError {
    #[error("object has been started already")]
    AlreadyStarted,
    #[error("object has not been started yet")]
    NotYetStarted,
    #[error("object has not been stopped yet")]
    NotYetStopped,
    #[error("failed to start object: {0}")]
    FailedToStart(#[source] ProcessError),
    #[error("failed to stop object: {0}")]
    FailedToStop(#[source] ProcessError),
    #[error("failed to run teardown command: {0}")]
    TeardownFailed(#[source] ProcessError),
    #[error("failed to create directory {}: {msg}", .path.display())]
    CreateDirectory { path: PathBuf, msg: String },
    #[error("failed to create directory {} on the remote host: {cause}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        cause: ChannelError,
    },
    #[error("{} was not produced by the object; {output}", .path.display())]
    NoOutputProduced { path: PathBuf, output: ProcessOutput },
    #[error("{} already exists, probably copied by another task", .path.display())]
    DestinationExists { path: PathBuf },
    #[error("failed to collect {}: {msg}", .path.display())]
    CollectionFailed { path: PathBuf, msg: String },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// One task's failure inside an aggregated orchestrator operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub task: String,
    pub error: RunnerError,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}: {}", self.task, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExperimentError {
    #[error("experiment has been started already")]
    AlreadyStarted,
    #[error("experiment has not been started yet")]
    NotStarted,
    #[error("experiment is still running, stop it first")]
    NotStopped,
    #[error(
        "results directory {} already exists; pick a non-existing one, existing contents are never deleted",
        .path.display()
    )]
    DirectoryAlreadyExists { path: PathBuf },
    #[error("failed to create results directory {}: {msg}", .path.display())]
    CreateDirectory { path: PathBuf, msg: String },
    #[error("task-{task} failed to start: {source}")]
    TaskStartFailed {
        task: String,
        #[source]
        source: RunnerError,
    },
    #[error("{} task(s) could not be stopped: {}", .failures.len(), .failures.iter().join("; "))]
    TasksNotStopped { failures: Vec<TaskFailure> },
    #[error("experiment was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {msg}", .path.display())]
    Read { path: PathBuf, msg: String },
    #[error("invalid experiment config: {msg}")]
    Parse { msg: String },
    #[error("experiment config declares no tasks")]
    NoTasks,
    #[error(
        "task-{first} and task-{second} would both collect {file} into {subdir}; set a distinct \"prefix\" in their obj_config, e.g. the task key"
    )]
    DuplicateArtifact {
        file: String,
        subdir: String,
        first: String,
        second: String,
    },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse {
            msg: err.to_string(),
        }
    }
}
