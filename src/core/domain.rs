use std::fmt;

/// Coarse status of an object runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running,
}

/// Status of a started OS process, derived on demand from its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process has terminated; `exit_code` is `None` when it was killed
    /// by a signal.
    Idle { exit_code: Option<i32> },
    Running,
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }
}

impl From<ProcessStatus> for Status {
    fn from(status: ProcessStatus) -> Self {
        match status {
            ProcessStatus::Running => Status::Running,
            ProcessStatus::Idle { .. } => Status::Idle,
        }
    }
}

/// Lines captured from a process' stdout and stderr.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ProcessOutput {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

impl fmt::Display for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stdout: {:?}, stderr: {:?}", self.stdout, self.stderr)
    }
}

/// Everything a [`Launcher`](crate::core::traits::launcher::Launcher) needs to
/// build a process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    pub args: Vec<String>,
    /// Started through the control channel; affects the start-up grace period.
    pub via_control_channel: bool,
    /// Expected to finish on its own. Exiting with code 0 during start-up is a
    /// success instead of a failure. A finished one-shot process can be
    /// started again.
    pub one_shot: bool,
    /// Start-up may be cut short by a cancellation. Teardowns are not, they
    /// must run to completion even after Ctrl-C.
    pub cancellable: bool,
}

impl ProcessSpec {
    pub fn local(args: Vec<String>) -> Self {
        Self {
            args,
            via_control_channel: false,
            one_shot: false,
            cancellable: true,
        }
    }

    pub fn remote(args: Vec<String>) -> Self {
        Self {
            args,
            via_control_channel: true,
            one_shot: false,
            cancellable: true,
        }
    }

    pub fn one_shot(self) -> Self {
        Self {
            one_shot: true,
            ..self
        }
    }

    /// One-shot command undoing an object's effect.
    pub fn teardown(self) -> Self {
        Self {
            one_shot: true,
            cancellable: false,
            ..self
        }
    }
}

/// Order in which the orchestrator stops its tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOrder {
    Declared,
    Reversed,
}

impl StopOrder {
    pub fn from_ignore_stop_order(ignore_stop_order: bool) -> Self {
        if ignore_stop_order {
            StopOrder::Declared
        } else {
            StopOrder::Reversed
        }
    }

    /// Task indices in stopping order.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        match self {
            StopOrder::Declared => (0..len).collect(),
            StopOrder::Reversed => (0..len).rev().collect(),
        }
    }
}

impl fmt::Display for StopOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOrder::Declared => write!(f, "declared"),
            StopOrder::Reversed => write!(f, "reversed"),
        }
    }
}
