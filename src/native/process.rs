use std::{process::Stdio, sync::Arc, time::Duration};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::Mutex,
    task::JoinHandle,
};

use crate::{
    constants::{
        CONTROL_CHANNEL_START_GRACE, INTERRUPT_POLLS, LOCAL_START_GRACE, OUTPUT_DRAIN_TIMEOUT,
        STOP_POLL_INTERVAL,
    },
    core::{
        cancel::{Cancellation, Cancelled},
        domain::{ProcessOutput, ProcessSpec, ProcessStatus},
        errors::ProcessError,
        objects::command_string,
        traits::process::Process,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessTimings {
    pub start_grace: Duration,
    pub control_channel_start_grace: Duration,
    pub interrupt_polls: u32,
    pub poll_interval: Duration,
}

impl Default for ProcessTimings {
    fn default() -> Self {
        Self {
            start_grace: LOCAL_START_GRACE,
            control_channel_start_grace: CONTROL_CHANNEL_START_GRACE,
            interrupt_polls: INTERRUPT_POLLS,
            poll_interval: STOP_POLL_INTERVAL,
        }
    }
}

type LineBuffer = Arc<Mutex<Vec<String>>>;

/// A child process of this program.
///
/// stdin is kept open for the lifetime of the child, stdout and stderr are
/// drained line by line in the background.
#[derive(Debug)]
pub struct OsProcess {
    spec: ProcessSpec,
    timings: ProcessTimings,
    cancellation: Cancellation,
    child: Option<Child>,
    pid: Option<u32>,
    stdout: LineBuffer,
    stderr: LineBuffer,
    readers: Vec<JoinHandle<()>>,
}

impl OsProcess {
    pub fn new(spec: ProcessSpec, timings: ProcessTimings, cancellation: Cancellation) -> Self {
        Self {
            spec,
            timings,
            cancellation,
            child: None,
            pid: None,
            stdout: LineBuffer::default(),
            stderr: LineBuffer::default(),
            readers: Vec::new(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn start_grace(&self) -> Duration {
        if self.spec.via_control_channel {
            self.timings.control_channel_start_grace
        } else {
            self.timings.start_grace
        }
    }

    fn spawn(&mut self) -> Result<(), ProcessError> {
        let (program, args) = self
            .spec
            .args
            .split_first()
            .ok_or(ProcessError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                command: self.command(),
                msg: e.to_string(),
            })?;

        if let Some(stdout) = child.stdout.take() {
            self.readers.push(spawn_line_reader(stdout, self.stdout.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(spawn_line_reader(stderr, self.stderr.clone()));
        }

        self.pid = child.id();
        self.child = Some(child);
        Ok(())
    }

    /// Waits for the output readers of an exited process to reach EOF.
    async fn drain_output(&mut self) -> ProcessOutput {
        for reader in self.readers.drain(..) {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
                tracing::debug!("Output reader did not finish in {OUTPUT_DRAIN_TIMEOUT:?}");
            }
        }
        self.snapshot().await
    }

    async fn snapshot(&self) -> ProcessOutput {
        ProcessOutput {
            stdout: self.stdout.lock().await.clone(),
            stderr: self.stderr.lock().await.clone(),
        }
    }

    async fn exited_early(&mut self, exit_code: Option<i32>) -> ProcessError {
        let output = self.drain_output().await;
        tracing::error!(
            "{} exited during start-up with code {exit_code:?}; {output}",
            self.command()
        );
        ProcessError::ExitedEarly {
            command: self.command(),
            exit_code,
            output,
        }
    }

    async fn kill_after_cancel(&mut self) -> ProcessError {
        tracing::warn!("Start of {} cancelled, killing it", self.command());
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill().await {
                tracing::debug!("Failed to kill cancelled process: {e}");
            }
        }
        ProcessError::Cancelled {
            command: self.command(),
        }
    }

    fn interrupt(&self) {
        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        match signal::kill(Pid::from_raw(pid), Signal::SIGINT) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!("Failed to interrupt process {pid}: {e}"),
        }
    }

    fn is_running(&mut self) -> Result<bool, ProcessError> {
        Ok(self.status()?.is_running())
    }

    /// Forgets a finished child so the same command can be spawned again.
    fn reset(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        self.child = None;
        self.pid = None;
        self.stdout = LineBuffer::default();
        self.stderr = LineBuffer::default();
    }
}

enum StartWait {
    Exited(std::io::Result<std::process::ExitStatus>),
    GraceOver,
    Cancelled,
}

/// The start-up grace period, which only cancellable processes cut short.
async fn grace_period(
    cancellation: &Cancellation,
    cancellable: bool,
    grace: Duration,
) -> Result<(), Cancelled> {
    if cancellable {
        cancellation.sleep(grace).await
    } else {
        tokio::time::sleep(grace).await;
        Ok(())
    }
}

fn spawn_line_reader<R>(reader: R, sink: LineBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    sink.lock().await.push(line.to_string());
                }
                Err(e) => {
                    tracing::debug!("Stopped reading process output: {e}");
                    break;
                }
            }
        }
    })
}

#[async_trait::async_trait]
impl Process for OsProcess {
    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.child.is_some() {
            if !self.spec.one_shot || self.is_running()? {
                return Err(ProcessError::AlreadyStarted { pid: self.pid });
            }
            tracing::debug!("Running {} again", self.command());
            self.reset();
        }

        tracing::debug!("Spawning: {}", self.command());
        self.spawn()?;

        let grace = self.start_grace();
        if self.spec.one_shot {
            let Some(child) = self.child.as_mut() else {
                return Err(ProcessError::NeverStarted);
            };
            let waited = tokio::select! {
                status = child.wait() => StartWait::Exited(status),
                waited = grace_period(&self.cancellation, self.spec.cancellable, grace) => match waited {
                    Ok(()) => StartWait::GraceOver,
                    Err(Cancelled) => StartWait::Cancelled,
                },
            };

            return match waited {
                StartWait::Exited(Ok(status)) if status.success() => {
                    self.drain_output().await;
                    tracing::debug!("{} finished", self.command());
                    Ok(())
                }
                StartWait::Exited(Ok(status)) => Err(self.exited_early(status.code()).await),
                StartWait::Exited(Err(e)) => Err(ProcessError::Status {
                    pid: self.pid,
                    msg: e.to_string(),
                }),
                StartWait::Cancelled => Err(self.kill_after_cancel().await),
                StartWait::GraceOver => {
                    tracing::warn!(
                        "{} is still running after {grace:?}, leaving it to stop()",
                        self.command()
                    );
                    Ok(())
                }
            };
        }

        if grace_period(&self.cancellation, self.spec.cancellable, grace)
            .await
            .is_err()
        {
            return Err(self.kill_after_cancel().await);
        }

        match self.status()? {
            ProcessStatus::Running => {
                tracing::debug!("Process {:?} is up: {}", self.pid, self.command());
                Ok(())
            }
            ProcessStatus::Idle { exit_code } => Err(self.exited_early(exit_code).await),
        }
    }

    fn status(&mut self) -> Result<ProcessStatus, ProcessError> {
        let child = self.child.as_mut().ok_or(ProcessError::NeverStarted)?;
        match child.try_wait() {
            Ok(Some(status)) => Ok(ProcessStatus::Idle {
                exit_code: status.code(),
            }),
            Ok(None) => Ok(ProcessStatus::Running),
            Err(e) => Err(ProcessError::Status {
                pid: self.pid,
                msg: e.to_string(),
            }),
        }
    }

    async fn stop(&mut self) -> Result<(), ProcessError> {
        if !self.is_running()? {
            tracing::debug!("Process {:?} is idle already", self.pid);
            self.drain_output().await;
            return Ok(());
        }

        tracing::debug!("Interrupting process {:?}", self.pid);
        self.interrupt();
        for _ in 0..self.timings.interrupt_polls {
            tokio::time::sleep(self.timings.poll_interval).await;
            if !self.is_running()? {
                self.drain_output().await;
                return Ok(());
            }
        }

        tracing::warn!(
            "Process {:?} ignored the interrupt, killing it",
            self.pid
        );
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to kill process {:?}: {e}", self.pid);
            }
        }
        tokio::time::sleep(self.timings.poll_interval).await;
        if self.is_running()? {
            return Err(ProcessError::NotStopped {
                pid: self.pid.unwrap_or_default(),
            });
        }

        self.drain_output().await;
        Ok(())
    }

    async fn collect_output(&self) -> Result<ProcessOutput, ProcessError> {
        if self.child.is_none() {
            return Err(ProcessError::NeverStarted);
        }
        Ok(self.snapshot().await)
    }

    fn command(&self) -> String {
        command_string(&self.spec.args)
    }
}
