use std::time::Duration;

use crate::core::{
    domain::{ProcessOutput, ProcessSpec, ProcessStatus},
    errors::ProcessError,
    objects::command_string,
    traits::process::Process,
};

/// Pretends to run a command: logs it and waits `delay`.
#[derive(Debug, Clone)]
pub struct ProcessStub {
    spec: ProcessSpec,
    delay: Duration,
    state: Option<ProcessStatus>,
}

impl ProcessStub {
    pub fn new(spec: ProcessSpec, delay: Duration) -> Self {
        Self {
            spec,
            delay,
            state: None,
        }
    }
}

#[async_trait::async_trait]
impl Process for ProcessStub {
    #[tracing::instrument]
    async fn start(&mut self) -> Result<(), ProcessError> {
        match self.state {
            Some(ProcessStatus::Idle { .. }) if self.spec.one_shot => {}
            Some(_) => return Err(ProcessError::AlreadyStarted { pid: None }),
            None => {}
        }
        tracing::debug!("Start process: args={:?}", self.spec.args);
        tokio::time::sleep(self.delay).await;

        self.state = Some(if self.spec.one_shot {
            ProcessStatus::Idle { exit_code: Some(0) }
        } else {
            ProcessStatus::Running
        });
        Ok(())
    }

    fn status(&mut self) -> Result<ProcessStatus, ProcessError> {
        self.state.ok_or(ProcessError::NeverStarted)
    }

    #[tracing::instrument]
    async fn stop(&mut self) -> Result<(), ProcessError> {
        match self.state {
            None => Err(ProcessError::NeverStarted),
            Some(ProcessStatus::Running) => {
                tokio::time::sleep(self.delay).await;
                tracing::debug!("Stopped: {}", self.command());
                self.state = Some(ProcessStatus::Idle { exit_code: Some(0) });
                Ok(())
            }
            Some(ProcessStatus::Idle { .. }) => Ok(()),
        }
    }

    async fn collect_output(&self) -> Result<ProcessOutput, ProcessError> {
        match self.state {
            None => Err(ProcessError::NeverStarted),
            Some(_) => Ok(ProcessOutput::default()),
        }
    }

    fn command(&self) -> String {
        command_string(&self.spec.args)
    }
}
