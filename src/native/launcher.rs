use std::sync::Arc;

use crate::{
    core::{
        cancel::Cancellation,
        domain::ProcessSpec,
        traits::{channel::ControlChannel, launcher::Launcher, process::Process},
    },
    native::{
        process::{OsProcess, ProcessTimings},
        ssh::SshChannel,
    },
};

/// Real child processes and ssh.
#[derive(Clone, Debug, Default)]
pub struct NativeLauncher {
    cancellation: Cancellation,
    timings: ProcessTimings,
}

impl NativeLauncher {
    pub fn new(cancellation: Cancellation) -> Self {
        Self {
            cancellation,
            timings: ProcessTimings::default(),
        }
    }

    pub fn with_timings(self, timings: ProcessTimings) -> Self {
        Self { timings, ..self }
    }
}

impl Launcher for NativeLauncher {
    fn process(&self, spec: ProcessSpec) -> Box<dyn Process> {
        Box::new(OsProcess::new(spec, self.timings, self.cancellation.clone()))
    }

    fn channel(&self, username: &str, host: &str) -> Arc<dyn ControlChannel> {
        Arc::new(SshChannel::new(username, host))
    }
}
