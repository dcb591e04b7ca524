use std::{sync::Arc, time::Duration};

use crate::{
    core::{
        domain::ProcessSpec,
        traits::{channel::ControlChannel, launcher::Launcher, process::Process},
    },
    stubs::{channel::ChannelStub, process::ProcessStub},
};

/// Launcher for dry runs: nothing is executed, every step takes `delay`.
#[derive(Debug, Clone)]
pub struct StubLauncher {
    delay: Duration,
}

impl StubLauncher {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Launcher for StubLauncher {
    fn process(&self, spec: ProcessSpec) -> Box<dyn Process> {
        Box::new(ProcessStub::new(spec, self.delay))
    }

    fn channel(&self, username: &str, host: &str) -> Arc<dyn ControlChannel> {
        Arc::new(ChannelStub::new(username, host, self.delay))
    }
}
