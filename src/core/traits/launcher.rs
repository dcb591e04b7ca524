use std::sync::Arc;

use crate::core::{
    domain::ProcessSpec,
    traits::{channel::ControlChannel, process::Process},
};

/// Builds the concrete processes and control channels a task is wired with.
#[mockall::automock]
pub trait Launcher: std::fmt::Debug + Send + Sync {
    fn process(&self, spec: ProcessSpec) -> Box<dyn Process>;

    fn channel(&self, username: &str, host: &str) -> Arc<dyn ControlChannel>;
}
