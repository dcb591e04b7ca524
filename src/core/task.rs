use std::{path::PathBuf, time::Duration};

use tracing::Instrument;

use crate::core::{
    domain::Status, errors::RunnerError, objects::RunnableObject, runners::ObjectRunner,
};

/// Per-task scheduling hints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskSchedule {
    pub post_start_delay: Option<Duration>,
    pub post_stop_delay: Option<Duration>,
    /// Carried through from the config but not used for ordering.
    pub stop_priority: Option<i64>,
}

/// One experiment step: an object, where it runs, and when.
#[derive(Debug)]
pub struct Task {
    key: String,
    runner: ObjectRunner,
    schedule: TaskSchedule,
}

impl Task {
    pub fn new(key: impl Into<String>, runner: ObjectRunner, schedule: TaskSchedule) -> Self {
        Self {
            key: key.into(),
            runner,
            schedule,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn object(&self) -> &RunnableObject {
        self.runner.object()
    }

    pub fn schedule(&self) -> &TaskSchedule {
        &self.schedule
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("task", key = %self.key)
    }

    pub async fn start(&mut self) -> Result<(), RunnerError> {
        let span = self.span();
        self.runner.start().instrument(span).await
    }

    pub async fn stop(&mut self) -> Result<(), RunnerError> {
        let span = self.span();
        self.runner.stop().instrument(span).await
    }

    pub async fn collect_results(&mut self) -> Result<Option<PathBuf>, RunnerError> {
        let span = self.span();
        self.runner.collect_results().instrument(span).await
    }

    pub fn status(&mut self) -> Status {
        self.runner.status()
    }
}
