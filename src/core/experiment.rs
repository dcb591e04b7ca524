use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::fs;

use crate::core::{
    cancel::Cancellation,
    domain::{Status, StopOrder},
    errors::{ExperimentError, TaskFailure},
    task::Task,
};

/// What `collect_results` managed to gather.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionReport {
    pub collected: Vec<PathBuf>,
    pub failures: Vec<TaskFailure>,
}

/// Drives one experiment through start, stop, collection and cleanup.
///
/// Tasks start in declaration order. Stop and collection give every task an
/// attempt and aggregate failures instead of bailing out at the first one.
#[derive(Debug)]
pub struct SingleExperimentRunner {
    collection_path: PathBuf,
    stop_order: StopOrder,
    stop_after: Duration,
    tasks: Vec<Task>,
    cancellation: Cancellation,
    started: bool,
    stopped: bool,
}

impl SingleExperimentRunner {
    pub fn new(
        collection_path: PathBuf,
        stop_order: StopOrder,
        stop_after: Duration,
        tasks: Vec<Task>,
        cancellation: Cancellation,
    ) -> Self {
        Self {
            collection_path,
            stop_order,
            stop_after,
            tasks,
            cancellation,
            started: false,
            stopped: false,
        }
    }

    pub fn collection_path(&self) -> &Path {
        &self.collection_path
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    async fn create_collection_dir(&self) -> Result<(), ExperimentError> {
        let create_failed = |e: io::Error| ExperimentError::CreateDirectory {
            path: self.collection_path.clone(),
            msg: e.to_string(),
        };

        if let Some(parent) = self.collection_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(create_failed)?;
            }
        }

        fs::create_dir(&self.collection_path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => ExperimentError::DirectoryAlreadyExists {
                    path: self.collection_path.clone(),
                },
                _ => create_failed(e),
            })
    }

    fn warn_about_stop_priorities(&self) {
        for task in &self.tasks {
            if let Some(priority) = task.schedule().stop_priority {
                tracing::warn!(
                    task = task.key(),
                    "stop_order {priority} is ignored, tasks are stopped in {} order",
                    self.stop_order
                );
            }
        }
    }

    pub async fn start(&mut self) -> Result<(), ExperimentError> {
        if self.started {
            return Err(ExperimentError::AlreadyStarted);
        }

        self.create_collection_dir().await?;
        self.warn_about_stop_priorities();
        tracing::info!(
            "Starting experiment with {} task(s), results go into {}",
            self.tasks.len(),
            self.collection_path.display()
        );

        for index in 0..self.tasks.len() {
            if self.cancellation.is_cancelled() {
                return self.abort(ExperimentError::Cancelled).await;
            }

            let task = &mut self.tasks[index];
            let key = task.key().to_string();
            let delay = task.schedule().post_start_delay;

            if let Err(source) = task.start().await {
                tracing::error!(task = %key, "Failed to start: {source}");
                let error = if self.cancellation.is_cancelled() {
                    ExperimentError::Cancelled
                } else {
                    ExperimentError::TaskStartFailed { task: key, source }
                };
                return self.abort(error).await;
            }

            if let Some(delay) = delay {
                tracing::info!(task = %key, "Sleeping {delay:?} after start");
                if self.cancellation.sleep(delay).await.is_err() {
                    return self.abort(ExperimentError::Cancelled).await;
                }
            }
        }

        self.started = true;
        tracing::info!("All tasks started");
        Ok(())
    }

    /// Rolls back a partial start.
    async fn abort(&mut self, error: ExperimentError) -> Result<(), ExperimentError> {
        tracing::warn!("Experiment start aborted, stopping the tasks started so far: {error}");
        for failure in self.stop_running_tasks().await {
            tracing::error!("Rollback left {failure} running");
        }
        Err(error)
    }

    pub async fn stop(&mut self) -> Result<(), ExperimentError> {
        if !self.started {
            return Err(ExperimentError::NotStarted);
        }
        if self.stopped {
            tracing::debug!("Experiment has been stopped already, nothing to do");
            return Ok(());
        }

        tracing::info!("Stopping experiment, {} order", self.stop_order);
        let mut failures = Vec::new();
        for index in self.stop_order.indices(self.tasks.len()) {
            let task = &mut self.tasks[index];
            let delay = task.schedule().post_stop_delay;

            if let Err(error) = task.stop().await {
                tracing::error!(task = task.key(), "Failed to stop: {error}");
                failures.push(TaskFailure {
                    task: task.key().to_string(),
                    error,
                });
            }

            if let Some(delay) = delay {
                tracing::info!(task = task.key(), "Sleeping {delay:?} after stop");
                if self.cancellation.sleep(delay).await.is_err() {
                    tracing::debug!("Post-stop delay cut short by cancellation");
                }
            }
        }

        self.stopped = true;
        if failures.is_empty() {
            tracing::info!("All tasks stopped");
            Ok(())
        } else {
            Err(ExperimentError::TasksNotStopped { failures })
        }
    }

    /// Collects every task's artifact. Per-task failures end up in the report.
    pub async fn collect_results(&mut self) -> Result<CollectionReport, ExperimentError> {
        if !self.started {
            return Err(ExperimentError::NotStarted);
        }
        if !self.stopped {
            return Err(ExperimentError::NotStopped);
        }

        tracing::info!("Collecting results into {}", self.collection_path.display());
        let mut report = CollectionReport::default();
        for task in &mut self.tasks {
            match task.collect_results().await {
                Ok(Some(path)) => report.collected.push(path),
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(task = task.key(), "Failed to collect results: {error}");
                    report.failures.push(TaskFailure {
                        task: task.key().to_string(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "Collected {} artifact(s), {} task(s) failed",
            report.collected.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Stops whatever is still running, retrying each task once.
    ///
    /// Safe to call in any state.
    pub async fn clean_up(&mut self) -> Result<(), ExperimentError> {
        tracing::info!("Cleaning up");
        let failures = self.stop_running_tasks().await;
        if self.started {
            self.stopped = true;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExperimentError::TasksNotStopped { failures })
        }
    }

    async fn stop_running_tasks(&mut self) -> Vec<TaskFailure> {
        let mut failures = Vec::new();
        for index in self.stop_order.indices(self.tasks.len()) {
            let task = &mut self.tasks[index];
            if task.status() != Status::Running {
                continue;
            }

            if let Err(error) = task.stop().await {
                tracing::warn!(task = task.key(), "Failed to stop, retrying: {error}");
                if let Err(error) = task.stop().await {
                    tracing::error!(task = task.key(), "Failed to stop: {error}");
                    failures.push(TaskFailure {
                        task: task.key().to_string(),
                        error,
                    });
                }
            }
        }
        failures
    }

    /// Start, wait `stop_after`, stop, collect.
    ///
    /// Results are collected even if some tasks failed to stop; the stop
    /// error is returned afterwards. Cleanup is left to the caller.
    pub async fn run(&mut self) -> Result<CollectionReport, ExperimentError> {
        self.start().await?;

        tracing::info!("Experiment is running, stopping in {:?}", self.stop_after);
        if self.cancellation.sleep(self.stop_after).await.is_err() {
            tracing::warn!("Interrupted, stopping the experiment early");
        }

        let stopped = self.stop().await;
        let report = self.collect_results().await?;
        stopped.map(|()| report)
    }
}
