use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{fs, io::AsyncWriteExt};

use crate::{
    constants::{LOCAL_COLLECTION_DIR, SSH_BINARY, SSH_CONNECTION_TIMEOUT_SECS, SSH_FORCE_TTY},
    core::{
        domain::Status,
        errors::RunnerError,
        objects::RunnableObject,
        traits::{channel::ControlChannel, process::Process},
    },
};

/// Where an object runs.
#[derive(Debug)]
pub enum ObjectRunner {
    Local(LocalRunner),
    Remote(RemoteRunner),
}

impl ObjectRunner {
    pub fn object(&self) -> &RunnableObject {
        match self {
            ObjectRunner::Local(runner) => &runner.object,
            ObjectRunner::Remote(runner) => &runner.object,
        }
    }

    pub async fn start(&mut self) -> Result<(), RunnerError> {
        match self {
            ObjectRunner::Local(runner) => runner.start().await,
            ObjectRunner::Remote(runner) => runner.start().await,
        }
    }

    pub async fn stop(&mut self) -> Result<(), RunnerError> {
        match self {
            ObjectRunner::Local(runner) => runner.lifecycle.stop().await,
            ObjectRunner::Remote(runner) => runner.lifecycle.stop().await,
        }
    }

    pub fn status(&mut self) -> Status {
        match self {
            ObjectRunner::Local(runner) => runner.lifecycle.status(),
            ObjectRunner::Remote(runner) => runner.lifecycle.status(),
        }
    }

    pub fn is_started(&self) -> bool {
        match self {
            ObjectRunner::Local(runner) => runner.lifecycle.started,
            ObjectRunner::Remote(runner) => runner.lifecycle.started,
        }
    }

    pub fn is_stopped(&self) -> bool {
        match self {
            ObjectRunner::Local(runner) => runner.lifecycle.stopped,
            ObjectRunner::Remote(runner) => runner.lifecycle.stopped,
        }
    }

    /// Copies the object's output file into the collection directory.
    ///
    /// Returns the destination path, or `None` if the object produces no file.
    pub async fn collect_results(&mut self) -> Result<Option<PathBuf>, RunnerError> {
        match self {
            ObjectRunner::Local(runner) => runner.collect_results().await,
            ObjectRunner::Remote(runner) => runner.collect_results().await,
        }
    }
}

/// `ssh -tt ... user@host '<command>'` for starting an object remotely.
pub fn remote_process_args(destination: &str, command: &str) -> Vec<String> {
    vec![
        SSH_BINARY.to_string(),
        SSH_FORCE_TTY.to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={SSH_CONNECTION_TIMEOUT_SECS}"),
        destination.to_string(),
        command.to_string(),
    ]
}

/// Process handles and monotonic flags shared by both runner kinds.
#[derive(Debug)]
struct Lifecycle {
    process: Box<dyn Process>,
    teardown: Option<Box<dyn Process>>,
    teardown_done: bool,
    started: bool,
    stopped: bool,
}

impl Lifecycle {
    fn new(process: Box<dyn Process>, teardown: Option<Box<dyn Process>>) -> Self {
        Self {
            process,
            teardown,
            teardown_done: false,
            started: false,
            stopped: false,
        }
    }

    fn ensure_not_started(&self) -> Result<(), RunnerError> {
        if self.started {
            return Err(RunnerError::AlreadyStarted);
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<(), RunnerError> {
        if let Err(error) = self.process.start().await {
            if !error.is_not_started() {
                tracing::warn!("{} may have been left running", self.process.command());
            }
            return Err(RunnerError::FailedToStart(error));
        }
        self.started = true;
        tracing::info!("Started: {}", self.process.command());
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RunnerError> {
        if !self.started {
            return Err(RunnerError::NotYetStarted);
        }
        if self.stopped {
            tracing::debug!("Object has been stopped already, nothing to do");
            return Ok(());
        }

        tracing::info!("Stopping: {}", self.process.command());
        self.process
            .stop()
            .await
            .map_err(RunnerError::FailedToStop)?;

        if let Some(teardown) = self.teardown.as_mut() {
            if !self.teardown_done {
                tracing::info!("Running teardown: {}", teardown.command());
                if let Err(error) = teardown.start().await {
                    tracing::warn!("Teardown failed, stop() will run it again: {error}");
                    return Err(RunnerError::TeardownFailed(error));
                }
                self.teardown_done = true;
            }
        }

        self.stopped = true;
        Ok(())
    }

    /// A started object with a pending teardown still has its effect applied,
    /// so it counts as running even after its process exited.
    fn status(&mut self) -> Status {
        if let Ok(status) = self.process.status() {
            if status.is_running() {
                return Status::Running;
            }
        }
        if self.started && self.teardown.is_some() && !self.teardown_done {
            return Status::Running;
        }
        Status::Idle
    }

    fn ensure_collectable(&self) -> Result<(), RunnerError> {
        if !self.started {
            return Err(RunnerError::NotYetStarted);
        }
        if !self.stopped {
            return Err(RunnerError::NotYetStopped);
        }
        Ok(())
    }

    async fn no_output_error(&self, path: &Path) -> RunnerError {
        let output = self.process.collect_output().await.unwrap_or_default();
        tracing::warn!(
            "{} was not created by the object; {}",
            path.display(),
            output
        );
        RunnerError::NoOutputProduced {
            path: path.to_path_buf(),
            output,
        }
    }
}

fn destination_for(dir: &Path, file: &Path) -> Result<PathBuf, RunnerError> {
    let name = file.file_name().ok_or_else(|| RunnerError::CollectionFailed {
        path: file.to_path_buf(),
        msg: "output path has no file name".to_string(),
    })?;
    Ok(dir.join(name))
}

async fn create_collection_dir(dir: &Path) -> Result<(), RunnerError> {
    tracing::debug!("Creating directory for object artifacts: {}", dir.display());
    fs::create_dir_all(dir)
        .await
        .map_err(|e| RunnerError::CreateDirectory {
            path: dir.to_path_buf(),
            msg: e.to_string(),
        })
}

async fn exists(path: &Path) -> Result<bool, RunnerError> {
    fs::try_exists(path)
        .await
        .map_err(|e| RunnerError::CollectionFailed {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })
}

/// Copies `source` to `destination`, refusing to overwrite anything.
async fn copy_exclusive(source: &Path, destination: &Path) -> Result<(), RunnerError> {
    let collection_failed = |e: io::Error| RunnerError::CollectionFailed {
        path: source.to_path_buf(),
        msg: e.to_string(),
    };

    let mut target = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => RunnerError::DestinationExists {
                path: destination.to_path_buf(),
            },
            _ => collection_failed(e),
        })?;

    let mut file = fs::File::open(source).await.map_err(collection_failed)?;
    tokio::io::copy(&mut file, &mut target)
        .await
        .map_err(collection_failed)?;
    target.flush().await.map_err(collection_failed)?;
    Ok(())
}

/// Runs an object as a local child process.
#[derive(Debug)]
pub struct LocalRunner {
    object: RunnableObject,
    lifecycle: Lifecycle,
    collection_path: PathBuf,
}

impl LocalRunner {
    pub fn new(
        object: RunnableObject,
        process: Box<dyn Process>,
        teardown: Option<Box<dyn Process>>,
        collection_path: PathBuf,
    ) -> Self {
        Self {
            object,
            lifecycle: Lifecycle::new(process, teardown),
            collection_path,
        }
    }

    async fn start(&mut self) -> Result<(), RunnerError> {
        self.lifecycle.ensure_not_started()?;
        tracing::info!("Starting object on-premises: {}", self.object.name());

        if let Some(dir) = self.object.directory_to_create() {
            tracing::info!("Creating local directory for object artifacts: {}", dir.display());
            fs::create_dir_all(dir)
                .await
                .map_err(|e| RunnerError::CreateDirectory {
                    path: dir.to_path_buf(),
                    msg: e.to_string(),
                })?;
        }

        self.lifecycle.start().await
    }

    async fn collect_results(&mut self) -> Result<Option<PathBuf>, RunnerError> {
        self.lifecycle.ensure_collectable()?;

        let Some(output) = self.object.output_file() else {
            tracing::info!("No artifacts expected from {}, nothing to collect", self.object.name());
            return Ok(None);
        };

        if !exists(&output).await? {
            return Err(self.lifecycle.no_output_error(&output).await);
        }

        let dir = self.collection_path.join(LOCAL_COLLECTION_DIR);
        create_collection_dir(&dir).await?;
        let destination = destination_for(&dir, &output)?;

        tracing::info!("Saving {} into {}", output.display(), destination.display());
        copy_exclusive(&output, &destination).await?;
        Ok(Some(destination))
    }
}

/// Runs an object on another host through a control channel.
#[derive(Debug)]
pub struct RemoteRunner {
    object: RunnableObject,
    channel: Arc<dyn ControlChannel>,
    lifecycle: Lifecycle,
    collection_path: PathBuf,
}

impl RemoteRunner {
    pub fn new(
        object: RunnableObject,
        channel: Arc<dyn ControlChannel>,
        process: Box<dyn Process>,
        teardown: Option<Box<dyn Process>>,
        collection_path: PathBuf,
    ) -> Self {
        Self {
            object,
            channel,
            lifecycle: Lifecycle::new(process, teardown),
            collection_path,
        }
    }

    fn destination(&self) -> String {
        self.channel.destination()
    }

    async fn start(&mut self) -> Result<(), RunnerError> {
        self.lifecycle.ensure_not_started()?;
        tracing::info!(
            "Starting object remotely via {}: {}",
            self.destination(),
            self.object.name()
        );

        if let Some(dir) = self.object.directory_to_create() {
            tracing::info!(
                "Creating directory for object artifacts on {}: {}",
                self.destination(),
                dir.display()
            );
            self.channel.create_dir(dir).await.map_err(|cause| {
                RunnerError::DirectoryCreationFailed {
                    path: dir.to_path_buf(),
                    cause,
                }
            })?;
        }

        self.lifecycle.start().await
    }

    async fn collect_results(&mut self) -> Result<Option<PathBuf>, RunnerError> {
        self.lifecycle.ensure_collectable()?;

        let Some(output) = self.object.output_file() else {
            tracing::info!("No artifacts expected from {}, nothing to collect", self.object.name());
            return Ok(None);
        };

        if !self.channel.file_exists(&output).await? {
            return Err(self.lifecycle.no_output_error(&output).await);
        }

        let dir = self.collection_path.join(self.destination());
        create_collection_dir(&dir).await?;
        let destination = destination_for(&dir, &output)?;

        if exists(&destination).await? {
            return Err(RunnerError::DestinationExists { path: destination });
        }

        tracing::info!(
            "Fetching {}:{} into {}",
            self.destination(),
            output.display(),
            destination.display()
        );
        self.channel.fetch_file(&output, &destination).await?;
        Ok(Some(destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        domain::{ProcessOutput, ProcessStatus},
        errors::{ChannelError, ProcessError},
        objects::{CaptureTool, ShapingTool},
        traits::{channel::MockControlChannel, process::MockProcess},
    };
    use tempfile::TempDir;

    fn capture(dir: &Path) -> RunnableObject {
        RunnableObject::Capture(CaptureTool {
            path: "tshark".to_string(),
            interface: "lo".to_string(),
            port: 4200,
            output_directory: dir.to_path_buf(),
            prefix: Some("capture".to_string()),
        })
    }

    fn shaping() -> RunnableObject {
        RunnableObject::Shaping(ShapingTool {
            path: "tc".to_string(),
            interface: "eth0".to_string(),
            rules: vec!["delay 50ms".to_string()],
        })
    }

    fn process_that_starts() -> MockProcess {
        let mut process = MockProcess::new();
        process.expect_start().times(1).returning(|| Ok(()));
        process
            .expect_command()
            .return_const("tshark -i lo".to_string());
        process
    }

    fn local(object: RunnableObject, process: MockProcess, collection: &Path) -> ObjectRunner {
        ObjectRunner::Local(LocalRunner::new(
            object,
            Box::new(process),
            None,
            collection.to_path_buf(),
        ))
    }

    #[tokio::test]
    async fn test_local_start_creates_output_directory() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("nested").join("_results");

        let mut runner = local(capture(&artifacts), process_that_starts(), tmp.path());
        runner.start().await.unwrap();

        assert!(artifacts.is_dir());
        assert!(runner.is_started());
        assert_eq!(runner.start().await, Err(RunnerError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_local_start_failure_is_wrapped() {
        let tmp = TempDir::new().unwrap();
        let mut process = MockProcess::new();
        process.expect_start().returning(|| {
            Err(ProcessError::ExitedEarly {
                command: "tshark".to_string(),
                exit_code: Some(1),
                output: ProcessOutput {
                    stdout: vec![],
                    stderr: vec!["permission denied".to_string()],
                },
            })
        });

        let mut runner = local(capture(tmp.path()), process, tmp.path());
        let result = runner.start().await;

        assert!(matches!(
            result,
            Err(RunnerError::FailedToStart(ProcessError::ExitedEarly { exit_code: Some(1), .. }))
        ));
        assert!(!runner.is_started());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut runner = local(capture(tmp.path()), MockProcess::new(), tmp.path());
        assert_eq!(runner.stop().await, Err(RunnerError::NotYetStarted));
    }

    #[tokio::test]
    async fn test_second_stop_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let mut process = process_that_starts();
        process.expect_stop().times(1).returning(|| Ok(()));

        let mut runner = local(capture(tmp.path()), process, tmp.path());
        runner.start().await.unwrap();
        runner.stop().await.unwrap();
        runner.stop().await.unwrap();

        assert!(runner.is_stopped());
    }

    #[tokio::test]
    async fn test_failed_stop_can_be_retried() {
        let tmp = TempDir::new().unwrap();
        let mut process = process_that_starts();
        let mut seq = mockall::Sequence::new();
        process
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ProcessError::NotStopped { pid: 42 }));
        process
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut runner = local(capture(tmp.path()), process, tmp.path());
        runner.start().await.unwrap();

        assert_eq!(
            runner.stop().await,
            Err(RunnerError::FailedToStop(ProcessError::NotStopped { pid: 42 }))
        );
        assert!(!runner.is_stopped());
        runner.stop().await.unwrap();
        assert!(runner.is_stopped());
    }

    #[tokio::test]
    async fn test_collect_before_stop_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut runner = local(capture(tmp.path()), process_that_starts(), tmp.path());
        runner.start().await.unwrap();

        assert_eq!(runner.collect_results().await, Err(RunnerError::NotYetStopped));
    }

    #[tokio::test]
    async fn test_collect_copies_into_local_subdirectory() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("_results");
        let collection = tmp.path().join("r");
        std::fs::create_dir_all(&collection).unwrap();

        let mut process = process_that_starts();
        process.expect_stop().returning(|| Ok(()));
        let mut runner = local(capture(&artifacts), process, &collection);

        runner.start().await.unwrap();
        std::fs::write(artifacts.join("capture-tracefile.pcapng"), b"pcap").unwrap();
        runner.stop().await.unwrap();

        let destination = runner.collect_results().await.unwrap().unwrap();
        assert_eq!(destination, collection.join("local").join("capture-tracefile.pcapng"));
        assert_eq!(std::fs::read(destination).unwrap(), b"pcap");
    }

    #[tokio::test]
    async fn test_collect_missing_output_attaches_process_output() {
        let tmp = TempDir::new().unwrap();
        let mut process = process_that_starts();
        process.expect_stop().returning(|| Ok(()));
        process.expect_collect_output().returning(|| {
            Ok(ProcessOutput {
                stdout: vec![],
                stderr: vec!["no such interface".to_string()],
            })
        });

        let mut runner = local(capture(tmp.path()), process, tmp.path());
        runner.start().await.unwrap();
        runner.stop().await.unwrap();

        match runner.collect_results().await {
            Err(RunnerError::NoOutputProduced { path, output }) => {
                assert_eq!(path, tmp.path().join("capture-tracefile.pcapng"));
                assert_eq!(output.stderr, vec!["no such interface"]);
            }
            other => panic!("Expected NoOutputProduced, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_collect_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let collection = tmp.path().join("r");
        let first_dir = tmp.path().join("first");
        let second_dir = tmp.path().join("second");

        let mut runners = Vec::new();
        for dir in [&first_dir, &second_dir] {
            let mut process = process_that_starts();
            process.expect_stop().returning(|| Ok(()));
            let mut runner = local(capture(dir), process, &collection);
            runner.start().await.unwrap();
            runner.stop().await.unwrap();
            runners.push(runner);
        }
        std::fs::write(first_dir.join("capture-tracefile.pcapng"), b"first").unwrap();
        std::fs::write(second_dir.join("capture-tracefile.pcapng"), b"second").unwrap();

        let destination = runners[0].collect_results().await.unwrap().unwrap();
        let second = runners[1].collect_results().await;

        assert_eq!(
            second,
            Err(RunnerError::DestinationExists {
                path: destination.clone()
            })
        );
        assert_eq!(std::fs::read(destination).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_object_without_output_collects_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut process = process_that_starts();
        process.expect_stop().returning(|| Ok(()));

        let mut runner = local(shaping(), process, tmp.path());
        runner.start().await.unwrap();
        runner.stop().await.unwrap();

        assert_eq!(runner.collect_results().await, Ok(None));
        assert!(!tmp.path().join("local").exists());
    }

    #[tokio::test]
    async fn test_teardown_runs_once_on_stop() {
        let tmp = TempDir::new().unwrap();
        let mut process = process_that_starts();
        process
            .expect_status()
            .returning(|| Ok(ProcessStatus::Idle { exit_code: Some(0) }));
        process.expect_stop().times(1).returning(|| Ok(()));

        let mut teardown = MockProcess::new();
        teardown.expect_start().times(1).returning(|| Ok(()));
        teardown
            .expect_command()
            .return_const("tc qdisc del dev eth0 root".to_string());

        let mut runner = ObjectRunner::Local(LocalRunner::new(
            shaping(),
            Box::new(process),
            Some(Box::new(teardown)),
            tmp.path().to_path_buf(),
        ));

        runner.start().await.unwrap();
        assert_eq!(runner.status(), Status::Running);

        runner.stop().await.unwrap();
        runner.stop().await.unwrap();
        assert_eq!(runner.status(), Status::Idle);
    }

    #[tokio::test]
    async fn test_failed_teardown_is_retried_by_next_stop() {
        let tmp = TempDir::new().unwrap();
        let mut process = process_that_starts();
        process
            .expect_status()
            .returning(|| Ok(ProcessStatus::Idle { exit_code: Some(0) }));
        process.expect_stop().times(2).returning(|| Ok(()));

        let mut teardown = MockProcess::new();
        let mut seq = mockall::Sequence::new();
        teardown
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(ProcessError::ExitedEarly {
                    command: "tc qdisc del dev eth0 root".to_string(),
                    exit_code: Some(2),
                    output: ProcessOutput::default(),
                })
            });
        teardown
            .expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        teardown
            .expect_command()
            .return_const("tc qdisc del dev eth0 root".to_string());

        let mut runner = ObjectRunner::Local(LocalRunner::new(
            shaping(),
            Box::new(process),
            Some(Box::new(teardown)),
            tmp.path().to_path_buf(),
        ));
        runner.start().await.unwrap();

        assert!(matches!(
            runner.stop().await,
            Err(RunnerError::TeardownFailed(ProcessError::ExitedEarly { .. }))
        ));
        assert_eq!(runner.status(), Status::Running);
        assert!(!runner.is_stopped());

        runner.stop().await.unwrap();
        assert_eq!(runner.status(), Status::Idle);
        assert!(runner.is_stopped());
    }

    #[tokio::test]
    async fn test_artifact_lookup_error_is_a_collection_failure() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("_results");

        let mut process = process_that_starts();
        process.expect_stop().returning(|| Ok(()));
        process.expect_collect_output().never();
        let mut runner = local(capture(&artifacts), process, tmp.path());
        runner.start().await.unwrap();
        runner.stop().await.unwrap();

        // The artifact directory turned into a regular file, so looking up the
        // artifact fails with ENOTDIR rather than reporting it as missing.
        std::fs::remove_dir(&artifacts).unwrap();
        std::fs::write(&artifacts, b"").unwrap();

        assert!(matches!(
            runner.collect_results().await,
            Err(RunnerError::CollectionFailed { ref path, .. })
                if path == &artifacts.join("capture-tracefile.pcapng")
        ));
    }

    #[tokio::test]
    async fn test_status_of_unstarted_runner_is_idle() {
        let tmp = TempDir::new().unwrap();
        let mut process = MockProcess::new();
        process
            .expect_status()
            .returning(|| Err(ProcessError::NeverStarted));

        let mut runner = local(capture(tmp.path()), process, tmp.path());
        assert_eq!(runner.status(), Status::Idle);
    }

    fn remote(
        object: RunnableObject,
        channel: MockControlChannel,
        process: MockProcess,
        collection: &Path,
    ) -> ObjectRunner {
        let mut channel = channel;
        channel
            .expect_destination()
            .return_const("lab@10.0.0.2".to_string());
        ObjectRunner::Remote(RemoteRunner::new(
            object,
            Arc::new(channel),
            Box::new(process),
            None,
            collection.to_path_buf(),
        ))
    }

    #[tokio::test]
    async fn test_remote_start_creates_remote_directory_first() {
        let tmp = TempDir::new().unwrap();
        let mut channel = MockControlChannel::new();
        channel
            .expect_create_dir()
            .withf(|dir| dir.as_os_str() == "_results")
            .times(1)
            .returning(|_| Ok(()));

        let mut runner = remote(
            capture(Path::new("_results")),
            channel,
            process_that_starts(),
            tmp.path(),
        );
        runner.start().await.unwrap();
        assert!(runner.is_started());
    }

    #[tokio::test]
    async fn test_remote_directory_failure_keeps_cause() {
        let tmp = TempDir::new().unwrap();
        let mut channel = MockControlChannel::new();
        channel.expect_create_dir().returning(|_| {
            Err(ChannelError::Authentication {
                destination: "lab@10.0.0.2".to_string(),
                msg: "Permission denied (publickey)".to_string(),
            })
        });
        let mut process = MockProcess::new();
        process.expect_start().never();

        let mut runner = remote(capture(Path::new("_results")), channel, process, tmp.path());
        let result = runner.start().await;

        assert!(matches!(
            result,
            Err(RunnerError::DirectoryCreationFailed {
                cause: ChannelError::Authentication { .. },
                ..
            })
        ));
        assert!(!runner.is_started());
    }

    #[tokio::test]
    async fn test_remote_collect_fetches_into_host_subdirectory() {
        let tmp = TempDir::new().unwrap();
        let mut channel = MockControlChannel::new();
        channel.expect_create_dir().returning(|_| Ok(()));
        channel
            .expect_file_exists()
            .withf(|path| path.as_os_str() == "_results/capture-tracefile.pcapng")
            .returning(|_| Ok(true));
        channel.expect_fetch_file().times(1).returning(|_, local| {
            std::fs::write(local, b"remote pcap").unwrap();
            Ok(())
        });

        let mut process = process_that_starts();
        process.expect_stop().returning(|| Ok(()));
        let mut runner = remote(capture(Path::new("_results")), channel, process, tmp.path());

        runner.start().await.unwrap();
        runner.stop().await.unwrap();
        let destination = runner.collect_results().await.unwrap().unwrap();

        assert_eq!(
            destination,
            tmp.path().join("lab@10.0.0.2").join("capture-tracefile.pcapng")
        );
        assert_eq!(std::fs::read(destination).unwrap(), b"remote pcap");
    }

    #[tokio::test]
    async fn test_remote_collect_missing_file() {
        let tmp = TempDir::new().unwrap();
        let mut channel = MockControlChannel::new();
        channel.expect_create_dir().returning(|_| Ok(()));
        channel.expect_file_exists().returning(|_| Ok(false));
        channel.expect_fetch_file().never();

        let mut process = process_that_starts();
        process.expect_stop().returning(|| Ok(()));
        process
            .expect_collect_output()
            .returning(|| Ok(ProcessOutput::default()));
        let mut runner = remote(capture(Path::new("_results")), channel, process, tmp.path());

        runner.start().await.unwrap();
        runner.stop().await.unwrap();

        assert!(matches!(
            runner.collect_results().await,
            Err(RunnerError::NoOutputProduced { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_collect_refuses_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let existing = tmp.path().join("lab@10.0.0.2");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("capture-tracefile.pcapng"), b"earlier").unwrap();

        let mut channel = MockControlChannel::new();
        channel.expect_create_dir().returning(|_| Ok(()));
        channel.expect_file_exists().returning(|_| Ok(true));
        channel.expect_fetch_file().never();

        let mut process = process_that_starts();
        process.expect_stop().returning(|| Ok(()));
        let mut runner = remote(capture(Path::new("_results")), channel, process, tmp.path());

        runner.start().await.unwrap();
        runner.stop().await.unwrap();

        assert!(matches!(
            runner.collect_results().await,
            Err(RunnerError::DestinationExists { .. })
        ));
        assert_eq!(
            std::fs::read(existing.join("capture-tracefile.pcapng")).unwrap(),
            b"earlier"
        );
    }

    #[test]
    fn test_remote_process_args() {
        let args = remote_process_args("lab@10.0.0.2", "tshark -i eth0 -f \"udp port 4200\"");
        assert_eq!(
            args,
            vec![
                "ssh",
                "-tt",
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "lab@10.0.0.2",
                "tshark -i eth0 -f \"udp port 4200\""
            ]
        );
    }
}
