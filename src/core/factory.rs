use std::{
    collections::{HashMap, hash_map::Entry},
    ffi::OsString,
    path::Path,
};

use crate::core::{
    cancel::Cancellation,
    config::{ExperimentConfig, RunnerConfig, TaskConfig},
    domain::{ProcessSpec, StopOrder},
    errors::ConfigError,
    experiment::SingleExperimentRunner,
    objects::command_string,
    runners::{LocalRunner, ObjectRunner, RemoteRunner, remote_process_args},
    task::Task,
    traits::launcher::Launcher,
};

pub fn build_experiment(
    config: &ExperimentConfig,
    launcher: &dyn Launcher,
    cancellation: Cancellation,
) -> Result<SingleExperimentRunner, ConfigError> {
    if config.tasks.is_empty() {
        return Err(ConfigError::NoTasks);
    }
    check_duplicate_artifacts(&config.tasks)?;

    let tasks = config
        .tasks
        .iter()
        .map(|task| build_task(task, &config.collect_results_path, launcher))
        .collect();

    Ok(SingleExperimentRunner::new(
        config.collect_results_path.clone(),
        StopOrder::from_ignore_stop_order(config.ignore_stop_order),
        config.stop_after,
        tasks,
        cancellation,
    ))
}

/// Two tasks collecting the same file name into the same subdirectory would
/// collide at collection time, so reject them up front.
fn check_duplicate_artifacts(tasks: &[TaskConfig]) -> Result<(), ConfigError> {
    let mut seen: HashMap<(String, OsString), &str> = HashMap::new();
    for task in tasks {
        let Some(output) = task.object.output_file() else {
            continue;
        };
        let Some(file) = output.file_name() else {
            continue;
        };

        let subdir = task.runner.collection_subdir();
        match seen.entry((subdir.clone(), file.to_os_string())) {
            Entry::Occupied(entry) => {
                return Err(ConfigError::DuplicateArtifact {
                    file: file.to_string_lossy().into_owned(),
                    subdir,
                    first: entry.get().to_string(),
                    second: task.key.clone(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(&task.key);
            }
        }
    }
    Ok(())
}

pub fn build_task(config: &TaskConfig, collection_path: &Path, launcher: &dyn Launcher) -> Task {
    let object = config.object.clone();
    let finish = |spec: ProcessSpec| {
        if object.is_one_shot() {
            spec.one_shot()
        } else {
            spec
        }
    };

    let runner = match &config.runner {
        RunnerConfig::Local => {
            let process = launcher.process(finish(ProcessSpec::local(object.make_args())));
            let teardown = object
                .make_teardown_args()
                .map(|args| launcher.process(ProcessSpec::local(args).teardown()));
            ObjectRunner::Local(LocalRunner::new(
                object,
                process,
                teardown,
                collection_path.to_path_buf(),
            ))
        }
        RunnerConfig::Remote { username, host } => {
            let destination = format!("{username}@{host}");
            let process = launcher.process(finish(ProcessSpec::remote(remote_process_args(
                &destination,
                &object.make_command_string(),
            ))));
            let teardown = object.make_teardown_args().map(|args| {
                launcher.process(
                    ProcessSpec::remote(remote_process_args(&destination, &command_string(&args)))
                        .teardown(),
                )
            });
            ObjectRunner::Remote(RemoteRunner::new(
                object,
                launcher.channel(username, host),
                process,
                teardown,
                collection_path.to_path_buf(),
            ))
        }
    };

    tracing::debug!(task = %config.key, "Built {} task", runner.object().name());
    Task::new(config.key.clone(), runner, config.schedule)
}
