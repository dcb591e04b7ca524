use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{
    Deserialize, Deserializer,
    de::{Error, MapAccess, Visitor},
};
use serde_json::Value;

use crate::{
    constants::LOCAL_COLLECTION_DIR,
    core::{
        de,
        errors::ConfigError,
        objects::{Role, RunnableObject, ThroughputTool},
        task::TaskSchedule,
    },
};

/// A whole experiment as declared in its JSON config file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ExperimentConfig {
    pub collect_results_path: PathBuf,
    #[serde(deserialize_with = "de::seconds")]
    pub stop_after: Duration,
    #[serde(default)]
    pub ignore_stop_order: bool,
    /// In the order the keys appear in the document.
    #[serde(deserialize_with = "ordered_tasks")]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaskConfig {
    pub key: String,
    pub object: RunnableObject,
    pub runner: RunnerConfig,
    pub schedule: TaskSchedule,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunnerConfig {
    Local,
    Remote { username: String, host: String },
}

impl RunnerConfig {
    /// Subdirectory of the results directory this runner collects into.
    pub fn collection_subdir(&self) -> String {
        match self {
            RunnerConfig::Local => LOCAL_COLLECTION_DIR.to_string(),
            RunnerConfig::Remote { username, host } => format!("{username}@{host}"),
        }
    }
}

impl ExperimentConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        if config.tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        Ok(config)
    }

    fn throughput_tools(&mut self) -> impl Iterator<Item = &mut ThroughputTool> {
        self.tasks.iter_mut().filter_map(|task| match &mut task.object {
            RunnableObject::Throughput(tool) => Some(tool),
            _ => None,
        })
    }

    /// Sets a URI attribute on every throughput task. Returns how many were
    /// updated.
    pub fn set_uri_attribute(&mut self, attr: &str, value: &str) -> usize {
        let mut updated = 0;
        for tool in self.throughput_tools() {
            tool.set_attr(attr, value);
            updated += 1;
        }
        updated
    }

    /// Sets a CLI option on throughput tasks, optionally only those with the
    /// given role. Returns how many were updated.
    pub fn set_option(&mut self, role: Option<Role>, option: &str, value: &str) -> usize {
        let mut updated = 0;
        for tool in self.throughput_tools() {
            if role.is_some_and(|role| role != tool.role) {
                continue;
            }
            tool.set_option(option, value);
            updated += 1;
        }
        updated
    }
}

#[derive(Deserialize)]
struct RawTaskConfig {
    obj_type: String,
    obj_config: Value,
    runner_type: String,
    #[serde(default)]
    runner_config: Option<RawRunnerConfig>,
    #[serde(default, deserialize_with = "de::optional_seconds")]
    sleep_after_start: Option<Duration>,
    #[serde(default, deserialize_with = "de::optional_seconds")]
    sleep_after_stop: Option<Duration>,
    #[serde(default)]
    stop_order: Option<i64>,
}

#[derive(Default, Deserialize)]
struct RawRunnerConfig {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    collect_results_path: Option<PathBuf>,
}

impl RawTaskConfig {
    fn into_task(self, key: String) -> Result<TaskConfig, String> {
        let object = match self.obj_type.as_str() {
            "tshark" => RunnableObject::Capture(object_config(self.obj_config)?),
            "srt-xtransmit" => RunnableObject::Throughput(object_config(self.obj_config)?),
            "netem" => RunnableObject::Shaping(object_config(self.obj_config)?),
            other => return Err(format!("unknown obj_type {other:?}")),
        };

        let runner_config = self.runner_config.unwrap_or_default();
        if let Some(path) = &runner_config.collect_results_path {
            tracing::debug!(
                task = %key,
                "runner collect_results_path {} is overridden by the experiment's",
                path.display()
            );
        }

        let runner = match self.runner_type.as_str() {
            "local-runner" => RunnerConfig::Local,
            "remote-runner" => match (runner_config.username, runner_config.host) {
                (Some(username), Some(host)) => RunnerConfig::Remote { username, host },
                _ => return Err("remote-runner requires username and host".to_string()),
            },
            other => return Err(format!("unknown runner_type {other:?}")),
        };

        Ok(TaskConfig {
            key,
            object,
            runner,
            schedule: TaskSchedule {
                post_start_delay: self.sleep_after_start,
                post_stop_delay: self.sleep_after_stop,
                stop_priority: self.stop_order,
            },
        })
    }
}

fn object_config<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("invalid obj_config: {e}"))
}

fn ordered_tasks<'de, D>(deserializer: D) -> Result<Vec<TaskConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TasksVisitor;

    impl<'de> Visitor<'de> for TasksVisitor {
        type Value = Vec<TaskConfig>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of task keys to task configs")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut tasks: Vec<TaskConfig> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(key) = map.next_key::<String>()? {
                if tasks.iter().any(|task| task.key == key) {
                    return Err(A::Error::custom(format!("duplicate task key {key:?}")));
                }
                let raw: RawTaskConfig = map
                    .next_value()
                    .map_err(|e| A::Error::custom(format!("task {key:?}: {e}")))?;
                let task = raw
                    .into_task(key.clone())
                    .map_err(|msg| A::Error::custom(format!("task {key:?}: {msg}")))?;
                tasks.push(task);
            }
            Ok(tasks)
        }
    }

    deserializer.deserialize_map(TasksVisitor)
}
