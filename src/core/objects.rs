use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Deserialize;

use crate::{
    constants::{CAPTURE_SNAPLEN, DEFAULT_CAPTURE_PATH, DEFAULT_SHAPING_PATH, DEFAULT_STATS_FREQ},
    core::de,
};

/// What to run: a command line plus the artifact it leaves behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunnableObject {
    Capture(CaptureTool),
    Throughput(ThroughputTool),
    Shaping(ShapingTool),
}

impl RunnableObject {
    pub fn name(&self) -> &'static str {
        match self {
            RunnableObject::Capture(_) => "tshark",
            RunnableObject::Throughput(_) => "srt-xtransmit",
            RunnableObject::Shaping(_) => "netem",
        }
    }

    pub fn make_args(&self) -> Vec<String> {
        match self {
            RunnableObject::Capture(tool) => tool.make_args(),
            RunnableObject::Throughput(tool) => tool.make_args(),
            RunnableObject::Shaping(tool) => tool.make_args(),
        }
    }

    /// The argument vector as one shell command, for running through ssh.
    pub fn make_command_string(&self) -> String {
        command_string(&self.make_args())
    }

    /// Directory that has to exist on the target host before start.
    pub fn directory_to_create(&self) -> Option<&Path> {
        match self {
            RunnableObject::Capture(tool) => Some(&tool.output_directory),
            RunnableObject::Throughput(tool) => tool.stats_directory.as_deref(),
            RunnableObject::Shaping(_) => None,
        }
    }

    pub fn output_file(&self) -> Option<PathBuf> {
        match self {
            RunnableObject::Capture(tool) => Some(tool.tracefile_path()),
            RunnableObject::Throughput(tool) => tool.statsfile_path(),
            RunnableObject::Shaping(_) => None,
        }
    }

    /// Objects that finish on their own right after applying their effect.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, RunnableObject::Shaping(_))
    }

    /// Command undoing the object's effect, run when the object is stopped.
    pub fn make_teardown_args(&self) -> Option<Vec<String>> {
        match self {
            RunnableObject::Shaping(tool) => Some(tool.make_teardown_args()),
            _ => None,
        }
    }
}

/// Quotes an argument for a remote shell if it contains whitespace or an SRT URI.
pub fn quote_arg(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) || arg.contains("srt://") {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

pub fn command_string(args: &[String]) -> String {
    args.iter().map(|arg| quote_arg(arg)).join(" ")
}

/// `a=1&b=2`, in declaration order.
pub fn build_query(attrs_values: &[(String, String)]) -> String {
    attrs_values
        .iter()
        .map(|(attr, value)| format!("{attr}={value}"))
        .join("&")
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn default_capture_path() -> String {
    DEFAULT_CAPTURE_PATH.to_string()
}

fn default_shaping_path() -> String {
    DEFAULT_SHAPING_PATH.to_string()
}

/// Packet capture of the UDP traffic on one port.
///
/// `tshark -i eth0 -f "udp port 4200" -s 1500 -w _results/tshark-tracefile.pcapng`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CaptureTool {
    #[serde(default = "default_capture_path")]
    pub path: String,
    pub interface: String,
    #[serde(deserialize_with = "de::port")]
    pub port: u16,
    #[serde(rename = "dirpath")]
    pub output_directory: PathBuf,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl CaptureTool {
    pub fn tracefile_path(&self) -> PathBuf {
        let prefix = self.prefix.as_deref().unwrap_or(DEFAULT_CAPTURE_PATH);
        self.output_directory
            .join(format!("{prefix}-tracefile.pcapng"))
    }

    pub fn make_args(&self) -> Vec<String> {
        vec![
            self.path.clone(),
            "-i".to_string(),
            self.interface.clone(),
            "-f".to_string(),
            format!("udp port {}", self.port),
            "-s".to_string(),
            CAPTURE_SNAPLEN.to_string(),
            "-w".to_string(),
            path_arg(&self.tracefile_path()),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Role {
    #[serde(rename = "snd")]
    Send,
    #[serde(rename = "rcv")]
    Receive,
}

impl Role {
    fn subcommand(&self) -> &'static str {
        match self {
            Role::Send => "generate",
            Role::Receive => "receive",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            Role::Send => "snd",
            Role::Receive => "rcv",
        }
    }
}

/// SRT throughput test application (srt-xtransmit).
///
/// `srt-xtransmit receive "srt://:4200?latency=400" --msgsize 1316
/// --statsfile _results/srt-xtransmit-stats-rcv.csv --statsfreq 100`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ThroughputTool {
    #[serde(rename = "type")]
    pub role: Role,
    pub path: String,
    #[serde(deserialize_with = "de::port")]
    pub port: u16,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "de::pairs")]
    pub attrs_values: Vec<(String, String)>,
    #[serde(default, deserialize_with = "de::pairs")]
    pub options_values: Vec<(String, String)>,
    #[serde(default, rename = "statsdir")]
    pub stats_directory: Option<PathBuf>,
    #[serde(default, rename = "statsfreq", deserialize_with = "de::optional_scalar")]
    pub stats_frequency: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl ThroughputTool {
    pub fn uri(&self) -> String {
        let host = self.host.as_deref().unwrap_or_default();
        if self.attrs_values.is_empty() {
            format!("srt://{host}:{}", self.port)
        } else {
            format!(
                "srt://{host}:{}?{}",
                self.port,
                build_query(&self.attrs_values)
            )
        }
    }

    pub fn statsfile_path(&self) -> Option<PathBuf> {
        let name = match &self.prefix {
            Some(prefix) => format!("{prefix}-srt-xtransmit-stats-{}.csv", self.role.short_name()),
            None => format!("srt-xtransmit-stats-{}.csv", self.role.short_name()),
        };
        self.stats_directory.as_ref().map(|dir| dir.join(name))
    }

    pub fn make_args(&self) -> Vec<String> {
        let mut args = vec![
            self.path.clone(),
            self.role.subcommand().to_string(),
            self.uri(),
        ];

        for (option, value) in &self.options_values {
            args.push(option.clone());
            if !value.is_empty() {
                args.push(value.clone());
            }
        }

        if let Some(statsfile) = self.statsfile_path() {
            args.push("--statsfile".to_string());
            args.push(path_arg(&statsfile));
            args.push("--statsfreq".to_string());
            args.push(
                self.stats_frequency
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STATS_FREQ.to_string()),
            );
        }

        args
    }

    /// Replaces the value of `attr` or appends it.
    pub fn set_attr(&mut self, attr: &str, value: &str) {
        set_pair(&mut self.attrs_values, attr, value);
    }

    /// Replaces the value of `option` or appends it.
    pub fn set_option(&mut self, option: &str, value: &str) {
        set_pair(&mut self.options_values, option, value);
    }
}

fn set_pair(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
}

/// Network emulation discipline on an interface.
///
/// `tc qdisc add dev eth0 root netem delay 100ms loss 1%`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ShapingTool {
    #[serde(default = "default_shaping_path")]
    pub path: String,
    pub interface: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl ShapingTool {
    pub fn make_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            self.path.as_str(),
            "qdisc",
            "add",
            "dev",
            self.interface.as_str(),
            "root",
            "netem",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.extend(
            self.rules
                .iter()
                .flat_map(|rule| rule.split_whitespace())
                .map(String::from),
        );
        args
    }

    pub fn make_teardown_args(&self) -> Vec<String> {
        [
            self.path.as_str(),
            "qdisc",
            "del",
            "dev",
            self.interface.as_str(),
            "root",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}
