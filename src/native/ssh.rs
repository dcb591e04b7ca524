use std::{
    path::Path,
    process::{Output, Stdio},
    time::Duration,
};

use tokio::process::Command;

use crate::{
    constants::{CHANNEL_COMMAND_TIMEOUT, SCP_BINARY, SSH_BINARY, SSH_CONNECTION_TIMEOUT_SECS},
    core::{errors::ChannelError, traits::channel::ControlChannel},
};

/// Control channel over the system `ssh` and `scp` binaries.
///
/// Authentication is left to ssh-agent; `BatchMode` makes a missing key fail
/// instead of prompting.
#[derive(Clone, Debug)]
pub struct SshChannel {
    username: String,
    host: String,
    command_timeout: Duration,
}

impl SshChannel {
    pub fn new(username: &str, host: &str) -> Self {
        Self {
            username: username.to_string(),
            host: host.to_string(),
            command_timeout: CHANNEL_COMMAND_TIMEOUT,
        }
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = batch_options();
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    fn scp_args(&self, remote: &Path, local: &Path) -> Vec<String> {
        let mut args = batch_options();
        args.push(format!("{}:{}", self.destination(), remote.display()));
        args.push(local.display().to_string());
        args
    }

    async fn run(&self, program: &str, args: Vec<String>) -> Result<Output, ChannelError> {
        tracing::debug!("{program} {}", args.join(" "));
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::time::timeout(self.command_timeout, output)
            .await
            .map_err(|_| ChannelError::Timeout {
                destination: self.destination(),
                msg: format!("{program} did not finish in {:?}", self.command_timeout),
            })?
            .map_err(|e| ChannelError::Channel {
                destination: self.destination(),
                msg: format!("failed to run {program}: {e}"),
            })
    }

    fn failure(&self, output: &Output) -> ChannelError {
        classify_failure(
            &self.destination(),
            output.status.code(),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

fn batch_options() -> Vec<String> {
    vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={SSH_CONNECTION_TIMEOUT_SECS}"),
    ]
}

/// Single-quotes `path` for the remote shell.
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Tells unreachable hosts and rejected credentials apart from everything
/// else, based on what ssh printed.
pub fn classify_failure(destination: &str, exit_code: Option<i32>, stderr: &str) -> ChannelError {
    let msg = match stderr.trim() {
        "" => format!("exited with code {exit_code:?}"),
        text => text.to_string(),
    };
    let lowered = msg.to_lowercase();
    let destination = destination.to_string();

    const AUTHENTICATION: [&str; 4] = [
        "permission denied",
        "authentication",
        "host key verification failed",
        "agent",
    ];
    const UNREACHABLE: [&str; 6] = [
        "timed out",
        "no route to host",
        "could not resolve hostname",
        "network is unreachable",
        "connection refused",
        "connection closed",
    ];

    if AUTHENTICATION.iter().any(|needle| lowered.contains(needle)) {
        ChannelError::Authentication { destination, msg }
    } else if UNREACHABLE.iter().any(|needle| lowered.contains(needle)) {
        ChannelError::Timeout { destination, msg }
    } else {
        ChannelError::Channel { destination, msg }
    }
}

#[async_trait::async_trait]
impl ControlChannel for SshChannel {
    fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    async fn create_dir(&self, path: &Path) -> Result<(), ChannelError> {
        let command = format!("mkdir -p {}", shell_quote(path));
        let output = self.run(SSH_BINARY, self.ssh_args(&command)).await?;
        if !output.status.success() {
            return Err(self.failure(&output));
        }
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> Result<bool, ChannelError> {
        let command = format!("test -e {}", shell_quote(path));
        let output = self.run(SSH_BINARY, self.ssh_args(&command)).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.failure(&output)),
        }
    }

    async fn fetch_file(&self, remote: &Path, local: &Path) -> Result<(), ChannelError> {
        let output = self.run(SCP_BINARY, self.scp_args(remote, local)).await?;
        if !output.status.success() {
            return Err(self.failure(&output));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_args() {
        let channel = SshChannel::new("lab", "10.0.0.2");
        assert_eq!(
            channel.ssh_args("mkdir -p '_results'"),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "lab@10.0.0.2",
                "mkdir -p '_results'"
            ]
        );
    }

    #[test]
    fn test_scp_args() {
        let channel = SshChannel::new("lab", "10.0.0.2");
        assert_eq!(
            channel.scp_args(
                Path::new("_results/tshark-tracefile.pcapng"),
                Path::new("r/lab@10.0.0.2/tshark-tracefile.pcapng")
            ),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "lab@10.0.0.2:_results/tshark-tracefile.pcapng",
                "r/lab@10.0.0.2/tshark-tracefile.pcapng"
            ]
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote(Path::new("_results")), "'_results'");
        assert_eq!(shell_quote(Path::new("it's here")), r"'it'\''s here'");
    }

    #[test]
    fn test_classify_authentication() {
        let error = classify_failure(
            "lab@10.0.0.2",
            Some(255),
            "lab@10.0.0.2: Permission denied (publickey,password).\r\n",
        );
        assert_eq!(
            error,
            ChannelError::Authentication {
                destination: "lab@10.0.0.2".to_string(),
                msg: "lab@10.0.0.2: Permission denied (publickey,password).".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_unreachable() {
        let error = classify_failure(
            "lab@10.0.0.9",
            Some(255),
            "ssh: connect to host 10.0.0.9 port 22: Connection timed out",
        );
        assert!(matches!(error, ChannelError::Timeout { .. }));

        let error = classify_failure(
            "lab@lab-box",
            Some(255),
            "ssh: Could not resolve hostname lab-box: Name or service not known",
        );
        assert!(matches!(error, ChannelError::Timeout { .. }));
    }

    #[test]
    fn test_classify_other_failures() {
        let error = classify_failure(
            "lab@10.0.0.2",
            Some(1),
            "mkdir: cannot create directory '/root/x': Read-only file system",
        );
        assert!(matches!(error, ChannelError::Channel { .. }));

        let error = classify_failure("lab@10.0.0.2", Some(2), "  ");
        assert_eq!(
            error,
            ChannelError::Channel {
                destination: "lab@10.0.0.2".to_string(),
                msg: "exited with code Some(2)".to_string(),
            }
        );
    }
}
