use std::time::Duration;

/// `ConnectTimeout` handed to every ssh/scp invocation, in seconds.
pub const SSH_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// How long a freshly spawned local process must survive to count as started.
pub const LOCAL_START_GRACE: Duration = Duration::from_secs(5);

/// Same as [`LOCAL_START_GRACE`] for processes started through ssh, which
/// also have to finish the connection handshake.
pub const CONTROL_CHANNEL_START_GRACE: Duration =
    Duration::from_secs(SSH_CONNECTION_TIMEOUT_SECS + 1);

/// Number of status polls after an interrupt before escalating to a kill.
pub const INTERRUPT_POLLS: u32 = 3;
pub const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for a single ssh/scp helper command (mkdir, test, fetch).
pub const CHANNEL_COMMAND_TIMEOUT: Duration =
    Duration::from_secs(SSH_CONNECTION_TIMEOUT_SECS + 20);

/// How long to wait for the output readers of an already exited process.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub const SSH_BINARY: &str = "ssh";
pub const SCP_BINARY: &str = "scp";

/// `-tt` forces a pseudo-terminal even without a local tty, otherwise SIGINT
/// is not forwarded to the remote command.
pub const SSH_FORCE_TTY: &str = "-tt";

pub const DEFAULT_CAPTURE_PATH: &str = "tshark";
pub const CAPTURE_SNAPLEN: &str = "1500";
pub const DEFAULT_SHAPING_PATH: &str = "tc";
pub const DEFAULT_STATS_FREQ: &str = "100";

pub const LOCAL_COLLECTION_DIR: &str = "local";
