use std::path::Path;

use crate::core::errors::ChannelError;

/// Out-of-band access to the host an object runs on.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ControlChannel: std::fmt::Debug + Send + Sync {
    /// `username@host`.
    fn destination(&self) -> String;

    /// Creates `path` and its parents. Succeeds if it already exists.
    async fn create_dir(&self, path: &Path) -> Result<(), ChannelError>;

    async fn file_exists(&self, path: &Path) -> Result<bool, ChannelError>;

    /// Copies the remote file `remote` to the local path `local`.
    async fn fetch_file(&self, remote: &Path, local: &Path) -> Result<(), ChannelError>;
}
