use std::{path::Path, time::Duration};

use crate::core::{errors::ChannelError, traits::channel::ControlChannel};

/// Accepts every request after `delay`. Remote files never exist.
#[derive(Debug, Clone)]
pub struct ChannelStub {
    destination: String,
    delay: Duration,
}

impl ChannelStub {
    pub fn new(username: &str, host: &str, delay: Duration) -> Self {
        Self {
            destination: format!("{username}@{host}"),
            delay,
        }
    }
}

#[async_trait::async_trait]
impl ControlChannel for ChannelStub {
    fn destination(&self) -> String {
        self.destination.clone()
    }

    #[tracing::instrument]
    async fn create_dir(&self, path: &Path) -> Result<(), ChannelError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    #[tracing::instrument]
    async fn file_exists(&self, path: &Path) -> Result<bool, ChannelError> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }

    #[tracing::instrument]
    async fn fetch_file(&self, remote: &Path, local: &Path) -> Result<(), ChannelError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
