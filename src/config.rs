use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::common::{error::TradeError, persist::Persister};

/// Node wide protocol settings. Fields missing from a config file take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub data_dir: PathBuf,
    pub request_channel_size: usize,
    pub peer_channel_size: usize,
    pub task_timeout_ms: u64, // 0 disables the per-task deadline
}

impl ProtocolConfig {
    const DEFAULT_DATA_DIR: &'static str = "trade_data";
    const DEFAULT_REQUEST_CHANNEL_SIZE: usize = 10;
    const DEFAULT_PEER_CHANNEL_SIZE: usize = 20;
    const DEFAULT_TASK_TIMEOUT_MS: u64 = 30_000;

    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        ProtocolConfig {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TradeError> {
        let json = Persister::restore(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        if self.request_channel_size == 0 || self.peer_channel_size == 0 {
            return Err(TradeError::Validation(
                "Channel sizes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        if self.task_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.task_timeout_ms))
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            data_dir: PathBuf::from(Self::DEFAULT_DATA_DIR),
            request_channel_size: Self::DEFAULT_REQUEST_CHANNEL_SIZE,
            peer_channel_size: Self::DEFAULT_PEER_CHANNEL_SIZE,
            task_timeout_ms: Self::DEFAULT_TASK_TIMEOUT_MS,
        }
    }
}
