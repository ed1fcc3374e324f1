use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ConfigError;

/// What `start_session` does when a session is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartPolicy {
    /// Refuse to start and report `SessionInProgress`.
    #[default]
    Reject,
    /// Tear down the running session, stop its engine, then start the new one.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    pub start_policy: StartPolicy,
}

impl ProxyConfig {
    pub fn with_start_policy(mut self, start_policy: StartPolicy) -> Self {
        self.start_policy = start_policy;
        self
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&input)
    }
}
