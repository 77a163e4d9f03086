// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use super::error::ConfigError;

/// Where the quizgate YAML (upstream, model catalog, credits, sessions)
/// is read from. The binary uses `FileSource`; tests use `StringSource`.
pub trait ConfigSource {
    fn load(&self) -> Result<String, ConfigError>;

    /// Short label for startup logs.
    fn describe(&self) -> String;
}

/// The config file named by `--config` / `QUIZGATE_CONFIG`.
pub struct FileSource {
    pub path: PathBuf,
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Inline YAML.
pub struct StringSource {
    pub content: String,
}

impl ConfigSource for StringSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }

    fn describe(&self) -> String {
        format!("<inline, {} bytes>", self.content.len())
    }
}
