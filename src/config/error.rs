// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while loading `quizgate.yaml`. Any of these stops startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read quizgate config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse quizgate config YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("invalid quizgate config: {0}")]
    Validation(String),

    #[error("undefined variable ${{{name}}} in config (not set in environment)")]
    UndefinedVariable { name: String },
}
