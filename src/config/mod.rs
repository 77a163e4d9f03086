// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads quizgate.yaml, validates structure, resolves variable interpolation,
// and computes a deterministic config hash for startup logging.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use defaults::{default_fallback_models, default_premium_models, DEFAULT_TEMPERATURE};
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;
