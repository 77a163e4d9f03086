// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

pub mod classify;
pub mod config;
pub mod credential;
pub mod credits;
pub mod message;
pub mod prompt;
pub mod proxy;
pub mod router;
pub mod session;
pub mod stream;
pub mod upstream;
pub mod usage;
