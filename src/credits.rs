// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Credit / quota policy
//
// Two touch points:
// - pre-flight `check` before any upstream call
// - post-success `consume` on the first turn of a platform-paid session
//
// Real deployments back this with the billing database; the bundled
// in-memory policy implements the same rules for tests and single-node use.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::CreditConfig;

/// Why the caller is (or is not) allowed to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    Subscription,
    Credits,
    Free,
    Byok,
    /// The platform-wide budget for platform-paid calls is spent.
    PlatformBudget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditQuery {
    pub user_id: String,
    pub has_byok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditCheck {
    pub has_credits: bool,
    pub can_use_premium: bool,
    pub source: CreditSource,
    /// The platform key may pay for this call. False for a BYOK caller with
    /// nothing of their own left, or once the platform budget is spent.
    pub platform_allowed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    #[error("no credits left for user {0}")]
    Exhausted(String),

    #[error("credit store unavailable: {0}")]
    Store(String),
}

#[async_trait]
pub trait CreditPolicy: Send + Sync {
    async fn check(&self, query: &CreditQuery) -> Result<CreditCheck, CreditError>;

    /// Decrement the caller's balance for one quiz session.
    async fn consume(&self, user_id: &str) -> Result<(), CreditError>;
}

/// Consume one credit in the background. Never blocks or fails the response.
pub fn consume_in_background(policy: Arc<dyn CreditPolicy>, user_id: String) {
    tokio::spawn(async move {
        match policy.consume(&user_id).await {
            Ok(()) => tracing::debug!(%user_id, "credit consumed"),
            Err(e) => tracing::warn!(%user_id, error = %e, "failed to consume credit"),
        }
    });
}

// ---------------------------------------------------------------------------
// InMemoryCreditPolicy
// ---------------------------------------------------------------------------

/// Balance state for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub subscribed: bool,
    /// Purchased credits; each unlocks one premium session.
    pub balance: u32,
    /// Remaining free-tier sessions (fallback models only).
    pub free_remaining: u32,
}

pub struct InMemoryCreditPolicy {
    accounts: DashMap<String, Account>,
    free_quizzes: u32,
    /// Remaining platform-paid sessions across all users; `None` = unlimited.
    platform_budget: Option<AtomicU64>,
}

impl InMemoryCreditPolicy {
    pub fn new(config: &CreditConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            free_quizzes: config.free_quizzes,
            platform_budget: config.platform_budget.map(AtomicU64::new),
        }
    }

    pub fn set_account(&self, user_id: impl Into<String>, account: Account) {
        self.accounts.insert(user_id.into(), account);
    }

    pub fn account(&self, user_id: &str) -> Account {
        self.accounts
            .get(user_id)
            .map(|a| a.value().clone())
            .unwrap_or_else(|| self.new_account())
    }

    pub fn platform_budget_remaining(&self) -> Option<u64> {
        self.platform_budget.as_ref().map(|b| b.load(Ordering::SeqCst))
    }

    fn new_account(&self) -> Account {
        Account {
            subscribed: false,
            balance: 0,
            free_remaining: self.free_quizzes,
        }
    }

    fn platform_budget_exhausted(&self) -> bool {
        self.platform_budget
            .as_ref()
            .is_some_and(|b| b.load(Ordering::SeqCst) == 0)
    }
}

#[async_trait]
impl CreditPolicy for InMemoryCreditPolicy {
    async fn check(&self, query: &CreditQuery) -> Result<CreditCheck, CreditError> {
        let account = self.account(&query.user_id);
        let paid = account.subscribed || account.balance > 0;
        let budget_spent = self.platform_budget_exhausted();

        if query.has_byok {
            return Ok(CreditCheck {
                has_credits: true,
                can_use_premium: paid,
                source: CreditSource::Byok,
                platform_allowed: !budget_spent && (paid || account.free_remaining > 0),
            });
        }

        if budget_spent {
            return Ok(CreditCheck {
                has_credits: false,
                can_use_premium: false,
                source: CreditSource::PlatformBudget,
                platform_allowed: false,
            });
        }

        let check = if account.subscribed {
            CreditCheck {
                has_credits: true,
                can_use_premium: true,
                source: CreditSource::Subscription,
                platform_allowed: true,
            }
        } else if account.balance > 0 {
            CreditCheck {
                has_credits: true,
                can_use_premium: true,
                source: CreditSource::Credits,
                platform_allowed: true,
            }
        } else {
            let has_credits = account.free_remaining > 0;
            CreditCheck {
                has_credits,
                can_use_premium: false,
                source: CreditSource::Free,
                platform_allowed: has_credits,
            }
        };
        Ok(check)
    }

    async fn consume(&self, user_id: &str) -> Result<(), CreditError> {
        let fresh = self.new_account();
        let mut entry = self.accounts.entry(user_id.to_string()).or_insert(fresh);
        let account = entry.value_mut();

        // Subscriptions are flat-rate: nothing to decrement.
        if !account.subscribed {
            if account.balance > 0 {
                account.balance -= 1;
            } else if account.free_remaining > 0 {
                account.free_remaining -= 1;
            } else {
                return Err(CreditError::Exhausted(user_id.to_string()));
            }
        }
        drop(entry);

        if let Some(budget) = &self.platform_budget {
            let _ = budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1));
        }
        Ok(())
    }
}
