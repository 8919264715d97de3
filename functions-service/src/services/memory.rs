//! In-memory account store for tests and local runs without MongoDB.

use super::repository::AccountStore;
use crate::models::{Account, AccountProfile, CreditGrant};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// Mirrors the MongoDB update semantics with per-entry locking.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one account.
    pub fn snapshot(&self, uid: &str) -> Option<Account> {
        self.accounts.get(uid).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn append_answer(&self, uid: &str, answer: &str) -> Result<()> {
        let mut account = self
            .accounts
            .entry(uid.to_string())
            .or_insert_with(|| Account::new(uid));

        if !account.answers.iter().any(|existing| existing == answer) {
            account.answers.push(answer.to_string());
        }
        Ok(())
    }

    async fn grant_credits(
        &self,
        uid: &str,
        session_id: &str,
        amount: i64,
    ) -> Result<CreditGrant> {
        let mut account = self
            .accounts
            .entry(uid.to_string())
            .or_insert_with(|| Account::new(uid));

        if account.credited_sessions.iter().any(|s| s == session_id) {
            return Ok(CreditGrant::AlreadyGranted);
        }

        account.credits += amount;
        account.credited_sessions.push(session_id.to_string());
        Ok(CreditGrant::Granted)
    }

    async fn upsert_profile(&self, uid: &str, profile: &AccountProfile) -> Result<()> {
        let mut account = self
            .accounts
            .entry(uid.to_string())
            .or_insert_with(|| Account::new(uid));

        account.profile = Some(profile.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
