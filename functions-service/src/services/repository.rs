use crate::models::{Account, AccountProfile, CreditGrant};
use anyhow::Result;
use async_trait::async_trait;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::UpdateOptions;
use mongodb::{
    bson::{doc, DateTime},
    Collection, Database,
};

const DUPLICATE_KEY: i32 = 11000;

/// Persistence for per-user account documents.
///
/// Every mutation is a single-document atomic update; nothing spans documents.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Add `answer` to the user's answers unless an identical one is present.
    async fn append_answer(&self, uid: &str, answer: &str) -> Result<()>;

    /// Add `amount` credits for `session_id`, at most once per session.
    async fn grant_credits(&self, uid: &str, session_id: &str, amount: i64)
        -> Result<CreditGrant>;

    /// Merge profile fields without touching answers or credits.
    async fn upsert_profile(&self, uid: &str, profile: &AccountProfile) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct AccountRepository {
    db: Database,
    accounts: Collection<Account>,
}

impl AccountRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            accounts: db.collection("accounts"),
        }
    }

    fn upsert() -> UpdateOptions {
        UpdateOptions::builder().upsert(true).build()
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn append_answer(&self, uid: &str, answer: &str) -> Result<()> {
        let filter = doc! { "_id": uid };
        let update = doc! {
            "$addToSet": { "answers": answer },
            "$setOnInsert": { "credits": 0_i64, "created_at": DateTime::now() }
        };

        self.accounts
            .update_one(filter, update, Some(Self::upsert()))
            .await?;
        Ok(())
    }

    async fn grant_credits(
        &self,
        uid: &str,
        session_id: &str,
        amount: i64,
    ) -> Result<CreditGrant> {
        // Matches only while the session is not yet recorded on the account.
        let filter = doc! {
            "_id": uid,
            "credited_sessions": { "$ne": session_id }
        };
        let update = doc! {
            "$inc": { "credits": amount },
            "$push": { "credited_sessions": session_id },
            "$setOnInsert": { "answers": [], "created_at": DateTime::now() }
        };

        match self
            .accounts
            .update_one(filter.clone(), update.clone(), Some(Self::upsert()))
            .await
        {
            Ok(_) => Ok(CreditGrant::Granted),
            Err(e) if is_duplicate_key(&e) => {
                // The document exists. Either this session is already recorded,
                // or a concurrent first write created the document.
                let update = doc! {
                    "$inc": { "credits": amount },
                    "$push": { "credited_sessions": session_id }
                };
                let result = self.accounts.update_one(filter, update, None).await?;
                if result.matched_count == 1 {
                    Ok(CreditGrant::Granted)
                } else {
                    Ok(CreditGrant::AlreadyGranted)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_profile(&self, uid: &str, profile: &AccountProfile) -> Result<()> {
        let filter = doc! { "_id": uid };
        let update = doc! {
            "$set": { "profile": mongodb::bson::to_bson(profile)? },
            "$setOnInsert": {
                "answers": [],
                "credits": 0_i64,
                "created_at": DateTime::now()
            }
        };

        self.accounts
            .update_one(filter, update, Some(Self::upsert()))
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
