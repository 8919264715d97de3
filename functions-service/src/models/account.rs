use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// One document per end user, keyed by uid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub uid: String,
    /// Completion history. Set-union semantics: identical texts are stored once.
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub credits: i64,
    /// Checkout sessions whose payment already produced credits.
    #[serde(default)]
    pub credited_sessions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<AccountProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Account {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            created_at: Some(DateTime::now()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Result of an idempotent credit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditGrant {
    Granted,
    /// The session was credited by an earlier delivery.
    AlreadyGranted,
}
