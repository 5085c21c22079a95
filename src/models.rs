// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account with its secret in the clear. Only ever lives in memory;
/// the persisted shape is `PersistedRecord`.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: Uuid,
    pub device_name: String,
    pub account_name: String,
    pub issuer: String,
    /// Base32-encoded shared key. Sensitive.
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn new(device_name: String, account_name: String, issuer: String, secret: String) -> Self {
        let now = Utc::now();
        AccountRecord {
            id: Uuid::new_v4(),
            device_name,
            account_name,
            issuer,
            secret,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            device_name: self.device_name.clone(),
            account_name: self.account_name.clone(),
            issuer: self.issuer.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// On-disk projection of an account: identical fields except the secret is
/// replaced by `secret_envelope`, the Base64 text of an encryption envelope.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PersistedRecord {
    pub id: Uuid,
    pub device_name: String,
    pub account_name: String,
    pub issuer: String,
    pub secret_envelope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            device_name: self.device_name.clone(),
            account_name: self.account_name.clone(),
            issuer: self.issuer.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Record projection handed out by list/search flows. The secret field does
/// not exist in this type, so it cannot leak through those paths.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub id: Uuid,
    pub device_name: String,
    pub account_name: String,
    pub issuer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for `update_account`. Only these three fields are mutable;
/// anything else is a compile-time impossibility rather than a silently
/// ignored key.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub account_name: Option<String>,
    pub issuer: Option<String>,
    pub device_name: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.account_name.is_none() && self.issuer.is_none() && self.device_name.is_none()
    }
}

/// The whole persisted document. Insertion order of `accounts` is preserved
/// across load/save cycles and drives list/search ordering.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct StoreDocument {
    pub accounts: Vec<PersistedRecord>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_equal_timestamps() {
        let record = AccountRecord::new(
            "Pixel 8".to_string(),
            "alice@example.com".to_string(),
            "Example".to_string(),
            "JBSWY3DPEHPK3PXP".to_string(),
        );
        assert_eq!(record.created_at, record.updated_at);
        assert!(!record.id.is_nil());
    }

    #[test]
    fn test_summary_carries_no_secret() {
        let record = AccountRecord::new(
            "Pixel 8".to_string(),
            "alice@example.com".to_string(),
            "Example".to_string(),
            "JBSWY3DPEHPK3PXP".to_string(),
        );
        let summary = record.summary();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn test_account_update_is_empty() {
        assert!(AccountUpdate::default().is_empty());
        let update = AccountUpdate {
            issuer: Some("GitHub".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
