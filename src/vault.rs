// src/vault.rs
use crate::crypto::CipherEngine;
use crate::error::{CryptoError, VaultError, VaultResult};
use crate::models::{AccountRecord, AccountSummary, AccountUpdate, PersistedRecord, StoreDocument};

use chrono::Utc;
use data_encoding::BASE64;
use log;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable, encrypted-at-rest collection of accounts.
///
/// Secrets are encrypted per record through the `CipherEngine`; every other
/// field is stored in the clear. Mutations rewrite the whole document via
/// write-to-temp-then-rename, so a crash mid-write leaves the previous
/// document intact.
///
/// Mutating operations assume single-writer discipline. There is no internal
/// locking: a caller sharing one vault across threads must serialize
/// read-modify-write sequences externally.
pub struct CredentialVault {
    path: PathBuf,
    engine: CipherEngine,
    accounts: Vec<PersistedRecord>,
    corruption: Option<String>,
}

impl CredentialVault {
    /// Opens the vault at `path`, creating an empty persisted document if
    /// none exists. A document that fails to parse is reported through
    /// [`corruption`](Self::corruption) and the vault starts empty in
    /// memory; the unreadable file is left on disk untouched until the
    /// caller requests the next mutation.
    pub fn open(path: impl Into<PathBuf>, engine: CipherEngine) -> VaultResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut vault = CredentialVault {
            path,
            engine,
            accounts: Vec::new(),
            corruption: None,
        };

        if vault.path.exists() {
            let contents = fs::read_to_string(&vault.path)?;
            match serde_json::from_str::<StoreDocument>(&contents) {
                Ok(document) => {
                    log::info!(
                        "Loaded {} account(s) from {:?}",
                        document.accounts.len(),
                        vault.path
                    );
                    vault.accounts = document.accounts;
                }
                Err(e) => {
                    let msg = format!("Failed to parse store document {:?}: {}", vault.path, e);
                    log::error!("open: {}", msg);
                    vault.corruption = Some(msg);
                }
            }
        } else {
            log::info!("No store document at {:?}, creating an empty one", vault.path);
            vault.persist()?;
        }

        Ok(vault)
    }

    /// Reports a parse failure from the last load, if any. A corrupt
    /// document is recoverable (the vault runs empty) but never silent.
    pub fn corruption(&self) -> Option<&str> {
        self.corruption.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a new account and persists the document. Returns the fresh id.
    pub fn add_account(
        &mut self,
        device_name: &str,
        account_name: &str,
        issuer: &str,
        secret: &str,
    ) -> VaultResult<Uuid> {
        let record = AccountRecord::new(
            device_name.to_string(),
            account_name.to_string(),
            issuer.to_string(),
            secret.to_string(),
        );
        let id = record.id;
        let persisted = self.seal(&record)?;
        self.accounts.push(persisted);
        self.persist()?;
        log::info!("Added account '{}' ({})", account_name, id);
        Ok(id)
    }

    /// Looks up one account by id, decrypting its secret. Absence is `None`,
    /// not an error; a decryption failure is an error, never masked as
    /// "not found".
    pub fn get_account(&self, id: Uuid) -> VaultResult<Option<AccountRecord>> {
        for persisted in &self.accounts {
            if persisted.id == id {
                return Ok(Some(self.reveal(persisted)?));
            }
        }
        Ok(None)
    }

    /// Decrypts every account, preserving insertion order.
    pub fn get_all_accounts(&self) -> VaultResult<Vec<AccountRecord>> {
        self.accounts.iter().map(|p| self.reveal(p)).collect()
    }

    /// Safe views of every account, in insertion order. No secret is
    /// materialized on this path.
    pub fn list_accounts(&self) -> Vec<AccountSummary> {
        self.accounts.iter().map(PersistedRecord::summary).collect()
    }

    /// Case-insensitive substring search over device name, account name and
    /// issuer. An empty keyword matches everything; results follow
    /// insertion order.
    pub fn search_accounts(&self, keyword: &str) -> Vec<AccountSummary> {
        let needle = keyword.to_lowercase();
        self.accounts
            .iter()
            .filter(|p| {
                [&p.device_name, &p.account_name, &p.issuer]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .map(|p| p.summary())
            .collect()
    }

    /// Applies a partial update to one account. The secret is re-encrypted
    /// under a freshly drawn salt even though its value is unchanged, and
    /// `updated_at` is bumped. Returns whether the id was found.
    pub fn update_account(&mut self, id: Uuid, update: AccountUpdate) -> VaultResult<bool> {
        let Some(index) = self.accounts.iter().position(|p| p.id == id) else {
            log::warn!("update_account: no account with id {}", id);
            return Ok(false);
        };

        let mut record = self.reveal(&self.accounts[index])?;
        if let Some(account_name) = update.account_name {
            record.account_name = account_name;
        }
        if let Some(issuer) = update.issuer {
            record.issuer = issuer;
        }
        if let Some(device_name) = update.device_name {
            record.device_name = device_name;
        }
        record.updated_at = Utc::now();

        let sealed = self.seal(&record)?;
        self.accounts[index] = sealed;
        self.persist()?;
        log::info!("Updated account {}", id);
        Ok(true)
    }

    /// Removes the account with `id`. Returns whether anything was removed.
    pub fn delete_account(&mut self, id: Uuid) -> VaultResult<bool> {
        let Some(index) = self.accounts.iter().position(|p| p.id == id) else {
            log::warn!("delete_account: no account with id {}", id);
            return Ok(false);
        };
        self.accounts.remove(index);
        self.persist()?;
        log::info!("Deleted account {}", id);
        Ok(true)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Removes every account and persists the now-empty document.
    pub fn clear_all_accounts(&mut self) -> VaultResult<()> {
        self.accounts.clear();
        self.persist()?;
        log::info!("Cleared all accounts");
        Ok(())
    }

    /// Copies the persisted document to `backup_path`.
    pub fn backup(&self, backup_path: &Path) -> VaultResult<()> {
        fs::copy(&self.path, backup_path)?;
        log::info!("Backed up store to {:?}", backup_path);
        Ok(())
    }

    /// Replaces the persisted document with the one at `backup_path` and
    /// reloads the in-memory collection. A backup that fails to parse is
    /// rejected before anything is overwritten.
    pub fn restore(&mut self, backup_path: &Path) -> VaultResult<()> {
        let contents = fs::read_to_string(backup_path)?;
        let document = serde_json::from_str::<StoreDocument>(&contents).map_err(|e| {
            let msg = format!("Backup {:?} is not a valid store document: {}", backup_path, e);
            log::error!("restore: {}", msg);
            VaultError::CorruptStore(msg)
        })?;

        fs::copy(backup_path, &self.path)?;
        self.accounts = document.accounts;
        self.corruption = None;
        log::info!(
            "Restored {} account(s) from {:?}",
            self.accounts.len(),
            backup_path
        );
        Ok(())
    }

    /// Encrypts a record's secret into its persisted projection.
    fn seal(&self, record: &AccountRecord) -> VaultResult<PersistedRecord> {
        let envelope = self.engine.encrypt(record.secret.as_bytes())?;
        Ok(PersistedRecord {
            id: record.id,
            device_name: record.device_name.clone(),
            account_name: record.account_name.clone(),
            issuer: record.issuer.clone(),
            secret_envelope: BASE64.encode(&envelope),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Decrypts a persisted record back into its in-memory shape.
    fn reveal(&self, persisted: &PersistedRecord) -> VaultResult<AccountRecord> {
        let envelope = BASE64
            .decode(persisted.secret_envelope.as_bytes())
            .map_err(|_| {
                log::warn!("reveal: envelope for {} is not valid Base64", persisted.id);
                VaultError::Crypto(CryptoError::AuthenticationFailure)
            })?;
        let plaintext = self.engine.decrypt(&envelope)?;
        let secret = String::from_utf8(plaintext).map_err(|_| {
            log::warn!("reveal: decrypted secret for {} is not UTF-8", persisted.id);
            VaultError::Crypto(CryptoError::AuthenticationFailure)
        })?;
        Ok(AccountRecord {
            id: persisted.id,
            device_name: persisted.device_name.clone(),
            account_name: persisted.account_name.clone(),
            issuer: persisted.issuer.clone(),
            secret,
            created_at: persisted.created_at,
            updated_at: persisted.updated_at,
        })
    }

    /// Rewrites the whole document: serialize, write to a sibling temp file,
    /// rename over the target. On write failure the in-memory state keeps
    /// the mutation; the caller decides whether to retry.
    fn persist(&self) -> VaultResult<()> {
        let document = StoreDocument {
            accounts: self.accounts.clone(),
            last_updated: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|e| {
            let msg = format!("Failed to serialize store document: {}", e);
            log::error!("persist: {}", msg);
            VaultError::Serialization(msg)
        })?;

        let mut tmp_path = self.path.as_os_str().to_owned();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        fs::write(&tmp_path, json.as_bytes()).map_err(|e| {
            log::error!("persist: failed to write {:?}: {}", tmp_path, e);
            VaultError::Io(e)
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            log::error!(
                "persist: failed to rename {:?} over {:?}: {}",
                tmp_path,
                self.path,
                e
            );
            VaultError::Io(e)
        })?;
        log::debug!("Persisted {} account(s) to {:?}", self.accounts.len(), self.path);
        Ok(())
    }
}
