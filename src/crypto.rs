// src/crypto.rs
use crate::error::{CryptoError, CryptoResult};
use log;

use chacha20poly1305::{
    aead::{Aead, NewAead},
    ChaCha20Poly1305, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::env;
use std::fs;
use std::io::IsTerminal;

/// PBKDF2-HMAC-SHA256 iteration count. Fixed; changing it invalidates
/// every existing envelope.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Environment variable holding the master password directly.
pub const PASSWORD_ENV: &str = "OTPVAULT_MASTER_PASSWORD";
/// Environment variable naming a file to read the master password from.
pub const PASSWORD_FILE_ENV: &str = "OTPVAULT_PASSWORD_FILE";

/// Password-based envelope encryption for opaque byte strings.
///
/// Every `encrypt` call draws a fresh random salt and nonce, so two
/// envelopes of the same plaintext under the same password never match.
/// Envelope layout: `salt (16) || nonce (12) || ciphertext+tag`.
pub struct CipherEngine {
    master_password: String,
}

impl CipherEngine {
    /// Builds an engine from an explicit password, or resolves one from the
    /// environment when `password` is `None`. Resolution order: direct env
    /// variable, password file env variable, interactive prompt (only when
    /// stdin is a terminal). Fails with `MissingCredential` if nothing
    /// yields a non-empty password.
    pub fn new(password: Option<String>) -> CryptoResult<Self> {
        let master_password = match password {
            Some(p) if !p.is_empty() => p,
            _ => resolve_master_password()?,
        };
        Ok(CipherEngine { master_password })
    }

    /// Derives a 32-byte key from the master password and `salt` using
    /// PBKDF2-HMAC-SHA256. Deterministic for identical inputs.
    pub fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(
            self.master_password.as_bytes(),
            salt,
            PBKDF2_ITERATIONS,
            &mut key,
        );
        key
    }

    /// Encrypts `plaintext` into a fresh envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(&salt);
        let cipher = ChaCha20Poly1305::new((&key).into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| {
                let msg = format!("AEAD seal failed: {}", e);
                log::error!("encrypt: {}", msg);
                CryptoError::EncryptionFailure(msg)
            })?;

        let mut envelope = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Opens an envelope produced by `encrypt`. Any failure mode (envelope
    /// too short, tag mismatch) surfaces as `AuthenticationFailure`; callers
    /// never see partially decrypted data.
    pub fn decrypt(&self, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
        if envelope.len() < SALT_LEN + NONCE_LEN {
            log::warn!(
                "decrypt: envelope too short ({} bytes) to contain salt and nonce",
                envelope.len()
            );
            return Err(CryptoError::AuthenticationFailure);
        }
        let salt = &envelope[..SALT_LEN];
        let nonce_bytes = &envelope[SALT_LEN..SALT_LEN + NONCE_LEN];
        let ciphertext = &envelope[SALT_LEN + NONCE_LEN..];

        let key = self.derive_key(salt);
        let cipher = ChaCha20Poly1305::new((&key).into());
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                // Wrong master password and corrupted data are indistinguishable
                // here; either way the tag check fails.
                log::warn!("decrypt: envelope failed to authenticate");
                CryptoError::AuthenticationFailure
            })
    }
}

/// Resolves the master password from the environment, falling back to an
/// interactive prompt when attached to a terminal.
fn resolve_master_password() -> CryptoResult<String> {
    if let Ok(password) = env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            log::debug!("Master password taken from {}", PASSWORD_ENV);
            return Ok(password);
        }
        log::warn!("{} is set but empty, ignoring", PASSWORD_ENV);
    }

    if let Ok(path) = env::var(PASSWORD_FILE_ENV) {
        if !path.is_empty() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                let msg = format!("Failed to read password file {:?}: {}", path, e);
                log::error!("resolve_master_password: {}", msg);
                CryptoError::PasswordSource(msg)
            })?;
            let password = contents.trim_end_matches(['\r', '\n']).to_string();
            if !password.is_empty() {
                log::debug!("Master password taken from file named by {}", PASSWORD_FILE_ENV);
                return Ok(password);
            }
            log::warn!("Password file {:?} is empty, ignoring", path);
        }
    }

    if std::io::stdin().is_terminal() {
        let password = rpassword::prompt_password("Enter master password: ").map_err(|e| {
            let msg = format!("Failed to read password from prompt: {}", e);
            log::error!("resolve_master_password: {}", msg);
            CryptoError::PasswordSource(msg)
        })?;
        if !password.is_empty() {
            return Ok(password);
        }
        log::warn!("Empty master password entered at prompt");
    }

    log::error!("No usable master password found in environment or prompt");
    Err(CryptoError::MissingCredential)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(password: &str) -> CipherEngine {
        CipherEngine::new(Some(password.to_string())).expect("engine construction failed")
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let e = engine("correct horse battery staple");
        let salt = [7u8; SALT_LEN];

        let key1 = e.derive_key(&salt);
        let key2 = e.derive_key(&salt);
        assert_eq!(key1, key2);

        let other_salt = [8u8; SALT_LEN];
        assert_ne!(e.derive_key(&other_salt), key1);

        let other = engine("different password");
        assert_ne!(other.derive_key(&salt), key1);
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let e = engine("round-trip-password");
        let cases: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"JBSWY3DPEHPK3PXP".to_vec(),
            "日本語のテキストも往復する".as_bytes().to_vec(),
            vec![0xABu8; 10 * 1024],
        ];
        for plaintext in cases {
            let envelope = e.encrypt(&plaintext).expect("encryption failed");
            let decrypted = e.decrypt(&envelope).expect("decryption failed");
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_envelopes_are_never_identical() {
        let e = engine("salt-freshness");
        let plaintext = b"same plaintext";
        let env1 = e.encrypt(plaintext).unwrap();
        let env2 = e.encrypt(plaintext).unwrap();
        assert_ne!(env1, env2, "two envelopes of one plaintext must differ");
    }

    #[test]
    fn test_decrypt_with_wrong_password_fails() {
        let e1 = engine("password-one");
        let e2 = engine("password-two");
        let envelope = e1.encrypt(b"secret material").unwrap();
        match e2.decrypt(&envelope) {
            Err(CryptoError::AuthenticationFailure) => {}
            other => panic!("Expected AuthenticationFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_decrypt_tampered_envelope_fails() {
        let e = engine("tamper-check");
        let mut envelope = e.encrypt(b"secret material").unwrap();
        let last = envelope.len() - 1;
        envelope[last] = !envelope[last];
        assert!(matches!(
            e.decrypt(&envelope),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_decrypt_short_envelope_fails() {
        let e = engine("short-envelope");
        assert!(matches!(
            e.decrypt(b"short"),
            Err(CryptoError::AuthenticationFailure)
        ));
        assert!(matches!(
            e.decrypt(&[]),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_explicit_empty_password_falls_back_to_resolution() {
        // An explicit empty password is not usable; construction must go
        // through environment resolution and fail when nothing is set.
        std::env::remove_var(PASSWORD_ENV);
        std::env::remove_var(PASSWORD_FILE_ENV);
        if std::io::stdin().is_terminal() {
            // Cannot exercise the failure path under an interactive terminal.
            return;
        }
        assert!(matches!(
            CipherEngine::new(Some(String::new())),
            Err(CryptoError::MissingCredential)
        ));
    }
}
