// src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("No master password available. Set OTPVAULT_MASTER_PASSWORD, point OTPVAULT_PASSWORD_FILE at a password file, or run interactively.")]
    MissingCredential,
    #[error("Envelope failed to authenticate (wrong master password or corrupted data)")]
    AuthenticationFailure,
    #[error("Encryption failed: {0}")]
    EncryptionFailure(String),
    #[error("Password source error: {0}")]
    PasswordSource(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store document is corrupt: {0}")]
    CorruptStore(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Cryptography error during vault operation: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("Secret is not valid Base32")]
    InvalidSecret,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Cryptography error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("OTP error: {0}")]
    Otp(#[from] OtpError),
    #[error("CLI error: {0}")]
    Cli(String),
}

// Result type aliases for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type CryptoResult<T> = Result<T, CryptoError>;
pub type VaultResult<T> = Result<T, VaultError>;
pub type OtpResult<T> = Result<T, OtpError>;
