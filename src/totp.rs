// src/totp.rs
use crate::error::{OtpError, OtpResult};
use crate::models::AccountRecord;

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use log;
use sha1::Sha1;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

/// TOTP parameters are fixed for every record: 30-second steps, six digits,
/// HMAC-SHA1 (RFC 6238 defaults).
pub const PERIOD_SECONDS: u64 = 30;
pub const CODE_DIGITS: usize = 6;

/// Upper bound on how long `RefreshLoop::stop` waits for the worker to
/// finish its current iteration.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_POLL: Duration = Duration::from_millis(10);

/// One generated code plus the countdown the display needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEntry {
    pub account_name: String,
    pub code: String,
    pub remaining_seconds: u64,
}

/// Validity report for a secret, with the fixed generation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretInfo {
    pub valid: bool,
    pub algorithm: &'static str,
    pub digits: usize,
    pub period: u64,
}

/// Current Unix time in whole seconds.
pub fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Decodes a Base32 secret, tolerating lowercase, whitespace and `=` padding.
fn decode_secret(secret: &str) -> OtpResult<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect();
    let normalized = normalized.trim_end_matches('=');
    if normalized.is_empty() {
        return Err(OtpError::InvalidSecret);
    }
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|_| OtpError::InvalidSecret)
}

/// True iff `secret` decodes as non-empty Base32.
pub fn validate_secret(secret: &str) -> bool {
    decode_secret(secret).is_ok()
}

/// Reports whether a secret is usable and with which fixed parameters.
pub fn secret_info(secret: &str) -> SecretInfo {
    SecretInfo {
        valid: validate_secret(secret),
        algorithm: "SHA1",
        digits: CODE_DIGITS,
        period: PERIOD_SECONDS,
    }
}

/// Computes the six-digit code for `secret` at `epoch_secs`.
///
/// HOTP construction: counter = epoch_secs / 30 as a big-endian u64,
/// HMAC-SHA1 keyed by the decoded secret, dynamic truncation, modulo 10^6,
/// zero-padded.
pub fn generate_code(secret: &str, epoch_secs: u64) -> OtpResult<String> {
    let key = decode_secret(secret)?;
    let counter = epoch_secs / PERIOD_SECONDS;

    let mut mac = HmacSha1::new_from_slice(&key).map_err(|_| OtpError::InvalidSecret)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = binary % 1_000_000;

    Ok(format!("{:0width$}", code, width = CODE_DIGITS))
}

/// Seconds until the current 30-second window rolls over. Always in [1, 30].
pub fn remaining_seconds(epoch_secs: u64) -> u64 {
    PERIOD_SECONDS - (epoch_secs % PERIOD_SECONDS)
}

/// Generates codes for every record with a decodable secret. Records whose
/// secret fails validation are logged and skipped; the batch never aborts.
pub fn generate_many(records: &[AccountRecord], epoch_secs: u64) -> Vec<CodeEntry> {
    let remaining = remaining_seconds(epoch_secs);
    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        match generate_code(&record.secret, epoch_secs) {
            Ok(code) => entries.push(CodeEntry {
                account_name: record.account_name.clone(),
                code,
                remaining_seconds: remaining,
            }),
            Err(e) => {
                log::warn!(
                    "Skipping account '{}' during code generation: {}",
                    record.account_name,
                    e
                );
            }
        }
    }
    entries
}

/// Display collaborator for the refresh loop. Implementations receive the
/// full code list once per tick.
pub trait CodeRenderer: Send + Sync {
    fn render(&self, entries: &[CodeEntry]);
}

/// Cancellable background worker that recomputes and renders codes once per
/// tick interval.
///
/// The only shared mutable state between controller and worker is the
/// cancellation flag: one writer (the controller) and one reader (the loop),
/// checked before every tick so cancellation latency is bounded by one tick.
pub struct RefreshLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshLoop {
    pub fn new() -> Self {
        RefreshLoop {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Starts the worker. A second start while running keeps the existing
    /// loop untouched.
    pub fn start(
        &mut self,
        records: Vec<AccountRecord>,
        renderer: Arc<dyn CodeRenderer>,
        tick_interval: Duration,
    ) {
        if self.is_running() {
            log::debug!("Refresh loop already running, start is a no-op");
            return;
        }
        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        log::info!(
            "Starting refresh loop for {} account(s), tick interval {:?}",
            records.len(),
            tick_interval
        );
        self.handle = Some(thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                let now = epoch_seconds();
                let entries = generate_many(&records, now);
                renderer.render(&entries);
                thread::sleep(tick_interval);
            }
            log::debug!("Refresh loop worker exiting");
        }));
    }

    /// Signals the worker to stop and waits for its current iteration to
    /// finish, bounded by `STOP_TIMEOUT`. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let deadline = std::time::Instant::now() + STOP_TIMEOUT;
            while !handle.is_finished() && std::time::Instant::now() < deadline {
                thread::sleep(STOP_POLL);
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::error!("Refresh loop worker panicked");
                }
                log::info!("Refresh loop stopped");
            } else {
                // Worker is still inside its sleep or a slow render; it will
                // observe the flag on the next check and exit on its own.
                log::warn!("Refresh loop did not stop within {:?}, detaching", STOP_TIMEOUT);
            }
        }
    }
}

impl Default for RefreshLoop {
    fn default() -> Self {
        RefreshLoop::new()
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // RFC 6238 test secret: Base32 of the ASCII key "12345678901234567890".
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_sha1_vectors() {
        // Six-digit truncations of the RFC 6238 Appendix B SHA-1 vectors.
        let vectors: &[(u64, &str)] = &[
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
            (20_000_000_000, "353130"),
        ];
        for &(t, expected) in vectors {
            let code = generate_code(RFC_SECRET, t).expect("code generation failed");
            assert_eq!(code, expected, "wrong code at t={}", t);
        }
    }

    #[test]
    fn test_code_is_stable_within_a_window() {
        let secret = "JBSWY3DPEHPK3PXP";
        for t in [0u64, 31, 45, 1_700_000_000] {
            assert_eq!(
                t / PERIOD_SECONDS,
                (t + 1) / PERIOD_SECONDS,
                "test fixture must stay inside one window"
            );
            let a = generate_code(secret, t).unwrap();
            let b = generate_code(secret, t + 1).unwrap();
            assert_eq!(a, b, "code changed inside one window at t={}", t);
        }
    }

    #[test]
    fn test_code_shape() {
        let code = generate_code("JBSWY3DPEHPK3PXP", 1_700_000_000).unwrap();
        assert_eq!(code.len(), CODE_DIGITS);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_remaining_seconds_bounds() {
        for t in 0u64..120 {
            let r = remaining_seconds(t);
            assert!((1..=30).contains(&r), "remaining {} out of range at t={}", r, t);
        }
        assert_eq!(remaining_seconds(0), 30);
        assert_eq!(remaining_seconds(29), 1);
        assert_eq!(remaining_seconds(30), 30);
    }

    #[test]
    fn test_validate_secret() {
        assert!(validate_secret("JBSWY3DPEHPK3PXP"));
        assert!(validate_secret("jbswy3dpehpk3pxp"), "lowercase must be accepted");
        assert!(validate_secret("JBSW Y3DP EHPK 3PXP"), "whitespace must be tolerated");
        assert!(validate_secret("MFRGGZDF===="), "padding must be tolerated");
        assert!(!validate_secret(""));
        assert!(!validate_secret("========"));
        assert!(!validate_secret("not!base32"));
        assert!(!validate_secret("1890"), "digits outside the Base32 alphabet");
    }

    #[test]
    fn test_secret_info() {
        let info = secret_info("JBSWY3DPEHPK3PXP");
        assert!(info.valid);
        assert_eq!(info.algorithm, "SHA1");
        assert_eq!(info.digits, 6);
        assert_eq!(info.period, 30);
        assert!(!secret_info("***").valid);
    }

    fn record(name: &str, secret: &str) -> AccountRecord {
        AccountRecord::new(
            "Test Device".to_string(),
            name.to_string(),
            "Test Issuer".to_string(),
            secret.to_string(),
        )
    }

    #[test]
    fn test_generate_many_skips_bad_secrets() {
        let records = vec![
            record("good-one", "JBSWY3DPEHPK3PXP"),
            record("broken", "not!base32"),
            record("good-two", RFC_SECRET),
        ];
        let entries = generate_many(&records, 59);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].account_name, "good-one");
        assert_eq!(entries[1].account_name, "good-two");
        assert_eq!(entries[1].code, "287082");
        assert_eq!(entries[0].remaining_seconds, remaining_seconds(59));
    }

    struct RecordingRenderer {
        renders: Mutex<usize>,
    }

    impl CodeRenderer for RecordingRenderer {
        fn render(&self, _entries: &[CodeEntry]) {
            *self.renders.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_refresh_loop_start_stop() {
        let renderer = Arc::new(RecordingRenderer {
            renders: Mutex::new(0),
        });
        let mut refresh = RefreshLoop::new();
        assert!(!refresh.is_running());

        refresh.start(
            vec![record("acct", "JBSWY3DPEHPK3PXP")],
            renderer.clone(),
            Duration::from_millis(10),
        );
        assert!(refresh.is_running());

        // Starting again while running keeps the existing loop.
        refresh.start(vec![], renderer.clone(), Duration::from_millis(10));
        assert!(refresh.is_running());

        thread::sleep(Duration::from_millis(60));
        refresh.stop();
        assert!(!refresh.is_running());

        let rendered = *renderer.renders.lock().unwrap();
        assert!(rendered >= 1, "worker never rendered");

        // No renders after stop returns.
        thread::sleep(Duration::from_millis(40));
        assert_eq!(*renderer.renders.lock().unwrap(), rendered);

        // stop is idempotent.
        refresh.stop();
    }
}
