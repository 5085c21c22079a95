// src/display.rs
use crate::models::AccountSummary;
use crate::totp::{CodeEntry, CodeRenderer, PERIOD_SECONDS};

use chrono::Local;
use std::io::{self, Write};

pub const DEFAULT_BAR_LENGTH: usize = 20;

/// Builds a textual progress indicator for one code window:
/// `floor(bar_length * elapsed / period)` filled segments.
pub fn progress_bar(remaining_seconds: u64, bar_length: usize) -> String {
    let remaining = remaining_seconds.min(PERIOD_SECONDS);
    let elapsed = PERIOD_SECONDS - remaining;
    let filled = (bar_length as u64 * elapsed / PERIOD_SECONDS) as usize;
    let mut bar = String::with_capacity(bar_length * 3 + 2);
    bar.push('[');
    for _ in 0..filled {
        bar.push('█');
    }
    for _ in filled..bar_length {
        bar.push('░');
    }
    bar.push(']');
    bar
}

/// Terminal implementation of the refresh loop's display collaborator:
/// clears the screen and prints every code with its countdown bar.
pub struct TerminalRenderer {
    bar_length: usize,
}

impl TerminalRenderer {
    pub fn new(bar_length: usize) -> Self {
        TerminalRenderer { bar_length }
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        TerminalRenderer::new(DEFAULT_BAR_LENGTH)
    }
}

impl CodeRenderer for TerminalRenderer {
    fn render(&self, entries: &[CodeEntry]) {
        let mut out = String::new();
        // ANSI clear-screen plus cursor home, so each tick repaints in place.
        out.push_str("\x1b[2J\x1b[1;1H");
        out.push_str(&"=".repeat(60));
        out.push('\n');
        out.push_str("One-Time Passwords\n");
        out.push_str(&"=".repeat(60));
        out.push('\n');
        out.push_str(&format!(
            "Updated: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&"-".repeat(60));
        out.push('\n');

        if entries.is_empty() {
            out.push_str("No accounts with a usable secret.\n");
        } else {
            for entry in entries {
                out.push_str(&format!("Account: {}\n", entry.account_name));
                out.push_str(&format!("Code:    {}\n", entry.code));
                out.push_str(&format!(
                    "Expires: {:>2}s {}\n",
                    entry.remaining_seconds,
                    progress_bar(entry.remaining_seconds, self.bar_length)
                ));
                out.push_str(&"-".repeat(60));
                out.push('\n');
            }
        }

        out.push_str("\nPress Enter to stop.\n");
        print!("{}", out);
        let _ = io::stdout().flush();
    }
}

/// Prints account summaries as an aligned table, column widths sized to the
/// longest value. Used by the list and search commands.
pub fn print_account_table(accounts: &[AccountSummary]) {
    if accounts.is_empty() {
        return;
    }

    let id_width = accounts
        .iter()
        .map(|a| a.id.to_string().len())
        .max()
        .unwrap_or(0)
        .max(2);
    let name_width = accounts
        .iter()
        .map(|a| a.account_name.len())
        .max()
        .unwrap_or(0)
        .max("Account Name".len());
    let issuer_width = accounts
        .iter()
        .map(|a| a.issuer.len())
        .max()
        .unwrap_or(0)
        .max("Issuer".len());
    let created_width = 19; // "YYYY-MM-DD HH:MM:SS"

    let total = id_width + name_width + issuer_width + created_width + 9;
    println!("{}", "-".repeat(total));
    println!(
        "{:<id$}   {:<name$}   {:<issuer$}   {:<created$}",
        "ID",
        "Account Name",
        "Issuer",
        "Created",
        id = id_width,
        name = name_width,
        issuer = issuer_width,
        created = created_width,
    );
    println!("{}", "-".repeat(total));
    for account in accounts {
        println!(
            "{:<id$}   {:<name$}   {:<issuer$}   {:<created$}",
            account.id.to_string(),
            account.account_name,
            account.issuer,
            account.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            id = id_width,
            name = name_width,
            issuer = issuer_width,
            created = created_width,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_fill_levels() {
        // Fresh window: nothing elapsed yet.
        assert_eq!(progress_bar(30, 20), format!("[{}]", "░".repeat(20)));
        // Half the window gone.
        assert_eq!(
            progress_bar(15, 20),
            format!("[{}{}]", "█".repeat(10), "░".repeat(10))
        );
        // One second left: floor(20 * 29 / 30) = 19 filled segments.
        assert_eq!(
            progress_bar(1, 20),
            format!("[{}{}]", "█".repeat(19), "░".repeat(1))
        );
    }

    #[test]
    fn test_progress_bar_respects_length() {
        for len in [1usize, 8, 20, 40] {
            let bar = progress_bar(7, len);
            assert_eq!(bar.chars().count(), len + 2, "bar length {} wrong", len);
        }
    }
}
