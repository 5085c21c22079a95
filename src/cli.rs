// src/cli.rs
use crate::config::Config;
use crate::crypto::CipherEngine;
use crate::display::{self, TerminalRenderer};
use crate::error::{AppError, AppResult};
use crate::models::AccountUpdate;
use crate::totp::{self, RefreshLoop};
use crate::vault::CredentialVault;

use clap::{Parser, Subcommand};
use log;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A personal vault for TOTP secrets, encrypted under a master password.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the store document (overrides the configured location)
    #[clap(short, long, value_parser, global = true)]
    pub file: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add an account
    Add {
        /// Device the secret was provisioned on
        #[clap(long, default_value = "")]
        device_name: String,
        /// Account name (usually an e-mail address)
        #[clap(long)]
        account_name: String,
        /// Issuer of the secret
        #[clap(long, default_value = "")]
        issuer: String,
        /// Base32 secret; prompted for when omitted
        #[clap(long)]
        secret: Option<String>,
    },
    /// Show codes for one account or for all accounts, refreshing in place
    Show {
        /// Account ID
        account_id: Option<String>,
        /// Show every account
        #[clap(long)]
        all: bool,
        /// Print the codes once instead of refreshing
        #[clap(long)]
        once: bool,
    },
    /// List all accounts (secrets are never shown)
    List,
    /// Search accounts by keyword
    Search {
        /// Case-insensitive keyword matched against device, account and issuer
        keyword: String,
    },
    /// Update an account's mutable fields
    Update {
        /// Account ID
        account_id: String,
        /// New account name
        #[clap(long)]
        name: Option<String>,
        /// New issuer
        #[clap(long)]
        issuer: Option<String>,
        /// New device name
        #[clap(long)]
        device: Option<String>,
    },
    /// Delete an account
    Delete {
        /// Account ID
        account_id: String,
        /// Skip the confirmation prompt
        #[clap(short, long)]
        yes: bool,
    },
    /// Show the store location and account count
    Status,
    /// Copy the store document to a backup file
    Backup {
        /// Backup destination
        path: PathBuf,
    },
    /// Replace the store document from a backup file
    Restore {
        /// Backup to restore from
        path: PathBuf,
    },
}

fn parse_account_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Cli(format!("Invalid account ID: {}", raw)))
}

fn open_vault(cli_file: Option<PathBuf>, config: &Config) -> AppResult<CredentialVault> {
    let path = cli_file.unwrap_or_else(|| config.resolved_store_path());
    let engine = CipherEngine::new(None)?;
    let vault = CredentialVault::open(path, engine)?;
    if let Some(report) = vault.corruption() {
        log::error!("Store loaded with corruption: {}", report);
        eprintln!("Warning: {}", report);
        eprintln!("Continuing with an empty account list; the file on disk was not modified.");
    }
    Ok(vault)
}

/// Handles the parsed CLI command.
pub fn handle_cli_command(cli: Cli, config: &Config) -> AppResult<()> {
    log::debug!("Handling CLI command: {:?}", cli.command);
    let mut vault = open_vault(cli.file, config)?;

    match cli.command {
        Commands::Add {
            device_name,
            account_name,
            issuer,
            secret,
        } => {
            let secret = match secret {
                Some(s) => s,
                None => rpassword::prompt_password("Enter Base32 secret: ").map_err(|e| {
                    log::error!("Failed to read secret from prompt: {}", e);
                    AppError::Cli(format!("Failed to read secret: {}", e))
                })?,
            };
            if !totp::validate_secret(&secret) {
                log::warn!("Rejected add for '{}': secret is not valid Base32", account_name);
                return Err(AppError::Cli(
                    "The secret is not valid Base32.".to_string(),
                ));
            }
            let id = vault.add_account(&device_name, &account_name, &issuer, &secret)?;
            println!("Added account: {}", account_name);
            println!("Account ID: {}", id);
        }
        Commands::Show {
            account_id,
            all,
            once,
        } => {
            let records = if all {
                vault.get_all_accounts()?
            } else if let Some(raw) = account_id {
                let id = parse_account_id(&raw)?;
                match vault.get_account(id)? {
                    Some(record) => vec![record],
                    None => {
                        return Err(AppError::Cli(format!("Account not found: {}", id)));
                    }
                }
            } else {
                return Err(AppError::Cli(
                    "Specify an account ID or use --all.".to_string(),
                ));
            };

            if records.is_empty() {
                println!("No accounts registered.");
                return Ok(());
            }

            if once {
                let now = totp::epoch_seconds();
                for entry in totp::generate_many(&records, now) {
                    println!(
                        "{}  {}  ({}s left)",
                        entry.code, entry.account_name, entry.remaining_seconds
                    );
                }
                return Ok(());
            }

            let renderer = Arc::new(TerminalRenderer::new(config.progress_bar_length));
            let mut refresh = RefreshLoop::new();
            refresh.start(
                records,
                renderer,
                Duration::from_secs(config.refresh_interval_seconds.max(1)),
            );

            // The worker repaints the screen; block here until the user
            // presses Enter, then stop it cleanly.
            let mut line = String::new();
            let _ = io::stdin().read_line(&mut line);
            refresh.stop();
        }
        Commands::List => {
            let accounts = vault.list_accounts();
            if accounts.is_empty() {
                println!("No accounts registered.");
            } else {
                println!("Registered accounts ({}):", accounts.len());
                display::print_account_table(&accounts);
            }
        }
        Commands::Search { keyword } => {
            let matches = vault.search_accounts(&keyword);
            if matches.is_empty() {
                println!("No accounts match '{}'.", keyword);
            } else {
                println!("Search results ({}):", matches.len());
                display::print_account_table(&matches);
            }
        }
        Commands::Update {
            account_id,
            name,
            issuer,
            device,
        } => {
            let id = parse_account_id(&account_id)?;
            let update = AccountUpdate {
                account_name: name,
                issuer,
                device_name: device,
            };
            if update.is_empty() {
                return Err(AppError::Cli(
                    "Nothing to update: pass --name, --issuer or --device.".to_string(),
                ));
            }
            if vault.update_account(id, update)? {
                println!("Account updated.");
            } else {
                println!("Account not found: {}", id);
            }
        }
        Commands::Delete { account_id, yes } => {
            let id = parse_account_id(&account_id)?;
            let Some(record) = vault.get_account(id)? else {
                println!("Account not found: {}", id);
                return Ok(());
            };

            if !yes {
                print!("Delete account '{}'? (y/N): ", record.account_name);
                io::stdout().flush().map_err(|e| {
                    log::error!("Failed to flush stdout for delete confirmation: {}", e);
                    AppError::Cli(format!("Failed to flush stdout: {}", e))
                })?;
                let mut confirmation = String::new();
                io::stdin().read_line(&mut confirmation).map_err(|e| {
                    log::error!("Failed to read delete confirmation: {}", e);
                    AppError::Cli(format!("Failed to read confirmation: {}", e))
                })?;
                if confirmation.trim().to_lowercase() != "y" {
                    println!("Deletion cancelled.");
                    log::info!("Deletion of {} cancelled by user", id);
                    return Ok(());
                }
            }

            if vault.delete_account(id)? {
                println!("Account deleted.");
            } else {
                println!("Account not found: {}", id);
            }
        }
        Commands::Status => {
            println!("Store:    {:?}", vault.path());
            println!("Accounts: {}", vault.account_count());
            if vault.corruption().is_some() {
                println!("State:    store document failed to parse, running empty");
            }
        }
        Commands::Backup { path } => {
            vault.backup(&path)?;
            println!("Backed up store to {:?}.", path);
        }
        Commands::Restore { path } => {
            vault.restore(&path)?;
            println!(
                "Restored {} account(s) from {:?}.",
                vault.account_count(),
                path
            );
        }
    }
    Ok(())
}
