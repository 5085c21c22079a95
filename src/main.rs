// src/main.rs
mod cli;
mod config;
mod crypto;
mod display;
mod error;
mod models;
mod totp;
mod vault;

use clap::Parser;

fn main() -> Result<(), error::AppError> {
    env_logger::init();
    log::info!("Starting otpvault-rs");

    let app_config = config::load_config();
    let cli_args = cli::Cli::parse();

    if let Err(e) = cli::handle_cli_command(cli_args, &app_config) {
        log::error!("Application failed: {:#?}", e);
        eprintln!("Error: {}", e);
        return Err(e);
    }

    log::info!("otpvault-rs finished successfully.");
    Ok(())
}
