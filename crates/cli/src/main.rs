// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ollamometer CLI entry point.

use colored::Colorize;

#[tokio::main]
async fn main() {
    if let Err(e) = ollamometer_cli::run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
