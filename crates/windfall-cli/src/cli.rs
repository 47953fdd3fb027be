//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Windfall - turn bank notification emails into verified wallet credits
#[derive(Parser)]
#[command(name = "windfall")]
#[command(about = "Bank-email to wallet-credit reconciliation pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "windfall.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set WINDFALL_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server (admin API + board webhook + poller)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable API authentication (local development only)
        #[arg(long)]
        no_auth: bool,
    },

    /// Run one inbox scan cycle now
    Scan {
        /// Override how many recent messages to fetch
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Inspect and decide on staged topups
    Pending {
        #[command(subcommand)]
        action: Option<PendingAction>,
    },

    /// Show or edit the ingestion rule set
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Show or edit poller settings
    Poller {
        #[command(subcommand)]
        action: Option<PollerAction>,
    },

    /// Show the webhook audit log
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show pipeline status
    Status,
}

#[derive(Subcommand)]
pub enum PendingAction {
    /// List topups (default)
    List {
        /// Filter by status: pending, approved, rejected
        #[arg(short, long)]
        status: Option<String>,

        /// Number of items to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show one topup in full
    Show { id: i64 },

    /// Approve a pending topup and apply the wallet credit
    Approve { id: i64 },

    /// Reject a pending topup
    Reject {
        id: i64,

        /// Reason recorded on the item
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Retry a failed wallet credit on an approved topup
    RetryCredit { id: i64 },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// Show the current rule set (default)
    Show,

    /// Update rule fields (unset fields are kept)
    Set {
        /// Sender allowlist, comma separated (empty string clears)
        #[arg(long)]
        whitelist: Option<String>,

        /// Required keywords, comma separated (empty string clears)
        #[arg(long)]
        require: Option<String>,

        /// Denied keywords, comma separated (empty string clears)
        #[arg(long)]
        deny: Option<String>,

        /// Maximum accepted amount (0 disables the ceiling)
        #[arg(long)]
        max_amount: Option<f64>,

        /// Auto-approve ceiling (0 disables)
        #[arg(long)]
        auto_approve: Option<f64>,
    },

    /// Enable rule evaluation
    Enable,

    /// Disable rule evaluation (everything passes, nothing auto-approves)
    Disable,
}

#[derive(Subcommand)]
pub enum PollerAction {
    /// Show poller settings (default)
    Show,

    /// Enable automated polling
    Enable,

    /// Disable automated polling
    Disable,

    /// Set the polling interval in minutes
    Interval { minutes: i64 },

    /// Set the polling mode: realtime, manual
    Mode { mode: String },

    /// Set how many recent messages each scan fetches
    FetchCount { count: i64 },
}
