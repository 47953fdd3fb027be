//! Windfall CLI - bank-email to wallet-credit reconciliation
//!
//! Usage:
//!   windfall init                 Initialize database
//!   windfall serve --port 3000    Start web server + poller
//!   windfall scan                 Run one inbox scan cycle
//!   windfall pending              List staged topups

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
        Commands::Scan { limit } => commands::cmd_scan(&cli.db, limit, cli.no_encrypt).await,
        Commands::Pending { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_pending_list(&db, None, 20),
                Some(PendingAction::List { status, limit }) => {
                    commands::cmd_pending_list(&db, status.as_deref(), limit)
                }
                Some(PendingAction::Show { id }) => commands::cmd_pending_show(&db, id),
                Some(PendingAction::Approve { id }) => {
                    commands::cmd_pending_approve(&db, id).await
                }
                Some(PendingAction::Reject { id, reason }) => {
                    commands::cmd_pending_reject(&db, id, reason.as_deref()).await
                }
                Some(PendingAction::RetryCredit { id }) => {
                    commands::cmd_pending_retry_credit(&db, id).await
                }
            }
        }
        Commands::Rules { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(RulesAction::Show) => commands::cmd_rules_show(&db),
                Some(RulesAction::Set {
                    whitelist,
                    require,
                    deny,
                    max_amount,
                    auto_approve,
                }) => commands::cmd_rules_set(
                    &db,
                    whitelist.as_deref(),
                    require.as_deref(),
                    deny.as_deref(),
                    max_amount,
                    auto_approve,
                ),
                Some(RulesAction::Enable) => commands::cmd_rules_enabled(&db, true),
                Some(RulesAction::Disable) => commands::cmd_rules_enabled(&db, false),
            }
        }
        Commands::Poller { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(PollerAction::Show) => commands::cmd_poller_show(&db),
                Some(PollerAction::Enable) => commands::cmd_poller_enabled(&db, true),
                Some(PollerAction::Disable) => commands::cmd_poller_enabled(&db, false),
                Some(PollerAction::Interval { minutes }) => {
                    commands::cmd_poller_interval(&db, minutes)
                }
                Some(PollerAction::Mode { mode }) => commands::cmd_poller_mode(&db, &mode),
                Some(PollerAction::FetchCount { count }) => {
                    commands::cmd_poller_fetch_count(&db, count)
                }
            }
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, limit)
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt).await,
    }
}
