//! One-shot scan command

use std::path::Path;

use anyhow::{bail, Result};

use windfall_core::ai::ExtractorClient;
use windfall_core::board::BoardClient;
use windfall_core::mailbox::MailboxClient;
use windfall_core::pipeline::{IngestPipeline, PipelineConfig};
use windfall_core::wallet::WalletClient;

use super::open_db;

pub async fn cmd_scan(db_path: &Path, limit: Option<i64>, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let Some(extractor) = ExtractorClient::from_env() else {
        bail!("Extractor backend not configured (set OLLAMA_HOST or AI_BACKEND)");
    };
    let Some(mailbox) = MailboxClient::from_env() else {
        bail!("Mailbox not configured (set GMAIL_API_TOKEN)");
    };

    let pipeline = IngestPipeline::new(
        db.clone(),
        extractor,
        BoardClient::from_env(),
        WalletClient::from_env(),
        PipelineConfig::default(),
    );

    let fetch_count = match limit {
        Some(limit) => limit.max(1),
        None => db.get_poller_settings()?.fetch_count,
    };

    println!("Scanning inbox ({} most recent messages)...", fetch_count);
    let summary = pipeline.run_scan(&mailbox, fetch_count).await?;

    println!("Scan complete:");
    println!("  fetched:           {}", summary.fetched);
    println!("  created:           {}", summary.created);
    println!("  skipped:           {}", summary.skipped);
    println!("  rejected by rules: {}", summary.rejected);
    println!("  already processed: {}", summary.already_processed);
    if summary.failed > 0 {
        println!("  failed:            {}", summary.failed);
    }

    Ok(())
}
