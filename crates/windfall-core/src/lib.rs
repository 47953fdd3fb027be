//! Windfall Core Library
//!
//! Shared functionality for the Windfall topup reconciliation pipeline:
//! - Database access and migrations (encrypted SQLite)
//! - Pluggable completion-service backends for email extraction
//! - Extraction policy (input bounds, confidence floor)
//! - Operator rule filter
//! - Four-layer dedup engine
//! - Pending-topup state machine and approval engine
//! - External collaborator seams: mailbox, approval board, wallet ledger

pub mod ai;
pub mod approval;
pub mod board;
pub mod db;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod mailbox;
pub mod models;
pub mod pipeline;
pub mod rules;
pub mod wallet;

pub use ai::{ExtractedTransaction, ExtractorBackend, ExtractorClient, MockBackend};
pub use approval::{
    classify_label, parse_status_label, ApprovalEngine, ApprovalOutcome, StatusLabel, BOARD_ACTOR,
    RULES_ACTOR,
};
pub use board::{BoardBackend, BoardClient, BoardColumnMap, BoardItemRef, MockBoard, MondayBoard};
pub use db::Database;
pub use dedup::DedupEngine;
pub use error::{Error, Result};
pub use extract::{ExtractPolicy, ExtractionOutcome, SkipReason};
pub use mailbox::{GmailClient, MailboxBackend, MailboxClient, MockMailbox};
pub use pipeline::{EmailOutcome, IngestPipeline, PipelineConfig, ScanSummary};
pub use wallet::{DepositRequest, HttpWallet, MockWallet, WalletClient, WalletLedger};
