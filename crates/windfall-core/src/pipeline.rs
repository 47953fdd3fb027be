//! Ingestion pipeline
//!
//! Orchestrates one email through extraction, the rule filter, the dedup
//! engine, pending-topup creation, and the best-effort board mirror. Every
//! examined email id ends with a ProcessedEmail marker, which is what makes
//! re-polling idempotent.

use tracing::{info, warn};

use crate::ai::ExtractorClient;
use crate::approval::{ApprovalEngine, RULES_ACTOR};
use crate::board::{BoardBackend, BoardClient};
use crate::db::Database;
use crate::dedup::DedupEngine;
use crate::error::Result;
use crate::extract::{ExtractPolicy, ExtractionOutcome};
use crate::mailbox::{MailboxBackend, MailboxClient};
use crate::models::{
    EmailMessage, NewPendingTopup, ProcessedOutcome, RiskLevel, TopupSource,
};
use crate::rules;
use crate::wallet::WalletClient;

/// Pipeline configuration, passed explicitly rather than read from globals
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extract: ExtractPolicy,
    /// Currency assumed when the extractor does not state one
    pub default_currency: String,
    /// Post the email body + risk breakdown as a board comment
    pub post_board_comment: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extract: ExtractPolicy::default(),
            default_currency: "USD".to_string(),
            post_board_comment: true,
        }
    }
}

/// Per-email pipeline outcome
#[derive(Debug, Clone)]
pub enum EmailOutcome {
    /// A marker already exists for this email id
    AlreadyProcessed,
    /// Not a usable transaction; marked processed-but-skipped
    Skipped { reason: String },
    /// Rule filter rejection; no topup created
    Rejected { reason: String },
    /// Pending topup created
    Created {
        topup_id: i64,
        risk_level: RiskLevel,
        auto_approved: bool,
    },
}

/// Counters for one scan cycle
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScanSummary {
    pub fetched: usize,
    pub created: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub already_processed: usize,
    /// Per-email pipeline errors (logged, never fatal to the cycle)
    pub failed: usize,
}

/// The ingestion pipeline
#[derive(Clone)]
pub struct IngestPipeline {
    db: Database,
    extractor: ExtractorClient,
    board: Option<BoardClient>,
    approval: ApprovalEngine,
    config: PipelineConfig,
}

impl IngestPipeline {
    pub fn new(
        db: Database,
        extractor: ExtractorClient,
        board: Option<BoardClient>,
        wallet: Option<WalletClient>,
        config: PipelineConfig,
    ) -> Self {
        let approval = ApprovalEngine::new(db.clone(), wallet, board.clone());
        Self {
            db,
            extractor,
            board,
            approval,
            config,
        }
    }

    /// Run one email through the full pipeline
    ///
    /// Per-email outcomes are independent; an error here never aborts the
    /// surrounding scan cycle.
    pub async fn process_email(&self, email: &EmailMessage) -> Result<EmailOutcome> {
        if self.db.is_email_processed(&email.id)? {
            return Ok(EmailOutcome::AlreadyProcessed);
        }

        let candidate = match self.config.extract.extract(&self.extractor, email).await? {
            ExtractionOutcome::Candidate(candidate) => candidate,
            ExtractionOutcome::NotATransaction(reason) => {
                let reason = reason.to_string();
                info!(email_id = %email.id, reason = %reason, "Email skipped");
                self.db.mark_email_processed(
                    &email.id,
                    ProcessedOutcome::SkippedNotTransaction,
                    None,
                    Some(&reason),
                )?;
                return Ok(EmailOutcome::Skipped { reason });
            }
        };

        let rule_set = self.db.get_rule_set()?;
        let decision = rules::evaluate(&rule_set, email, &candidate);
        if !decision.pass {
            info!(email_id = %email.id, reason = %decision.reason, "Email rejected by rules");
            self.db.mark_email_processed(
                &email.id,
                ProcessedOutcome::RejectedByRules,
                None,
                Some(&decision.reason),
            )?;
            return Ok(EmailOutcome::Rejected {
                reason: decision.reason,
            });
        }

        let dedup = DedupEngine::new(&self.db).classify(&candidate)?;

        let new = NewPendingTopup {
            amount: candidate.amount,
            currency: candidate
                .currency
                .clone()
                .unwrap_or_else(|| self.config.default_currency.clone()),
            sender_name: candidate.sender_name.clone(),
            bank_reference: candidate.bank_reference.clone(),
            source: TopupSource::Inbox,
            source_email_id: Some(email.id.clone()),
            email_subject: Some(email.subject.clone()),
            email_from: Some(email.from.clone()),
            email_preview: Some(
                self.config
                    .extract
                    .truncate_body(&email.body)
                    .chars()
                    .take(500)
                    .collect(),
            ),
            extracted_json: serde_json::to_string(&candidate).ok(),
            confidence: Some(candidate.confidence),
            risk_level: dedup.risk_level,
            warning_text: dedup.warning_text.clone(),
            warnings: dedup.warnings.clone(),
            matched_items: dedup.matched_items.clone(),
            rule_reason: Some(decision.reason.clone()),
            auto_approve: decision.auto_approve,
        };

        let topup_id = self.db.create_pending_topup(&new)?;
        self.db.mark_email_processed(
            &email.id,
            ProcessedOutcome::CreatedPending,
            Some(topup_id),
            None,
        )?;

        info!(
            email_id = %email.id,
            topup_id,
            amount = candidate.amount,
            risk = %dedup.risk_level,
            "Pending topup created"
        );

        self.mirror_to_board(topup_id, email, &dedup.warnings).await;

        // Auto-approval bypasses board review for low-amount, clear-risk items
        let mut auto_approved = false;
        if decision.auto_approve && dedup.risk_level == RiskLevel::Clear {
            match self.approval.approve(topup_id, RULES_ACTOR).await {
                Ok(_) => auto_approved = true,
                Err(e) => warn!(topup_id, error = %e, "Auto-approval failed"),
            }
        }

        Ok(EmailOutcome::Created {
            topup_id,
            risk_level: dedup.risk_level,
            auto_approved,
        })
    }

    /// Mirror a new topup to the board and persist the linkage
    ///
    /// Best-effort and non-fatal: if the board is unreachable the topup
    /// still exists locally and can be approved through the admin surface.
    async fn mirror_to_board(&self, topup_id: i64, email: &EmailMessage, warnings: &[String]) {
        let board = match self.board {
            Some(ref board) => board,
            None => return,
        };

        let topup = match self.db.get_pending_topup(topup_id) {
            Ok(Some(topup)) => topup,
            Ok(None) => return,
            Err(e) => {
                warn!(topup_id, error = %e, "Topup lookup failed before board mirror");
                return;
            }
        };

        let item = match board.create_item(&topup).await {
            Ok(item) => item,
            Err(e) => {
                warn!(topup_id, error = %e, "Board item creation failed");
                return;
            }
        };

        if let Err(e) = self
            .db
            .create_board_linkage(topup_id, &item.board_id, &item.item_id)
        {
            warn!(topup_id, error = %e, "Board linkage persistence failed");
            return;
        }

        if self.config.post_board_comment {
            let mut comment = format!(
                "From: {}\nSubject: {}\n\n{}",
                email.from, email.subject, email.body
            );
            if !warnings.is_empty() {
                comment.push_str("\n\nRisk breakdown:\n");
                for warning in warnings {
                    comment.push_str(&format!("- {}\n", warning));
                }
            }
            if let Err(e) = board.post_comment(&item.item_id, &comment).await {
                warn!(topup_id, error = %e, "Board comment failed");
            }
        }
    }

    /// Fetch and process one batch of recent inbox messages
    ///
    /// A mailbox transport error propagates (the caller backs off); per-email
    /// errors are counted and logged only. Scan bookkeeping is recorded on
    /// completion so both the poller and manual scans surface it.
    pub async fn run_scan(&self, mailbox: &MailboxClient, limit: i64) -> Result<ScanSummary> {
        let messages = mailbox.fetch_recent(limit).await?;

        let mut summary = ScanSummary {
            fetched: messages.len(),
            ..Default::default()
        };

        for email in &messages {
            match self.process_email(email).await {
                Ok(EmailOutcome::Created { .. }) => summary.created += 1,
                Ok(EmailOutcome::Skipped { .. }) => summary.skipped += 1,
                Ok(EmailOutcome::Rejected { .. }) => summary.rejected += 1,
                Ok(EmailOutcome::AlreadyProcessed) => summary.already_processed += 1,
                Err(e) => {
                    warn!(email_id = %email.id, error = %e, "Email processing failed");
                    summary.failed += 1;
                }
            }
        }

        self.db.record_scan_result(summary.created as i64)?;

        info!(
            fetched = summary.fetched,
            created = summary.created,
            skipped = summary.skipped,
            rejected = summary.rejected,
            already = summary.already_processed,
            failed = summary.failed,
            "Scan cycle complete"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ExtractedTransaction, MockBackend};
    use crate::board::MockBoard;
    use crate::mailbox::MockMailbox;
    use crate::models::{RuleSet, TopupStatus};
    use crate::wallet::MockWallet;

    fn email(id: &str, body: &str) -> EmailMessage {
        EmailMessage {
            id: id.to_string(),
            subject: "You received money".to_string(),
            from: "alerts@bank.example".to_string(),
            body: body.to_string(),
            received_at: None,
        }
    }

    fn pipeline(db: &Database) -> IngestPipeline {
        IngestPipeline::new(
            db.clone(),
            ExtractorClient::mock(),
            None,
            Some(WalletClient::mock()),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ingestion_is_idempotent_per_email_id() {
        let db = Database::in_memory().unwrap();
        let pipeline = pipeline(&db);
        let mail = email("msg-1", "You received $75.00 from Jane Doe, ref TX998.");

        let first = pipeline.process_email(&mail).await.unwrap();
        assert!(matches!(first, EmailOutcome::Created { .. }));

        let second = pipeline.process_email(&mail).await.unwrap();
        assert!(matches!(second, EmailOutcome::AlreadyProcessed));

        assert_eq!(db.count_topups_for_email("msg-1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_never_creates_a_topup() {
        let db = Database::in_memory().unwrap();
        let pipeline = IngestPipeline::new(
            db.clone(),
            ExtractorClient::Mock(MockBackend::with_response(ExtractedTransaction {
                amount: 50.0,
                confidence: 20,
                ..Default::default()
            })),
            None,
            None,
            PipelineConfig::default(),
        );
        let mail = email("msg-low", "whatever");

        let outcome = pipeline.process_email(&mail).await.unwrap();
        assert!(matches!(outcome, EmailOutcome::Skipped { .. }));
        assert_eq!(db.count_topups_for_email("msg-low").unwrap(), 0);
        // Marked processed so re-polling does not re-extract
        assert!(db.is_email_processed("msg-low").unwrap());
    }

    #[tokio::test]
    async fn test_rule_rejection_records_marker_with_reason() {
        let db = Database::in_memory().unwrap();
        db.update_rule_set(&RuleSet {
            amount_max_threshold: 50.0,
            ..Default::default()
        })
        .unwrap();
        let pipeline = pipeline(&db);
        let mail = email("msg-big", "You received $75.00 from Jane Doe, ref TX999.");

        let outcome = pipeline.process_email(&mail).await.unwrap();
        match outcome {
            EmailOutcome::Rejected { reason } => assert!(reason.contains("50")),
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert!(db.is_email_processed("msg-big").unwrap());
        assert_eq!(db.count_topups_for_email("msg-big").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_risk_annotates_but_still_creates() {
        let db = Database::in_memory().unwrap();
        let pipeline = pipeline(&db);

        pipeline
            .process_email(&email("msg-1", "You received $75.00 from Jane Doe, ref TX998."))
            .await
            .unwrap();
        let outcome = pipeline
            .process_email(&email("msg-2", "You received $75.00 from Jane Doe, ref TX998."))
            .await
            .unwrap();

        match outcome {
            EmailOutcome::Created {
                topup_id,
                risk_level,
                ..
            } => {
                assert_eq!(risk_level, RiskLevel::Duplicate);
                let topup = db.get_pending_topup(topup_id).unwrap().unwrap();
                assert_eq!(topup.status, TopupStatus::Pending);
                assert!(!topup.matched_items.is_empty());
                assert!(topup.warning_text.is_some());
            }
            other => panic!("Expected creation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_board_mirror_creates_item_linkage_and_comment() {
        let db = Database::in_memory().unwrap();
        let board = MockBoard::new();
        let pipeline = IngestPipeline::new(
            db.clone(),
            ExtractorClient::mock(),
            Some(BoardClient::Mock(board.clone())),
            None,
            PipelineConfig::default(),
        );

        let outcome = pipeline
            .process_email(&email("msg-1", "You received $75.00 from Jane Doe, ref TX998."))
            .await
            .unwrap();
        let topup_id = match outcome {
            EmailOutcome::Created { topup_id, .. } => topup_id,
            other => panic!("Expected creation, got {:?}", other),
        };

        let items = board.items();
        assert_eq!(items.len(), 1);
        assert!(items[0].1.contains("75.00"));
        assert!(items[0].1.contains("Jane Doe"));

        let linkage = db.get_linkage_for_topup(topup_id).unwrap().unwrap();
        assert_eq!(linkage.board_item_id, items[0].0);

        let comments = board.comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].1.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn test_unreachable_board_does_not_block_ingestion() {
        let db = Database::in_memory().unwrap();
        let pipeline = IngestPipeline::new(
            db.clone(),
            ExtractorClient::mock(),
            Some(BoardClient::Mock(MockBoard::unreachable())),
            None,
            PipelineConfig::default(),
        );

        let outcome = pipeline
            .process_email(&email("msg-1", "You received $75.00 from Jane Doe, ref TX998."))
            .await
            .unwrap();
        let topup_id = match outcome {
            EmailOutcome::Created { topup_id, .. } => topup_id,
            other => panic!("Expected creation, got {:?}", other),
        };

        assert!(db.get_pending_topup(topup_id).unwrap().is_some());
        assert!(db.get_linkage_for_topup(topup_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auto_approve_credits_clear_low_amount_items() {
        let db = Database::in_memory().unwrap();
        db.update_rule_set(&RuleSet {
            amount_auto_approve_threshold: 100.0,
            ..Default::default()
        })
        .unwrap();
        let wallet = MockWallet::new();
        let pipeline = IngestPipeline::new(
            db.clone(),
            ExtractorClient::mock(),
            None,
            Some(WalletClient::Mock(wallet.clone())),
            PipelineConfig::default(),
        );

        let outcome = pipeline
            .process_email(&email("msg-1", "You received $75.00 from Jane Doe, ref TX998."))
            .await
            .unwrap();
        match outcome {
            EmailOutcome::Created {
                topup_id,
                auto_approved,
                ..
            } => {
                assert!(auto_approved);
                let topup = db.get_pending_topup(topup_id).unwrap().unwrap();
                assert_eq!(topup.status, TopupStatus::Approved);
                assert!(topup.credited);
                assert_eq!(topup.reviewed_by.as_deref(), Some(RULES_ACTOR));
            }
            other => panic!("Expected creation, got {:?}", other),
        }
        assert_eq!(wallet.deposits().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_approve_skipped_when_risk_present() {
        let db = Database::in_memory().unwrap();
        db.update_rule_set(&RuleSet {
            amount_auto_approve_threshold: 100.0,
            ..Default::default()
        })
        .unwrap();
        let pipeline = pipeline(&db);

        pipeline
            .process_email(&email("msg-1", "You received $75.00 from Jane Doe, ref TX998."))
            .await
            .unwrap();
        // Second item duplicates the first; risk forbids the bypass
        let outcome = pipeline
            .process_email(&email("msg-2", "You received $75.00 from Jane Doe, ref TX998."))
            .await
            .unwrap();
        match outcome {
            EmailOutcome::Created {
                topup_id,
                auto_approved,
                ..
            } => {
                assert!(!auto_approved);
                let topup = db.get_pending_topup(topup_id).unwrap().unwrap();
                assert_eq!(topup.status, TopupStatus::Pending);
            }
            other => panic!("Expected creation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scan_cycle_counts_and_bookkeeping() {
        let db = Database::in_memory().unwrap();
        let pipeline = pipeline(&db);
        let mailbox = MockMailbox::new();
        mailbox.push(email("msg-1", "You received $75.00 from Jane Doe, ref TX998."));
        mailbox.push(email("msg-2", "Weekly newsletter, no money here"));
        let mailbox = MailboxClient::Mock(mailbox);

        let summary = pipeline.run_scan(&mailbox, 10).await.unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);

        let settings = db.get_poller_settings().unwrap();
        assert!(settings.last_auto_scan.is_some());
        assert_eq!(settings.last_scan_created, 1);

        // Re-running the same batch creates nothing new
        let summary = pipeline.run_scan(&mailbox, 10).await.unwrap();
        assert_eq!(summary.created, 0);
        assert_eq!(summary.already_processed, 2);
    }

    #[tokio::test]
    async fn test_unreachable_mailbox_propagates_for_backoff() {
        let db = Database::in_memory().unwrap();
        let pipeline = pipeline(&db);
        let mailbox = MailboxClient::Mock(MockMailbox::unreachable());

        assert!(pipeline.run_scan(&mailbox, 10).await.is_err());
    }
}
