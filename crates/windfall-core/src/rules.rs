//! Operator rule filter
//!
//! Pure function of (email metadata, extracted candidate, current RuleSet).
//! Checks run in a fixed order and the first failing check short-circuits:
//! sender allowlist, deny keywords, require keywords, max-amount ceiling.

use crate::ai::ExtractedTransaction;
use crate::models::{EmailMessage, RuleDecision, RuleSet};

/// Evaluate the rule set against one candidate
///
/// A disabled rule set always passes with `auto_approve = false`. When all
/// checks pass, `auto_approve` is true iff a positive auto-approve ceiling is
/// configured and the amount is at or below it.
pub fn evaluate(
    rules: &RuleSet,
    email: &EmailMessage,
    candidate: &ExtractedTransaction,
) -> RuleDecision {
    if !rules.enabled {
        return RuleDecision {
            pass: true,
            reason: "Rules disabled".to_string(),
            auto_approve: false,
        };
    }

    // Sender allowlist: if non-empty, either the extracted sender or the
    // email's from header must match an entry
    if !rules.sender_whitelist.is_empty() {
        let sender = candidate.sender_name.to_lowercase();
        let from = email.from.to_lowercase();
        let matched = rules.sender_whitelist.iter().find(|entry| {
            let entry = entry.to_lowercase();
            sender.contains(&entry) || from.contains(&entry)
        });

        match matched {
            Some(entry) => {
                // Fall through to the remaining checks
                tracing::debug!(entry = %entry, "Sender allowlist matched");
            }
            None => {
                return RuleDecision {
                    pass: false,
                    reason: format!("Sender '{}' not in allowlist", candidate.sender_name),
                    auto_approve: false,
                };
            }
        }
    }

    let haystack = format!("{}\n{}", email.subject, email.body).to_lowercase();

    // Deny keywords over subject + body
    for keyword in &rules.must_not_contain_keywords {
        if !keyword.is_empty() && haystack.contains(&keyword.to_lowercase()) {
            return RuleDecision {
                pass: false,
                reason: format!("Denied keyword '{}' present", keyword),
                auto_approve: false,
            };
        }
    }

    // Require keywords: at least one must appear when the list is non-empty
    if !rules.must_contain_keywords.is_empty() {
        let found = rules
            .must_contain_keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && haystack.contains(&keyword.to_lowercase()));
        if !found {
            return RuleDecision {
                pass: false,
                reason: "No required keyword present".to_string(),
                auto_approve: false,
            };
        }
    }

    // Max-amount ceiling; 0 disables
    if rules.amount_max_threshold > 0.0 && candidate.amount > rules.amount_max_threshold {
        return RuleDecision {
            pass: false,
            reason: format!(
                "Amount {:.2} exceeds threshold {:.2}",
                candidate.amount, rules.amount_max_threshold
            ),
            auto_approve: false,
        };
    }

    let auto_approve = rules.amount_auto_approve_threshold > 0.0
        && candidate.amount <= rules.amount_auto_approve_threshold;

    RuleDecision {
        pass: true,
        reason: "All rules passed".to_string(),
        auto_approve,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(subject: &str, from: &str, body: &str) -> EmailMessage {
        EmailMessage {
            id: "msg-1".to_string(),
            subject: subject.to_string(),
            from: from.to_string(),
            body: body.to_string(),
            received_at: None,
        }
    }

    fn candidate(amount: f64, sender: &str) -> ExtractedTransaction {
        ExtractedTransaction {
            amount,
            sender_name: sender.to_string(),
            confidence: 85,
            ..Default::default()
        }
    }

    fn bank_email() -> EmailMessage {
        email(
            "You received money",
            "alerts@bank.example",
            "You received $75.00 from Jane Doe",
        )
    }

    #[test]
    fn test_disabled_rules_always_pass() {
        let rules = RuleSet {
            enabled: false,
            sender_whitelist: vec!["nobody".to_string()],
            amount_max_threshold: 1.0,
            ..Default::default()
        };
        let decision = evaluate(&rules, &bank_email(), &candidate(9999.0, "Stranger"));
        assert!(decision.pass);
        assert!(!decision.auto_approve);
    }

    #[test]
    fn test_sender_allowlist_blocks_unknown_sender() {
        let rules = RuleSet {
            sender_whitelist: vec!["acme".to_string()],
            ..Default::default()
        };
        let decision = evaluate(&rules, &bank_email(), &candidate(75.0, "Jane Doe"));
        assert!(!decision.pass);
        assert!(decision.reason.contains("allowlist"));
    }

    #[test]
    fn test_sender_allowlist_matches_case_insensitively() {
        let rules = RuleSet {
            sender_whitelist: vec!["jane".to_string()],
            ..Default::default()
        };
        let decision = evaluate(&rules, &bank_email(), &candidate(75.0, "Jane Doe"));
        assert!(decision.pass);
    }

    #[test]
    fn test_deny_keyword_blocks() {
        let rules = RuleSet {
            must_not_contain_keywords: vec!["refund".to_string()],
            ..Default::default()
        };
        let mail = email(
            "Refund issued",
            "alerts@bank.example",
            "A refund of $10 was issued",
        );
        let decision = evaluate(&rules, &mail, &candidate(10.0, "Bank"));
        assert!(!decision.pass);
        assert!(decision.reason.contains("refund"));
    }

    #[test]
    fn test_require_keyword_missing_blocks() {
        let rules = RuleSet {
            must_contain_keywords: vec!["received".to_string()],
            ..Default::default()
        };
        let mail = email("Statement ready", "alerts@bank.example", "Monthly statement");
        let decision = evaluate(&rules, &mail, &candidate(50.0, "Bank"));
        assert!(!decision.pass);
    }

    #[test]
    fn test_require_keyword_any_of_passes() {
        let rules = RuleSet {
            must_contain_keywords: vec!["deposit".to_string(), "received".to_string()],
            ..Default::default()
        };
        let decision = evaluate(&rules, &bank_email(), &candidate(75.0, "Jane Doe"));
        assert!(decision.pass);
    }

    #[test]
    fn test_amount_ceiling_boundary() {
        let rules = RuleSet {
            amount_max_threshold: 500.0,
            ..Default::default()
        };

        let over = evaluate(&rules, &bank_email(), &candidate(501.0, "Jane Doe"));
        assert!(!over.pass);
        assert!(over.reason.contains("500"));

        let at = evaluate(&rules, &bank_email(), &candidate(500.0, "Jane Doe"));
        assert!(at.pass);
    }

    #[test]
    fn test_auto_approve_under_ceiling() {
        let rules = RuleSet {
            amount_auto_approve_threshold: 100.0,
            ..Default::default()
        };

        let small = evaluate(&rules, &bank_email(), &candidate(75.0, "Jane Doe"));
        assert!(small.pass);
        assert!(small.auto_approve);

        let large = evaluate(&rules, &bank_email(), &candidate(150.0, "Jane Doe"));
        assert!(large.pass);
        assert!(!large.auto_approve);
    }

    #[test]
    fn test_auto_approve_disabled_when_unset() {
        let rules = RuleSet::default();
        let decision = evaluate(&rules, &bank_email(), &candidate(1.0, "Jane Doe"));
        assert!(decision.pass);
        assert!(!decision.auto_approve);
    }

    #[test]
    fn test_deny_beats_require_order() {
        // Deny scan runs before the require scan, so the deny reason wins
        let rules = RuleSet {
            must_contain_keywords: vec!["nothing-here".to_string()],
            must_not_contain_keywords: vec!["received".to_string()],
            ..Default::default()
        };
        let decision = evaluate(&rules, &bank_email(), &candidate(75.0, "Jane Doe"));
        assert!(!decision.pass);
        assert!(decision.reason.contains("Denied keyword"));
    }
}
