//! Balanced-entry gate in front of the ledger.
//!
//! Every model-initiated write funnels through [`PostingGuard::post`].
//! Nothing reaches the ledger repository unless the entry balances within
//! a cent and touches at least two distinct accounts.

pub mod resolve;

use crate::audit::AuditLog;
use crate::error::AgentError;
use crate::models::{
    format_amount, Account, AccountRef, EntryLine, NewJournalEntry, PostedEntry, PostedLine,
    PostingAttempt,
};
use crate::repos::{ChartOfAccounts, LedgerRepository};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Largest tolerated debit/credit difference, in currency units.
pub const BALANCE_EPSILON: f64 = 0.01;

pub struct PostingGuard {
    accounts: Arc<dyn ChartOfAccounts>,
    ledger: Arc<dyn LedgerRepository>,
    audit: Arc<AuditLog>,
}

impl PostingGuard {
    pub fn new(
        accounts: Arc<dyn ChartOfAccounts>,
        ledger: Arc<dyn LedgerRepository>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            audit,
        }
    }

    /// Resolve, validate, and commit one posting attempt.
    ///
    /// The sequence runs to completion per attempt; a failure at any stage
    /// aborts before the ledger repository is touched.
    pub async fn post(&self, user_id: Uuid, attempt: PostingAttempt) -> Result<PostedEntry> {
        validate_lines(&attempt)?;

        let chart = self.accounts.find_all_accounts(user_id, true).await?;

        let mut resolved: Vec<(Account, f64, f64)> = Vec::with_capacity(attempt.lines.len());
        for line in &attempt.lines {
            let account = match &line.account {
                AccountRef::Id(id) => chart
                    .iter()
                    .find(|account| account.id == *id)
                    .ok_or_else(|| {
                        AgentError::ResolutionError(format!(
                            "account {} is not in this user's chart",
                            id
                        ))
                    })?,
                AccountRef::Lookup {
                    query,
                    role,
                    fallback,
                } => resolve::resolve_account(&chart, query, role, fallback.as_ref())?,
            };
            resolved.push((account.clone(), line.debit, line.credit));
        }

        let debit_total: f64 = resolved.iter().map(|(_, debit, _)| debit).sum();
        let credit_total: f64 = resolved.iter().map(|(_, _, credit)| credit).sum();
        if (debit_total - credit_total).abs() > BALANCE_EPSILON {
            return Err(AgentError::InvariantError(format!(
                "entry does not balance: debits {} vs credits {}",
                format_amount(debit_total),
                format_amount(credit_total)
            )));
        }

        let mut distinct: Vec<Uuid> = resolved.iter().map(|(account, ..)| account.id).collect();
        distinct.sort();
        distinct.dedup();
        if distinct.len() < 2 {
            return Err(AgentError::InvariantError(
                "entry must touch at least two distinct accounts".to_string(),
            ));
        }

        let new_entry = NewJournalEntry {
            memo: attempt.memo,
            entry_date: attempt.entry_date,
            lines: resolved
                .iter()
                .map(|(account, debit, credit)| EntryLine {
                    account_id: account.id,
                    debit: *debit,
                    credit: *credit,
                })
                .collect(),
            source: attempt.source,
        };

        let created = self.ledger.create_entry(user_id, new_entry).await?;
        let entry = if attempt.auto_post {
            self.ledger.post_entry(created.id, user_id).await?
        } else {
            created
        };

        // The entry is committed at this point; a missing audit row is a
        // logged gap, not a failed posting.
        if let Err(error) = self.audit.record_posting(user_id, &entry).await {
            warn!(entry_id = ?entry.id, error = %error, "Audit write failed for committed entry");
        }

        info!(
            user_id = ?user_id,
            entry_id = ?entry.id,
            status = %entry.status,
            amount = debit_total,
            "Journal entry accepted"
        );

        Ok(PostedEntry {
            entry_id: entry.id,
            status: entry.status,
            amount: debit_total,
            lines: resolved
                .into_iter()
                .map(|(account, debit, credit)| PostedLine {
                    account_code: account.code,
                    account_name: account.name,
                    debit,
                    credit,
                })
                .collect(),
        })
    }
}

fn validate_lines(attempt: &PostingAttempt) -> Result<()> {
    if attempt.lines.is_empty() {
        return Err(AgentError::ValidationError(
            "a journal entry needs at least one line".to_string(),
        ));
    }

    for (index, line) in attempt.lines.iter().enumerate() {
        if line.debit < 0.0 || line.credit < 0.0 {
            return Err(AgentError::ValidationError(format!(
                "line {} has a negative amount",
                index + 1
            )));
        }
        if line.debit > 0.0 && line.credit > 0.0 {
            return Err(AgentError::ValidationError(format!(
                "line {} cannot carry both a debit and a credit",
                index + 1
            )));
        }
        if line.debit == 0.0 && line.credit == 0.0 {
            return Err(AgentError::ValidationError(format!(
                "line {} has neither a debit nor a credit",
                index + 1
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::MemoryStore;
    use crate::models::{AccountKind, CategoryFallback, EntryStatus, PostingLine};
    use crate::repos::InMemoryBooks;
    use chrono::Utc;

    fn lookup(query: &str, role: &str) -> AccountRef {
        AccountRef::Lookup {
            query: query.to_string(),
            role: role.to_string(),
            fallback: None,
        }
    }

    async fn guard_with_books() -> (PostingGuard, Arc<InMemoryBooks>, Uuid) {
        let books = Arc::new(InMemoryBooks::new());
        let user_id = Uuid::new_v4();
        books.seed_standard_chart(user_id).await;

        let store = Arc::new(MemoryStore::in_memory());
        let audit = Arc::new(AuditLog::new(store));
        let guard = PostingGuard::new(books.clone(), books.clone(), audit);

        (guard, books, user_id)
    }

    fn attempt(lines: Vec<PostingLine>) -> PostingAttempt {
        PostingAttempt {
            memo: "Test entry".to_string(),
            entry_date: Utc::now().date_naive(),
            lines,
            auto_post: true,
            source: None,
        }
    }

    #[tokio::test]
    async fn test_unbalanced_entry_never_reaches_ledger() {
        let (guard, books, user_id) = guard_with_books().await;

        let error = guard
            .post(
                user_id,
                attempt(vec![
                    PostingLine {
                        account: lookup("Cash", "cash"),
                        debit: 100.0,
                        credit: 0.0,
                    },
                    PostingLine {
                        account: lookup("Sales Revenue", "revenue"),
                        debit: 0.0,
                        credit: 99.0,
                    },
                ]),
            )
            .await
            .unwrap_err();

        let message = error.to_string();
        assert!(message.contains("100.00"));
        assert!(message.contains("99.00"));
        assert_eq!(books.ledger_write_count(), 0);
    }

    #[tokio::test]
    async fn test_single_account_entry_rejected() {
        let (guard, books, user_id) = guard_with_books().await;

        let error = guard
            .post(
                user_id,
                attempt(vec![
                    PostingLine {
                        account: lookup("Cash", "cash"),
                        debit: 50.0,
                        credit: 0.0,
                    },
                    PostingLine {
                        account: lookup("1000", "cash"),
                        debit: 0.0,
                        credit: 50.0,
                    },
                ]),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, AgentError::InvariantError(_)));
        assert_eq!(books.ledger_write_count(), 0);
    }

    #[tokio::test]
    async fn test_balanced_sale_posts() {
        let (guard, books, user_id) = guard_with_books().await;

        let posted = guard
            .post(
                user_id,
                attempt(vec![
                    PostingLine {
                        account: AccountRef::Lookup {
                            query: "cash".to_string(),
                            role: "cash".to_string(),
                            fallback: Some(CategoryFallback {
                                kind: AccountKind::Asset,
                                keyword: "cash".to_string(),
                            }),
                        },
                        debit: 100.0,
                        credit: 0.0,
                    },
                    PostingLine {
                        account: lookup("Sales Revenue", "revenue"),
                        debit: 0.0,
                        credit: 100.0,
                    },
                ]),
            )
            .await
            .unwrap();

        assert_eq!(posted.status, EntryStatus::Posted);
        assert_eq!(posted.amount, 100.0);
        let codes: Vec<&str> = posted
            .lines
            .iter()
            .map(|line| line.account_code.as_str())
            .collect();
        assert_eq!(codes, vec!["1000", "4000"]);
        // One create plus one post.
        assert_eq!(books.ledger_write_count(), 2);

        let entry = books.entry(posted.entry_id).await.unwrap();
        assert_eq!(entry.status, EntryStatus::Posted);
        assert_eq!(entry.amount(), 100.0);
    }

    #[tokio::test]
    async fn test_rounding_slack_within_a_cent_passes() {
        let (guard, _books, user_id) = guard_with_books().await;

        let posted = guard
            .post(
                user_id,
                attempt(vec![
                    PostingLine {
                        account: lookup("Cash", "cash"),
                        debit: 100.0,
                        credit: 0.0,
                    },
                    PostingLine {
                        account: lookup("Sales Revenue", "revenue"),
                        debit: 0.0,
                        credit: 100.005,
                    },
                ]),
            )
            .await;

        assert!(posted.is_ok());
    }

    #[tokio::test]
    async fn test_ambiguous_reference_aborts_before_write() {
        let (guard, books, user_id) = guard_with_books().await;

        let error = guard
            .post(
                user_id,
                attempt(vec![
                    PostingLine {
                        account: lookup("Cash", "cash"),
                        debit: 10.0,
                        credit: 0.0,
                    },
                    PostingLine {
                        account: lookup("revenue", "revenue"),
                        debit: 0.0,
                        credit: 10.0,
                    },
                ]),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, AgentError::ResolutionError(_)));
        assert_eq!(books.ledger_write_count(), 0);
    }

    #[tokio::test]
    async fn test_draft_entry_skips_posting() {
        let (guard, books, user_id) = guard_with_books().await;

        let mut draft = attempt(vec![
            PostingLine {
                account: lookup("Rent Expense", "expense"),
                debit: 1_500.0,
                credit: 0.0,
            },
            PostingLine {
                account: lookup("Bank Checking", "bank"),
                debit: 0.0,
                credit: 1_500.0,
            },
        ]);
        draft.auto_post = false;

        let posted = guard.post(user_id, draft).await.unwrap();
        assert_eq!(posted.status, EntryStatus::Draft);
        assert_eq!(books.ledger_write_count(), 1);
    }

    #[test]
    fn test_line_validation() {
        let bad = attempt(vec![PostingLine {
            account: lookup("Cash", "cash"),
            debit: 10.0,
            credit: 10.0,
        }]);
        assert!(matches!(
            validate_lines(&bad),
            Err(AgentError::ValidationError(_))
        ));

        let empty = attempt(vec![]);
        assert!(validate_lines(&empty).is_err());
    }
}
