//! Write-side tools. Every ledger mutation below goes through the posting
//! guard; nothing here writes directly.

use crate::error::AgentError;
use crate::ledger::PostingGuard;
use crate::models::{
    AccountKind, AccountRef, CategoryFallback, PostingAttempt, PostingLine, ToolInput, ToolOutput,
};
use crate::repos::InvoiceRepository;
use crate::tools::{
    optional_bool, optional_str, parse_entry_date, require_positive_amount, require_str, Tool,
};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

fn cash_ref() -> AccountRef {
    AccountRef::Lookup {
        query: "Cash".to_string(),
        role: "cash".to_string(),
        fallback: Some(CategoryFallback {
            kind: AccountKind::Asset,
            keyword: "cash".to_string(),
        }),
    }
}

fn bank_ref() -> AccountRef {
    AccountRef::Lookup {
        query: "Bank Checking".to_string(),
        role: "bank".to_string(),
        fallback: Some(CategoryFallback {
            kind: AccountKind::Asset,
            keyword: "bank".to_string(),
        }),
    }
}

fn receivable_ref() -> AccountRef {
    AccountRef::Lookup {
        query: "Accounts Receivable".to_string(),
        role: "receivable".to_string(),
        fallback: Some(CategoryFallback {
            kind: AccountKind::Asset,
            keyword: "receivable".to_string(),
        }),
    }
}

fn payable_ref() -> AccountRef {
    AccountRef::Lookup {
        query: "Accounts Payable".to_string(),
        role: "payable".to_string(),
        fallback: Some(CategoryFallback {
            kind: AccountKind::Liability,
            keyword: "payable".to_string(),
        }),
    }
}

fn sales_revenue_ref() -> AccountRef {
    AccountRef::Lookup {
        query: "Sales Revenue".to_string(),
        role: "revenue".to_string(),
        fallback: Some(CategoryFallback {
            kind: AccountKind::Revenue,
            keyword: "sales".to_string(),
        }),
    }
}

fn debit(account: AccountRef, amount: f64) -> PostingLine {
    PostingLine {
        account,
        debit: amount,
        credit: 0.0,
    }
}

fn credit(account: AccountRef, amount: f64) -> PostingLine {
    PostingLine {
        account,
        debit: 0.0,
        credit: amount,
    }
}

//
// ================= record_sale =================
//

pub struct RecordSaleTool {
    posting: Arc<PostingGuard>,
}

impl RecordSaleTool {
    pub fn new(posting: Arc<PostingGuard>) -> Self {
        Self { posting }
    }
}

#[async_trait::async_trait]
impl Tool for RecordSaleTool {
    fn name(&self) -> &'static str {
        "record_sale"
    }

    fn description(&self) -> &'static str {
        "Record a sale: debits cash, bank, or receivables and credits sales revenue"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "description": "Sale amount, must be positive"
                },
                "description": {
                    "type": "string",
                    "description": "What was sold; becomes the entry memo"
                },
                "payment_method": {
                    "type": "string",
                    "enum": ["cash", "bank", "credit"],
                    "description": "How the customer paid; 'credit' books a receivable"
                },
                "date": {
                    "type": "string",
                    "description": "Entry date as YYYY-MM-DD, defaults to today"
                }
            },
            "required": ["amount"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let amount = require_positive_amount(&input.parameters, "amount")?;
        let memo = optional_str(&input.parameters, "description")
            .unwrap_or("Sale")
            .to_string();
        let debit_side = match optional_str(&input.parameters, "payment_method").unwrap_or("cash")
        {
            "cash" => cash_ref(),
            "bank" => bank_ref(),
            "credit" => receivable_ref(),
            other => {
                return Err(AgentError::ValidationError(format!(
                    "'payment_method' must be cash, bank, or credit, got '{}'",
                    other
                )))
            }
        };

        let attempt = PostingAttempt {
            memo,
            entry_date: parse_entry_date(&input.parameters)?,
            lines: vec![
                debit(debit_side, amount),
                credit(sales_revenue_ref(), amount),
            ],
            auto_post: true,
            source: None,
        };

        let entry = self.posting.post(input.user_id, attempt).await?;
        Ok(ToolOutput::ok(json!({ "entry": entry })))
    }
}

//
// ================= record_expense =================
//

pub struct RecordExpenseTool {
    posting: Arc<PostingGuard>,
}

impl RecordExpenseTool {
    pub fn new(posting: Arc<PostingGuard>) -> Self {
        Self { posting }
    }
}

#[async_trait::async_trait]
impl Tool for RecordExpenseTool {
    fn name(&self) -> &'static str {
        "record_expense"
    }

    fn description(&self) -> &'static str {
        "Record an expense against an expense category, paid by cash, bank, or on account"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "description": "Expense amount, must be positive"
                },
                "category": {
                    "type": "string",
                    "description": "Expense account name or keyword, e.g. 'rent' or 'software'"
                },
                "description": {
                    "type": "string",
                    "description": "What was bought; becomes the entry memo"
                },
                "payment_method": {
                    "type": "string",
                    "enum": ["cash", "bank", "credit"],
                    "description": "How it was paid; 'credit' books a payable"
                },
                "date": {
                    "type": "string",
                    "description": "Entry date as YYYY-MM-DD, defaults to today"
                }
            },
            "required": ["amount", "category"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let amount = require_positive_amount(&input.parameters, "amount")?;
        let category = require_str(&input.parameters, "category")?.to_string();
        let memo = optional_str(&input.parameters, "description")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} expense", category));

        let expense_ref = AccountRef::Lookup {
            query: category.clone(),
            role: "expense".to_string(),
            fallback: Some(CategoryFallback {
                kind: AccountKind::Expense,
                keyword: category.to_lowercase(),
            }),
        };
        let credit_side = match optional_str(&input.parameters, "payment_method").unwrap_or("cash")
        {
            "cash" => cash_ref(),
            "bank" => bank_ref(),
            "credit" => payable_ref(),
            other => {
                return Err(AgentError::ValidationError(format!(
                    "'payment_method' must be cash, bank, or credit, got '{}'",
                    other
                )))
            }
        };

        let attempt = PostingAttempt {
            memo,
            entry_date: parse_entry_date(&input.parameters)?,
            lines: vec![debit(expense_ref, amount), credit(credit_side, amount)],
            auto_post: true,
            source: None,
        };

        let entry = self.posting.post(input.user_id, attempt).await?;
        Ok(ToolOutput::ok(json!({ "entry": entry })))
    }
}

//
// ================= record_payment_received =================
//

pub struct RecordPaymentReceivedTool {
    posting: Arc<PostingGuard>,
}

impl RecordPaymentReceivedTool {
    pub fn new(posting: Arc<PostingGuard>) -> Self {
        Self { posting }
    }
}

#[async_trait::async_trait]
impl Tool for RecordPaymentReceivedTool {
    fn name(&self) -> &'static str {
        "record_payment_received"
    }

    fn description(&self) -> &'static str {
        "Record a customer payment against accounts receivable"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "description": "Payment amount, must be positive"
                },
                "customer": {
                    "type": "string",
                    "description": "Who paid; named in the entry memo"
                },
                "deposit_to": {
                    "type": "string",
                    "enum": ["cash", "bank"],
                    "description": "Where the money landed, defaults to bank"
                },
                "date": {
                    "type": "string",
                    "description": "Entry date as YYYY-MM-DD, defaults to today"
                }
            },
            "required": ["amount"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let amount = require_positive_amount(&input.parameters, "amount")?;
        let memo = match optional_str(&input.parameters, "customer") {
            Some(customer) => format!("Payment received from {}", customer),
            None => "Payment received".to_string(),
        };
        let deposit_side = match optional_str(&input.parameters, "deposit_to").unwrap_or("bank") {
            "cash" => cash_ref(),
            "bank" => bank_ref(),
            other => {
                return Err(AgentError::ValidationError(format!(
                    "'deposit_to' must be cash or bank, got '{}'",
                    other
                )))
            }
        };

        let attempt = PostingAttempt {
            memo,
            entry_date: parse_entry_date(&input.parameters)?,
            lines: vec![
                debit(deposit_side, amount),
                credit(receivable_ref(), amount),
            ],
            auto_post: true,
            source: None,
        };

        let entry = self.posting.post(input.user_id, attempt).await?;
        Ok(ToolOutput::ok(json!({ "entry": entry })))
    }
}

//
// ================= post_invoice =================
//

pub struct PostInvoiceTool {
    invoices: Arc<dyn InvoiceRepository>,
    posting: Arc<PostingGuard>,
}

impl PostInvoiceTool {
    pub fn new(invoices: Arc<dyn InvoiceRepository>, posting: Arc<PostingGuard>) -> Self {
        Self { invoices, posting }
    }
}

#[async_trait::async_trait]
impl Tool for PostInvoiceTool {
    fn name(&self) -> &'static str {
        "post_invoice"
    }

    fn description(&self) -> &'static str {
        "Book an existing invoice to the ledger: debits receivables, credits sales revenue"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "invoice_id": {
                    "type": "string",
                    "description": "Invoice UUID"
                },
                "invoice_number": {
                    "type": "string",
                    "description": "Invoice number such as INV-1001, used when the id is unknown"
                }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let invoice = if let Some(raw) = optional_str(&input.parameters, "invoice_id") {
            let id = Uuid::parse_str(raw)?;
            self.invoices
                .find_invoice(id, input.user_id)
                .await?
                .ok_or_else(|| {
                    AgentError::ResolutionError(format!("invoice '{}' not found", raw))
                })?
        } else if let Some(number) = optional_str(&input.parameters, "invoice_number") {
            self.invoices
                .list_invoices(input.user_id)
                .await?
                .into_iter()
                .find(|invoice| invoice.number.eq_ignore_ascii_case(number))
                .ok_or_else(|| {
                    AgentError::ResolutionError(format!("invoice '{}' not found", number))
                })?
        } else {
            return Err(AgentError::ValidationError(
                "provide 'invoice_id' or 'invoice_number'".to_string(),
            ));
        };

        if invoice.posted {
            return Err(AgentError::ValidationError(format!(
                "invoice {} is already posted",
                invoice.number
            )));
        }

        let attempt = PostingAttempt {
            memo: format!("Invoice {} for {}", invoice.number, invoice.customer_name),
            entry_date: invoice.issue_date,
            lines: vec![
                debit(receivable_ref(), invoice.total),
                credit(sales_revenue_ref(), invoice.total),
            ],
            auto_post: true,
            source: Some(format!("invoice:{}", invoice.id)),
        };

        let entry = self.posting.post(input.user_id, attempt).await?;
        self.invoices
            .mark_invoice_posted(invoice.id, input.user_id)
            .await?;

        Ok(ToolOutput::ok(json!({
            "entry": entry,
            "invoice_number": invoice.number,
        })))
    }
}

//
// ================= create_journal_entry =================
//

pub struct CreateJournalEntryTool {
    posting: Arc<PostingGuard>,
}

impl CreateJournalEntryTool {
    pub fn new(posting: Arc<PostingGuard>) -> Self {
        Self { posting }
    }
}

#[async_trait::async_trait]
impl Tool for CreateJournalEntryTool {
    fn name(&self) -> &'static str {
        "create_journal_entry"
    }

    fn description(&self) -> &'static str {
        "Create a free-form journal entry from explicit debit and credit lines"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "memo": {
                    "type": "string",
                    "description": "What this entry records"
                },
                "lines": {
                    "type": "array",
                    "minItems": 2,
                    "items": {
                        "type": "object",
                        "properties": {
                            "account": {
                                "type": "string",
                                "description": "Account code or name"
                            },
                            "debit": { "type": "number" },
                            "credit": { "type": "number" }
                        },
                        "required": ["account"]
                    },
                    "description": "Debit and credit lines; debits must equal credits"
                },
                "post": {
                    "type": "boolean",
                    "description": "Post immediately instead of leaving a draft"
                },
                "date": {
                    "type": "string",
                    "description": "Entry date as YYYY-MM-DD, defaults to today"
                }
            },
            "required": ["memo", "lines"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let memo = require_str(&input.parameters, "memo")?.to_string();
        let raw_lines = input
            .parameters
            .get("lines")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AgentError::ValidationError(
                    "'lines' must be an array of {account, debit, credit}".to_string(),
                )
            })?;

        let mut lines = Vec::with_capacity(raw_lines.len());
        for (index, raw) in raw_lines.iter().enumerate() {
            let account = raw.get("account").and_then(Value::as_str).ok_or_else(|| {
                AgentError::ValidationError(format!("line {}: 'account' is required", index + 1))
            })?;

            lines.push(PostingLine {
                account: AccountRef::Lookup {
                    query: account.to_string(),
                    role: format!("line {}", index + 1),
                    fallback: None,
                },
                debit: raw.get("debit").and_then(Value::as_f64).unwrap_or(0.0),
                credit: raw.get("credit").and_then(Value::as_f64).unwrap_or(0.0),
            });
        }

        let attempt = PostingAttempt {
            memo,
            entry_date: parse_entry_date(&input.parameters)?,
            lines,
            auto_post: optional_bool(&input.parameters, "post").unwrap_or(false),
            source: None,
        };

        let entry = self.posting.post(input.user_id, attempt).await?;
        Ok(ToolOutput::ok(json!({ "entry": entry })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::memory::store::MemoryStore;
    use crate::repos::InMemoryBooks;

    async fn setup() -> (Uuid, Arc<InMemoryBooks>, Arc<PostingGuard>) {
        let user_id = Uuid::new_v4();
        let books = Arc::new(InMemoryBooks::new());
        books.seed_demo_data(user_id).await;

        let store = Arc::new(MemoryStore::in_memory());
        let audit = Arc::new(AuditLog::new(store));
        let guard = Arc::new(PostingGuard::new(books.clone(), books.clone(), audit));
        (user_id, books, guard)
    }

    fn input_for(user_id: Uuid, parameters: Value) -> ToolInput {
        ToolInput {
            user_id,
            session_id: Uuid::new_v4(),
            parameters,
        }
    }

    #[tokio::test]
    async fn test_cash_sale_posts_against_cash_and_revenue() {
        let (user_id, books, guard) = setup().await;
        let tool = RecordSaleTool::new(guard);

        let output = tool
            .execute(&input_for(
                user_id,
                json!({ "amount": 100.0, "description": "Consulting income" }),
            ))
            .await
            .unwrap();

        let entry = &output.data["entry"];
        assert_eq!(entry["status"], "posted");
        let codes: Vec<&str> = entry["lines"]
            .as_array()
            .unwrap()
            .iter()
            .map(|line| line["account_code"].as_str().unwrap())
            .collect();
        assert!(codes.contains(&"1000"));
        assert!(codes.contains(&"4000"));
        assert_eq!(books.ledger_write_count(), 2);
    }

    #[tokio::test]
    async fn test_sale_on_credit_books_a_receivable() {
        let (user_id, _books, guard) = setup().await;
        let tool = RecordSaleTool::new(guard);

        let output = tool
            .execute(&input_for(
                user_id,
                json!({ "amount": 840.0, "payment_method": "credit" }),
            ))
            .await
            .unwrap();

        let codes: Vec<&str> = output.data["entry"]["lines"]
            .as_array()
            .unwrap()
            .iter()
            .map(|line| line["account_code"].as_str().unwrap())
            .collect();
        assert!(codes.contains(&"1100"));
    }

    #[tokio::test]
    async fn test_expense_resolves_category_by_keyword() {
        let (user_id, _books, guard) = setup().await;
        let tool = RecordExpenseTool::new(guard);

        let output = tool
            .execute(&input_for(
                user_id,
                json!({ "amount": 49.0, "category": "software", "payment_method": "bank" }),
            ))
            .await
            .unwrap();

        let lines = output.data["entry"]["lines"].as_array().unwrap().clone();
        let expense = lines
            .iter()
            .find(|line| line["debit"].as_f64().unwrap() > 0.0)
            .unwrap();
        assert_eq!(expense["account_code"], "5300");

        let paid_from = lines
            .iter()
            .find(|line| line["credit"].as_f64().unwrap() > 0.0)
            .unwrap();
        assert_eq!(paid_from["account_code"], "1010");
    }

    #[tokio::test]
    async fn test_unknown_payment_method_is_rejected() {
        let (user_id, books, guard) = setup().await;
        let tool = RecordExpenseTool::new(guard);

        let error = tool
            .execute(&input_for(
                user_id,
                json!({ "amount": 10.0, "category": "rent", "payment_method": "barter" }),
            ))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "validation");
        assert_eq!(books.ledger_write_count(), 0);
    }

    #[tokio::test]
    async fn test_payment_received_defaults_to_bank() {
        let (user_id, _books, guard) = setup().await;
        let tool = RecordPaymentReceivedTool::new(guard);

        let output = tool
            .execute(&input_for(
                user_id,
                json!({ "amount": 320.0, "customer": "Acme" }),
            ))
            .await
            .unwrap();

        let codes: Vec<&str> = output.data["entry"]["lines"]
            .as_array()
            .unwrap()
            .iter()
            .map(|line| line["account_code"].as_str().unwrap())
            .collect();
        assert!(codes.contains(&"1010"));
        assert!(codes.contains(&"1100"));
    }

    #[tokio::test]
    async fn test_post_invoice_by_number_marks_it_posted() {
        let (user_id, books, guard) = setup().await;
        let tool = PostInvoiceTool::new(books.clone(), guard);
        let input = input_for(user_id, json!({ "invoice_number": "INV-1002" }));

        let output = tool.execute(&input).await.unwrap();
        assert_eq!(output.data["invoice_number"], "INV-1002");
        assert_eq!(output.data["entry"]["status"], "posted");

        // A second attempt must be refused, with the ledger untouched.
        let writes = books.ledger_write_count();
        let error = tool.execute(&input).await.unwrap_err();
        assert_eq!(error.kind(), "validation");
        assert!(error.to_string().contains("already posted"));
        assert_eq!(books.ledger_write_count(), writes);
    }

    #[tokio::test]
    async fn test_missing_invoice_is_a_resolution_failure() {
        let (user_id, books, guard) = setup().await;
        let tool = PostInvoiceTool::new(books.clone(), guard);

        let error = tool
            .execute(&input_for(user_id, json!({ "invoice_number": "INV-9999" })))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "resolution");
        assert_eq!(books.ledger_write_count(), 0);
    }

    #[tokio::test]
    async fn test_unbalanced_journal_entry_never_reaches_the_ledger() {
        let (user_id, books, guard) = setup().await;
        let tool = CreateJournalEntryTool::new(guard);

        let error = tool
            .execute(&input_for(
                user_id,
                json!({
                    "memo": "Loan repayment",
                    "lines": [
                        { "account": "Cash", "debit": 100.0 },
                        { "account": "Owner's Equity", "credit": 99.0 }
                    ]
                }),
            ))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), "invariant");
        let message = error.to_string();
        assert!(message.contains("100.00"));
        assert!(message.contains("99.00"));
        assert_eq!(books.ledger_write_count(), 0);
    }

    #[tokio::test]
    async fn test_journal_entry_draft_by_default() {
        let (user_id, books, guard) = setup().await;
        let tool = CreateJournalEntryTool::new(guard);

        let output = tool
            .execute(&input_for(
                user_id,
                json!({
                    "memo": "Accrue utilities",
                    "lines": [
                        { "account": "Utilities Expense", "debit": 75.0 },
                        { "account": "2000", "credit": 75.0 }
                    ]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(output.data["entry"]["status"], "draft");
        assert_eq!(books.ledger_write_count(), 1);
    }
}
