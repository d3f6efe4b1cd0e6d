//! Core data models for the bookkeeping assistant

use crate::error::AgentError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Chat transcript =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
    System,
    Tool,
}

/// One message in the working transcript of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Tool calls requested by the model (agent messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Which tool produced this observation (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Agent,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn agent_with_calls(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: MessageRole::Agent,
            content: text.unwrap_or_default(),
            tool_calls,
            tool_name: None,
        }
    }

    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: Some(tool_name.into()),
        }
    }
}

/// A single tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// What one model round produced: text, tool calls, or both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self { text, tool_calls }
    }
}

//
// ================= Tool I/O =================
//

/// Caller scope and arguments for one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Flatten an error into the structured payload the model sees.
    pub fn fail(error: &AgentError) -> Self {
        let message = error.to_string();
        Self {
            success: false,
            data: json!({
                "error": message,
                "kind": error.kind(),
            }),
            error: Some(message),
        }
    }
}

/// Catalog entry handed to the model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Record of one guarded tool execution within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub step: u32,
    pub tool_name: String,
    pub output: ToolOutput,
    pub duration_ms: u64,
}

//
// ================= Turn Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: Uuid,
    pub text: String,
    pub steps: u32,
    pub tool_calls: u32,
}

//
// ================= Chart of Accounts =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub active: bool,
}

//
// ================= Journal Entries =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Posted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryLine {
    pub account_id: Uuid,
    pub debit: f64,
    pub credit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub memo: String,
    pub entry_date: NaiveDate,
    pub lines: Vec<EntryLine>,
    pub status: EntryStatus,
    pub posted_at: Option<DateTime<Utc>>,
    /// Optional backlink to the document this entry books (e.g. "invoice:<id>")
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Total of the debit side; equals the credit side for a balanced entry.
    pub fn amount(&self) -> f64 {
        self.lines.iter().map(|line| line.debit).sum()
    }
}

/// Entry payload handed to the ledger repository by the posting guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub memo: String,
    pub entry_date: NaiveDate,
    pub lines: Vec<EntryLine>,
    pub source: Option<String>,
}

//
// ================= Posting Attempts =================
//

/// How a posting line names its account before resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AccountRef {
    Id(Uuid),
    Lookup {
        query: String,
        /// Role named in resolution errors ("cash", "revenue", "line 2", ...)
        role: String,
        fallback: Option<CategoryFallback>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryFallback {
    pub kind: AccountKind,
    pub keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingLine {
    pub account: AccountRef,
    pub debit: f64,
    pub credit: f64,
}

/// A candidate ledger write, validated by the posting guard before anything
/// touches persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingAttempt {
    pub memo: String,
    pub entry_date: NaiveDate,
    pub lines: Vec<PostingLine>,
    pub auto_post: bool,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedLine {
    pub account_code: String,
    pub account_name: String,
    pub debit: f64,
    pub credit: f64,
}

/// What the guard reports back once an attempt is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedEntry {
    pub entry_id: Uuid,
    pub status: EntryStatus,
    pub amount: f64,
    pub lines: Vec<PostedLine>,
}

//
// ================= Books Entities =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub number: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: f64,
    pub status: InvoiceStatus,
    pub posted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub balance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Open,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub number: String,
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub due_date: NaiveDate,
    pub total: f64,
    pub status: BillStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub occurred_on: NaiveDate,
    pub description: String,
    /// Positive for money in, negative for money out
    pub amount: f64,
    pub matched: bool,
}

//
// ================= Display & Parsing =================
//

/// Two-decimal currency rendering used in invariant errors and replies.
pub fn format_amount(value: f64) -> String {
    format!("{:.2}", value)
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountKind::Asset => "Asset",
            AccountKind::Liability => "Liability",
            AccountKind::Equity => "Equity",
            AccountKind::Revenue => "Revenue",
            AccountKind::Expense => "Expense",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::Draft => "draft",
            EntryStatus::Posted => "posted",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for InvoiceStatus {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            other => Err(AgentError::ValidationError(format!(
                "unknown invoice status '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_output_fail_carries_kind() {
        let output = ToolOutput::fail(&AgentError::TimeoutError("list_invoices".into()));
        assert!(!output.success);
        assert_eq!(output.data["kind"], "timeout");
        assert!(output.error.is_some());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(100.0), "100.00");
        assert_eq!(format_amount(99.006), "99.01");
        assert_eq!(format_amount(1234.5), "1234.50");
    }

    #[test]
    fn test_invoice_status_parsing() {
        assert_eq!("Paid".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Paid);
        assert!("banana".parse::<InvoiceStatus>().is_err());
    }
}
