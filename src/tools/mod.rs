//! Tool trait, registry, and the resource guard that wraps every
//! execution.
//!
//! Tools never panic across the boundary: the guard turns every failure,
//! timeout, and budget overrun into a structured ToolOutput the model can
//! read and react to.

pub mod books;
pub mod memory;
pub mod postings;

use crate::config::RuntimeConfig;
use crate::error::AgentError;
use crate::ledger::PostingGuard;
use crate::memory::store::MemoryStore;
use crate::models::{ToolInput, ToolInvocation, ToolOutput, ToolSpec};
use crate::repos::{
    BankFeedRepository, BillRepository, ChartOfAccounts, CustomerRepository, InvoiceRepository,
    VendorRepository,
};
use crate::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the accepted parameters.
    fn parameters(&self) -> Value;
    /// Per-tool override of the list-result cap.
    fn result_cap(&self) -> Option<usize> {
        None
    }
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up tools and describing them to the model
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Specs for every registered tool, name-sorted so prompts are stable.
    pub fn catalog(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the built-in tools need to reach.
#[derive(Clone)]
pub struct ToolDeps {
    pub accounts: Arc<dyn ChartOfAccounts>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub vendors: Arc<dyn VendorRepository>,
    pub bills: Arc<dyn BillRepository>,
    pub bank: Arc<dyn BankFeedRepository>,
    pub posting: Arc<PostingGuard>,
    pub store: Arc<MemoryStore>,
}

/// Create registry with the full bookkeeping tool set
pub fn build_registry(deps: &ToolDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(books::ListAccountsTool::new(deps.accounts.clone())));
    registry.register(Arc::new(books::ListInvoicesTool::new(deps.invoices.clone())));
    registry.register(Arc::new(books::ListCustomersTool::new(
        deps.customers.clone(),
    )));
    registry.register(Arc::new(books::ListVendorsTool::new(deps.vendors.clone())));
    registry.register(Arc::new(books::ListBillsTool::new(deps.bills.clone())));
    registry.register(Arc::new(books::ListBankTransactionsTool::new(
        deps.bank.clone(),
    )));

    registry.register(Arc::new(postings::RecordSaleTool::new(deps.posting.clone())));
    registry.register(Arc::new(postings::RecordExpenseTool::new(
        deps.posting.clone(),
    )));
    registry.register(Arc::new(postings::RecordPaymentReceivedTool::new(
        deps.posting.clone(),
    )));
    registry.register(Arc::new(postings::PostInvoiceTool::new(
        deps.invoices.clone(),
        deps.posting.clone(),
    )));
    registry.register(Arc::new(postings::CreateJournalEntryTool::new(
        deps.posting.clone(),
    )));

    registry.register(Arc::new(memory::RememberFactTool::new(deps.store.clone())));
    registry.register(Arc::new(memory::RecallMemoriesTool::new(deps.store.clone())));
    registry.register(Arc::new(memory::ForgetMemoryTool::new(deps.store.clone())));

    registry
}

//
// ================= Resource Guard =================
//

/// Per-request wrapper enforcing the call budget, the per-tool deadline,
/// and the list-result cap. One guard lives for one turn.
pub struct ResourceGuard {
    registry: Arc<ToolRegistry>,
    config: RuntimeConfig,
    calls_made: AtomicU32,
}

impl ResourceGuard {
    pub fn new(registry: Arc<ToolRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            config,
            calls_made: AtomicU32::new(0),
        }
    }

    pub fn calls_made(&self) -> u32 {
        self.calls_made.load(Ordering::SeqCst)
    }

    /// Execute one call. Failures come back as a structured ToolOutput,
    /// never as Err, so the loop can always hand the model an observation.
    pub async fn execute(&self, step: u32, name: &str, input: &ToolInput) -> ToolInvocation {
        let started = Instant::now();

        let output = match self.execute_inner(name, input).await {
            Ok(output) => output,
            Err(error) => {
                warn!(tool = name, step, "Tool call failed: {}", error);
                ToolOutput::fail(&error)
            }
        };

        ToolInvocation {
            step,
            tool_name: name.to_string(),
            output,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    // Calls within a turn run sequentially, so load-then-add is exact and
    // the counter only reflects admitted calls.
    async fn execute_inner(&self, name: &str, input: &ToolInput) -> Result<ToolOutput> {
        let seen = self.calls_made.load(Ordering::SeqCst);
        if seen >= self.config.max_tool_calls_per_request {
            return Err(AgentError::LimitError(format!(
                "tool call budget of {} per request reached",
                self.config.max_tool_calls_per_request
            )));
        }
        self.calls_made.fetch_add(1, Ordering::SeqCst);

        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| AgentError::ValidationError(format!("unknown tool '{}'", name)))?;

        let mut output = tokio::time::timeout(self.config.tool_timeout, tool.execute(input))
            .await
            .map_err(|_| {
                AgentError::TimeoutError(format!(
                    "{} exceeded its {}s deadline",
                    name,
                    self.config.tool_timeout.as_secs()
                ))
            })??;

        if output.success {
            let cap = tool.result_cap().unwrap_or(self.config.max_list_results);
            truncate_items(&mut output.data, cap);
        }

        Ok(output)
    }
}

/// Cap the "items" array of a list payload, leaving a marker of what was
/// dropped.
fn truncate_items(data: &mut Value, cap: usize) {
    let dropped = match data.get_mut("items").and_then(Value::as_array_mut) {
        Some(items) if items.len() > cap => {
            let dropped = items.len() - cap;
            items.truncate(cap);
            dropped
        }
        _ => return,
    };

    data["count"] = Value::from(cap);
    data["truncated"] = Value::from(true);
    data["dropped"] = Value::from(dropped);
}

//
// ================= Parameter helpers =================
//

pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AgentError::ValidationError(format!("missing required parameter '{}'", key)))
}

pub(crate) fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

pub(crate) fn optional_f64(params: &Value, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

pub(crate) fn optional_bool(params: &Value, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

pub(crate) fn optional_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

/// Amounts must be present, numeric, and strictly positive.
pub(crate) fn require_positive_amount(params: &Value, key: &str) -> Result<f64> {
    let value = params.get(key).and_then(Value::as_f64).ok_or_else(|| {
        AgentError::ValidationError(format!("missing required parameter '{}'", key))
    })?;

    if value <= 0.0 {
        return Err(AgentError::ValidationError(format!(
            "'{}' must be a positive amount",
            key
        )));
    }
    Ok(value)
}

/// Optional "date" parameter as YYYY-MM-DD, defaulting to today.
pub(crate) fn parse_entry_date(params: &Value) -> Result<NaiveDate> {
    match optional_str(params, "date") {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            AgentError::ValidationError(format!(
                "'date' must be formatted YYYY-MM-DD, got '{}'",
                raw
            ))
        }),
        None => Ok(chrono::Utc::now().date_naive()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    struct SlowTool;

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow_tool"
        }
        fn description(&self) -> &'static str {
            "Sleeps past every deadline"
        }
        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _input: &ToolInput) -> Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolOutput::ok(json!({ "done": true })))
        }
    }

    struct StaticListTool {
        size: usize,
    }

    #[async_trait::async_trait]
    impl Tool for StaticListTool {
        fn name(&self) -> &'static str {
            "static_list"
        }
        fn description(&self) -> &'static str {
            "Returns a fixed number of items"
        }
        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _input: &ToolInput) -> Result<ToolOutput> {
            let items: Vec<Value> = (0..self.size).map(|i| json!({ "n": i })).collect();
            Ok(ToolOutput::ok(json!({ "items": items, "count": self.size })))
        }
    }

    fn input() -> ToolInput {
        ToolInput {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            parameters: json!({}),
        }
    }

    fn guard_with(tool: Arc<dyn Tool>, config: RuntimeConfig) -> ResourceGuard {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        ResourceGuard::new(Arc::new(registry), config)
    }

    #[tokio::test]
    async fn test_slow_tool_times_out_with_structured_payload() {
        let config = RuntimeConfig {
            tool_timeout: Duration::from_millis(20),
            ..RuntimeConfig::default()
        };
        let guard = guard_with(Arc::new(SlowTool), config);

        let invocation = guard.execute(1, "slow_tool", &input()).await;
        assert!(!invocation.output.success);
        assert_eq!(invocation.output.data["kind"], "timeout");
    }

    #[tokio::test]
    async fn test_call_budget_rejects_overflow() {
        let config = RuntimeConfig {
            max_tool_calls_per_request: 2,
            ..RuntimeConfig::default()
        };
        let guard = guard_with(Arc::new(StaticListTool { size: 1 }), config);

        let first = guard.execute(1, "static_list", &input()).await;
        assert!(first.output.success);
        let second = guard.execute(1, "static_list", &input()).await;
        assert!(second.output.success);

        let third = guard.execute(2, "static_list", &input()).await;
        assert!(!third.output.success);
        assert_eq!(third.output.data["kind"], "limit");
        assert!(third.output.data["error"]
            .as_str()
            .unwrap()
            .contains("budget of 2"));
    }

    #[tokio::test]
    async fn test_oversized_list_is_truncated_and_marked() {
        let guard = guard_with(
            Arc::new(StaticListTool { size: 60 }),
            RuntimeConfig::default(),
        );

        let invocation = guard.execute(1, "static_list", &input()).await;
        let data = &invocation.output.data;
        assert_eq!(data["items"].as_array().unwrap().len(), 50);
        assert_eq!(data["count"], 50);
        assert_eq!(data["truncated"], true);
        assert_eq!(data["dropped"], 10);
    }

    #[tokio::test]
    async fn test_exact_cap_is_left_untouched() {
        let guard = guard_with(
            Arc::new(StaticListTool { size: 50 }),
            RuntimeConfig::default(),
        );

        let invocation = guard.execute(1, "static_list", &input()).await;
        let data = &invocation.output.data;
        assert_eq!(data["items"].as_array().unwrap().len(), 50);
        assert!(data.get("truncated").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_validation_failure() {
        let guard = guard_with(Arc::new(SlowTool), RuntimeConfig::default());

        let invocation = guard.execute(1, "no_such_tool", &input()).await;
        assert!(!invocation.output.success);
        assert_eq!(invocation.output.data["kind"], "validation");
    }

    #[test]
    fn test_parse_entry_date() {
        let date = parse_entry_date(&json!({ "date": "2025-03-14" })).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());

        assert!(parse_entry_date(&json!({ "date": "03/14/2025" })).is_err());
        assert!(parse_entry_date(&json!({})).is_ok());
    }

    #[test]
    fn test_require_positive_amount() {
        assert_eq!(
            require_positive_amount(&json!({ "amount": 12.5 }), "amount").unwrap(),
            12.5
        );
        assert!(require_positive_amount(&json!({ "amount": 0.0 }), "amount").is_err());
        assert!(require_positive_amount(&json!({ "amount": -3.0 }), "amount").is_err());
        assert!(require_positive_amount(&json!({}), "amount").is_err());
    }
}
