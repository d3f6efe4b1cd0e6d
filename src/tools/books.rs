//! Read-only tools over the books: chart, invoices, customers, vendors,
//! bills, and the bank feed.
//!
//! Every payload is a { "items": [...], "count": n } object so the
//! resource guard can cap it uniformly.

use crate::models::{InvoiceStatus, ToolInput, ToolOutput};
use crate::repos::{
    BankFeedRepository, BillRepository, ChartOfAccounts, CustomerRepository, InvoiceRepository,
    VendorRepository,
};
use crate::tools::{optional_bool, optional_str, Tool};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

fn list_payload<T: serde::Serialize>(items: &[T]) -> ToolOutput {
    ToolOutput::ok(json!({
        "items": items,
        "count": items.len(),
    }))
}

//
// ================= Chart of accounts =================
//

pub struct ListAccountsTool {
    accounts: Arc<dyn ChartOfAccounts>,
}

impl ListAccountsTool {
    pub fn new(accounts: Arc<dyn ChartOfAccounts>) -> Self {
        Self { accounts }
    }
}

#[async_trait::async_trait]
impl Tool for ListAccountsTool {
    fn name(&self) -> &'static str {
        "list_accounts"
    }

    fn description(&self) -> &'static str {
        "List the chart of accounts with code, name, and account type"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_inactive": {
                    "type": "boolean",
                    "description": "Also list accounts that are no longer in use"
                }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let include_inactive =
            optional_bool(&input.parameters, "include_inactive").unwrap_or(false);
        let accounts = self
            .accounts
            .find_all_accounts(input.user_id, !include_inactive)
            .await?;
        Ok(list_payload(&accounts))
    }
}

//
// ================= Invoices =================
//

pub struct ListInvoicesTool {
    invoices: Arc<dyn InvoiceRepository>,
}

impl ListInvoicesTool {
    pub fn new(invoices: Arc<dyn InvoiceRepository>) -> Self {
        Self { invoices }
    }
}

#[async_trait::async_trait]
impl Tool for ListInvoicesTool {
    fn name(&self) -> &'static str {
        "list_invoices"
    }

    fn description(&self) -> &'static str {
        "List customer invoices, optionally filtered by status"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["draft", "sent", "paid", "overdue"],
                    "description": "Only invoices in this status"
                }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let mut invoices = self.invoices.list_invoices(input.user_id).await?;

        if let Some(raw) = optional_str(&input.parameters, "status") {
            let status: InvoiceStatus = raw.parse()?;
            invoices.retain(|invoice| invoice.status == status);
        }

        Ok(list_payload(&invoices))
    }
}

//
// ================= Customers and vendors =================
//

pub struct ListCustomersTool {
    customers: Arc<dyn CustomerRepository>,
}

impl ListCustomersTool {
    pub fn new(customers: Arc<dyn CustomerRepository>) -> Self {
        Self { customers }
    }
}

#[async_trait::async_trait]
impl Tool for ListCustomersTool {
    fn name(&self) -> &'static str {
        "list_customers"
    }

    fn description(&self) -> &'static str {
        "List customers with contact details and outstanding balance"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let customers = self.customers.list_customers(input.user_id).await?;
        Ok(list_payload(&customers))
    }
}

pub struct ListVendorsTool {
    vendors: Arc<dyn VendorRepository>,
}

impl ListVendorsTool {
    pub fn new(vendors: Arc<dyn VendorRepository>) -> Self {
        Self { vendors }
    }
}

#[async_trait::async_trait]
impl Tool for ListVendorsTool {
    fn name(&self) -> &'static str {
        "list_vendors"
    }

    fn description(&self) -> &'static str {
        "List vendors with contact details and outstanding balance"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let vendors = self.vendors.list_vendors(input.user_id).await?;
        Ok(list_payload(&vendors))
    }
}

//
// ================= Bills =================
//

pub struct ListBillsTool {
    bills: Arc<dyn BillRepository>,
}

impl ListBillsTool {
    pub fn new(bills: Arc<dyn BillRepository>) -> Self {
        Self { bills }
    }
}

#[async_trait::async_trait]
impl Tool for ListBillsTool {
    fn name(&self) -> &'static str {
        "list_bills"
    }

    fn description(&self) -> &'static str {
        "List vendor bills and how much is still owed"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "unpaid_only": {
                    "type": "boolean",
                    "description": "Only bills that still need paying"
                }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let mut bills = self.bills.list_bills(input.user_id).await?;

        if optional_bool(&input.parameters, "unpaid_only").unwrap_or(false) {
            bills.retain(|bill| bill.status != crate::models::BillStatus::Paid);
        }

        Ok(list_payload(&bills))
    }
}

//
// ================= Bank feed =================
//

pub struct ListBankTransactionsTool {
    bank: Arc<dyn BankFeedRepository>,
}

impl ListBankTransactionsTool {
    pub fn new(bank: Arc<dyn BankFeedRepository>) -> Self {
        Self { bank }
    }
}

#[async_trait::async_trait]
impl Tool for ListBankTransactionsTool {
    fn name(&self) -> &'static str {
        "list_bank_transactions"
    }

    fn description(&self) -> &'static str {
        "List recent bank feed transactions, newest first"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "unmatched_only": {
                    "type": "boolean",
                    "description": "Only transactions not yet matched to a ledger entry"
                }
            }
        })
    }

    fn result_cap(&self) -> Option<usize> {
        Some(100)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let mut transactions = self.bank.list_recent_transactions(input.user_id).await?;

        if optional_bool(&input.parameters, "unmatched_only").unwrap_or(false) {
            transactions.retain(|txn| !txn.matched);
        }

        Ok(list_payload(&transactions))
    }
}
