//! Repository seams for the bookkeeping data the assistant reads and writes.
//!
//! Every lookup is keyed by (id, user_id) so a turn can never cross user
//! boundaries. The product wires these traits to its relational
//! repositories; `InMemoryBooks` backs the demo binary and tests.

use crate::error::AgentError;
use crate::models::{
    Account, AccountKind, BankTransaction, Bill, BillStatus, Customer, EntryStatus, Invoice,
    InvoiceStatus, JournalEntry, NewJournalEntry, Vendor,
};
use crate::Result;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait ChartOfAccounts: Send + Sync {
    async fn find_all_accounts(&self, user_id: Uuid, active_only: bool) -> Result<Vec<Account>>;
}

#[async_trait::async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn create_entry(&self, user_id: Uuid, entry: NewJournalEntry) -> Result<JournalEntry>;
    async fn post_entry(&self, entry_id: Uuid, user_id: Uuid) -> Result<JournalEntry>;
}

#[async_trait::async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn list_invoices(&self, user_id: Uuid) -> Result<Vec<Invoice>>;
    async fn find_invoice(&self, id: Uuid, user_id: Uuid) -> Result<Option<Invoice>>;
    async fn mark_invoice_posted(&self, id: Uuid, user_id: Uuid) -> Result<()>;
}

#[async_trait::async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn list_customers(&self, user_id: Uuid) -> Result<Vec<Customer>>;
}

#[async_trait::async_trait]
pub trait VendorRepository: Send + Sync {
    async fn list_vendors(&self, user_id: Uuid) -> Result<Vec<Vendor>>;
}

#[async_trait::async_trait]
pub trait BillRepository: Send + Sync {
    async fn list_bills(&self, user_id: Uuid) -> Result<Vec<Bill>>;
}

#[async_trait::async_trait]
pub trait BankFeedRepository: Send + Sync {
    /// Most recent transactions first.
    async fn list_recent_transactions(&self, user_id: Uuid) -> Result<Vec<BankTransaction>>;
}

/// In-memory books for development and tests.
///
/// Counts ledger writes so tests can assert that rejected posting attempts
/// never reached persistence.
pub struct InMemoryBooks {
    accounts: RwLock<Vec<Account>>,
    invoices: RwLock<Vec<Invoice>>,
    customers: RwLock<Vec<Customer>>,
    vendors: RwLock<Vec<Vendor>>,
    bills: RwLock<Vec<Bill>>,
    bank_transactions: RwLock<Vec<BankTransaction>>,
    entries: RwLock<HashMap<Uuid, JournalEntry>>,
    ledger_writes: AtomicUsize,
}

impl InMemoryBooks {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(Vec::new()),
            invoices: RwLock::new(Vec::new()),
            customers: RwLock::new(Vec::new()),
            vendors: RwLock::new(Vec::new()),
            bills: RwLock::new(Vec::new()),
            bank_transactions: RwLock::new(Vec::new()),
            entries: RwLock::new(HashMap::new()),
            ledger_writes: AtomicUsize::new(0),
        }
    }

    /// How many times the ledger was written (creates + posts).
    pub fn ledger_write_count(&self) -> usize {
        self.ledger_writes.load(Ordering::SeqCst)
    }

    pub async fn add_account(
        &self,
        user_id: Uuid,
        code: &str,
        name: &str,
        kind: AccountKind,
    ) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            user_id,
            code: code.to_string(),
            name: name.to_string(),
            kind,
            active: true,
        };
        self.accounts.write().await.push(account.clone());
        account
    }

    pub async fn add_invoice(&self, invoice: Invoice) {
        self.invoices.write().await.push(invoice);
    }

    pub async fn add_customer(&self, customer: Customer) {
        self.customers.write().await.push(customer);
    }

    pub async fn add_vendor(&self, vendor: Vendor) {
        self.vendors.write().await.push(vendor);
    }

    pub async fn add_bill(&self, bill: Bill) {
        self.bills.write().await.push(bill);
    }

    pub async fn add_bank_transaction(&self, transaction: BankTransaction) {
        self.bank_transactions.write().await.push(transaction);
    }

    pub async fn entry(&self, entry_id: Uuid) -> Option<JournalEntry> {
        self.entries.read().await.get(&entry_id).cloned()
    }

    /// Seed the standard small-business chart of accounts for a user.
    pub async fn seed_standard_chart(&self, user_id: Uuid) {
        let chart = [
            ("1000", "Cash", AccountKind::Asset),
            ("1010", "Bank Checking", AccountKind::Asset),
            ("1100", "Accounts Receivable", AccountKind::Asset),
            ("2000", "Accounts Payable", AccountKind::Liability),
            ("3000", "Owner's Equity", AccountKind::Equity),
            ("4000", "Sales Revenue", AccountKind::Revenue),
            ("4100", "Service Revenue", AccountKind::Revenue),
            ("5000", "Office Supplies", AccountKind::Expense),
            ("5100", "Rent Expense", AccountKind::Expense),
            ("5200", "Utilities Expense", AccountKind::Expense),
            ("5300", "Software Subscriptions", AccountKind::Expense),
            ("5900", "Miscellaneous Expense", AccountKind::Expense),
        ];

        for (code, name, kind) in chart {
            self.add_account(user_id, code, name, kind).await;
        }
    }

    /// Seed the chart plus a handful of documents so the demo has data to read.
    pub async fn seed_demo_data(&self, user_id: Uuid) {
        self.seed_standard_chart(user_id).await;

        let today = Utc::now().date_naive();
        let acme = Customer {
            id: Uuid::new_v4(),
            user_id,
            name: "Acme Corp".to_string(),
            email: Some("billing@acme.example".to_string()),
            balance: 1_200.0,
        };
        let globex = Customer {
            id: Uuid::new_v4(),
            user_id,
            name: "Globex LLC".to_string(),
            email: None,
            balance: 0.0,
        };

        self.add_invoice(Invoice {
            id: Uuid::new_v4(),
            user_id,
            number: "INV-1001".to_string(),
            customer_id: acme.id,
            customer_name: acme.name.clone(),
            issue_date: today - Duration::days(20),
            due_date: today - Duration::days(5),
            total: 1_200.0,
            status: InvoiceStatus::Overdue,
            posted: true,
        })
        .await;
        self.add_invoice(Invoice {
            id: Uuid::new_v4(),
            user_id,
            number: "INV-1002".to_string(),
            customer_id: globex.id,
            customer_name: globex.name.clone(),
            issue_date: today - Duration::days(3),
            due_date: today + Duration::days(27),
            total: 850.0,
            status: InvoiceStatus::Sent,
            posted: false,
        })
        .await;
        self.add_customer(acme).await;
        self.add_customer(globex).await;

        let vendor = Vendor {
            id: Uuid::new_v4(),
            user_id,
            name: "Cloudline Hosting".to_string(),
            email: Some("ap@cloudline.example".to_string()),
            balance: 89.0,
        };
        self.add_bill(Bill {
            id: Uuid::new_v4(),
            user_id,
            number: "BILL-204".to_string(),
            vendor_id: vendor.id,
            vendor_name: vendor.name.clone(),
            due_date: today + Duration::days(10),
            total: 89.0,
            status: BillStatus::Open,
        })
        .await;
        self.add_vendor(vendor).await;

        for (days_ago, description, amount) in [
            (1, "Card settlement", 430.25),
            (2, "Office rent", -1_500.0),
            (4, "Stripe payout", 912.80),
        ] {
            self.add_bank_transaction(BankTransaction {
                id: Uuid::new_v4(),
                user_id,
                occurred_on: today - Duration::days(days_ago),
                description: description.to_string(),
                amount,
                matched: false,
            })
            .await;
        }
    }
}

impl Default for InMemoryBooks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChartOfAccounts for InMemoryBooks {
    async fn find_all_accounts(&self, user_id: Uuid, active_only: bool) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;

        Ok(accounts
            .iter()
            .filter(|account| account.user_id == user_id)
            .filter(|account| !active_only || account.active)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl LedgerRepository for InMemoryBooks {
    async fn create_entry(&self, user_id: Uuid, entry: NewJournalEntry) -> Result<JournalEntry> {
        self.ledger_writes.fetch_add(1, Ordering::SeqCst);

        let record = JournalEntry {
            id: Uuid::new_v4(),
            user_id,
            memo: entry.memo,
            entry_date: entry.entry_date,
            lines: entry.lines,
            status: EntryStatus::Draft,
            posted_at: None,
            source: entry.source,
            created_at: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        entries.insert(record.id, record.clone());

        Ok(record)
    }

    async fn post_entry(&self, entry_id: Uuid, user_id: Uuid) -> Result<JournalEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&entry_id)
            .filter(|entry| entry.user_id == user_id)
            .ok_or_else(|| {
                AgentError::UpstreamError(format!("journal entry {} not found", entry_id))
            })?;

        self.ledger_writes.fetch_add(1, Ordering::SeqCst);
        entry.status = EntryStatus::Posted;
        entry.posted_at = Some(Utc::now());

        Ok(entry.clone())
    }
}

#[async_trait::async_trait]
impl InvoiceRepository for InMemoryBooks {
    async fn list_invoices(&self, user_id: Uuid) -> Result<Vec<Invoice>> {
        let invoices = self.invoices.read().await;

        let mut items: Vec<Invoice> = invoices
            .iter()
            .filter(|invoice| invoice.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.issue_date.cmp(&a.issue_date));

        Ok(items)
    }

    async fn find_invoice(&self, id: Uuid, user_id: Uuid) -> Result<Option<Invoice>> {
        let invoices = self.invoices.read().await;

        Ok(invoices
            .iter()
            .find(|invoice| invoice.id == id && invoice.user_id == user_id)
            .cloned())
    }

    async fn mark_invoice_posted(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        let mut invoices = self.invoices.write().await;

        let invoice = invoices
            .iter_mut()
            .find(|invoice| invoice.id == id && invoice.user_id == user_id)
            .ok_or_else(|| AgentError::UpstreamError(format!("invoice {} not found", id)))?;

        invoice.posted = true;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryBooks {
    async fn list_customers(&self, user_id: Uuid) -> Result<Vec<Customer>> {
        let customers = self.customers.read().await;

        Ok(customers
            .iter()
            .filter(|customer| customer.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl VendorRepository for InMemoryBooks {
    async fn list_vendors(&self, user_id: Uuid) -> Result<Vec<Vendor>> {
        let vendors = self.vendors.read().await;

        Ok(vendors
            .iter()
            .filter(|vendor| vendor.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl BillRepository for InMemoryBooks {
    async fn list_bills(&self, user_id: Uuid) -> Result<Vec<Bill>> {
        let bills = self.bills.read().await;

        Ok(bills
            .iter()
            .filter(|bill| bill.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl BankFeedRepository for InMemoryBooks {
    async fn list_recent_transactions(&self, user_id: Uuid) -> Result<Vec<BankTransaction>> {
        let transactions = self.bank_transactions.read().await;

        let mut items: Vec<BankTransaction> = transactions
            .iter()
            .filter(|transaction| transaction.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.occurred_on.cmp(&a.occurred_on));

        Ok(items)
    }
}
