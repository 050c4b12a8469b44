//! Shared types for pocketledger.
//!
//! These types form the data model used across all modules: the wire
//! format spoken between client and backend, the in-memory ledger state,
//! and the domain errors. Field names serialise in camelCase to match
//! the mobile clients already in the field.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Remote app configuration
// ---------------------------------------------------------------------------

/// Server-owned application configuration singleton.
///
/// Created lazily with defaults on first read, mutated only by the admin
/// actor, fetched read-only by every client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub is_maintenance: bool,
    pub maintenance_message: String,
    pub has_update_flag: bool,
    pub update_message: String,
    pub update_url: String,
    pub force_update: bool,
    pub show_warning: bool,
    pub warning_message: String,
    /// Dotted version string ("2.1.0"). Empty means "trust the raw flag".
    pub latest_version: String,
    pub feature_cards: Vec<FeatureCard>,
}

/// Partial admin update of the config singleton. `None` fields are left
/// untouched by the merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub is_maintenance: Option<bool>,
    pub maintenance_message: Option<String>,
    pub has_update_flag: Option<bool>,
    pub update_message: Option<String>,
    pub update_url: Option<String>,
    pub force_update: Option<bool>,
    pub show_warning: Option<bool>,
    pub warning_message: Option<String>,
    pub latest_version: Option<String>,
    pub feature_cards: Option<Vec<FeatureCard>>,
}

impl RemoteConfig {
    /// Apply a partial admin update in place.
    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.is_maintenance {
            self.is_maintenance = v;
        }
        if let Some(v) = patch.maintenance_message {
            self.maintenance_message = v;
        }
        if let Some(v) = patch.has_update_flag {
            self.has_update_flag = v;
        }
        if let Some(v) = patch.update_message {
            self.update_message = v;
        }
        if let Some(v) = patch.update_url {
            self.update_url = v;
        }
        if let Some(v) = patch.force_update {
            self.force_update = v;
        }
        if let Some(v) = patch.show_warning {
            self.show_warning = v;
        }
        if let Some(v) = patch.warning_message {
            self.warning_message = v;
        }
        if let Some(v) = patch.latest_version {
            self.latest_version = v;
        }
        if let Some(v) = patch.feature_cards {
            self.feature_cards = v;
        }
    }
}

/// A promotional/informational card shown on the home screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCard {
    pub title: String,
    pub action: FeatureAction,
}

/// What tapping a feature card does.
///
/// A tagged variant rather than an action-type string, so dispatch sites
/// match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeatureAction {
    Navigate { route: String },
    Modal { id: String },
    External { url: String },
}

impl fmt::Display for FeatureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureAction::Navigate { route } => write!(f, "navigate:{route}"),
            FeatureAction::Modal { id } => write!(f, "modal:{id}"),
            FeatureAction::External { url } => write!(f, "external:{url}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger entities
// ---------------------------------------------------------------------------

/// A single expense entry, owned by one user's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub amount: Decimal,
    pub description: String,
    /// Weak reference: the category may have been deleted since.
    pub category_id: Option<Uuid>,
    pub date: DateTime<Utc>,
}

impl fmt::Display for Expense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-{} {} ({})",
            self.amount,
            self.description,
            self.date.format("%Y-%m-%d"),
        )
    }
}

/// Input for creating an expense; the ledger assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDraft {
    pub amount: Decimal,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub date: DateTime<Utc>,
}

/// A single income entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    pub id: Uuid,
    pub amount: Decimal,
    pub description: String,
    pub date: DateTime<Utc>,
}

impl fmt::Display for Income {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} {} ({})",
            self.amount,
            self.description,
            self.date.format("%Y-%m-%d"),
        )
    }
}

/// Input for creating an income; the ledger assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeDraft {
    pub amount: Decimal,
    pub description: String,
    pub date: DateTime<Utc>,
}

/// An expense category. Built-in or user-created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub is_custom: bool,
}

/// Display name used when an expense references no (or a deleted) category.
pub const UNCATEGORIZED: &str = "Uncategorized";

// ---------------------------------------------------------------------------
// Recurring bills & settlement state
// ---------------------------------------------------------------------------

/// Payment state of a recurring bill within the current cycle.
///
/// Paid and partially-paid bills always reference expenses that exist in
/// the ledger and were materialised by settlement; unpaying deletes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PaymentState {
    Pending,
    Partial {
        paid: Decimal,
        expense_ids: Vec<Uuid>,
    },
    Paid {
        expense_ids: Vec<Uuid>,
    },
}

impl PaymentState {
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentState::Paid { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PaymentState::Pending)
    }

    /// Expense ids materialised by settlement so far.
    pub fn expense_ids(&self) -> &[Uuid] {
        match self {
            PaymentState::Pending => &[],
            PaymentState::Partial { expense_ids, .. } => expense_ids,
            PaymentState::Paid { expense_ids } => expense_ids,
        }
    }

    /// Amount already paid toward the bill this cycle.
    pub fn amount_paid(&self, bill_amount: Decimal) -> Decimal {
        match self {
            PaymentState::Pending => Decimal::ZERO,
            PaymentState::Partial { paid, .. } => *paid,
            PaymentState::Paid { .. } => bill_amount,
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentState::Pending => write!(f, "pending"),
            PaymentState::Partial { paid, .. } => write!(f, "partial ({paid} paid)"),
            PaymentState::Paid { .. } => write!(f, "paid"),
        }
    }
}

/// A recurring monthly bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringBill {
    pub id: Uuid,
    pub name: String,
    pub amount: Decimal,
    /// Day of month the bill is due (1..=31).
    pub due_day: u8,
    pub category_id: Option<Uuid>,
    pub payment: PaymentState,
    pub last_paid_date: Option<DateTime<Utc>>,
}

impl fmt::Display for RecurringBill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} due day {} [{}]",
            self.name, self.amount, self.due_day, self.payment,
        )
    }
}

/// Input for creating a recurring bill; starts `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDraft {
    pub name: String,
    pub amount: Decimal,
    pub due_day: u8,
    pub category_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Ledger snapshot & patch (wire shapes for GET/PUT /finance)
// ---------------------------------------------------------------------------

/// Full per-user financial state as stored and synced.
///
/// `balance` is maintained incrementally but must always equal
/// `sum(incomes) - sum(expenses)` after a consistent operation sequence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerSnapshot {
    pub balance: Decimal,
    pub expenses: Vec<Expense>,
    pub incomes: Vec<Income>,
    pub categories: Vec<Category>,
    pub recurring_bills: Vec<RecurringBill>,
}

impl LedgerSnapshot {
    pub fn total_expenses(&self) -> Decimal {
        self.expenses.iter().map(|e| e.amount).sum()
    }

    pub fn total_incomes(&self) -> Decimal {
        self.incomes.iter().map(|i| i.amount).sum()
    }

    /// Balance recomputed from scratch. The incremental `balance` field
    /// must match this after any consistent mutation sequence.
    pub fn recomputed_balance(&self) -> Decimal {
        self.total_incomes() - self.total_expenses()
    }

    /// Resolve a category reference for display. Dangling or absent
    /// references fall back to [`UNCATEGORIZED`].
    pub fn category_display(&self, category_id: Option<Uuid>) -> &str {
        category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id))
            .map(|c| c.name.as_str())
            .unwrap_or(UNCATEGORIZED)
    }
}

/// Partial-merge update of a ledger snapshot (`PUT /finance`). `None`
/// collections are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerPatch {
    pub balance: Option<Decimal>,
    pub expenses: Option<Vec<Expense>>,
    pub incomes: Option<Vec<Income>>,
    pub categories: Option<Vec<Category>>,
    pub recurring_bills: Option<Vec<RecurringBill>>,
}

impl LedgerPatch {
    /// A patch carrying only the balance scalar.
    pub fn balance_only(balance: Decimal) -> Self {
        LedgerPatch {
            balance: Some(balance),
            ..Default::default()
        }
    }

    /// Apply this patch to a stored snapshot.
    pub fn apply_to(self, snapshot: &mut LedgerSnapshot) {
        if let Some(v) = self.balance {
            snapshot.balance = v;
        }
        if let Some(v) = self.expenses {
            snapshot.expenses = v;
        }
        if let Some(v) = self.incomes {
            snapshot.incomes = v;
        }
        if let Some(v) = self.categories {
            snapshot.categories = v;
        }
        if let Some(v) = self.recurring_bills {
            snapshot.recurring_bills = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Auth wire types
// ---------------------------------------------------------------------------

/// Public user record returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Only used by register; ignored by login.
    #[serde(default)]
    pub display_name: String,
}

/// `{ token, user }` payload returned by login/register.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors raised by ledger validation and settlement transitions.
///
/// These reject *before* any local mutation — a returned error means the
/// in-memory state is unchanged.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LedgerError {
    #[error("Amount must be non-negative, got {0}")]
    NegativeAmount(Decimal),

    #[error("Description must not be blank")]
    BlankDescription,

    #[error("Name must not be blank")]
    BlankName,

    #[error("Due day must be within 1..=31, got {0}")]
    InvalidDueDay(u8),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(Uuid),

    #[error("Income not found: {0}")]
    IncomeNotFound(Uuid),

    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),

    #[error("Recurring bill not found: {0}")]
    BillNotFound(Uuid),

    #[error("Bill {0} is already fully paid")]
    BillAlreadyPaid(Uuid),

    #[error("Bill {0} has no payment to revert")]
    BillNotPaid(Uuid),

    #[error("Partial payment {paid} exceeds remaining {remaining}")]
    PartialExceedsRemaining { paid: Decimal, remaining: Decimal },
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
