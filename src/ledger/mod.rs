//! The in-memory financial ledger.
//!
//! One [`Ledger`] holds the authoritative view of a single signed-in
//! user's data: balance, expenses, incomes, categories, and recurring
//! bills. Every mutation is optimistic: local state changes synchronously
//! (ids are returned immediately), and persistence ops are enqueued on a
//! single ordered write queue drained by a background task calling the
//! [`FinanceStore`] seam.
//!
//! Persistence failures are logged and the local state is *not* rolled
//! back; recovery is by snapshot reconciliation via
//! [`Ledger::refresh_from_remote`]. The queue guarantees ops reach the
//! store in invocation order, so a slow completion can never race ahead
//! of a newer edit.

pub mod settlement;

use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{
    BillDraft, Category, Expense, ExpenseDraft, Income, IncomeDraft, LedgerError, LedgerPatch,
    LedgerSnapshot, PaymentState, RecurringBill,
};

#[cfg(test)]
use mockall::automock;

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// Remote persistence for one user's ledger.
///
/// The production implementation is the HTTP [`crate::client::ApiClient`];
/// tests substitute mocks. Single-entity ops map to the dedicated
/// endpoints, `merge_snapshot` to the partial-merge `PUT /finance`.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait FinanceStore: Send + Sync {
    async fn save_expense(&self, expense: &Expense) -> Result<()>;
    async fn delete_expense(&self, id: Uuid) -> Result<()>;
    async fn save_income(&self, income: &Income) -> Result<()>;
    async fn delete_income(&self, id: Uuid) -> Result<()>;
    async fn merge_snapshot(&self, patch: &LedgerPatch) -> Result<()>;
    async fn fetch_snapshot(&self) -> Result<LedgerSnapshot>;
}

// ---------------------------------------------------------------------------
// Write queue
// ---------------------------------------------------------------------------

/// One unit of work for the persistence writer.
enum PersistOp {
    SaveExpense(Expense),
    DeleteExpense(Uuid),
    SaveIncome(Income),
    DeleteIncome(Uuid),
    Merge(LedgerPatch),
    /// Ack once every op enqueued before this one has been attempted.
    Flush(oneshot::Sender<()>),
}

/// Drain the write queue in order. Failures are logged, never retried
/// here — the next full sync reconciles.
async fn run_writer(store: Arc<dyn FinanceStore>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        let result = match &op {
            PersistOp::SaveExpense(e) => store.save_expense(e).await,
            PersistOp::DeleteExpense(id) => store.delete_expense(*id).await,
            PersistOp::SaveIncome(i) => store.save_income(i).await,
            PersistOp::DeleteIncome(id) => store.delete_income(*id).await,
            PersistOp::Merge(patch) => store.merge_snapshot(patch).await,
            PersistOp::Flush(_) => Ok(()),
        };

        if let PersistOp::Flush(ack) = op {
            let _ = ack.send(());
            continue;
        }

        if let Err(e) = result {
            // Known consistency gap: optimistic local state is retained.
            warn!(error = %e, "Ledger persistence failed; local state retained");
        }
    }
    debug!("Ledger write queue closed");
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Optimistic in-memory ledger with ordered background persistence.
///
/// Mutations validate first, then apply atomically under one write lock
/// (readers never observe partial updates), then enqueue persistence.
pub struct Ledger {
    state: RwLock<LedgerSnapshot>,
    tx: mpsc::UnboundedSender<PersistOp>,
    store: Arc<dyn FinanceStore>,
}

impl Ledger {
    /// Ledger starting from an empty snapshot.
    pub fn new(store: Arc<dyn FinanceStore>) -> Self {
        Self::with_state(store, LedgerSnapshot::default())
    }

    /// Ledger seeded with a previously fetched snapshot.
    pub fn with_state(store: Arc<dyn FinanceStore>, snapshot: LedgerSnapshot) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store.clone(), rx));
        Ledger {
            state: RwLock::new(snapshot),
            tx,
            store,
        }
    }

    fn enqueue(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            warn!("Ledger write queue is gone; dropping persistence op");
        }
    }

    // -- Reads -----------------------------------------------------------

    /// A copy of the full current state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state.read().unwrap().clone()
    }

    pub fn balance(&self) -> Decimal {
        self.state.read().unwrap().balance
    }

    pub fn expense(&self, id: Uuid) -> Option<Expense> {
        self.state
            .read()
            .unwrap()
            .expenses
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn bill(&self, id: Uuid) -> Option<RecurringBill> {
        self.state
            .read()
            .unwrap()
            .recurring_bills
            .iter()
            .find(|b| b.id == id)
            .cloned()
    }

    // -- Validation ------------------------------------------------------

    fn check_amount(amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }
        Ok(())
    }

    fn check_description(description: &str) -> Result<(), LedgerError> {
        if description.trim().is_empty() {
            return Err(LedgerError::BlankDescription);
        }
        Ok(())
    }

    // -- Expenses --------------------------------------------------------

    /// Append an expense and decrement the balance. The fresh id is
    /// returned synchronously from the optimistic update — callers such
    /// as bill settlement depend on it before persistence completes.
    pub fn add_expense(&self, draft: ExpenseDraft) -> Result<Uuid, LedgerError> {
        Self::check_amount(draft.amount)?;
        Self::check_description(&draft.description)?;

        let mut state = self.state.write().unwrap();
        let id = Self::insert_expense_locked(&mut state, &self.tx, draft);
        self.enqueue(PersistOp::Merge(LedgerPatch::balance_only(state.balance)));
        Ok(id)
    }

    /// Shared by `add_expense` and bill settlement, which already holds
    /// the state lock. Enqueues the entity save but not the balance patch.
    fn insert_expense_locked(
        state: &mut LedgerSnapshot,
        tx: &mpsc::UnboundedSender<PersistOp>,
        draft: ExpenseDraft,
    ) -> Uuid {
        let expense = Expense {
            id: Uuid::new_v4(),
            amount: draft.amount,
            description: draft.description,
            category_id: draft.category_id,
            date: draft.date,
        };
        let id = expense.id;
        state.balance -= expense.amount;
        let _ = tx.send(PersistOp::SaveExpense(expense.clone()));
        state.expenses.push(expense);
        debug!(%id, "Expense added");
        id
    }

    /// Replace an expense, adjusting the balance by `old - new`.
    pub fn update_expense(&self, updated: Expense) -> Result<(), LedgerError> {
        Self::check_amount(updated.amount)?;
        Self::check_description(&updated.description)?;

        let mut state = self.state.write().unwrap();
        let slot = state
            .expenses
            .iter_mut()
            .find(|e| e.id == updated.id)
            .ok_or(LedgerError::ExpenseNotFound(updated.id))?;

        let delta = slot.amount - updated.amount;
        *slot = updated.clone();
        state.balance += delta;

        self.enqueue(PersistOp::SaveExpense(updated));
        self.enqueue(PersistOp::Merge(LedgerPatch::balance_only(state.balance)));
        Ok(())
    }

    /// Remove an expense, adding its amount back to the balance.
    pub fn delete_expense(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        Self::remove_expense_locked(&mut state, &self.tx, id)?;
        self.enqueue(PersistOp::Merge(LedgerPatch::balance_only(state.balance)));
        Ok(())
    }

    fn remove_expense_locked(
        state: &mut LedgerSnapshot,
        tx: &mpsc::UnboundedSender<PersistOp>,
        id: Uuid,
    ) -> Result<(), LedgerError> {
        let idx = state
            .expenses
            .iter()
            .position(|e| e.id == id)
            .ok_or(LedgerError::ExpenseNotFound(id))?;
        let removed = state.expenses.remove(idx);
        state.balance += removed.amount;
        let _ = tx.send(PersistOp::DeleteExpense(id));
        debug!(%id, "Expense removed");
        Ok(())
    }

    // -- Incomes ---------------------------------------------------------

    /// Append an income and increment the balance.
    pub fn add_income(&self, draft: IncomeDraft) -> Result<Uuid, LedgerError> {
        Self::check_amount(draft.amount)?;
        Self::check_description(&draft.description)?;

        let income = Income {
            id: Uuid::new_v4(),
            amount: draft.amount,
            description: draft.description,
            date: draft.date,
        };
        let id = income.id;

        let mut state = self.state.write().unwrap();
        state.balance += income.amount;
        self.enqueue(PersistOp::SaveIncome(income.clone()));
        state.incomes.push(income);
        self.enqueue(PersistOp::Merge(LedgerPatch::balance_only(state.balance)));
        Ok(id)
    }

    /// Replace an income, adjusting the balance by `new - old`.
    pub fn update_income(&self, updated: Income) -> Result<(), LedgerError> {
        Self::check_amount(updated.amount)?;
        Self::check_description(&updated.description)?;

        let mut state = self.state.write().unwrap();
        let slot = state
            .incomes
            .iter_mut()
            .find(|i| i.id == updated.id)
            .ok_or(LedgerError::IncomeNotFound(updated.id))?;

        let delta = updated.amount - slot.amount;
        *slot = updated.clone();
        state.balance += delta;

        self.enqueue(PersistOp::SaveIncome(updated));
        self.enqueue(PersistOp::Merge(LedgerPatch::balance_only(state.balance)));
        Ok(())
    }

    /// Remove an income, subtracting its amount from the balance.
    pub fn delete_income(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        let idx = state
            .incomes
            .iter()
            .position(|i| i.id == id)
            .ok_or(LedgerError::IncomeNotFound(id))?;
        let removed = state.incomes.remove(idx);
        state.balance -= removed.amount;

        self.enqueue(PersistOp::DeleteIncome(id));
        self.enqueue(PersistOp::Merge(LedgerPatch::balance_only(state.balance)));
        Ok(())
    }

    // -- Categories ------------------------------------------------------

    /// Add a user-created category. Pure collection mutation — no balance
    /// effect.
    pub fn add_category(&self, name: &str, color: &str, icon: &str) -> Result<Uuid, LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::BlankName);
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            is_custom: true,
        };
        let id = category.id;

        let mut state = self.state.write().unwrap();
        state.categories.push(category);
        self.enqueue(PersistOp::Merge(LedgerPatch {
            categories: Some(state.categories.clone()),
            ..Default::default()
        }));
        Ok(id)
    }

    pub fn update_category(&self, updated: Category) -> Result<(), LedgerError> {
        if updated.name.trim().is_empty() {
            return Err(LedgerError::BlankName);
        }
        let mut state = self.state.write().unwrap();
        let slot = state
            .categories
            .iter_mut()
            .find(|c| c.id == updated.id)
            .ok_or(LedgerError::CategoryNotFound(updated.id))?;
        *slot = updated;

        self.enqueue(PersistOp::Merge(LedgerPatch {
            categories: Some(state.categories.clone()),
            ..Default::default()
        }));
        Ok(())
    }

    /// Remove a category. Referencing expenses are left untouched with a
    /// dangling id — they resolve to "Uncategorized" at read time.
    pub fn delete_category(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        let idx = state
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or(LedgerError::CategoryNotFound(id))?;
        state.categories.remove(idx);

        self.enqueue(PersistOp::Merge(LedgerPatch {
            categories: Some(state.categories.clone()),
            ..Default::default()
        }));
        Ok(())
    }

    // -- Recurring bills (creation; settlement lives in `settlement`) ----

    /// Register a recurring bill, starting `Pending`.
    pub fn add_bill(&self, draft: BillDraft) -> Result<Uuid, LedgerError> {
        if draft.name.trim().is_empty() {
            return Err(LedgerError::BlankName);
        }
        Self::check_amount(draft.amount)?;
        if !(1..=31).contains(&draft.due_day) {
            return Err(LedgerError::InvalidDueDay(draft.due_day));
        }

        let bill = RecurringBill {
            id: Uuid::new_v4(),
            name: draft.name,
            amount: draft.amount,
            due_day: draft.due_day,
            category_id: draft.category_id,
            payment: PaymentState::Pending,
            last_paid_date: None,
        };
        let id = bill.id;

        let mut state = self.state.write().unwrap();
        state.recurring_bills.push(bill);
        self.enqueue(PersistOp::Merge(LedgerPatch {
            recurring_bills: Some(state.recurring_bills.clone()),
            ..Default::default()
        }));
        Ok(id)
    }

    // -- Sync ------------------------------------------------------------

    /// Block until every persistence op enqueued so far has been
    /// attempted. Used at shutdown and in tests.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Replace local state with the server's snapshot.
    ///
    /// This is the reconciliation path for the documented
    /// optimistic-without-rollback gap: any mutation whose persistence
    /// failed is overwritten by server truth here.
    pub async fn refresh_from_remote(&self) -> Result<()> {
        let snapshot = self.store.fetch_snapshot().await?;
        info!(
            balance = %snapshot.balance,
            expenses = snapshot.expenses.len(),
            incomes = snapshot.incomes.len(),
            bills = snapshot.recurring_bills.len(),
            "Ledger reconciled from remote snapshot"
        );
        *self.state.write().unwrap() = snapshot;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
