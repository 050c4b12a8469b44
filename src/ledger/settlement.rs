//! Recurring bill settlement.
//!
//! Paying a bill materialises a real expense in the ledger (so payments
//! show up in history and in the balance) and advances the bill's
//! [`PaymentState`]. Partial payments accumulate; the bill flips to
//! `Paid` exactly when the materialised payments cover its amount.
//! Unpaying reverses everything: the materialised expenses are deleted
//! and the state returns to `Pending`.
//!
//! All transitions validate first and mutate under one write lock, so a
//! rejected transition leaves both the bill and the expense list
//! untouched.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::{Ledger, PersistOp};
use crate::types::{ExpenseDraft, LedgerError, LedgerPatch, PaymentState};

impl Ledger {
    /// Pay the remaining amount of a bill in full.
    ///
    /// Valid from `Pending` (pays the whole amount) and `Partial` (pays
    /// the remainder). Returns the id of the materialised expense.
    pub fn pay_bill(&self, id: Uuid) -> Result<Uuid, LedgerError> {
        let mut state = self.state.write().unwrap();
        let idx = state
            .recurring_bills
            .iter()
            .position(|b| b.id == id)
            .ok_or(LedgerError::BillNotFound(id))?;

        let bill = &state.recurring_bills[idx];
        if bill.payment.is_paid() {
            return Err(LedgerError::BillAlreadyPaid(id));
        }
        let remaining = bill.amount - bill.payment.amount_paid(bill.amount);
        let mut expense_ids = bill.payment.expense_ids().to_vec();
        let draft = Self::settlement_draft(bill.name.clone(), remaining, bill.category_id);

        let expense_id = Self::insert_expense_locked(&mut state, &self.tx, draft);
        expense_ids.push(expense_id);

        let bill = &mut state.recurring_bills[idx];
        bill.payment = PaymentState::Paid { expense_ids };
        bill.last_paid_date = Some(Utc::now());
        debug!(bill = %bill.name, %remaining, "Bill paid in full");

        self.enqueue_settlement_merge(&state);
        Ok(expense_id)
    }

    /// Pay part of a bill's remaining amount.
    ///
    /// The payment materialises its own expense. When accumulated
    /// payments cover the bill's amount the state flips to `Paid`;
    /// overshooting the remainder is rejected before any mutation.
    pub fn pay_bill_partial(&self, id: Uuid, amount: Decimal) -> Result<Uuid, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }

        let mut state = self.state.write().unwrap();
        let idx = state
            .recurring_bills
            .iter()
            .position(|b| b.id == id)
            .ok_or(LedgerError::BillNotFound(id))?;

        let bill = &state.recurring_bills[idx];
        if bill.payment.is_paid() {
            return Err(LedgerError::BillAlreadyPaid(id));
        }
        let already_paid = bill.payment.amount_paid(bill.amount);
        let remaining = bill.amount - already_paid;
        if amount > remaining {
            return Err(LedgerError::PartialExceedsRemaining {
                paid: amount,
                remaining,
            });
        }
        let mut expense_ids = bill.payment.expense_ids().to_vec();
        let draft = Self::settlement_draft(bill.name.clone(), amount, bill.category_id);

        let expense_id = Self::insert_expense_locked(&mut state, &self.tx, draft);
        expense_ids.push(expense_id);
        let total_paid = already_paid + amount;

        let bill = &mut state.recurring_bills[idx];
        if total_paid == bill.amount {
            bill.payment = PaymentState::Paid { expense_ids };
            bill.last_paid_date = Some(Utc::now());
            debug!(bill = %bill.name, "Partial payment completed the bill");
        } else {
            bill.payment = PaymentState::Partial {
                paid: total_paid,
                expense_ids,
            };
            debug!(bill = %bill.name, paid = %total_paid, "Partial payment recorded");
        }

        self.enqueue_settlement_merge(&state);
        Ok(expense_id)
    }

    /// Revert all payments made toward a bill this cycle.
    ///
    /// Every expense materialised by settlement is deleted (restoring the
    /// balance) and the bill returns to `Pending`.
    pub fn unpay_bill(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        let idx = state
            .recurring_bills
            .iter()
            .position(|b| b.id == id)
            .ok_or(LedgerError::BillNotFound(id))?;

        if state.recurring_bills[idx].payment.is_pending() {
            return Err(LedgerError::BillNotPaid(id));
        }
        let expense_ids = state.recurring_bills[idx].payment.expense_ids().to_vec();
        for expense_id in expense_ids {
            // A reconciled snapshot may have dropped the expense already.
            let _ = Self::remove_expense_locked(&mut state, &self.tx, expense_id);
        }

        let bill = &mut state.recurring_bills[idx];
        bill.payment = PaymentState::Pending;
        bill.last_paid_date = None;
        debug!(bill = %bill.name, "Bill payment reverted");

        self.enqueue_settlement_merge(&state);
        Ok(())
    }

    /// Remove a bill, reversing any settlement first so no orphaned
    /// payment expenses remain.
    pub fn delete_bill(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        let idx = state
            .recurring_bills
            .iter()
            .position(|b| b.id == id)
            .ok_or(LedgerError::BillNotFound(id))?;

        let expense_ids = state.recurring_bills[idx].payment.expense_ids().to_vec();
        for expense_id in expense_ids {
            let _ = Self::remove_expense_locked(&mut state, &self.tx, expense_id);
        }
        state.recurring_bills.remove(idx);
        debug!(%id, "Bill deleted");

        self.enqueue_settlement_merge(&state);
        Ok(())
    }

    fn settlement_draft(name: String, amount: Decimal, category_id: Option<Uuid>) -> ExpenseDraft {
        ExpenseDraft {
            amount,
            description: format!("Bill payment: {name}"),
            category_id,
            date: Utc::now(),
        }
    }

    /// Bills and balance change together in every settlement transition.
    fn enqueue_settlement_merge(&self, state: &crate::types::LedgerSnapshot) {
        let _ = self.tx.send(PersistOp::Merge(LedgerPatch {
            balance: Some(state.balance),
            recurring_bills: Some(state.recurring_bills.clone()),
            ..Default::default()
        }));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
