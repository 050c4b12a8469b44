//! End-to-end flows through ledger, settlement, and the config gate
//! against the deterministic mock backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use pocketledger::gate::{ConfigGate, GateDecision};
use pocketledger::ledger::Ledger;
use pocketledger::types::{
    BillDraft, ExpenseDraft, IncomeDraft, LedgerSnapshot, RemoteConfig,
};

use crate::mock_store::{MockStore, RecordedOp};

fn expense(amount: Decimal, description: &str) -> ExpenseDraft {
    ExpenseDraft {
        amount,
        description: description.to_string(),
        category_id: None,
        date: Utc::now(),
    }
}

fn income(amount: Decimal, description: &str) -> IncomeDraft {
    IncomeDraft {
        amount,
        description: description.to_string(),
        date: Utc::now(),
    }
}

fn bill(name: &str, amount: Decimal, due_day: u8) -> BillDraft {
    BillDraft {
        name: name.to_string(),
        amount,
        due_day,
        category_id: None,
    }
}

// ---------------------------------------------------------------------------
// Ledger persistence flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mutations_reach_backend_in_order() {
    let store = Arc::new(MockStore::new());
    let ledger = Ledger::new(store.clone());

    let expense_id = ledger.add_expense(expense(dec!(20), "Taxi")).unwrap();
    let income_id = ledger.add_income(income(dec!(500), "Freelance")).unwrap();
    ledger.delete_expense(expense_id).unwrap();
    ledger.flush().await;

    let ops: Vec<RecordedOp> = store
        .recorded()
        .into_iter()
        .filter(|op| !matches!(op, RecordedOp::Merge))
        .collect();
    assert_eq!(
        ops,
        vec![
            RecordedOp::SaveExpense(expense_id),
            RecordedOp::SaveIncome(income_id),
            RecordedOp::DeleteExpense(expense_id),
        ]
    );

    // The backend converged to the same state the ledger holds
    let persisted = store.persisted();
    assert_eq!(persisted.balance, dec!(500));
    assert!(persisted.expenses.is_empty());
    assert_eq!(persisted.incomes.len(), 1);
    assert_eq!(ledger.balance(), dec!(500));
}

#[tokio::test]
async fn test_failed_persistence_reconciled_by_refresh() {
    let store = Arc::new(MockStore::new());
    let ledger = Ledger::new(store.clone());

    ledger.add_income(income(dec!(100), "Seed")).unwrap();
    ledger.flush().await;

    // Backend goes down; the optimistic mutation sticks locally
    store.set_error("backend unavailable");
    let ghost = ledger.add_expense(expense(dec!(60), "Never lands")).unwrap();
    ledger.flush().await;

    assert_eq!(ledger.balance(), dec!(40));
    assert_eq!(store.persisted().balance, dec!(100));

    // Backend recovers; reconciliation replaces local state with truth
    store.clear_error();
    ledger.refresh_from_remote().await.unwrap();

    assert_eq!(ledger.balance(), dec!(100));
    assert!(ledger.expense(ghost).is_none());
}

#[tokio::test]
async fn test_refresh_fails_while_backend_down() {
    let store = Arc::new(MockStore::new());
    let ledger = Ledger::new(store.clone());
    ledger.add_income(income(dec!(5), "Local")).unwrap();

    store.set_error("backend unavailable");
    assert!(ledger.refresh_from_remote().await.is_err());
    // Local state untouched by the failed reconciliation
    assert_eq!(ledger.balance(), dec!(5));
}

#[tokio::test]
async fn test_ledger_seeded_from_fetched_snapshot() {
    let store = Arc::new(MockStore::new());
    store.set_snapshot(LedgerSnapshot {
        balance: dec!(321),
        ..Default::default()
    });

    let snapshot = pocketledger::ledger::FinanceStore::fetch_snapshot(store.as_ref())
        .await
        .unwrap();
    let ledger = Ledger::with_state(store, snapshot);
    assert_eq!(ledger.balance(), dec!(321));
}

// ---------------------------------------------------------------------------
// Settlement persistence flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bill_payment_round_trip_persists() {
    let store = Arc::new(MockStore::new());
    let ledger = Ledger::new(store.clone());

    let bill_id = ledger.add_bill(bill("Rent", dec!(1200), 1)).unwrap();
    let expense_id = ledger.pay_bill(bill_id).unwrap();
    ledger.flush().await;

    let persisted = store.persisted();
    assert_eq!(persisted.balance, dec!(-1200));
    assert_eq!(persisted.expenses.len(), 1);
    assert_eq!(persisted.expenses[0].id, expense_id);
    let persisted_bill = &persisted.recurring_bills[0];
    assert!(persisted_bill.payment.is_paid());

    ledger.unpay_bill(bill_id).unwrap();
    ledger.flush().await;

    let persisted = store.persisted();
    assert_eq!(persisted.balance, Decimal::ZERO);
    assert!(persisted.expenses.is_empty());
    assert!(persisted.recurring_bills[0].payment.is_pending());
}

#[tokio::test]
async fn test_partial_payments_persist_accumulated_state() {
    let store = Arc::new(MockStore::new());
    let ledger = Ledger::new(store.clone());

    let bill_id = ledger.add_bill(bill("Electricity", dec!(90), 10)).unwrap();
    ledger.pay_bill_partial(bill_id, dec!(30)).unwrap();
    ledger.pay_bill_partial(bill_id, dec!(40)).unwrap();
    ledger.flush().await;

    let persisted = store.persisted();
    assert_eq!(persisted.balance, dec!(-70));
    assert_eq!(persisted.expenses.len(), 2);
    let persisted_bill = &persisted.recurring_bills[0];
    assert_eq!(persisted_bill.payment.amount_paid(dec!(90)), dec!(70));
    assert!(!persisted_bill.payment.is_paid());
}

#[tokio::test]
async fn test_delete_paid_bill_leaves_clean_backend() {
    let store = Arc::new(MockStore::new());
    let ledger = Ledger::new(store.clone());

    let bill_id = ledger.add_bill(bill("Internet", dec!(50), 15)).unwrap();
    ledger.pay_bill(bill_id).unwrap();
    ledger.delete_bill(bill_id).unwrap();
    ledger.flush().await;

    let persisted = store.persisted();
    assert!(persisted.recurring_bills.is_empty());
    assert!(persisted.expenses.is_empty());
    assert_eq!(persisted.balance, Decimal::ZERO);
}

// ---------------------------------------------------------------------------
// Gate flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gate_follows_remote_transitions() {
    let store = Arc::new(MockStore::new());
    let gate = ConfigGate::with_version(store.clone(), "1.4.2");

    gate.refresh().await;
    assert_eq!(gate.decision().await, GateDecision::Open);

    store.set_config(RemoteConfig {
        is_maintenance: true,
        maintenance_message: "Back at noon".to_string(),
        ..Default::default()
    });
    gate.refresh().await;
    assert_eq!(
        gate.decision().await,
        GateDecision::Maintenance {
            message: "Back at noon".to_string()
        }
    );

    store.set_config(RemoteConfig {
        has_update_flag: true,
        force_update: true,
        latest_version: "2.0.0".to_string(),
        update_message: "Please update".to_string(),
        update_url: "https://example.com/app".to_string(),
        ..Default::default()
    });
    gate.refresh().await;
    assert!(matches!(
        gate.decision().await,
        GateDecision::UpdateRequired { .. }
    ));
}

#[tokio::test]
async fn test_gate_serves_stale_cache_while_backend_down() {
    let store = Arc::new(MockStore::new());
    store.set_config(RemoteConfig {
        show_warning: true,
        warning_message: "Planned maintenance Sunday".to_string(),
        ..Default::default()
    });
    let gate = ConfigGate::with_version(store.clone(), "1.4.2");

    gate.refresh().await;
    assert!(gate.active_warning().await.is_some());

    store.set_error("backend unavailable");
    gate.refresh().await;

    // Last good copy keeps serving
    assert_eq!(
        gate.active_warning().await,
        Some("Planned maintenance Sunday".to_string())
    );
    assert_eq!(gate.decision().await, GateDecision::Open);
}

#[tokio::test]
async fn test_gate_and_ledger_share_one_backend() {
    // One MockStore backs both seams, like ApiClient does in production.
    let store = Arc::new(MockStore::new());
    let gate = ConfigGate::with_version(store.clone(), "1.4.2");
    let ledger = Ledger::new(store.clone());

    gate.refresh().await;
    ledger.add_expense(expense(dec!(7), "Coffee")).unwrap();
    ledger.flush().await;

    assert_eq!(gate.decision().await, GateDecision::Open);
    assert_eq!(store.persisted().balance, dec!(-7));
    assert!(store
        .recorded()
        .iter()
        .any(|op| matches!(op, RecordedOp::FetchConfig)));
}

#[tokio::test]
async fn test_poll_loop_refreshes_on_foreground_signal() {
    let store = Arc::new(MockStore::new());
    let gate = Arc::new(ConfigGate::with_version(store.clone(), "1.4.2"));
    let (tx, rx) = tokio::sync::mpsc::channel(1);

    let handle = tokio::spawn(pocketledger::gate::run_poll_loop(
        gate.clone(),
        Duration::from_secs(3600),
        rx,
    ));

    tx.send(()).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    let fetches = store
        .recorded()
        .iter()
        .filter(|op| matches!(op, RecordedOp::FetchConfig))
        .count();
    // Initial refresh plus the foreground nudge
    assert!(fetches >= 2, "expected at least 2 fetches, saw {fetches}");
}

// ---------------------------------------------------------------------------
// Reconciliation after competing edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_remote_truth_wins_over_unsynced_local_edits() {
    let store = Arc::new(MockStore::new());
    let ledger = Ledger::new(store.clone());

    ledger.add_income(income(dec!(1000), "Salary")).unwrap();
    ledger.flush().await;

    // Another device rewrites the backend snapshot directly
    let mut remote = store.persisted();
    remote.balance = dec!(900);
    remote.expenses.push(pocketledger::types::Expense {
        id: Uuid::new_v4(),
        amount: dec!(100),
        description: "Booked elsewhere".to_string(),
        category_id: None,
        date: Utc::now(),
    });
    store.set_snapshot(remote);

    ledger.refresh_from_remote().await.unwrap();
    let snapshot = ledger.snapshot();
    assert_eq!(snapshot.balance, dec!(900));
    assert_eq!(snapshot.expenses.len(), 1);
    assert_eq!(snapshot.balance, snapshot.recomputed_balance());
}
