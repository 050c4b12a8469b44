//! ApiClient against a real backend instance on an ephemeral port.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use pocketledger::client::{ApiClient, ClientError};
use pocketledger::gate::ConfigSource;
use pocketledger::ledger::FinanceStore;
use pocketledger::server::routes::BackendState;
use pocketledger::server::build_router;
use pocketledger::types::{ConfigPatch, Credentials, Expense, LedgerPatch};

const ADMIN_TOKEN: &str = "test-admin-token";

/// Spin up the backend on 127.0.0.1:0 and return a client pointed at it.
async fn client_against_server() -> ApiClient {
    let state = Arc::new(BackendState::new(ADMIN_TOKEN.to_string()));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    ApiClient::new(&format!("http://{addr}")).unwrap()
}

fn credentials(email: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: "hunter2hunter2".to_string(),
        display_name: "Pierre".to_string(),
    }
}

#[tokio::test]
async fn test_register_login_and_snapshot_roundtrip() {
    let client = client_against_server().await;

    let user = client.register(&credentials("pierre@example.com")).await.unwrap();
    assert_eq!(user.email, "pierre@example.com");
    assert!(client.is_authenticated());

    // Fresh account: zero balance, seeded categories
    let snapshot = client.fetch_snapshot().await.unwrap();
    assert_eq!(snapshot.balance, rust_decimal::Decimal::ZERO);
    assert!(!snapshot.categories.is_empty());

    // A second session via login sees the same account
    client.logout();
    client
        .login("pierre@example.com", "hunter2hunter2")
        .await
        .unwrap();
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_expense_persistence_through_store_seam() {
    let client = client_against_server().await;
    client.register(&credentials("marie@example.com")).await.unwrap();

    let expense = Expense {
        id: Uuid::new_v4(),
        amount: dec!(42.50),
        description: "Dinner".to_string(),
        category_id: None,
        date: Utc::now(),
    };
    client.save_expense(&expense).await.unwrap();
    client
        .merge_snapshot(&LedgerPatch::balance_only(dec!(-42.50)))
        .await
        .unwrap();

    let snapshot = client.fetch_snapshot().await.unwrap();
    assert_eq!(snapshot.balance, dec!(-42.50));
    assert_eq!(snapshot.expenses.len(), 1);
    assert_eq!(snapshot.expenses[0].description, "Dinner");

    client.delete_expense(expense.id).await.unwrap();
    let snapshot = client.fetch_snapshot().await.unwrap();
    assert!(snapshot.expenses.is_empty());
}

#[tokio::test]
async fn test_delete_missing_expense_surfaces_api_error() {
    let client = client_against_server().await;
    client.register(&credentials("zoe@example.com")).await.unwrap();

    let err = client.delete_expense(Uuid::new_v4()).await.unwrap_err();
    let client_err = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ClientError>())
        .expect("expected a ClientError in the chain");
    match client_err {
        ClientError::Api { status, message } => {
            assert_eq!(*status, 404);
            assert!(message.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_rejected_token_clears_session() {
    let client = client_against_server().await;
    client.set_session_token("stale-token".to_string());

    let err = client.fetch_snapshot().await.unwrap_err();
    assert!(err
        .chain()
        .any(|cause| matches!(
            cause.downcast_ref::<ClientError>(),
            Some(ClientError::Unauthorized)
        )));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_duplicate_register_conflicts() {
    let client = client_against_server().await;
    client.register(&credentials("dup@example.com")).await.unwrap();

    let err = client.register(&credentials("dup@example.com")).await.unwrap_err();
    assert!(format!("{err:#}").contains("Email already registered"));
}

#[tokio::test]
async fn test_config_fetch_and_admin_update() {
    let client = client_against_server().await;

    let config = client.fetch_config().await.unwrap();
    assert!(!config.is_maintenance);

    let updated = client
        .update_config(
            ADMIN_TOKEN,
            &ConfigPatch {
                show_warning: Some(true),
                warning_message: Some("Fees change next month".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.show_warning);

    // Public fetch sees the merged singleton
    let config = client.fetch_config().await.unwrap();
    assert!(config.show_warning);
    assert_eq!(config.warning_message, "Fees change next month");

    // Wrong token is rejected
    assert!(client
        .update_config("wrong-token", &ConfigPatch::default())
        .await
        .is_err());
}
