//! Common test utilities for installment-service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use installment_service::config::{AggregatorConfig, DatabaseConfig, InstallmentConfig};
use installment_service::models::{
    FineType, LeaseAccount, PaymentMethod, PostInstallment, ProcessType,
};
use installment_service::services::{
    AccountLocks, FinePolicy, LedgerService, MemoryStore, OutstandingAggregator,
    RecoveryCoordinator,
};
use installment_service::startup::Application;
use service_core::config::Config as CommonConfig;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,installment_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn date(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// A monthly lease account with the given seed balance.
pub fn lease_account(remaining_balance: &str, duration: i32, advance: &str) -> LeaseAccount {
    let account_id = Uuid::new_v4();
    LeaseAccount {
        account_id,
        acc_no: format!("ACC-{}", &account_id.to_string()[..8]),
        process_type: ProcessType::Monthly.as_str().to_string(),
        installment_price: d(remaining_balance),
        advance: d(advance),
        monthly_installment: d("100"),
        duration,
        remaining_balance: d(remaining_balance),
        created_utc: Utc::now(),
    }
}

/// A cash posting with no fine or discount.
pub fn cash_posting(account_id: Uuid, charge: &str, day: NaiveDate) -> PostInstallment {
    PostInstallment {
        account_id,
        install_date: day,
        install_charge: d(charge),
        fine: Decimal::ZERO,
        fine_type: FineType::Fixed,
        discount: Decimal::ZERO,
        payment_method: PaymentMethod::Cash,
        bank_account_id: None,
        officer_id: None,
        notes: None,
    }
}

/// Engine services wired over one shared in-memory store.
pub struct Engine {
    pub store: Arc<MemoryStore>,
    pub locks: Arc<AccountLocks>,
    pub ledger: LedgerService,
    pub aggregator: OutstandingAggregator,
    pub coordinator: RecoveryCoordinator,
}

pub fn engine() -> Engine {
    engine_with_policy(FinePolicy::default())
}

pub fn engine_with_policy(policy: FinePolicy) -> Engine {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let locks = Arc::new(AccountLocks::new());
    Engine {
        store: store.clone(),
        locks: locks.clone(),
        ledger: LedgerService::new(store.clone(), policy, locks.clone()),
        aggregator: OutstandingAggregator::new(store.clone(), locks.clone(), 4),
        coordinator: RecoveryCoordinator::new(store, locks),
    }
}

fn test_config() -> InstallmentConfig {
    InstallmentConfig {
        common: CommonConfig { port: 0 },
        service_name: "installment-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 2,
            min_connections: 1,
        },
        fine_policy: FinePolicy::default(),
        aggregator: AggregatorConfig {
            refresh_concurrency: 4,
        },
    }
}

/// Spawn the HTTP application over an in-memory store and return its base
/// URL plus the store for seeding.
pub async fn spawn_app() -> (String, Arc<MemoryStore>) {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let app = Application::build_with_store(test_config(), store.clone())
        .await
        .expect("Failed to build application");

    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    (format!("http://127.0.0.1:{}", port), store)
}
