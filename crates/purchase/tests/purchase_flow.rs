//! End-to-end purchase flow: coordinator run loop plus live worker pools.

use std::sync::Arc;
use std::time::Duration;

use common::{InstanceId, Payload};
use domain::{DefinitionRegistry, SagaInstance, SagaStatus};
use purchase::{PurchaseServices, register_workers, seed_demo_data};
use result_store::InMemoryResultStore;
use saga::{CoordinatorConfig, SagaCoordinator};
use task_channel::{ChannelConfig, InMemoryTaskChannel};
use tokio::sync::watch;
use worker::{WorkerConfig, WorkerSet, WorkerSetHandle};

type PurchaseCoordinator = SagaCoordinator<InMemoryResultStore, InMemoryTaskChannel>;

struct TestHarness {
    coordinator: Arc<PurchaseCoordinator>,
    services: PurchaseServices,
    shutdown: watch::Sender<bool>,
    workers: WorkerSetHandle,
    coordinator_task: tokio::task::JoinHandle<()>,
}

impl TestHarness {
    fn start() -> Self {
        let channel = InMemoryTaskChannel::new(ChannelConfig::default());
        let store = InMemoryResultStore::new();

        let mut registry = DefinitionRegistry::new();
        registry.register(purchase::definition());

        let config = CoordinatorConfig {
            result_poll_timeout: Duration::from_millis(50),
            reclaim_interval: Duration::from_millis(100),
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(SagaCoordinator::new(
            store,
            channel.clone(),
            Arc::new(registry),
            config,
        ));

        let services = PurchaseServices::new();
        seed_demo_data(&services);

        let worker_config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(50),
            concurrency: 2,
        };
        let mut set = WorkerSet::new();
        register_workers(&mut set, &services, worker_config);
        let workers = set.start(channel.clone());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let loop_coordinator = Arc::clone(&coordinator);
        let coordinator_task =
            tokio::spawn(async move { loop_coordinator.run(shutdown_rx).await });

        Self {
            coordinator,
            services,
            shutdown,
            workers,
            coordinator_task,
        }
    }

    async fn wait_for_terminal(&self, instance_id: InstanceId) -> SagaInstance {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let instance = self
                .coordinator
                .status(instance_id)
                .await
                .unwrap()
                .expect("instance exists");
            if instance.status().is_terminal() {
                return instance;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "saga did not reach a terminal state in time (status {})",
                instance.status()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.workers.shutdown().await;
        let _ = self.coordinator_task.await;
    }
}

fn purchase_input(amount: &str) -> Payload {
    Payload::from_pairs([
        ("customerId", "BCCNCL"),
        ("accountId", "BCCNCL"),
        ("productCodes", "P-001,P-002"),
        ("amount", amount),
    ])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_successful_purchase_runs_all_steps() {
    let harness = TestHarness::start();

    let instance_id = harness
        .coordinator
        .start("purchase", "O-001", purchase_input("2500"))
        .await
        .unwrap();

    let instance = harness.wait_for_terminal(instance_id).await;
    assert_eq!(instance.status(), SagaStatus::Completed);

    // Step outputs accumulated in the instance context.
    assert_eq!(instance.context().get("fraudCheck"), Some("PASS"));
    assert_eq!(instance.context().get("reservationId"), Some("RES-0001"));
    assert_eq!(instance.context().get("paymentId"), Some("PAY-0001"));
    assert_eq!(instance.context().get("orderState"), Some("CONFIRMED"));

    // Every service applied its local side effect exactly once.
    let services = &harness.services;
    assert_eq!(services.inventory.quantity("P-001"), Some(9));
    assert_eq!(services.inventory.quantity("P-002"), Some(9));
    assert_eq!(services.payment.balance("BCCNCL"), Some(47_500));
    assert_eq!(services.payment.payment_count(), 1);
    assert_eq!(services.warehouse.on_hand("P-001"), Some(9));
    assert!(services.cart.cart_contents("BCCNCL").is_empty());
    assert_eq!(services.orders.order_state("O-001"), Some("CONFIRMED"));

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_payment_failure_unwinds_reservation() {
    let harness = TestHarness::start();
    harness.services.payment.set_fail_on_charge(true);

    let instance_id = harness
        .coordinator
        .start("purchase", "O-002", purchase_input("2500"))
        .await
        .unwrap();

    let instance = harness.wait_for_terminal(instance_id).await;
    assert_eq!(instance.status(), SagaStatus::Compensated);
    assert!(instance.failure_reason().unwrap().contains("charge-payment"));

    let services = &harness.services;
    // The inventory reservation was released; nothing else ever ran.
    assert_eq!(services.inventory.quantity("P-001"), Some(10));
    assert_eq!(services.inventory.quantity("P-002"), Some(10));
    assert_eq!(services.inventory.reservation_count(), 0);
    assert_eq!(services.payment.balance("BCCNCL"), Some(50_000));
    assert_eq!(services.warehouse.on_hand("P-001"), Some(10));
    assert_eq!(services.cart.cart_contents("BCCNCL").len(), 2);
    assert_eq!(services.orders.order_state("O-002"), None);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fraud_rejection_compensates_nothing() {
    let harness = TestHarness::start();

    let instance_id = harness
        .coordinator
        .start("purchase", "O-003", purchase_input("2000000"))
        .await
        .unwrap();

    let instance = harness.wait_for_terminal(instance_id).await;
    assert_eq!(instance.status(), SagaStatus::Compensated);
    assert!(instance.failure_reason().unwrap().contains("check-fraud"));

    // The first step failed, so no service state was touched at all.
    let services = &harness.services;
    assert_eq!(services.inventory.quantity("P-001"), Some(10));
    assert_eq!(services.payment.balance("BCCNCL"), Some(50_000));
    assert_eq!(services.cart.cart_contents("BCCNCL").len(), 2);
    assert_eq!(services.orders.confirmed_count(), 0);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_out_of_stock_fails_reservation_and_refunds_nothing() {
    let harness = TestHarness::start();
    harness.services.inventory.seed_product("P-001", 0);

    let instance_id = harness
        .coordinator
        .start("purchase", "O-004", purchase_input("2500"))
        .await
        .unwrap();

    let instance = harness.wait_for_terminal(instance_id).await;
    assert_eq!(instance.status(), SagaStatus::Compensated);
    assert!(instance.failure_reason().unwrap().contains("Inventory empty"));

    let services = &harness.services;
    assert_eq!(services.inventory.reservation_count(), 0);
    assert_eq!(services.payment.balance("BCCNCL"), Some(50_000));

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_trigger_rejected_while_active() {
    let harness = TestHarness::start();
    // Stall the flow at the charge step so the instance stays active.
    harness.services.payment.set_fail_on_charge(true);

    let first = harness
        .coordinator
        .start("purchase", "O-005", purchase_input("2500"))
        .await
        .unwrap();

    // A concurrent re-submission of the same order code must be rejected
    // or arrive after the first instance reached a terminal state.
    let second = harness
        .coordinator
        .start("purchase", "O-005", purchase_input("2500"))
        .await;
    if second.is_err() {
        assert!(matches!(
            second,
            Err(saga::SagaError::DuplicateBusinessKey(_))
        ));
    }

    let instance = harness.wait_for_terminal(first).await;
    assert_eq!(instance.status(), SagaStatus::Compensated);

    harness.stop().await;
}
