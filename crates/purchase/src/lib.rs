//! The purchase flow: a saga spanning five independently-owned services.
//!
//! A purchase screens the payment for fraud, reserves inventory, charges
//! the customer's account, pulls warehouse stock, empties the cart, and
//! confirms the order — each step against the owning service's local
//! datastore, each (except the fraud read) paired with a compensating
//! action that undoes it if a later step fails.

pub mod services;
pub mod tasks;

use common::Payload;
use domain::SagaDefinition;
use worker::{WorkerConfig, WorkerSet};

pub use services::{
    CartService, FRAUD_AMOUNT_LIMIT, InventoryService, OrderService, PaymentService,
    WarehouseService,
};

/// The purchase saga definition, with forward/compensation pairing made
/// explicit per step.
pub fn definition() -> SagaDefinition {
    SagaDefinition::builder(tasks::SAGA_NAME)
        .step(tasks::CHECK_FRAUD)
        .step_with_compensation(tasks::RESERVE_INVENTORY, tasks::RELEASE_INVENTORY)
        .step_with_compensation(tasks::CHARGE_PAYMENT, tasks::REFUND_PAYMENT)
        .step_with_compensation(tasks::ALLOCATE_WAREHOUSE, tasks::RETURN_WAREHOUSE)
        .step_with_compensation(tasks::CLEAR_CART, tasks::RESTORE_CART)
        .step_with_compensation(tasks::CONFIRM_ORDER, tasks::CANCEL_ORDER)
        .build()
        .expect("purchase definition is valid")
}

/// The five service datastores participating in the purchase flow.
#[derive(Debug, Clone, Default)]
pub struct PurchaseServices {
    pub inventory: InventoryService,
    pub payment: PaymentService,
    pub warehouse: WarehouseService,
    pub cart: CartService,
    pub orders: OrderService,
}

impl PurchaseServices {
    /// Creates empty service datastores.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Registers every purchase handler with a worker set.
///
/// One registration per task kind, all sharing the same polling config —
/// the per-service equivalent of the original one-runner-per-service
/// wiring, collapsed into a single hosting process.
pub fn register_workers(set: &mut WorkerSet, services: &PurchaseServices, config: WorkerConfig) {
    let payment = services.payment.clone();
    set.register(tasks::CHECK_FRAUD, config, move |input: Payload| {
        let payment = payment.clone();
        async move { payment.check_fraud(&input) }
    });

    let inventory = services.inventory.clone();
    set.register(tasks::RESERVE_INVENTORY, config, move |input: Payload| {
        let inventory = inventory.clone();
        async move { inventory.reserve(&input) }
    });
    let inventory = services.inventory.clone();
    set.register(tasks::RELEASE_INVENTORY, config, move |input: Payload| {
        let inventory = inventory.clone();
        async move { inventory.release(&input) }
    });

    let payment = services.payment.clone();
    set.register(tasks::CHARGE_PAYMENT, config, move |input: Payload| {
        let payment = payment.clone();
        async move { payment.charge(&input) }
    });
    let payment = services.payment.clone();
    set.register(tasks::REFUND_PAYMENT, config, move |input: Payload| {
        let payment = payment.clone();
        async move { payment.refund(&input) }
    });

    let warehouse = services.warehouse.clone();
    set.register(tasks::ALLOCATE_WAREHOUSE, config, move |input: Payload| {
        let warehouse = warehouse.clone();
        async move { warehouse.allocate(&input) }
    });
    let warehouse = services.warehouse.clone();
    set.register(tasks::RETURN_WAREHOUSE, config, move |input: Payload| {
        let warehouse = warehouse.clone();
        async move { warehouse.put_back(&input) }
    });

    let cart = services.cart.clone();
    set.register(tasks::CLEAR_CART, config, move |input: Payload| {
        let cart = cart.clone();
        async move { cart.clear(&input) }
    });
    let cart = services.cart.clone();
    set.register(tasks::RESTORE_CART, config, move |input: Payload| {
        let cart = cart.clone();
        async move { cart.restore(&input) }
    });

    let orders = services.orders.clone();
    set.register(tasks::CONFIRM_ORDER, config, move |input: Payload| {
        let orders = orders.clone();
        async move { orders.confirm(&input) }
    });
    let orders = services.orders.clone();
    set.register(tasks::CANCEL_ORDER, config, move |input: Payload| {
        let orders = orders.clone();
        async move { orders.cancel(&input) }
    });
}

/// Seeds the demo rows each service loads at startup.
pub fn seed_demo_data(services: &PurchaseServices) {
    services.inventory.seed_product("P-001", 10);
    services.inventory.seed_product("P-002", 10);

    services.warehouse.seed_stock("P-001", "Bmx Bike", 10);
    services.warehouse.seed_stock("P-002", "Led Light", 10);

    services.payment.open_account("BCCNCL", 50_000);

    services.cart.put_in_cart("BCCNCL", "P-001");
    services.cart.put_in_cart("BCCNCL", "P-002");
}
