//! Order service: the order row keyed by its code.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::{BUSINESS_KEY, Payload};
use worker::{HandlerError, HandlerOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderState {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone)]
struct OrderRecord {
    customer_id: String,
    state: OrderState,
}

#[derive(Debug, Default)]
struct OrderStoreState {
    orders: HashMap<String, OrderRecord>,
}

/// In-memory order datastore owned by the order service.
///
/// The order code doubles as the saga's business key, so the coordinator's
/// duplicate-trigger guard keeps one live purchase per order.
#[derive(Debug, Clone, Default)]
pub struct OrderService {
    state: Arc<RwLock<OrderStoreState>>,
}

impl OrderService {
    /// Creates an empty order service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an order's state name, if the order exists.
    pub fn order_state(&self, code: &str) -> Option<&'static str> {
        self.state
            .read()
            .unwrap()
            .orders
            .get(code)
            .map(|record| match record.state {
                OrderState::Confirmed => "CONFIRMED",
                OrderState::Cancelled => "CANCELLED",
            })
    }

    /// Returns the customer who placed an order.
    pub fn customer_id(&self, code: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .orders
            .get(code)
            .map(|record| record.customer_id.clone())
    }

    /// Returns the number of confirmed orders.
    pub fn confirmed_count(&self) -> usize {
        self.state
            .read()
            .unwrap()
            .orders
            .values()
            .filter(|record| record.state == OrderState::Confirmed)
            .count()
    }

    /// Handler for `confirm-order`: persists the confirmed order row.
    ///
    /// Expects `businessKey` (the order code) and `customerId`.
    /// Re-confirming an already confirmed order is a no-op success.
    pub fn confirm(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let code = input.require(BUSINESS_KEY)?;
        let customer_id = input.require("customerId")?;

        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.orders.get(code)
            && existing.state == OrderState::Confirmed
        {
            let mut output = Payload::new();
            output.set("orderState", "CONFIRMED");
            return Ok(HandlerOutcome::Completed(output));
        }

        state.orders.insert(
            code.to_string(),
            OrderRecord {
                customer_id: customer_id.to_string(),
                state: OrderState::Confirmed,
            },
        );

        let mut output = Payload::new();
        output.set("orderState", "CONFIRMED");
        Ok(HandlerOutcome::Completed(output))
    }

    /// Handler for `cancel-order`: marks the order cancelled.
    /// Not-applicable when the order row does not exist or is already
    /// cancelled.
    pub fn cancel(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let code = input.require(BUSINESS_KEY)?;

        let mut state = self.state.write().unwrap();
        match state.orders.get_mut(code) {
            Some(record) if record.state == OrderState::Confirmed => {
                record.state = OrderState::Cancelled;
                Ok(HandlerOutcome::Completed(Payload::new()))
            }
            _ => Ok(HandlerOutcome::NotApplicable),
        }
    }
}
