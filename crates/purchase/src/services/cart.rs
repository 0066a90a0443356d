//! Cart service: per-customer carts emptied on purchase.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::{BUSINESS_KEY, Payload};
use worker::{HandlerError, HandlerOutcome};

#[derive(Debug, Clone)]
struct ClearedCart {
    customer_id: String,
    product_codes: Vec<String>,
}

#[derive(Debug, Default)]
struct CartState {
    carts: HashMap<String, Vec<String>>,
    cleared: HashMap<String, ClearedCart>,
}

/// In-memory cart datastore owned by the cart service.
#[derive(Debug, Clone, Default)]
pub struct CartService {
    state: Arc<RwLock<CartState>>,
}

impl CartService {
    /// Creates an empty cart service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a product into a customer's cart.
    pub fn put_in_cart(&self, customer_id: impl Into<String>, code: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .carts
            .entry(customer_id.into())
            .or_default()
            .push(code.into());
    }

    /// Returns the contents of a customer's cart.
    pub fn cart_contents(&self, customer_id: &str) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .carts
            .get(customer_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Handler for `clear-cart`: empties the customer's cart, remembering
    /// its contents for a possible restore.
    ///
    /// Expects `businessKey` and `customerId`. An already-cleared key
    /// reports the same outcome again; an empty cart is not-applicable.
    pub fn clear(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;
        let customer_id = input.require("customerId")?;

        let mut state = self.state.write().unwrap();
        if let Some(cleared) = state.cleared.get(key) {
            let mut output = Payload::new();
            output.set("clearedItems", cleared.product_codes.len().to_string());
            return Ok(HandlerOutcome::Completed(output));
        }

        let product_codes = state.carts.remove(customer_id).unwrap_or_default();
        if product_codes.is_empty() {
            return Ok(HandlerOutcome::NotApplicable);
        }

        let mut output = Payload::new();
        output.set("clearedItems", product_codes.len().to_string());
        state.cleared.insert(
            key.to_string(),
            ClearedCart {
                customer_id: customer_id.to_string(),
                product_codes,
            },
        );
        Ok(HandlerOutcome::Completed(output))
    }

    /// Handler for `restore-cart`: puts a cleared cart back.
    /// Not-applicable when nothing was cleared for the key.
    pub fn restore(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;

        let mut state = self.state.write().unwrap();
        let Some(cleared) = state.cleared.remove(key) else {
            return Ok(HandlerOutcome::NotApplicable);
        };

        state
            .carts
            .entry(cleared.customer_id)
            .or_default()
            .extend(cleared.product_codes);
        Ok(HandlerOutcome::Completed(Payload::new()))
    }
}
