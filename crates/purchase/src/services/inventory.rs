//! Inventory service: stock levels per product code.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::{BUSINESS_KEY, Payload};
use worker::{HandlerError, HandlerOutcome};

#[derive(Debug, Clone)]
struct Reservation {
    reservation_id: String,
    product_codes: Vec<String>,
}

#[derive(Debug, Default)]
struct InventoryState {
    products: HashMap<String, u32>,
    reservations: HashMap<String, Reservation>,
    next_id: u32,
    fail_on_reserve: bool,
}

/// In-memory inventory datastore owned by the inventory service.
#[derive(Debug, Clone, Default)]
pub struct InventoryService {
    state: Arc<RwLock<InventoryState>>,
}

impl InventoryService {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds stock for a product code.
    pub fn seed_product(&self, code: impl Into<String>, quantity: u32) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(code.into(), quantity);
    }

    /// Returns the stock level for a product code.
    pub fn quantity(&self, code: &str) -> Option<u32> {
        self.state.read().unwrap().products.get(code).copied()
    }

    /// Returns the number of open reservations.
    pub fn reservation_count(&self) -> usize {
        self.state.read().unwrap().reservations.len()
    }

    /// Configures the service to fail every reserve call.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reserve = fail;
    }

    /// Handler for `reserve-inventory`: decrements stock by one for each
    /// product code on the order.
    ///
    /// Expects `businessKey` and a comma-separated `productCodes` field.
    /// A redelivered reservation returns the already-assigned reservation
    /// ID without decrementing again.
    pub fn reserve(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;
        let codes = parse_product_codes(input)?;

        let mut state = self.state.write().unwrap();
        if state.fail_on_reserve {
            return Err(HandlerError::failed("Inventory service unavailable"));
        }

        if let Some(existing) = state.reservations.get(key) {
            let mut output = Payload::new();
            output.set("reservationId", existing.reservation_id.clone());
            return Ok(HandlerOutcome::Completed(output));
        }

        // Verify availability before touching any row so a failure leaves
        // the stock untouched.
        for code in &codes {
            match state.products.get(code) {
                None => return Err(HandlerError::failed(format!("Inventory not found: {code}"))),
                Some(&0) => return Err(HandlerError::failed(format!("Inventory empty: {code}"))),
                Some(_) => {}
            }
        }
        for code in &codes {
            if let Some(quantity) = state.products.get_mut(code) {
                *quantity -= 1;
            }
        }

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state.reservations.insert(
            key.to_string(),
            Reservation {
                reservation_id: reservation_id.clone(),
                product_codes: codes,
            },
        );

        let mut output = Payload::new();
        output.set("reservationId", reservation_id);
        Ok(HandlerOutcome::Completed(output))
    }

    /// Handler for `release-inventory`: restores the reserved stock.
    ///
    /// Reports not-applicable when no reservation exists for the business
    /// key (already released, or never reserved).
    pub fn release(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;

        let mut state = self.state.write().unwrap();
        let Some(reservation) = state.reservations.remove(key) else {
            return Ok(HandlerOutcome::NotApplicable);
        };

        for code in &reservation.product_codes {
            if let Some(quantity) = state.products.get_mut(code) {
                *quantity += 1;
            }
        }
        Ok(HandlerOutcome::Completed(Payload::new()))
    }
}

fn parse_product_codes(input: &Payload) -> Result<Vec<String>, HandlerError> {
    let codes: Vec<String> = input
        .require("productCodes")?
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(String::from)
        .collect();
    if codes.is_empty() {
        return Err(HandlerError::failed("no product codes on order"));
    }
    Ok(codes)
}
