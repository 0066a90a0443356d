//! Warehouse service: physical stock pulled for shipment.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::{BUSINESS_KEY, Payload};
use worker::{HandlerError, HandlerOutcome};

#[derive(Debug, Clone)]
struct StockItem {
    name: String,
    on_hand: u32,
}

#[derive(Debug, Default)]
struct WarehouseState {
    stock: HashMap<String, StockItem>,
    allocations: HashMap<String, Vec<String>>,
}

/// In-memory warehouse datastore owned by the warehouse service.
#[derive(Debug, Clone, Default)]
pub struct WarehouseService {
    state: Arc<RwLock<WarehouseState>>,
}

impl WarehouseService {
    /// Creates an empty warehouse.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds shelf stock for a product code.
    pub fn seed_stock(&self, code: impl Into<String>, name: impl Into<String>, on_hand: u32) {
        self.state.write().unwrap().stock.insert(
            code.into(),
            StockItem {
                name: name.into(),
                on_hand,
            },
        );
    }

    /// Returns the on-hand count for a product code.
    pub fn on_hand(&self, code: &str) -> Option<u32> {
        self.state
            .read()
            .unwrap()
            .stock
            .get(code)
            .map(|item| item.on_hand)
    }

    /// Returns the number of open allocations.
    pub fn allocation_count(&self) -> usize {
        self.state.read().unwrap().allocations.len()
    }

    /// Handler for `allocate-warehouse`: pulls one unit per ordered
    /// product code off the shelf.
    pub fn allocate(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;
        let codes: Vec<String> = input
            .require("productCodes")?
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(String::from)
            .collect();

        let mut state = self.state.write().unwrap();
        if state.allocations.contains_key(key) {
            let mut output = Payload::new();
            output.set("allocatedItems", codes.len().to_string());
            return Ok(HandlerOutcome::Completed(output));
        }

        for code in &codes {
            match state.stock.get(code) {
                None => {
                    return Err(HandlerError::failed(format!(
                        "Warehouse product missing: {code}"
                    )));
                }
                Some(item) if item.on_hand == 0 => {
                    return Err(HandlerError::failed(format!(
                        "Warehouse out of stock: {code}"
                    )));
                }
                Some(item) => {
                    tracing::debug!(code = %code, name = %item.name, "pulling product");
                }
            }
        }
        for code in &codes {
            if let Some(item) = state.stock.get_mut(code) {
                item.on_hand -= 1;
            }
        }

        state.allocations.insert(key.to_string(), codes.clone());

        let mut output = Payload::new();
        output.set("allocatedItems", codes.len().to_string());
        Ok(HandlerOutcome::Completed(output))
    }

    /// Handler for `return-warehouse`: puts an allocation back on the
    /// shelf. Not-applicable when nothing was allocated for the key.
    pub fn put_back(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;

        let mut state = self.state.write().unwrap();
        let Some(codes) = state.allocations.remove(key) else {
            return Ok(HandlerOutcome::NotApplicable);
        };

        for code in &codes {
            if let Some(item) = state.stock.get_mut(code) {
                item.on_hand += 1;
            }
        }
        Ok(HandlerOutcome::Completed(Payload::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_input() -> Payload {
        Payload::from_pairs([(BUSINESS_KEY, "O-001"), ("productCodes", "P-001")])
    }

    #[test]
    fn test_allocate_and_put_back() {
        let service = WarehouseService::new();
        service.seed_stock("P-001", "Bmx Bike", 3);

        service.allocate(&order_input()).unwrap();
        assert_eq!(service.on_hand("P-001"), Some(2));
        assert_eq!(service.allocation_count(), 1);

        let outcome = service.put_back(&order_input()).unwrap();
        assert!(matches!(outcome, HandlerOutcome::Completed(_)));
        assert_eq!(service.on_hand("P-001"), Some(3));
        assert_eq!(service.allocation_count(), 0);
    }

    #[test]
    fn test_redelivered_allocate_is_idempotent() {
        let service = WarehouseService::new();
        service.seed_stock("P-001", "Bmx Bike", 3);

        service.allocate(&order_input()).unwrap();
        service.allocate(&order_input()).unwrap();
        assert_eq!(service.on_hand("P-001"), Some(2));
    }

    #[test]
    fn test_out_of_stock_fails() {
        let service = WarehouseService::new();
        service.seed_stock("P-001", "Bmx Bike", 0);

        let result = service.allocate(&order_input());
        assert_eq!(result.unwrap_err().to_string(), "Warehouse out of stock: P-001");
    }

    #[test]
    fn test_put_back_without_allocation_is_not_applicable() {
        let service = WarehouseService::new();
        let outcome = service.put_back(&order_input()).unwrap();
        assert_eq!(outcome, HandlerOutcome::NotApplicable);
    }
}
