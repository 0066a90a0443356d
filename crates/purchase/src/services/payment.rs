//! Payment service: account balances, fraud screening, charges and refunds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::{BUSINESS_KEY, Payload};
use worker::{HandlerError, HandlerOutcome};

/// Deposits above this amount fail the fraud check.
pub const FRAUD_AMOUNT_LIMIT: i64 = 100_000;

#[derive(Debug, Clone)]
struct PaymentRecord {
    payment_id: String,
    account_id: String,
    amount: i64,
    refunded: bool,
}

#[derive(Debug, Default)]
struct PaymentState {
    accounts: HashMap<String, i64>,
    payments: HashMap<String, PaymentRecord>,
    next_id: u32,
    fail_on_charge: bool,
}

/// In-memory payment datastore owned by the payment service.
#[derive(Debug, Clone, Default)]
pub struct PaymentService {
    state: Arc<RwLock<PaymentState>>,
}

impl PaymentService {
    /// Creates an empty payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an account with an initial balance in cents.
    pub fn open_account(&self, account_id: impl Into<String>, balance: i64) {
        self.state
            .write()
            .unwrap()
            .accounts
            .insert(account_id.into(), balance);
    }

    /// Returns an account's balance in cents.
    pub fn balance(&self, account_id: &str) -> Option<i64> {
        self.state.read().unwrap().accounts.get(account_id).copied()
    }

    /// Returns the number of charges that have not been refunded.
    pub fn payment_count(&self) -> usize {
        self.state
            .read()
            .unwrap()
            .payments
            .values()
            .filter(|p| !p.refunded)
            .count()
    }

    /// Configures the service to fail every charge call.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Handler for `check-fraud`: screens the payment amount.
    ///
    /// Expects an `amount` field in cents. Amounts above
    /// [`FRAUD_AMOUNT_LIMIT`] are rejected.
    pub fn check_fraud(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let amount: i64 = input.require_parsed("amount")?;
        if amount > FRAUD_AMOUNT_LIMIT {
            return Err(HandlerError::failed("Amount too large"));
        }

        let mut output = Payload::new();
        output.set("fraudCheck", "PASS");
        Ok(HandlerOutcome::Completed(output))
    }

    /// Handler for `charge-payment`: debits the account.
    ///
    /// Expects `businessKey`, `accountId`, and `amount`. A redelivered
    /// charge returns the already-assigned payment ID without debiting
    /// twice.
    pub fn charge(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;
        let account_id = input.require("accountId")?;
        let amount: i64 = input.require_parsed("amount")?;

        let mut state = self.state.write().unwrap();
        if state.fail_on_charge {
            return Err(HandlerError::failed("Payment service unavailable"));
        }

        if let Some(existing) = state.payments.get(key)
            && !existing.refunded
        {
            let mut output = Payload::new();
            output.set("paymentId", existing.payment_id.clone());
            return Ok(HandlerOutcome::Completed(output));
        }

        let Some(balance) = state.accounts.get_mut(account_id) else {
            return Err(HandlerError::failed(format!(
                "Account not found: {account_id}"
            )));
        };
        if *balance < amount {
            return Err(HandlerError::failed("Insufficient funds"));
        }
        *balance -= amount;

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state.payments.insert(
            key.to_string(),
            PaymentRecord {
                payment_id: payment_id.clone(),
                account_id: account_id.to_string(),
                amount,
                refunded: false,
            },
        );

        let mut output = Payload::new();
        output.set("paymentId", payment_id);
        Ok(HandlerOutcome::Completed(output))
    }

    /// Handler for `refund-payment`: credits a previous charge back.
    ///
    /// Reports not-applicable when no open charge exists for the business
    /// key.
    pub fn refund(&self, input: &Payload) -> Result<HandlerOutcome, HandlerError> {
        let key = input.require(BUSINESS_KEY)?;

        let mut state = self.state.write().unwrap();
        let Some(record) = state.payments.get(key).cloned() else {
            return Ok(HandlerOutcome::NotApplicable);
        };
        if record.refunded {
            return Ok(HandlerOutcome::NotApplicable);
        }

        if let Some(balance) = state.accounts.get_mut(&record.account_id) {
            *balance += record.amount;
        }
        if let Some(stored) = state.payments.get_mut(key) {
            stored.refunded = true;
        }
        Ok(HandlerOutcome::Completed(Payload::new()))
    }
}
