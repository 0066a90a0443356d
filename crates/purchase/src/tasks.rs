//! Purchase saga task kind constants.

/// The definition name for the purchase saga.
pub const SAGA_NAME: &str = "purchase";

/// Fraud screening of the payment details. Pure read, no compensation.
pub const CHECK_FRAUD: &str = "check-fraud";

/// Decrement stock for the ordered product codes.
pub const RESERVE_INVENTORY: &str = "reserve-inventory";

/// Give reserved stock back.
pub const RELEASE_INVENTORY: &str = "release-inventory";

/// Debit the customer's account.
pub const CHARGE_PAYMENT: &str = "charge-payment";

/// Credit a previous charge back.
pub const REFUND_PAYMENT: &str = "refund-payment";

/// Pull the ordered products from warehouse stock.
pub const ALLOCATE_WAREHOUSE: &str = "allocate-warehouse";

/// Put allocated products back on the shelf.
pub const RETURN_WAREHOUSE: &str = "return-warehouse";

/// Empty the customer's cart after a successful purchase.
pub const CLEAR_CART: &str = "clear-cart";

/// Put a cleared cart's products back.
pub const RESTORE_CART: &str = "restore-cart";

/// Persist the confirmed order.
pub const CONFIRM_ORDER: &str = "confirm-order";

/// Mark the order cancelled.
pub const CANCEL_ORDER: &str = "cancel-order";
