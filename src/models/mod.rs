//! Domain entities and wire DTOs.

pub mod checkout;
pub mod transaction;
pub mod webhook;

pub use checkout::{CheckoutRequest, CheckoutResponse};
pub use transaction::{is_valid_reference, Transaction, TransactionStatus, MAX_AMOUNT};
pub use webhook::{WebhookEvent, WebhookJob};
