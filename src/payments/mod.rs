//! Payment provider adapters and their registry.

pub mod providers;
pub mod registry;
pub mod signature;
pub mod traits;

pub use registry::ProviderRegistry;
pub use traits::{CreatedPayment, PaymentProvider, WebhookNotification, WebhookVerification};
