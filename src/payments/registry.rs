//! Closed name-to-adapter mapping.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::ProvidersConfig;
use crate::error::{AppError, AppErrorKind, AppResult};
use crate::payments::providers::{MidtransProvider, StripeProvider, XenditProvider};
use crate::payments::traits::PaymentProvider;

type ProviderFactory = fn(&ProvidersConfig) -> AppResult<Arc<dyn PaymentProvider>>;

fn build_midtrans(config: &ProvidersConfig) -> AppResult<Arc<dyn PaymentProvider>> {
    Ok(Arc::new(MidtransProvider::new(config.midtrans.clone())?))
}

fn build_xendit(config: &ProvidersConfig) -> AppResult<Arc<dyn PaymentProvider>> {
    Ok(Arc::new(XenditProvider::new(config.xendit.clone())?))
}

fn build_stripe(config: &ProvidersConfig) -> AppResult<Arc<dyn PaymentProvider>> {
    Ok(Arc::new(StripeProvider::new(config.stripe.clone())?))
}

/// Every provider the gateway knows about.
const FACTORIES: &[(&str, ProviderFactory)] = &[
    ("midtrans", build_midtrans),
    ("xendit", build_xendit),
    ("stripe", build_stripe),
];

/// Immutable after construction; clones share the adapters.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    /// Builds every known adapter once from configuration.
    pub fn from_config(config: &ProvidersConfig) -> AppResult<Self> {
        let mut providers = HashMap::with_capacity(FACTORIES.len());
        for (name, factory) in FACTORIES {
            providers.insert(*name, factory(config)?);
        }
        info!("Provider registry ready: {:?}", Self::known_names());
        Ok(Self { providers })
    }

    /// Registry over caller-supplied adapters, keyed by their `name()`.
    pub fn with_providers(adapters: Vec<Arc<dyn PaymentProvider>>) -> Self {
        let providers = adapters
            .into_iter()
            .map(|adapter| (adapter.name(), adapter))
            .collect();
        Self { providers }
    }

    /// Exact, case-sensitive lookup.
    pub fn resolve(&self, name: &str) -> AppResult<Arc<dyn PaymentProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::new(AppErrorKind::UnknownProvider(name.to_string())))
    }

    pub fn known_names() -> Vec<&'static str> {
        FACTORIES.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_every_known_provider() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default()).unwrap();
        assert_eq!(registry.len(), 3);
        for name in ProviderRegistry::known_names() {
            assert_eq!(registry.resolve(name).unwrap().name(), name);
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default()).unwrap();
        let err = registry.resolve("paypal").err().unwrap();
        assert!(err.is_unknown_provider());

        assert!(registry.resolve("Midtrans").is_err());
        assert!(registry.resolve("").is_err());
    }
}
