//! Restricted service-discovery handle for plugins.

use std::fmt;
use std::sync::Arc;

use crate::error::EnvironmentError;
use crate::services::{ServiceProvider, lookup};

/// The only environment access a plugin gets.
///
/// Holds the global service registry and nothing else: there is no way to
/// reach the connector from here, so a plugin can never act, register, or
/// deregister.
#[derive(Clone)]
pub struct PluginManager {
    provider: Arc<dyn ServiceProvider>,
}

impl PluginManager {
    /// Wrap a service provider.
    pub fn new(provider: Arc<dyn ServiceProvider>) -> Self {
        Self { provider }
    }

    /// Look up a global environment service by type.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::UnavailableService`] if no service of
    /// type `T` is registered.
    pub fn get_environment_service<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<T>, EnvironmentError> {
        lookup::<T>(self.provider.as_ref())
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::GlobalServices;

    struct Catalog(u8);

    #[test]
    fn sees_services_added_after_creation() {
        let globals = Arc::new(GlobalServices::default());
        let manager = PluginManager::new(Arc::clone(&globals) as Arc<dyn ServiceProvider>);
        assert!(manager.get_environment_service::<Catalog>().is_err());

        globals.insert(Arc::new(Catalog(7)));
        assert_eq!(manager.get_environment_service::<Catalog>().unwrap().0, 7);
    }
}
