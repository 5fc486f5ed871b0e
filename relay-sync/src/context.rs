//! Execution context handed to capture, preparation and ingress.

use relay_core::{Catalog, Platform, SchemaRegistry, SyncSettings};

use crate::transformer::TransformerRegistry;

/// Everything the sync pipeline reads, resolved once at startup.
#[derive(Debug)]
pub struct SyncContext {
    pub settings: SyncSettings,
    pub catalog: Catalog,
    pub schema: SchemaRegistry,
    pub transformers: TransformerRegistry,
    /// Platform whose domain matches `settings.host`, if any.
    pub current_platform: Option<Platform>,
}

impl SyncContext {
    /// Build the context and resolve the current platform from the configured
    /// host. No match leaves capture disabled.
    pub fn new(
        settings: SyncSettings,
        catalog: Catalog,
        schema: SchemaRegistry,
        transformers: TransformerRegistry,
    ) -> Self {
        let current_platform = catalog.platform_by_domain(&settings.host).cloned();
        match &current_platform {
            Some(platform) => tracing::debug!(
                "current platform for host {} is #{} ({})",
                settings.host,
                platform.id,
                platform.name
            ),
            None => tracing::info!(
                "no platform registered for host {}; outbound capture disabled",
                settings.host
            ),
        }
        Self {
            settings,
            catalog,
            schema,
            transformers,
            current_platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_platform_from_host() {
        let mut catalog = Catalog::default();
        catalog.add_platform("a", "a.test", "tok-a").expect("add");
        let ctx = SyncContext::new(
            SyncSettings::new("a.test", "shared"),
            catalog.clone(),
            SchemaRegistry::new(),
            TransformerRegistry::new(),
        );
        assert_eq!(ctx.current_platform.map(|p| p.name), Some("a".to_string()));

        let ctx = SyncContext::new(
            SyncSettings::new("elsewhere.test", "shared"),
            catalog,
            SchemaRegistry::new(),
            TransformerRegistry::new(),
        );
        assert!(ctx.current_platform.is_none());
    }
}
