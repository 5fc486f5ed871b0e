//! Platform catalog: registered platforms and sync configuration rows.
//!
//! The catalog is administered offline (`relay platform add`, `relay
//! sync-config add`) and is read-only once the daemon is running.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::files::{self, load_yaml, save_yaml};
use crate::types::{EntityType, Platform, PlatformId, SyncConfiguration, SyncId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub syncs: Vec<SyncConfiguration>,
}

impl Catalog {
    pub fn platform(&self, id: PlatformId) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.id == id)
    }

    /// Platform authenticated by `token`. Empty tokens never match.
    pub fn platform_by_token(&self, token: &str) -> Option<&Platform> {
        if token.is_empty() {
            return None;
        }
        self.platforms.iter().find(|p| p.api_token == token)
    }

    /// Platform serving `host` (case-insensitive, port ignored).
    pub fn platform_by_domain(&self, host: &str) -> Option<&Platform> {
        let host = host.split(':').next().unwrap_or(host);
        self.platforms
            .iter()
            .find(|p| p.domain.eq_ignore_ascii_case(host))
    }

    pub fn sync(&self, id: SyncId) -> Option<&SyncConfiguration> {
        self.syncs.iter().find(|s| s.id == id)
    }

    /// Sync rows whose source is `platform`.
    pub fn syncs_from(&self, platform: PlatformId) -> impl Iterator<Item = &SyncConfiguration> {
        self.syncs
            .iter()
            .filter(move |s| s.source_platform_id == platform)
    }

    /// Sync rows for one (source platform, entity type) pair.
    pub fn syncs_for(&self, platform: PlatformId, entity_type: &EntityType) -> Vec<SyncConfiguration> {
        self.syncs_from(platform)
            .filter(|s| &s.source_entity_type == entity_type)
            .cloned()
            .collect()
    }

    /// Register a platform with the next free id.
    ///
    /// Rejects duplicate domains and duplicate tokens: a token must identify
    /// exactly one platform.
    pub fn add_platform(
        &mut self,
        name: impl Into<String>,
        domain: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<&Platform, CoreError> {
        let domain = domain.into();
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(invalid("api token must not be empty".to_string()));
        }
        if self.platform_by_domain(&domain).is_some() {
            return Err(invalid(format!("domain '{domain}' is already registered")));
        }
        if self.platform_by_token(&api_token).is_some() {
            return Err(invalid("api token is already in use".to_string()));
        }
        let id = PlatformId(self.platforms.iter().map(|p| p.id.0).max().unwrap_or(0) + 1);
        self.platforms.push(Platform {
            id,
            name: name.into(),
            domain,
            api_token,
        });
        Ok(&self.platforms[self.platforms.len() - 1])
    }

    /// Add a sync row with the next free id. Both platforms must exist.
    pub fn add_sync(
        &mut self,
        source_platform_id: PlatformId,
        source_entity_type: EntityType,
        target_platform_id: PlatformId,
    ) -> Result<&SyncConfiguration, CoreError> {
        for id in [source_platform_id, target_platform_id] {
            if self.platform(id).is_none() {
                return Err(invalid(format!("unknown platform id {id}")));
            }
        }
        if source_platform_id == target_platform_id {
            return Err(invalid("a platform cannot sync to itself".to_string()));
        }
        let id = SyncId(self.syncs.iter().map(|s| s.id.0).max().unwrap_or(0) + 1);
        self.syncs.push(SyncConfiguration {
            id,
            source_platform_id,
            source_entity_type,
            target_platform_id,
        });
        Ok(&self.syncs[self.syncs.len() - 1])
    }

    /// Every sync row must reference registered platforms.
    pub fn validate(&self) -> Result<(), CoreError> {
        for sync in &self.syncs {
            for id in [sync.source_platform_id, sync.target_platform_id] {
                if self.platform(id).is_none() {
                    return Err(invalid(format!(
                        "sync {} references unknown platform id {id}",
                        sync.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load `<home>/.relay/catalog.yaml`; an absent file is an empty catalog.
    pub fn load_at(home: &Path) -> Result<Self, CoreError> {
        let catalog: Self = match load_yaml(&files::catalog_path_at(home)) {
            Ok(catalog) => catalog,
            Err(CoreError::NotFound { .. }) => Self::default(),
            Err(err) => return Err(err),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_at(&files::home()?)
    }

    pub fn save_at(&self, home: &Path) -> Result<(), CoreError> {
        save_yaml(&files::catalog_path_at(home), self)
    }

    /// `save_at` convenience wrapper.
    pub fn save(&self) -> Result<(), CoreError> {
        self.save_at(&files::home()?)
    }
}

fn invalid(reason: String) -> CoreError {
    CoreError::Invalid {
        what: "catalog",
        reason,
    }
}
