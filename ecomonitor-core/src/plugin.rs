//! Registry for all source plugins and their ports.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::model::{SourceId, SourceMeta};
use crate::ports::{FetchError, RawExtraction, RawRow, SourcePort};

/// Port implementation for a single source, bundled with its metadata.
pub struct SourcePlugin {
    /// Static metadata describing the source.
    pub meta: SourceMeta,
    /// Implementation fetching the source.
    pub port: Arc<dyn SourcePort>,
}

/// Registry of the sources a run fetches, ordered by identifier.
pub struct SourceRegistry {
    plugins: BTreeMap<SourceId, SourcePlugin>,
}

impl SourceRegistry {
    /// Build a registry from the provided plugin list.
    ///
    /// A later plugin replaces an earlier one with the same identifier.
    #[must_use]
    pub fn new(plugins: Vec<SourcePlugin>) -> Self {
        let plugins_map = plugins
            .into_iter()
            .map(|plugin| (plugin.meta.id.clone(), plugin))
            .collect();
        Self {
            plugins: plugins_map,
        }
    }

    /// Return metadata for all registered sources.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceMeta> {
        self.plugins
            .values()
            .map(|plugin| plugin.meta.clone())
            .collect()
    }

    /// Iterator over registered plugins.
    pub fn plugins(&self) -> impl Iterator<Item = &SourcePlugin> {
        self.plugins.values()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Source that serves a fixed row set, stamped at fetch time.
pub struct StaticSource {
    meta: SourceMeta,
    rows: Vec<RawRow>,
}

impl StaticSource {
    /// Create a static source.
    #[must_use]
    pub fn new(meta: SourceMeta, rows: Vec<RawRow>) -> Self {
        Self { meta, rows }
    }

    /// Wrap the source in a plugin bundle.
    #[must_use]
    pub fn into_plugin(self) -> SourcePlugin {
        SourcePlugin {
            meta: self.meta.clone(),
            port: Arc::new(self),
        }
    }
}

#[async_trait]
impl SourcePort for StaticSource {
    fn source(&self) -> &SourceMeta {
        &self.meta
    }

    async fn fetch(&self) -> Result<RawExtraction, FetchError> {
        Ok(RawExtraction {
            source_name: self.meta.name.clone(),
            origin: self.meta.origin.clone(),
            fetched_at: Utc::now(),
            rows: self.rows.clone(),
        })
    }
}
