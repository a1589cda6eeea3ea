//! Selection of the source set a run aggregates.

use clap::ValueEnum;
use reqwest::Client;

use ecomonitor_core::plugin::SourceRegistry;
use ecomonitor_source_plastic as plastic;
use ecomonitor_source_soil as soil;
use ecomonitor_source_water as water;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SourceMode {
    /// Fetch the published pages of each agency.
    Live,
    /// Use the bundled city baseline profiles, without network access.
    Reference,
}

pub(crate) fn registry(mode: SourceMode, client: &Client) -> SourceRegistry {
    let plugins = match mode {
        SourceMode::Live => vec![
            water::plugin(client.clone()),
            soil::plugin(client.clone()),
            plastic::plugin(client.clone()),
        ],
        SourceMode::Reference => vec![
            water::reference_plugin(),
            soil::reference_plugin(),
            plastic::reference_plugin(),
        ],
    };
    SourceRegistry::new(plugins)
}
