//! Command-line options, with environment fallbacks for scheduled runs.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::sources::SourceMode;

#[derive(Parser, Debug)]
#[command(
    name = "ecomonitor",
    about = "Aggregates water, soil, and plastic pollution data for Indian cities"
)]
pub(crate) struct Cli {
    /// File holding the committed snapshot.
    #[arg(
        long,
        global = true,
        env = "ECOMONITOR_SNAPSHOT",
        default_value = "data/pollution_snapshot.json"
    )]
    pub(crate) snapshot_path: PathBuf,

    /// Seconds a single source may take before it is excluded from a run.
    #[arg(long, global = true, env = "ECOMONITOR_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub(crate) fetch_timeout_secs: u64,

    /// Fetch live publications or use the bundled reference profiles.
    #[arg(
        long,
        global = true,
        env = "ECOMONITOR_SOURCE_MODE",
        value_enum,
        default_value_t = SourceMode::Live
    )]
    pub(crate) source_mode: SourceMode,

    /// Optional JSON file overriding the index weighting table.
    #[arg(long, global = true, env = "ECOMONITOR_INDEX_TABLE")]
    pub(crate) index_table: Option<PathBuf>,

    /// User agent sent with source requests.
    #[arg(long, global = true, default_value = "ecomonitor/0.1")]
    pub(crate) user_agent: String,

    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    pub(crate) fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run one aggregation and exit; exit status 2 means existing data is still served.
    Refresh,
    /// Serve the read API over HTTP.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "ECOMONITOR_BIND", default_value = "127.0.0.1:5000")]
    pub(crate) bind: SocketAddr,

    /// Refresh in-process every N seconds; without it refresh is left to an external scheduler.
    #[arg(long, env = "ECOMONITOR_REFRESH_EVERY_SECS")]
    pub(crate) refresh_every_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_accepts_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ecomonitor",
            "serve",
            "--bind",
            "0.0.0.0:8080",
            "--source-mode",
            "reference",
            "--refresh-every-secs",
            "3600",
        ])
        .expect("parses");

        assert_eq!(cli.source_mode, SourceMode::Reference);
        assert_eq!(cli.fetch_timeout(), Duration::from_secs(10));
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind.port(), 8080);
        assert_eq!(args.refresh_every_secs, Some(3600));
    }
}
