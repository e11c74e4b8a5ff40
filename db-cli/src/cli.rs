//! Command-line argument surface (spec §6): core count, ordering policy,
//! prefetch depth, a one-shot `--execute` statement, server/client mode
//! selection, and the persistence file to load from or save to.

use clap::{ArgGroup, Parser};
use db_config::{OrderingPolicy, PrefetchDepth};

/// `tunadb <cores> [options]`
#[derive(Debug, Parser)]
#[command(name = "tunadb", about = "Data-centric in-memory analytical database")]
#[command(group(ArgGroup::new("mode").args(["server_only", "client_only", "web_client"])))]
pub struct Args {
    /// Number of worker cores to bind; 0 means "every core the host reports".
    pub cores: usize,

    /// Core ordering policy: system (native numbering), numa (group by NUMA
    /// node), or smt (physical cores first, then SMT siblings).
    #[arg(long = "co", value_name = "POLICY")]
    pub ordering: Option<OrderingArg>,

    /// Fixed prefetch ring depth, 0..=17.
    #[arg(long = "pd", value_name = "N", conflicts_with = "prefetch4me")]
    pub prefetch_depth: Option<u8>,

    /// Let the runtime choose the prefetch depth per operator from measured
    /// cycles instead of a fixed depth.
    #[arg(long)]
    pub prefetch4me: bool,

    /// Run a single statement non-interactively instead of starting the
    /// server loop or an interactive client.
    #[arg(long)]
    pub execute: Option<String>,

    /// Write `--execute`'s result to this file instead of stdout.
    #[arg(long)]
    pub output: Option<String>,

    /// Repeat `--execute` this many times (benchmarking harness entry
    /// point); ignored without `--execute`.
    #[arg(short = 'i', long = "iterations", default_value_t = 1)]
    pub iterations: u32,

    /// Restore the database's tables from this persistence file before
    /// doing anything else.
    #[arg(long)]
    pub load: Option<String>,

    /// Wire protocol TCP port.
    #[arg(short = 'p', long = "port", default_value_t = 9876)]
    pub port: u16,

    /// Host to connect to in client mode.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Only run the server loop; never read a statement from stdin.
    #[arg(long)]
    pub server_only: bool,

    /// Only run as a client against a server already listening on
    /// `--host`:`--port`; do not start a local runtime.
    #[arg(long)]
    pub client_only: bool,

    /// Placeholder for the teacher's web console entry point; accepted for
    /// argument-surface parity but not implemented by this boundary.
    #[arg(long)]
    pub web_client: bool,

    /// TOML configuration file, overlaid with `TUNADB_`-prefixed
    /// environment variables (spec's ambient configuration layer).
    #[arg(long)]
    pub config: Option<String>,

    /// OTLP collector endpoint; enables the optional tracing exporter when
    /// built with the `otel` feature.
    #[arg(long)]
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OrderingArg {
    System,
    Numa,
    Smt,
}

impl From<OrderingArg> for OrderingPolicy {
    fn from(value: OrderingArg) -> Self {
        match value {
            OrderingArg::System => OrderingPolicy::Ascending,
            OrderingArg::Numa => OrderingPolicy::NumaAware,
            OrderingArg::Smt => OrderingPolicy::PhysicalThenSmt,
        }
    }
}

impl Args {
    /// Resolves the `-pd`/`--prefetch4me` pair into a single depth setting;
    /// defaults to `Auto` when neither flag is given, matching
    /// `DatabaseConfig::default`.
    pub fn resolve_prefetch_depth(&self) -> PrefetchDepth {
        if self.prefetch4me {
            PrefetchDepth::Auto
        } else {
            match self.prefetch_depth {
                Some(depth) => PrefetchDepth::Fixed(depth),
                None => PrefetchDepth::Auto,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_builds_without_panicking() {
        Args::command().debug_assert();
    }

    #[test]
    fn prefetch4me_overrides_fixed_depth() {
        let args = Args::parse_from(["tunadb", "4", "--pd", "3"]);
        assert_eq!(args.resolve_prefetch_depth(), PrefetchDepth::Fixed(3));

        let args = Args::parse_from(["tunadb", "4", "--prefetch4me"]);
        assert_eq!(args.resolve_prefetch_depth(), PrefetchDepth::Auto);
    }

    #[test]
    fn ordering_arg_maps_to_policy() {
        assert_eq!(OrderingPolicy::from(OrderingArg::Numa), OrderingPolicy::NumaAware);
        assert_eq!(OrderingPolicy::from(OrderingArg::Smt), OrderingPolicy::PhysicalThenSmt);
    }
}
