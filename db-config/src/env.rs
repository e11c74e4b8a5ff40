//! Environment-variable overlay: `TUNADB_*` variables override whatever the
//! file (or defaults) produced, mirroring the teacher's env-over-file layering.

use crate::schema::{DatabaseConfig, OrderingPolicy, PrefetchDepth};

const PREFIX: &str = "TUNADB_";

pub fn apply_env_overrides(config: &mut DatabaseConfig) {
    if let Ok(value) = std::env::var(format!("{PREFIX}CORES")) {
        if let Ok(cores) = value.parse() {
            config.cores = cores;
        }
    }
    if let Ok(value) = std::env::var(format!("{PREFIX}PREFETCH_DEPTH")) {
        config.prefetch_depth = parse_prefetch_depth(&value).unwrap_or(config.prefetch_depth);
    }
    if let Ok(value) = std::env::var(format!("{PREFIX}ORDERING")) {
        config.ordering = parse_ordering(&value).unwrap_or(config.ordering);
    }
    if let Ok(value) = std::env::var(format!("{PREFIX}EPOCH_INTERVAL_MS")) {
        if let Ok(ms) = value.parse() {
            config.epoch_interval_ms = ms;
        }
    }
    if let Ok(value) = std::env::var(format!("{PREFIX}SERVER_PORT")) {
        if let Ok(port) = value.parse() {
            config.server_port = port;
        }
    }
    if let Ok(value) = std::env::var(format!("{PREFIX}PERSISTENCE_PATH")) {
        config.persistence_path = Some(value);
    }
}

fn parse_prefetch_depth(value: &str) -> Option<PrefetchDepth> {
    if value.eq_ignore_ascii_case("auto") {
        return Some(PrefetchDepth::Auto);
    }
    value.parse().ok().map(PrefetchDepth::Fixed)
}

fn parse_ordering(value: &str) -> Option<OrderingPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "ascending" => Some(OrderingPolicy::Ascending),
        "numa" | "numa-aware" | "numaaware" => Some(OrderingPolicy::NumaAware),
        "physical" | "physical-then-smt" | "physicalthensmt" => Some(OrderingPolicy::PhysicalThenSmt),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlays_cores_from_env() {
        std::env::set_var("TUNADB_CORES", "6");
        let mut config = DatabaseConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.cores, 6);
        std::env::remove_var("TUNADB_CORES");
    }

    #[test]
    fn parses_auto_prefetch_case_insensitively() {
        std::env::set_var("TUNADB_PREFETCH_DEPTH", "AUTO");
        let mut config = DatabaseConfig::default();
        config.prefetch_depth = PrefetchDepth::Fixed(3);
        apply_env_overrides(&mut config);
        assert_eq!(config.prefetch_depth, PrefetchDepth::Auto);
        std::env::remove_var("TUNADB_PREFETCH_DEPTH");
    }
}
