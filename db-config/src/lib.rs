//! Ambient configuration: a [`DatabaseConfig`] loadable from TOML, overlaid
//! with `TUNADB_`-prefixed environment variables, and validated against the
//! compile-time core cap before the runtime starts up.

pub mod env;
pub mod schema;

pub use env::apply_env_overrides;
pub use schema::{ConfigError, DatabaseConfig, OrderingPolicy, PrefetchDepth};

use std::path::Path;

/// Upper bound on a fixed prefetch ring depth; matches the prefetch
/// pipeline's `MAX_CACHE_LINES` budget (spec §4.7.1).
pub const PREFETCH_MAX_DEPTH: usize = 17;

/// Load hierarchy: defaults, then file (if present), then environment.
pub fn load_config(path: Option<&Path>) -> Result<DatabaseConfig, ConfigError> {
    let mut config = match path {
        Some(path) if path.exists() => load_from_file(path)?,
        Some(path) => {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        None => DatabaseConfig::default(),
    };

    env::apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

pub fn load_from_file(path: &Path) -> Result<DatabaseConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = DatabaseConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_missing_path_is_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/path/config.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_from_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
cores = 4
prefetch_depth = "auto"
ordering = "numa-aware"
epoch_interval_ms = 5
server_port = 9090
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.cores, 4);
        assert_eq!(config.prefetch_depth, PrefetchDepth::Auto);
        assert_eq!(config.ordering, OrderingPolicy::NumaAware);
        assert_eq!(config.server_port, 9090);
    }
}
