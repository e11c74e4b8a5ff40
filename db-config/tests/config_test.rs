use db_config::{load_config, ConfigError, OrderingPolicy, PrefetchDepth};

#[test]
fn default_config_validates() {
    let config = load_config(None).expect("default config should load");
    assert!(config.cores >= 1);
    assert_eq!(config.prefetch_depth, PrefetchDepth::Auto);
}

#[test]
fn file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.toml");
    std::fs::write(
        &path,
        r#"
cores = 2
prefetch_depth = { fixed = 4 }
ordering = "physical-then-smt"
server_port = 7000
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.cores, 2);
    assert_eq!(config.prefetch_depth, PrefetchDepth::Fixed(4));
    assert_eq!(config.ordering, OrderingPolicy::PhysicalThenSmt);
    assert_eq!(config.server_port, 7000);
}

#[test]
fn cores_above_cap_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.toml");
    std::fs::write(&path, "cores = 999\n").unwrap();

    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}
