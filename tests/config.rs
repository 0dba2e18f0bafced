use std::io::Write as _;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tile_registry::{CapacityConfig, ConfigError, GridWorld, RegistryConfig, RegistryError, TileRegistry};

#[test]
fn defaults() {
    let config = RegistryConfig::default();
    assert_eq!(config.clone_limit(), Some(32));
    assert_eq!(config.callback_limit(), Some(128));
    assert_eq!(config.immediate_delay(), Duration::from_millis(10));
    assert_eq!(config.capacity, CapacityConfig::default());
}

#[test]
fn partial_toml_keeps_defaults_for_missing_keys() {
    let config = RegistryConfig::from_toml_str(
        r#"
        max_clones_per_tick = 0

        [capacity]
        bucket = 4
        "#,
    )
    .unwrap();

    assert_eq!(config.clone_limit(), None);
    assert_eq!(config.callback_limit(), Some(128));
    assert_eq!(config.capacity.bucket, 4);
    assert_eq!(config.capacity.tiles_per_surface, 256);
}

#[test]
fn serialized_config_parses_back() {
    let config = RegistryConfig {
        max_callbacks_per_tick: 7,
        immediate_delay_ms: 25,
        ..RegistryConfig::default()
    };
    let text = toml::to_string(&config).unwrap();
    assert_eq!(RegistryConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = RegistryConfig::from_toml_str("max_clones_per_tick = \"many\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "{err}");
}

#[test]
fn from_file_reads_and_reports_missing_files() {
    let dir = std::env::temp_dir().join(format!("tile-registry-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("registry.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "max_callbacks_per_tick = 3").unwrap();
    drop(file);

    assert_eq!(RegistryConfig::from_file(&path).unwrap().callback_limit(), Some(3));

    let missing = dir.join("absent.toml");
    let err = RegistryConfig::from_file(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::Io { ref path, .. } if *path == missing));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn registry_from_config_file_applies_limits_and_reports_errors() {
    let dir = std::env::temp_dir().join(format!("tile-registry-init-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("registry.toml");
    std::fs::write(&path, "max_clones_per_tick = 2\n").unwrap();
    let world = GridWorld::new();

    let registry = TileRegistry::from_config_file(&path, &world).unwrap();
    assert!(registry.is_initialized());
    assert_eq!(registry.config().clone_limit(), Some(2));

    let missing = TileRegistry::from_config_file(dir.join("absent.toml"), &world);
    assert!(matches!(missing, Err(RegistryError::Config(ConfigError::Io { .. }))));

    std::fs::remove_dir_all(&dir).unwrap();
}
