use std::fs;

use bundlescope::{
    ConfigError, Fidelity, Mode, RawUserConfig, config::Severity, normalize_user_config,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[test]
fn test_json_config_from_disk() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("rsdoctor.json");
    fs::write(
        &path,
        r#"{
            "mode": "lite",
            "features": { "resolver": true, "loader": "yes" },
            "linter": { "rules": { "duplicate-package": "warn" }, "extends": ["recommended"] },
            "loaderInterceptorOptions": { "skipLoaders": ["thread-loader"] },
            "port": 9988,
            "name": "client"
        }"#,
    )
    .expect("write config");

    let raw = RawUserConfig::from_path(&path).expect("config loads");
    let config = normalize_user_config(&raw).expect("config normalizes");

    assert_eq!(config.mode, Mode::Lite);
    assert_eq!(config.fidelity, Fidelity::NoSource);
    assert!(config.features.resolver);
    assert!(config.features.lite);
    // Non-boolean flags fall back to their default
    assert!(config.features.loader);
    assert_eq!(config.linter.level, Severity::Error);
    assert_eq!(config.linter.extends, vec!["recommended".to_owned()]);
    assert_eq!(config.loader_interceptor.skip_loaders, vec!["thread-loader".to_owned()]);
    assert_eq!(config.port, Some(9988));
    assert_eq!(config.name.as_deref(), Some("client"));
}

#[test]
fn test_toml_config_from_disk() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("bundlescope.toml");
    fs::write(
        &path,
        r#"
mode = "normal"
features = ["loader", "bundle"]
disableClientServer = true

[reportCodeType]
noCode = true
"#,
    )
    .expect("write config");

    let raw = RawUserConfig::from_path(&path).expect("config loads");
    let config = normalize_user_config(&raw).expect("config normalizes");

    assert_eq!(config.fidelity, Fidelity::NoCode);
    assert!(config.disable_client_server);
    assert!(config.features.loader && config.features.bundle);
    assert!(!config.features.plugins);
}

#[test]
fn test_wrong_shape_names_the_field() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("broken.json");
    fs::write(&path, r#"{ "linter": ["not", "an", "object"] }"#).expect("write config");

    let raw = RawUserConfig::from_path(&path).expect("syntax is valid");
    let err = normalize_user_config(&raw).expect_err("shape is invalid");

    assert!(matches!(err, ConfigError::InvalidShape { field: "linter", .. }));
    assert_eq!(err.field(), "linter");
}

#[test]
fn test_missing_file_reports_path() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("absent.json");

    let err = RawUserConfig::from_path(&path).expect_err("file does not exist");
    assert!(format!("{err:#}").contains("absent.json"));
}
