use std::{io::Write, time::Duration};

use vulnscan_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, ConfigMetadata,
    LauncherKind,
    models::sources::{EnvConfig, FileConfig},
};
use vulnscan_model::TagPolicy;

fn file(raw: &str) -> FileConfig {
    toml::from_str(raw).expect("valid toml")
}

fn metadata() -> ConfigMetadata {
    ConfigMetadata {
        config_path: Some("vulnscan.toml".into()),
        env_file_loaded: false,
    }
}

#[test]
fn defaults_match_the_reference_deployment() {
    let load = ConfigLoader::compose(None, EnvConfig::default(), metadata())
        .expect("defaults compose");
    let config = load.config;

    assert_eq!(config.server.port, 8000);
    assert_eq!(config.engine.trivy_path, "trivy");
    assert_eq!(config.engine.scanners, "vuln");
    assert_eq!(config.engine.timeout, Duration::from_secs(20 * 60));
    assert_eq!(config.dispatcher.tag_policy, TagPolicy::Latest);
    assert_eq!(config.launcher.kind, LauncherKind::Process);
    assert!(!config.reconciler.is_enabled());
    assert!(config.cors.is_wildcard_included());
}

#[test]
fn environment_overrides_file_values() {
    let file = file(
        r#"
        [server]
        port = 9000

        [engine]
        timeout = "5m"
        scanners = "vuln,secret"

        [launcher]
        kind = "docker"
        worker_image = "registry.local/worker:1"
        "#,
    );
    let env = EnvConfig {
        server_port: Some(9100),
        scan_timeout: Some("90s".into()),
        ..EnvConfig::default()
    };

    let config = ConfigLoader::compose(Some(file), env, metadata())
        .expect("compose")
        .config;

    assert_eq!(config.server.port, 9100);
    assert_eq!(config.engine.timeout, Duration::from_secs(90));
    assert_eq!(config.engine.scanners, "vuln,secret");
    assert_eq!(config.launcher.kind, LauncherKind::Docker);
    assert_eq!(config.launcher.worker_image, "registry.local/worker:1");
}

#[test]
fn worker_database_url_falls_back_to_primary() {
    let env = EnvConfig {
        database_url: Some("postgres://api@db/scans".into()),
        ..EnvConfig::default()
    };
    let config = ConfigLoader::compose(None, env, metadata())
        .expect("compose")
        .config;
    assert_eq!(config.worker_database_url(), Some("postgres://api@db/scans"));

    let env = EnvConfig {
        database_url: Some("postgres://api@db/scans".into()),
        worker_database_url: Some("postgres://worker@db/scans".into()),
        ..EnvConfig::default()
    };
    let config = ConfigLoader::compose(None, env, metadata())
        .expect("compose")
        .config;
    assert_eq!(
        config.worker_database_url(),
        Some("postgres://worker@db/scans")
    );
}

#[test]
fn invalid_duration_fails_the_load() {
    let env = EnvConfig {
        scan_timeout: Some("forever".into()),
        ..EnvConfig::default()
    };
    let err = ConfigLoader::compose(None, env, metadata()).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::InvalidDuration { field: "SCAN_TIMEOUT", .. }
    ));
}

#[test]
fn unknown_launcher_kind_fails_the_load() {
    let env = EnvConfig {
        launcher_kind: Some("kubernetes".into()),
        ..EnvConfig::default()
    };
    let err = ConfigLoader::compose(None, env, metadata()).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::UnknownLauncherKind { value } if value == "kubernetes"
    ));
}

#[test]
fn zero_timeout_is_a_guard_rail_error() {
    let env = EnvConfig {
        scan_timeout: Some("0s".into()),
        ..EnvConfig::default()
    };
    let err = ConfigLoader::compose(None, env, metadata()).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroDuration {
            field: "SCAN_TIMEOUT"
        })
    ));
}

#[test]
fn short_reconcile_grace_produces_a_warning() {
    let env = EnvConfig {
        reconcile_interval: Some("1m".into()),
        reconcile_pending_grace: Some("2m".into()),
        database_url: Some("postgres://api@db/scans".into()),
        cors_allowed_origins: Some(vec!["http://dashboard".into()]),
        ..EnvConfig::default()
    };
    let load = ConfigLoader::compose(None, env, metadata()).expect("compose");

    assert_eq!(load.config.reconciler.interval, Some(Duration::from_secs(60)));
    assert!(
        load.warnings
            .iter()
            .any(|w| w.message.contains("RECONCILE_PENDING_GRACE"))
    );
}

#[test]
fn parse_tag_policy_is_accepted_from_file() {
    let file = file(
        r#"
        [dispatcher]
        tag_policy = "parse"
        "#,
    );
    let config =
        ConfigLoader::compose(Some(file), EnvConfig::default(), metadata())
            .expect("compose")
            .config;
    assert_eq!(config.dispatcher.tag_policy, TagPolicy::Parse);
}

#[test]
fn explicit_missing_config_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let err = ConfigLoader::new()
        .with_config_path(&missing)
        .with_env_file(dir.path().join(".env"))
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { path } if path == missing));
}

#[test]
fn malformed_config_file_reports_parse_error() {
    let mut toml_file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    writeln!(toml_file, "[engine\ntimeout = ").unwrap();

    let err = ConfigLoader::new()
        .with_config_path(toml_file.path())
        .with_env_file(toml_file.path().with_extension("env"))
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { .. }));
}

#[test]
fn pgdatabase_alone_yields_a_database_url() {
    let env = EnvConfig {
        pg_database: Some("vuln_scanner".into()),
        ..EnvConfig::default()
    };
    let load = ConfigLoader::compose(None, env, metadata())
        .expect("PGDATABASE composes");
    let config = load.config;

    assert_eq!(
        config.database.primary_url.as_deref(),
        Some("postgresql:///vuln_scanner")
    );
    assert_eq!(
        config.worker_database_url(),
        Some("postgresql:///vuln_scanner")
    );
}
