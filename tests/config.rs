use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use firms_incidents::cluster::ClusterParams;
use firms_incidents::config::{Config, ConfigLoader};
use firms_incidents::error::FirmsError;

#[test]
fn parse_config_overrides() {
    let config: Config = serde_json::from_str(
        r#"{
            "map_key": "abc123",
            "default_timeout_secs": 90,
            "dataset": "MODIS_NRT",
            "chunk_days": 3,
            "eps": 0.02,
            "min_samples": 8,
            "border_dir": "/data/borders"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.require_map_key().unwrap(), "abc123");
    assert_eq!(resolved.default_timeout, Duration::from_secs(90));
    assert_eq!(resolved.dataset, "MODIS_NRT");
    assert_eq!(resolved.chunk_days, 3);
    assert_eq!(
        resolved.clustering,
        ClusterParams {
            eps: 0.02,
            min_samples: 8,
            max_time_diff_days: 5,
        }
    );
    assert_eq!(resolved.border_dir.as_str(), "/data/borders");
}

#[test]
fn custom_dataset_table_replaces_builtin() {
    let config: Config = serde_json::from_str(
        r#"{
            "border_dir": "/data/borders",
            "datasets": [
                { "id": "MODIS_NRT", "min_date": "2025-01-01", "max_date": null, "level": "near_real_time" },
                { "id": "MODIS_SP", "min_date": "2000-11-01", "max_date": "2025-01-31", "level": "standard_processing" }
            ],
            "fallback_dataset": "MODIS_SP"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.catalog.datasets().len(), 2);
    assert!(resolved.catalog.get("VIIRS_SNPP_SP").is_none());
    assert_eq!(
        resolved.catalog.sp_counterpart("MODIS_NRT").map(|d| d.id.as_str()),
        Some("MODIS_SP")
    );
}

#[test]
fn blank_map_key_is_missing() {
    let config = Config {
        map_key: Some("  ".to_string()),
        border_dir: Some("/data/borders".to_string()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_matches!(resolved.require_map_key(), Err(FirmsError::MissingApiKey));
}

#[test]
fn non_positive_eps_is_rejected() {
    let config = Config {
        eps: Some(0.0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(FirmsError::ConfigParse(_))
    );
}

#[test]
fn explicit_path_must_exist_and_parse() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(FirmsError::ConfigRead(_))
    );

    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ chunk_days: 3").unwrap();
    assert_matches!(
        ConfigLoader::resolve(broken.to_str()),
        Err(FirmsError::ConfigParse(_))
    );

    let good = dir.path().join("firms.json");
    fs::write(&good, r#"{ "chunk_days": 5, "border_dir": "/data/borders" }"#).unwrap();
    let resolved = ConfigLoader::resolve(good.to_str()).unwrap();
    assert_eq!(resolved.chunk_days, 5);
}
