//! Persistence round-trip and edge case tests.
//!
//! Tests file I/O operations, JSON persistence, and settings round-trip.

use std::path::PathBuf;
use tempfile::TempDir;

use sigil_core::CacheMode;
use sigil_http::{ParameterHandling, SignatureMethod};

use crate::persistence::{load_json, save_json};
use crate::settings_store::{LogLevel, Settings, SettingsStore};

// ============================================================================
// JSON Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested_path = temp_dir.path().join("deeply").join("nested").join("test.json");

    let data = serde_json::json!({"key": "value"});

    save_json(&nested_path, &data).await.unwrap();
    assert!(nested_path.exists());
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let file_path = PathBuf::from("/nonexistent/path/settings.json");

    let result: Result<Settings, _> = load_json(&file_path).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_atomic_write() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("atomic.json");

    save_json(&file_path, &Settings::default()).await.unwrap();
    save_json(&file_path, &Settings::default()).await.unwrap();

    assert!(!temp_dir.path().join("atomic.json.partial").exists());
    assert!(file_path.exists());
}

// ============================================================================
// Settings Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_settings_full_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");

    let mut settings = Settings::default();
    settings.authority = Some("https://api.example.com".to_string());
    settings.version_path = Some("1.1".to_string());
    settings.timeout_secs = Some(20);
    settings.retry_count = 3;
    settings.follow_redirects = false;
    settings.cache_mode = Some(CacheMode::SlidingExpiration);
    settings.cache_secs = 90;
    settings.log_level = LogLevel::Debug;
    settings.profile = "work".to_string();
    settings.consumer_key = Some("dpf43f3p2l4k3l03".to_string());
    settings.signature_method = SignatureMethod::PlainText;
    settings.parameter_handling = ParameterHandling::UrlOrPostParameters;

    save_json(&file_path, &settings).await.unwrap();
    let loaded: Settings = load_json(&file_path).await.unwrap();

    assert_eq!(loaded, settings);
}

#[tokio::test]
async fn test_store_save_and_reload() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");

    let store = SettingsStore::load(file_path.clone()).await.unwrap();
    store.set("authority", "https://api.example.com").await.unwrap();
    store.set("cache_mode", "absolute").await.unwrap();
    store.save().await.unwrap();

    let reloaded = SettingsStore::load(file_path).await.unwrap();
    let settings = reloaded.get().await;
    assert_eq!(settings.authority.as_deref(), Some("https://api.example.com"));
    assert_eq!(settings.cache_mode, Some(CacheMode::AbsoluteExpiration));
}

#[tokio::test]
async fn test_settings_all_log_levels() {
    let temp_dir = TempDir::new().unwrap();

    for level in [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ] {
        let file_path = temp_dir.path().join(format!("settings_{level}.json"));

        let settings = Settings {
            log_level: level,
            ..Settings::default()
        };

        save_json(&file_path, &settings).await.unwrap();
        let loaded: Settings = load_json(&file_path).await.unwrap();

        assert_eq!(loaded.log_level, level);
    }
}

// ============================================================================
// Backward Compatibility Tests
// ============================================================================

#[tokio::test]
async fn test_load_minimal_json_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("minimal.json");

    tokio::fs::write(&file_path, "{}").await.unwrap();

    let loaded: Settings = load_json(&file_path).await.unwrap();
    assert_eq!(loaded, Settings::default());
    assert!(loaded.follow_redirects);
}

#[tokio::test]
async fn test_load_json_with_unknown_fields() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("extra_fields.json");

    let json = r#"{
        "retry_count": 2,
        "signature_method": "rsa-sha1",
        "unknown_field": "value",
        "nested_unknown": {"key": "value"}
    }"#;
    tokio::fs::write(&file_path, json).await.unwrap();

    let loaded: Settings = load_json(&file_path).await.unwrap();
    assert_eq!(loaded.retry_count, 2);
    assert_eq!(loaded.signature_method, SignatureMethod::RsaSha1);
}

#[tokio::test]
async fn test_corrupt_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("corrupt.json");
    tokio::fs::write(&file_path, "{ not json").await.unwrap();

    let store = SettingsStore::load(file_path).await.unwrap();
    assert_eq!(store.get().await, Settings::default());
}
