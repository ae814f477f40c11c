//! Integration tests for recall-config.

use recall_config::{ConfigError, DeviceKind, EngineConfig};
use recall_core::SampleFormat;
use tempfile::TempDir;

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("engine.toml");

    let config = EngineConfig {
        samplerate: 48000,
        buffer_size: 256,
        format: SampleFormat::Signed24,
        bpm: 96.0,
        device: DeviceKind::Cpal,
        device_name: Some("usb".to_string()),
        ..EngineConfig::default()
    };
    config.save(&path).unwrap();
    assert!(path.is_file());

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(r#"format = "s24""#), "got: {text}");
    assert!(text.contains(r#"device = "cpal""#), "got: {text}");
    assert!(!text.contains("output"), "got: {text}");
}

#[test]
fn missing_file_is_a_read_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = EngineConfig::load(temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test]
fn load_or_default_falls_back() {
    let temp_dir = TempDir::new().unwrap();
    let config = EngineConfig::load_or_default(temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn configured_context_drives_timing() {
    let config = EngineConfig::from_toml(
        r#"
        samplerate = 44100
        buffer_size = 1024
        bpm = 120.0
        delay_factor = 1.0
        "#,
    )
    .unwrap();
    let context = config.to_context().unwrap();
    let state = context.device_state().unwrap();
    let delay = state.clock.tables().delay()[0];
    assert!((delay - 1.3458).abs() < 1e-3, "delay[0] = {delay}");
}
