//! Tests for OrchestratorConfig file loading

use query_orchestrator::OrchestratorConfig;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_from_file() {
    let file = yaml_file(
        r#"
intent_deadline_ms: 2500
include_partial: false
endpoints:
  intent_url: "http://intent.internal/classify"
"#,
    );

    let config = OrchestratorConfig::from_file(file.path()).unwrap();

    assert_eq!(config.intent_deadline(), Duration::from_millis(2_500));
    assert_eq!(config.source_deadline(), Duration::from_secs(12));
    assert!(!config.include_partial);
    assert_eq!(config.endpoints.intent_url, "http://intent.internal/classify");
}

#[test]
fn test_load_explicit_path_validates() {
    let file = yaml_file("source_deadline_ms: 0\n");

    let err = OrchestratorConfig::load(Some(file.path())).unwrap_err();
    assert!(format!("{err:#}").contains("source_deadline_ms"));
}

#[test]
fn test_malformed_yaml_names_file() {
    let file = yaml_file("intent_deadline_ms: [not, a, number]\n");

    let err = OrchestratorConfig::from_file(file.path()).unwrap_err();
    let path = file.path().display().to_string();
    assert!(err.to_string().contains(&path));
}

#[test]
fn test_yaml_round_trip_of_effective_config() {
    let config = OrchestratorConfig {
        querying_deadline_ms: 9_000,
        event_capacity: 64,
        ..Default::default()
    };

    let file = yaml_file(&config.to_yaml().unwrap());
    assert_eq!(OrchestratorConfig::from_file(file.path()).unwrap(), config);
}
