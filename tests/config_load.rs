//! Integration tests for `Config::load`.

use ds_gateway::config::Config;
use tempfile::TempDir;

#[tokio::test]
async fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load(&dir.path().join("absent.yaml")).await.unwrap();
    assert_eq!(config.cache.ttl_secs, 300);
    assert_eq!(config.datastage.dsjob_bin, "dsjob");
}

#[tokio::test]
async fn relative_directories_follow_the_config_file() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("tools")).unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "datastage:\n  server: ENGINE\n  dsjob_bin: /opt/IBM/bin/dsjob\ncache:\n  ttl_secs: 60\ngateway:\n  tools_dir: tools\n",
    )
    .unwrap();

    let config = Config::load(&path).await.unwrap();
    assert_eq!(config.gateway.tools_dir, dir.path().join("tools"));
    // No such directory next to the file: left relative.
    assert_eq!(config.gateway.prompts_dir, std::path::PathBuf::from("prompts"));
    assert_eq!(config.cache.ttl_secs, 60);
    assert_eq!(config.datastage.dsjob_bin, "/opt/IBM/bin/dsjob");
}

#[tokio::test]
async fn invalid_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");

    std::fs::write(&path, "datastage: [not, a, map]\n").unwrap();
    assert!(Config::load(&path).await.is_err());

    std::fs::write(&path, "cache:\n  ttl_secs: 0\n").unwrap();
    assert!(Config::load(&path).await.is_err());
}

#[tokio::test]
async fn env_credentials_starting_with_dollar_survive_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "datastage:\n  password: $UNSET_REF\n").unwrap();

    let env = |key: &str| match key {
        "DATASTAGE_PASSWORD" => Some("$ecretPw1".to_string()),
        "DSGATE_API_TOKEN" => Some("$token".to_string()),
        _ => None,
    };
    let config = Config::load_with(&path, env).await.unwrap();
    assert_eq!(config.datastage.password.as_deref(), Some("$ecretPw1"));
    assert_eq!(config.gateway.api_token.as_deref(), Some("$token"));
    assert!(config.datastage.missing_settings().iter().all(|s| *s != "password"));
}

#[tokio::test]
async fn file_password_reference_is_resolved_from_env() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "datastage:\n  password: $DS_PW\n").unwrap();

    let env = |key: &str| (key == "DS_PW").then(|| "hunter2".to_string());
    let config = Config::load_with(&path, env).await.unwrap();
    assert_eq!(config.datastage.password.as_deref(), Some("hunter2"));
}
