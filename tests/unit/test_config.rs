use mindforge::config::Config;
use std::sync::Mutex;

// `apply_env_overrides` reads process-global environment variables, so
// these tests share a lock to avoid racing each other's env mutations.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn load_rejects_malformed_json() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autonomous.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(Config::load(Some(&path)).is_err());
}

#[test]
fn data_dir_env_override_wins_over_file_default() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("MINDFORGE_DATA_DIR", "/tmp/mindforge-test-data-dir");
    let config = Config::load(None).unwrap();
    std::env::remove_var("MINDFORGE_DATA_DIR");
    assert_eq!(config.data_dir, std::path::PathBuf::from("/tmp/mindforge-test-data-dir"));
}

#[test]
fn unset_gateway_endpoint_override_leaves_the_default_alone() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::remove_var("MINDFORGE_GATEWAY_ENDPOINT");
    let config = Config::load(Some(std::path::Path::new("/nonexistent/autonomous.json"))).unwrap();
    assert_eq!(config.gateway.endpoint, Config::default().gateway.endpoint);
}
