use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use docchat::auth::{self, TokenSigner};
use docchat::config::load_config;
use docchat::services::Services;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().display().to_string().replace('\\', "/");

    let config_dir = tmp.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docchat.sqlite"

[storage]
uploads_dir = "{root}/uploads"

[auth]
secret = "cli-test-secret"

[server]
bind = "127.0.0.1:8001"
"#
    );

    let config_path = config_dir.join("docchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_docchat"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run docchat binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

async fn create_user(config_path: &Path, username: &str) {
    let config = load_config(config_path).unwrap();
    let services = Services::from_config(&config).await.unwrap();
    let signer = TokenSigner::new("cli-test-secret", 60);
    auth::register(services.store.as_ref(), &signer, username, "pw")
        .await
        .unwrap();
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docchat(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));
    assert!(tmp.path().join("data/docchat.sqlite").exists());
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    assert!(run_docchat(&config_path, &["init"]).2);
    let (_, stderr, success) = run_docchat(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docchat(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_documents_for_unknown_user_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_docchat(&config_path, &["init"]);

    let (_, stderr, success) = run_docchat(&config_path, &["documents", "--user", "ghost"]);
    assert!(!success);
    assert!(stderr.contains("No such user: ghost"));
}

#[tokio::test]
async fn test_documents_empty_for_new_user() {
    let (_tmp, config_path) = setup_test_env();
    create_user(&config_path, "alice").await;

    let (stdout, stderr, success) = run_docchat(&config_path, &["documents", "--user", "alice"]);
    assert!(success, "documents failed: {}", stderr);
    assert!(stdout.contains("No documents."));
}

#[tokio::test]
async fn test_ingest_rejects_non_pdf() {
    let (tmp, config_path) = setup_test_env();
    create_user(&config_path, "alice").await;

    let notes = tmp.path().join("notes.txt");
    fs::write(&notes, "just text").unwrap();

    let (_, stderr, success) = run_docchat(
        &config_path,
        &["ingest", notes.to_str().unwrap(), "--user", "alice"],
    );
    assert!(!success);
    assert!(stderr.contains("Only PDF files are supported"));
    assert!(!tmp.path().join("uploads").exists());
}
