//! Integration tests for the pricepulse CLI.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Get the path to the pricepulse binary.
fn pricepulse_bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pricepulse"));
    command.env_remove("PRICEPULSE_CONFIG").env_remove("RUST_LOG");
    command
}

/// Fresh scratch directory holding a config that points at a private store file.
fn scratch(name: &str) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("pricepulse-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");

    let store = dir.join("subscriptions.json");
    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[general]\ncheck_interval = 3600\n\n[storage]\npath = {:?}\n\n[quotes]\nbase_url = \"http://127.0.0.1:9\"\n",
            store.display().to_string()
        ),
    )
    .expect("Failed to write config");
    (config, store)
}

#[test]
fn test_help_flag() {
    let output = pricepulse_bin()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pricepulse"));
    assert!(stdout.contains("Price change alerts"));
    assert!(stdout.contains("--interval"));
    assert!(stdout.contains("--store"));
    assert!(stdout.contains("--batch"));
}

#[test]
fn test_version_flag() {
    let output = pricepulse_bin()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pricepulse"));
    assert!(stdout.contains("0.") || stdout.contains("1."));
}

#[test]
fn test_invalid_interval() {
    let output = pricepulse_bin()
        .args(["-b", "-d", "invalid"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn test_sample_config_flag() {
    let output = pricepulse_bin()
        .arg("--sample-config")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[general]"));
    assert!(stdout.contains("check_interval"));
    assert!(stdout.contains("[quotes]"));
}

#[test]
fn test_broken_config_is_an_error() {
    let (config, _) = scratch("broken");
    std::fs::write(&config, "[general\n").unwrap();

    let output = pricepulse_bin()
        .args(["-b", "-n", "1"])
        .arg("-c")
        .arg(&config)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config file"));
}

#[test]
fn test_batch_mode_with_empty_store() {
    let (config, store) = scratch("batch");

    let output = pricepulse_bin()
        .args(["-b", "-n", "1", "-d", "0.05"])
        .arg("-c")
        .arg(&config)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    // Nothing tracked: no quote request, nothing written until the final flush
    assert!(store.exists());
    let saved = std::fs::read_to_string(&store).unwrap();
    assert_eq!(saved.trim(), "{}");
}

#[test]
fn test_console_session_persists_threshold() {
    let (config, store) = scratch("console");

    let mut child = pricepulse_bin()
        .args(["--subscriber", "7", "--name", "tester"])
        .arg("-c")
        .arg(&config)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start command");

    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(b"/help\n1.5\n!thresholds\n/quit\n")
        .expect("Failed to write stdin");

    let output = child.wait_with_output().expect("Failed to wait for command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Welcome"));
    assert!(stdout.contains("Commands:"));
    assert!(stdout.contains("Default threshold set to 1.5%"));
    assert!(stdout.contains("!default-menu"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
    assert_eq!(saved["7"]["username"], "tester");
    assert_eq!(saved["7"]["threshold"], 1.5);
    assert_eq!(saved["7"]["coins"], serde_json::json!([]));
}
