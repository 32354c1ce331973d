//! Smoke tests for the `wicket` binary.
//!
//! Exercise the CLI surface without binding a port or calling a model.

use std::process::Command;

use tempfile::TempDir;

fn wicket() -> Command {
    Command::new(env!("CARGO_BIN_EXE_wicket"))
}

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let widgets = dir.path().join("widgets");
    let path = dir.path().join("wicket.toml");
    std::fs::write(
        &path,
        format!(
            "[llm]\nprovider = \"stub\"\n\n[storage]\nwidgets_dir = \"{}\"\n",
            widgets.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn binary_responds_to_help() {
    let output = wicket().arg("--help").output().expect("failed to execute wicket");
    assert!(output.status.success(), "wicket --help should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("list"));
    assert!(stdout.contains("show"));
}

#[test]
fn version_flag() {
    let output = wicket().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn list_with_empty_store() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = wicket()
        .args(["list", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("No widgets stored."));
}

#[test]
fn list_and_show_read_stored_records() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let widgets = dir.path().join("widgets");
    std::fs::create_dir_all(&widgets).unwrap();
    // A record in the legacy field layout.
    std::fs::write(
        widgets.join("1717000000000.json"),
        r#"{
    "id": 1717000000000,
    "name": "Platinum Member Lookup",
    "category": "query",
    "python_code": "def run_widget(inputs):\n    return 'No results found.'\n",
    "html_code": "<button type=\"submit\">Run</button>",
    "creation_date": "2024-05-29T16:26:40.123456",
    "usage_count": 3
}"#,
    )
    .unwrap();

    let output = wicket().arg("list").arg("--config").arg(&config).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1717000000000"));
    assert!(stdout.contains("Platinum Member Lookup"));

    let output = wicket()
        .args(["show", "1717000000000", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["usage_count"], 3);
    assert_eq!(shown["category"], "query");
    assert!(shown["code"].as_str().unwrap().contains("run_widget"));
}

#[test]
fn show_unknown_widget_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = wicket()
        .args(["show", "42", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("widget 42 not found"));
}

#[test]
fn serve_without_config_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("wicket.toml");

    let output = wicket()
        .args(["serve", "--config"])
        .arg(&missing)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("wicket.toml"));
}
