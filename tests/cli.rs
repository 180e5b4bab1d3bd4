//! Integration tests for the command-line front end

use std::path::PathBuf;
use std::process::Command;

fn run(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_gridweave"))
        // Tests must not depend on a user's ~/.config/gridweave/config.toml.
        .arg("--config")
        .arg(fixture("config.toml"))
        .args(args)
        .output()
        .expect("Failed to execute gridweave");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code().unwrap_or(-1))
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .display()
        .to_string()
}

#[test]
fn test_basic_arithmetic() {
    let (stdout, _, code) = run(&["-c", "=5+3"]);
    assert_eq!(stdout.trim(), "8");
    assert_eq!(code, 0);
}

#[test]
fn test_split_order_without_precedence() {
    let (stdout, _, code) = run(&["-c", "=10-2-3"]);
    assert_eq!(stdout.trim(), "11");
    assert_eq!(code, 0);
}

#[test]
fn test_error_value_is_printed() {
    let (stdout, _, code) = run(&["-c", "=10/0"]);
    assert!(stdout.contains("Division by zero"), "{stdout}");
    assert_eq!(code, 0);
}

#[test]
fn test_formula_against_document() {
    let doc = fixture("budget.json");
    let (stdout, _, code) = run(&[&doc, "-c", "=SUM(costs[amount])", "-c", "=B4"]);
    assert_eq!(stdout.trim(), "42\n42");
    assert_eq!(code, 0);
}

#[test]
fn test_markdown_to_stdout() {
    let doc = fixture("budget.json");
    let (stdout, _, code) = run(&[&doc]);
    assert!(stdout.starts_with("# Sheet"));
    assert!(stdout.contains("| 4 |  | 42 |"), "{stdout}");
    assert_eq!(code, 0);
}

#[test]
fn test_unknown_option() {
    let (_, stderr, code) = run(&["--frobnicate"]);
    assert!(stderr.contains("Unknown option: --frobnicate"));
    assert_eq!(code, 1);
}

#[test]
fn test_missing_document_is_an_error() {
    let path = std::env::temp_dir().join(format!("gridweave_cli_bad_{}.json", std::process::id()));
    std::fs::write(&path, "{ not json").unwrap();
    let (_, stderr, code) = run(&[&path.display().to_string()]);
    let _ = std::fs::remove_file(&path);
    assert!(stderr.starts_with("Error: loading"), "{stderr}");
    assert_eq!(code, 1);
}
