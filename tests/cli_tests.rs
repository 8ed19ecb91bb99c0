//! Integration tests for the matlab-harness CLI
//!
//! These run the actual binary against the simulated engine.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Binary wired to an isolated workspace, projects root and config file
fn harness_cmd(dir: &TempDir) -> Command {
    let config = dir.path().join("config.toml");
    if !config.exists() {
        fs::write(&config, "").unwrap();
    }

    let mut cmd = Command::cargo_bin("matlab-harness").unwrap();
    cmd.current_dir(dir.path())
        .env("MATLAB_WORKSPACE_DIR", dir.path().join("ws"))
        .env("MATLAB_PROJECTS_ROOT", dir.path().join("MATLAB_Projects"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .args(["--engine", "mock", "--config"])
        .arg(&config);
    cmd
}

#[test]
fn test_help_flag() {
    Command::cargo_bin("matlab-harness")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution orchestration"))
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("projects"));
}

#[test]
fn test_exec_help_lists_flags() {
    Command::cargo_bin("matlab-harness")
        .unwrap()
        .args(["exec", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-validate"))
        .stdout(predicate::str::contains("--no-position"))
        .stdout(predicate::str::contains("--json"));
}

// ============================================================================
// EXECUTION
// ============================================================================

#[test]
fn test_exec_prints_output() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "disp('hello from mock')"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Execution completed"))
        .stdout(predicate::str::contains("hello from mock"));
}

#[test]
fn test_exec_without_output() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "x = 1;", "--no-capture"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(No output produced)"));
}

#[test]
fn test_execution_error_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "disp('before'); error('Something broke')"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Execution failed: Something broke"))
        .stdout(predicate::str::contains("Output before error"))
        .stdout(predicate::str::contains("before"));
}

#[test]
fn test_critical_warning_fails_validation() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "warning('Matrix is singular to working precision.')"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("validation found critical issues"))
        .stdout(predicate::str::contains("[CRITICAL]"));
}

#[test]
fn test_no_validate_skips_classification() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "warning('Matrix is singular')", "--no-validate"])
        .assert()
        .success();
}

#[test]
fn test_json_result() {
    let dir = TempDir::new().unwrap();
    let output = harness_cmd(&dir)
        .args(["exec", "plot(1:10)", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["figures_created"], 1);
    assert_eq!(json["figures_positioned"], 1);
    assert_eq!(json["validation"]["has_errors"], false);
    assert!(json["script_saved"].as_str().unwrap().contains("script_"));
}

#[test]
fn test_strict_flag_fails_blank_figure() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "figure", "--strict", "--json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"error_kind\": \"ValidationFailed\""));
}

#[test]
fn test_run_file_archives_script() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("analysis.m");
    fs::write(&script, "x = 0:10;\nplot(x)\n").unwrap();

    harness_cmd(&dir)
        .arg("run")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created 1 new figure(s)"))
        .stdout(predicate::str::contains("Script saved:"));

    let scripts: Vec<_> = fs::read_dir(dir.path().join("ws").join("scripts"))
        .unwrap()
        .collect();
    assert_eq!(scripts.len(), 1);
}

#[test]
fn test_no_save_writes_nothing() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "plot(1:3)", "--no-save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Script saved").not());
    assert!(!dir.path().join("ws").join("scripts").exists());
}

#[test]
fn test_run_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["run", "does_not_exist.m"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_unknown_engine_has_fix_suggestion() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("matlab-harness")
        .unwrap()
        .current_dir(dir.path())
        .env("MATLAB_WORKSPACE_DIR", dir.path().join("ws"))
        .env("NO_COLOR", "1")
        .args(["--engine", "octave", "exec", "x = 1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MLH-014"))
        .stderr(predicate::str::contains("Fix:"));
}

// ============================================================================
// PROJECTS
// ============================================================================

#[test]
fn test_projects_set_and_list() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["projects", "set", "Foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MATLAB_Projects"));
    assert!(dir.path().join("MATLAB_Projects").join("Foo").is_dir());

    harness_cmd(&dir)
        .args(["projects", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Foo"));
}

#[test]
fn test_projects_rejects_traversal() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["projects", "set", ".."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MLH-030"));
}

#[test]
fn test_exec_in_project_saves_there() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["exec", "plot(1:3)", "--project", "Thesis"])
        .assert()
        .success();
    assert!(dir
        .path()
        .join("MATLAB_Projects")
        .join("Thesis")
        .join("scripts")
        .is_dir());
}

#[test]
fn test_projects_current_without_project() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .args(["projects", "current"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No project set"));
}

// ============================================================================
// REPL
// ============================================================================

#[test]
fn test_repl_keeps_state_between_lines() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .arg("repl")
        .write_stdin("a = 5\n:get a\n:vars\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("a = 5"))
        .stdout(predicate::str::contains("double 1x1"));
}

#[test]
fn test_repl_commands_report_errors_and_continue() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .arg("repl")
        .write_stdin(":get missing\n:bogus\ndisp('still alive')\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("MLH-020"))
        .stderr(predicate::str::contains("unknown command"))
        .stdout(predicate::str::contains("still alive"));
}

#[test]
fn test_repl_position_and_export() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .arg("repl")
        .write_stdin("plot(1:3)\n:position tile\n:export 1 out.svg\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Positioned 1 figure(s) (tile)"))
        .stdout(predicate::str::contains("✓ Exported:"));
    assert!(dir.path().join("ws").join("out.svg").exists());
}

#[test]
fn test_repl_save_last_code() {
    let dir = TempDir::new().unwrap();
    harness_cmd(&dir)
        .arg("repl")
        .write_stdin("y = 3\n:save keep\n")
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(dir.path().join("ws").join("keep.m")).unwrap(),
        "y = 3"
    );
}
