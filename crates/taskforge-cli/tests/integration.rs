#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PRD: &str = "# Checkout\n\n## Cart\n\n- **REQ-1**: Shoppers add items through the cart API.\n- **REQ-2**: The cart page lists the items saved by REQ-1.\n\n## Notifications\n\n- **REQ-3**: Send a receipt email after payment.\n";

const ARCHITECTURE: &str = "# Checkout architecture\n\n## Overview\n\nThe checkout service owns carts and receipts.\n\n## Components\n\n- Cart service\n- Mailer\n";

fn taskforge(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("taskforge").unwrap();
    cmd.current_dir(dir.path())
        .env("TASKFORGE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn checkout_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    taskforge(&dir).arg("init").assert().success();
    std::fs::write(dir.path().join("prd-checkout.md"), PRD).unwrap();
    std::fs::write(dir.path().join("architecture-checkout.md"), ARCHITECTURE).unwrap();
    dir
}

fn generate(dir: &TempDir) {
    taskforge(dir)
        .args(["generate", "checkout", "--non-interactive"])
        .assert()
        .success();
}

fn read(dir: &TempDir, name: &str) -> String {
    std::fs::read_to_string(dir.path().join(name)).unwrap()
}

// ---------------------------------------------------------------------------
// taskforge init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    taskforge(&dir).arg("init").assert().success();
    assert!(dir.path().join(".taskforge/config.yaml").exists());
    assert!(dir.path().join(".taskforge/locks").is_dir());

    taskforge(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));
}

// ---------------------------------------------------------------------------
// taskforge generate
// ---------------------------------------------------------------------------

#[test]
fn generate_three_requirements_into_two_groups() {
    let dir = checkout_project();
    generate(&dir);

    let tasks = read(&dir, "tasks-checkout-1.md");
    assert!(tasks.contains("## Architecture Overview"));
    assert!(tasks.contains("The checkout service owns carts and receipts."));
    assert!(tasks.contains("## Component Breakdown"));
    assert!(tasks.contains("### 1.0 Cart"));
    assert!(tasks.contains("### 2.0 Notifications"));
    assert!(tasks.contains("- [ ] 1.1 "));
    assert!(tasks.contains("- [ ] 1.2 "));
    assert!(tasks.contains("- [ ] 2.1 "));

    let matrix = read(&dir, "tracmat-checkout.md");
    assert!(matrix.contains("| Requirement | TaskGroup | Subtask | ImplementationStatus |"));
    assert!(matrix.contains("| REQ-1 | 1.0 | 1.1 | pending |"));
    assert!(matrix.contains("| REQ-2 | 1.0 | 1.2 | pending |"));
    assert!(matrix.contains("| REQ-3 | 2.0 | 2.1 | pending |"));
    assert!(matrix.contains("3 requirements, 3 rows."));

    assert!(dir
        .path()
        .join(".taskforge/features/checkout/batches/0001.yaml")
        .exists());
    assert!(!dir.path().join(".taskforge/locks/checkout.lock").exists());
}

#[test]
fn missing_optional_document_only_warns() {
    let dir = checkout_project();
    taskforge(&dir)
        .args(["generate", "checkout", "--non-interactive"])
        .assert()
        .success()
        .stderr(predicate::str::contains("techreq-checkout.md"));
}

#[test]
fn missing_prd_exits_1() {
    let dir = checkout_project();
    std::fs::remove_file(dir.path().join("prd-checkout.md")).unwrap();
    taskforge(&dir)
        .args(["generate", "checkout", "--non-interactive"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("prd-checkout.md"));
}

#[test]
fn subtask_without_tests_exits_2() {
    let dir = checkout_project();
    std::fs::write(
        dir.path().join("plan.yaml"),
        "groups:
  - group: \"1.0\"
    subtasks:
      - name: Cart API
        requirement_ids: [REQ-1]
        testing:
          - kind: integration
            description: add item over HTTP
      - name: Cart page
        requirement_ids: [REQ-2]
        testing: []
  - group: Notifications
    subtasks:
      - name: Receipt email
        requirement_ids: [REQ-3]
        testing:
          - kind: unit
            description: renders the receipt
",
    )
    .unwrap();
    taskforge(&dir)
        .args(["config", "set-backend", "expander", "--type", "plan", "--path", "plan.yaml"])
        .assert()
        .success();

    taskforge(&dir)
        .args(["generate", "checkout", "--non-interactive"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("subtasks without testing requirements: 1.2"));
    assert!(!dir.path().join("tasks-checkout-1.md").exists());
    assert!(!dir.path().join("tracmat-checkout.md").exists());
}

#[test]
fn abandoning_the_checkpoint_exits_3() {
    let dir = checkout_project();
    taskforge(&dir)
        .args(["generate", "checkout"])
        .write_stdin("abandon\n")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Proposed task groups"));

    // Closed input is abandonment too.
    taskforge(&dir)
        .args(["generate", "checkout"])
        .write_stdin("")
        .assert()
        .code(3);
    assert!(!dir.path().join("tasks-checkout-1.md").exists());
}

#[test]
fn rejection_feedback_regroups_before_go() {
    let dir = checkout_project();
    taskforge(&dir)
        .args(["generate", "checkout"])
        .write_stdin("merge groups 1 and 2\ngo\n")
        .assert()
        .success();

    let tasks = read(&dir, "tasks-checkout-1.md");
    assert!(tasks.contains("### 1.0 "));
    assert!(!tasks.contains("### 2.0 "));
    assert!(tasks.contains("- [ ] 1.3 "));
}

#[test]
fn approval_timeout_abandons_with_exit_3() {
    let dir = checkout_project();
    std::fs::write(
        dir.path().join(".taskforge/config.yaml"),
        "approval:\n  timeout_seconds: 1\n",
    )
    .unwrap();

    // Keep stdin open and silent so only the timeout can end the wait.
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("taskforge"))
        .args(["generate", "checkout"])
        .current_dir(dir.path())
        .env("TASKFORGE_ROOT", dir.path())
        .env_remove("RUST_LOG")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let _stdin = child.stdin.take();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("(1s)"), "{stderr}");
    assert!(stderr.contains("no approval decision before timeout"), "{stderr}");
    assert!(!dir.path().join("tasks-checkout-1.md").exists());
}

#[test]
fn regeneration_keeps_cross_cutting_copies_apart() {
    let dir = checkout_project();
    let prd = format!("{PRD}\n## Platform\n\n- **REQ-9**: Audit logging for every change [cross-cutting].\n");
    std::fs::write(dir.path().join("prd-checkout.md"), prd).unwrap();
    generate(&dir);

    let audit_rows = |dir: &TempDir| -> Vec<String> {
        read(dir, "tracmat-checkout.md")
            .lines()
            .filter(|l| l.starts_with("| REQ-9 "))
            .map(str::to_string)
            .collect()
    };
    let rows = audit_rows(&dir);
    assert_eq!(rows.len(), 2, "{rows:?}");
    let first = rows[0].split('|').nth(3).unwrap().trim().to_string();

    taskforge(&dir)
        .args(["subtask", "done", "checkout", &first])
        .assert()
        .success();
    generate(&dir);

    let rows = audit_rows(&dir);
    assert!(rows[0].ends_with("| done |"), "{rows:?}");
    assert!(rows[1].ends_with("| pending |"), "{rows:?}");
}

#[test]
fn dry_run_writes_nothing() {
    let dir = checkout_project();
    taskforge(&dir)
        .args(["generate", "checkout", "--non-interactive", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would write: tasks-checkout-1.md"));
    assert!(!dir.path().join("tasks-checkout-1.md").exists());
    assert!(!dir.path().join(".taskforge/features/checkout").exists());
}

#[test]
fn concurrent_run_is_detected_and_unlock_clears_it() {
    let dir = checkout_project();
    std::fs::write(dir.path().join(".taskforge/locks/checkout.lock"), "stale").unwrap();

    taskforge(&dir)
        .args(["generate", "checkout", "--non-interactive"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("another run for feature 'checkout'"));

    taskforge(&dir)
        .args(["unlock", "checkout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared lock"));
    generate(&dir);
}

#[test]
fn regeneration_is_byte_identical() {
    let dir = checkout_project();
    generate(&dir);
    let tasks = read(&dir, "tasks-checkout-1.md");
    let matrix = read(&dir, "tracmat-checkout.md");
    generate(&dir);
    assert_eq!(tasks, read(&dir, "tasks-checkout-1.md"));
    assert_eq!(matrix, read(&dir, "tracmat-checkout.md"));
    assert!(dir
        .path()
        .join(".taskforge/features/checkout/batches/0002.yaml")
        .exists());
}

// ---------------------------------------------------------------------------
// taskforge requirements / status / subtask / validate
// ---------------------------------------------------------------------------

#[test]
fn requirements_lists_extracted_ids() {
    let dir = checkout_project();
    taskforge(&dir)
        .args(["requirements", "checkout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("REQ-1"))
        .stdout(predicate::str::contains("3 requirement(s)."));
}

#[test]
fn subtask_status_flows_into_documents() {
    let dir = checkout_project();
    generate(&dir);

    taskforge(&dir)
        .args(["subtask", "done", "checkout", "1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Subtask 1.1 is now done."));
    taskforge(&dir)
        .args(["subtask", "start", "checkout", "2.1"])
        .assert()
        .success();

    let tasks = read(&dir, "tasks-checkout-1.md");
    assert!(tasks.contains("- [x] 1.1 "));
    assert!(tasks.contains("- [~] 2.1 "));
    let matrix = read(&dir, "tracmat-checkout.md");
    assert!(matrix.contains("| REQ-1 | 1.0 | 1.1 | done |"));
    assert!(matrix.contains("| REQ-3 | 2.0 | 2.1 | in_progress |"));

    taskforge(&dir)
        .args(["status", "checkout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/3 done, 1 in progress"));
    taskforge(&dir).args(["validate", "checkout"]).assert().success();
}

#[test]
fn removing_the_only_subtask_for_a_requirement_fails() {
    let dir = checkout_project();
    generate(&dir);
    taskforge(&dir)
        .args(["subtask", "remove", "checkout", "2.1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("REQ-3"));
}

#[test]
fn validate_catches_edited_matrix() {
    let dir = checkout_project();
    generate(&dir);
    let matrix = read(&dir, "tracmat-checkout.md");
    let edited: String = matrix
        .lines()
        .filter(|l| !l.starts_with("| REQ-3 "))
        .map(|l| format!("{l}\n"))
        .collect();
    std::fs::write(dir.path().join("tracmat-checkout.md"), edited).unwrap();

    taskforge(&dir)
        .args(["validate", "checkout"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("REQ-3"));
}

#[test]
fn malformed_ordinal_is_a_usage_error() {
    let dir = checkout_project();
    generate(&dir);
    taskforge(&dir)
        .args(["subtask", "done", "checkout", "2.x"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("2.x"));
}

#[test]
fn status_without_batch_fails() {
    let dir = checkout_project();
    taskforge(&dir)
        .args(["status", "checkout"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no batch generated yet"));
}

// ---------------------------------------------------------------------------
// taskforge config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_reports_errors() {
    let dir = checkout_project();
    taskforge(&dir).args(["config", "validate"]).assert().success();

    std::fs::write(
        dir.path().join(".taskforge/config.yaml"),
        "outputs:\n  max_lines_per_chunk: 0\n",
    )
    .unwrap();
    taskforge(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("max_lines_per_chunk"));
}

#[test]
fn config_show_json() {
    let dir = checkout_project();
    taskforge(&dir)
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_lines_per_chunk\": 400"));
}

#[test]
fn set_backend_saves_the_command_backend() {
    let dir = checkout_project();
    taskforge(&dir)
        .args([
            "config",
            "set-backend",
            "extractor",
            "--type",
            "command",
            "--program",
            "my-extractor",
            "--arg",
            "fast",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("command (my-extractor fast)"));

    let saved = read(&dir, ".taskforge/config.yaml");
    assert!(saved.contains("type: command"), "{saved}");
    assert!(saved.contains("program: my-extractor"), "{saved}");

    taskforge(&dir)
        .args(["config", "set-backend", "extractor", "--type", "rules", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"stage\": \"extractor\""))
        .stdout(predicate::str::contains("\"type\": \"rules\""));
}

#[test]
fn set_backend_refuses_invalid_backends() {
    let dir = checkout_project();
    let before = read(&dir, ".taskforge/config.yaml");

    taskforge(&dir)
        .args(["config", "set-backend", "grouper", "--type", "plan", "--path", "plan.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot use a plan backend"));
    taskforge(&dir)
        .args(["config", "set-backend", "extractor", "--type", "command"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--program is required"));
    taskforge(&dir)
        .args(["config", "set-backend", "extractor", "--type", "shell"])
        .assert()
        .code(1);

    assert_eq!(before, read(&dir, ".taskforge/config.yaml"));
}
