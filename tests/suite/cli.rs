//! The `provenance` binary, driven end to end through a temporary data dir.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::{TempDir, tempdir};

const CONFIG: &str = r#"
[[axioms]]
id = "A1"
statement = "Spacetime is a smooth 4-manifold."
"#;

const SCRIPT: &str = r#"{
    "output": "mass_ratio",
    "steps": [
        { "label": "scaled", "expression": "rescale by calibration offset",
          "axioms": ["A1"], "inputs": ["axiom:A1"],
          "empirical_inputs": { "calibration_offset": 1.5 } }
    ]
}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
        fs::write(dir.path().join("script.json"), SCRIPT).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }

    fn run(&self, args: &[&str]) -> Output {
        let config = self.path("config.toml");
        let data = self.path("data");
        Command::new(env!("CARGO_BIN_EXE_provenance"))
            .args(["--config", config.as_str(), "--data-dir", data.as_str()])
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn exception_declared_from_the_cli_clears_the_reaudit() {
    let ws = Workspace::new();
    let script = ws.path("script.json");

    let first = ws.run(&["audit", script.as_str()]);
    assert_eq!(first.status.code(), Some(2), "{}", stdout(&first));
    assert!(stdout(&first).starts_with("mass_ratio (N2): FALSIFIED"), "{}", stdout(&first));

    let except = ws.run(&[
        "except",
        "N2",
        "calibration_offset",
        "--actor",
        "auditor",
        "--reason",
        "unit conversion only",
    ]);
    assert!(except.status.success(), "{}", String::from_utf8_lossy(&except.stderr));

    let json = ws.path("report.json");
    let again = ws.run(&["audit", script.as_str(), "--node", "N2", "--json", json.as_str()]);
    assert_eq!(again.status.code(), Some(0), "{}", stdout(&again));
    assert!(stdout(&again).starts_with("mass_ratio (N2): VALID"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(Path::new(&json)).unwrap()).unwrap();
    assert_eq!(report["status"]["status"], "valid");
    let findings = report["findings"].as_array().unwrap();
    assert!(
        findings
            .iter()
            .any(|f| f["layer"] == "structural" && f["severity"] == "info")
    );
}

#[test]
fn reaudit_rejects_a_node_from_another_derivation() {
    let ws = Workspace::new();
    let script = ws.path("script.json");
    ws.run(&["audit", script.as_str()]);

    let err = ws.run(&["audit", script.as_str(), "--node", "N1"]);
    assert_eq!(err.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&err.stderr).contains("derives 'N1'"));
}

#[test]
fn bad_usage_is_an_error_not_a_flag() {
    let ws = Workspace::new();
    let output = ws.run(&["review", "N2", "approved", "--actor", "auditor"]);
    assert_eq!(output.status.code(), Some(1));

    let help = ws.run(&["--help"]);
    assert!(help.status.success());
    assert!(stdout(&help).contains("verify-logs"));
}

#[test]
fn verify_logs_reports_every_log() {
    let ws = Workspace::new();
    let script = ws.path("script.json");
    ws.run(&["audit", script.as_str()]);

    let output = ws.run(&["verify-logs"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("nodes.jsonl: 3 records intact"), "{text}");
    assert!(text.contains("findings.jsonl: 1 records intact"), "{text}");
    assert!(text.contains("seals.jsonl: 0 records intact"), "{text}");
}
