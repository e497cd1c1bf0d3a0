use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct TestBodies {
    temp: TempDir,
}

impl TestBodies {
    fn new() -> Self {
        Self {
            temp: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn write<P: AsRef<Path>>(&self, name: P, content: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        fs::write(&path, content).expect("Failed to write body");
        path
    }

    fn dir(&self) -> &Path {
        self.temp.path()
    }
}

fn run_cli(home: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_respdiff_cli");
    Command::new(exe)
        .args(args)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("APPDATA", home.join("config"))
        .env("LOCALAPPDATA", home.join("data"))
        .env("HOME", home)
        .env("RUST_LOG", "warn")
        .env_remove("RESPDIFF_DATA_DIR")
        .output()
        .expect("Failed to execute respdiff_cli")
}

fn run_diff_json(bodies: &TestBodies, left: &Path, right: &Path, extra: &[&str]) -> (i32, Value) {
    let mut args = vec!["diff", left.to_str().unwrap(), right.to_str().unwrap(), "--json"];
    args.extend_from_slice(extra);
    let output = run_cli(bodies.dir(), &args);

    let code = output.status.code().unwrap_or(-1);
    assert!(
        code == 0 || code == 2,
        "command failed: {} (expected 0 or 2)\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout not utf-8");
    (code, serde_json::from_str(&stdout).expect("invalid json output"))
}

#[test]
fn test_identical_json_with_reordered_keys() {
    let bodies = TestBodies::new();
    let left = bodies.write("left.json", r#"{"a":1,"b":2}"#);
    let right = bodies.write("right.json", r#"{"b":2,"a":1}"#);

    let (code, report) = run_diff_json(&bodies, &left, &right, &[]);

    assert_eq!(code, 0);
    assert_eq!(report["metrics"]["diff_count"], 0);
    assert_eq!(report["metrics"]["formats_matched"], true);
    assert_eq!(report["left_content_type"], "json");
}

#[test]
fn test_text_line_change() {
    let bodies = TestBodies::new();
    let left = bodies.write("left.txt", "line1\nline2");
    let right = bodies.write("right.txt", "line1\nline3");

    let (code, report) = run_diff_json(&bodies, &left, &right, &[]);

    assert_eq!(code, 2);
    assert_eq!(report["metrics"]["diff_count"], 1);
    assert_eq!(report["stats"]["replace"], 1);
    let unified: Vec<&str> = report["unified"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l.as_str().unwrap())
        .collect();
    assert_eq!(unified, vec![" line1", "-line2", "+line3"]);

    let split = report["split"].as_array().unwrap();
    assert_eq!(split.len(), 2);
    assert_eq!(split[1]["op"], "replace");
    assert_eq!(split[1]["left"], "line2");
    assert_eq!(split[1]["right"], "line3");
}

#[test]
fn test_json_against_xml() {
    let bodies = TestBodies::new();
    let left = bodies.write("left.json", r#"{"name":"ann"}"#);
    let right = bodies.write("right.xml", "<name>ann</name>");

    let (code, report) = run_diff_json(&bodies, &left, &right, &[]);

    assert_eq!(code, 2);
    assert_eq!(report["metrics"]["formats_matched"], false);
    assert_eq!(report["left_content_type"], "json");
    assert_eq!(report["right_content_type"], "xml");
}

#[test]
fn test_explicit_content_type() {
    let bodies = TestBodies::new();
    let left = bodies.write("left", "<a>1</a>");
    let right = bodies.write("right", "<a>1</a>");

    let (_, report) = run_diff_json(
        &bodies,
        &left,
        &right,
        &["--left-content-type", "text/plain", "--right-content-type", "text/plain"],
    );
    // Sniffing wins over a plain content type
    assert_eq!(report["left_content_type"], "xml");

    let (_, report) = run_diff_json(
        &bodies,
        &left,
        &right,
        &["--left-content-type", "application/xml", "--right-content-type", "text/xml"],
    );
    assert_eq!(report["right_content_type"], "xml");
    assert_eq!(report["metrics"]["diff_count"], 0);
}

#[test]
fn test_empty_body_fails() {
    let bodies = TestBodies::new();
    let left = bodies.write("left.txt", "");
    let right = bodies.write("right.txt", "content");

    let output = run_cli(
        bodies.dir(),
        &["diff", left.to_str().unwrap(), right.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("empty_response"), "stderr: {stderr}");
}

#[test]
fn test_declared_json_that_does_not_parse_fails() {
    let bodies = TestBodies::new();
    let left = bodies.write("left", r#"{"a":1}"#);
    let right = bodies.write("right", r#"{"a":"#);

    let output = run_cli(
        bodies.dir(),
        &[
            "diff",
            left.to_str().unwrap(),
            right.to_str().unwrap(),
            "--right-content-type",
            "application/json",
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unsupported_format"));
}

#[test]
fn test_missing_file_fails() {
    let bodies = TestBodies::new();
    let right = bodies.write("right.txt", "content");
    let missing = bodies.dir().join("missing.txt");

    let output = run_cli(
        bodies.dir(),
        &["diff", missing.to_str().unwrap(), right.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_text_output_modes() {
    let bodies = TestBodies::new();
    let left = bodies.write("left.json", r#"{"user":{"age":30}}"#);
    let right = bodies.write("right.json", r#"{"user":{"age":31}}"#);
    let left = left.to_str().unwrap();
    let right = right.to_str().unwrap();

    let output = run_cli(bodies.dir(), &["diff", left, right, "--no-color"]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("-$.user.age: 30"));
    assert!(stdout.contains("+$.user.age: 31"));
    assert!(stdout.contains("Differences:     1"));
    assert!(!stdout.contains('\x1b'));

    let output = run_cli(bodies.dir(), &["diff", left, right, "--split", "--no-color"]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout
        .lines()
        .any(|line| line.starts_with("$.user.age: 30") && line.ends_with("$.user.age: 31")));
}

#[test]
fn test_history_starts_empty() {
    let bodies = TestBodies::new();
    let data_dir = bodies.dir().join("store");

    let output = run_cli(
        bodies.dir(),
        &["--data-dir", data_dir.to_str().unwrap(), "history", "--json"],
    );
    assert_eq!(output.status.code(), Some(0));
    let history: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(history, Value::Array(Vec::new()));

    let output = run_cli(bodies.dir(), &["--data-dir", data_dir.to_str().unwrap(), "latest"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_config_writes_defaults_once() {
    let bodies = TestBodies::new();

    let output = run_cli(bodies.dir(), &["config", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let first: Value = serde_json::from_slice(&output.stdout).unwrap();
    let path = PathBuf::from(first["path"].as_str().unwrap());
    assert_eq!(first["created"], true);
    assert!(path.starts_with(bodies.dir()));
    assert!(path.exists());
    assert_eq!(first["config"]["engine"]["diff_algorithm"], "myers");

    let output = run_cli(bodies.dir(), &["config", "--json"]);
    let second: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(second["created"], false);
    assert_eq!(second["path"], first["path"]);

    let output = run_cli(bodies.dir(), &["config"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[engine]"));
    assert!(stdout.contains("cache_capacity = 256"));
}
