// CLI integration tests for the non-interactive commands.
use std::process::{Command, Output};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_sqlitemap");
    Command::new(exe)
}

fn run(file: &str, args: &[&str]) -> Output {
    cmd()
        .args(["--file", file])
        .args(args)
        .output()
        .expect("run sqlitemap")
}

fn stdout_json(output: &Output) -> Value {
    let text = std::str::from_utf8(&output.stdout).expect("utf8");
    serde_json::from_str(text.trim()).expect("valid json")
}

fn stderr_json(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text.lines().last().expect("error line");
    serde_json::from_str(line).expect("valid json")
}

#[test]
fn put_get_list_size_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("cli.sqlite");
    let file = file.to_str().expect("utf8 path");

    for (key, value) in [("alice", "1"), ("bob", "2"), ("carol", "3")] {
        let put = run(file, &["put", key, value]);
        assert!(put.status.success());
        assert_eq!(stdout_json(&put)["key"], key);
    }

    let get = run(file, &["get", "bob"]);
    assert!(get.status.success());
    assert_eq!(stdout_json(&get)["value"], "2");

    let list = run(file, &["list"]);
    let entries = stdout_json(&list);
    let keys = entries
        .as_array()
        .expect("array")
        .iter()
        .map(|entry| entry["key"].as_str().expect("key").to_string())
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["alice", "bob", "carol"]);

    let reversed = stdout_json(&run(file, &["list", "--reverse", "--values"]));
    assert_eq!(reversed, serde_json::json!(["3", "2", "1"]));

    let size = stdout_json(&run(file, &["size"]));
    assert_eq!(size["size"], 3);
    assert_eq!(size["table"], "unnamed");
}

#[test]
fn missing_key_reports_not_found_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("cli.sqlite");
    let file = file.to_str().expect("utf8 path");

    let get = run(file, &["get", "nobody"]);
    assert_eq!(get.status.code(), Some(3));
    let err = stderr_json(&get);
    assert_eq!(err["error"]["kind"], "NotFound");
    assert_eq!(err["error"]["key"], "'nobody'");
    assert!(err["error"]["hint"].as_str().expect("hint").contains("list"));
}

#[test]
fn read_only_mode_refuses_writes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("ro.sqlite");
    let file = file.to_str().expect("utf8 path");
    assert!(run(file, &["put", "a", "1"]).status.success());

    let put = run(file, &["--mode", "r", "put", "b", "2"]);
    assert_eq!(put.status.code(), Some(4));
    assert_eq!(stderr_json(&put)["error"]["kind"], "State");

    let get = run(file, &["--mode", "r", "get", "a"]);
    assert!(get.status.success());
    assert_eq!(stdout_json(&get)["value"], "1");
}

#[test]
fn tables_del_clear_and_delete_db() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("ops.sqlite");
    let file = path.to_str().expect("utf8 path");

    assert!(run(file, &["--table", "users", "put", "a", "1"]).status.success());
    assert!(run(file, &["--table", "users", "put", "b", "2"]).status.success());
    let tables = stdout_json(&run(file, &["tables"]));
    assert_eq!(tables["tables"], serde_json::json!(["users"]));

    let del = stdout_json(&run(file, &["--table", "users", "del", "a"]));
    assert_eq!(del["removed"], 1);
    let del = stdout_json(&run(file, &["--table", "users", "del", "a"]));
    assert_eq!(del["removed"], 0);

    let clear = run(file, &["--table", "users", "clear"]);
    assert!(clear.status.success());
    let size = stdout_json(&run(file, &["--table", "users", "size"]));
    assert_eq!(size["size"], 0);

    let delete = run(file, &["--table", "users", "delete-db"]);
    assert!(delete.status.success());
    assert!(!path.exists());
}

#[test]
fn tables_on_missing_file_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("absent.sqlite");
    let tables = run(file.to_str().expect("utf8 path"), &["tables"]);
    assert_eq!(tables.status.code(), Some(3));
}

#[test]
fn bad_mode_is_a_usage_error() {
    let output = cmd()
        .args(["--mode", "x", "size"])
        .output()
        .expect("run sqlitemap");
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["error"]["kind"], "Usage");
}

#[test]
fn completion_generates_a_script() {
    let output = cmd()
        .args(["completion", "bash"])
        .output()
        .expect("run sqlitemap");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("sqlitemap"));
}
