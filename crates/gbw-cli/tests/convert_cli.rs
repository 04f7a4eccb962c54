use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gbw-cli-test-{}-{nanos}-{name}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("create test dir");
        Self { dir }
    }

    fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    fn home(&self) -> PathBuf {
        let home = self.path("home");
        fs::create_dir_all(&home).expect("create scratch home");
        home
    }

    fn write_csv(&self, contents: &str) -> PathBuf {
        let path = self.path("passwords.csv");
        fs::write(&path, contents).expect("write input csv");
        path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Runs with a cleared environment and `HOME` inside the workspace, so any
/// per-user file the binary touched would show up there.
fn run_gbw(workspace: &Workspace, input: &Path, output: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gbw"))
        .arg(input)
        .arg(output)
        .args(extra)
        .env_clear()
        .env("HOME", workspace.home())
        .output()
        .expect("run gbw")
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            found.extend(files_under(&path));
        } else {
            found.push(path);
        }
    }
    found
}

fn read_json(path: &Path) -> Value {
    let raw = fs::read(path).expect("read output");
    serde_json::from_slice(&raw).expect("output is JSON")
}

#[test]
fn merges_urls_for_matching_credentials() {
    let workspace = Workspace::new("merge");
    let input = workspace.write_csv(
        "name,url,username,password,note\n\
         Google,https://a.com,u1,p1,\n\
         Google,https://b.com,u1,p1,\n",
    );
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert!(result.status.success(), "stderr: {}", String::from_utf8_lossy(&result.stderr));

    let document = read_json(&output);
    assert_eq!(document["encrypted"], false);
    assert_eq!(document["folders"], serde_json::json!([]));
    let items = document["items"].as_array().expect("items array");
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item["type"], 1);
    assert_eq!(item["name"], "Google");
    assert_eq!(item["notes"], Value::Null);
    assert_eq!(item["favorite"], false);
    assert_eq!(
        item["login"]["uris"],
        serde_json::json!([
            { "uri": "https://a.com", "match": null },
            { "uri": "https://b.com", "match": null }
        ])
    );
    assert_eq!(item["login"]["username"], "u1");
    assert_eq!(item["login"]["password"], "p1");
    assert_eq!(item["login"]["totp"], Value::Null);
    assert_eq!(item["fields"], serde_json::json!([]));

    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("Processed 1 unique login items."));
}

#[test]
fn conflicting_credentials_warn_and_annotate_notes() {
    let workspace = Workspace::new("conflict");
    let input = workspace.write_csv(
        "name,url,username,password\n\
         Amazon,https://a.com,u1,p1\n\
         Amazon,https://b.com,u2,p2\n",
    );
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert!(result.status.success());

    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("[WARNING]"));
    assert!(stderr.contains("Amazon"));
    assert!(stderr.contains("https://b.com"));
    assert!(!stderr.contains("p2"));

    let document = read_json(&output);
    let item = &document["items"][0];
    assert_eq!(item["login"]["username"], "u1");
    assert_eq!(item["login"]["password"], "p1");
    assert_eq!(item["login"]["uris"].as_array().map(Vec::len), Some(2));
    let notes = item["notes"].as_str().expect("notes should be a string");
    assert!(notes.starts_with("--- AUTO-MERGE WARNING ---"));
    assert!(notes.contains("URL: https://b.com"));
    assert!(notes.contains("Username: u2"));
    assert!(!notes.contains("p2"));
}

#[test]
fn rows_without_username_are_skipped() {
    let workspace = Workspace::new("skip");
    let input = workspace.write_csv(
        "name,url,username,password\n\
         Lonely,https://lonely.com,,p1\n\
         Kept,https://kept.com,me,pw\n",
    );
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert!(result.status.success());

    let document = read_json(&output);
    let items = document["items"].as_array().expect("items array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Kept");
}

#[test]
fn missing_password_header_aborts_without_output() {
    let workspace = Workspace::new("schema");
    let input = workspace.write_csv("name,url,username\nSite,https://a.com,u1\n");
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert_eq!(result.status.code(), Some(1));
    assert!(!output.exists());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("does not have the correct Google Passwords format"));
    assert!(stderr.contains("password"));
}

#[test]
fn schema_failure_leaves_existing_output_untouched() {
    let workspace = Workspace::new("untouched");
    let input = workspace.write_csv("title,url\nSite,https://a.com\n");
    let output = workspace.path("bitwarden.json");
    fs::write(&output, b"previous").expect("seed output");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert_eq!(result.status.code(), Some(1));
    assert_eq!(fs::read(&output).expect("read output"), b"previous");
}

#[test]
fn missing_input_file_fails() {
    let workspace = Workspace::new("missing-input");
    let input = workspace.path("nope.csv");
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert_eq!(result.status.code(), Some(1));
    assert!(!output.exists());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("was not found"));
}

#[test]
fn unwritable_output_fails() {
    let workspace = Workspace::new("unwritable");
    let input = workspace.write_csv("name,url,username,password\nSite,https://a.com,u1,p1\n");
    let output = workspace.path("occupied");
    fs::create_dir_all(output.join("child")).expect("occupy output path with a directory");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Could not write the output file"));
}

#[test]
fn repeated_runs_produce_identical_bytes() {
    let workspace = Workspace::new("idempotent");
    let input = workspace.write_csv(
        "name,url,username,password,note\n\
         Amazon,https://a.com,u1,p1,first\n\
         Google,https://g.com,me,pw,\n\
         Amazon,https://b.com,u2,p2,\n\
         Amazon,https://a.com,u1,p1,\n",
    );
    let first = workspace.path("first.json");
    let second = workspace.path("second.json");

    assert!(run_gbw(&workspace, &input, &first, &[]).status.success());
    assert!(run_gbw(&workspace, &input, &second, &[]).status.success());
    assert_eq!(
        fs::read(&first).expect("read first"),
        fs::read(&second).expect("read second")
    );
}

#[test]
fn json_mode_prints_envelope() {
    let workspace = Workspace::new("json");
    let input = workspace.write_csv(
        "name,url,username,password\n\
         Amazon,https://a.com,u1,p1\n\
         Amazon,https://b.com,u2,secret-two\n",
    );
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &["--json"]);
    assert!(result.status.success());

    let stdout = String::from_utf8_lossy(&result.stdout);
    let envelope: Value = serde_json::from_str(stdout.trim()).expect("envelope is JSON");
    assert_eq!(envelope["schema_version"], 1);
    assert_eq!(envelope["ok"], true);
    assert_eq!(envelope["result"]["items"], 1);
    assert_eq!(envelope["result"]["accepted_rows"], 2);
    assert_eq!(envelope["result"]["conflict_policy"], "merge-into-notes");
    assert_eq!(
        envelope["result"]["conflicts"],
        serde_json::json!([{ "name": "Amazon", "url": "https://b.com" }])
    );
    assert!(!stdout.contains("secret-two"));
    assert!(!stdout.contains("u2"));
}

#[test]
fn json_mode_reports_errors() {
    let workspace = Workspace::new("json-error");
    let input = workspace.write_csv("name,url\n");
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &["--json"]);
    assert_eq!(result.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&result.stdout);
    let envelope: Value = serde_json::from_str(stdout.trim()).expect("envelope is JSON");
    assert_eq!(envelope["ok"], false);
    assert_eq!(envelope["error"]["kind"], "schema_error");
    assert_eq!(envelope["error"]["code"], 1);
}

#[test]
fn last_wins_policy_from_flag_replaces_credentials() {
    let workspace = Workspace::new("last-wins");
    let input = workspace.write_csv(
        "name,url,username,password\n\
         Site,https://a.com,u1,p1\n\
         Site,https://b.com,u2,p2\n",
    );
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(
        &workspace,
        &input, &output,
        &["--conflict-policy", "last-wins"],
    );
    assert!(result.status.success());

    let document = read_json(&output);
    assert_eq!(document["items"][0]["login"]["username"], "u2");
    assert_eq!(document["items"][0]["login"]["password"], "p2");
}

#[test]
fn policy_can_come_from_config_file() {
    let workspace = Workspace::new("config-policy");
    let input = workspace.write_csv(
        "name,url,username,password\n\
         Site,https://a.com,u1,p1\n\
         Site,https://b.com,u2,p2\n",
    );
    let output = workspace.path("bitwarden.json");
    let config = workspace.path("config.toml");
    fs::write(
        &config,
        "[conversion]\nconflict_policy = \"first-wins\"\n\n[logging]\nlevel = \"off\"\n",
    )
    .expect("write config");

    let config_arg = config.to_string_lossy().into_owned();

    let result = run_gbw(&workspace, &input, &output, &["--config", &config_arg]);
    assert!(result.status.success());

    let document = read_json(&output);
    assert_eq!(document["items"][0]["notes"], Value::Null);
    assert_eq!(document["items"][0]["login"]["username"], "u1");
}

const CONFLICTING_CSV: &str = "name,url,username,password\n\
                               Amazon,https://a.com,u1,p1\n\
                               Amazon,https://b.com,u2,secret-two\n";

#[test]
fn plain_run_creates_no_files_beyond_the_output() {
    let workspace = Workspace::new("no-side-files");
    let input = workspace.write_csv(CONFLICTING_CSV);
    let output = workspace.path("bitwarden.json");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert!(result.status.success());
    assert!(output.exists());

    let created = files_under(&workspace.home());
    assert!(created.is_empty(), "unexpected files: {created:?}");
}

#[test]
fn plain_run_ignores_config_in_home() {
    let workspace = Workspace::new("home-config");
    let input = workspace.write_csv(CONFLICTING_CSV);
    let output = workspace.path("bitwarden.json");
    let config_dir = workspace.home().join(".config").join("gbw");
    fs::create_dir_all(&config_dir).expect("create config dir");
    fs::write(config_dir.join("config.toml"), "not = [valid").expect("write broken config");

    let result = run_gbw(&workspace, &input, &output, &[]);
    assert!(result.status.success(), "stderr: {}", String::from_utf8_lossy(&result.stderr));
    assert_eq!(read_json(&output)["items"][0]["login"]["username"], "u1");
}

#[test]
fn logging_is_enabled_by_config_and_keeps_credentials_out() {
    let workspace = Workspace::new("audit-log");
    let input = workspace.write_csv(CONFLICTING_CSV);
    let output = workspace.path("bitwarden.json");
    let log = workspace.path("logs").join("gbw.jsonl");
    let config = workspace.path("config.toml");
    fs::write(
        &config,
        format!(
            "[logging]\nlevel = \"info\"\nfile = {:?}\n",
            log.to_string_lossy()
        ),
    )
    .expect("write config");
    let config_arg = config.to_string_lossy().into_owned();

    let result = run_gbw(&workspace, &input, &output, &["--config", &config_arg]);
    assert!(result.status.success());

    let contents = fs::read_to_string(&log).expect("log file should exist");
    let events: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("log line is JSON"))
        .collect();
    assert!(events.iter().any(|event| event["msg"] == "credential_conflict"));
    assert!(events.iter().any(|event| event["msg"] == "convert_finished"));
    assert!(!contents.contains("secret-two"));
    assert!(!contents.contains("p1"));
    assert!(files_under(&workspace.home()).is_empty());
}
