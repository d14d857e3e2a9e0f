use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("repopulse");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }

    fn write_payload(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.home.join(name);
        fs::write(&path, contents).expect("failed to write payload");
        path
    }
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../repopulse-core/tests/fixtures/feed")
        .join(name)
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("repopulse"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute repopulse: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "repopulse {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn status_reports_defaults_without_config_file() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("repopulse Configuration"));
    assert!(stdout.contains("not found, using defaults"));
    assert!(stdout.contains("Feed URL:        <not set>"));
    assert!(stdout.contains("Smoothing:       10000ms window"));
}

#[test]
fn status_reads_config_file() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[feed]
url = "ws://localhost:5001/"
category_key = "mostCommonExtension"

[ranking]
display_limit = 12
"#,
    );

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Feed URL:        ws://localhost:5001/"));
    assert!(stdout.contains("Category Key:    mostCommonExtension"));
    assert!(stdout.contains("Display Limit:   12"));
    assert!(stdout.contains("Status: Ready to watch"));
}

#[test]
fn replay_instant_prints_ranking_and_box_stats() {
    let env = CliTestEnv::new();
    let languages = fixture_path("language_stream.json");
    let languages = languages.to_str().expect("fixture path is not UTF-8");

    let args = ["replay", languages, "--instant"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Ranking (4 of 4 categories)"), "got:\n{stdout}");
    let rust = stdout.find("Rust").expect("Rust missing from ranking");
    let go = stdout.find("Go").expect("Go missing from ranking");
    assert!(rust < go, "Rust should rank above Go:\n{stdout}");

    let prs = fixture_path("pr_events.json");
    let prs = prs.to_str().expect("fixture path is not UTF-8");
    let args = ["replay", prs, "--instant"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Time to close"));
    assert!(stdout.contains("3.0s"), "median of Rust should be 3.0s:\n{stdout}");
    assert!(stdout.contains("(1 open or invalid items skipped)"));
}

#[test]
fn replay_smoothed_json_matches_fixture() {
    let env = CliTestEnv::new();
    let payload = env.write_payload(
        "burst.json",
        r#"[{"language": "Rust"}, {"language": "Go"}, {"language": "Rust"}]"#,
    );
    let payload = payload.to_str().expect("payload path is not UTF-8");

    let args = ["replay", payload, "--window-ms", "60", "--limit", "1", "--json"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let snapshot: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let entries = snapshot["ranking"]["entries"]
        .as_array()
        .expect("ranking entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["category"], "Rust");
    assert_eq!(entries[0]["count"], 2);
    assert_eq!(snapshot["ranking"]["total_categories"], 2);
    assert_eq!(snapshot["stats"]["ranked"], 3);
}

#[test]
fn replay_rejects_malformed_payload() {
    let env = CliTestEnv::new();
    let payload = env.write_payload("bad.json", r#"[{"language": "Rust"}, 42]"#);
    let payload = payload.to_str().expect("payload path is not UTF-8");

    let output = run_bin(&env, &["replay", payload, "--instant"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse"), "got:\n{stderr}");
}

#[test]
fn watch_without_url_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["watch"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no feed URL configured"), "got:\n{stderr}");
}
