//! Configuration integration tests.
//!
//! Drive the compiled binary from temporary project directories and read
//! the effective analysis settings back through `info --json`. Settings
//! that only matter during a run are checked through `analyze`.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const PROVIDER_ENV: &str = "SURVEY_LENS_EMBEDDING__PROVIDER";

/// The binary with the offline embedder selected through the environment.
#[allow(deprecated)]
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.env(
        "SURVEY_LENS_LOG_DIR",
        std::env::temp_dir().join("survey-lens-config-tests"),
    );
    cmd.env(PROVIDER_ENV, "hashing");
    cmd
}

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

/// The `config` object of `info --json` run from `dir`.
fn effective(mut cmd: Command, dir: &Path) -> Value {
    let output = cmd
        .args(["-C", dir.to_str().unwrap(), "info", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "info failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    json["config"].clone()
}

fn settings(dir: &Path) -> Value {
    effective(cmd(), dir)
}

fn reported_file(config: &Value) -> &str {
    config["config_file"].as_str().unwrap_or("")
}

const SURVEY_CSV: &str = "Id,Comentários\n1,Gosto da equipe\n2,Gosto da equipe\n";

// =============================================================================
// Defaults and discovery
// =============================================================================

#[test]
fn defaults_apply_without_a_project_file() {
    let tmp = TempDir::new().unwrap();
    let config = settings(tmp.path());

    assert!(config["config_file"].is_null());
    assert_eq!(config["eps"], 0.35);
    assert_eq!(config["min_samples"], 2);
    assert_eq!(config["sentiment_threshold"], 0.1);
    assert_eq!(config["n_neighbors"], 15);
    assert_eq!(config["source_markers"][0], "pesquisa de clima");
    assert_eq!(config["source_markers"][1], "base");
}

#[test]
fn each_project_file_name_is_discovered() {
    let cases = [
        (".survey-lens.toml", "[clustering]\neps = 0.3\n"),
        ("survey-lens.toml", "[clustering]\neps = 0.3\n"),
        (".survey-lens.yaml", "clustering:\n  eps: 0.3\n"),
        (".survey-lens.yml", "clustering:\n  eps: 0.3\n"),
        (".survey-lens.json", r#"{"clustering": {"eps": 0.3}}"#),
        ("lens.yaml", "clustering:\n  eps: 0.3\n"),
    ];
    for (name, body) in cases {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), name, body);

        let config = settings(tmp.path());
        assert_eq!(config["eps"], 0.3, "{name} not applied");
        assert!(reported_file(&config).ends_with(name), "{name} not reported");
    }
}

#[test]
fn project_file_is_found_from_a_subdirectory() {
    let tmp = TempDir::new().unwrap();
    let exports = tmp.path().join("exports").join("2025");
    fs::create_dir_all(&exports).unwrap();
    write(tmp.path(), ".survey-lens.toml", "[source]\nmarkers = [\"dataset\"]\n");

    let config = settings(&exports);
    assert_eq!(config["source_markers"], serde_json::json!(["dataset"]));
}

#[test]
fn search_stops_at_the_repository_root() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("repo");
    let data = repo.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir(repo.join(".git")).unwrap();
    write(tmp.path(), ".survey-lens.toml", "[clustering]\nmin_samples = 5\n");

    let outside = settings(&data);
    assert!(outside["config_file"].is_null());
    assert_eq!(outside["min_samples"], 2);

    write(&repo, ".survey-lens.toml", "[clustering]\nmin_samples = 4\n");
    let inside = settings(&data);
    assert_eq!(inside["min_samples"], 4);
}

// =============================================================================
// Precedence
// =============================================================================

#[test]
fn plain_name_beats_dotfile() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), ".survey-lens.toml", "[sentiment]\nthreshold = 0.2\n");
    write(tmp.path(), "survey-lens.toml", "[sentiment]\nthreshold = 0.3\n");

    assert_eq!(settings(tmp.path())["sentiment_threshold"], 0.3);
}

#[test]
fn nearest_directory_wins() {
    let tmp = TempDir::new().unwrap();
    let survey = tmp.path().join("clima");
    fs::create_dir_all(&survey).unwrap();
    write(tmp.path(), ".survey-lens.toml", "[clustering]\neps = 0.6\n");
    write(&survey, ".survey-lens.toml", "[clustering]\neps = 0.35\n");

    assert_eq!(settings(&survey)["eps"], 0.35);
}

#[test]
fn yaml_merges_over_toml_in_one_directory() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        ".survey-lens.toml",
        "[clustering]\neps = 0.5\nmin_samples = 3\n",
    );
    write(tmp.path(), ".survey-lens.yaml", "clustering:\n  min_samples: 6\n");

    let config = settings(tmp.path());
    assert_eq!(config["min_samples"], 6);
    assert_eq!(config["eps"], 0.5);
}

#[test]
fn explicit_file_beats_discovered_file() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), ".survey-lens.toml", "[sentiment]\nthreshold = 0.2\n");
    let explicit = tmp.path().join("rh.toml");
    fs::write(&explicit, "[sentiment]\nthreshold = 0.05\n").unwrap();

    let mut command = cmd();
    command.args(["--config", explicit.to_str().unwrap()]);
    let config = effective(command, tmp.path());
    assert_eq!(config["sentiment_threshold"], 0.05);
    assert!(reported_file(&config).ends_with("rh.toml"));
}

#[test]
fn environment_beats_files() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        ".survey-lens.toml",
        "[clustering]\neps = 0.25\n\n[sentiment]\nthreshold = 0.2\n",
    );

    let mut command = cmd();
    command
        .env("SURVEY_LENS_CLUSTERING__EPS", "0.5")
        .env("SURVEY_LENS_SENTIMENT__THRESHOLD", "0.15");
    let config = effective(command, tmp.path());
    assert_eq!(config["eps"], 0.5);
    assert_eq!(config["sentiment_threshold"], 0.15);
}

#[test]
fn flags_beat_an_invalid_file_value() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), ".survey-lens.toml", "[clustering]\neps = 5.0\n");
    write(tmp.path(), "Base_RH_2025.csv", SURVEY_CSV);

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "analyze", "Base_RH_2025.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("clustering.eps"));

    cmd()
        .args([
            "-C",
            tmp.path().to_str().unwrap(),
            "analyze",
            "Base_RH_2025.csv",
            "--eps",
            "0.4",
        ])
        .assert()
        .success();
}

// =============================================================================
// Embedding section
// =============================================================================

#[test]
fn embedding_provider_comes_from_the_file() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        ".survey-lens.toml",
        "[embedding]\nprovider = \"word-vectors\"\nvectors = \"cc.pt.300.vec\"\n",
    );

    let mut command = cmd();
    command.env_remove(PROVIDER_ENV);
    let config = effective(command, tmp.path());
    assert_eq!(config["embedding_provider"], "word-vectors");
    assert_eq!(config["vectors"], "cc.pt.300.vec");
}

#[test]
fn local_model_directory_is_reported() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        ".survey-lens.yaml",
        "embedding:\n  model_dir: models/minilm\n",
    );

    let mut command = cmd();
    command.env_remove(PROVIDER_ENV);
    let config = effective(command, tmp.path());
    assert_eq!(config["embedding_provider"], "sentence-transformer");
    assert_eq!(config["embedding_model"], "local:models/minilm");
}

#[test]
fn word_vectors_without_a_file_fail_analyze() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        ".survey-lens.toml",
        "[embedding]\nprovider = \"word-vectors\"\n",
    );
    write(tmp.path(), "Base_RH_2025.csv", SURVEY_CSV);

    cmd()
        .env_remove(PROVIDER_ENV)
        .args(["-C", tmp.path().to_str().unwrap(), "analyze", "Base_RH_2025.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("embedding.vectors"));
}

#[test]
fn markers_name_sources_in_reports() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), ".survey-lens.toml", "[source]\nmarkers = [\"clima\"]\n");
    write(tmp.path(), "Clima_Logistica_2025.csv", SURVEY_CSV);

    let output = cmd()
        .args([
            "-C",
            tmp.path().to_str().unwrap(),
            "analyze",
            "Clima_Logistica_2025.csv",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["records"][0]["comment"]["source_base"], "Logistica");
}

// =============================================================================
// Broken files
// =============================================================================

#[test]
fn unparsable_project_files_abort() {
    let cases = [
        (".survey-lens.toml", "[clustering\neps = "),
        (".survey-lens.yaml", "clustering:\n  eps: [0.3\n"),
        (".survey-lens.json", "{\"clustering\": }"),
    ];
    for (name, body) in cases {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), name, body);
        cmd()
            .args(["-C", tmp.path().to_str().unwrap(), "info"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("config"));
    }
}

#[test]
fn unrecognized_keys_are_tolerated() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        ".survey-lens.toml",
        "[clustering]\neps = 0.45\nmetric = \"cosine\"\n\n[dashboard]\nport = 8501\n",
    );

    assert_eq!(settings(tmp.path())["eps"], 0.45);
}
