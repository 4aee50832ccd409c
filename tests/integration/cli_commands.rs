#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use contentcache::cli::dump::{KitDump, SyntheticTree};
use contentcache::content::{ContentData, ContentKit};
use contentcache::types::ContentId;
use serde_json::Value;
use tempfile::TempDir;

fn generated_dump(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.json"));
    cargo_bin_cmd!("cli")
        .args(["generate", "--roots", "2", "--fanout", "3", "--depth", "3", "--out"])
        .arg(&path)
        .assert()
        .success();
    (dir, path)
}

fn json_stdout(args: &[&str], path: &Path) -> Value {
    let output = cargo_bin_cmd!("cli")
        .args(["--format", "json"])
        .args(args)
        .arg(path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn generate_writes_a_loadable_dump() {
    let (_dir, path) = generated_dump("generate");
    let dump = KitDump::load(&path).expect("dump parses");
    assert_eq!(dump.kits.len(), 2 + 6 + 18);
    assert_eq!(dump.content_types.len(), 2);
}

#[test]
fn load_reports_applied_kits() {
    let (_dir, path) = generated_dump("load");
    let json = json_stdout(&["load"], &path);
    assert_eq!(json["kits"]["applied"], 26);
    assert_eq!(json["kits"]["skipped"], 0);
    assert_eq!(json["content_types"]["refreshed_types"], 2);
    assert_eq!(json["stats"]["node_keys"], 26);
    assert_eq!(json["stats"]["root_keys"], 2);
}

#[test]
fn load_prints_text_summary() {
    let (_dir, path) = generated_dump("load-text");
    let output = cargo_bin_cmd!("cli")
        .arg("load")
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("Kits: applied=26 skipped=0"), "{text}");
    assert!(text.contains("Store (content)"), "{text}");
}

#[test]
fn tree_emits_nested_json() {
    let (_dir, path) = generated_dump("tree");
    let json = json_stdout(&["tree", "--max-depth", "2"], &path);
    let roots = json.as_array().expect("array of roots");
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0]["content_type_alias"], "folder");
    let children = roots[0]["children"].as_array().expect("children");
    assert_eq!(children.len(), 3);
    assert!(children[0].get("children").is_none(), "depth limit applies");
}

#[test]
fn tree_prints_outline() {
    let (_dir, path) = generated_dump("tree-text");
    let output = cargo_bin_cmd!("cli")
        .arg("tree")
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.starts_with("- [1] Folder 1 (folder)"), "{text}");
    assert_eq!(text.lines().count(), 26);
}

#[test]
fn stats_runs_a_collection_pass() {
    let (_dir, path) = generated_dump("stats");
    let json = json_stdout(&["stats"], &path);
    assert!(json["generations"]["live"].as_u64().unwrap_or(0) >= 1);
    assert_eq!(json["generations"]["floor"], json["generations"]["live"]);
    assert!(json["collection_passes"].as_u64().unwrap_or(0) >= 1);
    assert!(json["last_collection"]["elapsed"].is_number());
}

#[test]
fn orphan_kits_are_reported_as_skipped() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("orphans.json");
    let mut dump = KitDump::synthetic(SyntheticTree {
        roots: 1,
        fanout: 1,
        depth: 1,
    })
    .expect("valid shape");
    let mut orphan = ContentKit::new(ContentId(50), dump.kits[0].content_type_id)
        .with_published(ContentData::new("orphan", 1, true));
    orphan.parent_id = Some(ContentId(49));
    orphan.level = 2;
    dump.kits.push(orphan);
    dump.save(&path).expect("save dump");

    let json = json_stdout(&["load"], &path);
    assert_eq!(json["kits"]["applied"], 1);
    assert_eq!(json["kits"]["skipped"], 1);
    assert_eq!(json["kits"]["missing_parent"], 1);
}

#[test]
fn churn_reports_no_inconsistency() {
    let output = cargo_bin_cmd!("cli")
        .args([
            "--format", "json", "churn", "--roots", "2", "--fanout", "2", "--depth", "3", "--rounds",
            "60", "--readers", "2", "--seed", "9",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["inconsistent_snapshots"], 0);
    assert!(json["writes"].as_u64().unwrap_or(0) >= 60);
    assert_eq!(json["node_keys"], 14);
}

#[test]
fn invalid_config_fails() {
    let (dir, path) = generated_dump("bad-config");
    let config = dir.path().join("store.toml");
    fs::write(&config, "[collect]\nworkers = 2\n").expect("write config");
    cargo_bin_cmd!("cli")
        .arg("--config")
        .arg(&config)
        .arg("load")
        .arg(&path)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn config_file_is_honoured() {
    let (dir, path) = generated_dump("config");
    let config = dir.path().join("store.toml");
    fs::write(
        &config,
        "collector_thread_name = \"cli-collect\"\n[collect]\nauto = false\n",
    )
    .expect("write config");
    let output = cargo_bin_cmd!("cli")
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "load"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["stats"]["collection_passes"], 0);
}

#[test]
fn missing_dump_fails() {
    let dir = TempDir::new().expect("tempdir");
    cargo_bin_cmd!("cli")
        .arg("load")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .code(1);
}
