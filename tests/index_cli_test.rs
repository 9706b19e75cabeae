use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::path::Path;
use tempfile::tempdir;

fn skywatch(home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("skywatch");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("SKYWATCH_HOME", home)
        .env("SKYWATCH_STORE_DIR", home.join("store"));
    cmd
}

fn listed_items(home: &Path, collection: &str) -> Vec<Value> {
    let out = skywatch(home)
        .args(["--json", "list", collection])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).expect("json report");
    report["data"]["items"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

#[test]
fn upsert_then_list_orders_newest_first() {
    let tmp = tempdir().expect("tempdir");
    for (title, date, url) in [
        ("Lights over Phoenix", "2025-03-01", "https://news.example/phoenix"),
        ("Radar contact", "2025-04-12", "https://news.example/radar"),
    ] {
        skywatch(tmp.path())
            .args(["upsert", "news", "--title", title, "--date", date, "--url", url])
            .assert()
            .success()
            .stdout(contains("created=true"));
    }

    let items = listed_items(tmp.path(), "news");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["title"], "Radar contact");
    assert_eq!(items[1]["title"], "Lights over Phoenix");
    assert!(tmp.path().join("store/indexes/news.json").is_file());
}

#[test]
fn repeated_upsert_replaces_instead_of_duplicating() {
    let tmp = tempdir().expect("tempdir");
    let url = "https://news.example/disc";
    skywatch(tmp.path())
        .args(["upsert", "news", "--title", "Disc seen", "--date", "2025-05-02", "--url", url])
        .assert()
        .success();
    skywatch(tmp.path())
        .args([
            "upsert", "news", "--title", "Disc seen (updated)", "--date", "2025-05-02", "--url",
            url,
        ])
        .assert()
        .success()
        .stdout(contains("created=false"));

    let items = listed_items(tmp.path(), "news");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Disc seen (updated)");
}

#[test]
fn remove_deletes_by_key_and_tolerates_missing_targets() {
    let tmp = tempdir().expect("tempdir");
    skywatch(tmp.path())
        .args(["upsert", "reports", "--title", "January", "--slug", "2025-01"])
        .assert()
        .success();

    skywatch(tmp.path())
        .args(["remove", "reports", "2025-01", "--by", "key"])
        .assert()
        .success()
        .stdout(contains("removed=1"));
    assert!(listed_items(tmp.path(), "reports").is_empty());

    skywatch(tmp.path())
        .args(["remove", "reports", "2025-01"])
        .assert()
        .success()
        .stdout(contains("removed=0"));
}

#[test]
fn invalid_date_is_refused_with_validation_code() {
    let tmp = tempdir().expect("tempdir");
    skywatch(tmp.path())
        .args([
            "upsert", "news", "--title", "Bad", "--date", "2025-02-30", "--url",
            "https://news.example/bad",
        ])
        .assert()
        .failure()
        .stdout(contains("E001_VALIDATION"));
    assert!(!tmp.path().join("store/indexes/news.json").exists());
}

#[test]
fn validate_reports_the_normalized_record_without_writing() {
    let tmp = tempdir().expect("tempdir");
    skywatch(tmp.path())
        .args([
            "validate", "news", "--title", "  Orbs  ", "--date", "2025-06-01", "--url",
            "https://news.example/orbs",
        ])
        .assert()
        .success()
        .stdout(contains("\"title\": \"Orbs\""));
    assert!(!tmp.path().join("store/indexes/news.json").exists());
}

#[test]
fn unknown_collection_fails_with_config_code() {
    let tmp = tempdir().expect("tempdir");
    skywatch(tmp.path())
        .args(["list", "podcasts"])
        .assert()
        .failure()
        .stdout(contains("E005_CONFIG_INVALID"));
}

#[test]
fn corrupt_index_is_not_treated_as_empty() {
    let tmp = tempdir().expect("tempdir");
    let index = tmp.path().join("store/indexes/news.json");
    std::fs::create_dir_all(index.parent().expect("parent")).expect("mkdir");
    std::fs::write(&index, "{ truncated").expect("write");

    skywatch(tmp.path())
        .args([
            "upsert", "news", "--title", "New", "--date", "2025-01-01", "--url",
            "https://news.example/new",
        ])
        .assert()
        .failure()
        .stdout(contains("E004_STATE_CORRUPT"));
    assert_eq!(
        std::fs::read_to_string(&index).expect("read"),
        "{ truncated"
    );
}
