use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use relay_core::{Catalog, EntityType, PlatformId, SchemaRegistry, SyncSettings};
use relay_sync::signature;

fn relay_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("relay"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RELAY_SYNC_TOKEN");
    cmd
}

fn init(home: &TempDir) {
    relay_cmd(home.path())
        .args(["init", "--host", "a.test", "--sync-token", "shared"])
        .assert()
        .success()
        .stdout(contains("config.yaml"));
}

fn add_platform(home: &TempDir, name: &str) {
    relay_cmd(home.path())
        .args([
            "platform",
            "add",
            name,
            "--domain",
            &format!("{name}.test"),
            "--token",
            &format!("tok-{name}"),
        ])
        .assert()
        .success();
}

#[test]
fn init_writes_config_schema_and_catalog() {
    let home = TempDir::new().expect("home");
    init(&home);

    let settings = SyncSettings::load_at(home.path()).expect("settings");
    assert_eq!(settings.host, "a.test");
    assert_eq!(settings.webhook_path, "/sync-webhook");

    let schema = SchemaRegistry::load_at(home.path()).expect("schema");
    assert!(schema.contains(&EntityType::from("User")));
    assert!(Catalog::load_at(home.path()).expect("catalog").platforms.is_empty());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let home = TempDir::new().expect("home");
    init(&home);

    relay_cmd(home.path())
        .args(["init", "--host", "b.test", "--sync-token", "other"])
        .assert()
        .failure()
        .stderr(contains("--force"));

    relay_cmd(home.path())
        .args(["init", "--host", "b.test", "--sync-token", "other", "--force"])
        .assert()
        .success();
    assert_eq!(
        SyncSettings::load_at(home.path()).expect("settings").host,
        "b.test"
    );
}

#[test]
fn platforms_and_syncs_round_trip_through_the_catalog() {
    let home = TempDir::new().expect("home");
    init(&home);
    add_platform(&home, "a");
    add_platform(&home, "b");

    relay_cmd(home.path())
        .args(["sync-config", "add", "--source", "1", "--entity", "User", "--target", "2"])
        .assert()
        .success()
        .stdout(contains("Added sync #1"));

    let catalog = Catalog::load_at(home.path()).expect("catalog");
    assert_eq!(catalog.platforms.len(), 2);
    assert_eq!(
        catalog.syncs_for(PlatformId(1), &EntityType::from("User")).len(),
        1
    );

    relay_cmd(home.path())
        .args(["platform", "list", "--json"])
        .assert()
        .success()
        .stdout(contains("\"domain\": \"b.test\"").and(contains("tok-b").not()));

    relay_cmd(home.path())
        .args(["sync-config", "list"])
        .assert()
        .success()
        .stdout(contains("User"));
}

#[test]
fn duplicate_domain_is_rejected() {
    let home = TempDir::new().expect("home");
    init(&home);
    add_platform(&home, "a");

    relay_cmd(home.path())
        .args(["platform", "add", "again", "--domain", "a.test", "--token", "fresh"])
        .assert()
        .failure()
        .stderr(contains("already registered"));
}

#[test]
fn sync_for_unknown_entity_type_is_rejected() {
    let home = TempDir::new().expect("home");
    init(&home);
    add_platform(&home, "a");
    add_platform(&home, "b");

    relay_cmd(home.path())
        .args(["sync-config", "add", "--source", "1", "--entity", "Invoice", "--target", "2"])
        .assert()
        .failure()
        .stderr(contains("Invoice"));
}

#[test]
fn sign_matches_library_signature() {
    let home = TempDir::new().expect("home");
    init(&home);
    let body_path = home.path().join("body.json");
    fs::write(&body_path, br#"{"event_type":"created"}"#).expect("write body");

    let expected = signature::sign(br#"{"event_type":"created"}"#, "tok-b", "shared");
    relay_cmd(home.path())
        .arg("sign")
        .arg(&body_path)
        .args(["--platform-token", "tok-b"])
        .assert()
        .success()
        .stdout(contains(expected));
}
