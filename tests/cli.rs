use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn help_lists_flags() {
    let output = Command::cargo_bin("strtr")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("--host"));
    assert!(text.contains("--port"));
    assert!(text.contains("In-memory Nostr relay"));
}

#[test]
fn invalid_port_env_fails_fast() {
    Command::cargo_bin("strtr")
        .unwrap()
        .env("STRTR_PORT", "notaport")
        .assert()
        .failure();
}

#[test]
fn invalid_host_flag_fails_fast() {
    Command::cargo_bin("strtr")
        .unwrap()
        .args(["--host", "not a host", "--port", "1"])
        .assert()
        .failure();
}
