use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn malformed_url_exits_with_invalid_reference_and_no_network() {
    // Resolution is pure and runs before any external call, so this fails
    // immediately regardless of network availability.
    Command::cargo_bin("tubescript")
        .unwrap()
        .arg("not-a-video-url")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid reference"));
}

#[test]
fn wrong_host_is_an_invalid_reference() {
    Command::cargo_bin("tubescript")
        .unwrap()
        .arg("https://example.com/watch?v=dQw4w9WgXcQ")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid reference"));
}

#[test]
fn help_describes_the_single_command() {
    Command::cargo_bin("tubescript")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("URL"))
        .stdout(predicate::str::contains("--lang"));
}
