//! End-to-end tests for the completions command.

mod common;
use common::prelude::*;

#[test]
fn test_completions_bash() {
    let mut cmd = cargo_bin_cmd!("patchpin");

    cmd.arg("completions")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("_patchpin()"))
        .stdout(predicate::str::contains("generate"));
}

#[test]
fn test_completions_zsh() {
    let mut cmd = cargo_bin_cmd!("patchpin");

    cmd.arg("completions")
        .arg("zsh")
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef patchpin"));
}

#[test]
fn test_completions_fish() {
    let mut cmd = cargo_bin_cmd!("patchpin");

    cmd.arg("completions")
        .arg("fish")
        .assert()
        .success()
        .stdout(predicate::str::contains("complete -c patchpin"));
}

#[test]
fn test_completions_powershell() {
    let mut cmd = cargo_bin_cmd!("patchpin");

    cmd.arg("completions")
        .arg("powershell")
        .assert()
        .success()
        .stdout(predicate::str::contains("Register-ArgumentCompleter"));
}

#[test]
fn test_completions_need_no_config() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("completions")
        .arg("elvish")
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}
